//! Conditional nodes
//!
//! An `if` node renders at most one child: the first clause whose guard
//! holds, in order `if`, then each `elif` / `else` in declaration order. On
//! update the selection is re-run; the same clause means the batch is passed
//! to the rendered child, a different one means the new clause is built from
//! scratch and the old subtree is disposed.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::anode::{ANode, DirectiveName};
use crate::data::ChangeRecord;
use crate::dom::Dom;
use crate::error::Result;
use crate::expr::truthy;

use super::{Branch, NodeId, NodeKind, View};

const CLAUSE_DIRECTIVES: &[DirectiveName] = &[DirectiveName::If, DirectiveName::Elif, DirectiveName::Else];

impl<D: Dom> View<D> {
    pub(super) fn attach_if(&mut self, id: NodeId, parent: &D::Handle, before: Option<&D::Handle>) -> Result<()> {
        self.create_stump(id);
        let branch = self.select_branch(id);
        self.set_branch(id, branch);
        if let Some(child) = branch.map(|branch| self.build_branch(id, branch)).transpose()?.flatten() {
            self.push_child(id, child);
            self.attach_node(child, parent, before)?;
        }
        self.insert_own(id, parent, before);
        Ok(())
    }

    pub(super) fn update_if(&mut self, id: NodeId, changes: &[ChangeRecord]) {
        let next = self.select_branch(id);
        let current = self.current_branch(id);
        if next == current {
            self.update_children(id, changes);
            return;
        }

        debug!(?id, from = ?current, to = ?next, "switch branch");
        // A branch that fails to build leaves the current one in place.
        let child = match next.map(|branch| self.build_branch(id, branch)).transpose() {
            Ok(child) => child.flatten(),
            Err(err) => {
                warn!(?id, %err, "branch render failed");
                return;
            }
        };
        let old = match self.node_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for old_child in old {
            self.dispose_node(old_child, false);
        }
        self.set_branch(id, next);

        let Some(child) = child else {
            return;
        };
        self.push_child(id, child);
        if !self.life_cycle(id).is_attached() {
            return;
        }
        if let Some(parent) = self.container_of(id) {
            let stump = self.handle(id).cloned();
            if let Err(err) = self.attach_node(child, &parent, stump.as_ref()) {
                warn!(?id, %err, "branch attach failed");
            }
        }
    }

    /// First clause whose guard holds.
    pub(super) fn select_branch(&self, id: NodeId) -> Option<Branch> {
        let node = self.node_ref(id)?;
        let a_node = &node.a_node;
        let cond = a_node.if_condition()?;
        if truthy(self.scopes.evaluate(node.scope, cond).as_ref()) {
            return Some(Branch::Primary);
        }
        a_node.elses.iter().enumerate().find_map(|(index, clause)| {
            let selected = match clause.elif_condition() {
                Some(guard) => truthy(self.scopes.evaluate(node.scope, guard).as_ref()),
                None => true,
            };
            selected.then_some(Branch::Else(index))
        })
    }

    /// The rendered clause. An index no longer present among the clauses
    /// counts as none.
    fn current_branch(&self, id: NodeId) -> Option<Branch> {
        let node = self.node_ref(id)?;
        let NodeKind::If(state) = &node.kind else {
            return None;
        };
        match state.branch? {
            Branch::Else(index) if index >= node.a_node.elses.len() => None,
            branch => Some(branch),
        }
    }

    fn set_branch(&mut self, id: NodeId, branch: Option<Branch>) {
        if let Some(NodeKind::If(state)) = self.node_mut(id).map(|node| &mut node.kind) {
            state.branch = branch;
        }
    }

    /// Build the unattached child for `branch`.
    fn build_branch(&mut self, id: NodeId, branch: Branch) -> Result<Option<NodeId>> {
        let Some(node) = self.node_ref(id) else {
            return Ok(None);
        };
        let (scope, owner) = (node.scope, node.owner);
        let clause = match branch {
            Branch::Primary => Some(&node.a_node),
            Branch::Else(index) => node.a_node.elses.get(index),
        };
        let Some(clause) = clause else {
            return Ok(None);
        };
        let a_node: Rc<ANode> = Rc::new(clause.without_directives(CLAUSE_DIRECTIVES));
        self.build_node(a_node, id, owner, scope).map(Some)
    }

    fn push_child(&mut self, id: NodeId, child: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.children.push(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::anode::Directive;
    use crate::dom::MemoryDom;
    use crate::expr::{parse_expr, parse_text};
    use crate::view::{ComponentDef, LifeCycle};

    /// Test that a branch that fails to build leaves the rendered branch in
    /// place.
    #[test]
    fn failed_branch_keeps_current_child() {
        let template = ANode::element("div").child(
            ANode::element("p")
                .child(ANode::text(parse_text("on").unwrap()))
                .directive(Directive::If(parse_expr("show").unwrap()))
                .or_else(ANode::element("x-tag").directive(Directive::Else)),
        );
        let mut view = View::new(MemoryDom::new());
        let container = view.dom().container();
        let root = view.bind_and_render(template, json!({"show": true}), container).unwrap();
        let scope = view.data_scope(root).unwrap();
        let div = view.children(root)[0];
        let if_node = view.children(div)[0];
        let active = view.children(if_node)[0];

        view.components.insert(
            "x-tag".to_string(),
            ComponentDef::new(ANode::element("b")).with_data(json!("scalar")),
        );
        view.set(scope, "show", json!(false)).unwrap();
        view.flush();

        assert_eq!(view.children(if_node), &[active]);
        assert_eq!(view.life_cycle(active), LifeCycle::Attached);
        assert_eq!(view.dom().render(container), "<div><p>on</p></div>");
    }
}
