//! List nodes
//!
//! A `for` node renders one child per list element, each child evaluating
//! against a for-item scope. Updates are reconciled in two phases:
//!
//! 1. **Plan** (read-only). Walk the batch in order and lay out the final
//!    children as a [`ForPlan`]: which existing child sits at each position,
//!    which positions need a new child, what batch each position receives and
//!    which children go away.
//! 2. **Apply**. Build new children, dispose removed ones, rebind survivors
//!    to their final positions through
//!    [`Scopes::rebind_index`](crate::data::Scopes::rebind_index), then walk the list back to front attaching new
//!    children before their right-hand neighbour and updating survivors whose
//!    batch is non-empty.
//!
//! How a change is handled depends on its relation to the list expression:
//!
//! | relation | kind | handling |
//! |---|---|---|
//! | 0 | any | passed to every child unchanged |
//! | ≥3 | any | rewritten to `item…` and routed to the one child it addresses |
//! | 1, 2 | set | whole-list rebuild: survivors keep their position, the tail is created or disposed |
//! | 2 | splice | structural splice; children outside the spliced range keep their identity |
//! | 1 | splice | an ancestor array was spliced: rebuild |
//!
//! A rebuild dominates any later splice in the same batch. Whenever the child
//! count changes every child also receives a `list.length` set.

use std::iter;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::anode::{ANode, ForDirective};
use crate::data::{ChangeKind, ChangeOption, ChangeRecord, ScopeId};
use crate::dom::Dom;
use crate::error::Result;
use crate::expr::{Expr, PathKey, Relation};

use super::{LifeCycle, NodeId, NodeKind, View};

/// Final occupant of one list position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForSlot {
    /// An existing child moves (or stays) here.
    Keep(NodeId),
    /// A new child is built for this position.
    Create,
}

/// Layout of a `for` node's children after one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForPlan {
    pub slots: Vec<ForSlot>,
    /// Batch for each position, parallel to `slots`.
    pub batches: Vec<Vec<ChangeRecord>>,
    /// Children removed by the batch.
    pub dispose: Vec<NodeId>,
}

impl ForPlan {
    fn new(children: &[NodeId]) -> Self {
        Self {
            slots: children.iter().copied().map(ForSlot::Keep).collect(),
            batches: vec![Vec::new(); children.len()],
            dispose: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Children created by the plan.
    pub fn created(&self) -> usize {
        self.slots.iter().filter(|slot| **slot == ForSlot::Create).count()
    }

    fn broadcast(&mut self, change: &ChangeRecord) {
        for batch in &mut self.batches {
            batch.push(change.clone());
        }
    }

    /// Resize to `items` and hand every position its new item. `ancestor` is
    /// the triggering change when it addressed something above the list;
    /// children see it as well.
    fn rebuild(
        &mut self,
        directive: &ForDirective,
        items: &[Value],
        option: ChangeOption,
        ancestor: Option<&ChangeRecord>,
    ) {
        let new_len = items.len();
        if self.slots.len() > new_len {
            self.dispose.extend(self.slots.drain(new_len..).filter_map(|slot| match slot {
                ForSlot::Keep(id) => Some(id),
                ForSlot::Create => None,
            }));
            self.batches.truncate(new_len);
        }
        self.slots.resize(new_len, ForSlot::Create);
        self.batches.resize_with(new_len, Vec::new);

        let item_expr = Expr::accessor([directive.item.as_str()]);
        for (batch, item) in self.batches.iter_mut().zip(items) {
            batch.push(ChangeRecord::set(item_expr.clone(), item.clone()).with_option(option));
            if let Some(change) = ancestor {
                batch.push(change.clone());
            }
        }
    }

    /// Replace `delete_count` positions at `start` with `insert_len` new ones.
    /// Positions after the range receive their new index.
    fn splice(
        &mut self,
        directive: &ForDirective,
        start: usize,
        delete_count: usize,
        insert_len: usize,
        option: ChangeOption,
    ) {
        let len = self.slots.len();
        let start = start.min(len);
        let end = start + delete_count.min(len - start);
        let delete_count = end - start;

        if insert_len != delete_count {
            let index_expr = Expr::accessor([directive.index.as_str()]);
            for (position, batch) in self.batches.iter_mut().enumerate().skip(end) {
                let index = position - delete_count + insert_len;
                batch.push(ChangeRecord::set(index_expr.clone(), Value::from(index)).with_option(option));
            }
        }

        let removed = self
            .slots
            .splice(start..end, iter::repeat(ForSlot::Create).take(insert_len));
        self.dispose.extend(removed.filter_map(|slot| match slot {
            ForSlot::Keep(id) => Some(id),
            ForSlot::Create => None,
        }));
        self.batches
            .splice(start..end, iter::repeat_with(Vec::new).take(insert_len));
    }
}

impl<D: Dom> View<D> {
    pub(super) fn attach_for(
        &mut self,
        id: NodeId,
        parent: &D::Handle,
        before: Option<&D::Handle>,
    ) -> Result<()> {
        let Some((directive, item_a_node, scope, owner)) = self.for_parts(id) else {
            return Ok(());
        };
        self.create_stump(id);

        let len = self.list_items(scope, &directive).len();
        for index in 0..len {
            let child = self.build_item(id, &directive, &item_a_node, scope, owner, index)?;
            if let Some(node) = self.node_mut(id) {
                node.children.push(child);
            }
            self.attach_node(child, parent, before)?;
        }
        self.insert_own(id, parent, before);
        Ok(())
    }

    pub(super) fn update_for(&mut self, id: NodeId, changes: &[ChangeRecord]) {
        let Some(plan) = self.plan_for(id, changes) else {
            return;
        };
        if let Err(err) = self.apply_for_plan(id, plan) {
            warn!(?id, %err, "list update failed");
        }
    }

    /// Phase one: lay out the children after `changes` without touching
    /// anything.
    pub fn plan_for(&self, id: NodeId, changes: &[ChangeRecord]) -> Option<ForPlan> {
        let node = self.node_ref(id)?;
        let directive = node.a_node.for_directive()?;
        let scope = node.scope;
        let list_len = directive.list.paths().map_or(0, <[Expr]>::len);

        let mut plan = ForPlan::new(&node.children);
        let old_len = plan.len();
        let mut rebuilt = false;

        for change in changes {
            let relation = self.scopes.compare(scope, &change.expr, &directive.list);
            trace!(?id, path = %change.expr, relation = relation.raw(), "list change");

            if !relation.is_related() {
                plan.broadcast(change);
            } else if relation.is_descendant() {
                let keys = change.keys();
                match keys.get(list_len).and_then(PathKey::as_index) {
                    Some(index) if index < plan.len() => {
                        let mut paths = vec![Expr::String(directive.item.clone())];
                        paths.extend(keys[list_len + 1..].iter().map(PathKey::to_expr));
                        plan.batches[index].push(change.with_expr(Expr::Accessor(paths)));
                    }
                    _ => plan.broadcast(change),
                }
            } else {
                match &change.kind {
                    ChangeKind::Set { .. } => {
                        let items = self.list_items(scope, directive);
                        let ancestor = (relation == Relation::ANCESTOR).then_some(change);
                        plan.rebuild(directive, &items, change.option, ancestor);
                        rebuilt = true;
                    }
                    ChangeKind::Splice { .. } if rebuilt => {}
                    ChangeKind::Splice {
                        index,
                        delete_count,
                        insertions,
                        ..
                    } if relation.is_exact() => {
                        plan.splice(directive, *index, *delete_count, insertions.len(), change.option);
                    }
                    ChangeKind::Splice { .. } => {
                        let items = self.list_items(scope, directive);
                        plan.rebuild(directive, &items, change.option, Some(change));
                        rebuilt = true;
                    }
                }
            }
        }

        // A batch that does not explain the current list (e.g. one replayed
        // twice) is reconciled like a whole-list set.
        let items = self.list_items(scope, directive);
        if plan.len() != items.len() {
            debug!(?id, planned = plan.len(), actual = items.len(), "list resync");
            plan.rebuild(directive, &items, ChangeOption::default(), None);
        }

        if plan.len() != old_len {
            if let Some(paths) = directive.list.paths() {
                let mut length_paths = paths.to_vec();
                length_paths.push(Expr::String("length".to_string()));
                let length = ChangeRecord::set(Expr::Accessor(length_paths), Value::from(plan.len()));
                plan.broadcast(&length);
            }
        }
        Some(plan)
    }

    /// Phase two.
    fn apply_for_plan(&mut self, id: NodeId, plan: ForPlan) -> Result<()> {
        let Some((directive, item_a_node, scope, owner)) = self.for_parts(id) else {
            return Ok(());
        };
        debug!(
            ?id,
            len = plan.len(),
            created = plan.created(),
            disposed = plan.dispose.len(),
            "apply list plan"
        );

        // New children are built before anything is disposed, so a failed
        // build leaves the current children as they were.
        let mut children = Vec::with_capacity(plan.len());
        let mut created = Vec::with_capacity(plan.created());
        for (position, slot) in plan.slots.iter().enumerate() {
            let child = match *slot {
                ForSlot::Keep(child) => child,
                ForSlot::Create => {
                    match self.build_item(id, &directive, &item_a_node, scope, owner, position) {
                        Ok(child) => {
                            created.push(child);
                            child
                        }
                        Err(err) => {
                            for child in created {
                                self.dispose_node(child, false);
                            }
                            return Err(err);
                        }
                    }
                }
            };
            children.push(child);
        }

        for child in &plan.dispose {
            self.dispose_node(*child, false);
        }
        for (position, slot) in plan.slots.iter().enumerate() {
            if let ForSlot::Keep(child) = *slot {
                if let Some(child_scope) = self.scope_of(child) {
                    self.scopes.rebind_index(child_scope, position);
                }
            }
        }

        let attached = match self.node_mut(id) {
            Some(node) => {
                node.children = children.clone();
                node.life_cycle.is_attached()
            }
            None => return Ok(()),
        };

        let parent = if attached { self.container_of(id) } else { None };
        let mut anchor = self.handle(id).cloned();
        for (position, child) in children.iter().enumerate().rev() {
            if self.life_cycle(*child) == LifeCycle::Inited {
                if let Some(parent) = &parent {
                    self.attach_node(*child, parent, anchor.as_ref())?;
                }
            } else if !plan.batches[position].is_empty() {
                self.update_node(*child, &plan.batches[position]);
            }
            if let Some(first) = self.first_handle(*child) {
                anchor = Some(first);
            }
        }
        Ok(())
    }

    fn for_parts(&self, id: NodeId) -> Option<(ForDirective, Rc<ANode>, ScopeId, Option<NodeId>)> {
        let node = self.node_ref(id)?;
        let NodeKind::For(state) = &node.kind else {
            return None;
        };
        let directive = node.a_node.for_directive()?.clone();
        Some((directive, Rc::clone(&state.item_a_node), node.scope, node.owner))
    }

    /// Current elements of the list; anything but an array renders nothing.
    fn list_items(&self, scope: ScopeId, directive: &ForDirective) -> Vec<Value> {
        match self.scopes.evaluate(scope, &directive.list) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    fn build_item(
        &mut self,
        id: NodeId,
        directive: &ForDirective,
        item_a_node: &Rc<ANode>,
        scope: ScopeId,
        owner: Option<NodeId>,
        index: usize,
    ) -> Result<NodeId> {
        let item_scope = self.scopes.insert_for_item(scope, directive.clone(), index);
        let child = match self.build_node(Rc::clone(item_a_node), id, owner, item_scope) {
            Ok(child) => child,
            Err(err) => {
                self.scopes.remove(item_scope);
                return Err(err);
            }
        };
        if let Some(node) = self.node_mut(child) {
            node.owned_scope = Some(item_scope);
        }
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anode::Directive;
    use crate::dom::MemoryDom;
    use crate::expr::{parse_expr, parse_text};
    use crate::view::ComponentDef;
    use serde_json::json;

    fn directive() -> ForDirective {
        ForDirective::new("item", "i", parse_expr("list").unwrap())
    }

    fn ids(n: u32) -> Vec<NodeId> {
        (0..n).map(NodeId::from).collect()
    }

    #[test]
    fn splice_keeps_outside_children_and_reindexes_tail() {
        let mut plan = ForPlan::new(&ids(3));
        plan.splice(&directive(), 1, 1, 2, ChangeOption::default());

        assert_eq!(
            plan.slots,
            vec![
                ForSlot::Keep(NodeId::from(0)),
                ForSlot::Create,
                ForSlot::Create,
                ForSlot::Keep(NodeId::from(2)),
            ]
        );
        assert_eq!(plan.dispose, vec![NodeId::from(1)]);
        assert!(plan.batches[0].is_empty());
        assert_eq!(
            plan.batches[3],
            vec![ChangeRecord::set(Expr::accessor(["i"]), json!(3))]
        );
    }

    #[test]
    fn balanced_splice_sends_no_index_changes() {
        let mut plan = ForPlan::new(&ids(3));
        plan.splice(&directive(), 0, 1, 1, ChangeOption::default());
        assert!(plan.batches.iter().all(Vec::is_empty));
        assert_eq!(plan.created(), 1);
    }

    #[test]
    fn rebuild_truncates_and_extends() {
        let mut plan = ForPlan::new(&ids(3));
        plan.rebuild(&directive(), &[json!("a")], ChangeOption::default(), None);
        assert_eq!(plan.slots, vec![ForSlot::Keep(NodeId::from(0))]);
        assert_eq!(plan.dispose, vec![NodeId::from(1), NodeId::from(2)]);
        assert_eq!(
            plan.batches[0],
            vec![ChangeRecord::set(Expr::accessor(["item"]), json!("a"))]
        );

        plan.rebuild(&directive(), &[json!(1), json!(2)], ChangeOption::default(), None);
        assert_eq!(plan.slots[1], ForSlot::Create);
        assert_eq!(plan.batches.len(), 2);
    }

    /// Test that a list update whose new child fails to build keeps the
    /// current children alive and leaks no nodes.
    #[test]
    fn failed_build_leaves_children_intact() {
        let item = ANode::element("x-tag")
            .child(ANode::text(parse_text("{{item}}").unwrap()))
            .directive(Directive::For(directive()));
        let mut view = View::new(MemoryDom::new());
        let container = view.dom().container();
        let root = view
            .bind_and_render(ANode::element("ul").child(item), json!({"list": [1, 2]}), container)
            .unwrap();
        let scope = view.data_scope(root).unwrap();
        let ul = view.children(root)[0];
        let for_node = view.children(ul)[0];
        let before = view.children(for_node).to_vec();
        let live = view.nodes.iter().flatten().count();

        // Bypasses registration so the next built item fails on its data.
        view.components.insert(
            "x-tag".to_string(),
            ComponentDef::new(ANode::element("b")).with_data(json!([1])),
        );
        view.splice(scope, "list", 0, 1, vec![json!(9)]).unwrap();
        view.flush();

        assert_eq!(view.children(for_node), before.as_slice());
        assert!(before.iter().all(|child| view.life_cycle(*child) == LifeCycle::Attached));
        assert_eq!(view.nodes.iter().flatten().count(), live);
        assert_eq!(view.dom().render(container), "<ul><x-tag>1</x-tag><x-tag>2</x-tag></ul>");
    }
}
