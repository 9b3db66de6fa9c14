//! Components
//!
//! A component usage renders its definition's template against a store of
//! its own. The store starts from the definition's default data with every
//! binding of the usage evaluated in the outer scope on top. Afterwards the
//! component sits on a boundary between two scope universes:
//!
//! - outer changes reach it through [`View::update_component`], which writes
//!   related bindings into the store and hands the rest to the slots that
//!   render given content;
//! - changes of its own store (from a binding write or a direct mutation) are
//!   propagated through [`View::propagate_own`] to the template subtree.

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::anode::ANode;
use crate::data::{ChangeKind, ChangeOption, ChangeRecord, Data, Mutation, ScopeId};
use crate::dom::Dom;
use crate::error::{DataError, Result};
use crate::expr::{Expr, PathKey};

use super::{ComponentState, LifeCycle, NodeId, NodeKind, View, ViewNode};

/// Usage prop routing content into a named slot.
const SLOT_BINDING: &str = "slot";

/// A registered component: its template and default data.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDef {
    pub template: Rc<ANode>,
    pub data: Value,
}

impl ComponentDef {
    pub fn new(template: ANode) -> Self {
        Self {
            template: Rc::new(template),
            data: Value::Object(Map::new()),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

impl<D: Dom> View<D> {
    pub(super) fn build_component(
        &mut self,
        a_node: Rc<ANode>,
        def: ComponentDef,
        parent: NodeId,
        owner: Option<NodeId>,
        scope: ScopeId,
    ) -> Result<NodeId> {
        let mut data = Data::from_value(def.data)?;
        for (name, expr) in a_node.bindings() {
            if name == SLOT_BINDING {
                continue;
            }
            let value = self.scopes.evaluate(scope, expr).unwrap_or(Value::Null);
            data.apply(&[PathKey::from(name.as_str())], set_mutation(value, ChangeOption::default()))?;
        }
        // Initial values are rendered fresh, not propagated.
        data.take_changes();
        let store = self.scopes.insert_store(data, None);

        let mut given: IndexMap<String, Vec<Rc<ANode>>> = IndexMap::new();
        for child in &a_node.children {
            given
                .entry(child.target_slot().to_string())
                .or_default()
                .push(Rc::clone(child));
        }

        let kind = NodeKind::Component(ComponentState {
            template: def.template,
            store,
            given,
            own_slot_children: Vec::new(),
        });
        let id = self.insert_node(ViewNode::new(a_node, Some(parent), owner, scope, kind));
        self.scopes.set_owner(store, id);
        Ok(id)
    }

    pub(super) fn attach_component(
        &mut self,
        id: NodeId,
        parent: &D::Handle,
        before: Option<&D::Handle>,
    ) -> Result<()> {
        let Some(node) = self.node_ref(id) else {
            return Ok(());
        };
        let NodeKind::Component(state) = &node.kind else {
            return Ok(());
        };
        let template = Rc::clone(&state.template);
        let store = state.store;

        self.transition(id, LifeCycle::Created);
        self.build_and_attach(id, &[template], Some(id), store, parent, before)?;
        self.transition(id, LifeCycle::Attached);
        Ok(())
    }

    /// React to changes of the scope the component is used in.
    pub(super) fn update_component(&mut self, id: NodeId, changes: &[ChangeRecord]) {
        let Some(node) = self.node_ref(id) else {
            return;
        };
        let NodeKind::Component(state) = &node.kind else {
            return;
        };
        let store = state.store;
        let scope = node.scope;
        let a_node = Rc::clone(&node.a_node);

        for (name, expr) in a_node.bindings() {
            if name == SLOT_BINDING {
                continue;
            }
            for change in changes {
                let relation = self.scopes.compare(scope, &change.expr, expr);
                if !relation.is_related() {
                    continue;
                }
                if let Err(err) = self.write_binding(store, name, expr, scope, change, relation.raw()) {
                    warn!(?id, binding = %name, %err, "binding write failed, resetting");
                    let value = self.scopes.evaluate(scope, expr).unwrap_or(Value::Null);
                    let reset = match self.scopes.data_mut(store) {
                        Some(data) => data
                            .apply(&[PathKey::from(name.as_str())], set_mutation(value, change.option))
                            .map(|_| ()),
                        None => Ok(()),
                    };
                    if let Err(err) = reset {
                        warn!(?id, binding = %name, %err, "binding reset failed");
                    }
                }
            }
        }

        self.update_slot_children(id, changes);

        let mut own = self.scheduler.take(id);
        if let Some(data) = self.scopes.data_mut(store) {
            own.extend(data.take_changes());
        }
        if !own.is_empty() {
            self.propagate_own(id, &own);
        }
    }

    /// Write one outer change into the store through the binding `name`.
    ///
    /// A change below the bound path, or a splice of the bound array itself,
    /// is replayed at the matching path under `name`; anything else resets
    /// the binding to its freshly evaluated value.
    fn write_binding(
        &mut self,
        store: ScopeId,
        name: &str,
        expr: &Expr,
        scope: ScopeId,
        change: &ChangeRecord,
        relation: usize,
    ) -> std::result::Result<(), DataError> {
        let mut keys = vec![PathKey::from(name)];
        let replay = relation > 2 || (relation == 2 && change.is_splice());
        let mutation = if replay {
            let change_keys = change.keys();
            let extra = relation - 2;
            if extra > change_keys.len() {
                return Err(DataError::InvalidPath {
                    path: name.to_string(),
                    reason: "change path shorter than binding".to_string(),
                });
            }
            keys.extend_from_slice(&change_keys[change_keys.len() - extra..]);
            match &change.kind {
                ChangeKind::Set { value } => set_mutation(value.clone(), change.option),
                ChangeKind::Splice {
                    index,
                    delete_count,
                    insertions,
                    ..
                } => Mutation::Splice {
                    index: *index as isize,
                    delete_count: Some(*delete_count),
                    insertions: insertions.clone(),
                },
            }
        } else {
            let value = self.scopes.evaluate(scope, expr).unwrap_or(Value::Null);
            set_mutation(value, change.option)
        };

        let data = self.scopes.data_mut(store).ok_or_else(|| DataError::InvalidPath {
            path: name.to_string(),
            reason: "component store released".to_string(),
        })?;
        data.apply(&keys, mutation)?;
        Ok(())
    }

    /// Propagate changes of the component's own store: first the template
    /// subtree, then the slots declared directly in the template.
    pub(crate) fn propagate_own(&mut self, id: NodeId, changes: &[ChangeRecord]) {
        if changes.is_empty() {
            return;
        }
        debug!(?id, count = changes.len(), "propagate own changes");
        self.update_children(id, changes);

        let slots = match self.node_ref(id).map(|node| &node.kind) {
            Some(NodeKind::Component(state)) => state.own_slot_children.clone(),
            _ => return,
        };
        for slot in slots {
            self.update_slot_content(slot, changes);
        }
    }
}

fn set_mutation(value: Value, option: ChangeOption) -> Mutation {
    Mutation::Set { value, option }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dom::MemoryDom;
    use crate::expr::parse_expr;

    fn expr(source: &str) -> Expr {
        parse_expr(source).unwrap()
    }

    fn card() -> ComponentDef {
        ComponentDef::new(ANode::element("section").child(ANode::text(expr("title")))).with_data(json!({
            "title": "untitled",
            "tags": [],
        }))
    }

    #[test]
    fn store_starts_from_defaults_and_bindings() {
        let mut view = View::new(MemoryDom::new());
        view.register_component("x-card", card()).unwrap();
        let template = ANode::element("div").child(ANode::element("x-card").bind("title", expr("heading")));
        let container = view.dom().container();
        let root = view
            .bind_and_render(template, json!({"heading": "Hello"}), container)
            .unwrap();

        let div = view.children(root)[0];
        let card = view.children(div)[0];
        let store = view.data_scope(card).unwrap();
        assert_eq!(view.data(store).unwrap().get("title"), Some(json!("Hello")));
        assert_eq!(view.data(store).unwrap().get("tags"), Some(json!([])));
        assert_eq!(view.dom().render(container), "<div><section>Hello</section></div>");
    }

    #[test]
    fn descendant_change_is_replayed_under_binding() {
        let mut view = View::new(MemoryDom::new());
        view.register_component(
            "x-card",
            ComponentDef::new(ANode::element("p").child(ANode::text(expr("user.name")))),
        )
        .unwrap();
        let template = ANode::element("x-card").bind("user", expr("people[0]"));
        let container = view.dom().container();
        let root = view
            .bind_and_render(template, json!({"people": [{"name": "ann"}]}), container)
            .unwrap();
        let outer = view.data_scope(root).unwrap();

        view.set(outer, "people[0].name", json!("bob")).unwrap();
        view.flush();

        let card = view.children(root)[0];
        let store = view.data_scope(card).unwrap();
        assert_eq!(view.data(store).unwrap().get("user.name"), Some(json!("bob")));
        assert_eq!(view.dom().render(container), "<p>bob</p>");
    }

    #[test]
    fn exact_splice_is_replayed_on_store_array() {
        let mut view = View::new(MemoryDom::new());
        view.register_component("x-list", ComponentDef::new(ANode::element("ul"))).unwrap();
        let template = ANode::element("x-list").bind("items", expr("rows"));
        let container = view.dom().container();
        let root = view
            .bind_and_render(template, json!({"rows": [1, 2]}), container)
            .unwrap();
        let outer = view.data_scope(root).unwrap();

        view.push(outer, "rows", json!(3)).unwrap();
        view.flush();

        let list = view.children(root)[0];
        let store = view.data_scope(list).unwrap();
        let data = view.data(store).unwrap();
        assert_eq!(data.get("items"), Some(json!([1, 2, 3])));
    }

    /// Test that a replay into a store whose shape diverged resets the
    /// binding to the outer value.
    #[test]
    fn failed_replay_resets_binding() {
        let mut view = View::new(MemoryDom::new());
        view.register_component(
            "x-card",
            ComponentDef::new(ANode::element("p").child(ANode::text(expr("user.name")))),
        )
        .unwrap();
        let template = ANode::element("x-card").bind("user", expr("people[0]"));
        let container = view.dom().container();
        let root = view
            .bind_and_render(template, json!({"people": [{"name": "ann"}]}), container)
            .unwrap();
        let outer = view.data_scope(root).unwrap();
        let card = view.children(root)[0];
        let store = view.data_scope(card).unwrap();

        view.set(store, "user", json!("detached")).unwrap();
        view.flush();
        view.set(outer, "people[0].name", json!("bob")).unwrap();
        view.flush();

        assert_eq!(view.data(store).unwrap().get("user"), Some(json!({"name": "bob"})));
        assert_eq!(view.dom().render(container), "<p>bob</p>");
    }
}

