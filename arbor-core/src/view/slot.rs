//! Slot projection
//!
//! A `<slot>` in a component template renders either the content the
//! component usage gave it (evaluated in the usage's scope and owned by the
//! usage's owner) or, when nothing was given, its own default children in the
//! template's scope.
//!
//! Because the two kinds of content live in different scope universes, a
//! slot does not take part in ordinary propagation. It registers on the
//! nearest boundary instead:
//!
//! - on its owner component itself, when it sits directly in that
//!   component's template (`own_slot_children`, fed with the component's own
//!   changes);
//! - otherwise on the nearest non-slot ancestor sharing its owner
//!   (`slot_children`, fed with whatever batch that ancestor receives). For
//!   given content this is the component that received it, which sees the
//!   outer changes.

use std::rc::Rc;

use crate::anode::ANode;
use crate::data::{ChangeRecord, ScopeId};
use crate::dom::Dom;
use crate::error::Result;

use super::{NodeId, NodeKind, SlotState, View, ViewNode};

impl<D: Dom> View<D> {
    /// Construct a slot node and register it on its boundary.
    pub(super) fn build_slot(
        &mut self,
        a_node: Rc<ANode>,
        parent: NodeId,
        owner: Option<NodeId>,
        scope: ScopeId,
    ) -> NodeId {
        let name = a_node.slot_name().to_string();
        let given = owner.and_then(|owner| {
            let component = self.node_ref(owner)?;
            match &component.kind {
                NodeKind::Component(state) => state
                    .given
                    .get(&name)
                    .map(|content| (content.clone(), component.owner, component.scope)),
                _ => None,
            }
        });

        let (content, owner, scope) = match given {
            Some((content, outer_owner, outer_scope)) => (content, outer_owner, outer_scope),
            None => (a_node.children.clone(), owner, scope),
        };
        let state = SlotState {
            name,
            content,
            registered_on: None,
        };
        let id = self.insert_node(ViewNode::new(a_node, Some(parent), owner, scope, NodeKind::Slot(state)));

        let registration = self.find_slot_host(parent, owner);
        if let Some((host, own)) = registration {
            self.register_slot(id, host, own);
        }
        id
    }

    pub(super) fn attach_slot(&mut self, id: NodeId, parent: &D::Handle, before: Option<&D::Handle>) -> Result<()> {
        let Some(node) = self.node_ref(id) else {
            return Ok(());
        };
        let NodeKind::Slot(state) = &node.kind else {
            return Ok(());
        };
        let content = state.content.clone();
        let (owner, scope) = (node.owner, node.scope);

        self.create_stump(id);
        self.build_and_attach(id, &content, owner, scope, parent, before)?;
        self.insert_own(id, parent, before);
        Ok(())
    }

    /// Feed a batch from the slot's own scope universe to its content.
    pub(super) fn update_slot_content(&mut self, id: NodeId, changes: &[ChangeRecord]) {
        self.update_children(id, changes);
    }

    /// Boundary a new slot registers on, and whether it is the owner's own
    /// registry.
    fn find_slot_host(&self, parent: NodeId, owner: Option<NodeId>) -> Option<(NodeId, bool)> {
        let mut current = Some(parent);
        while let Some(candidate) = current {
            let node = self.node_ref(candidate)?;
            if Some(candidate) == owner {
                return Some((candidate, true));
            }
            if !matches!(node.kind, NodeKind::Slot(_)) && node.owner == owner {
                return Some((candidate, false));
            }
            current = node.parent;
        }
        None
    }

    fn register_slot(&mut self, id: NodeId, host: NodeId, own: bool) {
        let Some(host_node) = self.node_mut(host) else {
            return;
        };
        match (&mut host_node.kind, own) {
            (NodeKind::Component(state), true) => state.own_slot_children.push(id),
            _ => host_node.slot_children.push(id),
        }
        if let Some(NodeKind::Slot(state)) = self.node_mut(id).map(|node| &mut node.kind) {
            state.registered_on = Some((host, own));
        }
    }

    pub(super) fn unregister_slot(&mut self, id: NodeId, host: NodeId, own: bool) {
        let Some(host_node) = self.node_mut(host) else {
            return;
        };
        match (&mut host_node.kind, own) {
            (NodeKind::Component(state), true) => state.own_slot_children.retain(|slot| *slot != id),
            _ => host_node.slot_children.retain(|slot| *slot != id),
        }
    }
}
