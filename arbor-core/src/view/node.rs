//! View Nodes
//!
//! This module defines the node records that live in the view arena.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::anode::ANode;
use crate::data::ScopeId;

/// Index of a node in the view arena. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Phase of a node.
///
/// ```text
/// Inited -> Created -> Attached <-> Detached
///    \         \          \           \
///     +---------+----------+-----------+--> Disposed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeCycle {
    /// Constructed, no handle yet.
    Inited,
    /// Handles materialized but not inserted.
    Created,
    /// Inserted into the host tree.
    Attached,
    /// Taken out of the host tree; handles kept for re-insertion.
    Detached,
    /// Released. Terminal.
    Disposed,
}

impl LifeCycle {
    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: LifeCycle) -> bool {
        use LifeCycle::*;
        matches!(
            (self, next),
            (Inited, Created)
                | (Created, Attached)
                | (Attached, Detached)
                | (Detached, Attached)
                | (Inited | Created | Attached | Detached, Disposed)
        )
    }

    pub fn is_attached(self) -> bool {
        self == LifeCycle::Attached
    }
}

/// Variant tag of a node, without its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Element,
    Text,
    For,
    If,
    Slot,
    Component,
}

/// The `if` clause currently rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// The `if` clause itself.
    Primary,
    /// The n-th entry of `elses`.
    Else(usize),
}

#[derive(Debug, Clone)]
pub struct ForState {
    /// The node each item renders: the `for` ANode minus its `for` directive.
    pub item_a_node: Rc<ANode>,
}

#[derive(Debug, Clone, Default)]
pub struct IfState {
    pub branch: Option<Branch>,
}

#[derive(Debug, Clone)]
pub struct SlotState {
    pub name: String,
    /// Given content (rendered in the outer scope) or the default children.
    pub content: Vec<Rc<ANode>>,
    /// Node whose slot registry holds this slot, and whether it is the
    /// component's own registry.
    pub registered_on: Option<(NodeId, bool)>,
}

#[derive(Debug, Clone)]
pub struct ComponentState {
    pub template: Rc<ANode>,
    /// The component's own store.
    pub store: ScopeId,
    /// Content given by the usage, grouped by slot name.
    pub given: IndexMap<String, Vec<Rc<ANode>>>,
    /// Slots declared directly by this component's template.
    pub own_slot_children: Vec<NodeId>,
}

/// Variant state of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Element,
    Text,
    For(ForState),
    If(IfState),
    Slot(SlotState),
    Component(ComponentState),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Element => NodeType::Element,
            NodeKind::Text => NodeType::Text,
            NodeKind::For(_) => NodeType::For,
            NodeKind::If(_) => NodeType::If,
            NodeKind::Slot(_) => NodeType::Slot,
            NodeKind::Component(_) => NodeType::Component,
        }
    }
}

/// A node in the view arena.
#[derive(Debug)]
pub struct ViewNode<H> {
    pub a_node: Rc<ANode>,
    pub parent: Option<NodeId>,
    /// Nearest enclosing component.
    pub owner: Option<NodeId>,
    /// Scope the node's bindings evaluate against.
    pub scope: ScopeId,
    /// For-item scope created for this node and released with it.
    pub owned_scope: Option<ScopeId>,
    pub life_cycle: LifeCycle,
    /// Element or text handle, or the stump of a fragment.
    pub handle: Option<H>,
    /// Host container of a root node.
    pub mount: Option<H>,
    pub children: Vec<NodeId>,
    /// Slots that registered on this node.
    pub slot_children: Vec<NodeId>,
    pub kind: NodeKind,
}

impl<H> ViewNode<H> {
    pub fn new(a_node: Rc<ANode>, parent: Option<NodeId>, owner: Option<NodeId>, scope: ScopeId, kind: NodeKind) -> Self {
        Self {
            a_node,
            parent,
            owner,
            scope,
            owned_scope: None,
            life_cycle: LifeCycle::Inited,
            handle: None,
            mount: None,
            children: Vec::new(),
            slot_children: Vec::new(),
            kind,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        use LifeCycle::*;
        assert!(Inited.can_transition_to(Created));
        assert!(Created.can_transition_to(Attached));
        assert!(Attached.can_transition_to(Detached));
        assert!(Detached.can_transition_to(Attached));
        assert!(Inited.can_transition_to(Disposed));

        assert!(!Inited.can_transition_to(Attached));
        assert!(!Attached.can_transition_to(Attached));
        assert!(!Disposed.can_transition_to(Disposed));
        assert!(!Disposed.can_transition_to(Attached));
    }
}
