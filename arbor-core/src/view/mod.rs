//! View Runtime
//!
//! The [`View`] owns three arenas: view nodes, scopes, and the host handles
//! behind its [`Dom`]. Every node variant implements the same contract:
//!
//! - **attach**: materialize handles, insert them before an anchor, build and
//!   attach children. Attaching a detached node re-inserts its existing
//!   handles.
//! - **detach**: take the node's handles out of the host tree.
//! - **dispose**: release the node, its children and any scope it created.
//!   Terminal.
//! - **update**: react to a batch of change records. A node reacts only to
//!   records related to one of its bindings; everything else is passed down
//!   unchanged, and an empty batch does nothing at all.
//!
//! # Propagation
//!
//! Mutations go through the view ([`View::set`], [`View::splice`], ...). The
//! resulting records are queued on the component that owns the mutated store
//! and propagated on the next [`View::flush`], root-down. A component
//! forwards outer changes into its own store through its bindings, then
//! propagates whatever its store emitted to its own subtree.

mod component;
mod element;
mod for_each;
mod if_else;
mod node;
mod slot;
mod text;

pub use component::ComponentDef;
pub use for_each::{ForPlan, ForSlot};
pub use node::{
    Branch, ComponentState, ForState, IfState, LifeCycle, NodeId, NodeKind, NodeType, SlotState,
    ViewNode,
};

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::anode::{ANode, DirectiveName, EventDecl};
use crate::config::{FlushMode, ViewConfig};
use crate::data::{ChangeOption, ChangeRecord, Data, Mutation, MutationResult, ScopeId, Scopes};
use crate::dom::Dom;
use crate::error::{Result, ViewError};
use crate::expr::{parse_expr, IntoPath};
use crate::scheduler::{FlushState, UpdateScheduler};

/// A rendered view tree bound to its data.
pub struct View<D: Dom> {
    dom: D,
    config: ViewConfig,
    nodes: Vec<Option<ViewNode<D::Handle>>>,
    scopes: Scopes,
    scheduler: UpdateScheduler,
    components: IndexMap<String, ComponentDef>,
}

impl<D: Dom> View<D> {
    pub fn new(dom: D) -> Self {
        Self::with_config(dom, ViewConfig::default())
    }

    pub fn with_config(dom: D, config: ViewConfig) -> Self {
        Self {
            dom,
            config,
            nodes: Vec::new(),
            scopes: Scopes::new(),
            scheduler: UpdateScheduler::new(),
            components: IndexMap::new(),
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Make elements named `name` render as instances of `def`.
    ///
    /// The default data must be an object (or null); anything else fails
    /// with [`DataError::PathMismatch`](crate::error::DataError::PathMismatch)
    /// and leaves the registry unchanged.
    pub fn register_component(&mut self, name: impl Into<String>, def: ComponentDef) -> Result<()> {
        Data::from_value(def.data.clone())?;
        self.components.insert(name.into(), def);
        Ok(())
    }

    /// Render `a_node` against `data` into `container`.
    ///
    /// The returned root is an anonymous component owning a store seeded
    /// with `data`.
    pub fn bind_and_render(
        &mut self,
        a_node: impl Into<Rc<ANode>>,
        data: Value,
        container: D::Handle,
    ) -> Result<NodeId> {
        let template = a_node.into();
        let store = self.scopes.insert_store(Data::from_value(data)?, None);
        let kind = NodeKind::Component(ComponentState {
            template: Rc::clone(&template),
            store,
            given: IndexMap::new(),
            own_slot_children: Vec::new(),
        });
        let mut root = ViewNode::new(template, None, None, store, kind);
        root.mount = Some(container.clone());
        let id = self.insert_node(root);
        self.scopes.set_owner(store, id);

        self.attach_node(id, &container, None)?;
        debug!(?id, "rendered root");
        Ok(id)
    }

    /// Propagate `changes` from `id` down. A component treats them as
    /// changes of its own store.
    pub fn update(&mut self, id: NodeId, changes: &[ChangeRecord]) -> Result<()> {
        let node = self.get(id)?;
        if changes.is_empty() {
            return Ok(());
        }
        if matches!(node.kind, NodeKind::Component(_)) {
            self.propagate_own(id, changes);
        } else {
            self.update_node(id, changes);
        }
        Ok(())
    }

    /// Re-insert a detached node. No-op for an attached node.
    pub fn attach(&mut self, id: NodeId, parent: &D::Handle, before: Option<&D::Handle>) -> Result<()> {
        self.get(id)?;
        self.attach_node(id, parent, before)
    }

    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        self.get(id)?;
        self.detach_node(id);
        Ok(())
    }

    /// Dispose `id` and its subtree, removing it from its parent.
    pub fn dispose(&mut self, id: NodeId) -> Result<()> {
        let parent = self.get(id)?.parent;
        self.dispose_node(id, false);
        if let Some(parent) = parent.and_then(|parent| self.node_mut(parent)) {
            parent.children.retain(|child| *child != id);
        }
        Ok(())
    }

    /// Propagate everything queued since the last flush. Returns the number
    /// of component batches propagated.
    #[instrument(level = "debug", skip(self))]
    pub fn flush(&mut self) -> usize {
        if !self.scheduler.begin_flush() {
            return 0;
        }
        let mut passes = 0;
        loop {
            let nodes = &self.nodes;
            let Some((owner, changes)) = self.scheduler.pop_next(|id| depth(nodes, id)) else {
                break;
            };
            if self.node_ref(owner).is_none() {
                continue;
            }
            debug!(?owner, count = changes.len(), "propagate batch");
            self.propagate_own(owner, &changes);
            passes += 1;
        }
        self.scheduler.finish_flush();
        passes
    }

    /// Drop queued changes. Fails once a flush has started.
    pub fn cancel_pending(&mut self) -> bool {
        self.scheduler.cancel()
    }

    pub fn flush_state(&self) -> FlushState {
        self.scheduler.state()
    }

    /// Number of completed flushes.
    pub fn flush_count(&self) -> u64 {
        self.scheduler.flush_count()
    }

    /// Apply `mutation` to `path` as seen from `scope`, queueing the
    /// resulting change for propagation.
    pub fn mutate(&mut self, scope: ScopeId, path: impl IntoPath, mutation: Mutation) -> Result<MutationResult> {
        if !self.scopes.contains(scope) {
            return Err(ViewError::UnknownScope(scope));
        }
        let expr = path.into_path()?;
        let (store, keys) = self.scopes.resolve_write(scope, &expr)?;
        let data = self.scopes.data_mut(store).ok_or(ViewError::UnknownScope(store))?;
        let result = data.apply(&keys, mutation)?;
        let changes = data.take_changes();

        if let Some(owner) = self.scopes.owner_of(store) {
            self.scheduler.enqueue(owner, changes);
            if self.config.flush == FlushMode::Immediate {
                self.flush();
            }
        }
        Ok(result)
    }

    pub fn set(&mut self, scope: ScopeId, path: impl IntoPath, value: Value) -> Result<()> {
        self.set_with(scope, path, value, ChangeOption::default())
    }

    pub fn set_with(&mut self, scope: ScopeId, path: impl IntoPath, value: Value, option: ChangeOption) -> Result<()> {
        self.mutate(scope, path, Mutation::Set { value, option })?;
        Ok(())
    }

    pub fn splice(
        &mut self,
        scope: ScopeId,
        path: impl IntoPath,
        index: isize,
        delete_count: usize,
        insertions: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let mutation = Mutation::Splice {
            index,
            delete_count: Some(delete_count),
            insertions,
        };
        Ok(self.mutate(scope, path, mutation)?.removed)
    }

    pub fn push(&mut self, scope: ScopeId, path: impl IntoPath, value: Value) -> Result<usize> {
        Ok(self.mutate(scope, path, Mutation::Push(value))?.length)
    }

    pub fn pop(&mut self, scope: ScopeId, path: impl IntoPath) -> Result<Option<Value>> {
        Ok(self.mutate(scope, path, Mutation::Pop)?.removed.pop())
    }

    pub fn shift(&mut self, scope: ScopeId, path: impl IntoPath) -> Result<Option<Value>> {
        Ok(self.mutate(scope, path, Mutation::Shift)?.removed.pop())
    }

    pub fn unshift(&mut self, scope: ScopeId, path: impl IntoPath, value: Value) -> Result<usize> {
        Ok(self.mutate(scope, path, Mutation::Unshift(value))?.length)
    }

    pub fn remove(&mut self, scope: ScopeId, path: impl IntoPath, value: Value) -> Result<bool> {
        Ok(self.mutate(scope, path, Mutation::Remove(value))?.emitted)
    }

    pub fn node(&self, id: NodeId) -> Option<&ViewNode<D::Handle>> {
        self.node_ref(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node_ref(id).map(|node| node.children.as_slice()).unwrap_or_default()
    }

    /// Phase of `id`; released nodes report `Disposed`.
    pub fn life_cycle(&self, id: NodeId) -> LifeCycle {
        self.node_ref(id).map_or(LifeCycle::Disposed, |node| node.life_cycle)
    }

    pub fn node_type(&self, id: NodeId) -> Option<NodeType> {
        self.node_ref(id).map(ViewNode::node_type)
    }

    /// Scope the bindings of `id` evaluate against.
    pub fn scope_of(&self, id: NodeId) -> Option<ScopeId> {
        self.node_ref(id).map(|node| node.scope)
    }

    /// The store of a component node.
    pub fn data_scope(&self, id: NodeId) -> Option<ScopeId> {
        match &self.node_ref(id)?.kind {
            NodeKind::Component(state) => Some(state.store),
            _ => None,
        }
    }

    pub fn data(&self, scope: ScopeId) -> Option<&Data> {
        self.scopes.data(scope)
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    /// Evaluate expression text in `scope`.
    pub fn evaluate(&self, scope: ScopeId, source: &str) -> Option<Value> {
        self.scopes.evaluate(scope, &parse_expr(source).ok()?)
    }

    /// Events declared on the node's ANode. Listening is up to the host.
    pub fn events(&self, id: NodeId) -> &[EventDecl] {
        self.node_ref(id).map(|node| node.a_node.events.as_slice()).unwrap_or_default()
    }

    pub fn handle(&self, id: NodeId) -> Option<&D::Handle> {
        self.node_ref(id)?.handle.as_ref()
    }

    /// First host handle rendered by `id`, in document order.
    pub fn first_handle(&self, id: NodeId) -> Option<D::Handle> {
        let node = self.node_ref(id)?;
        let from_children = || node.children.iter().find_map(|child| self.first_handle(*child));
        match &node.kind {
            NodeKind::Element | NodeKind::Text => node.handle.clone(),
            NodeKind::Component(_) => from_children(),
            NodeKind::For(_) | NodeKind::If(_) | NodeKind::Slot(_) => {
                from_children().or_else(|| node.handle.clone())
            }
        }
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    fn get(&self, id: NodeId) -> Result<&ViewNode<D::Handle>> {
        self.node_ref(id).ok_or(ViewError::UnknownNode(id))
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> Option<&ViewNode<D::Handle>> {
        self.nodes.get(id.raw() as usize)?.as_ref()
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut ViewNode<D::Handle>> {
        self.nodes.get_mut(id.raw() as usize)?.as_mut()
    }

    fn insert_node(&mut self, node: ViewNode<D::Handle>) -> NodeId {
        let id = NodeId::from(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        id
    }

    fn transition(&mut self, id: NodeId, next: LifeCycle) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        if node.life_cycle.can_transition_to(next) {
            node.life_cycle = next;
            true
        } else {
            warn!(?id, from = ?node.life_cycle, to = ?next, "rejected lifecycle transition");
            false
        }
    }

    /// Host handle `id` inserts its own handles into.
    fn container_of(&self, id: NodeId) -> Option<D::Handle> {
        let mut current = id;
        loop {
            let node = self.node_ref(current)?;
            if let Some(mount) = &node.mount {
                return Some(mount.clone());
            }
            let parent_id = node.parent?;
            let parent = self.node_ref(parent_id)?;
            if matches!(parent.kind, NodeKind::Element) {
                return parent.handle.clone();
            }
            current = parent_id;
        }
    }

    /// Construct (but do not attach) the node for `a_node`.
    fn build_node(
        &mut self,
        a_node: Rc<ANode>,
        parent: NodeId,
        owner: Option<NodeId>,
        scope: ScopeId,
    ) -> Result<NodeId> {
        let kind = if a_node.for_directive().is_some() {
            let item_a_node = Rc::new(a_node.without_directives(&[DirectiveName::For]));
            NodeKind::For(ForState { item_a_node })
        } else if a_node.if_condition().is_some() {
            NodeKind::If(IfState::default())
        } else if a_node.is_text() {
            NodeKind::Text
        } else if a_node.is_slot() {
            return Ok(self.build_slot(a_node, parent, owner, scope));
        } else {
            let def = a_node
                .tag_name
                .as_ref()
                .and_then(|tag| self.components.get(tag))
                .cloned();
            match def {
                Some(def) => return self.build_component(a_node, def, parent, owner, scope),
                None => NodeKind::Element,
            }
        };
        Ok(self.insert_node(ViewNode::new(a_node, Some(parent), owner, scope, kind)))
    }

    /// Build one child per ANode under `id` and attach them before `before`.
    fn build_and_attach(
        &mut self,
        id: NodeId,
        a_nodes: &[Rc<ANode>],
        owner: Option<NodeId>,
        scope: ScopeId,
        parent: &D::Handle,
        before: Option<&D::Handle>,
    ) -> Result<()> {
        for a_node in a_nodes {
            let child = self.build_node(Rc::clone(a_node), id, owner, scope)?;
            if let Some(node) = self.node_mut(id) {
                node.children.push(child);
            }
            self.attach_node(child, parent, before)?;
        }
        Ok(())
    }

    fn attach_node(&mut self, id: NodeId, parent: &D::Handle, before: Option<&D::Handle>) -> Result<()> {
        let node = self.get(id)?;
        match node.life_cycle {
            LifeCycle::Inited | LifeCycle::Created => {}
            LifeCycle::Attached => return Ok(()),
            LifeCycle::Detached => return self.reattach(id, parent, before),
            LifeCycle::Disposed => {
                warn!(?id, "attach of a disposed node");
                return Ok(());
            }
        }
        match node.node_type() {
            NodeType::Element => self.attach_element(id, parent, before),
            NodeType::Text => {
                self.attach_text(id, parent, before);
                Ok(())
            }
            NodeType::For => self.attach_for(id, parent, before),
            NodeType::If => self.attach_if(id, parent, before),
            NodeType::Slot => self.attach_slot(id, parent, before),
            NodeType::Component => self.attach_component(id, parent, before),
        }
    }

    /// Create the placeholder closing a fragment.
    fn create_stump(&mut self, id: NodeId) -> D::Handle {
        let stump = self.dom.create_handle(&self.config.stump_tag);
        if let Some(node) = self.node_mut(id) {
            node.handle = Some(stump.clone());
        }
        self.transition(id, LifeCycle::Created);
        stump
    }

    /// Insert the node's own handle and mark it attached.
    fn insert_own(&mut self, id: NodeId, parent: &D::Handle, before: Option<&D::Handle>) {
        if let Some(handle) = self.node_ref(id).and_then(|node| node.handle.clone()) {
            self.dom.insert_before(parent, &handle, before);
        }
        self.transition(id, LifeCycle::Attached);
    }

    fn reattach(&mut self, id: NodeId, parent: &D::Handle, before: Option<&D::Handle>) -> Result<()> {
        let node = self.get(id)?;
        // An element's children stay inside its handle.
        let children = match node.kind {
            NodeKind::Element | NodeKind::Text => Vec::new(),
            _ => node.children.clone(),
        };
        for child in children {
            self.attach_node(child, parent, before)?;
        }
        self.insert_own(id, parent, before);
        Ok(())
    }

    fn detach_node(&mut self, id: NodeId) {
        let Some(node) = self.node_ref(id) else {
            return;
        };
        if !node.life_cycle.is_attached() {
            return;
        }
        let handle = node.handle.clone();
        let children = node.children.clone();
        if !matches!(node.kind, NodeKind::Element | NodeKind::Text) {
            for child in children {
                self.detach_node(child);
            }
        }
        if let Some(handle) = handle {
            self.dom.remove_handle(&handle);
        }
        self.transition(id, LifeCycle::Detached);
    }

    /// Release `id` and its subtree. With `keep_attached` the handles are
    /// left in place because an ancestor's removal takes them out anyway.
    fn dispose_node(&mut self, id: NodeId, keep_attached: bool) {
        let Some(node) = self.node_ref(id) else {
            return;
        };
        let children = node.children.clone();
        let handle = node.handle.clone();
        let attached = node.life_cycle.is_attached();
        let owned_scope = node.owned_scope;
        let child_keep = match node.kind {
            NodeKind::Element | NodeKind::Text => true,
            _ => keep_attached,
        };
        let registration = match &node.kind {
            NodeKind::Slot(state) => state.registered_on,
            _ => None,
        };
        let store = match &node.kind {
            NodeKind::Component(state) => Some(state.store),
            _ => None,
        };

        for child in children {
            self.dispose_node(child, child_keep);
        }
        if !keep_attached && attached {
            if let Some(handle) = handle {
                self.dom.remove_handle(&handle);
            }
        }

        if let Some((host, own)) = registration {
            self.unregister_slot(id, host, own);
        }
        if let Some(store) = store {
            self.scheduler.discard(id);
            self.scopes.remove(store);
        }
        if let Some(scope) = owned_scope {
            self.scopes.remove(scope);
        }
        self.transition(id, LifeCycle::Disposed);
        if let Some(slot) = self.nodes.get_mut(id.raw() as usize) {
            *slot = None;
        }
    }

    /// Route a batch to the variant's update.
    fn update_node(&mut self, id: NodeId, changes: &[ChangeRecord]) {
        if changes.is_empty() {
            return;
        }
        let Some(node) = self.node_ref(id) else {
            return;
        };
        match node.node_type() {
            NodeType::Element => self.update_element(id, changes),
            NodeType::Text => self.update_text(id, changes),
            NodeType::For => self.update_for(id, changes),
            NodeType::If => self.update_if(id, changes),
            // Slot content is reached through the slot registries.
            NodeType::Slot => {}
            NodeType::Component => {
                self.update_component(id, changes);
                return;
            }
        }
        self.update_slot_children(id, changes);
    }

    fn update_children(&mut self, id: NodeId, changes: &[ChangeRecord]) {
        let children = self.children(id).to_vec();
        for child in children {
            self.update_node(child, changes);
        }
    }

    fn update_slot_children(&mut self, id: NodeId, changes: &[ChangeRecord]) {
        let slots = match self.node_ref(id) {
            Some(node) if !node.slot_children.is_empty() => node.slot_children.clone(),
            _ => return,
        };
        for slot in slots {
            self.update_slot_content(slot, changes);
        }
    }
}

/// Number of ancestors of `id`.
fn depth<H>(nodes: &[Option<ViewNode<H>>], id: NodeId) -> usize {
    let mut depth = 0;
    let mut current = nodes.get(id.raw() as usize).and_then(Option::as_ref);
    while let Some(parent) = current.and_then(|node| node.parent) {
        depth += 1;
        current = nodes.get(parent.raw() as usize).and_then(Option::as_ref);
    }
    depth
}
