//! Text nodes.

use crate::data::ChangeRecord;
use crate::dom::Dom;
use crate::expr::to_display_string;

use super::{LifeCycle, NodeId, View};

impl<D: Dom> View<D> {
    pub(super) fn attach_text(&mut self, id: NodeId, parent: &D::Handle, before: Option<&D::Handle>) {
        let Some(content) = self.text_content(id) else {
            return;
        };
        let handle = self.dom.create_handle(&self.config.text_tag);
        self.dom.set_content(&handle, &content);
        if let Some(node) = self.node_mut(id) {
            node.handle = Some(handle);
        }
        self.transition(id, LifeCycle::Created);
        self.insert_own(id, parent, before);
    }

    pub(super) fn update_text(&mut self, id: NodeId, changes: &[ChangeRecord]) {
        let Some(node) = self.node_ref(id) else {
            return;
        };
        let (Some(handle), Some(text)) = (node.handle.clone(), node.a_node.text.as_ref()) else {
            return;
        };
        let related = changes
            .iter()
            .any(|change| self.scopes.compare(node.scope, &change.expr, text).is_related());
        if !related {
            return;
        }
        if let Some(content) = self.text_content(id) {
            self.dom.set_content(&handle, &content);
        }
    }

    fn text_content(&self, id: NodeId) -> Option<String> {
        let node = self.node_ref(id)?;
        let text = node.a_node.text.as_ref()?;
        Some(to_display_string(self.scopes.evaluate(node.scope, text).as_ref()))
    }
}
