//! Element nodes.

use std::rc::Rc;

use serde_json::Value;

use crate::data::ChangeRecord;
use crate::dom::Dom;
use crate::error::Result;
use crate::expr::to_display_string;

use super::{LifeCycle, NodeId, View};

/// Prop that routes content into a named slot; never rendered.
const SLOT_PROP: &str = "slot";

/// Property set from an `html` directive.
const HTML_PROP: &str = "innerHTML";

impl<D: Dom> View<D> {
    pub(super) fn attach_element(
        &mut self,
        id: NodeId,
        parent: &D::Handle,
        before: Option<&D::Handle>,
    ) -> Result<()> {
        let Some(node) = self.node_ref(id) else {
            return Ok(());
        };
        let a_node = Rc::clone(&node.a_node);
        let (scope, owner) = (node.scope, node.owner);

        let handle = self
            .dom
            .create_handle(a_node.tag_name.as_deref().unwrap_or_default());
        if let Some(node) = self.node_mut(id) {
            node.handle = Some(handle.clone());
        }
        self.transition(id, LifeCycle::Created);

        for (name, expr) in &a_node.props {
            if name == SLOT_PROP {
                continue;
            }
            let value = self.scopes.evaluate(scope, expr).unwrap_or(Value::Null);
            self.dom.set_property(&handle, name, &value);
        }
        self.dom.insert_before(parent, &handle, before);

        if let Some(html) = a_node.html() {
            let content = to_display_string(self.scopes.evaluate(scope, html).as_ref());
            self.dom.set_property(&handle, HTML_PROP, &Value::String(content));
        } else {
            self.build_and_attach(id, &a_node.children, owner, scope, &handle, None)?;
        }
        self.transition(id, LifeCycle::Attached);
        Ok(())
    }

    /// Re-evaluate the props some change relates to, then pass the batch to
    /// the children.
    pub(super) fn update_element(&mut self, id: NodeId, changes: &[ChangeRecord]) {
        let Some(node) = self.node_ref(id) else {
            return;
        };
        let Some(handle) = node.handle.clone() else {
            // Not rendered yet; attaching will evaluate everything fresh.
            return;
        };
        let a_node = Rc::clone(&node.a_node);
        let scope = node.scope;

        for (name, expr) in &a_node.props {
            if name == SLOT_PROP || expr.is_constant() {
                continue;
            }
            let related = changes
                .iter()
                .any(|change| self.scopes.compare(scope, &change.expr, expr).is_related());
            if related {
                let value = self.scopes.evaluate(scope, expr).unwrap_or(Value::Null);
                self.dom.set_property(&handle, name, &value);
            }
        }

        match a_node.html() {
            Some(html) => {
                let related = changes
                    .iter()
                    .any(|change| self.scopes.compare(scope, &change.expr, html).is_related());
                if related {
                    let content = to_display_string(self.scopes.evaluate(scope, html).as_ref());
                    self.dom.set_property(&handle, HTML_PROP, &Value::String(content));
                }
            }
            None => self.update_children(id, changes),
        }
    }
}
