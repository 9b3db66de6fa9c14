//! Render Host
//!
//! The core never touches a real document. It drives a host through the
//! [`Dom`] capability trait, treating handles as opaque tokens.
//!
//! [`MemoryDom`] is an in-memory host that keeps a plain tree and records
//! every call it receives. It is what the tests and benchmarks render into.

use std::fmt;
use std::fmt::Write as _;

use indexmap::IndexMap;
use serde_json::Value;

/// Operations the view runtime needs from its host.
pub trait Dom {
    type Handle: Clone + PartialEq + fmt::Debug;

    /// Create a detached handle. Text nodes and placeholders use the tags
    /// configured in [`ViewConfig`](crate::config::ViewConfig).
    fn create_handle(&mut self, tag: &str) -> Self::Handle;

    /// Insert `child` into `parent` before `before`, or append when `before`
    /// is `None`. A child that is already placed elsewhere is moved.
    fn insert_before(
        &mut self,
        parent: &Self::Handle,
        child: &Self::Handle,
        before: Option<&Self::Handle>,
    );

    /// Take a handle out of its parent. The handle stays valid and can be
    /// inserted again.
    fn remove_handle(&mut self, handle: &Self::Handle);

    fn set_property(&mut self, handle: &Self::Handle, name: &str, value: &Value);

    fn set_content(&mut self, handle: &Self::Handle, content: &str);
}

/// Handle into a [`MemoryDom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomHandle(usize);

/// A recorded host call.
#[derive(Debug, Clone, PartialEq)]
pub enum DomOp {
    Create { handle: DomHandle, tag: String },
    Insert {
        parent: DomHandle,
        child: DomHandle,
        before: Option<DomHandle>,
    },
    Remove { handle: DomHandle },
    SetProperty {
        handle: DomHandle,
        name: String,
        value: Value,
    },
    SetContent { handle: DomHandle, content: String },
}

#[derive(Debug, Clone, Default)]
struct MemNode {
    tag: String,
    props: IndexMap<String, Value>,
    content: String,
    children: Vec<DomHandle>,
    parent: Option<DomHandle>,
}

/// Tree-backed host that logs every operation.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    nodes: Vec<MemNode>,
    ops: Vec<DomOp>,
}

impl MemoryDom {
    /// A host with a single `#root` container.
    pub fn new() -> Self {
        Self {
            nodes: vec![MemNode {
                tag: "#root".to_string(),
                ..MemNode::default()
            }],
            ops: Vec::new(),
        }
    }

    /// The root container.
    pub fn container(&self) -> DomHandle {
        DomHandle(0)
    }

    /// Every call received since the last [`clear_ops`](Self::clear_ops).
    pub fn ops(&self) -> &[DomOp] {
        &self.ops
    }

    /// Number of calls received since the last [`clear_ops`](Self::clear_ops).
    pub fn mutation_count(&self) -> usize {
        self.ops.len()
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Number of handles ever created, the container included.
    pub fn handle_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn tag(&self, handle: DomHandle) -> Option<&str> {
        self.nodes.get(handle.0).map(|node| node.tag.as_str())
    }

    pub fn children(&self, handle: DomHandle) -> &[DomHandle] {
        self.nodes
            .get(handle.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn parent(&self, handle: DomHandle) -> Option<DomHandle> {
        self.nodes.get(handle.0)?.parent
    }

    pub fn property(&self, handle: DomHandle, name: &str) -> Option<&Value> {
        self.nodes.get(handle.0)?.props.get(name)
    }

    pub fn content(&self, handle: DomHandle) -> Option<&str> {
        self.nodes.get(handle.0).map(|node| node.content.as_str())
    }

    /// Children of `handle` that are elements, skipping text and placeholders.
    pub fn element_children(&self, handle: DomHandle) -> Vec<DomHandle> {
        self.children(handle)
            .iter()
            .copied()
            .filter(|child| self.tag(*child).is_some_and(|tag| !tag.starts_with('#')))
            .collect()
    }

    /// HTML-like rendering of the children of `handle`. Tags starting with
    /// `#` render as their text content; an `innerHTML` property replaces an
    /// element's children.
    pub fn render(&self, handle: DomHandle) -> String {
        let mut out = String::new();
        for child in self.children(handle) {
            self.render_node(*child, &mut out);
        }
        out
    }

    fn render_node(&self, handle: DomHandle, out: &mut String) {
        let Some(node) = self.nodes.get(handle.0) else {
            return;
        };
        if node.tag.starts_with('#') {
            out.push_str(&node.content);
            return;
        }

        let _ = write!(out, "<{}", node.tag);
        for (name, value) in &node.props {
            match value {
                Value::Null => {}
                Value::String(s) if name != "innerHTML" => {
                    let _ = write!(out, " {name}=\"{s}\"");
                }
                _ if name == "innerHTML" => {}
                other => {
                    let _ = write!(out, " {name}=\"{other}\"");
                }
            }
        }
        out.push('>');
        match node.props.get("innerHTML") {
            Some(Value::String(html)) => out.push_str(html),
            _ => {
                for child in &node.children {
                    self.render_node(*child, out);
                }
            }
        }
        let _ = write!(out, "</{}>", node.tag);
    }

    fn detach(&mut self, handle: DomHandle) {
        let Some(parent) = self.nodes.get_mut(handle.0).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent.0) {
            parent.children.retain(|child| *child != handle);
        }
    }
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom for MemoryDom {
    type Handle = DomHandle;

    fn create_handle(&mut self, tag: &str) -> DomHandle {
        let handle = DomHandle(self.nodes.len());
        self.nodes.push(MemNode {
            tag: tag.to_string(),
            ..MemNode::default()
        });
        self.ops.push(DomOp::Create {
            handle,
            tag: tag.to_string(),
        });
        handle
    }

    fn insert_before(&mut self, parent: &DomHandle, child: &DomHandle, before: Option<&DomHandle>) {
        self.ops.push(DomOp::Insert {
            parent: *parent,
            child: *child,
            before: before.copied(),
        });
        self.detach(*child);
        let Some(parent_node) = self.nodes.get_mut(parent.0) else {
            return;
        };
        let position = before
            .and_then(|before| parent_node.children.iter().position(|c| c == before))
            .unwrap_or(parent_node.children.len());
        parent_node.children.insert(position, *child);
        if let Some(child_node) = self.nodes.get_mut(child.0) {
            child_node.parent = Some(*parent);
        }
    }

    fn remove_handle(&mut self, handle: &DomHandle) {
        self.ops.push(DomOp::Remove { handle: *handle });
        self.detach(*handle);
    }

    fn set_property(&mut self, handle: &DomHandle, name: &str, value: &Value) {
        self.ops.push(DomOp::SetProperty {
            handle: *handle,
            name: name.to_string(),
            value: value.clone(),
        });
        if let Some(node) = self.nodes.get_mut(handle.0) {
            node.props.insert(name.to_string(), value.clone());
        }
    }

    fn set_content(&mut self, handle: &DomHandle, content: &str) {
        self.ops.push(DomOp::SetContent {
            handle: *handle,
            content: content.to_string(),
        });
        if let Some(node) = self.nodes.get_mut(handle.0) {
            node.content = content.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_before_orders_children() {
        let mut dom = MemoryDom::new();
        let root = dom.container();
        let a = dom.create_handle("a");
        let b = dom.create_handle("b");
        let c = dom.create_handle("c");
        dom.insert_before(&root, &a, None);
        dom.insert_before(&root, &c, None);
        dom.insert_before(&root, &b, Some(&c));
        assert_eq!(dom.children(root), &[a, b, c]);

        // Moving re-parents.
        dom.insert_before(&root, &c, Some(&a));
        assert_eq!(dom.children(root), &[c, a, b]);
    }

    #[test]
    fn render_skips_placeholders() {
        let mut dom = MemoryDom::new();
        let root = dom.container();
        let p = dom.create_handle("p");
        let text = dom.create_handle("#text");
        let stump = dom.create_handle("#comment");
        dom.set_content(&text, "hi");
        dom.set_property(&p, "class", &json!("x"));
        dom.insert_before(&p, &text, None);
        dom.insert_before(&root, &p, None);
        dom.insert_before(&root, &stump, None);
        assert_eq!(dom.render(root), "<p class=\"x\">hi</p>");
        assert_eq!(dom.element_children(root), vec![p]);

        dom.remove_handle(&p);
        assert_eq!(dom.render(root), "");
        assert_eq!(dom.parent(p), None);
    }
}
