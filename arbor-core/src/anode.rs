//! Abstract nodes
//!
//! An [`ANode`] is the static, data-independent description of one template
//! element: its tag, bound properties, directives and children. ANodes are
//! produced by a template front end (or by the builder methods below) and are
//! shared read-only between every view node rendered from them.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::expr::Expr;

/// Tag name that marks a slot placeholder.
pub const SLOT_TAG: &str = "slot";

/// Name of the slot that receives content without an explicit `slot` prop.
pub const DEFAULT_SLOT: &str = "____";

/// Directive keys. An ANode carries at most one directive per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveName {
    If,
    Elif,
    Else,
    For,
    Html,
}

/// A structural or behavioral annotation on an ANode.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    If(Expr),
    Elif(Expr),
    Else,
    For(ForDirective),
    /// Replace the element's children with raw content.
    Html(Expr),
}

impl Directive {
    pub fn name(&self) -> DirectiveName {
        match self {
            Directive::If(_) => DirectiveName::If,
            Directive::Elif(_) => DirectiveName::Elif,
            Directive::Else => DirectiveName::Else,
            Directive::For(_) => DirectiveName::For,
            Directive::Html(_) => DirectiveName::Html,
        }
    }
}

/// `for="item, index in list"`
#[derive(Debug, Clone, PartialEq)]
pub struct ForDirective {
    /// Name the current element is bound to in each item scope.
    pub item: String,
    /// Name the current position is bound to in each item scope.
    pub index: String,
    /// The iterated list, evaluated in the for node's scope.
    pub list: Expr,
}

impl ForDirective {
    pub fn new(item: impl Into<String>, index: impl Into<String>, list: Expr) -> Self {
        Self {
            item: item.into(),
            index: index.into(),
            list,
        }
    }
}

/// An event declaration. Listening is left to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDecl {
    pub name: String,
    pub handler: Expr,
}

/// Static description of a template node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ANode {
    /// `None` for text nodes.
    pub tag_name: Option<String>,
    /// Content of a text node.
    pub text: Option<Expr>,
    /// Element properties, or component bindings when `binds` is empty.
    pub props: IndexMap<String, Expr>,
    /// Component data bindings.
    pub binds: IndexMap<String, Expr>,
    pub events: Vec<EventDecl>,
    pub children: Vec<Rc<ANode>>,
    pub directives: IndexMap<DirectiveName, Directive>,
    /// `elif` / `else` clauses following an `if`, in declaration order.
    pub elses: Vec<Rc<ANode>>,
}

impl ANode {
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag_name: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn text(content: Expr) -> Self {
        Self {
            text: Some(content),
            ..Self::default()
        }
    }

    /// A `<slot>` placeholder; `None` names the default slot.
    pub fn slot(name: Option<&str>) -> Self {
        let node = Self::element(SLOT_TAG);
        match name {
            Some(name) => node.prop("name", Expr::String(name.to_string())),
            None => node,
        }
    }

    pub fn prop(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.props.insert(name.into(), value);
        self
    }

    pub fn bind(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.binds.insert(name.into(), value);
        self
    }

    pub fn on(mut self, name: impl Into<String>, handler: Expr) -> Self {
        self.events.push(EventDecl {
            name: name.into(),
            handler,
        });
        self
    }

    pub fn child(mut self, child: ANode) -> Self {
        self.children.push(Rc::new(child));
        self
    }

    /// Add a directive, replacing any previous one with the same key.
    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.insert(directive.name(), directive);
        self
    }

    /// Append an `elif` / `else` clause.
    pub fn or_else(mut self, clause: ANode) -> Self {
        self.elses.push(Rc::new(clause));
        self
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn is_slot(&self) -> bool {
        self.tag_name.as_deref() == Some(SLOT_TAG)
    }

    pub fn for_directive(&self) -> Option<&ForDirective> {
        match self.directives.get(&DirectiveName::For) {
            Some(Directive::For(directive)) => Some(directive),
            _ => None,
        }
    }

    pub fn if_condition(&self) -> Option<&Expr> {
        match self.directives.get(&DirectiveName::If) {
            Some(Directive::If(cond)) => Some(cond),
            _ => None,
        }
    }

    pub fn elif_condition(&self) -> Option<&Expr> {
        match self.directives.get(&DirectiveName::Elif) {
            Some(Directive::Elif(cond)) => Some(cond),
            _ => None,
        }
    }

    pub fn html(&self) -> Option<&Expr> {
        match self.directives.get(&DirectiveName::Html) {
            Some(Directive::Html(content)) => Some(content),
            _ => None,
        }
    }

    /// Bindings a component usage passes into the component's store.
    pub fn bindings(&self) -> &IndexMap<String, Expr> {
        if self.binds.is_empty() {
            &self.props
        } else {
            &self.binds
        }
    }

    /// Name of a slot placeholder.
    pub fn slot_name(&self) -> &str {
        match self.props.get("name") {
            Some(Expr::String(name)) => name,
            _ => DEFAULT_SLOT,
        }
    }

    /// Name of the slot this node is given to when used as component content.
    pub fn target_slot(&self) -> &str {
        match self.props.get("slot") {
            Some(Expr::String(name)) => name,
            _ => DEFAULT_SLOT,
        }
    }

    /// A copy without the named directives. Used to derive the per-item node
    /// of a `for` and the branch nodes of an `if`.
    pub fn without_directives(&self, names: &[DirectiveName]) -> ANode {
        let mut derived = self.clone();
        for name in names {
            derived.directives.shift_remove(name);
        }
        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expr;

    #[test]
    fn directive_keys_are_unique() {
        let node = ANode::element("li")
            .directive(Directive::If(parse_expr("a").unwrap()))
            .directive(Directive::If(parse_expr("b").unwrap()));
        assert_eq!(node.directives.len(), 1);
        assert_eq!(node.if_condition(), Some(&parse_expr("b").unwrap()));
    }

    #[test]
    fn derived_nodes_drop_only_named_directives() {
        let list = parse_expr("list").unwrap();
        let node = ANode::element("li")
            .directive(Directive::For(ForDirective::new("item", "i", list)))
            .directive(Directive::If(parse_expr("item.on").unwrap()))
            .or_else(ANode::element("p").directive(Directive::Else));

        let item = node.without_directives(&[DirectiveName::For]);
        assert!(item.for_directive().is_none());
        assert!(item.if_condition().is_some());
        assert_eq!(item.elses.len(), 1);
    }

    #[test]
    fn slot_names_default() {
        assert_eq!(ANode::slot(None).slot_name(), DEFAULT_SLOT);
        assert_eq!(ANode::slot(Some("footer")).slot_name(), "footer");
        let given = ANode::element("p").prop("slot", Expr::String("footer".into()));
        assert_eq!(given.target_slot(), "footer");
    }
}
