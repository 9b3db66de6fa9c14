//! Arbor Core
//!
//! This crate provides the change propagation engine behind the Arbor view
//! runtime. It implements:
//!
//! - Path-mutable data stores that log every mutation as a change record
//! - A small expression language with change-path comparison
//! - A view tree (elements, text, lists, conditionals, slots, components)
//!   that reacts to change records with minimal host mutations
//! - A flush scheduler that batches changes per component
//!
//! # Architecture
//!
//! - `anode`: the parsed template tree the view is built from
//! - `expr`: expressions, evaluation and change-path comparison
//! - `data`: stores, change records and the scope chain
//! - `view`: view nodes and the propagation algorithm
//! - `scheduler`: pending batches and the flush state machine
//! - `dom`: the host tree abstraction plus an in-memory implementation
//!
//! # Example
//!
//! ```rust
//! use arbor_core::anode::{ANode, Directive, ForDirective};
//! use arbor_core::dom::MemoryDom;
//! use arbor_core::expr::parse_expr;
//! use arbor_core::view::View;
//! use serde_json::json;
//!
//! let item = ANode::element("li")
//!     .child(ANode::text(parse_expr("item").unwrap()))
//!     .directive(Directive::For(ForDirective::new("item", "i", parse_expr("list").unwrap())));
//! let template = ANode::element("ul").child(item);
//!
//! let mut view = View::new(MemoryDom::new());
//! let container = view.dom().container();
//! let root = view.bind_and_render(template, json!({"list": ["a", "b"]}), container).unwrap();
//! let scope = view.data_scope(root).unwrap();
//!
//! view.push(scope, "list", json!("c")).unwrap();
//! view.flush();
//! assert_eq!(view.dom().render(container), "<ul><li>a</li><li>b</li><li>c</li></ul>");
//! ```

pub mod anode;
pub mod config;
pub mod data;
pub mod dom;
pub mod error;
pub mod expr;
pub mod scheduler;
pub mod view;

pub use anode::ANode;
pub use config::{FlushMode, ViewConfig};
pub use data::{ChangeRecord, Data, Mutation};
pub use dom::{Dom, MemoryDom};
pub use error::{DataError, ExprError, Result, ViewError};
pub use view::{NodeId, View};
