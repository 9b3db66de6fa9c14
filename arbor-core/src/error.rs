//! Error types
//!
//! Evaluation never fails: a path that runs through a missing value resolves
//! to `undefined` (`None`). Errors are reserved for malformed expression text,
//! writes that do not fit the shape of the data they address, and lookups of
//! nodes or scopes that no longer exist.

use thiserror::Error;

use crate::data::ScopeId;
use crate::view::NodeId;

/// Result type for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;

/// Errors produced while parsing expression text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Parse error in `{input}` at {position}: {message}")]
    Parse {
        /// The full source text
        input: String,
        /// Byte offset of the offending token
        position: usize,
        /// What went wrong
        message: String,
    },
}

/// Errors produced by data store mutators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// The container at `path` has the wrong shape for the operation.
    #[error("Path mismatch at `{path}`: expected {expected}, found {found}")]
    PathMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The expression cannot be used as a write target.
    #[error("Invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    /// The binding is derived from list position and cannot be assigned.
    #[error("Binding `{name}` is read-only")]
    ReadOnlyBinding { name: String },

    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// Errors surfaced by the view runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Expression error: {0}")]
    Expr(#[from] ExprError),

    #[error("Unknown scope {0:?}")]
    UnknownScope(ScopeId),

    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("Configuration error: {0}")]
    Config(String),
}
