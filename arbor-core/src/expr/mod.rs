//! Expressions
//!
//! Every binding in a template (a property value, a text interpolation, an
//! `if` guard, a `for` list) is an [`Expr`]. The runtime only ever needs three
//! things from an expression:
//!
//! - evaluate it against a scope chain ([`evaluate`]),
//! - decide whether a change record can affect it ([`compare`]),
//! - turn an accessor into a literal key path for reads and writes
//!   ([`resolve_path`]).
//!
//! # Accessor paths
//!
//! An accessor is an ordered list of segments. The first segment is always a
//! literal root key. Later segments are either literals (`a.b`, `a[0]`,
//! `a["b"]`) or dynamic expressions (`a[i]`, `a[sel.key]`) that are evaluated
//! against the scope before use. Change records only ever carry literal
//! segments: dynamic ones are resolved when the mutation is applied.

mod compare;
mod eval;
mod parse;

pub use compare::{compare, Relation};
pub use eval::{evaluate, read_path, resolve_path, to_display_string, truthy, Lookup};
pub use parse::{parse_accessor, parse_expr, parse_text};

use std::borrow::Cow;
use std::fmt;

use serde_json::Value;
use smallvec::SmallVec;

/// A resolved key path, as used for reads and writes.
pub type KeyPath = SmallVec<[PathKey; 4]>;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// An immutable expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A path into the scope: root key followed by literal or dynamic segments.
    Accessor(Vec<Expr>),
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `cond ? then : otherwise`
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Interpolated text: literal string parts and embedded expressions,
    /// concatenated in order.
    Text(Vec<Expr>),
}

impl Expr {
    /// Build an accessor from literal keys.
    pub fn accessor<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<PathKey>,
    {
        Expr::Accessor(keys.into_iter().map(|k| k.into().to_expr()).collect())
    }

    /// Build a literal accessor from a resolved key path.
    pub fn from_keys(keys: &[PathKey]) -> Self {
        Expr::Accessor(keys.iter().map(PathKey::to_expr).collect())
    }

    /// The segments of an accessor, `None` for any other expression.
    pub fn paths(&self) -> Option<&[Expr]> {
        match self {
            Expr::Accessor(paths) => Some(paths),
            _ => None,
        }
    }

    /// Whether this is a literal that can act as a path segment as-is.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::String(_) | Expr::Number(_) | Expr::Bool(_) | Expr::Null
        )
    }

    /// Whether evaluating this expression can depend on the scope at all.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Accessor(_) => false,
            Expr::Unary(_, inner) => inner.is_constant(),
            Expr::Binary(_, left, right) => left.is_constant() && right.is_constant(),
            Expr::Conditional(cond, then, otherwise) => {
                cond.is_constant() && then.is_constant() && otherwise.is_constant()
            }
            Expr::Text(parts) => parts.iter().all(Expr::is_constant),
            _ => true,
        }
    }

    /// The path key of a literal segment.
    pub fn literal_key(&self) -> Option<PathKey> {
        match self {
            Expr::String(s) => Some(PathKey::Key(s.clone())),
            Expr::Number(n) => Some(PathKey::from_number(*n)),
            Expr::Bool(b) => Some(PathKey::Key(b.to_string())),
            Expr::Null => Some(PathKey::Key("null".to_string())),
            _ => None,
        }
    }

    /// Root key of an accessor.
    pub fn root_key(&self) -> Option<PathKey> {
        self.paths()?.first()?.literal_key()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Accessor(paths) => {
                for (i, segment) in paths.iter().enumerate() {
                    match segment {
                        Expr::String(s) if i == 0 => write!(f, "{s}")?,
                        Expr::String(s) if is_identifier(s) => write!(f, ".{s}")?,
                        Expr::String(s) => write!(f, "[{s:?}]")?,
                        other => write!(f, "[{other}]")?,
                    }
                }
                Ok(())
            }
            Expr::String(s) => write!(f, "{s:?}"),
            Expr::Number(n) => write!(f, "{}", format_number(*n)),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Null => write!(f, "null"),
            Expr::Unary(UnaryOp::Not, inner) => write!(f, "!{inner}"),
            Expr::Unary(UnaryOp::Neg, inner) => write!(f, "-{inner}"),
            Expr::Binary(op, left, right) => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Conditional(cond, then, otherwise) => {
                write!(f, "({cond} ? {then} : {otherwise})")
            }
            Expr::Text(parts) => {
                for part in parts {
                    match part {
                        Expr::String(s) => write!(f, "{s}")?,
                        other => write!(f, "{{{{{other}}}}}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// One literal step of a resolved path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    Key(String),
    Index(usize),
}

impl PathKey {
    /// Key for a number; integral non-negative values become indices.
    pub fn from_number(n: f64) -> Self {
        if n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64 {
            PathKey::Index(n as usize)
        } else {
            PathKey::Key(format_number(n))
        }
    }

    /// Key for an evaluated dynamic segment. Objects and arrays cannot key a path.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(PathKey::Key(s.clone())),
            Value::Number(n) => n.as_f64().map(PathKey::from_number),
            Value::Bool(b) => Some(PathKey::Key(b.to_string())),
            Value::Null => Some(PathKey::Key("null".to_string())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Array index, accepting canonical numeric strings.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathKey::Index(i) => Some(*i),
            PathKey::Key(s) => s.parse::<usize>().ok().filter(|i| i.to_string() == *s),
        }
    }

    /// Object key form.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            PathKey::Key(s) => Cow::Borrowed(s),
            PathKey::Index(i) => Cow::Owned(i.to_string()),
        }
    }

    pub fn is_key(&self, name: &str) -> bool {
        matches!(self, PathKey::Key(s) if s == name)
    }

    /// Loose key equality: `2` and `"2"` address the same slot.
    pub fn matches(&self, other: &PathKey) -> bool {
        match (self, other) {
            (PathKey::Key(a), PathKey::Key(b)) => a == b,
            (PathKey::Index(a), PathKey::Index(b)) => a == b,
            (PathKey::Index(i), key @ PathKey::Key(_))
            | (key @ PathKey::Key(_), PathKey::Index(i)) => key.as_index() == Some(*i),
        }
    }

    pub fn to_expr(&self) -> Expr {
        match self {
            PathKey::Key(s) => Expr::String(s.clone()),
            PathKey::Index(i) => Expr::Number(*i as f64),
        }
    }
}

impl From<&str> for PathKey {
    fn from(s: &str) -> Self {
        PathKey::Key(s.to_string())
    }
}

impl From<String> for PathKey {
    fn from(s: String) -> Self {
        PathKey::Key(s)
    }
}

impl From<usize> for PathKey {
    fn from(i: usize) -> Self {
        PathKey::Index(i)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Anything that can name a write target.
pub trait IntoPath {
    fn into_path(self) -> Result<Expr, crate::error::ExprError>;
}

impl IntoPath for &str {
    fn into_path(self) -> Result<Expr, crate::error::ExprError> {
        parse_accessor(self)
    }
}

impl IntoPath for &String {
    fn into_path(self) -> Result<Expr, crate::error::ExprError> {
        parse_accessor(self)
    }
}

impl IntoPath for Expr {
    fn into_path(self) -> Result<Expr, crate::error::ExprError> {
        Ok(self)
    }
}

impl IntoPath for &Expr {
    fn into_path(self) -> Result<Expr, crate::error::ExprError> {
        Ok(self.clone())
    }
}

/// Format a number the way script engines print it (`3`, not `3.0`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Convert an `f64` into a JSON value, preferring integers so results
/// compare equal to `json!(3)`. Non-finite results have no JSON form.
pub fn number_value(n: f64) -> Option<Value> {
    if !n.is_finite() {
        None
    } else if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_992.0 {
        Some(Value::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
