//! Change Records
//!
//! Every mutator on a [`Data`](super::Data) store describes what it did as a
//! [`ChangeRecord`]. Records always address their target with a literal
//! accessor: dynamic segments are resolved before the record is emitted, so
//! comparing a record against a bound expression never has to re-evaluate the
//! record itself.

use serde_json::Value;

use crate::expr::{Expr, PathKey};

/// Options carried by a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeOption {
    /// Emit the record even if the value did not change.
    pub force: bool,
}

impl ChangeOption {
    pub fn force() -> Self {
        Self { force: true }
    }
}

/// What happened at the addressed path.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    /// The path was overwritten.
    Set { value: Value },

    /// The array at the path was spliced.
    Splice {
        /// Start position after clamping.
        index: usize,
        /// Number of elements actually removed.
        delete_count: usize,
        insertions: Vec<Value>,
        removed: Vec<Value>,
    },
}

/// One data mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Literal accessor naming the changed path.
    pub expr: Expr,
    pub kind: ChangeKind,
    pub option: ChangeOption,
}

impl ChangeRecord {
    pub fn set(expr: Expr, value: Value) -> Self {
        Self {
            expr,
            kind: ChangeKind::Set { value },
            option: ChangeOption::default(),
        }
    }

    pub fn splice(
        expr: Expr,
        index: usize,
        delete_count: usize,
        insertions: Vec<Value>,
        removed: Vec<Value>,
    ) -> Self {
        Self {
            expr,
            kind: ChangeKind::Splice {
                index,
                delete_count,
                insertions,
                removed,
            },
            option: ChangeOption::default(),
        }
    }

    pub fn with_option(mut self, option: ChangeOption) -> Self {
        self.option = option;
        self
    }

    pub fn is_set(&self) -> bool {
        matches!(self.kind, ChangeKind::Set { .. })
    }

    pub fn is_splice(&self) -> bool {
        matches!(self.kind, ChangeKind::Splice { .. })
    }

    /// The same change, addressed by another expression.
    pub fn with_expr(&self, expr: Expr) -> Self {
        Self {
            expr,
            kind: self.kind.clone(),
            option: self.option,
        }
    }

    /// Literal keys of the changed path. Records built by the store never
    /// contain dynamic segments; any that slipped in end the path.
    pub fn keys(&self) -> Vec<PathKey> {
        self.expr
            .paths()
            .unwrap_or_default()
            .iter()
            .map_while(Expr::literal_key)
            .collect()
    }

    /// Net change in array length caused by a splice, zero for a set.
    pub fn length_delta(&self) -> isize {
        match &self.kind {
            ChangeKind::Set { .. } => 0,
            ChangeKind::Splice {
                delete_count,
                insertions,
                ..
            } => insertions.len() as isize - *delete_count as isize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_and_delta() {
        let record = ChangeRecord::splice(
            Expr::accessor(["list"]),
            1,
            1,
            vec![json!(9), json!(9)],
            vec![json!(2)],
        );
        assert_eq!(record.keys(), vec![PathKey::from("list")]);
        assert_eq!(record.length_delta(), 1);
        assert!(record.is_splice());

        let moved = record.with_expr(Expr::accessor(["other"]));
        assert_eq!(moved.kind, record.kind);
        assert_eq!(ChangeRecord::set(Expr::accessor(["a"]), json!(1)).length_delta(), 0);
    }
}
