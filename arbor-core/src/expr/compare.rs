//! Change-path comparison.
//!
//! Before a node reacts to a change record it asks how the changed path
//! relates to the path it is bound to. The answer is a small number:
//!
//! | relation | meaning |
//! |---|---|
//! | 0 | unrelated, literal prefixes diverge |
//! | 1 | the change sits above the bound path, or feeds one of its dynamic segments |
//! | 2 | same path |
//! | 3+ | the change is below the bound path; `relation - 2` extra segments |
//!
//! For the descendant case the excess over 2 lets list nodes find the
//! segment right after the bound prefix (the item index).

use super::{evaluate, Expr, Lookup, PathKey};

/// Relationship between a changed path and a bound expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Relation(usize);

impl Relation {
    pub const UNRELATED: Relation = Relation(0);
    pub const ANCESTOR: Relation = Relation(1);
    pub const EXACT: Relation = Relation(2);

    pub fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// The numeric relation value.
    pub fn raw(self) -> usize {
        self.0
    }

    pub fn is_related(self) -> bool {
        self.0 > 0
    }

    pub fn is_exact(self) -> bool {
        self.0 == 2
    }

    /// The change addresses something strictly below the bound path.
    pub fn is_descendant(self) -> bool {
        self.0 >= 3
    }
}

/// Classify `change` (a literal accessor) against `bound`, evaluated in `scope`.
pub fn compare(change: &Expr, bound: &Expr, scope: &dyn Lookup) -> Relation {
    match bound {
        Expr::Accessor(bound_paths) => compare_accessor(change, bound_paths, scope),
        Expr::Unary(_, inner) => any_related(change, [inner.as_ref()], scope),
        Expr::Binary(_, left, right) => any_related(change, [left.as_ref(), right.as_ref()], scope),
        Expr::Conditional(cond, then, otherwise) => any_related(
            change,
            [cond.as_ref(), then.as_ref(), otherwise.as_ref()],
            scope,
        ),
        Expr::Text(parts) => any_related(change, parts.iter(), scope),
        Expr::String(_) | Expr::Number(_) | Expr::Bool(_) | Expr::Null => Relation::UNRELATED,
    }
}

fn any_related<'e>(
    change: &Expr,
    parts: impl IntoIterator<Item = &'e Expr>,
    scope: &dyn Lookup,
) -> Relation {
    if parts.into_iter().any(|part| compare(change, part, scope).is_related()) {
        Relation::ANCESTOR
    } else {
        Relation::UNRELATED
    }
}

fn compare_accessor(change: &Expr, bound_paths: &[Expr], scope: &dyn Lookup) -> Relation {
    let Expr::Accessor(change_paths) = change else {
        return Relation::UNRELATED;
    };

    let mut prefix_matches = true;
    for (i, segment) in bound_paths.iter().enumerate() {
        let literal = segment.literal_key();

        // A dynamic segment that depends on the changed data makes the whole
        // bound path move, whatever its prefix.
        if literal.is_none() && compare(change, segment, scope).is_related() {
            return Relation::ANCESTOR;
        }

        if prefix_matches && i < change_paths.len() {
            let bound_key = literal.or_else(|| {
                evaluate(segment, scope).and_then(|value| PathKey::from_value(&value))
            });
            let same = match (bound_key, change_paths[i].literal_key()) {
                (Some(bound_key), Some(change_key)) => bound_key.matches(&change_key),
                _ => false,
            };
            if !same {
                prefix_matches = false;
            }
        }
    }

    if prefix_matches {
        Relation((change_paths.len() + 2).saturating_sub(bound_paths.len()).max(1))
    } else {
        Relation::UNRELATED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_expr, read_path};
    use serde_json::{json, Value};

    struct Root(Value);

    impl Lookup for Root {
        fn lookup(&self, path: &[PathKey]) -> Option<Value> {
            read_path(&self.0, path)
        }
    }

    fn rel(change: &str, bound: &str, data: Value) -> usize {
        let change = parse_expr(change).unwrap();
        let bound = parse_expr(bound).unwrap();
        compare(&change, &bound, &Root(data)).raw()
    }

    #[test]
    fn identical_paths_are_exact() {
        assert_eq!(rel("list", "list", json!({})), 2);
        assert_eq!(rel("a.b[0]", "a.b[0]", json!({})), 2);
    }

    #[test]
    fn diverging_prefixes_are_unrelated() {
        assert_eq!(rel("a.b", "a.c", json!({})), 0);
        assert_eq!(rel("x", "list", json!({})), 0);
        assert_eq!(rel("list[1].name", "list[2].name", json!({})), 0);
    }

    #[test]
    fn ancestor_change_is_one() {
        assert_eq!(rel("a", "a.b.c", json!({})), 1);
        assert_eq!(rel("a.b", "a.b.c", json!({})), 1);
    }

    #[test]
    fn descendant_change_counts_extra_segments() {
        assert_eq!(rel("list[2]", "list", json!({})), 3);
        assert_eq!(rel("list[2].name", "list", json!({})), 4);
    }

    #[test]
    fn dynamic_segments_compare_by_value() {
        let data = json!({"i": 2});
        assert_eq!(rel("list[2].name", "list[i].name", data.clone()), 2);
        assert_eq!(rel("list[1].name", "list[i].name", data.clone()), 0);
        // The index itself changed.
        assert_eq!(rel("i", "list[i].name", data), 1);
    }

    #[test]
    fn numeric_string_keys_match_indices() {
        assert_eq!(rel("list['2']", "list[2]", json!({})), 2);
    }

    #[test]
    fn composite_expressions_relate_through_operands() {
        assert_eq!(rel("a", "!a", json!({})), 1);
        assert_eq!(rel("b.c", "a + b.c.d", json!({})), 1);
        assert_eq!(rel("z", "a ? b : c", json!({})), 0);
        assert_eq!(rel("a", "'literal'", json!({})), 0);
    }
}
