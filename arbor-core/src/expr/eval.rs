//! Expression evaluation.
//!
//! Evaluation never fails. A missing or `null` intermediate makes the whole
//! accessor `undefined`, represented as `None`.

use serde_json::Value;

use super::{number_value, BinaryOp, Expr, KeyPath, PathKey, UnaryOp};

/// Read access to a scope chain by literal key path.
pub trait Lookup {
    /// Value at `path`, or `None` when any step is missing.
    fn lookup(&self, path: &[PathKey]) -> Option<Value>;
}

/// Evaluate `expr` against `scope`.
pub fn evaluate(expr: &Expr, scope: &dyn Lookup) -> Option<Value> {
    match expr {
        Expr::Accessor(paths) => {
            let keys = resolve_path(paths, scope)?;
            scope.lookup(&keys)
        }
        Expr::String(s) => Some(Value::String(s.clone())),
        Expr::Number(n) => number_value(*n),
        Expr::Bool(b) => Some(Value::Bool(*b)),
        Expr::Null => Some(Value::Null),
        Expr::Unary(UnaryOp::Not, inner) => {
            Some(Value::Bool(!truthy(evaluate(inner, scope).as_ref())))
        }
        Expr::Unary(UnaryOp::Neg, inner) => {
            number_value(-to_number(evaluate(inner, scope).as_ref()))
        }
        Expr::Binary(op, left, right) => binary(*op, left, right, scope),
        Expr::Conditional(cond, then, otherwise) => {
            if truthy(evaluate(cond, scope).as_ref()) {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
        Expr::Text(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&to_display_string(evaluate(part, scope).as_ref()));
            }
            Some(Value::String(out))
        }
    }
}

/// Turn accessor segments into literal keys, evaluating dynamic segments
/// against `scope`. `None` if a dynamic segment does not resolve to a key.
pub fn resolve_path(paths: &[Expr], scope: &dyn Lookup) -> Option<KeyPath> {
    let mut keys = KeyPath::with_capacity(paths.len());
    for segment in paths {
        let key = match segment.literal_key() {
            Some(key) => key,
            None => PathKey::from_value(&evaluate(segment, scope)?)?,
        };
        keys.push(key);
    }
    Some(keys)
}

/// Follow `path` from `root`. `length` is understood on arrays and strings.
pub fn read_path(root: &Value, path: &[PathKey]) -> Option<Value> {
    let mut current = root;
    for (i, key) in path.iter().enumerate() {
        let last = i + 1 == path.len();
        current = match current {
            Value::Object(map) => map.get(key.as_str().as_ref())?,
            Value::Array(items) => match key.as_index() {
                Some(index) => items.get(index)?,
                None if last && key.is_key("length") => return Some(Value::from(items.len())),
                None => return None,
            },
            Value::String(s) if last && key.is_key("length") => {
                return Some(Value::from(s.chars().count()))
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Script truthiness; `undefined` is falsy.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |n| n != 0.0 && !n.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Text form used for text nodes and string concatenation.
/// `undefined` and `null` render as the empty string.
pub fn to_display_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) => super::format_number(f),
            None => n.to_string(),
        },
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Some(_) => f64::NAN,
    }
}

fn loose_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (None | Some(Value::Null), _) | (_, None | Some(Value::Null)) => false,
        (Some(Value::String(a)), Some(Value::String(b))) => a == b,
        (Some(a @ (Value::Number(_) | Value::String(_) | Value::Bool(_))), Some(b))
            if matches!(b, Value::Number(_) | Value::String(_) | Value::Bool(_)) =>
        {
            to_number(Some(a)) == to_number(Some(b))
        }
        (Some(a), Some(b)) => a == b,
    }
}

fn strict_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, scope: &dyn Lookup) -> Option<Value> {
    let l = evaluate(left, scope);
    match op {
        BinaryOp::And => return if truthy(l.as_ref()) { evaluate(right, scope) } else { l },
        BinaryOp::Or => return if truthy(l.as_ref()) { l } else { evaluate(right, scope) },
        _ => {}
    }

    let r = evaluate(right, scope);
    let (l, r) = (l.as_ref(), r.as_ref());
    match op {
        BinaryOp::Add => {
            if matches!(l, Some(Value::String(_))) || matches!(r, Some(Value::String(_))) {
                let mut joined = to_display_string(l);
                joined.push_str(&to_display_string(r));
                Some(Value::String(joined))
            } else {
                number_value(to_number(l) + to_number(r))
            }
        }
        BinaryOp::Sub => number_value(to_number(l) - to_number(r)),
        BinaryOp::Mul => number_value(to_number(l) * to_number(r)),
        BinaryOp::Div => number_value(to_number(l) / to_number(r)),
        BinaryOp::Mod => number_value(to_number(l) % to_number(r)),
        BinaryOp::Eq => Some(Value::Bool(loose_eq(l, r))),
        BinaryOp::NotEq => Some(Value::Bool(!loose_eq(l, r))),
        BinaryOp::StrictEq => Some(Value::Bool(strict_eq(l, r))),
        BinaryOp::StrictNotEq => Some(Value::Bool(!strict_eq(l, r))),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
            let ordering = match (l, r) {
                (Some(Value::String(a)), Some(Value::String(b))) => Some(a.cmp(b)),
                _ => to_number(l).partial_cmp(&to_number(r)),
            };
            let result = ordering.map_or(false, |ordering| match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::LtEq => ordering.is_le(),
                _ => ordering.is_ge(),
            });
            Some(Value::Bool(result))
        }
        BinaryOp::And | BinaryOp::Or => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expr;
    use serde_json::json;

    struct Root(Value);

    impl Lookup for Root {
        fn lookup(&self, path: &[PathKey]) -> Option<Value> {
            read_path(&self.0, path)
        }
    }

    fn eval(source: &str, data: Value) -> Option<Value> {
        evaluate(&parse_expr(source).unwrap(), &Root(data))
    }

    #[test]
    fn accessor_through_missing_intermediate_is_undefined() {
        assert_eq!(eval("a.b.c", json!({"a": {}})), None);
        assert_eq!(eval("a.b.c", json!({"a": {"b": null}})), None);
        assert_eq!(eval("a.b", json!({"a": {"b": null}})), Some(Value::Null));
    }

    #[test]
    fn dynamic_segments_resolve_against_scope() {
        let data = json!({"list": ["x", "y", "z"], "i": 2, "sel": {"k": "name"}, "o": {"name": 7}});
        assert_eq!(eval("list[i]", data.clone()), Some(json!("z")));
        assert_eq!(eval("o[sel.k]", data.clone()), Some(json!(7)));
        assert_eq!(eval("list[missing]", data), None);
    }

    #[test]
    fn length_of_arrays_and_strings() {
        let data = json!({"list": [1, 2, 3], "s": "héllo"});
        assert_eq!(eval("list.length", data.clone()), Some(json!(3)));
        assert_eq!(eval("s.length", data), Some(json!(5)));
    }

    #[test]
    fn operators_follow_script_semantics() {
        let data = json!({"n": 2, "s": "a", "empty": ""});
        assert_eq!(eval("n + 1", data.clone()), Some(json!(3)));
        assert_eq!(eval("s + n", data.clone()), Some(json!("a2")));
        assert_eq!(eval("n == '2'", data.clone()), Some(json!(true)));
        assert_eq!(eval("n === '2'", data.clone()), Some(json!(false)));
        assert_eq!(eval("empty || 'fallback'", data.clone()), Some(json!("fallback")));
        assert_eq!(eval("!missing", data.clone()), Some(json!(true)));
        assert_eq!(eval("n > 1 ? 'big' : 'small'", data.clone()), Some(json!("big")));
        assert_eq!(eval("missing + 1", data), None);
    }

    #[test]
    fn text_interpolation_skips_undefined() {
        let expr = crate::expr::parse_text("Hi {{name}}{{missing}}!").unwrap();
        assert_eq!(evaluate(&expr, &Root(json!({"name": "Ann"}))), Some(json!("Hi Ann!")));
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(""))));
        assert!(truthy(Some(&json!([]))));
        assert!(truthy(Some(&json!("0"))));
    }
}
