//! Data Stores
//!
//! A [`Data`] store is a root object of `serde_json` values addressed by
//! accessor paths. Mutators change the value in place and describe what they
//! did as a [`ChangeRecord`] appended to the store's change log. Whoever owns
//! the store drains the log with [`Data::take_changes`] and propagates it.
//!
//! # Mutators
//!
//! | mutator | record |
//! |---|---|
//! | `set(path, v)` | `Set { value }`, or nothing when `v` equals the current value |
//! | `splice(path, start, count, items)` | `Splice` with the clamped start and the removed values |
//! | `push` / `pop` / `shift` / `unshift` | `Splice` at the end or the front |
//! | `remove(path, v)` | `Splice` of the first element equal to `v`, or nothing |
//!
//! List operations require an array at the path and fail with
//! [`DataError::PathMismatch`] otherwise. `set` creates missing intermediates.

mod change;
mod scope;

pub use change::{ChangeKind, ChangeOption, ChangeRecord};
pub use scope::{Scope, ScopeId, ScopeRef, Scopes};

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::DataError;
use crate::expr::{evaluate, parse_expr, read_path, resolve_path, Expr, IntoPath, KeyPath, Lookup, PathKey};

/// Identifies a registered change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

type Listener = Box<dyn FnMut(&ChangeRecord)>;

/// A path mutation, applied to an already resolved key path.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Set { value: Value, option: ChangeOption },
    /// Negative `index` counts from the end; `delete_count: None` removes
    /// everything from `index` on.
    Splice {
        index: isize,
        delete_count: Option<usize>,
        insertions: Vec<Value>,
    },
    Push(Value),
    Pop,
    Shift,
    Unshift(Value),
    /// Remove the first element equal to the value.
    Remove(Value),
}

/// What a mutation did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationResult {
    /// Values taken out of the array.
    pub removed: Vec<Value>,
    /// Array length afterwards; zero for `Set`.
    pub length: usize,
    /// Whether a change record was emitted.
    pub emitted: bool,
}

/// A path-mutable store with a change log.
pub struct Data {
    raw: Value,
    log: Vec<ChangeRecord>,
    listeners: IndexMap<ListenerId, Listener>,
    next_listener: u32,
}

impl Data {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            raw: Value::Object(Map::new()),
            log: Vec::new(),
            listeners: IndexMap::new(),
            next_listener: 0,
        }
    }

    /// A store seeded with `value`, which must be an object (or `null`).
    pub fn from_value(value: Value) -> Result<Self, DataError> {
        let mut data = Self::new();
        match value {
            Value::Object(map) => data.raw = Value::Object(map),
            Value::Null => {}
            other => {
                return Err(DataError::PathMismatch {
                    path: String::new(),
                    expected: "object",
                    found: value_kind(&other),
                })
            }
        }
        Ok(data)
    }

    /// The whole root object.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Read a path; `None` when the path is malformed or runs through a
    /// missing value.
    pub fn get(&self, path: &str) -> Option<Value> {
        evaluate(&parse_expr(path).ok()?, self)
    }

    /// Records emitted since the log was last drained.
    pub fn changes(&self) -> &[ChangeRecord] {
        &self.log
    }

    /// Drain the change log.
    pub fn take_changes(&mut self) -> Vec<ChangeRecord> {
        std::mem::take(&mut self.log)
    }

    /// Register a listener called synchronously with every emitted record.
    pub fn listen(&mut self, listener: impl FnMut(&ChangeRecord) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        self.listeners.shift_remove(&id).is_some()
    }

    pub fn set(&mut self, path: impl IntoPath, value: Value) -> Result<(), DataError> {
        self.set_with(path, value, ChangeOption::default())
    }

    pub fn set_with(
        &mut self,
        path: impl IntoPath,
        value: Value,
        option: ChangeOption,
    ) -> Result<(), DataError> {
        let keys = self.resolve(&path.into_path()?)?;
        self.apply(&keys, Mutation::Set { value, option })?;
        Ok(())
    }

    /// Splice the array at `path`, returning the removed values.
    pub fn splice(
        &mut self,
        path: impl IntoPath,
        index: isize,
        delete_count: usize,
        insertions: Vec<Value>,
    ) -> Result<Vec<Value>, DataError> {
        let keys = self.resolve(&path.into_path()?)?;
        let result = self.apply(
            &keys,
            Mutation::Splice {
                index,
                delete_count: Some(delete_count),
                insertions,
            },
        )?;
        Ok(result.removed)
    }

    /// Append to the array at `path`, returning the new length.
    pub fn push(&mut self, path: impl IntoPath, value: Value) -> Result<usize, DataError> {
        let keys = self.resolve(&path.into_path()?)?;
        Ok(self.apply(&keys, Mutation::Push(value))?.length)
    }

    pub fn pop(&mut self, path: impl IntoPath) -> Result<Option<Value>, DataError> {
        let keys = self.resolve(&path.into_path()?)?;
        Ok(self.apply(&keys, Mutation::Pop)?.removed.pop())
    }

    pub fn shift(&mut self, path: impl IntoPath) -> Result<Option<Value>, DataError> {
        let keys = self.resolve(&path.into_path()?)?;
        Ok(self.apply(&keys, Mutation::Shift)?.removed.pop())
    }

    pub fn unshift(&mut self, path: impl IntoPath, value: Value) -> Result<usize, DataError> {
        let keys = self.resolve(&path.into_path()?)?;
        Ok(self.apply(&keys, Mutation::Unshift(value))?.length)
    }

    /// Remove the first element equal to `value`. Returns whether one was found.
    pub fn remove(&mut self, path: impl IntoPath, value: Value) -> Result<bool, DataError> {
        let keys = self.resolve(&path.into_path()?)?;
        Ok(self.apply(&keys, Mutation::Remove(value))?.emitted)
    }

    /// Resolve a write target against this store.
    fn resolve(&self, expr: &Expr) -> Result<KeyPath, DataError> {
        let paths = expr.paths().ok_or_else(|| DataError::InvalidPath {
            path: expr.to_string(),
            reason: "not an accessor".to_string(),
        })?;
        resolve_path(paths, self).ok_or_else(|| DataError::InvalidPath {
            path: expr.to_string(),
            reason: "a dynamic segment does not resolve to a key".to_string(),
        })
    }

    /// Apply `mutation` at a resolved key path, logging the change.
    pub fn apply(&mut self, keys: &[PathKey], mutation: Mutation) -> Result<MutationResult, DataError> {
        if keys.is_empty() {
            return Err(DataError::InvalidPath {
                path: String::new(),
                reason: "empty path".to_string(),
            });
        }
        let path = Expr::from_keys(keys);

        let (index, delete_count, insertions) = match mutation {
            Mutation::Set { value, option } => {
                if !option.force && read_path(&self.raw, keys).as_ref() == Some(&value) {
                    return Ok(MutationResult::default());
                }
                *slot_mut(&mut self.raw, keys, &path)? = value.clone();
                self.emit(ChangeRecord::set(path, value).with_option(option));
                return Ok(MutationResult {
                    emitted: true,
                    ..MutationResult::default()
                });
            }
            Mutation::Splice {
                index,
                delete_count,
                insertions,
            } => (index, delete_count, insertions),
            Mutation::Push(value) => {
                let len = array_mut(&mut self.raw, keys, &path)?.len();
                (len as isize, Some(0), vec![value])
            }
            Mutation::Unshift(value) => (0, Some(0), vec![value]),
            Mutation::Pop => match array_mut(&mut self.raw, keys, &path)?.len() {
                0 => return Ok(MutationResult::default()),
                len => ((len - 1) as isize, Some(1), Vec::new()),
            },
            Mutation::Shift => match array_mut(&mut self.raw, keys, &path)?.len() {
                0 => return Ok(MutationResult::default()),
                _ => (0, Some(1), Vec::new()),
            },
            Mutation::Remove(value) => {
                let items = array_mut(&mut self.raw, keys, &path)?;
                match items.iter().position(|item| *item == value) {
                    Some(index) => (index as isize, Some(1), Vec::new()),
                    None => {
                        return Ok(MutationResult {
                            length: items.len(),
                            ..MutationResult::default()
                        })
                    }
                }
            }
        };

        let items = array_mut(&mut self.raw, keys, &path)?;
        let len = items.len();
        let start = if index < 0 {
            len.saturating_sub(index.unsigned_abs())
        } else {
            (index as usize).min(len)
        };
        let delete_count = delete_count.unwrap_or(len - start).min(len - start);
        let removed: Vec<Value> = items
            .splice(start..start + delete_count, insertions.iter().cloned())
            .collect();
        let length = items.len();

        self.emit(ChangeRecord::splice(
            path,
            start,
            delete_count,
            insertions,
            removed.clone(),
        ));
        Ok(MutationResult {
            removed,
            length,
            emitted: true,
        })
    }

    fn emit(&mut self, record: ChangeRecord) {
        trace!(path = %record.expr, "data change");
        for listener in self.listeners.values_mut() {
            listener(&record);
        }
        self.log.push(record);
    }
}

impl Default for Data {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("raw", &self.raw)
            .field("log", &self.log)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Lookup for Data {
    fn lookup(&self, path: &[PathKey]) -> Option<Value> {
        read_path(&self.raw, path)
    }
}

/// Name of a value's JSON type, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The slot a `set` writes into, creating missing intermediates.
fn slot_mut<'a>(root: &'a mut Value, keys: &[PathKey], path: &Expr) -> Result<&'a mut Value, DataError> {
    let mut current = root;
    for key in keys {
        if current.is_null() {
            *current = match key {
                PathKey::Index(_) => Value::Array(Vec::new()),
                PathKey::Key(_) => Value::Object(Map::new()),
            };
        }
        current = match current {
            Value::Object(map) => map.entry(key.as_str().into_owned()).or_insert(Value::Null),
            Value::Array(items) => {
                let Some(index) = key.as_index() else {
                    return Err(DataError::PathMismatch {
                        path: path.to_string(),
                        expected: "object",
                        found: "array",
                    });
                };
                if index >= items.len() {
                    items.resize(index + 1, Value::Null);
                }
                &mut items[index]
            }
            other => {
                return Err(DataError::PathMismatch {
                    path: path.to_string(),
                    expected: "object or array",
                    found: value_kind(other),
                })
            }
        };
    }
    Ok(current)
}

/// The array at `keys`, without creating anything.
fn array_mut<'a>(root: &'a mut Value, keys: &[PathKey], path: &Expr) -> Result<&'a mut Vec<Value>, DataError> {
    let missing = || DataError::PathMismatch {
        path: path.to_string(),
        expected: "array",
        found: "undefined",
    };
    let mut current = root;
    for key in keys {
        current = match current {
            Value::Object(map) => map.get_mut(key.as_str().as_ref()),
            Value::Array(items) => key.as_index().and_then(|index| items.get_mut(index)),
            _ => None,
        }
        .ok_or_else(missing)?;
    }
    match current {
        Value::Array(items) => Ok(items),
        other => Err(DataError::PathMismatch {
            path: path.to_string(),
            expected: "array",
            found: value_kind(other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store(value: Value) -> Data {
        Data::from_value(value).unwrap()
    }

    #[test]
    fn set_emits_one_record_with_literal_path() {
        let mut data = store(json!({"list": [{"name": "a"}, {"name": "b"}], "i": 1}));
        data.set("list[i].name", json!("x")).unwrap();

        let changes = data.take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].expr.to_string(), "list[1].name");
        assert_eq!(changes[0].kind, ChangeKind::Set { value: json!("x") });
        assert_eq!(data.get("list[1].name"), Some(json!("x")));
        assert!(data.changes().is_empty());
    }

    #[test]
    fn set_same_value_is_silent_unless_forced() {
        let mut data = store(json!({"a": 1}));
        data.set("a", json!(1)).unwrap();
        assert!(data.changes().is_empty());

        data.set_with("a", json!(1), ChangeOption::force()).unwrap();
        assert_eq!(data.changes().len(), 1);
        assert!(data.changes()[0].option.force);
    }

    #[test]
    fn set_creates_intermediates() {
        let mut data = Data::new();
        data.set("a.b[2]", json!(true)).unwrap();
        assert_eq!(data.raw(), &json!({"a": {"b": [null, null, true]}}));
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut data = store(json!({"a": 5}));
        let err = data.set("a.b", json!(1)).unwrap_err();
        assert!(matches!(err, DataError::PathMismatch { found: "number", .. }));
        assert!(data.changes().is_empty());
    }

    #[test]
    fn list_ops_require_arrays() {
        let mut data = store(json!({"n": 1}));
        assert!(matches!(
            data.push("n", json!(2)),
            Err(DataError::PathMismatch { expected: "array", found: "number", .. })
        ));
        assert!(matches!(
            data.pop("missing"),
            Err(DataError::PathMismatch { found: "undefined", .. })
        ));
    }

    #[test]
    fn splice_clamps_and_records_removed() {
        let mut data = store(json!({"list": [1, 2, 3]}));
        let removed = data.splice("list", 1, 1, vec![json!(9), json!(9)]).unwrap();
        assert_eq!(removed, vec![json!(2)]);
        assert_eq!(data.get("list"), Some(json!([1, 9, 9, 3])));

        data.splice("list", -1, 5, vec![]).unwrap();
        assert_eq!(data.get("list"), Some(json!([1, 9, 9])));

        let changes = data.take_changes();
        assert_eq!(
            changes[1].kind,
            ChangeKind::Splice {
                index: 3,
                delete_count: 1,
                insertions: vec![],
                removed: vec![json!(3)],
            }
        );
    }

    #[test]
    fn shorthand_list_ops() {
        let mut data = store(json!({"list": [1, 2]}));
        assert_eq!(data.push("list", json!(3)).unwrap(), 3);
        assert_eq!(data.unshift("list", json!(0)).unwrap(), 4);
        assert_eq!(data.pop("list").unwrap(), Some(json!(3)));
        assert_eq!(data.shift("list").unwrap(), Some(json!(0)));
        assert!(data.remove("list", json!(2)).unwrap());
        assert!(!data.remove("list", json!(7)).unwrap());
        assert_eq!(data.get("list"), Some(json!([1])));
        assert_eq!(data.take_changes().len(), 5);

        data.pop("list").unwrap();
        data.take_changes();
        assert_eq!(data.pop("list").unwrap(), None);
        assert!(data.changes().is_empty());
    }

    #[test]
    fn listeners_see_every_record() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut data = Data::new();
        let sink = Rc::clone(&seen);
        let id = data.listen(move |record| sink.borrow_mut().push(record.expr.to_string()));

        data.set("a", json!(1)).unwrap();
        data.set("b", json!(2)).unwrap();
        assert!(data.unlisten(id));
        data.set("c", json!(3)).unwrap();

        assert_eq!(*seen.borrow(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn non_accessor_targets_are_rejected() {
        let mut data = Data::new();
        assert!(matches!(
            data.set(Expr::Number(1.0), json!(1)),
            Err(DataError::InvalidPath { .. })
        ));
        assert!(matches!(data.set("a +", json!(1)), Err(DataError::Expr(_))));
    }
}
