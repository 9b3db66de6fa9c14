//! Scope arena.
//!
//! Every view node evaluates its bindings against a scope. A scope is either
//! a store that owns a [`Data`], or a for-item proxy that holds nothing but the
//! position of its item. Reads and writes of `item…` through a proxy are
//! rewritten to `list[index]…` on the parent scope, so the list has exactly one
//! owner and an item scope never goes stale.

use serde_json::Value;

use crate::anode::ForDirective;
use crate::error::DataError;
use crate::expr::{compare, evaluate, read_path, resolve_path, Expr, KeyPath, Lookup, PathKey, Relation};
use crate::view::NodeId;

use super::Data;

/// Index of a scope in a [`Scopes`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
pub enum Scope {
    /// Owns its data. `owner` is the component that propagates its changes.
    Store { data: Data, owner: Option<NodeId> },
    /// Proxy for one item of a `for` list.
    ForItem {
        parent: ScopeId,
        directive: ForDirective,
        index: usize,
    },
}

/// Arena of scopes. Ids are never reused.
#[derive(Debug, Default)]
pub struct Scopes {
    slots: Vec<Option<Scope>>,
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.slots.len() as u32);
        self.slots.push(Some(scope));
        id
    }

    pub fn insert_store(&mut self, data: Data, owner: Option<NodeId>) -> ScopeId {
        self.insert(Scope::Store { data, owner })
    }

    pub fn insert_for_item(&mut self, parent: ScopeId, directive: ForDirective, index: usize) -> ScopeId {
        self.insert(Scope::ForItem {
            parent,
            directive,
            index,
        })
    }

    pub fn remove(&mut self, id: ScopeId) -> Option<Scope> {
        self.slots.get_mut(id.0 as usize)?.take()
    }

    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn contains(&self, id: ScopeId) -> bool {
        self.get(id).is_some()
    }

    pub fn set_owner(&mut self, id: ScopeId, node: NodeId) {
        if let Some(Some(Scope::Store { owner, .. })) = self.slots.get_mut(id.0 as usize) {
            *owner = Some(node);
        }
    }

    pub fn owner_of(&self, id: ScopeId) -> Option<NodeId> {
        match self.get(id)? {
            Scope::Store { owner, .. } => *owner,
            Scope::ForItem { .. } => None,
        }
    }

    pub fn data(&self, id: ScopeId) -> Option<&Data> {
        match self.get(id)? {
            Scope::Store { data, .. } => Some(data),
            Scope::ForItem { .. } => None,
        }
    }

    pub fn data_mut(&mut self, id: ScopeId) -> Option<&mut Data> {
        match self.slots.get_mut(id.0 as usize)?.as_mut()? {
            Scope::Store { data, .. } => Some(data),
            Scope::ForItem { .. } => None,
        }
    }

    /// Position bound by a for-item scope.
    pub fn index_of(&self, id: ScopeId) -> Option<usize> {
        match self.get(id)? {
            Scope::ForItem { index, .. } => Some(*index),
            Scope::Store { .. } => None,
        }
    }

    /// Move a for-item scope to a new position without emitting a change.
    /// Returns whether the index changed.
    pub fn rebind_index(&mut self, id: ScopeId, new_index: usize) -> bool {
        match self.slots.get_mut(id.0 as usize) {
            Some(Some(Scope::ForItem { index, .. })) if *index != new_index => {
                *index = new_index;
                true
            }
            _ => false,
        }
    }

    /// A [`Lookup`] view of one scope.
    pub fn scope(&self, id: ScopeId) -> ScopeRef<'_> {
        ScopeRef { scopes: self, id }
    }

    pub fn evaluate(&self, id: ScopeId, expr: &Expr) -> Option<Value> {
        evaluate(expr, &self.scope(id))
    }

    pub fn compare(&self, id: ScopeId, change: &Expr, bound: &Expr) -> Relation {
        compare(change, bound, &self.scope(id))
    }

    /// Read a literal key path through the chain starting at `id`.
    pub fn lookup_in(&self, id: ScopeId, path: &[PathKey]) -> Option<Value> {
        match self.get(id)? {
            Scope::Store { data, .. } => data.lookup(path),
            Scope::ForItem {
                parent,
                directive,
                index,
            } => {
                let (first, rest) = path.split_first()?;
                if first.is_key(&directive.item) {
                    match self.list_keys(*parent, directive) {
                        Some(mut keys) => {
                            keys.push(PathKey::Index(*index));
                            keys.extend(rest.iter().cloned());
                            self.lookup_in(*parent, &keys)
                        }
                        None => {
                            let list = self.evaluate(*parent, &directive.list)?;
                            let mut keys: KeyPath = KeyPath::new();
                            keys.push(PathKey::Index(*index));
                            keys.extend(rest.iter().cloned());
                            read_path(&list, &keys)
                        }
                    }
                } else if first.is_key(&directive.index) {
                    rest.is_empty().then(|| Value::from(*index))
                } else {
                    self.lookup_in(*parent, path)
                }
            }
        }
    }

    /// Literal path of a for list in `parent`, if the list is an accessor.
    fn list_keys(&self, parent: ScopeId, directive: &ForDirective) -> Option<KeyPath> {
        resolve_path(directive.list.paths()?, &self.scope(parent))
    }

    /// Resolve a write target to the store that owns it and the literal key
    /// path inside that store.
    pub fn resolve_write(&self, id: ScopeId, expr: &Expr) -> Result<(ScopeId, KeyPath), DataError> {
        let paths = expr.paths().ok_or_else(|| DataError::InvalidPath {
            path: expr.to_string(),
            reason: "not an accessor".to_string(),
        })?;
        let keys = resolve_path(paths, &self.scope(id)).ok_or_else(|| DataError::InvalidPath {
            path: expr.to_string(),
            reason: "a dynamic segment does not resolve to a key".to_string(),
        })?;
        self.route_keys(id, keys, expr)
    }

    fn route_keys(&self, id: ScopeId, keys: KeyPath, expr: &Expr) -> Result<(ScopeId, KeyPath), DataError> {
        let unknown = || DataError::InvalidPath {
            path: expr.to_string(),
            reason: "scope no longer exists".to_string(),
        };
        match self.get(id).ok_or_else(unknown)? {
            Scope::Store { .. } => Ok((id, keys)),
            Scope::ForItem {
                parent,
                directive,
                index,
            } => {
                let Some(first) = keys.first() else {
                    return Err(DataError::InvalidPath {
                        path: expr.to_string(),
                        reason: "empty path".to_string(),
                    });
                };
                if first.is_key(&directive.index) {
                    return Err(DataError::ReadOnlyBinding {
                        name: directive.index.clone(),
                    });
                }
                if first.is_key(&directive.item) {
                    let mut rewritten = self.list_keys(*parent, directive).ok_or_else(|| {
                        DataError::InvalidPath {
                            path: expr.to_string(),
                            reason: format!("list `{}` is not writable", directive.list),
                        }
                    })?;
                    rewritten.push(PathKey::Index(*index));
                    rewritten.extend(keys.iter().skip(1).cloned());
                    return self.route_keys(*parent, rewritten, expr);
                }
                self.route_keys(*parent, keys, expr)
            }
        }
    }
}

/// A scope seen through the [`Lookup`] trait.
#[derive(Clone, Copy)]
pub struct ScopeRef<'a> {
    scopes: &'a Scopes,
    id: ScopeId,
}

impl ScopeRef<'_> {
    pub fn id(&self) -> ScopeId {
        self.id
    }
}

impl Lookup for ScopeRef<'_> {
    fn lookup(&self, path: &[PathKey]) -> Option<Value> {
        self.scopes.lookup_in(self.id, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_accessor, parse_expr};
    use serde_json::json;

    fn fixture() -> (Scopes, ScopeId, ScopeId) {
        let mut scopes = Scopes::new();
        let data = Data::from_value(json!({"list": [{"n": "a"}, {"n": "b"}], "title": "t"})).unwrap();
        let root = scopes.insert_store(data, None);
        let directive = ForDirective::new("item", "i", parse_expr("list").unwrap());
        let item = scopes.insert_for_item(root, directive, 1);
        (scopes, root, item)
    }

    #[test]
    fn item_reads_go_through_the_list() {
        let (scopes, _, item) = fixture();
        let eval = |src: &str| scopes.evaluate(item, &parse_expr(src).unwrap());
        assert_eq!(eval("item.n"), Some(json!("b")));
        assert_eq!(eval("i"), Some(json!(1)));
        assert_eq!(eval("title"), Some(json!("t")));
        assert_eq!(eval("list[i].n"), Some(json!("b")));
    }

    #[test]
    fn rebinding_moves_the_proxy() {
        let (mut scopes, _, item) = fixture();
        assert!(scopes.rebind_index(item, 0));
        assert!(!scopes.rebind_index(item, 0));
        assert_eq!(scopes.evaluate(item, &parse_expr("item.n").unwrap()), Some(json!("a")));
    }

    #[test]
    fn item_writes_are_rewritten_to_the_list() {
        let (scopes, root, item) = fixture();
        let (target, keys) = scopes
            .resolve_write(item, &parse_accessor("item.n").unwrap())
            .unwrap();
        assert_eq!(target, root);
        assert_eq!(Expr::from_keys(&keys).to_string(), "list[1].n");

        let (_, keys) = scopes
            .resolve_write(item, &parse_accessor("title").unwrap())
            .unwrap();
        assert_eq!(Expr::from_keys(&keys).to_string(), "title");
    }

    #[test]
    fn index_binding_is_read_only() {
        let (scopes, _, item) = fixture();
        assert_eq!(
            scopes.resolve_write(item, &parse_accessor("i").unwrap()),
            Err(DataError::ReadOnlyBinding { name: "i".to_string() })
        );
    }
}
