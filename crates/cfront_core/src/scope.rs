//! `ScopedMap<K, V>` (§4.4.1): a stack of hash maps implementing the lexical
//! scoping the parser needs to solve the typedef problem. The `Parser` keeps
//! three of these in lockstep — tags, typedef aliases, and ordinary
//! declarations — pushing and popping all three together at block
//! boundaries, so at any quiescent point they share the same depth.

use rustc_hash::FxHashMap;
use std::hash::Hash;

/// A stack of scopes, each a hash map from name to value. Lookup walks
/// innermost-to-outermost, the usual lexical shadowing rule; insertion
/// always targets the innermost scope.
#[derive(Debug)]
pub struct ScopedMap<K, V> {
    scopes: Vec<FxHashMap<K, V>>,
}

impl<K, V> ScopedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Starts with one scope already open (the global/file scope), so a
    /// `ScopedMap` is always usable without an explicit initial `push_scope`.
    pub fn new() -> Self {
        ScopedMap {
            scopes: vec![FxHashMap::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the outermost scope");
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Inserts into the innermost scope, returning the previous value if
    /// `key` was already bound *in that same scope* (the caller uses this to
    /// diagnose a duplicate declaration; shadowing an outer scope is fine
    /// and doesn't show up here).
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.scopes.last_mut().expect("at least one scope").insert(key, value)
    }

    /// `true` if `key` is already bound in the innermost scope specifically.
    pub fn contains_innermost(&self, key: &K) -> bool {
        self.scopes.last().expect("at least one scope").contains_key(key)
    }

    pub fn innermost(&self, key: &K) -> Option<&V> {
        self.scopes.last().expect("at least one scope").get(key)
    }

    /// Walks from the innermost scope outward, returning the first match.
    pub fn lookup(&self, key: &K) -> Option<&V> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(key) {
                return Some(v);
            }
        }
        None
    }
}

impl<K, V> Default for ScopedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_outer_binding_through_inner_scope() {
        let mut map: ScopedMap<&str, i32> = ScopedMap::new();
        map.insert("x", 1);
        map.push_scope();
        assert_eq!(map.lookup(&"x"), Some(&1));
        map.pop_scope();
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let mut map: ScopedMap<&str, i32> = ScopedMap::new();
        map.insert("x", 1);
        map.push_scope();
        map.insert("x", 2);
        assert_eq!(map.lookup(&"x"), Some(&2));
        map.pop_scope();
        assert_eq!(map.lookup(&"x"), Some(&1));
    }

    #[test]
    fn insert_in_same_scope_returns_previous_value() {
        let mut map: ScopedMap<&str, i32> = ScopedMap::new();
        assert_eq!(map.insert("x", 1), None);
        assert_eq!(map.insert("x", 2), Some(1));
    }

    #[test]
    fn contains_innermost_ignores_outer_scopes() {
        let mut map: ScopedMap<&str, i32> = ScopedMap::new();
        map.insert("x", 1);
        map.push_scope();
        assert!(!map.contains_innermost(&"x"));
        map.insert("x", 2);
        assert!(map.contains_innermost(&"x"));
    }

    #[test]
    fn depth_tracks_push_and_pop() {
        let mut map: ScopedMap<&str, i32> = ScopedMap::new();
        assert_eq!(map.depth(), 1);
        map.push_scope();
        map.push_scope();
        assert_eq!(map.depth(), 3);
        map.pop_scope();
        assert_eq!(map.depth(), 2);
    }
}
