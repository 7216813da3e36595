// Tue Oct 13 2026 - Alex

use crate::interp::value::{ObjectRef, Value};
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub type ScopeRef = Arc<Scope>;

pub enum ScopeStorage {
    Declarative(Mutex<HashMap<String, Value, RandomState>>),
    /// Bindings live as properties of an object. Used for the global scope.
    Object(ObjectRef),
}

/// One link of a lexical environment chain.
pub struct Scope {
    storage: ScopeStorage,
    constants: Mutex<HashSet<String, RandomState>>,
    parent: Option<ScopeRef>,
}

impl Scope {
    pub fn global(object: ObjectRef) -> ScopeRef {
        Arc::new(Self {
            storage: ScopeStorage::Object(object),
            constants: Mutex::new(HashSet::default()),
            parent: None,
        })
    }

    pub fn declarative(parent: Option<ScopeRef>) -> ScopeRef {
        Arc::new(Self {
            storage: ScopeStorage::Declarative(Mutex::new(HashMap::default())),
            constants: Mutex::new(HashSet::default()),
            parent,
        })
    }

    pub fn parent(&self) -> Option<&ScopeRef> {
        self.parent.as_ref()
    }

    pub fn storage(&self) -> &ScopeStorage {
        &self.storage
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.constants.lock().contains(name)
    }

    pub fn mark_constant(&self, name: &str) {
        self.constants.lock().insert(name.to_string());
    }

    /// Declarative bindings only; object-backed scopes answer `None`.
    pub fn get_own(&self, name: &str) -> Option<Value> {
        match &self.storage {
            ScopeStorage::Declarative(bindings) => bindings.lock().get(name).cloned(),
            ScopeStorage::Object(_) => None,
        }
    }

    pub fn has_own(&self, name: &str) -> bool {
        match &self.storage {
            ScopeStorage::Declarative(bindings) => bindings.lock().contains_key(name),
            ScopeStorage::Object(_) => false,
        }
    }

    /// Returns false for object-backed scopes, which the interpreter writes
    /// through property assignment.
    pub fn set_own(&self, name: &str, value: Value) -> bool {
        match &self.storage {
            ScopeStorage::Declarative(bindings) => {
                bindings.lock().insert(name.to_string(), value);
                true
            }
            ScopeStorage::Object(_) => false,
        }
    }

    /// Drop every binding, returning the values so the caller can keep
    /// walking the graph.
    pub fn drain(&self) -> Vec<Value> {
        self.constants.lock().clear();
        match &self.storage {
            ScopeStorage::Declarative(bindings) => bindings.lock().drain().map(|(_, v)| v).collect(),
            ScopeStorage::Object(object) => vec![Value::Object(object.clone())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::value::{ObjectCell, ObjectClass};

    #[test]
    fn test_declarative_bindings() {
        let outer = Scope::declarative(None);
        outer.set_own("a", Value::Number(1.0));
        let inner = Scope::declarative(Some(outer.clone()));
        assert!(inner.get_own("a").is_none());
        assert!(inner.parent().unwrap().has_own("a"));
        inner.mark_constant("b");
        assert!(inner.is_constant("b"));
        assert!(!outer.is_constant("b"));
    }

    #[test]
    fn test_object_scope_defers_to_properties() {
        let global = ObjectCell::new(ObjectClass::Ordinary, None);
        let scope = Scope::global(global);
        assert!(!scope.set_own("x", Value::Null));
        assert!(!scope.has_own("x"));
        assert_eq!(scope.drain().len(), 1);
    }
}
