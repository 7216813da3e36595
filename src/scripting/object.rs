// Mon Oct 12 2026 - Alex

use crate::scripting::engine::ScriptEngine;
use crate::scripting::types::ScriptVariant;
use crate::scripting::value::ScriptValue;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Slot,
    Signal,
    Invokable,
}

/// A method a native object exposes to script.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub kind: MethodKind,
    pub inherited: bool,
    pub arity: i32,
}

impl MethodInfo {
    pub fn new(name: &str, kind: MethodKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            inherited: false,
            arity: -1,
        }
    }

    pub fn slot(name: &str) -> Self {
        Self::new(name, MethodKind::Slot)
    }

    pub fn signal(name: &str) -> Self {
        Self::new(name, MethodKind::Signal)
    }

    pub fn invokable(name: &str) -> Self {
        Self::new(name, MethodKind::Invokable)
    }

    pub fn inherited(mut self) -> Self {
        self.inherited = true;
        self
    }

    pub fn with_arity(mut self, arity: i32) -> Self {
        self.arity = arity;
        self
    }
}

/// A property a native object exposes to script.
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub writable: bool,
    pub inherited: bool,
}

impl PropertyInfo {
    pub fn read_only(name: &str) -> Self {
        Self {
            name: name.to_string(),
            writable: false,
            inherited: false,
        }
    }

    pub fn read_write(name: &str) -> Self {
        Self {
            name: name.to_string(),
            writable: true,
            inherited: false,
        }
    }

    pub fn inherited(mut self) -> Self {
        self.inherited = true;
        self
    }
}

/// Native object that can be exposed to script through
/// `ScriptEngine::new_qobject` or `ScriptEngine::register_global_object`.
///
/// Everything except `class_name` has a default so simple objects only
/// describe what they actually expose.
pub trait ScriptObject: Send + Sync {
    fn class_name(&self) -> &str;

    fn methods(&self) -> Vec<MethodInfo> {
        Vec::new()
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        Vec::new()
    }

    fn invoke(&self, engine: &dyn ScriptEngine, method: &str, args: &[ScriptValue]) -> ScriptValue {
        let _ = (method, args);
        engine.undefined_value()
    }

    fn property(&self, name: &str) -> Option<ScriptVariant> {
        let _ = name;
        None
    }

    fn set_property(&self, name: &str, value: ScriptVariant) -> bool {
        let _ = (name, value);
        false
    }

    fn dynamic_property(&self, name: &str) -> Option<ScriptVariant> {
        let _ = name;
        None
    }

    /// Returns false when the object does not accept dynamic properties.
    fn set_dynamic_property(&self, name: &str, value: ScriptVariant) -> bool {
        let _ = (name, value);
        false
    }

    fn dynamic_property_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called when the engine gives up ownership of the object.
    fn release(&self) {}
}

/// Address-based identity of a shared native object.
pub fn object_identity(object: &Arc<dyn ScriptObject>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}
