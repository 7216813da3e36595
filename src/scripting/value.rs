// Mon Oct 12 2026 - Alex

use crate::scripting::engine::ScriptEnginePointer;
use crate::scripting::object::ScriptObject;
use crate::scripting::types::{ScriptVariant, ValueKind};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Backend side of a [`ScriptValue`].
///
/// Each engine implementation wraps its native value representation in a type
/// implementing this trait. Implementations hold only a weak reference to
/// their engine and must degrade to neutral results once it is gone.
pub trait ScriptValueProxy: Send + Sync {
    fn engine(&self) -> Option<ScriptEnginePointer>;
    fn kind(&self) -> ValueKind;
    fn to_bool(&self) -> bool;
    fn to_number(&self) -> f64;
    fn to_display_string(&self) -> String;
    fn to_variant(&self) -> ScriptVariant;
    fn to_bytes(&self) -> Option<Vec<u8>>;
    fn to_host_object(&self) -> Option<Arc<dyn ScriptObject>>;
    fn property(&self, name: &str) -> ScriptValue;
    fn set_property(&self, name: &str, value: &ScriptValue) -> bool;
    fn property_names(&self) -> Vec<String>;
    fn call(&self, this: &ScriptValue, args: &[ScriptValue]) -> ScriptValue;
    fn construct(&self, args: &[ScriptValue]) -> ScriptValue;
    fn equals(&self, other: &ScriptValue) -> bool;
    fn strict_equals(&self, other: &ScriptValue) -> bool;
    fn as_any(&self) -> &dyn Any;
}

/// Reference-counted handle to a value living inside a script engine.
///
/// Cloning shares the underlying value. A default-constructed handle is
/// invalid: it belongs to no engine and every operation on it yields a
/// neutral result. Handles must not outlive their engine; once the engine is
/// gone they behave like invalid handles.
#[derive(Clone, Default)]
pub struct ScriptValue {
    proxy: Option<Arc<dyn ScriptValueProxy>>,
}

impl ScriptValue {
    pub fn from_proxy(proxy: Arc<dyn ScriptValueProxy>) -> Self {
        Self { proxy: Some(proxy) }
    }

    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn proxy(&self) -> Option<&Arc<dyn ScriptValueProxy>> {
        self.proxy.as_ref()
    }

    /// Borrow the backend proxy as a concrete type.
    pub fn downcast_proxy<P: 'static>(&self) -> Option<&P> {
        self.proxy.as_ref().and_then(|p| p.as_any().downcast_ref::<P>())
    }

    pub fn engine(&self) -> Option<ScriptEnginePointer> {
        self.proxy.as_ref().and_then(|p| p.engine())
    }

    pub fn kind(&self) -> ValueKind {
        match &self.proxy {
            Some(p) => p.kind(),
            None => ValueKind::Invalid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind() != ValueKind::Invalid
    }

    pub fn is_undefined(&self) -> bool {
        self.kind() == ValueKind::Undefined
    }

    pub fn is_null(&self) -> bool {
        self.kind() == ValueKind::Null
    }

    pub fn is_bool(&self) -> bool {
        self.kind() == ValueKind::Boolean
    }

    pub fn is_number(&self) -> bool {
        self.kind() == ValueKind::Number
    }

    pub fn is_string(&self) -> bool {
        self.kind() == ValueKind::String
    }

    pub fn is_object(&self) -> bool {
        self.kind().is_object()
    }

    pub fn is_array(&self) -> bool {
        self.kind() == ValueKind::Array
    }

    pub fn is_function(&self) -> bool {
        self.kind() == ValueKind::Function
    }

    pub fn is_error(&self) -> bool {
        self.kind() == ValueKind::Error
    }

    pub fn is_host_object(&self) -> bool {
        self.kind() == ValueKind::HostObject
    }

    pub fn to_bool(&self) -> bool {
        self.proxy.as_ref().map(|p| p.to_bool()).unwrap_or(false)
    }

    pub fn to_number(&self) -> f64 {
        self.proxy.as_ref().map(|p| p.to_number()).unwrap_or(f64::NAN)
    }

    pub fn to_int32(&self) -> i32 {
        to_int32(self.to_number())
    }

    pub fn to_uint32(&self) -> u32 {
        to_int32(self.to_number()) as u32
    }

    pub fn to_variant(&self) -> ScriptVariant {
        self.proxy
            .as_ref()
            .map(|p| p.to_variant())
            .unwrap_or(ScriptVariant::Null)
    }

    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        self.proxy.as_ref().and_then(|p| p.to_bytes())
    }

    pub fn to_host_object(&self) -> Option<Arc<dyn ScriptObject>> {
        self.proxy.as_ref().and_then(|p| p.to_host_object())
    }

    pub fn property(&self, name: &str) -> ScriptValue {
        match &self.proxy {
            Some(p) => p.property(name),
            None => ScriptValue::invalid(),
        }
    }

    pub fn set_property(&self, name: &str, value: &ScriptValue) -> bool {
        self.proxy
            .as_ref()
            .map(|p| p.set_property(name, value))
            .unwrap_or(false)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.proxy
            .as_ref()
            .map(|p| p.property_names())
            .unwrap_or_default()
    }

    /// Call this value as a function. Script exceptions land in the engine's
    /// exception slot; the return value is then the thrown value.
    pub fn call(&self, this: &ScriptValue, args: &[ScriptValue]) -> ScriptValue {
        match &self.proxy {
            Some(p) => p.call(this, args),
            None => ScriptValue::invalid(),
        }
    }

    pub fn construct(&self, args: &[ScriptValue]) -> ScriptValue {
        match &self.proxy {
            Some(p) => p.construct(args),
            None => ScriptValue::invalid(),
        }
    }

    pub fn equals(&self, other: &ScriptValue) -> bool {
        match &self.proxy {
            Some(p) => p.equals(other),
            None => !other.is_valid(),
        }
    }

    pub fn strict_equals(&self, other: &ScriptValue) -> bool {
        match &self.proxy {
            Some(p) => p.strict_equals(other),
            None => !other.is_valid(),
        }
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.proxy {
            Some(p) => write!(f, "{}", p.to_display_string()),
            None => write!(f, "<invalid>"),
        }
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptValue")
            .field("kind", &self.kind())
            .field("value", &self.to_string())
            .finish()
    }
}

/// ECMAScript ToInt32.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let truncated = n.trunc();
    let modulo = truncated.rem_euclid(4_294_967_296.0);
    if modulo >= 2_147_483_648.0 {
        (modulo - 4_294_967_296.0) as i32
    } else {
        modulo as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_is_neutral() {
        let value = ScriptValue::invalid();
        assert!(!value.is_valid());
        assert!(value.engine().is_none());
        assert!(!value.to_bool());
        assert!(value.to_number().is_nan());
        assert!(!value.property("x").is_valid());
        assert!(!value.call(&ScriptValue::invalid(), &[]).is_valid());
        assert_eq!(value.to_string(), "<invalid>");
    }

    #[test]
    fn test_invalid_values_compare_equal() {
        assert_eq!(ScriptValue::invalid(), ScriptValue::default());
    }

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(to_int32(42.9), 42);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_int32(4_294_967_297.0), 1);
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::INFINITY), 0);
    }
}
