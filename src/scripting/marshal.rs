// Tue Oct 13 2026 - Alex

use crate::scripting::engine::ScriptEngine;
use crate::scripting::error::ScriptErrorKind;
use crate::scripting::types::ScriptVariant;
use crate::scripting::value::ScriptValue;
use log::{debug, warn};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

pub type MarshalFunction = Arc<dyn Fn(&dyn ScriptEngine, &dyn Any) -> ScriptValue + Send + Sync>;
pub type DemarshalFunction = Arc<dyn Fn(&ScriptValue, &mut dyn Any) -> bool + Send + Sync>;

/// Result of a registry-backed script → native conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertOutcome {
    Unregistered,
    Converted,
    Failed,
}

#[derive(Clone)]
pub struct MarshalEntry {
    pub marshal: MarshalFunction,
    pub demarshal: DemarshalFunction,
}

/// Per-engine map from native type to its conversion pair.
#[derive(Default)]
pub struct MarshalRegistry {
    entries: RwLock<HashMap<TypeId, MarshalEntry>>,
}

impl MarshalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when an earlier entry was replaced.
    pub fn register(&self, type_id: TypeId, marshal: MarshalFunction, demarshal: DemarshalFunction) -> bool {
        let replaced = self
            .entries
            .write()
            .insert(type_id, MarshalEntry { marshal, demarshal })
            .is_some();
        if replaced {
            debug!("Replaced marshalling entry for {:?}", type_id);
        }
        replaced
    }

    /// Entries are cloned out so callers never run conversions under the lock.
    pub fn entry(&self, type_id: TypeId) -> Option<MarshalEntry> {
        self.entries.read().get(&type_id).cloned()
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.entries.read().contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Compile-time conversions between a native type and script values.
///
/// Every method defaults to "not available", so an empty impl opts a type
/// into the registry tier only.
pub trait ScriptMarshal: Sized {
    fn to_script_direct(&self, _engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        None
    }

    fn from_script_direct(_value: &ScriptValue) -> Option<Self> {
        None
    }

    fn to_variant(&self) -> Option<ScriptVariant> {
        None
    }

    fn from_variant(_variant: &ScriptVariant) -> Option<Self> {
        None
    }
}

/// Native → script: direct impl, then the engine registry, then the generic
/// variant, then `undefined`.
pub fn script_value_from_value<T: ScriptMarshal + 'static>(engine: &dyn ScriptEngine, value: &T) -> ScriptValue {
    if let Some(converted) = value.to_script_direct(engine) {
        return converted;
    }
    if let Some(converted) = engine.create(TypeId::of::<T>(), value) {
        return converted;
    }
    if let Some(variant) = value.to_variant() {
        return engine.new_variant(&variant);
    }
    warn!(
        "{}: no script conversion available for {}",
        ScriptErrorKind::ConversionFailure,
        type_name::<T>()
    );
    engine.undefined_value()
}

/// Script → native using the engine the value belongs to.
pub fn script_value_cast<T: ScriptMarshal + Default + 'static>(value: &ScriptValue) -> T {
    match value.engine() {
        Some(engine) => cast_value(Some(engine.as_ref()), value),
        None => cast_value(None, value),
    }
}

pub fn script_value_cast_with<T: ScriptMarshal + Default + 'static>(engine: &dyn ScriptEngine, value: &ScriptValue) -> T {
    cast_value(Some(engine), value)
}

fn cast_value<T: ScriptMarshal + Default + 'static>(engine: Option<&dyn ScriptEngine>, value: &ScriptValue) -> T {
    if let Some(converted) = T::from_script_direct(value) {
        return converted;
    }
    if let Some(engine) = engine {
        let mut out = T::default();
        match engine.convert(value, TypeId::of::<T>(), &mut out) {
            ConvertOutcome::Converted => return out,
            ConvertOutcome::Failed => {
                warn!(
                    "{}: registered conversion to {} rejected a {} value",
                    ScriptErrorKind::ConversionFailure,
                    type_name::<T>(),
                    value.kind()
                );
                return T::default();
            }
            ConvertOutcome::Unregistered => {}
        }
    }
    if value.is_valid() {
        if let Some(converted) = T::from_variant(&value.to_variant()) {
            return converted;
        }
    }
    warn!(
        "{}: cannot convert {} value to {}",
        ScriptErrorKind::ConversionFailure,
        value.kind(),
        type_name::<T>()
    );
    T::default()
}

pub fn serialize_variant<T: Serialize>(value: &T) -> Option<ScriptVariant> {
    serde_json::to_value(value).ok()
}

pub fn deserialize_variant<T: DeserializeOwned>(variant: &ScriptVariant) -> Option<T> {
    serde_json::from_value(variant.clone()).ok()
}

/// Marshal serde types through the generic variant tier.
#[macro_export]
macro_rules! variant_marshal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::scripting::marshal::ScriptMarshal for $ty {
                fn to_variant(&self) -> Option<$crate::scripting::types::ScriptVariant> {
                    $crate::scripting::marshal::serialize_variant(self)
                }

                fn from_variant(variant: &$crate::scripting::types::ScriptVariant) -> Option<Self> {
                    $crate::scripting::marshal::deserialize_variant(variant)
                }
            }
        )*
    };
}

/// Marshal types only through the engine's registry.
#[macro_export]
macro_rules! registry_marshal {
    ($($ty:ty),* $(,)?) => {
        $(impl $crate::scripting::marshal::ScriptMarshal for $ty {})*
    };
}

fn valid(value: &ScriptValue) -> Option<&ScriptValue> {
    if value.is_valid() {
        Some(value)
    } else {
        None
    }
}

fn integral(n: f64) -> f64 {
    if n.is_finite() {
        n.trunc()
    } else {
        0.0
    }
}

impl ScriptMarshal for bool {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_bool(*self))
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        valid(value).map(|v| v.to_bool())
    }
}

impl ScriptMarshal for i32 {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_int(*self))
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        valid(value).map(|v| v.to_int32())
    }
}

impl ScriptMarshal for u32 {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_uint(*self))
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        valid(value).map(|v| v.to_uint32())
    }
}

impl ScriptMarshal for i64 {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_number(*self as f64))
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        valid(value).map(|v| integral(v.to_number()) as i64)
    }
}

impl ScriptMarshal for u64 {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_number(*self as f64))
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        valid(value).map(|v| integral(v.to_number()).max(0.0) as u64)
    }
}

impl ScriptMarshal for f32 {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_number(*self as f64))
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        valid(value).map(|v| v.to_number() as f32)
    }
}

impl ScriptMarshal for f64 {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_number(*self))
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        valid(value).map(|v| v.to_number())
    }
}

impl ScriptMarshal for String {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_string(self))
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        valid(value).map(|v| v.to_string())
    }
}

impl ScriptMarshal for &'static str {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_string(self))
    }
}

impl ScriptMarshal for Vec<u8> {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_array_buffer(self))
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        value.to_bytes()
    }
}

impl ScriptMarshal for ScriptValue {
    fn to_script_direct(&self, _engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(self.clone())
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl ScriptMarshal for ScriptVariant {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(engine.new_variant(self))
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        valid(value).map(|v| v.to_variant())
    }
}

impl ScriptMarshal for Vec<ScriptValue> {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        let array = engine.new_array(self.len() as u32);
        for (index, item) in self.iter().enumerate() {
            array.set_property(&index.to_string(), item);
        }
        Some(array)
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        if !value.is_array() {
            return None;
        }
        let length = value.property("length").to_uint32();
        Some((0..length).map(|i| value.property(&i.to_string())).collect())
    }
}

impl<T: ScriptMarshal + Default + 'static> ScriptMarshal for Option<T> {
    fn to_script_direct(&self, engine: &dyn ScriptEngine) -> Option<ScriptValue> {
        Some(match self {
            Some(inner) => script_value_from_value(engine, inner),
            None => engine.null_value(),
        })
    }

    fn from_script_direct(value: &ScriptValue) -> Option<Self> {
        if !value.is_valid() || value.is_null() || value.is_undefined() {
            return Some(None);
        }
        Some(Some(script_value_cast(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, EngineConfig};
    use crate::scripting::engine::{new_script_engine, ScriptEnginePointer};
    use serde::Deserialize;

    fn engine() -> ScriptEnginePointer {
        new_script_engine(BackendKind::Interpreter, EngineConfig::default())
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    crate::variant_marshal!(Point);

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Handle {
        id: u32,
    }

    crate::registry_marshal!(Handle);

    #[derive(Debug, Default)]
    struct Opaque;

    crate::registry_marshal!(Opaque);

    #[test]
    fn test_primitive_round_trip() {
        let engine = engine();
        let engine = engine.as_ref();

        let b = engine.to_script_value(&true);
        assert!(b.is_bool());
        assert!(engine.from_script_value::<bool>(&b));

        let i = engine.to_script_value(&-42i32);
        assert_eq!(engine.from_script_value::<i32>(&i), -42);

        let f = engine.to_script_value(&2.5f64);
        assert_eq!(engine.from_script_value::<f64>(&f), 2.5);

        let s = engine.to_script_value(&"hello".to_string());
        assert!(s.is_string());
        assert_eq!(engine.from_script_value::<String>(&s), "hello");
    }

    #[test]
    fn test_registry_tier() {
        let engine = engine();
        let engine = engine.as_ref();
        engine.register_type::<Handle, _, _>(
            |engine, handle| engine.new_number(handle.id as f64),
            |value, out| {
                out.id = value.to_uint32();
                true
            },
        );
        let value = engine.to_script_value(&Handle { id: 7 });
        assert_eq!(value.to_number(), 7.0);
        assert_eq!(engine.from_script_value::<Handle>(&value), Handle { id: 7 });
    }

    #[test]
    fn test_registry_replacement_last_wins() {
        let engine = engine();
        let engine = engine.as_ref();
        engine.register_type::<Handle, _, _>(|engine, _| engine.new_string("first"), |_, _| true);
        engine.register_type::<Handle, _, _>(|engine, _| engine.new_string("second"), |_, _| true);
        let value = engine.to_script_value(&Handle { id: 1 });
        assert_eq!(value.to_string(), "second");
    }

    #[test]
    fn test_direct_impl_beats_registry() {
        let engine = engine();
        let engine = engine.as_ref();
        engine.register_type::<i32, _, _>(|engine, _| engine.new_string("registry"), |_, out| {
            *out = -1;
            true
        });
        let value = engine.to_script_value(&5i32);
        assert!(value.is_number());
        assert_eq!(engine.from_script_value::<i32>(&value), 5);
    }

    #[test]
    fn test_variant_tier() {
        let engine = engine();
        let engine = engine.as_ref();
        let value = engine.to_script_value(&Point { x: 1, y: 2 });
        assert!(value.is_object());
        assert_eq!(value.property("y").to_int32(), 2);
        assert_eq!(engine.from_script_value::<Point>(&value), Point { x: 1, y: 2 });
    }

    #[test]
    fn test_failed_registry_conversion_yields_default() {
        let engine = engine();
        let engine = engine.as_ref();
        engine.register_type::<Handle, _, _>(|engine, _| engine.null_value(), |_, out| {
            out.id = 99;
            false
        });
        let value = engine.new_number(3.0);
        assert_eq!(engine.from_script_value::<Handle>(&value), Handle::default());
    }

    #[test]
    fn test_unconvertible_type_is_undefined() {
        let engine = engine();
        let engine = engine.as_ref();
        let value = engine.to_script_value(&Opaque);
        assert!(value.is_undefined());
    }

    #[test]
    fn test_option_maps_null() {
        let engine = engine();
        let engine = engine.as_ref();
        let none: Option<i32> = None;
        assert!(engine.to_script_value(&none).is_null());
        let value = engine.to_script_value(&Some(4i32));
        assert_eq!(engine.from_script_value::<Option<i32>>(&value), Some(4));
        assert_eq!(engine.from_script_value::<Option<i32>>(&engine.undefined_value()), None);
    }

    #[test]
    fn test_byte_buffer_and_array() {
        let engine = engine();
        let engine = engine.as_ref();
        let buffer = engine.to_script_value(&vec![1u8, 2, 3]);
        assert_eq!(engine.from_script_value::<Vec<u8>>(&buffer), vec![1, 2, 3]);

        let items = vec![engine.new_int(1), engine.new_string("two")];
        let array = engine.to_script_value(&items);
        assert!(array.is_array());
        let back = engine.from_script_value::<Vec<ScriptValue>>(&array);
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].to_string(), "two");
    }

    #[test]
    fn test_cast_without_engine() {
        assert_eq!(script_value_cast::<i32>(&ScriptValue::invalid()), 0);
        assert_eq!(script_value_cast::<String>(&ScriptValue::invalid()), "");
    }
}
