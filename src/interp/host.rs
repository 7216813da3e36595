// Wed Oct 14 2026 - Alex

use crate::interp::engine::InterpEngine;
use crate::interp::eval::Flow;
use crate::interp::value::{value_to_variant, Callable, HostBinding, ObjectCell, ObjectClass, ObjectRef, Value};
use crate::scripting::object::{MethodInfo, MethodKind, PropertyInfo, ScriptObject};
use crate::scripting::types::{ValueOwnership, WrapOptions};
use crate::scripting::value::ScriptValue;
use log::debug;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

struct WrapperRecord {
    wrapper: Weak<ObjectCell>,
    identity: usize,
    options: WrapOptions,
    ownership: ValueOwnership,
    /// Present when the engine shares ownership of the native object.
    strong: Option<Arc<dyn ScriptObject>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub released: usize,
    pub dropped: usize,
}

/// Every wrapper the engine has handed out, keyed by native identity.
#[derive(Default)]
pub struct WrapperTable {
    records: Mutex<Vec<WrapperRecord>>,
}

impl WrapperTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn find_live(&self, identity: usize, options: WrapOptions) -> Option<ObjectRef> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.identity == identity && r.options == options)
            .find_map(|r| r.wrapper.upgrade())
    }

    pub fn insert(&self, wrapper: &ObjectRef, object: &Arc<dyn ScriptObject>, ownership: ValueOwnership, options: WrapOptions) {
        let strong = match ownership {
            ValueOwnership::HostOwned => None,
            ValueOwnership::ScriptOwned | ValueOwnership::AutoOwned => Some(object.clone()),
        };
        self.records.lock().push(WrapperRecord {
            wrapper: Arc::downgrade(wrapper),
            identity: crate::scripting::object::object_identity(object),
            options,
            ownership,
            strong,
        });
    }

    /// Forget wrappers script can no longer reach and release what the
    /// engine owned through them.
    pub fn sweep(&self) -> SweepStats {
        let dead: Vec<WrapperRecord> = {
            let mut records = self.records.lock();
            let (dead, live) = records.drain(..).partition(|r| r.wrapper.strong_count() == 0);
            *records = live;
            dead
        };
        Self::release_all(dead)
    }

    /// Drop every record regardless of reachability.
    pub fn clear(&self) -> SweepStats {
        let all: Vec<WrapperRecord> = self.records.lock().drain(..).collect();
        Self::release_all(all)
    }

    fn release_all(records: Vec<WrapperRecord>) -> SweepStats {
        let mut stats = SweepStats::default();
        for record in records {
            stats.dropped += 1;
            let strong = match record.strong {
                Some(strong) => strong,
                None => continue,
            };
            let release = match record.ownership {
                ValueOwnership::ScriptOwned => true,
                ValueOwnership::AutoOwned => Arc::strong_count(&strong) == 1,
                ValueOwnership::HostOwned => false,
            };
            if release {
                strong.release();
                stats.released += 1;
            }
        }
        stats
    }
}

fn visible_property(object: &dyn ScriptObject, options: WrapOptions, key: &str) -> Option<PropertyInfo> {
    object
        .properties()
        .into_iter()
        .filter(|p| !(p.inherited && options.contains(WrapOptions::EXCLUDE_SUPER_CLASS_PROPERTIES)))
        .find(|p| p.name == key)
}

fn visible_methods(object: &dyn ScriptObject, options: WrapOptions) -> Vec<MethodInfo> {
    object
        .methods()
        .into_iter()
        .filter(|m| !(m.kind == MethodKind::Slot && options.contains(WrapOptions::EXCLUDE_SLOTS)))
        .filter(|m| !(m.inherited && options.contains(WrapOptions::EXCLUDE_SUPER_CLASS_METHODS)))
        .collect()
}

impl InterpEngine {
    pub(crate) fn wrap_host_object(
        &self,
        object: Arc<dyn ScriptObject>,
        ownership: ValueOwnership,
        options: WrapOptions,
    ) -> ObjectRef {
        let identity = crate::scripting::object::object_identity(&object);
        if options.contains(WrapOptions::PREFER_EXISTING_WRAPPER_OBJECT) {
            if let Some(existing) = self.wrappers.find_live(identity, options) {
                return existing;
            }
        }
        let binding = HostBinding {
            object: Arc::downgrade(&object),
            identity,
            ownership,
            options,
            class_name: object.class_name().to_string(),
        };
        let wrapper = self.alloc(ObjectClass::Host(binding));
        self.wrappers.insert(&wrapper, &object, ownership, options);
        debug!("Wrapped {} ({:?})", object.class_name(), ownership);
        wrapper
    }

    /// Host-side property lookup. `None` means continue with the prototype.
    pub(crate) fn host_get(&self, wrapper: &ObjectRef, binding: &HostBinding, key: &str) -> Option<Value> {
        let object = match binding.object.upgrade() {
            Some(object) => object,
            None => return Some(Value::Undefined),
        };
        if visible_property(object.as_ref(), binding.options, key).is_some() {
            let variant = object.property(key).unwrap_or_default();
            return Some(self.value_from_variant(&variant));
        }
        if let Some(method) = visible_methods(object.as_ref(), binding.options)
            .into_iter()
            .find(|m| m.name == key)
        {
            let function = self.alloc(ObjectClass::Function(Callable::HostMethod {
                wrapper: wrapper.clone(),
                method: method.name.clone(),
            }));
            function.define("length", Value::Number(method.arity.max(0) as f64));
            function.define("name", Value::string(&method.name));
            return Some(Value::Object(function));
        }
        object.dynamic_property(key).map(|variant| self.value_from_variant(&variant))
    }

    /// Returns false when the host declines and the value should become an
    /// ordinary own property of the wrapper.
    pub(crate) fn host_put(&self, binding: &HostBinding, key: &str, value: &Value) -> bool {
        let object = match binding.object.upgrade() {
            Some(object) => object,
            None => {
                debug!("Ignoring write of '{}' to deleted {}", key, binding.class_name);
                return true;
            }
        };
        let variant = value_to_variant(value, 0);
        if let Some(info) = visible_property(object.as_ref(), binding.options, key) {
            if info.writable {
                object.set_property(key, variant);
            }
            return true;
        }
        if object.dynamic_property(key).is_some()
            || binding.options.contains(WrapOptions::AUTO_CREATE_DYNAMIC_PROPERTIES)
        {
            return object.set_dynamic_property(key, variant);
        }
        false
    }

    pub(crate) fn host_has(&self, binding: &HostBinding, key: &str) -> bool {
        let object = match binding.object.upgrade() {
            Some(object) => object,
            None => return false,
        };
        visible_property(object.as_ref(), binding.options, key).is_some()
            || visible_methods(object.as_ref(), binding.options).iter().any(|m| m.name == key)
            || object.dynamic_property(key).is_some()
    }

    pub(crate) fn host_keys(&self, binding: &HostBinding) -> Vec<String> {
        let object = match binding.object.upgrade() {
            Some(object) => object,
            None => return Vec::new(),
        };
        let mut keys: Vec<String> = object
            .properties()
            .into_iter()
            .filter(|p| !(p.inherited && binding.options.contains(WrapOptions::EXCLUDE_SUPER_CLASS_PROPERTIES)))
            .map(|p| p.name)
            .collect();
        if !binding.options.contains(WrapOptions::SKIP_METHODS_IN_ENUMERATION) {
            keys.extend(visible_methods(object.as_ref(), binding.options).into_iter().map(|m| m.name));
        }
        for name in object.dynamic_property_names() {
            if !keys.contains(&name) {
                keys.push(name);
            }
        }
        keys
    }

    pub(crate) fn invoke_host_method(&self, wrapper: &ObjectRef, method: &str, args: Vec<Value>) -> Flow<Value> {
        let binding = match wrapper.host_binding() {
            Some(binding) => binding,
            None => return self.throw_error("TypeError", format!("{} is not a function", method)),
        };
        let object = match binding.object.upgrade() {
            Some(object) => object,
            None => {
                return self.throw_error(
                    "TypeError",
                    format!("cannot call {}(): {} has been deleted", method, binding.class_name),
                )
            }
        };
        let engine = match self.self_ref.upgrade() {
            Some(engine) => engine,
            None => return Ok(Value::Undefined),
        };
        let args: Vec<ScriptValue> = args.into_iter().map(|value| self.wrap(value)).collect();
        let before = self.exceptions.pending_id();
        let result = object.invoke(engine.as_ref(), method, &args);
        self.check_raised(before)?;
        Ok(self.import(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::scripting::engine::ScriptEngine;
    use crate::scripting::types::ScriptVariant;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        value: Mutex<i64>,
        extra: Mutex<Vec<(String, ScriptVariant)>>,
        released: AtomicUsize,
    }

    impl ScriptObject for Counter {
        fn class_name(&self) -> &str {
            "Counter"
        }

        fn methods(&self) -> Vec<MethodInfo> {
            vec![
                MethodInfo::invokable("increment").with_arity(1),
                MethodInfo::slot("reset"),
                MethodInfo::invokable("describe").inherited(),
            ]
        }

        fn properties(&self) -> Vec<PropertyInfo> {
            vec![
                PropertyInfo::read_write("value"),
                PropertyInfo::read_only("kind"),
                PropertyInfo::read_only("base").inherited(),
            ]
        }

        fn invoke(&self, engine: &dyn ScriptEngine, method: &str, args: &[ScriptValue]) -> ScriptValue {
            match method {
                "increment" => {
                    let step = args.first().map(|a| a.to_number() as i64).unwrap_or(1);
                    let mut value = self.value.lock();
                    *value += step;
                    engine.new_number(*value as f64)
                }
                "reset" => {
                    *self.value.lock() = 0;
                    engine.undefined_value()
                }
                "describe" => engine.new_string("counter"),
                _ => engine.undefined_value(),
            }
        }

        fn property(&self, name: &str) -> Option<ScriptVariant> {
            match name {
                "value" => Some(ScriptVariant::from(*self.value.lock())),
                "kind" => Some(ScriptVariant::from("counter")),
                "base" => Some(ScriptVariant::from(true)),
                _ => None,
            }
        }

        fn set_property(&self, name: &str, value: ScriptVariant) -> bool {
            if name == "value" {
                *self.value.lock() = value.as_i64().unwrap_or(0);
                return true;
            }
            false
        }

        fn dynamic_property(&self, name: &str) -> Option<ScriptVariant> {
            self.extra.lock().iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        }

        fn set_dynamic_property(&self, name: &str, value: ScriptVariant) -> bool {
            let mut extra = self.extra.lock();
            extra.retain(|(k, _)| k != name);
            extra.push((name.to_string(), value));
            true
        }

        fn dynamic_property_names(&self) -> Vec<String> {
            self.extra.lock().iter().map(|(k, _)| k.clone()).collect()
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn engine() -> Arc<InterpEngine> {
        InterpEngine::new(EngineConfig::default())
    }

    #[test]
    fn test_methods_and_properties_from_script() {
        let engine = engine();
        let counter = Arc::new(Counter::default());
        engine.register_global_object("counter", counter.clone());
        let result = engine.evaluate(
            "counter.increment(5); counter.increment(2); counter.value = counter.value * 10; counter.kind = 'x'; counter.kind + ':' + counter.value",
            "host.js",
        );
        assert_eq!(result.to_string(), "counter:70");
        assert_eq!(*counter.value.lock(), 70);
    }

    #[test]
    fn test_wrap_options_filter_members() {
        let engine = engine();
        let counter: Arc<dyn ScriptObject> = Arc::new(Counter::default());
        let options = WrapOptions::EXCLUDE_SLOTS
            | WrapOptions::EXCLUDE_SUPER_CLASS_CONTENTS
            | WrapOptions::SKIP_METHODS_IN_ENUMERATION;
        let wrapped = engine.new_qobject(counter.clone(), ValueOwnership::HostOwned, options);
        assert!(wrapped.property("reset").is_undefined());
        assert!(wrapped.property("describe").is_undefined());
        assert!(wrapped.property("base").is_undefined());
        assert!(wrapped.property("increment").is_function());
        let names = wrapped.property_names();
        assert!(names.contains(&"value".to_string()));
        assert!(!names.contains(&"increment".to_string()));

        let plain = engine.new_qobject(counter, ValueOwnership::HostOwned, WrapOptions::default());
        assert!(plain.property("reset").is_function());
        assert!(plain.property_names().contains(&"increment".to_string()));
    }

    #[test]
    fn test_dynamic_properties_need_opt_in() {
        let engine = engine();
        let counter = Arc::new(Counter::default());
        let plain = engine.new_qobject(counter.clone(), ValueOwnership::HostOwned, WrapOptions::default());
        plain.set_property("color", &engine.new_string("red"));
        assert!(counter.dynamic_property("color").is_none());
        assert_eq!(plain.property("color").to_string(), "red");

        let dynamic = engine.new_qobject(
            counter.clone(),
            ValueOwnership::HostOwned,
            WrapOptions::AUTO_CREATE_DYNAMIC_PROPERTIES,
        );
        dynamic.set_property("size", &engine.new_int(3));
        assert_eq!(counter.dynamic_property("size"), Some(ScriptVariant::from(3)));
        assert_eq!(plain.property("size").to_int32(), 3);
    }

    #[test]
    fn test_prefer_existing_wrapper() {
        let engine = engine();
        let counter: Arc<dyn ScriptObject> = Arc::new(Counter::default());
        let options = WrapOptions::PREFER_EXISTING_WRAPPER_OBJECT;
        let first = engine.new_qobject(counter.clone(), ValueOwnership::HostOwned, options);
        let second = engine.new_qobject(counter.clone(), ValueOwnership::HostOwned, options);
        assert!(first.strict_equals(&second));
        let third = engine.new_qobject(counter, ValueOwnership::HostOwned, WrapOptions::default());
        assert!(!first.strict_equals(&third));
    }

    #[test]
    fn test_ownership_policies_on_collection() {
        let engine = engine();
        let script_owned = Arc::new(Counter::default());
        let auto_shared = Arc::new(Counter::default());
        let host_owned = Arc::new(Counter::default());

        let a = engine.new_qobject(script_owned.clone(), ValueOwnership::ScriptOwned, WrapOptions::default());
        let b = engine.new_qobject(auto_shared.clone(), ValueOwnership::AutoOwned, WrapOptions::default());
        let c = engine.new_qobject(host_owned.clone(), ValueOwnership::HostOwned, WrapOptions::default());
        drop((a, b, c));
        engine.collect_garbage();

        assert_eq!(script_owned.released.load(Ordering::SeqCst), 1);
        assert_eq!(auto_shared.released.load(Ordering::SeqCst), 0);
        assert_eq!(host_owned.released.load(Ordering::SeqCst), 0);
        assert!(engine.wrappers.is_empty());
    }

    #[test]
    fn test_auto_owned_released_when_engine_holds_last_reference() {
        let engine = engine();
        let counter = Arc::new(Counter::default());
        let weak = Arc::downgrade(&counter);
        let wrapped = engine.new_qobject(counter, ValueOwnership::AutoOwned, WrapOptions::default());
        assert_eq!(wrapped.property("kind").to_string(), "counter");
        drop(wrapped);
        let stats = engine.wrappers.sweep();
        assert_eq!(stats, SweepStats { released: 1, dropped: 1 });
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_deleted_host_object() {
        let engine = engine();
        let counter: Arc<dyn ScriptObject> = Arc::new(Counter::default());
        engine.register_global_object("gone", counter.clone());
        drop(counter);
        let value = engine.evaluate("typeof gone.value", "gone.js");
        assert_eq!(value.to_string(), "undefined");
        engine.evaluate("gone.increment(1)", "gone.js");
        let report = engine.uncaught_exception_report().unwrap();
        assert_eq!(report.name, "TypeError");
    }

    #[test]
    fn test_host_raise_becomes_script_throw() {
        struct Strict;
        impl ScriptObject for Strict {
            fn class_name(&self) -> &str {
                "Strict"
            }
            fn methods(&self) -> Vec<MethodInfo> {
                vec![MethodInfo::invokable("check")]
            }
            fn invoke(&self, engine: &dyn ScriptEngine, _method: &str, _args: &[ScriptValue]) -> ScriptValue {
                let error = engine.make_error(&engine.new_string("rejected"), "RangeError");
                engine.raise_exception(&error);
                engine.undefined_value()
            }
        }
        let engine = engine();
        let strict: Arc<dyn ScriptObject> = Arc::new(Strict);
        engine.register_global_object("strict", strict.clone());
        let value = engine.evaluate("var r; try { strict.check(); r = 'no'; } catch (e) { r = e.name + ':' + e.message; } r", "raise.js");
        assert_eq!(value.to_string(), "RangeError:rejected");
        assert!(!engine.has_uncaught_exception());
    }
}
