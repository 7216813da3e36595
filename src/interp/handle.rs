// Wed Oct 14 2026 - Alex

use crate::interp::engine::InterpEngine;
use crate::interp::value::{value_to_variant, ObjectClass, Value};
use crate::scripting::context::ScriptContext;
use crate::scripting::engine::{ScriptEngine, ScriptEnginePointer};
use crate::scripting::object::ScriptObject;
use crate::scripting::types::{ScriptVariant, ValueKind};
use crate::scripting::value::{ScriptValue, ScriptValueProxy};
use log::warn;
use std::any::Any;
use std::cell::RefCell;
use std::sync::{Arc, Weak};

/// Interpreter value as seen by the host.
pub struct InterpValue {
    engine: Weak<InterpEngine>,
    value: Value,
}

impl InterpValue {
    pub(crate) fn value(&self) -> &Value {
        &self.value
    }

    fn live(&self) -> Option<Arc<InterpEngine>> {
        self.engine.upgrade().filter(|engine| !engine.is_shut_down())
    }

    fn live_for(&self, operation: &str) -> Option<Arc<InterpEngine>> {
        let engine = self.live();
        if engine.is_none() {
            warn!("Script value used for {} after its engine was shut down", operation);
        }
        engine
    }

    fn same_engine<'a>(&self, other: &'a ScriptValue) -> Option<&'a InterpValue> {
        other
            .downcast_proxy::<InterpValue>()
            .filter(|proxy| Weak::ptr_eq(&proxy.engine, &self.engine))
            .filter(|proxy| proxy.live().is_some())
    }
}

impl ScriptValueProxy for InterpValue {
    fn engine(&self) -> Option<ScriptEnginePointer> {
        self.live().map(|engine| engine as ScriptEnginePointer)
    }

    fn kind(&self) -> ValueKind {
        match self.live() {
            Some(_) => self.value.kind(),
            None => ValueKind::Invalid,
        }
    }

    fn to_bool(&self) -> bool {
        self.live().map(|_| self.value.to_boolean()).unwrap_or(false)
    }

    fn to_number(&self) -> f64 {
        self.live().map(|_| self.value.to_number()).unwrap_or(f64::NAN)
    }

    fn to_display_string(&self) -> String {
        match self.live() {
            Some(_) => self.value.to_display(),
            None => "<invalid>".to_string(),
        }
    }

    fn to_variant(&self) -> ScriptVariant {
        match self.live() {
            Some(_) => value_to_variant(&self.value, 0),
            None => ScriptVariant::Null,
        }
    }

    fn to_bytes(&self) -> Option<Vec<u8>> {
        self.live()?;
        let object = self.value.as_object()?;
        let data = object.lock();
        match &data.class {
            ObjectClass::ArrayBuffer(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    fn to_host_object(&self) -> Option<Arc<dyn ScriptObject>> {
        self.live()?;
        self.value.as_object()?.host_binding()?.object.upgrade()
    }

    fn property(&self, name: &str) -> ScriptValue {
        let engine = match self.live_for("property read") {
            Some(engine) => engine,
            None => return ScriptValue::invalid(),
        };
        if !engine.permits("property") {
            return ScriptValue::invalid();
        }
        if self.value.as_object().is_none() {
            return ScriptValue::invalid();
        }
        engine.host_boundary(|engine| engine.get(&self.value, name))
    }

    fn set_property(&self, name: &str, value: &ScriptValue) -> bool {
        let engine = match self.live_for("property write") {
            Some(engine) => engine,
            None => return false,
        };
        if !engine.permits("set_property") {
            return false;
        }
        let object = match self.value.as_object() {
            Some(object) => object.clone(),
            None => return false,
        };
        let value = engine.import(value);
        let before = engine.exceptions.pending_id();
        engine.host_boundary(|engine| engine.put_property(&object, name, value).map(|_| Value::Undefined));
        engine.exceptions.pending_id() == before
    }

    fn property_names(&self) -> Vec<String> {
        match (self.live(), self.value.as_object()) {
            (Some(engine), Some(object)) => engine.own_keys(object),
            _ => Vec::new(),
        }
    }

    fn call(&self, this: &ScriptValue, args: &[ScriptValue]) -> ScriptValue {
        let engine = match self.live_for("call") {
            Some(engine) => engine,
            None => return ScriptValue::invalid(),
        };
        if !engine.permits("call") {
            return ScriptValue::invalid();
        }
        if !self.value.is_callable() {
            return ScriptValue::invalid();
        }
        let this = engine.import(this);
        let args = args.iter().map(|arg| engine.import(arg)).collect();
        engine.host_boundary(|engine| engine.call_function(&self.value, this, args))
    }

    fn construct(&self, args: &[ScriptValue]) -> ScriptValue {
        let engine = match self.live_for("construct") {
            Some(engine) => engine,
            None => return ScriptValue::invalid(),
        };
        if !engine.permits("construct") {
            return ScriptValue::invalid();
        }
        if !self.value.is_callable() {
            return ScriptValue::invalid();
        }
        let args = args.iter().map(|arg| engine.import(arg)).collect();
        engine.host_boundary(|engine| engine.construct(&self.value, args))
    }

    fn equals(&self, other: &ScriptValue) -> bool {
        self.same_engine(other)
            .map(|other| self.value.loose_equals(&other.value))
            .unwrap_or(false)
    }

    fn strict_equals(&self, other: &ScriptValue) -> bool {
        match self.same_engine(other) {
            Some(other) => self.value.strict_equals(&other.value),
            None => self.live().is_none() && !other.is_valid(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl InterpEngine {
    pub(crate) fn wrap(&self, value: Value) -> ScriptValue {
        ScriptValue::from_proxy(Arc::new(InterpValue {
            engine: self.self_ref.clone(),
            value,
        }))
    }

    /// Bring a host handle into this engine. Handles of other engines are
    /// copied through their variant form.
    pub(crate) fn import(&self, value: &ScriptValue) -> Value {
        if let Some(proxy) = value.downcast_proxy::<InterpValue>() {
            if Weak::ptr_eq(&proxy.engine, &self.self_ref) {
                return proxy.value.clone();
            }
        }
        if !value.is_valid() {
            return Value::Undefined;
        }
        warn!("Copying a {} value from another engine", value.kind());
        self.value_from_variant(&value.to_variant())
    }

    pub(crate) fn value_from_variant(&self, variant: &ScriptVariant) -> Value {
        match variant {
            ScriptVariant::Null => Value::Null,
            ScriptVariant::Bool(b) => Value::Bool(*b),
            ScriptVariant::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            ScriptVariant::String(s) => Value::string(s),
            ScriptVariant::Array(items) => {
                Value::Object(self.alloc_array(items.iter().map(|item| self.value_from_variant(item)).collect()))
            }
            ScriptVariant::Object(map) => {
                let object = self.alloc(ObjectClass::Ordinary);
                for (key, item) in map {
                    object.define(key, self.value_from_variant(item));
                }
                Value::Object(object)
            }
        }
    }
}

/// Arguments and receiver of one native call.
pub(crate) struct InterpContext {
    engine: Arc<InterpEngine>,
    this: Value,
    callee: Value,
    args: Vec<Value>,
    file: Arc<str>,
    line: i32,
    backtrace: Vec<String>,
    thrown: RefCell<Option<Value>>,
}

impl InterpContext {
    pub(crate) fn new(
        engine: Arc<InterpEngine>,
        this: Value,
        callee: Value,
        args: Vec<Value>,
        file: Arc<str>,
        line: i32,
        backtrace: Vec<String>,
    ) -> Self {
        Self {
            engine,
            this,
            callee,
            args,
            file,
            line,
            backtrace,
            thrown: RefCell::new(None),
        }
    }

    pub(crate) fn take_thrown(&self) -> Option<Value> {
        self.thrown.borrow_mut().take()
    }

    fn raw_argument(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Undefined)
    }
}

impl ScriptContext for InterpContext {
    fn argument_count(&self) -> usize {
        self.args.len()
    }

    fn argument(&self, index: usize) -> ScriptValue {
        self.engine.wrap(self.raw_argument(index))
    }

    fn this_object(&self) -> ScriptValue {
        self.engine.wrap(self.this.clone())
    }

    fn callee(&self) -> ScriptValue {
        self.engine.wrap(self.callee.clone())
    }

    fn engine(&self) -> ScriptEnginePointer {
        self.engine.clone()
    }

    fn backtrace(&self) -> Vec<String> {
        self.backtrace.clone()
    }

    fn file_name(&self) -> String {
        self.file.to_string()
    }

    fn line_number(&self) -> i32 {
        self.line
    }

    fn throw_error(&self, message: &str) -> ScriptValue {
        let error = Value::Object(self.engine.error_object("Error", message));
        *self.thrown.borrow_mut() = Some(error.clone());
        self.engine.wrap(error)
    }

    fn throw_value(&self, value: ScriptValue) -> ScriptValue {
        let value = self.engine.import(&value);
        *self.thrown.borrow_mut() = Some(value.clone());
        self.engine.wrap(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::scripting::context::native_function;

    #[test]
    fn test_handles_compare_within_engine() {
        let engine = InterpEngine::new(EngineConfig::default());
        let object = engine.evaluate("var shared = {}; shared", "cmp.js");
        let again = engine.global_object().property("shared");
        assert!(object.strict_equals(&again));
        assert!(engine.new_number(1.0).equals(&engine.new_string("1")));
        assert!(!engine.new_number(1.0).strict_equals(&engine.new_string("1")));

        let other = InterpEngine::new(EngineConfig::default());
        assert!(!other.new_number(1.0).strict_equals(&engine.new_number(1.0)));
    }

    #[test]
    fn test_foreign_thread_call_is_counted() {
        let engine = InterpEngine::new(EngineConfig::default());
        let f = engine.evaluate("var hits = 0; (function(n) { hits++; return n + 1; })", "f.js");
        let value = engine.new_int(1);
        let (result, violations) = std::thread::scope(|s| {
            s.spawn(|| (f.call(&ScriptValue::invalid(), &[value.clone()]).to_int32(), engine.thread_violation_count()))
                .join()
                .unwrap()
        });
        assert_eq!(result, 2);
        assert_eq!(violations, 1);
        assert_eq!(engine.global_object().property("hits").to_int32(), 1);
    }

    #[test]
    fn test_foreign_thread_call_is_refused_when_strict() {
        let engine = InterpEngine::new(EngineConfig::default().with_strict_thread_checks(true));
        let f = engine.evaluate("var hits = 0; (function() { hits++; return 7; })", "f.js");
        let object = engine.new_object();
        let refused = std::thread::scope(|s| {
            s.spawn(|| {
                (
                    f.call(&ScriptValue::invalid(), &[]).is_valid(),
                    f.construct(&[]).is_valid(),
                    object.set_property("x", &ScriptValue::invalid()),
                    object.property("x").is_valid(),
                )
            })
            .join()
            .unwrap()
        });
        assert_eq!(refused, (false, false, false, false));
        assert_eq!(engine.thread_violation_count(), 4);
        assert_eq!(engine.global_object().property("hits").to_int32(), 0);
        assert_eq!(f.call(&ScriptValue::invalid(), &[]).to_int32(), 7);
    }

    #[test]
    fn test_context_throw_error_is_catchable() {
        let engine = InterpEngine::new(EngineConfig::default());
        engine.register_function(
            "fail",
            native_function(|ctx, _engine| ctx.throw_error(&format!("failed with {}", ctx.argument(0)))),
            1,
        );
        let result = engine.evaluate("var m; try { fail(3); } catch (e) { m = e.message; } m", "ctx.js");
        assert_eq!(result.to_string(), "failed with 3");
        assert!(!engine.has_uncaught_exception());
    }

    #[test]
    fn test_context_reports_call_site() {
        let engine = InterpEngine::new(EngineConfig::default());
        engine.register_function(
            "where",
            native_function(|ctx, engine| engine.new_string(&format!("{}:{}", ctx.file_name(), ctx.line_number()))),
            0,
        );
        let result = engine.evaluate("\n\nwhere()", "site.js");
        assert_eq!(result.to_string(), "site.js:3");
    }

    #[test]
    fn test_foreign_handle_is_copied() {
        let first = InterpEngine::new(EngineConfig::default());
        let second = InterpEngine::new(EngineConfig::default());
        let list = first.evaluate("[1, 'two']", "a.js");
        second.global_object().set_property("imported", &list);
        let joined = second.evaluate("imported.join('+')", "b.js");
        assert_eq!(joined.to_string(), "1+two");
    }
}
