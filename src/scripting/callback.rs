// Tue Oct 13 2026 - Alex

use crate::scripting::engine::ScriptEngine;
use crate::scripting::value::ScriptValue;
use log::warn;

const SCOPE_PROPERTY: &str = "scope";
const CALLBACK_PROPERTY: &str = "callback";

/// Normalize the callback shapes async native APIs accept into one handler
/// object:
///
/// - `callback` with an empty or missing name: called with `this = null`
/// - `scope` plus a method name: `scope[name]` called with `this = scope`
/// - `scope` plus a function: the function called with `this = scope`
///
/// Anything else yields a handler that only warns when invoked.
pub fn make_scoped_handler_object(
    engine: &dyn ScriptEngine,
    scope_or_callback: &ScriptValue,
    method_or_name: &ScriptValue,
) -> ScriptValue {
    let handler = engine.new_object();
    let no_name = !method_or_name.is_valid()
        || method_or_name.is_undefined()
        || method_or_name.is_null()
        || (method_or_name.is_string() && method_or_name.to_string().is_empty());

    let (scope, callback) = if scope_or_callback.is_function() && no_name {
        (engine.null_value(), scope_or_callback.clone())
    } else if scope_or_callback.is_object() && method_or_name.is_string() {
        let name = method_or_name.to_string();
        let callback = scope_or_callback.property(&name);
        if !callback.is_function() {
            warn!("Scoped handler: '{}' is not a function on the given scope", name);
        }
        (scope_or_callback.clone(), callback)
    } else if scope_or_callback.is_object() && method_or_name.is_function() {
        (scope_or_callback.clone(), method_or_name.clone())
    } else {
        warn!(
            "Scoped handler: unsupported callback shape ({}, {})",
            scope_or_callback.kind(),
            method_or_name.kind()
        );
        (engine.null_value(), engine.undefined_value())
    };

    handler.set_property(SCOPE_PROPERTY, &scope);
    handler.set_property(CALLBACK_PROPERTY, &callback);
    handler
}

/// Invoke a handler built by [`make_scoped_handler_object`] error-first with
/// exactly `(err, result)`. A missing `err` is passed as `null`.
pub fn call_scoped_handler_object(handler: &ScriptValue, err: &ScriptValue, result: &ScriptValue) -> ScriptValue {
    let engine = match handler.engine() {
        Some(engine) => engine,
        None => {
            warn!("Scoped handler invoked without a live engine");
            return ScriptValue::invalid();
        }
    };
    let callback = handler.property(CALLBACK_PROPERTY);
    if !callback.is_function() {
        warn!("Scoped handler has no callable target");
        return engine.undefined_value();
    }

    let err = if err.is_valid() { err.clone() } else { engine.null_value() };
    let result = if result.is_valid() { result.clone() } else { engine.undefined_value() };
    let scope = handler.property(SCOPE_PROPERTY);

    let pending_before = engine.uncaught_exception_report().map(|report| report.id);
    let returned = callback.call(&scope, &[err, result]);
    let pending_after = engine.uncaught_exception_report().map(|report| report.id);
    // Only report what this handler threw.
    if pending_after.is_some() && pending_after != pending_before {
        engine.maybe_emit_uncaught_exception("scoped handler callback");
    }
    returned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, EngineConfig};
    use crate::scripting::engine::{new_script_engine, ScriptEnginePointer};
    use crate::scripting::exception::UncaughtException;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn engine() -> ScriptEnginePointer {
        new_script_engine(BackendKind::Interpreter, EngineConfig::default())
    }

    #[test]
    fn test_plain_callback_gets_null_error() {
        let engine = engine();
        engine.evaluate(
            "var got = []; function done(e, r) { got.push(e === null); got.push(r); got.push(this === null); }",
            "callback.js",
        );
        let done = engine.global_object().property("done");
        let handler = make_scoped_handler_object(engine.as_ref(), &done, &ScriptValue::invalid());
        call_scoped_handler_object(&handler, &ScriptValue::invalid(), &engine.new_int(42));

        let got = engine.evaluate("got.join(',')", "check.js");
        assert_eq!(got.to_string(), "true,42,false");
    }

    #[test]
    fn test_scope_and_method_name() {
        let engine = engine();
        engine.evaluate(
            "var scope = { hits: 0, onDone: function(e, r) { this.hits = this.hits + 1; this.lastErr = e; this.lastResult = r; } };",
            "callback.js",
        );
        let scope = engine.global_object().property("scope");
        let handler = make_scoped_handler_object(engine.as_ref(), &scope, &engine.new_string("onDone"));
        call_scoped_handler_object(&handler, &engine.new_string("bad"), &engine.undefined_value());

        assert_eq!(scope.property("hits").to_int32(), 1);
        assert_eq!(scope.property("lastErr").to_string(), "bad");
        assert!(scope.property("lastResult").is_undefined());
    }

    #[test]
    fn test_scope_and_function() {
        let engine = engine();
        engine.evaluate(
            "var target = { name: 'target' }; function report(e, r) { return this.name + ':' + r; }",
            "callback.js",
        );
        let global = engine.global_object();
        let handler = make_scoped_handler_object(engine.as_ref(), &global.property("target"), &global.property("report"));
        let returned = call_scoped_handler_object(&handler, &engine.null_value(), &engine.new_int(5));
        assert_eq!(returned.to_string(), "target:5");
    }

    #[test]
    fn test_invalid_shape_returns_undefined() {
        let engine = engine();
        let handler = make_scoped_handler_object(engine.as_ref(), &engine.new_int(3), &engine.new_int(4));
        let returned = call_scoped_handler_object(&handler, &ScriptValue::invalid(), &engine.new_int(1));
        assert!(returned.is_undefined());
        assert!(!engine.has_uncaught_exception());
    }

    #[test]
    fn test_throwing_handler_is_reported_once() {
        let engine = engine();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        engine.add_uncaught_exception_listener(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        engine.evaluate("function boom(e, r) { throw new Error('handler failed'); }", "callback.js");
        let boom = engine.global_object().property("boom");
        let handler = make_scoped_handler_object(engine.as_ref(), &boom, &engine.new_string(""));
        call_scoped_handler_object(&handler, &ScriptValue::invalid(), &ScriptValue::invalid());

        assert!(engine.has_uncaught_exception());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(engine.maybe_emit_uncaught_exception("again"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_succeeding_handler_leaves_earlier_exception_alone() {
        let engine = engine();
        let hints = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = hints.clone();
        engine.add_uncaught_exception_listener(Arc::new(move |report: &UncaughtException| {
            sink.lock().push(report.debug_hint.clone());
        }));
        engine.evaluate("var calls = 0; function ok(e, r) { calls++; return r; }", "callback.js");
        let ok = engine.global_object().property("ok");
        engine.evaluate("throw new Error('earlier')", "earlier.js");
        assert!(engine.has_uncaught_exception());

        let handler = make_scoped_handler_object(engine.as_ref(), &ok, &ScriptValue::invalid());
        let returned = call_scoped_handler_object(&handler, &ScriptValue::invalid(), &engine.new_int(9));
        assert_eq!(returned.to_int32(), 9);
        assert!(hints.lock().is_empty());

        assert!(engine.maybe_emit_uncaught_exception("tick"));
        assert_eq!(*hints.lock(), vec!["tick".to_string()]);
        assert_eq!(engine.uncaught_exception_report().unwrap().message, "earlier");
    }
}
