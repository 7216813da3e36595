// Thu Oct 15 2026 - Alex

use crate::interp::engine::InterpEngine;
use crate::interp::handle::InterpValue;
use crate::interp::scope::{Scope, ScopeRef};
use crate::interp::value::{number_to_string, value_to_variant, ObjectCell, ObjectClass, ObjectRef, Value};
use crate::scripting::context::{native_function, ScriptContext, ScriptFunction};
use crate::scripting::engine::ScriptEngine;
use crate::scripting::value::ScriptValue;
use ahash::RandomState;
use log::info;
use std::collections::HashMap;

pub(crate) const ERROR_TYPES: [&str; 5] = ["Error", "TypeError", "RangeError", "SyntaxError", "ReferenceError"];

/// Global object, global scope and the intrinsic prototypes.
pub(crate) struct Realm {
    pub global: ObjectRef,
    pub global_scope: ScopeRef,
    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub string_prototype: ObjectRef,
    pub number_prototype: ObjectRef,
    pub error_prototype: ObjectRef,
    pub error_prototypes: HashMap<String, ObjectRef, RandomState>,
}

impl Realm {
    pub(crate) fn new() -> Self {
        let object_prototype = ObjectCell::new(ObjectClass::Ordinary, None);
        let derived = || ObjectCell::new(ObjectClass::Ordinary, Some(object_prototype.clone()));
        let function_prototype = derived();
        let array_prototype = derived();
        let string_prototype = derived();
        let number_prototype = derived();
        let error_prototype = derived();
        error_prototype.define("name", Value::string("Error"));
        error_prototype.define("message", Value::string(""));

        let mut error_prototypes = HashMap::default();
        error_prototypes.insert("Error".to_string(), error_prototype.clone());
        for name in ERROR_TYPES.iter().skip(1) {
            let prototype = ObjectCell::new(ObjectClass::Ordinary, Some(error_prototype.clone()));
            prototype.define("name", Value::string(name));
            error_prototypes.insert(name.to_string(), prototype);
        }

        let global = ObjectCell::new(ObjectClass::Ordinary, Some(object_prototype.clone()));
        Self {
            global_scope: Scope::global(global.clone()),
            global,
            object_prototype,
            function_prototype,
            array_prototype,
            string_prototype,
            number_prototype,
            error_prototype,
            error_prototypes,
        }
    }

    /// Every object the realm roots.
    pub(crate) fn roots(&self) -> Vec<ObjectRef> {
        let mut roots = vec![
            self.global.clone(),
            self.object_prototype.clone(),
            self.function_prototype.clone(),
            self.array_prototype.clone(),
            self.string_prototype.clone(),
            self.number_prototype.clone(),
            self.error_prototype.clone(),
        ];
        roots.extend(self.error_prototypes.values().cloned());
        roots
    }
}

fn interp(engine: &dyn ScriptEngine) -> Option<&InterpEngine> {
    engine.as_any().downcast_ref::<InterpEngine>()
}

fn raw(value: &ScriptValue) -> Value {
    value
        .downcast_proxy::<InterpValue>()
        .map(|proxy| proxy.value().clone())
        .unwrap_or(Value::Undefined)
}

fn this_array(ctx: &dyn ScriptContext) -> Option<ObjectRef> {
    match raw(&ctx.this_object()) {
        Value::Object(object) if matches!(object.lock().class, ObjectClass::Array(_)) => Some(object),
        _ => None,
    }
}

fn array_items(object: &ObjectRef) -> Vec<Value> {
    match &object.lock().class {
        ObjectClass::Array(items) => items.clone(),
        _ => Vec::new(),
    }
}

fn method(engine: &InterpEngine, target: &ObjectRef, name: &str, length: i32, function: ScriptFunction) {
    target.define(name, Value::Object(engine.alloc_native(function, name, length)));
}

/// Populate the realm's globals and prototypes.
pub(crate) fn install(engine: &InterpEngine) {
    let realm = match engine.realm() {
        Some(realm) => realm,
        None => return,
    };

    engine.register_function(
        "print",
        native_function(|ctx, engine| {
            let line = ctx.arguments().iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" ");
            info!(target: "script", "{}", line);
            engine.undefined_value()
        }),
        -1,
    );

    install_errors(engine, &realm);
    install_object(engine, &realm);
    install_array(engine, &realm);
    install_string(engine, &realm);
    install_number(engine, &realm);
    install_math(engine, &realm);
    install_json(engine, &realm);
}

fn install_errors(engine: &InterpEngine, realm: &Realm) {
    for name in ERROR_TYPES {
        let prototype = match realm.error_prototypes.get(name) {
            Some(prototype) => prototype.clone(),
            None => continue,
        };
        let constructor = engine.alloc_native(
            native_function(move |ctx, engine| {
                let message = ctx.argument(0);
                let message = if message.is_undefined() { String::new() } else { message.to_string() };
                match interp(engine) {
                    Some(interp) => interp.wrap(Value::Object(interp.error_object(name, &message))),
                    None => engine.undefined_value(),
                }
            }),
            name,
            1,
        );
        constructor.define("prototype", Value::Object(prototype));
        realm.global.define(name, Value::Object(constructor));
    }
}

fn install_object(engine: &InterpEngine, realm: &Realm) {
    let object = ObjectCell::new(ObjectClass::Ordinary, Some(realm.object_prototype.clone()));
    method(
        engine,
        &object,
        "keys",
        1,
        native_function(|ctx, engine| {
            let interp = match interp(engine) {
                Some(interp) => interp,
                None => return engine.undefined_value(),
            };
            let keys = match raw(&ctx.argument(0)) {
                Value::Object(object) => interp.own_keys(&object),
                _ => Vec::new(),
            };
            interp.wrap(Value::Object(interp.alloc_array(keys.iter().map(|k| Value::string(k)).collect())))
        }),
    );
    realm.global.define("Object", Value::Object(object));

    method(
        engine,
        &realm.object_prototype,
        "hasOwnProperty",
        1,
        native_function(|ctx, engine| {
            let key = ctx.argument(0).to_string();
            let own = match raw(&ctx.this_object()) {
                Value::Object(object) => interp(engine).map(|i| i.own_keys(&object).contains(&key)).unwrap_or(false),
                _ => false,
            };
            engine.new_bool(own)
        }),
    );
    method(
        engine,
        &realm.object_prototype,
        "toString",
        0,
        native_function(|ctx, engine| engine.new_string(&ctx.this_object().to_string())),
    );

    let conversions: [(&str, fn(&ScriptValue, &dyn ScriptEngine) -> ScriptValue); 3] = [
        ("String", |v, e| e.new_string(&if v.is_valid() { v.to_string() } else { String::new() })),
        ("Number", |v, e| e.new_number(if v.is_valid() { v.to_number() } else { 0.0 })),
        ("Boolean", |v, e| e.new_bool(v.to_bool())),
    ];
    for (name, convert) in conversions {
        let function = engine.alloc_native(
            native_function(move |ctx, engine| {
                let arg = if ctx.argument_count() == 0 { ScriptValue::invalid() } else { ctx.argument(0) };
                convert(&arg, engine)
            }),
            name,
            1,
        );
        realm.global.define(name, Value::Object(function));
    }

    let global_functions: [(&str, fn(&str) -> f64); 2] = [("parseInt", parse_int), ("parseFloat", parse_float)];
    for (name, parse) in global_functions {
        method(
            engine,
            &realm.global,
            name,
            1,
            native_function(move |ctx, engine| engine.new_number(parse(&ctx.argument(0).to_string()))),
        );
    }
    method(
        engine,
        &realm.global,
        "isNaN",
        1,
        native_function(|ctx, engine| engine.new_bool(ctx.argument(0).to_number().is_nan())),
    );
}

fn parse_int(s: &str) -> f64 {
    let s = s.trim_start();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (radix, digits) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(rest) => (16, rest),
        None => (10, s),
    };
    let end = digits.find(|c: char| !c.is_digit(radix)).unwrap_or(digits.len());
    if end == 0 {
        return f64::NAN;
    }
    let value = digits[..end]
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * radix as f64 + d as f64);
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(s: &str) -> f64 {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = s.as_bytes();
    while end < bytes.len() {
        let b = bytes[end];
        let ok = match b {
            b'0'..=b'9' => true,
            b'+' | b'-' => end == 0 || matches!(bytes[end - 1], b'e' | b'E'),
            b'.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            b'e' | b'E' if !seen_exp && end > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if !ok {
            break;
        }
        end += 1;
    }
    let mut candidate = &s[..end];
    while !candidate.is_empty() {
        if let Ok(value) = candidate.parse::<f64>() {
            return value;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    if s.starts_with("Infinity") {
        return f64::INFINITY;
    }
    f64::NAN
}

fn install_array(engine: &InterpEngine, realm: &Realm) {
    let prototype = &realm.array_prototype;
    method(
        engine,
        prototype,
        "push",
        1,
        native_function(|ctx, engine| {
            let array = match this_array(ctx) {
                Some(array) => array,
                None => return ctx.throw_error("push called on a non-array"),
            };
            let values = ctx_args(ctx);
            let length = match &mut array.lock().class {
                ObjectClass::Array(items) => {
                    items.extend(values);
                    items.len()
                }
                _ => 0,
            };
            engine.new_number(length as f64)
        }),
    );
    method(
        engine,
        prototype,
        "pop",
        0,
        native_function(|ctx, engine| {
            let popped = this_array(ctx).and_then(|array| match &mut array.lock().class {
                ObjectClass::Array(items) => items.pop(),
                _ => None,
            });
            match (popped, interp(engine)) {
                (Some(value), Some(interp)) => interp.wrap(value),
                _ => engine.undefined_value(),
            }
        }),
    );
    method(
        engine,
        prototype,
        "join",
        1,
        native_function(|ctx, engine| {
            let separator = ctx.argument(0);
            let separator = if separator.is_undefined() { ",".to_string() } else { separator.to_string() };
            let items = this_array(ctx).map(|array| array_items(&array)).unwrap_or_default();
            let joined = items
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_display() })
                .collect::<Vec<_>>()
                .join(&separator);
            engine.new_string(&joined)
        }),
    );
    method(
        engine,
        prototype,
        "indexOf",
        1,
        native_function(|ctx, engine| {
            let needle = raw(&ctx.argument(0));
            let items = this_array(ctx).map(|array| array_items(&array)).unwrap_or_default();
            let index = items.iter().position(|item| item.strict_equals(&needle));
            engine.new_number(index.map(|i| i as f64).unwrap_or(-1.0))
        }),
    );
    method(
        engine,
        prototype,
        "slice",
        2,
        native_function(|ctx, engine| {
            let interp = match interp(engine) {
                Some(interp) => interp,
                None => return engine.undefined_value(),
            };
            let items = this_array(ctx).map(|array| array_items(&array)).unwrap_or_default();
            let (start, end) = slice_bounds(items.len(), &ctx.argument(0), &ctx.argument(1));
            interp.wrap(Value::Object(interp.alloc_array(items[start..end].to_vec())))
        }),
    );
    method(
        engine,
        prototype,
        "forEach",
        1,
        native_function(|ctx, engine| {
            let callback = ctx.argument(0);
            let items = this_array(ctx).map(|array| array_items(&array)).unwrap_or_default();
            if let Some(interp) = interp(engine) {
                for (index, item) in items.into_iter().enumerate() {
                    callback.call(&engine.undefined_value(), &[interp.wrap(item), engine.new_number(index as f64)]);
                    if engine.has_uncaught_exception() {
                        break;
                    }
                }
            }
            engine.undefined_value()
        }),
    );
    let array = ObjectCell::new(ObjectClass::Ordinary, Some(realm.object_prototype.clone()));
    method(
        engine,
        &array,
        "isArray",
        1,
        native_function(|ctx, engine| engine.new_bool(ctx.argument(0).is_array())),
    );
    array.define("prototype", Value::Object(prototype.clone()));
    realm.global.define("Array", Value::Object(array));
}

fn ctx_args(ctx: &dyn ScriptContext) -> Vec<Value> {
    (0..ctx.argument_count()).map(|i| raw(&ctx.argument(i))).collect()
}

fn slice_bounds(length: usize, start: &ScriptValue, end: &ScriptValue) -> (usize, usize) {
    let clamp = |value: &ScriptValue, default: usize| -> usize {
        if value.is_undefined() {
            return default;
        }
        let n = value.to_number();
        let n = if n.is_nan() { 0.0 } else { n.trunc() };
        if n < 0.0 {
            (length as f64 + n).max(0.0) as usize
        } else {
            (n as usize).min(length)
        }
    };
    let start = clamp(start, 0);
    let end = clamp(end, length);
    (start.min(end), end)
}

fn this_string(ctx: &dyn ScriptContext) -> String {
    ctx.this_object().to_string()
}

fn install_string(engine: &InterpEngine, realm: &Realm) {
    let prototype = &realm.string_prototype;
    method(
        engine,
        prototype,
        "charAt",
        1,
        native_function(|ctx, engine| {
            let index = ctx.argument(0).to_number();
            let index = if index.is_nan() { 0 } else { index as usize };
            let c = this_string(ctx).chars().nth(index).map(|c| c.to_string()).unwrap_or_default();
            engine.new_string(&c)
        }),
    );
    method(
        engine,
        prototype,
        "indexOf",
        1,
        native_function(|ctx, engine| {
            let haystack = this_string(ctx);
            let needle = ctx.argument(0).to_string();
            let index = haystack.find(&needle).map(|byte| haystack[..byte].chars().count() as f64);
            engine.new_number(index.unwrap_or(-1.0))
        }),
    );
    method(
        engine,
        prototype,
        "substring",
        2,
        native_function(|ctx, engine| {
            let chars: Vec<char> = this_string(ctx).chars().collect();
            let (start, end) = slice_bounds(chars.len(), &ctx.argument(0), &ctx.argument(1));
            engine.new_string(&chars[start..end].iter().collect::<String>())
        }),
    );
    method(
        engine,
        prototype,
        "toUpperCase",
        0,
        native_function(|ctx, engine| engine.new_string(&this_string(ctx).to_uppercase())),
    );
    method(
        engine,
        prototype,
        "toLowerCase",
        0,
        native_function(|ctx, engine| engine.new_string(&this_string(ctx).to_lowercase())),
    );
    method(
        engine,
        prototype,
        "trim",
        0,
        native_function(|ctx, engine| engine.new_string(this_string(ctx).trim())),
    );
    method(
        engine,
        prototype,
        "split",
        1,
        native_function(|ctx, engine| {
            let interp = match interp(engine) {
                Some(interp) => interp,
                None => return engine.undefined_value(),
            };
            let text = this_string(ctx);
            let separator = ctx.argument(0);
            let parts: Vec<Value> = if separator.is_undefined() {
                vec![Value::string(&text)]
            } else {
                let separator = separator.to_string();
                if separator.is_empty() {
                    text.chars().map(|c| Value::string(&c.to_string())).collect()
                } else {
                    text.split(separator.as_str()).map(Value::string).collect()
                }
            };
            interp.wrap(Value::Object(interp.alloc_array(parts)))
        }),
    );
}

fn install_number(engine: &InterpEngine, realm: &Realm) {
    method(
        engine,
        &realm.number_prototype,
        "toFixed",
        1,
        native_function(|ctx, engine| {
            let digits = ctx.argument(0).to_int32().clamp(0, 20) as usize;
            engine.new_string(&format!("{:.*}", digits, ctx.this_object().to_number()))
        }),
    );
    method(
        engine,
        &realm.number_prototype,
        "toString",
        0,
        native_function(|ctx, engine| engine.new_string(&number_to_string(ctx.this_object().to_number()))),
    );
}

fn install_math(engine: &InterpEngine, realm: &Realm) {
    let math = ObjectCell::new(ObjectClass::Ordinary, Some(realm.object_prototype.clone()));
    math.define("PI", Value::Number(std::f64::consts::PI));
    let unary: [(&str, fn(f64) -> f64); 5] = [
        ("floor", f64::floor),
        ("ceil", f64::ceil),
        ("round", |n| (n + 0.5).floor()),
        ("abs", f64::abs),
        ("sqrt", f64::sqrt),
    ];
    for (name, op) in unary {
        method(
            engine,
            &math,
            name,
            1,
            native_function(move |ctx, engine| engine.new_number(op(ctx.argument(0).to_number()))),
        );
    }
    method(
        engine,
        &math,
        "pow",
        2,
        native_function(|ctx, engine| engine.new_number(ctx.argument(0).to_number().powf(ctx.argument(1).to_number()))),
    );
    let folds: [(&str, f64, fn(f64, f64) -> f64); 2] = [
        ("max", f64::NEG_INFINITY, |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }),
        ("min", f64::INFINITY, |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }),
    ];
    for (name, start, fold) in folds {
        method(
            engine,
            &math,
            name,
            2,
            native_function(move |ctx, engine| {
                let result = ctx.arguments().iter().fold(start, |acc, arg| fold(acc, arg.to_number()));
                engine.new_number(result)
            }),
        );
    }
    realm.global.define("Math", Value::Object(math));
}

fn install_json(engine: &InterpEngine, realm: &Realm) {
    let json = ObjectCell::new(ObjectClass::Ordinary, Some(realm.object_prototype.clone()));
    method(
        engine,
        &json,
        "stringify",
        1,
        native_function(|ctx, engine| {
            let value = raw(&ctx.argument(0));
            if value.is_undefined() || value.is_callable() {
                return engine.undefined_value();
            }
            match serde_json::to_string(&value_to_variant(&value, 0)) {
                Ok(text) => engine.new_string(&text),
                Err(e) => ctx.throw_error(&e.to_string()),
            }
        }),
    );
    method(
        engine,
        &json,
        "parse",
        1,
        native_function(|ctx, engine| {
            let interp = match interp(engine) {
                Some(interp) => interp,
                None => return engine.undefined_value(),
            };
            match serde_json::from_str(&ctx.argument(0).to_string()) {
                Ok(variant) => interp.wrap(interp.value_from_variant(&variant)),
                Err(e) => {
                    let error = interp.error_object("SyntaxError", &format!("JSON.parse: {}", e));
                    ctx.throw_value(interp.wrap(Value::Object(error)))
                }
            }
        }),
    );
    realm.global.define("JSON", Value::Object(json));
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::interp::InterpEngine;
    use crate::scripting::engine::ScriptEngine;

    fn eval(source: &str) -> String {
        InterpEngine::new(EngineConfig::default()).evaluate(source, "builtins.js").to_string()
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(eval("var a = [3, 1]; a.push(4, 5); a.pop(); a.join('|')"), "3|1|4");
        assert_eq!(eval("[1, 2, 3].indexOf(2)"), "1");
        assert_eq!(eval("[1, 2, 3, 4].slice(1, -1).join()"), "2,3");
        assert_eq!(eval("var s = 0; [1, 2, 3].forEach(function(v) { s += v; }); s"), "6");
        assert_eq!(eval("Array.isArray([]) && !Array.isArray({})"), "true");
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(eval("'Hello'.toUpperCase() + 'World'.charAt(0)"), "HELLOW");
        assert_eq!(eval("'a,b,c'.split(',').length"), "3");
        assert_eq!(eval("'  x '.trim() + 'abcdef'.substring(1, 3)"), "xbc");
        assert_eq!(eval("'banana'.indexOf('nan')"), "2");
    }

    #[test]
    fn test_math_and_numbers() {
        assert_eq!(eval("Math.max(1, 7, 3) + Math.min(4, 2)"), "9");
        assert_eq!(eval("Math.floor(2.7) + Math.abs(-2)"), "4");
        assert_eq!(eval("(2.5).toFixed(2)"), "2.50");
        assert_eq!(eval("parseInt('42px') + parseFloat('1.5e1')"), "57");
        assert_eq!(eval("isNaN(Number('x'))"), "true");
    }

    #[test]
    fn test_json_round_trip() {
        let source = "var o = JSON.parse('{\"a\": [1, 2], \"b\": \"x\"}'); o.a[1] + o.b + JSON.stringify({ k: true })";
        assert_eq!(eval(source), "2x{\"k\":true}");
    }

    #[test]
    fn test_json_parse_failure_is_syntax_error() {
        let engine = InterpEngine::new(EngineConfig::default());
        let value = engine.evaluate("var n; try { JSON.parse('{'); } catch (e) { n = e.name; } n", "json.js");
        assert_eq!(value.to_string(), "SyntaxError");
    }

    #[test]
    fn test_object_keys_and_own_property() {
        assert_eq!(eval("Object.keys({ a: 1, b: 2 }).join()"), "a,b");
        assert_eq!(eval("({ a: 1 }).hasOwnProperty('a') && !({}).hasOwnProperty('a')"), "true");
    }
}
