// Tue Oct 13 2026 - Alex

use crate::interp::ast::FunctionDef;
use crate::interp::scope::ScopeRef;
use crate::scripting::context::ScriptFunction;
use crate::scripting::object::ScriptObject;
use crate::scripting::types::{ScriptVariant, ValueKind, ValueOwnership, WrapOptions};
use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::{Arc, Weak};

pub type ObjectRef = Arc<ObjectCell>;
pub type PropertyMap = IndexMap<String, Property, ahash::RandomState>;

/// Nesting limit for display and variant conversion of object graphs.
pub const MAX_CONVERSION_DEPTH: usize = 32;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Object(ObjectRef),
}

#[derive(Clone)]
pub enum Property {
    Data(Value),
    Accessor { getter: Option<Value>, setter: Option<Value> },
}

#[derive(Clone)]
pub enum Callable {
    Script { def: Arc<FunctionDef>, env: ScopeRef, file: Arc<str> },
    Native { function: ScriptFunction, name: String },
    HostMethod { wrapper: ObjectRef, method: String },
}

/// Link between a wrapper object and the native object it exposes. The
/// binding never keeps the native object alive; ownership lives in the
/// engine's wrapper table.
#[derive(Clone)]
pub struct HostBinding {
    pub object: Weak<dyn ScriptObject>,
    pub identity: usize,
    pub ownership: ValueOwnership,
    pub options: WrapOptions,
    pub class_name: String,
}

pub enum ObjectClass {
    Ordinary,
    Array(Vec<Value>),
    Function(Callable),
    Error,
    ArrayBuffer(Vec<u8>),
    Host(HostBinding),
}

pub struct ObjectData {
    pub class: ObjectClass,
    pub properties: PropertyMap,
    pub prototype: Option<ObjectRef>,
}

/// Heap cell of a script object. Never hold the lock while calling back
/// into the interpreter.
pub struct ObjectCell {
    data: Mutex<ObjectData>,
}

impl ObjectCell {
    pub fn new(class: ObjectClass, prototype: Option<ObjectRef>) -> ObjectRef {
        Arc::new(Self {
            data: Mutex::new(ObjectData {
                class,
                properties: PropertyMap::default(),
                prototype,
            }),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, ObjectData> {
        self.data.lock()
    }

    pub fn prototype(&self) -> Option<ObjectRef> {
        self.data.lock().prototype.clone()
    }

    pub fn set_prototype(&self, prototype: Option<ObjectRef>) {
        self.data.lock().prototype = prototype;
    }

    pub fn define(&self, key: &str, value: Value) {
        self.data.lock().properties.insert(key.to_string(), Property::Data(value));
    }

    pub fn kind(&self) -> ValueKind {
        match self.data.lock().class {
            ObjectClass::Ordinary => ValueKind::Object,
            ObjectClass::Array(_) => ValueKind::Array,
            ObjectClass::Function(_) => ValueKind::Function,
            ObjectClass::Error => ValueKind::Error,
            ObjectClass::ArrayBuffer(_) => ValueKind::ArrayBuffer,
            ObjectClass::Host(_) => ValueKind::HostObject,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.data.lock().class, ObjectClass::Function(_))
    }

    pub fn callable(&self) -> Option<Callable> {
        match &self.data.lock().class {
            ObjectClass::Function(callable) => Some(callable.clone()),
            _ => None,
        }
    }

    pub fn host_binding(&self) -> Option<HostBinding> {
        match &self.data.lock().class {
            ObjectClass::Host(binding) => Some(binding.clone()),
            _ => None,
        }
    }
}

impl Value {
    pub fn string(s: &str) -> Value {
        Value::String(Arc::from(s))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        self.as_object().map(|o| o.is_callable()).unwrap_or(false)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Undefined => ValueKind::Undefined,
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Object(obj) => obj.kind(),
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) if obj.is_callable() => "function",
            Value::Object(_) => "object",
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Object(_) => string_to_number(&self.to_display()),
        }
    }

    /// ECMAScript ToString, without consulting script-defined `toString`.
    pub fn to_display(&self) -> String {
        display_value(self, 0)
    }

    /// Primitive form used by `+` and relational operators.
    pub fn to_primitive(&self) -> Value {
        match self {
            Value::Object(_) => Value::string(&self.to_display()),
            other => other.clone(),
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (Value::Object(_), Value::Object(_)) => self.strict_equals(other),
            (Value::Object(_), _) => self.to_primitive().loose_equals(other),
            (_, Value::Object(_)) => self.loose_equals(&other.to_primitive()),
            _ => self.strict_equals(other),
        }
    }
}

fn display_value(value: &Value, depth: usize) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => s.to_string(),
        Value::Object(obj) => display_object(obj, depth),
    }
}

fn display_object(obj: &ObjectRef, depth: usize) -> String {
    if depth > MAX_CONVERSION_DEPTH {
        return String::new();
    }
    enum Shape {
        Array(Vec<Value>),
        Error,
        Function(String),
        Host(String),
        Buffer,
        Plain,
    }
    let shape = match &obj.lock().class {
        ObjectClass::Array(items) => Shape::Array(items.clone()),
        ObjectClass::Error => Shape::Error,
        ObjectClass::Function(Callable::Script { def, .. }) => Shape::Function(def.name.clone().unwrap_or_default()),
        ObjectClass::Function(Callable::Native { name, .. }) => Shape::Function(name.clone()),
        ObjectClass::Function(Callable::HostMethod { method, .. }) => Shape::Function(method.clone()),
        ObjectClass::Host(binding) => Shape::Host(binding.class_name.clone()),
        ObjectClass::ArrayBuffer(_) => Shape::Buffer,
        ObjectClass::Ordinary => Shape::Plain,
    };
    match shape {
        Shape::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Undefined | Value::Null => String::new(),
                other => display_value(other, depth + 1),
            })
            .collect::<Vec<_>>()
            .join(","),
        Shape::Error => {
            let name = lookup_data(obj, "name").map(|v| display_value(&v, depth + 1));
            let message = lookup_data(obj, "message").map(|v| display_value(&v, depth + 1));
            let name = name.unwrap_or_else(|| "Error".to_string());
            match message {
                Some(message) if !message.is_empty() => format!("{}: {}", name, message),
                _ => name,
            }
        }
        Shape::Function(name) => format!("function {}() {{ [code] }}", name),
        Shape::Host(class_name) => format!("[object {}]", class_name),
        Shape::Buffer => "[object ArrayBuffer]".to_string(),
        Shape::Plain => "[object Object]".to_string(),
    }
}

/// Data property lookup along the prototype chain, ignoring accessors.
pub fn lookup_data(obj: &ObjectRef, key: &str) -> Option<Value> {
    let mut current = Some(obj.clone());
    let mut hops = 0;
    while let Some(cell) = current {
        let data = cell.lock();
        match data.properties.get(key) {
            Some(Property::Data(value)) => return Some(value.clone()),
            Some(Property::Accessor { .. }) => return None,
            None => {}
        }
        current = data.prototype.clone();
        hops += 1;
        if hops > MAX_CONVERSION_DEPTH {
            return None;
        }
    }
    None
}

/// Canonical array index, if `key` is one.
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|i| *i != u32::MAX).map(|i| i as usize)
}

/// ECMAScript Number::toString for radix 10.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        return format!("{:.0}", n);
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{}e+{}", mantissa, exponent),
            _ => formatted,
        };
    }
    format!("{}", n)
}

/// ECMAScript ToNumber applied to a string.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    let valid = trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !valid {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

pub fn number_to_variant(n: f64) -> ScriptVariant {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return ScriptVariant::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(ScriptVariant::Number)
        .unwrap_or(ScriptVariant::Null)
}

/// Structured copy of a value. Functions and cycles beyond the depth limit
/// become null.
pub fn value_to_variant(value: &Value, depth: usize) -> ScriptVariant {
    match value {
        Value::Undefined | Value::Null => ScriptVariant::Null,
        Value::Bool(b) => ScriptVariant::Bool(*b),
        Value::Number(n) => number_to_variant(*n),
        Value::String(s) => ScriptVariant::String(s.to_string()),
        Value::Object(obj) => object_to_variant(obj, depth),
    }
}

fn object_to_variant(obj: &ObjectRef, depth: usize) -> ScriptVariant {
    if depth >= MAX_CONVERSION_DEPTH {
        return ScriptVariant::Null;
    }
    enum Shape {
        Array(Vec<Value>),
        Bytes(Vec<u8>),
        Host(HostBinding),
        Fields(Vec<(String, Value)>),
        Function,
    }
    let shape = {
        let data = obj.lock();
        match &data.class {
            ObjectClass::Array(items) => Shape::Array(items.clone()),
            ObjectClass::ArrayBuffer(bytes) => Shape::Bytes(bytes.clone()),
            ObjectClass::Host(binding) => Shape::Host(binding.clone()),
            ObjectClass::Function(_) => Shape::Function,
            ObjectClass::Ordinary | ObjectClass::Error => Shape::Fields(
                data.properties
                    .iter()
                    .filter_map(|(k, p)| match p {
                        Property::Data(v) => Some((k.clone(), v.clone())),
                        Property::Accessor { .. } => None,
                    })
                    .collect(),
            ),
        }
    };
    match shape {
        Shape::Array(items) => ScriptVariant::Array(items.iter().map(|v| value_to_variant(v, depth + 1)).collect()),
        Shape::Bytes(bytes) => ScriptVariant::Array(bytes.into_iter().map(ScriptVariant::from).collect()),
        Shape::Function => ScriptVariant::Null,
        Shape::Fields(fields) => {
            let mut map = serde_json::Map::new();
            for (key, value) in fields {
                if value.is_callable() {
                    continue;
                }
                map.insert(key, value_to_variant(&value, depth + 1));
            }
            ScriptVariant::Object(map)
        }
        Shape::Host(binding) => {
            let object = match binding.object.upgrade() {
                Some(object) => object,
                None => return ScriptVariant::Null,
            };
            let mut map = serde_json::Map::new();
            for info in object.properties() {
                if let Some(v) = object.property(&info.name) {
                    map.insert(info.name.clone(), v);
                }
            }
            for name in object.dynamic_property_names() {
                if let Some(v) = object.dynamic_property(&name) {
                    map.insert(name, v);
                }
            }
            ScriptVariant::Object(map)
        }
    }
}
