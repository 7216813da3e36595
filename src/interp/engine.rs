// Thu Oct 15 2026 - Alex

use crate::config::{BackendKind, EngineConfig};
use crate::interp::ast::Program;
use crate::interp::builtins::{self, Realm};
use crate::interp::eval::{stack_address, Activation, Completion, Flow, Frame, Thrown, MAX_ARRAY_GAP};
use crate::interp::host::WrapperTable;
use crate::interp::lexer::SyntaxErrorInfo;
use crate::interp::parser;
use crate::interp::scope::{Scope, ScopeRef};
use crate::interp::value::{lookup_data, Callable, ObjectClass, ObjectRef, Property, Value};
use crate::scripting::context::ScriptFunction;
use crate::scripting::engine::{ProcessEventsHook, ScriptEngine, UncaughtExceptionListener};
use crate::scripting::exception::{CapturedException, EmitDecision, ExceptionSlot, UncaughtException};
use crate::scripting::marshal::{ConvertOutcome, DemarshalFunction, MarshalFunction, MarshalRegistry};
use crate::scripting::object::ScriptObject;
use crate::scripting::program::{ScriptProgram, ScriptSyntaxCheckResult};
use crate::scripting::thread::ThreadAffinity;
use crate::scripting::types::{ScriptVariant, ValueOwnership, WrapOptions};
use crate::scripting::value::ScriptValue;
use ahash::RandomState;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;
use std::time::Instant;

/// Parsed form of a [`ScriptProgram`], cached on the program.
pub(crate) struct CompiledScript {
    result: Result<Program, SyntaxErrorInfo>,
}

impl CompiledScript {
    fn compile(source: &str) -> Self {
        Self {
            result: parser::parse(source),
        }
    }
}

/// Tree-walking script engine.
pub struct InterpEngine {
    pub(crate) self_ref: Weak<InterpEngine>,
    pub(crate) config: EngineConfig,
    name: RwLock<String>,
    realm: RwLock<Option<Arc<Realm>>>,
    pub(crate) exceptions: ExceptionSlot,
    listeners: RwLock<Vec<UncaughtExceptionListener>>,
    registry: MarshalRegistry,
    default_prototypes: RwLock<HashMap<TypeId, ObjectRef, RandomState>>,
    pub(crate) wrappers: WrapperTable,
    affinity: ThreadAffinity,
    pub(crate) call_stack: Mutex<Vec<Frame>>,
    eval_depth: AtomicUsize,
    pub(crate) call_depth: AtomicUsize,
    /// Native stack address at the outermost entry, 0 when idle.
    pub(crate) stack_base: AtomicUsize,
    pub(crate) abort_requested: AtomicBool,
    pub(crate) steps: AtomicU64,
    memory_cost: AtomicI64,
    cost_at_last_gc: AtomicI64,
    gc_pending: AtomicBool,
    pub(crate) process_events_interval: AtomicU64,
    pub(crate) process_events_hook: RwLock<Option<ProcessEventsHook>>,
    pub(crate) last_process_events: Mutex<Instant>,
    properties: RwLock<HashMap<String, ScriptVariant, RandomState>>,
    torn_down: AtomicBool,
}

/// Marks the engine busy for the duration of a host-initiated entry into
/// script. The outermost one resets per-evaluation state and runs deferred
/// collections on the way out.
pub(crate) struct EvaluationScope<'a> {
    engine: &'a InterpEngine,
    outermost: bool,
}

impl<'a> EvaluationScope<'a> {
    pub(crate) fn enter(engine: &'a InterpEngine, clear_exceptions: bool) -> Self {
        let outermost = engine.eval_depth.fetch_add(1, Ordering::SeqCst) == 0;
        if outermost {
            engine.steps.store(0, Ordering::SeqCst);
            engine.stack_base.store(stack_address(), Ordering::SeqCst);
            engine.abort_requested.store(false, Ordering::SeqCst);
            *engine.last_process_events.lock() = Instant::now();
            if clear_exceptions {
                engine.exceptions.clear();
            }
        }
        Self { engine, outermost }
    }
}

impl Drop for EvaluationScope<'_> {
    fn drop(&mut self) {
        self.engine.eval_depth.fetch_sub(1, Ordering::SeqCst);
        if self.outermost {
            self.engine.stack_base.store(0, Ordering::SeqCst);
            self.engine.abort_requested.store(false, Ordering::SeqCst);
            if self.engine.gc_pending.load(Ordering::SeqCst) {
                self.engine.run_collection();
            }
        }
    }
}

impl InterpEngine {
    pub fn new(config: EngineConfig) -> Arc<InterpEngine> {
        let engine = Arc::new_cyclic(|self_ref| InterpEngine {
            self_ref: self_ref.clone(),
            name: RwLock::new(config.name.clone()),
            realm: RwLock::new(Some(Arc::new(Realm::new()))),
            exceptions: ExceptionSlot::new(),
            listeners: RwLock::new(Vec::new()),
            registry: MarshalRegistry::new(),
            default_prototypes: RwLock::new(HashMap::default()),
            wrappers: WrapperTable::new(),
            affinity: ThreadAffinity::new(config.strict_thread_checks),
            call_stack: Mutex::new(Vec::new()),
            eval_depth: AtomicUsize::new(0),
            call_depth: AtomicUsize::new(0),
            stack_base: AtomicUsize::new(0),
            abort_requested: AtomicBool::new(false),
            steps: AtomicU64::new(0),
            memory_cost: AtomicI64::new(0),
            cost_at_last_gc: AtomicI64::new(0),
            gc_pending: AtomicBool::new(false),
            process_events_interval: AtomicU64::new(config.process_events_interval_ms),
            process_events_hook: RwLock::new(None),
            last_process_events: Mutex::new(Instant::now()),
            properties: RwLock::new(HashMap::default()),
            torn_down: AtomicBool::new(false),
            config,
        });
        builtins::install(&engine);
        debug!("Created interpreter engine '{}'", engine.config.name);
        engine
    }

    pub(crate) fn realm(&self) -> Option<Arc<Realm>> {
        self.realm.read().clone()
    }

    pub(crate) fn permits(&self, method: &str) -> bool {
        self.affinity.permits(&self.name.read(), method)
    }

    /// Run `f` as a host entry into script, recording anything it throws.
    pub(crate) fn host_boundary<F>(&self, f: F) -> ScriptValue
    where
        F: FnOnce(&Self) -> Flow<Value>,
    {
        let _scope = EvaluationScope::enter(self, false);
        match f(self) {
            Ok(value) => self.wrap(value),
            Err(thrown) => {
                self.record_thrown(&thrown);
                self.wrap(thrown.value)
            }
        }
    }

    fn describe_exception(&self, value: &Value) -> (String, String) {
        match value.as_object() {
            Some(object) => {
                let name = match lookup_data(object, "name") {
                    Some(Value::String(name)) => name.to_string(),
                    _ => "Error".to_string(),
                };
                let message = match lookup_data(object, "message") {
                    Some(message) => message.to_display(),
                    None => value.to_display(),
                };
                (name, message)
            }
            None => ("Error".to_string(), value.to_display()),
        }
    }

    fn capture(&self, value: &Value, file: &str, line: i32, backtrace: Vec<String>) -> CapturedException {
        let (name, message) = self.describe_exception(value);
        let (mut file, mut line) = (file.to_string(), line);
        if let Some(object) = value.as_object() {
            if let Some(Value::String(f)) = lookup_data(object, "fileName") {
                file = f.to_string();
            }
            if let Some(Value::Number(n)) = lookup_data(object, "lineNumber") {
                line = n as i32;
            }
        }
        CapturedException::new(self.wrap(value.clone()), &name, &message)
            .with_location(&file, line)
            .with_backtrace(backtrace)
    }

    pub(crate) fn record_thrown(&self, thrown: &Thrown) {
        let captured = self.capture(&thrown.value, &thrown.file, thrown.line, thrown.backtrace.clone());
        debug!(
            "Uncaught {}: {} ({}:{})",
            captured.name, captured.message, captured.file_name, captured.line_number
        );
        self.exceptions.record(captured);
    }

    fn run_program(&self, program: &ScriptProgram, locals: Option<&ScriptValue>) -> ScriptValue {
        if !self.permits("evaluate") {
            return ScriptValue::invalid();
        }
        let realm = match self.realm() {
            Some(realm) => realm,
            None => {
                warn!("evaluate() on shut down engine '{}'", self.object_name());
                return ScriptValue::invalid();
            }
        };
        let _scope = EvaluationScope::enter(self, true);
        let file: Arc<str> = Arc::from(program.file_name());
        let _frame = self.push_frame("<global>", &file, 0);
        let compiled = program.compiled_or_init(CompiledScript::compile);
        let parsed = match &compiled.result {
            Ok(parsed) => parsed,
            Err(syntax) => {
                let error = self.error_object("SyntaxError", &syntax.message);
                error.define("lineNumber", Value::Number(syntax.line as f64));
                let value = Value::Object(error);
                self.exceptions
                    .record(self.capture(&value, &file, syntax.line, self.backtrace()));
                return self.wrap(value);
            }
        };

        let var_scope = match locals {
            Some(locals) => self.closure_scope(&realm, locals),
            None => realm.global_scope.clone(),
        };
        let act = Activation {
            scope: var_scope.clone(),
            var_scope,
            this: Value::Object(realm.global.clone()),
            file,
        };
        let result = self.hoist(&parsed.body, &act).and_then(|_| self.exec_block(&parsed.body, &act));
        match result {
            Ok(Completion::Normal(value)) => self.wrap(value.unwrap_or(Value::Undefined)),
            Ok(Completion::Return(value)) => self.wrap(value),
            Ok(_) => self.wrap(Value::Undefined),
            Err(thrown) => {
                self.record_thrown(&thrown);
                self.wrap(thrown.value)
            }
        }
    }

    fn closure_scope(&self, realm: &Realm, locals: &ScriptValue) -> ScopeRef {
        let scope = Scope::declarative(Some(realm.global_scope.clone()));
        if let Value::Object(object) = self.import(locals) {
            let receiver = Value::Object(object.clone());
            for key in self.own_keys(&object) {
                match self.get_property(&object, &key, &receiver) {
                    Ok(value) => {
                        scope.set_own(&key, value);
                    }
                    Err(thrown) => self.record_thrown(&thrown),
                }
            }
        }
        scope
    }

    fn object_value(&self, value: &ScriptValue) -> Option<ObjectRef> {
        match self.import(value) {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Collects now, or after the outermost evaluation when one is running.
    fn schedule_collection(&self) {
        if self.is_evaluating() {
            self.gc_pending.store(true, Ordering::SeqCst);
        } else {
            self.run_collection();
        }
    }

    pub(crate) fn run_collection(&self) {
        self.gc_pending.store(false, Ordering::SeqCst);
        let stats = self.wrappers.sweep();
        self.cost_at_last_gc
            .store(self.memory_cost.load(Ordering::SeqCst), Ordering::SeqCst);
        debug!(
            "Collected garbage in '{}': {} wrappers dropped, {} released",
            self.object_name(),
            stats.dropped,
            stats.released
        );
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let realm = self.realm.write().take();
        let prototypes: Vec<ObjectRef> = self.default_prototypes.write().drain().map(|(_, p)| p).collect();
        self.exceptions.clear();
        self.registry.clear();
        self.listeners.write().clear();
        self.properties.write().clear();
        *self.process_events_hook.write() = None;
        self.call_stack.lock().clear();
        let stats = self.wrappers.clear();

        let mut roots = prototypes;
        if let Some(realm) = realm {
            roots.extend(realm.roots());
            sever(roots, vec![realm.global_scope.clone()]);
        } else {
            sever(roots, Vec::new());
        }
        debug!("Released {} of {} wrapped objects", stats.released, stats.dropped);
    }
}

/// Break every reference cycle reachable from `objects` and `scopes`.
fn sever(mut objects: Vec<ObjectRef>, mut scopes: Vec<ScopeRef>) {
    let mut seen_objects: HashSet<usize, RandomState> = HashSet::default();
    let mut seen_scopes: HashSet<usize, RandomState> = HashSet::default();
    loop {
        if let Some(object) = objects.pop() {
            if !seen_objects.insert(Arc::as_ptr(&object) as usize) {
                continue;
            }
            let (class, properties, prototype) = {
                let mut data = object.lock();
                (
                    std::mem::replace(&mut data.class, ObjectClass::Ordinary),
                    std::mem::take(&mut data.properties),
                    data.prototype.take(),
                )
            };
            match class {
                ObjectClass::Array(items) => objects.extend(items.into_iter().filter_map(into_object)),
                ObjectClass::Function(Callable::Script { env, .. }) => scopes.push(env),
                ObjectClass::Function(Callable::HostMethod { wrapper, .. }) => objects.push(wrapper),
                _ => {}
            }
            for (_, property) in properties {
                match property {
                    Property::Data(value) => objects.extend(into_object(value)),
                    Property::Accessor { getter, setter } => {
                        objects.extend(getter.and_then(into_object));
                        objects.extend(setter.and_then(into_object));
                    }
                }
            }
            objects.extend(prototype);
        } else if let Some(scope) = scopes.pop() {
            if !seen_scopes.insert(Arc::as_ptr(&scope) as usize) {
                continue;
            }
            objects.extend(scope.drain().into_iter().filter_map(into_object));
            if let Some(parent) = scope.parent() {
                scopes.push(parent.clone());
            }
        } else {
            break;
        }
    }
}

fn into_object(value: Value) -> Option<ObjectRef> {
    match value {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

impl Drop for InterpEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl ScriptEngine for InterpEngine {
    fn backend(&self) -> BackendKind {
        BackendKind::Interpreter
    }

    fn config(&self) -> EngineConfig {
        self.config.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn evaluate(&self, source: &str, file_name: &str) -> ScriptValue {
        self.evaluate_program(&ScriptProgram::new(source, file_name))
    }

    fn evaluate_program(&self, program: &ScriptProgram) -> ScriptValue {
        self.run_program(program, None)
    }

    fn evaluate_in_closure(&self, locals: &ScriptValue, program: &ScriptProgram) -> ScriptValue {
        self.run_program(program, Some(locals))
    }

    fn check_script_syntax(&self, program: &ScriptProgram) -> ScriptSyntaxCheckResult {
        let compiled = program.compiled_or_init(CompiledScript::compile);
        match &compiled.result {
            Ok(_) => ScriptSyntaxCheckResult::ok(),
            Err(e) => ScriptSyntaxCheckResult::error(e.message.clone(), e.line, e.column),
        }
    }

    fn abort_evaluation(&self) {
        if self.is_evaluating() {
            info!("Aborting evaluation in '{}'", self.object_name());
            self.abort_requested.store(true, Ordering::SeqCst);
        }
    }

    fn is_evaluating(&self) -> bool {
        self.eval_depth.load(Ordering::SeqCst) > 0
    }

    fn set_process_events_interval(&self, interval_ms: u64) {
        self.process_events_interval.store(interval_ms, Ordering::SeqCst);
    }

    fn set_process_events_hook(&self, hook: Option<ProcessEventsHook>) {
        *self.process_events_hook.write() = hook;
    }

    fn current_script_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for frame in self.call_stack.lock().iter().rev() {
            if frame.file.is_empty() || urls.last().map(|u| u.as_str()) == Some(&*frame.file) {
                continue;
            }
            urls.push(frame.file.to_string());
        }
        urls
    }

    fn global_object(&self) -> ScriptValue {
        match self.realm() {
            Some(realm) => self.wrap(Value::Object(realm.global.clone())),
            None => ScriptValue::invalid(),
        }
    }

    fn undefined_value(&self) -> ScriptValue {
        self.wrap(Value::Undefined)
    }

    fn null_value(&self) -> ScriptValue {
        self.wrap(Value::Null)
    }

    fn new_bool(&self, value: bool) -> ScriptValue {
        self.wrap(Value::Bool(value))
    }

    fn new_number(&self, value: f64) -> ScriptValue {
        self.wrap(Value::Number(value))
    }

    fn new_string(&self, value: &str) -> ScriptValue {
        self.wrap(Value::string(value))
    }

    fn new_object(&self) -> ScriptValue {
        self.wrap(Value::Object(self.alloc(ObjectClass::Ordinary)))
    }

    fn new_array(&self, length: u32) -> ScriptValue {
        let mut length = length as usize;
        if length > MAX_ARRAY_GAP {
            warn!("new_array: length {} clamped to {}", length, MAX_ARRAY_GAP);
            length = MAX_ARRAY_GAP;
        }
        self.wrap(Value::Object(self.alloc_array(vec![Value::Undefined; length])))
    }

    fn new_array_buffer(&self, bytes: &[u8]) -> ScriptValue {
        self.wrap(Value::Object(self.alloc(ObjectClass::ArrayBuffer(bytes.to_vec()))))
    }

    fn new_function(&self, function: ScriptFunction, length: i32) -> ScriptValue {
        self.wrap(Value::Object(self.alloc_native(function, "", length)))
    }

    fn new_variant(&self, variant: &ScriptVariant) -> ScriptValue {
        self.wrap(self.value_from_variant(variant))
    }

    fn new_qobject(&self, object: Arc<dyn ScriptObject>, ownership: ValueOwnership, options: WrapOptions) -> ScriptValue {
        if !self.permits("new_qobject") {
            return ScriptValue::invalid();
        }
        self.wrap(Value::Object(self.wrap_host_object(object, ownership, options)))
    }

    fn make_error(&self, other: &ScriptValue, error_type: &str) -> ScriptValue {
        let value = self.import(other);
        if let Some(object) = value.as_object() {
            if matches!(object.lock().class, ObjectClass::Error) {
                return self.wrap(value);
            }
        }
        let message = if value.is_undefined() { String::new() } else { value.to_display() };
        self.wrap(Value::Object(self.error_object(error_type, &message)))
    }

    fn register_function(&self, name: &str, function: ScriptFunction, arity: i32) -> ScriptValue {
        if !self.permits("register_function") {
            return ScriptValue::invalid();
        }
        let realm = match self.realm() {
            Some(realm) => realm,
            None => return ScriptValue::invalid(),
        };
        let object = self.alloc_native(function, name, arity);
        realm.global.define(name, Value::Object(object.clone()));
        self.wrap(Value::Object(object))
    }

    fn register_namespaced_function(&self, parent: &str, name: &str, function: ScriptFunction, arity: i32) -> ScriptValue {
        if !self.permits("register_namespaced_function") {
            return ScriptValue::invalid();
        }
        let realm = match self.realm() {
            Some(realm) => realm,
            None => return ScriptValue::invalid(),
        };
        let mut target = realm.global.clone();
        for segment in parent.split('.').filter(|s| !s.is_empty()) {
            let next = match lookup_data(&target, segment) {
                Some(Value::Object(existing)) => existing,
                _ => {
                    let created = self.alloc(ObjectClass::Ordinary);
                    target.define(segment, Value::Object(created.clone()));
                    created
                }
            };
            target = next;
        }
        let object = self.alloc_native(function, name, arity);
        target.define(name, Value::Object(object.clone()));
        self.wrap(Value::Object(object))
    }

    fn register_getter_setter(
        &self,
        name: &str,
        getter: Option<ScriptFunction>,
        setter: Option<ScriptFunction>,
        parent: &ScriptValue,
    ) -> bool {
        if !self.permits("register_getter_setter") {
            return false;
        }
        let target = match self.object_value(parent).or_else(|| self.realm().map(|r| r.global.clone())) {
            Some(target) => target,
            None => return false,
        };
        let getter = getter.map(|f| Value::Object(self.alloc_native(f, name, 0)));
        let setter = setter.map(|f| Value::Object(self.alloc_native(f, name, 1)));
        target
            .lock()
            .properties
            .insert(name.to_string(), Property::Accessor { getter, setter });
        true
    }

    fn register_enum(&self, name: &str, entries: &[(&str, i32)]) -> ScriptValue {
        if !self.permits("register_enum") {
            return ScriptValue::invalid();
        }
        let realm = match self.realm() {
            Some(realm) => realm,
            None => return ScriptValue::invalid(),
        };
        let object = self.alloc(ObjectClass::Ordinary);
        for (key, value) in entries {
            object.define(key, Value::Number(*value as f64));
        }
        realm.global.define(name, Value::Object(object.clone()));
        self.wrap(Value::Object(object))
    }

    fn register_global_object(&self, name: &str, object: Arc<dyn ScriptObject>) -> ScriptValue {
        if !self.permits("register_global_object") {
            return ScriptValue::invalid();
        }
        let realm = match self.realm() {
            Some(realm) => realm,
            None => return ScriptValue::invalid(),
        };
        let wrapper = self.wrap_host_object(object, ValueOwnership::HostOwned, WrapOptions::default());
        realm.global.define(name, Value::Object(wrapper.clone()));
        self.wrap(Value::Object(wrapper))
    }

    fn register_custom_type(&self, type_id: TypeId, marshal: MarshalFunction, demarshal: DemarshalFunction) {
        if !self.permits("register_custom_type") {
            return;
        }
        if self.registry.register(type_id, marshal, demarshal) {
            debug!("Replaced marshal functions for {:?}", type_id);
        }
    }

    fn set_default_prototype(&self, type_id: TypeId, prototype: ScriptValue) {
        if !self.permits("set_default_prototype") {
            return;
        }
        let mut prototypes = self.default_prototypes.write();
        match self.object_value(&prototype) {
            Some(object) => {
                prototypes.insert(type_id, object);
            }
            None => {
                prototypes.remove(&type_id);
            }
        }
    }

    fn default_prototype(&self, type_id: TypeId) -> ScriptValue {
        let prototype = self.default_prototypes.read().get(&type_id).cloned();
        match prototype {
            Some(object) => self.wrap(Value::Object(object)),
            None => ScriptValue::invalid(),
        }
    }

    fn create(&self, type_id: TypeId, value: &dyn Any) -> Option<ScriptValue> {
        let entry = self.registry.entry(type_id)?;
        let result = (entry.marshal)(self, value);
        let prototype = self.default_prototypes.read().get(&type_id).cloned();
        if let (Some(prototype), Some(object)) = (prototype, self.object_value(&result)) {
            object.set_prototype(Some(prototype));
        }
        Some(result)
    }

    fn convert(&self, value: &ScriptValue, type_id: TypeId, out: &mut dyn Any) -> ConvertOutcome {
        let entry = match self.registry.entry(type_id) {
            Some(entry) => entry,
            None => return ConvertOutcome::Unregistered,
        };
        if (entry.demarshal)(value, out) {
            ConvertOutcome::Converted
        } else {
            ConvertOutcome::Failed
        }
    }

    fn has_uncaught_exception(&self) -> bool {
        self.exceptions.has_pending()
    }

    fn uncaught_exception(&self) -> ScriptValue {
        self.exceptions.pending().map(|e| e.value).unwrap_or_default()
    }

    fn uncaught_exception_backtrace(&self) -> Vec<String> {
        self.exceptions.pending().map(|e| e.backtrace).unwrap_or_default()
    }

    fn uncaught_exception_line_number(&self) -> i32 {
        self.exceptions.pending().map(|e| e.line_number).unwrap_or(-1)
    }

    fn uncaught_exception_report(&self) -> Option<UncaughtException> {
        self.exceptions.pending().map(|e| UncaughtException {
            id: e.id,
            name: e.name,
            message: e.message,
            file_name: e.file_name,
            line_number: e.line_number,
            backtrace: e.backtrace,
            debug_hint: String::new(),
        })
    }

    fn clear_exceptions(&self) {
        if self.permits("clear_exceptions") {
            self.exceptions.clear();
        }
    }

    fn raise_exception(&self, value: &ScriptValue) -> bool {
        if !self.permits("raise_exception") {
            return false;
        }
        let raw = self.import(value);
        let (file, line) = self.current_location();
        let captured = self.capture(&raw, &file, line, self.backtrace());
        match self.exceptions.raise(captured, self.config.nested_exceptions) {
            Ok(_) => true,
            Err(kind) => {
                warn!("{}: exception already pending in '{}'", kind, self.object_name());
                false
            }
        }
    }

    fn clone_uncaught_exception(&self, detail: &str) -> ScriptValue {
        let pending = match self.exceptions.pending() {
            Some(pending) => pending,
            None => return ScriptValue::invalid(),
        };
        let error = self.error_object(&pending.name, &pending.message);
        error.define("fileName", Value::string(&pending.file_name));
        error.define("lineNumber", Value::Number(pending.line_number as f64));
        error.define("stack", Value::string(&pending.backtrace.join("\n")));
        error.define("detail", Value::string(detail));
        self.wrap(Value::Object(error))
    }

    fn maybe_emit_uncaught_exception(&self, debug_hint: &str) -> bool {
        if !self.permits("maybe_emit_uncaught_exception") {
            return false;
        }
        match self.exceptions.begin_emit(debug_hint) {
            EmitDecision::Nothing => false,
            EmitDecision::AlreadyEmitted => true,
            EmitDecision::Emit(report) => {
                error!("Uncaught exception in '{}': {}", self.object_name(), report);
                for frame in &report.backtrace {
                    error!("    at {}", frame);
                }
                let listeners = self.listeners.read().clone();
                for listener in listeners {
                    listener(&report);
                }
                if self.config.clear_exception_on_emit {
                    self.exceptions.clear();
                }
                true
            }
        }
    }

    fn add_uncaught_exception_listener(&self, listener: UncaughtExceptionListener) {
        self.listeners.write().push(listener);
    }

    fn update_memory_cost(&self, delta: i64) {
        if !self.permits("update_memory_cost") {
            return;
        }
        let cost = self.memory_cost.fetch_add(delta, Ordering::SeqCst) + delta;
        let since_last = cost - self.cost_at_last_gc.load(Ordering::SeqCst);
        if since_last >= self.config.gc_memory_threshold {
            debug!("Memory cost {} crossed the collection threshold", cost);
            self.schedule_collection();
        }
    }

    fn memory_cost(&self) -> i64 {
        self.memory_cost.load(Ordering::SeqCst)
    }

    fn request_collect_garbage(&self) {
        if self.permits("request_collect_garbage") {
            self.schedule_collection();
        }
    }

    fn collect_garbage(&self) {
        if self.permits("collect_garbage") {
            self.schedule_collection();
        }
    }

    fn is_threadsafe_invocation(&self, method: &str) -> bool {
        self.affinity.check(&self.name.read(), method)
    }

    fn thread(&self) -> ThreadId {
        self.affinity.owner()
    }

    fn set_thread(&self, thread: ThreadId) {
        self.affinity.set_owner(thread);
    }

    fn thread_violation_count(&self) -> u64 {
        self.affinity.violations()
    }

    fn object_name(&self) -> String {
        self.name.read().clone()
    }

    fn set_object_name(&self, name: &str) {
        *self.name.write() = name.to_string();
    }

    fn set_property(&self, name: &str, value: ScriptVariant) {
        if self.permits("set_property") {
            self.properties.write().insert(name.to_string(), value);
        }
    }

    fn property(&self, name: &str) -> Option<ScriptVariant> {
        self.properties.read().get(name).cloned()
    }

    fn shutdown(&self) {
        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }
        if !self.affinity.check(&self.name.read(), "shutdown") {
            warn!("Shutting down '{}' away from its owning thread", self.object_name());
        }
        info!("Shutting down script engine '{}'", self.object_name());
        self.teardown();
    }

    fn is_shut_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::context::native_function;
    use std::sync::atomic::AtomicUsize;

    fn engine() -> Arc<InterpEngine> {
        InterpEngine::new(EngineConfig::default())
    }

    #[test]
    fn test_evaluate_after_syntax_error() {
        let engine = engine();
        let bad = engine.evaluate("var x = ;", "bad.js");
        assert!(bad.is_error());
        let report = engine.uncaught_exception_report().unwrap();
        assert!(report.is_syntax_error());
        assert_eq!(report.file_name, "bad.js");
        assert_eq!(report.line_number, 1);

        let good = engine.evaluate("40 + 2", "good.js");
        assert_eq!(good.to_int32(), 42);
        assert!(!engine.has_uncaught_exception());
    }

    #[test]
    fn test_program_is_parsed_once() {
        let engine = engine();
        let program = engine.new_program("var runs = (typeof runs == 'undefined' ? 0 : runs) + 1; runs", "twice.js");
        assert!(!program.is_compiled());
        engine.evaluate_program(&program);
        assert!(program.is_compiled());
        assert_eq!(engine.evaluate_program(&program).to_int32(), 2);
    }

    #[test]
    fn test_closure_evaluation_is_isolated() {
        let engine = engine();
        let locals = engine.new_object();
        locals.set_property("base", &engine.new_int(10));
        let program = engine.new_program("var hidden = base * 2; hidden + 1", "closure.js");
        let result = engine.evaluate_in_closure(&locals, &program);
        assert_eq!(result.to_int32(), 21);
        assert!(engine.global_object().property("hidden").is_undefined());
        assert!(engine.global_object().property("base").is_undefined());
    }

    #[test]
    fn test_raise_lifecycle() {
        let engine = engine();
        let first = engine.make_error(&engine.new_string("first"), "Error");
        assert!(engine.raise_exception(&first));
        assert!(engine.has_uncaught_exception());
        assert!(!engine.raise_exception(&engine.new_string("second")));
        assert_eq!(engine.uncaught_exception_report().unwrap().message, "first");

        let copy = engine.clone_uncaught_exception("while testing");
        assert_eq!(copy.property("message").to_string(), "first");
        assert_eq!(copy.property("detail").to_string(), "while testing");

        engine.clear_exceptions();
        assert!(!engine.has_uncaught_exception());
        assert!(!engine.clone_uncaught_exception("none").is_valid());
        assert!(!engine.maybe_emit_uncaught_exception("none"));
    }

    #[test]
    fn test_nested_raise_overwrites_when_enabled() {
        let engine = InterpEngine::new(EngineConfig::default().with_nested_exceptions(true));
        assert!(engine.raise_exception(&engine.new_string("one")));
        assert!(engine.raise_exception(&engine.new_string("two")));
        assert_eq!(engine.uncaught_exception().to_string(), "two");
    }

    #[test]
    fn test_emit_clears_when_configured() {
        let engine = InterpEngine::new(EngineConfig::default().with_clear_exception_on_emit(true));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        engine.add_uncaught_exception_listener(Arc::new(move |report: &UncaughtException| {
            assert_eq!(report.debug_hint, "tick");
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        engine.evaluate("throw new Error('x')", "emit.js");
        assert!(engine.maybe_emit_uncaught_exception("tick"));
        assert!(!engine.has_uncaught_exception());
        assert!(!engine.maybe_emit_uncaught_exception("tick"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_namespaced_function_and_enum() {
        let engine = engine();
        engine.register_namespaced_function(
            "app.util",
            "double",
            native_function(|ctx, engine| engine.new_number(ctx.argument(0).to_number() * 2.0)),
            1,
        );
        engine.register_enum("Color", &[("Red", 0), ("Green", 1)]);
        let result = engine.evaluate("app.util.double(Color.Green + 4)", "ns.js");
        assert_eq!(result.to_int32(), 10);
        assert_eq!(engine.evaluate("app.util.double.length", "ns.js").to_int32(), 1);
    }

    #[test]
    fn test_getter_setter_registration() {
        let engine = engine();
        let store = Arc::new(Mutex::new(5.0));
        let read = store.clone();
        let write = store.clone();
        engine.register_getter_setter(
            "level",
            Some(native_function(move |_ctx, engine| engine.new_number(*read.lock()))),
            Some(native_function(move |ctx, engine| {
                *write.lock() = ctx.argument(0).to_number();
                engine.undefined_value()
            })),
            &ScriptValue::invalid(),
        );
        let result = engine.evaluate("level = level + 1; level * 10", "accessor.js");
        assert_eq!(result.to_int32(), 60);
        assert_eq!(*store.lock(), 6.0);
    }

    #[test]
    fn test_abort_from_process_events_hook() {
        let engine = InterpEngine::new(EngineConfig::default().with_process_events_interval(1));
        let weak = Arc::downgrade(&engine);
        engine.set_process_events_hook(Some(Arc::new(move || {
            if let Some(engine) = weak.upgrade() {
                engine.abort_evaluation();
            }
        })));
        let value = engine.evaluate("var n = 0; while (true) { n++; }", "spin.js");
        assert!(value.is_error());
        let report = engine.uncaught_exception_report().unwrap();
        assert!(report.is_abort());
        assert!(!engine.is_evaluating());
        assert_eq!(engine.evaluate("1", "after.js").to_int32(), 1);
    }

    #[test]
    fn test_memory_cost_triggers_collection() {
        let engine = InterpEngine::new(EngineConfig::default().with_gc_memory_threshold(100));
        struct Blob;
        impl ScriptObject for Blob {
            fn class_name(&self) -> &str {
                "Blob"
            }
        }
        let wrapped = engine.new_qobject(Arc::new(Blob), ValueOwnership::ScriptOwned, WrapOptions::default());
        drop(wrapped);
        assert_eq!(engine.wrappers.len(), 1);
        engine.update_memory_cost(60);
        assert_eq!(engine.wrappers.len(), 1);
        engine.update_memory_cost(60);
        assert_eq!(engine.wrappers.len(), 0);
        assert_eq!(engine.memory_cost(), 120);
    }

    #[test]
    fn test_collection_deferred_during_evaluation() {
        let engine = engine();
        struct Blob;
        impl ScriptObject for Blob {
            fn class_name(&self) -> &str {
                "Blob"
            }
        }
        drop(engine.new_qobject(Arc::new(Blob), ValueOwnership::ScriptOwned, WrapOptions::default()));
        let weak = Arc::downgrade(&engine);
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let record = sizes.clone();
        engine.register_function(
            "collect",
            native_function(move |_ctx, engine| {
                if let Some(interp) = weak.upgrade() {
                    engine.collect_garbage();
                    record.lock().push(interp.wrappers.len());
                }
                engine.undefined_value()
            }),
            0,
        );
        engine.evaluate("collect()", "gc.js");
        assert_eq!(*sizes.lock(), vec![1]);
        assert_eq!(engine.wrappers.len(), 0);
    }

    #[test]
    fn test_strict_thread_guard_refuses() {
        let engine = InterpEngine::new(EngineConfig::default().with_strict_thread_checks(true));
        let shared = engine.clone();
        let outcome = std::thread::spawn(move || {
            let value = shared.evaluate("1 + 1", "remote.js");
            (value.is_valid(), shared.thread_violation_count())
        })
        .join()
        .unwrap();
        assert_eq!(outcome, (false, 1));
        assert_eq!(engine.evaluate("1 + 1", "local.js").to_int32(), 2);
    }

    #[test]
    fn test_strict_thread_guard_covers_collection_and_emit() {
        struct Blob;
        impl ScriptObject for Blob {
            fn class_name(&self) -> &str {
                "Blob"
            }
        }
        let engine = InterpEngine::new(EngineConfig::default().with_strict_thread_checks(true));
        drop(engine.new_qobject(Arc::new(Blob), ValueOwnership::ScriptOwned, WrapOptions::default()));
        assert!(engine.raise_exception(&engine.new_string("pending")));

        let shared = engine.clone();
        let emitted = std::thread::spawn(move || {
            shared.collect_garbage();
            shared.request_collect_garbage();
            shared.update_memory_cost(10);
            shared.maybe_emit_uncaught_exception("remote")
        })
        .join()
        .unwrap();

        assert!(!emitted);
        assert_eq!(engine.thread_violation_count(), 4);
        assert_eq!(engine.wrappers.len(), 1);
        assert_eq!(engine.memory_cost(), 0);
        assert!(engine.has_uncaught_exception());
        assert!(engine.maybe_emit_uncaught_exception("local"));
    }

    #[test]
    fn test_new_array_length_is_clamped() {
        let engine = engine();
        assert_eq!(engine.new_array(3).property("length").to_uint32(), 3);
        let huge = engine.new_array(u32::MAX);
        assert!(huge.is_array());
        assert_eq!(huge.property("length").to_uint32(), MAX_ARRAY_GAP as u32);
    }

    #[test]
    fn test_default_prototype_applies_to_created_values() {
        struct Token(u32);
        let engine = engine();
        let prototype = engine.evaluate("({ describe: function() { return 'token ' + this.id; } })", "proto.js");
        (engine.as_ref() as &dyn ScriptEngine).register_type::<Token, _, _>(
            |engine, token| {
                let object = engine.new_object();
                object.set_property("id", &engine.new_uint(token.0));
                object
            },
            |value, out| {
                out.0 = value.property("id").to_uint32();
                true
            },
        );
        engine.set_default_prototype(TypeId::of::<Token>(), prototype.clone());
        assert!(engine.default_prototype(TypeId::of::<Token>()).strict_equals(&prototype));

        let value = engine.create(TypeId::of::<Token>(), &Token(7)).unwrap();
        let describe = value.property("describe");
        assert_eq!(describe.call(&value, &[]).to_string(), "token 7");
    }

    #[test]
    fn test_shutdown_invalidates_handles() {
        let engine = engine();
        let object = engine.evaluate("({ n: 1, self: null })", "obj.js");
        engine.evaluate("var cycle = {}; cycle.me = cycle; function f() { return f; }", "cycle.js");
        engine.shutdown();
        assert!(engine.is_shut_down());
        assert!(!object.is_valid());
        assert!(!object.property("n").is_valid());
        assert!(!engine.evaluate("1", "late.js").is_valid());
        assert!(!engine.global_object().is_valid());
    }

    #[test]
    fn test_current_script_urls() {
        let engine = engine();
        let urls = Arc::new(Mutex::new(Vec::new()));
        let sink = urls.clone();
        engine.register_function(
            "urls",
            native_function(move |_ctx, engine| {
                *sink.lock() = engine.current_script_urls();
                engine.undefined_value()
            }),
            0,
        );
        engine.evaluate("function inner() { urls(); }", "lib.js");
        engine.evaluate("inner()", "main.js");
        assert_eq!(*urls.lock(), vec!["lib.js".to_string(), "main.js".to_string()]);
        assert!(engine.current_script_urls().is_empty());
    }
}
