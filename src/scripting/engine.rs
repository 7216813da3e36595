// Tue Oct 13 2026 - Alex

use crate::config::{BackendKind, EngineConfig};
use crate::scripting::context::ScriptFunction;
use crate::scripting::exception::UncaughtException;
use crate::scripting::marshal::{ConvertOutcome, DemarshalFunction, MarshalFunction, ScriptMarshal};
use crate::scripting::object::ScriptObject;
use crate::scripting::program::{ScriptProgram, ScriptProgramPointer, ScriptSyntaxCheckResult};
use crate::scripting::types::{ScriptVariant, ValueOwnership, WrapOptions};
use crate::scripting::value::ScriptValue;
use std::any::{Any, TypeId};
use std::sync::Arc;
use std::thread::ThreadId;

pub type ScriptEnginePointer = Arc<dyn ScriptEngine>;

/// Host callback notified once per distinct uncaught exception.
pub type UncaughtExceptionListener = Arc<dyn Fn(&UncaughtException) + Send + Sync>;

/// Called periodically from long-running evaluation.
pub type ProcessEventsHook = Arc<dyn Fn() + Send + Sync>;

/// Contract every script engine backend implements.
///
/// Script failures never surface as Rust errors here: they are recorded in
/// the engine's exception slot and inspected through `has_uncaught_exception`
/// and friends. Calls are expected on the owning thread; see
/// `is_threadsafe_invocation`.
pub trait ScriptEngine: Send + Sync {
    fn backend(&self) -> BackendKind;

    fn config(&self) -> EngineConfig;

    fn as_any(&self) -> &dyn Any;

    // Evaluation

    fn evaluate(&self, source: &str, file_name: &str) -> ScriptValue;

    fn evaluate_program(&self, program: &ScriptProgram) -> ScriptValue;

    /// Run `program` in a fresh top-level scope seeded from the properties of
    /// `locals`. Top-level declarations stay in that scope.
    fn evaluate_in_closure(&self, locals: &ScriptValue, program: &ScriptProgram) -> ScriptValue;

    fn check_script_syntax(&self, program: &ScriptProgram) -> ScriptSyntaxCheckResult;

    fn new_program(&self, source: &str, file_name: &str) -> ScriptProgramPointer {
        Arc::new(ScriptProgram::new(source, file_name))
    }

    /// Safe to call from any thread.
    fn abort_evaluation(&self);

    fn is_evaluating(&self) -> bool;

    fn set_process_events_interval(&self, interval_ms: u64);

    fn set_process_events_hook(&self, hook: Option<ProcessEventsHook>);

    /// File names of the scripts on the current call stack, innermost first.
    fn current_script_urls(&self) -> Vec<String>;

    // Values

    fn global_object(&self) -> ScriptValue;

    fn undefined_value(&self) -> ScriptValue;

    fn null_value(&self) -> ScriptValue;

    fn new_bool(&self, value: bool) -> ScriptValue;

    fn new_number(&self, value: f64) -> ScriptValue;

    fn new_int(&self, value: i32) -> ScriptValue {
        self.new_number(value as f64)
    }

    fn new_uint(&self, value: u32) -> ScriptValue {
        self.new_number(value as f64)
    }

    fn new_string(&self, value: &str) -> ScriptValue;

    fn new_object(&self) -> ScriptValue;

    fn new_array(&self, length: u32) -> ScriptValue;

    fn new_array_buffer(&self, bytes: &[u8]) -> ScriptValue;

    /// `length` is informational; -1 marks a variadic function.
    fn new_function(&self, function: ScriptFunction, length: i32) -> ScriptValue;

    fn new_variant(&self, variant: &ScriptVariant) -> ScriptValue;

    fn new_qobject(&self, object: Arc<dyn ScriptObject>, ownership: ValueOwnership, options: WrapOptions) -> ScriptValue;

    /// Turn `other` into an error object of constructor `error_type`
    /// ("Error", "TypeError", ...). Error objects are returned unchanged.
    fn make_error(&self, other: &ScriptValue, error_type: &str) -> ScriptValue;

    // Registration

    fn register_function(&self, name: &str, function: ScriptFunction, arity: i32) -> ScriptValue;

    /// `parent` is a dotted path; missing objects along it are created.
    fn register_namespaced_function(&self, parent: &str, name: &str, function: ScriptFunction, arity: i32) -> ScriptValue;

    /// An invalid `parent` means the global object.
    fn register_getter_setter(
        &self,
        name: &str,
        getter: Option<ScriptFunction>,
        setter: Option<ScriptFunction>,
        parent: &ScriptValue,
    ) -> bool;

    fn register_enum(&self, name: &str, entries: &[(&str, i32)]) -> ScriptValue;

    fn register_global_object(&self, name: &str, object: Arc<dyn ScriptObject>) -> ScriptValue;

    fn register_custom_type(&self, type_id: TypeId, marshal: MarshalFunction, demarshal: DemarshalFunction);

    fn set_default_prototype(&self, type_id: TypeId, prototype: ScriptValue);

    fn default_prototype(&self, type_id: TypeId) -> ScriptValue;

    /// Registry-backed conversion of a native value. `None` when no entry is
    /// registered for `type_id`.
    fn create(&self, type_id: TypeId, value: &dyn Any) -> Option<ScriptValue>;

    fn convert(&self, value: &ScriptValue, type_id: TypeId, out: &mut dyn Any) -> ConvertOutcome;

    // Exceptions

    fn has_uncaught_exception(&self) -> bool;

    fn uncaught_exception(&self) -> ScriptValue;

    fn uncaught_exception_backtrace(&self) -> Vec<String>;

    fn uncaught_exception_line_number(&self) -> i32;

    /// Snapshot of the pending exception for host-side reporting.
    fn uncaught_exception_report(&self) -> Option<UncaughtException>;

    fn clear_exceptions(&self);

    /// False when an exception is already pending and nested raises are
    /// disabled; the pending one is kept.
    fn raise_exception(&self, value: &ScriptValue) -> bool;

    /// Fresh error carrying the pending exception's name, message, location
    /// and stack plus `detail`. Invalid when nothing is pending.
    fn clone_uncaught_exception(&self, detail: &str) -> ScriptValue;

    /// True when an exception is pending. Listeners hear about each distinct
    /// exception once.
    fn maybe_emit_uncaught_exception(&self, debug_hint: &str) -> bool;

    fn add_uncaught_exception_listener(&self, listener: UncaughtExceptionListener);

    // Memory

    fn update_memory_cost(&self, delta: i64);

    fn memory_cost(&self) -> i64;

    fn request_collect_garbage(&self);

    /// Run a collection now unless an evaluation is in progress.
    fn collect_garbage(&self);

    // Threads

    fn is_threadsafe_invocation(&self, method: &str) -> bool;

    fn thread(&self) -> ThreadId;

    /// Move the engine to another owning thread. Reserved for the manager.
    fn set_thread(&self, thread: ThreadId);

    fn thread_violation_count(&self) -> u64;

    // Engine properties

    fn object_name(&self) -> String;

    fn set_object_name(&self, name: &str);

    fn set_property(&self, name: &str, value: ScriptVariant);

    fn property(&self, name: &str) -> Option<ScriptVariant>;

    fn script_value_debug_details(&self, value: &ScriptValue) -> String {
        format!("{} {}", value.kind(), value)
    }

    fn script_value_debug_list_members(&self, value: &ScriptValue) -> String {
        value
            .property_names()
            .into_iter()
            .map(|name| {
                let member = value.property(&name);
                format!("{} ({}): {}", name, member.kind(), member)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // Lifecycle

    /// Drop everything the engine can still reach. Handles outliving this
    /// become inert.
    fn shutdown(&self);

    fn is_shut_down(&self) -> bool;
}

/// Generic helpers that cannot live on the object-safe trait itself.
impl dyn ScriptEngine + '_ {
    /// Marshal a host value through its direct conversion, then a registered
    /// custom type, then its variant form.
    pub fn to_script_value<T: ScriptMarshal + 'static>(&self, value: &T) -> ScriptValue {
        crate::scripting::marshal::script_value_from_value(self, value)
    }

    /// Demarshal into `T`; `T::default()` when nothing converts.
    pub fn from_script_value<T: ScriptMarshal + Default + 'static>(&self, value: &ScriptValue) -> T {
        crate::scripting::marshal::script_value_cast_with(self, value)
    }

    /// Typed front end for `register_custom_type`. Registering `T` again
    /// replaces its functions; values of another type marshal to undefined.
    pub fn register_type<T, M, D>(&self, marshal: M, demarshal: D)
    where
        T: Any,
        M: Fn(&dyn ScriptEngine, &T) -> ScriptValue + Send + Sync + 'static,
        D: Fn(&ScriptValue, &mut T) -> bool + Send + Sync + 'static,
    {
        let marshal: MarshalFunction = Arc::new(move |engine, value| match value.downcast_ref::<T>() {
            Some(value) => marshal(engine, value),
            None => engine.undefined_value(),
        });
        let demarshal: DemarshalFunction = Arc::new(move |value, out| match out.downcast_mut::<T>() {
            Some(out) => demarshal(value, out),
            None => false,
        });
        self.register_custom_type(TypeId::of::<T>(), marshal, demarshal);
    }

    /// Host-owned wrapper with default options.
    pub fn new_qobject_default(&self, object: Arc<dyn ScriptObject>) -> ScriptValue {
        self.new_qobject(object, ValueOwnership::HostOwned, WrapOptions::default())
    }
}

/// Build an engine of the requested backend.
pub fn new_script_engine(kind: BackendKind, config: EngineConfig) -> ScriptEnginePointer {
    match kind {
        BackendKind::Interpreter => crate::interp::InterpEngine::new(config),
    }
}

/// Build an engine of the backend named in `config`.
pub fn create_engine(config: EngineConfig) -> ScriptEnginePointer {
    new_script_engine(config.backend, config)
}
