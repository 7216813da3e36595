// Mon Oct 12 2026 - Alex

use crate::scripting::engine::{ScriptEngine, ScriptEnginePointer};
use crate::scripting::value::ScriptValue;
use std::sync::Arc;

/// Native function callable from script.
pub type ScriptFunction = Arc<dyn Fn(&dyn ScriptContext, &dyn ScriptEngine) -> ScriptValue + Send + Sync>;

/// Wrap a closure as a [`ScriptFunction`].
pub fn native_function<F>(f: F) -> ScriptFunction
where
    F: Fn(&dyn ScriptContext, &dyn ScriptEngine) -> ScriptValue + Send + Sync + 'static,
{
    Arc::new(f)
}

/// View of a single native-function invocation from script.
///
/// Only valid for the duration of the call; the engine hands it out by
/// reference so it cannot be retained.
pub trait ScriptContext {
    fn argument_count(&self) -> usize;

    /// Argument at `index`, or `undefined` when out of range.
    fn argument(&self, index: usize) -> ScriptValue;

    fn this_object(&self) -> ScriptValue;

    fn callee(&self) -> ScriptValue;

    fn engine(&self) -> ScriptEnginePointer;

    fn backtrace(&self) -> Vec<String>;

    fn file_name(&self) -> String;

    fn line_number(&self) -> i32;

    /// Raise an `Error` with `message`; the calling script sees it thrown
    /// once the native function returns.
    fn throw_error(&self, message: &str) -> ScriptValue;

    fn throw_value(&self, value: ScriptValue) -> ScriptValue;
}

impl dyn ScriptContext + '_ {
    pub fn arguments(&self) -> Vec<ScriptValue> {
        (0..self.argument_count()).map(|i| self.argument(i)).collect()
    }
}
