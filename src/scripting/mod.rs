// Mon Oct 12 2026 - Alex

pub mod callback;
pub mod context;
pub mod engine;
pub mod error;
pub mod exception;
pub mod manager;
pub mod marshal;
pub mod object;
pub mod program;
pub mod thread;
pub mod types;
pub mod value;
pub mod worker;

pub use callback::{call_scoped_handler_object, make_scoped_handler_object};
pub use context::{native_function, ScriptContext, ScriptFunction};
pub use engine::{create_engine, new_script_engine, ScriptEngine, ScriptEnginePointer};
pub use error::{ScriptError, ScriptErrorKind};
pub use exception::UncaughtException;
pub use manager::ScriptManager;
pub use marshal::{script_value_cast, script_value_from_value, ConvertOutcome, ScriptMarshal};
pub use object::{MethodInfo, MethodKind, PropertyInfo, ScriptObject};
pub use program::{ScriptProgram, ScriptProgramPointer, ScriptSyntaxCheckResult};
pub use types::{ScriptVariant, ValueKind, ValueOwnership, WrapOptions};
pub use value::ScriptValue;
pub use worker::EngineThread;
