// Mon Oct 12 2026 - Alex

pub mod config;
pub mod interp;
pub mod scripting;

pub use config::{BackendKind, EngineConfig};
pub use interp::InterpEngine;
pub use scripting::{create_engine, ScriptEngine, ScriptEnginePointer, ScriptValue};
