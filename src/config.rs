// Mon Oct 12 2026 - Alex

use crate::scripting::error::ScriptError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Concrete engine implementation selected at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Interpreter,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Interpreter
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Interpreter => write!(f, "interpreter"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    pub backend: BackendKind,
    /// Refuse (instead of just reporting) calls made from a foreign thread.
    pub strict_thread_checks: bool,
    /// Allow `raise_exception` to replace a pending exception.
    pub nested_exceptions: bool,
    pub clear_exception_on_emit: bool,
    /// External memory pressure, in bytes, that triggers a collection.
    pub gc_memory_threshold: i64,
    pub max_call_depth: usize,
    /// Native stack, in bytes, one evaluation may use before script calls
    /// fail with a `RangeError`. Keep it well under the smallest thread stack
    /// the engine runs on.
    pub max_stack_size: usize,
    /// Statement budget per outermost evaluation, 0 for unlimited.
    pub execution_limit: u64,
    /// 0 disables the process-events hook.
    pub process_events_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "script-engine".to_string(),
            backend: BackendKind::Interpreter,
            strict_thread_checks: false,
            nested_exceptions: false,
            clear_exception_on_emit: false,
            gc_memory_threshold: 16 * 1024 * 1024,
            max_call_depth: 256,
            max_stack_size: 1024 * 1024,
            execution_limit: 0,
            process_events_interval_ms: 0,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_strict_thread_checks(mut self, strict: bool) -> Self {
        self.strict_thread_checks = strict;
        self
    }

    pub fn with_nested_exceptions(mut self, nested: bool) -> Self {
        self.nested_exceptions = nested;
        self
    }

    pub fn with_clear_exception_on_emit(mut self, clear: bool) -> Self {
        self.clear_exception_on_emit = clear;
        self
    }

    pub fn with_gc_memory_threshold(mut self, bytes: i64) -> Self {
        self.gc_memory_threshold = bytes;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = bytes;
        self
    }

    pub fn with_execution_limit(mut self, limit: u64) -> Self {
        self.execution_limit = limit;
        self
    }

    pub fn with_process_events_interval(mut self, ms: u64) -> Self {
        self.process_events_interval_ms = ms;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.max_call_depth == 0 {
            return Err("max_call_depth must be greater than 0".to_string());
        }
        if self.max_stack_size < 64 * 1024 {
            return Err("max_stack_size must be at least 64 KiB".to_string());
        }
        if self.gc_memory_threshold <= 0 {
            return Err("gc_memory_threshold must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ScriptError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate().map_err(ScriptError::Config)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_name("worker")
            .with_strict_thread_checks(true)
            .with_max_call_depth(8);
        assert_eq!(config.name, "worker");
        assert!(config.strict_thread_checks);
        assert_eq!(config.max_call_depth, 8);
    }

    #[test]
    fn test_validate_rejects_zero_depth() {
        let config = EngineConfig::new().with_max_call_depth(0);
        assert!(config.validate().is_err());
        assert!(EngineConfig::new().with_max_stack_size(1024).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{"name": "ui", "nested_exceptions": true}"#).unwrap();
        assert_eq!(config.name, "ui");
        assert!(config.nested_exceptions);
        assert_eq!(config.backend, BackendKind::Interpreter);
        assert_eq!(config.max_call_depth, 256);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(ScriptError::ConfigParse(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"gc_memory_threshold": 0}"#),
            Err(ScriptError::Config(_))
        ));
    }
}
