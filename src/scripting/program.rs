// Mon Oct 12 2026 - Alex

use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub type ScriptProgramPointer = Arc<ScriptProgram>;

/// Source text plus logical filename, with a write-once slot for the
/// backend's compiled form.
pub struct ScriptProgram {
    source: String,
    file_name: String,
    compiled: OnceCell<Arc<dyn Any + Send + Sync>>,
}

impl ScriptProgram {
    pub fn new(source: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            file_name: file_name.into(),
            compiled: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Compiled payload, if it was produced by a backend using type `T`.
    pub fn compiled_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let payload = self.compiled.get()?.clone();
        payload.downcast::<T>().ok()
    }

    /// Returns the cached payload of type `T`, compiling it on first use.
    /// A payload of another type (from a different backend) is left in place
    /// and `compile` runs on every call.
    pub fn compiled_or_init<T, F>(&self, compile: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce(&str) -> T,
    {
        if let Some(existing) = self.compiled_as::<T>() {
            return existing;
        }
        let fresh = Arc::new(compile(&self.source));
        let _ = self.compiled.set(fresh.clone());
        fresh
    }
}

impl fmt::Debug for ScriptProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptProgram")
            .field("file_name", &self.file_name)
            .field("source_len", &self.source.len())
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

/// Outcome of a syntax check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptSyntaxCheckResult {
    pub error_message: Option<String>,
    pub line_number: i32,
    pub column_number: i32,
}

impl ScriptSyntaxCheckResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>, line: i32, column: i32) -> Self {
        Self {
            error_message: Some(message.into()),
            line_number: line,
            column_number: column,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_message.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiled_payload_is_cached() {
        let program = ScriptProgram::new("1 + 1", "test.js");
        let mut calls = 0;
        let first = program.compiled_or_init(|src| {
            calls += 1;
            src.len()
        });
        let second = program.compiled_or_init(|src| src.len() * 100);
        assert_eq!(*first, 5);
        assert_eq!(*second, 5);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_foreign_payload_is_not_reused() {
        let program = ScriptProgram::new("x", "a.js");
        program.compiled_or_init(|_| 7u8);
        assert!(program.compiled_as::<String>().is_none());
        let other = program.compiled_or_init(|src| src.to_string());
        assert_eq!(other.as_str(), "x");
        assert_eq!(program.compiled_as::<u8>().map(|v| *v), Some(7));
    }

    #[test]
    fn test_syntax_check_result() {
        assert!(ScriptSyntaxCheckResult::ok().is_ok());
        let bad = ScriptSyntaxCheckResult::error("Unexpected token", 3, 7);
        assert!(!bad.is_ok());
        assert_eq!(bad.line_number, 3);
    }
}
