// Mon Oct 12 2026 - Alex

use crate::scripting::exception::UncaughtException;
use std::fmt;
use thiserror::Error;

/// Classification of the failures the engine reports as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptErrorKind {
    SyntaxError,
    RuntimeException,
    ConversionFailure,
    ThreadSafetyViolation,
    DoubleRaiseFailure,
    Aborted,
}

impl fmt::Display for ScriptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptErrorKind::SyntaxError => "SyntaxError",
            ScriptErrorKind::RuntimeException => "RuntimeException",
            ScriptErrorKind::ConversionFailure => "ConversionFailure",
            ScriptErrorKind::ThreadSafetyViolation => "ThreadSafetyViolation",
            ScriptErrorKind::DoubleRaiseFailure => "DoubleRaiseFailure",
            ScriptErrorKind::Aborted => "Aborted",
        };
        write!(f, "{}", name)
    }
}

/// Errors surfaced to host code by the fallible, non-engine entry points.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Uncaught exception: {0}")]
    Uncaught(UncaughtException),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("Engine thread is not running")]
    EngineThreadStopped,
    #[error("Blocking engine call issued from the engine thread")]
    EngineThreadReentry,
    #[error("Engine has been shut down")]
    EngineShutDown,
}

impl ScriptError {
    pub fn kind(&self) -> Option<ScriptErrorKind> {
        match self {
            ScriptError::Uncaught(report) if report.is_syntax_error() => Some(ScriptErrorKind::SyntaxError),
            ScriptError::Uncaught(report) if report.is_abort() => Some(ScriptErrorKind::Aborted),
            ScriptError::Uncaught(_) => Some(ScriptErrorKind::RuntimeException),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ScriptErrorKind::DoubleRaiseFailure.to_string(), "DoubleRaiseFailure");
        assert_eq!(ScriptErrorKind::ThreadSafetyViolation.to_string(), "ThreadSafetyViolation");
    }

    #[test]
    fn test_script_error_display() {
        let err = ScriptError::Config("max_call_depth must be greater than 0".to_string());
        assert!(err.to_string().contains("max_call_depth"));
        assert!(err.kind().is_none());
    }
}
