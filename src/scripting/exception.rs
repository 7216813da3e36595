// Tue Oct 13 2026 - Alex

use crate::scripting::error::ScriptErrorKind;
use crate::scripting::value::ScriptValue;
use parking_lot::Mutex;
use std::fmt;

/// Everything the engine knows about one captured exception.
#[derive(Debug, Clone)]
pub struct CapturedException {
    pub id: u64,
    pub value: ScriptValue,
    pub name: String,
    pub message: String,
    pub file_name: String,
    pub line_number: i32,
    pub backtrace: Vec<String>,
}

impl CapturedException {
    pub fn new(value: ScriptValue, name: &str, message: &str) -> Self {
        Self {
            id: 0,
            value,
            name: name.to_string(),
            message: message.to_string(),
            file_name: String::new(),
            line_number: -1,
            backtrace: Vec::new(),
        }
    }

    pub fn with_location(mut self, file_name: &str, line_number: i32) -> Self {
        self.file_name = file_name.to_string();
        self.line_number = line_number;
        self
    }

    pub fn with_backtrace(mut self, backtrace: Vec<String>) -> Self {
        self.backtrace = backtrace;
        self
    }
}

/// Host-facing report of an uncaught exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncaughtException {
    pub id: u64,
    pub name: String,
    pub message: String,
    pub file_name: String,
    pub line_number: i32,
    pub backtrace: Vec<String>,
    pub debug_hint: String,
}

impl UncaughtException {
    pub fn is_syntax_error(&self) -> bool {
        self.name == "SyntaxError"
    }

    pub fn is_abort(&self) -> bool {
        self.name == "AbortError"
    }
}

impl fmt::Display for UncaughtException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)?;
        if !self.file_name.is_empty() {
            write!(f, " ({}:{})", self.file_name, self.line_number)?;
        }
        if !self.debug_hint.is_empty() {
            write!(f, " [{}]", self.debug_hint)?;
        }
        Ok(())
    }
}

/// What `maybe_emit_uncaught_exception` should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitDecision {
    Nothing,
    AlreadyEmitted,
    Emit(UncaughtException),
}

#[derive(Default)]
struct SlotState {
    pending: Option<CapturedException>,
    emitted: bool,
    next_id: u64,
}

/// Single-slot exception state of one engine.
#[derive(Default)]
pub struct ExceptionSlot {
    state: Mutex<SlotState>,
}

impl ExceptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an exception produced by evaluation, replacing any pending one.
    pub fn record(&self, mut exception: CapturedException) -> u64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        exception.id = state.next_id;
        state.pending = Some(exception);
        state.emitted = false;
        state.next_id
    }

    /// Store an explicitly raised exception. Fails instead of overwriting when
    /// one is pending and nested raises are not allowed.
    pub fn raise(&self, exception: CapturedException, allow_nested: bool) -> Result<u64, ScriptErrorKind> {
        if !allow_nested && self.has_pending() {
            return Err(ScriptErrorKind::DoubleRaiseFailure);
        }
        Ok(self.record(exception))
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.pending = None;
        state.emitted = false;
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    pub fn pending(&self) -> Option<CapturedException> {
        self.state.lock().pending.clone()
    }

    pub fn pending_id(&self) -> Option<u64> {
        self.state.lock().pending.as_ref().map(|e| e.id)
    }

    pub fn take(&self) -> Option<CapturedException> {
        let mut state = self.state.lock();
        state.emitted = false;
        state.pending.take()
    }

    /// Marks the pending exception as emitted the first time it is asked.
    pub fn begin_emit(&self, debug_hint: &str) -> EmitDecision {
        let mut state = self.state.lock();
        if state.emitted {
            return match state.pending {
                Some(_) => EmitDecision::AlreadyEmitted,
                None => EmitDecision::Nothing,
            };
        }
        let report = match &state.pending {
            Some(pending) => UncaughtException {
                id: pending.id,
                name: pending.name.clone(),
                message: pending.message.clone(),
                file_name: pending.file_name.clone(),
                line_number: pending.line_number,
                backtrace: pending.backtrace.clone(),
                debug_hint: debug_hint.to_string(),
            },
            None => return EmitDecision::Nothing,
        };
        state.emitted = true;
        EmitDecision::Emit(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(message: &str) -> CapturedException {
        CapturedException::new(ScriptValue::invalid(), "Error", message).with_location("test.js", 3)
    }

    #[test]
    fn test_raise_refuses_overwrite() {
        let slot = ExceptionSlot::new();
        assert!(slot.raise(captured("first"), false).is_ok());
        assert_eq!(
            slot.raise(captured("second"), false),
            Err(ScriptErrorKind::DoubleRaiseFailure)
        );
        assert_eq!(slot.pending().unwrap().message, "first");
        assert!(slot.raise(captured("third"), true).is_ok());
        assert_eq!(slot.pending().unwrap().message, "third");
    }

    #[test]
    fn test_emit_once_per_exception() {
        let slot = ExceptionSlot::new();
        assert_eq!(slot.begin_emit(""), EmitDecision::Nothing);
        slot.record(captured("boom"));
        assert!(matches!(slot.begin_emit("hint"), EmitDecision::Emit(ref r) if r.message == "boom"));
        assert_eq!(slot.begin_emit("hint"), EmitDecision::AlreadyEmitted);

        slot.record(captured("again"));
        assert!(matches!(slot.begin_emit(""), EmitDecision::Emit(_)));
    }

    #[test]
    fn test_clear_resets_emit_flag() {
        let slot = ExceptionSlot::new();
        slot.record(captured("boom"));
        slot.begin_emit("");
        slot.clear();
        assert!(!slot.has_pending());
        assert_eq!(slot.begin_emit(""), EmitDecision::Nothing);
    }

    #[test]
    fn test_ids_are_distinct() {
        let slot = ExceptionSlot::new();
        let a = slot.record(captured("a"));
        let b = slot.record(captured("b"));
        assert_ne!(a, b);
        assert_eq!(slot.pending_id(), Some(b));
    }

    #[test]
    fn test_report_display() {
        let slot = ExceptionSlot::new();
        slot.record(captured("boom"));
        if let EmitDecision::Emit(report) = slot.begin_emit("timer") {
            assert_eq!(report.to_string(), "Error: boom (test.js:3) [timer]");
        } else {
            panic!("expected emit");
        }
    }
}
