// Wed Oct 14 2026 - Alex

use crate::config::EngineConfig;
use crate::scripting::engine::{create_engine, ScriptEnginePointer};
use crate::scripting::error::ScriptError;
use crate::scripting::exception::UncaughtException;
use crate::scripting::program::ScriptSyntaxCheckResult;
use crate::scripting::value::ScriptValue;
use crate::scripting::worker::{EngineJob, EngineThread};
use log::info;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Owns one engine: construction, owning thread, exception reporting and
/// teardown.
pub struct ScriptManager {
    engine: ScriptEnginePointer,
    history: Arc<Mutex<Vec<UncaughtException>>>,
    engine_thread: RwLock<Option<Arc<EngineThread>>>,
}

impl ScriptManager {
    pub fn new(config: EngineConfig) -> Result<Self, ScriptError> {
        config.validate().map_err(ScriptError::Config)?;
        let name = config.name.clone();
        let backend = config.backend;
        let engine = create_engine(config);

        let history = Arc::new(Mutex::new(Vec::new()));
        let sink = history.clone();
        engine.add_uncaught_exception_listener(Arc::new(move |report: &UncaughtException| {
            sink.lock().push(report.clone());
        }));

        info!("Created script engine '{}' ({} backend)", name, backend);
        Ok(Self {
            engine,
            history,
            engine_thread: RwLock::new(None),
        })
    }

    pub fn engine(&self) -> ScriptEnginePointer {
        self.engine.clone()
    }

    /// Evaluate on the calling thread, turning an uncaught exception into an
    /// error after reporting it to listeners.
    pub fn run(&self, source: &str, file_name: &str) -> Result<ScriptValue, ScriptError> {
        if self.engine.is_shut_down() {
            return Err(ScriptError::EngineShutDown);
        }
        let value = self.engine.evaluate(source, file_name);
        match self.engine.uncaught_exception_report() {
            Some(mut report) => {
                self.engine.maybe_emit_uncaught_exception(file_name);
                report.debug_hint = file_name.to_string();
                Err(ScriptError::Uncaught(report))
            }
            None => Ok(value),
        }
    }

    pub fn run_file(&self, path: &Path) -> Result<ScriptValue, ScriptError> {
        let source = std::fs::read_to_string(path)?;
        self.run(&source, &path.display().to_string())
    }

    pub fn check_syntax(&self, source: &str, file_name: &str) -> ScriptSyntaxCheckResult {
        let program = self.engine.new_program(source, file_name);
        self.engine.check_script_syntax(&program)
    }

    pub fn on_uncaught_exception<F>(&self, listener: F)
    where
        F: Fn(&UncaughtException) + Send + Sync + 'static,
    {
        self.engine.add_uncaught_exception_listener(Arc::new(listener));
    }

    /// Every exception reported so far, oldest first.
    pub fn uncaught_exceptions(&self) -> Vec<UncaughtException> {
        self.history.lock().clone()
    }

    pub fn move_to_thread(&self, thread: ThreadId) {
        info!("Moving engine '{}' to {:?}", self.engine.object_name(), thread);
        self.engine.set_thread(thread);
    }

    /// Start a dedicated engine thread. Returns the running one if present.
    pub fn start_engine_thread(&self) -> Result<ThreadId, ScriptError> {
        let mut slot = self.engine_thread.write();
        if let Some(existing) = slot.as_ref() {
            if existing.is_running() {
                return Ok(existing.thread_id());
            }
        }
        let worker = EngineThread::start(self.engine.clone())?;
        let thread_id = worker.thread_id();
        *slot = Some(Arc::new(worker));
        Ok(thread_id)
    }

    /// Stop the engine thread and hand ownership back to the caller.
    pub fn stop_engine_thread(&self) {
        let worker = self.engine_thread.write().take();
        if let Some(worker) = worker {
            worker.stop();
            self.engine.set_thread(thread::current().id());
        }
    }

    fn worker(&self) -> Result<Arc<EngineThread>, ScriptError> {
        self.engine_thread.read().clone().ok_or(ScriptError::EngineThreadStopped)
    }

    pub fn post(&self, job: EngineJob) -> Result<(), ScriptError> {
        self.worker()?.post(job)
    }

    pub fn call<R, F>(&self, f: F) -> Result<R, ScriptError>
    where
        R: Send + 'static,
        F: FnOnce(&ScriptEnginePointer) -> R + Send + 'static,
    {
        self.worker()?.call(f)
    }

    pub fn shutdown(&self) {
        if self.engine.is_shut_down() {
            return;
        }
        self.stop_engine_thread();
        self.engine.set_thread(thread::current().id());
        self.engine.shutdown();
        info!("Shut down script engine '{}'", self.engine.object_name());
    }
}

impl Drop for ScriptManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::error::ScriptErrorKind;

    fn manager() -> ScriptManager {
        ScriptManager::new(EngineConfig::new().with_name("test")).unwrap()
    }

    #[test]
    fn test_run_reports_uncaught() {
        let manager = manager();
        let err = manager.run("throw new TypeError('nope');", "bad.js").unwrap_err();
        assert_eq!(err.kind(), Some(ScriptErrorKind::RuntimeException));
        match err {
            ScriptError::Uncaught(report) => {
                assert_eq!(report.name, "TypeError");
                assert_eq!(report.message, "nope");
                assert_eq!(report.file_name, "bad.js");
            }
            other => panic!("unexpected error {}", other),
        }
        assert_eq!(manager.uncaught_exceptions().len(), 1);
    }

    #[test]
    fn test_syntax_error_then_recover() {
        let manager = manager();
        let err = manager.run("this is not valid syntax", "bad.js").unwrap_err();
        assert_eq!(err.kind(), Some(ScriptErrorKind::SyntaxError));
        let value = manager.run("1 + 1", "good.js").unwrap();
        assert_eq!(value.to_int32(), 2);
    }

    #[test]
    fn test_check_syntax() {
        let manager = manager();
        assert!(manager.check_syntax("var a = 1;", "ok.js").is_ok());
        let result = manager.check_syntax("var = ;", "bad.js");
        assert!(!result.is_ok());
        assert_eq!(result.line_number, 1);
    }

    #[test]
    fn test_engine_thread_queue() {
        let manager = manager();
        assert!(matches!(manager.post(Box::new(|_| {})), Err(ScriptError::EngineThreadStopped)));

        let thread_id = manager.start_engine_thread().unwrap();
        assert_eq!(manager.engine().thread(), thread_id);
        assert_eq!(manager.start_engine_thread().unwrap(), thread_id);

        manager
            .post(Box::new(|engine| {
                engine.evaluate("var counter = 10;", "job.js");
            }))
            .unwrap();
        let counter = manager.call(|engine| engine.evaluate("counter + 1", "job.js").to_int32()).unwrap();
        assert_eq!(counter, 11);

        assert!(!manager.engine().is_threadsafe_invocation("test"));
        manager.stop_engine_thread();
        assert!(manager.engine().is_threadsafe_invocation("test"));
    }

    #[test]
    fn test_shutdown_makes_handles_inert() {
        let manager = manager();
        let value = manager.run("({ answer: 42 })", "obj.js").unwrap();
        assert_eq!(value.property("answer").to_int32(), 42);

        manager.shutdown();
        assert!(manager.engine().is_shut_down());
        assert!(!value.property("answer").is_valid());
        assert!(matches!(manager.run("1", "late.js"), Err(ScriptError::EngineShutDown)));
    }
}
