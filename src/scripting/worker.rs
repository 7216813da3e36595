// Wed Oct 14 2026 - Alex

use crate::scripting::engine::ScriptEnginePointer;
use crate::scripting::error::ScriptError;
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle, ThreadId};

pub type EngineJob = Box<dyn FnOnce(&ScriptEnginePointer) + Send>;

/// Script recursion runs on the native stack.
const ENGINE_THREAD_STACK: usize = 8 * 1024 * 1024;

/// Dedicated owning thread for an engine, fed through a job queue.
pub struct EngineThread {
    name: String,
    thread_id: ThreadId,
    sender: Mutex<Option<Sender<EngineJob>>>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl EngineThread {
    /// Spawn the thread and make it the engine's owner before any job runs.
    pub fn start(engine: ScriptEnginePointer) -> Result<Self, ScriptError> {
        let name = format!("{}-engine", engine.object_name());
        let (sender, receiver) = mpsc::channel::<EngineJob>();
        let (ready_sender, ready_receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(name.clone())
            .stack_size(ENGINE_THREAD_STACK)
            .spawn(move || {
                engine.set_thread(thread::current().id());
                let _ = ready_sender.send(thread::current().id());
                EngineThread::worker_loop(&engine, receiver);
            })?;

        let thread_id = ready_receiver.recv().map_err(|_| ScriptError::EngineThreadStopped)?;
        debug!("Started engine thread '{}'", name);

        Ok(Self {
            name,
            thread_id,
            sender: Mutex::new(Some(sender)),
            thread_handle: Mutex::new(Some(handle)),
        })
    }

    fn worker_loop(engine: &ScriptEnginePointer, receiver: Receiver<EngineJob>) {
        while let Ok(job) = receiver.recv() {
            job(engine);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
            && self
                .thread_handle
                .lock()
                .as_ref()
                .map(|handle| !handle.is_finished())
                .unwrap_or(false)
    }

    /// Queue a job; it runs on the engine thread in submission order.
    pub fn post(&self, job: EngineJob) -> Result<(), ScriptError> {
        let sender = self.sender.lock().clone().ok_or(ScriptError::EngineThreadStopped)?;
        sender.send(job).map_err(|_| ScriptError::EngineThreadStopped)
    }

    /// Run `f` on the engine thread and wait for its result.
    pub fn call<R, F>(&self, f: F) -> Result<R, ScriptError>
    where
        R: Send + 'static,
        F: FnOnce(&ScriptEnginePointer) -> R + Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            return Err(ScriptError::EngineThreadReentry);
        }
        let (reply_sender, reply_receiver) = mpsc::channel();
        self.post(Box::new(move |engine| {
            let _ = reply_sender.send(f(engine));
        }))?;
        reply_receiver.recv().map_err(|_| ScriptError::EngineThreadStopped)
    }

    /// Close the queue and wait for queued jobs to finish.
    pub fn stop(&self) {
        self.sender.lock().take();
        let handle = self.thread_handle.lock().take();
        if let Some(handle) = handle {
            if thread::current().id() == self.thread_id {
                return;
            }
            if handle.join().is_err() {
                warn!("Engine thread '{}' panicked", self.name);
            }
            debug!("Stopped engine thread '{}'", self.name);
        }
    }
}

impl Drop for EngineThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, EngineConfig};
    use crate::scripting::engine::new_script_engine;

    #[test]
    fn test_jobs_run_on_engine_thread() {
        let engine = new_script_engine(BackendKind::Interpreter, EngineConfig::default());
        let worker = EngineThread::start(engine.clone()).unwrap();
        assert_eq!(engine.thread(), worker.thread_id());

        let (same_thread, value) = worker
            .call(|engine| {
                let same = engine.is_threadsafe_invocation("call");
                (same, engine.evaluate("6 * 7", "job.js").to_int32())
            })
            .unwrap();
        assert!(same_thread);
        assert_eq!(value, 42);
        assert!(worker.is_running());
    }

    #[test]
    fn test_posted_jobs_keep_order() {
        let engine = new_script_engine(BackendKind::Interpreter, EngineConfig::default());
        let worker = EngineThread::start(engine).unwrap();
        worker
            .post(Box::new(|engine| {
                engine.evaluate("var trail = 'a';", "one.js");
            }))
            .unwrap();
        worker
            .post(Box::new(|engine| {
                engine.evaluate("trail = trail + 'b';", "two.js");
            }))
            .unwrap();
        let trail = worker.call(|engine| engine.evaluate("trail", "three.js").to_string()).unwrap();
        assert_eq!(trail, "ab");
    }

    #[test]
    fn test_post_after_stop_fails() {
        let engine = new_script_engine(BackendKind::Interpreter, EngineConfig::default());
        let worker = EngineThread::start(engine).unwrap();
        worker.stop();
        assert!(!worker.is_running());
        assert!(matches!(
            worker.post(Box::new(|_| {})),
            Err(ScriptError::EngineThreadStopped)
        ));
    }
}
