// Tue Oct 13 2026 - Alex

use crate::scripting::error::ScriptErrorKind;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Owning-thread bookkeeping shared by engine backends.
pub struct ThreadAffinity {
    owner: RwLock<ThreadId>,
    violations: AtomicU64,
    strict: bool,
}

impl ThreadAffinity {
    /// The constructing thread becomes the owner.
    pub fn new(strict: bool) -> Self {
        Self {
            owner: RwLock::new(thread::current().id()),
            violations: AtomicU64::new(0),
            strict,
        }
    }

    pub fn owner(&self) -> ThreadId {
        *self.owner.read()
    }

    pub fn set_owner(&self, thread: ThreadId) {
        *self.owner.write() = thread;
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    /// True when called from the owning thread. A violation is logged and
    /// counted but never blocks the caller.
    pub fn check(&self, engine_name: &str, method: &str) -> bool {
        let current = thread::current().id();
        let owner = self.owner();
        if current == owner {
            return true;
        }
        self.violations.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "{}: [{}] {} invoked from {:?} ({}), engine is owned by {:?}",
            ScriptErrorKind::ThreadSafetyViolation,
            engine_name,
            method,
            current,
            thread::current().name().unwrap_or("unnamed"),
            owner
        );
        false
    }

    /// Whether a mutating call may proceed: always in fail-open mode, only on
    /// the owning thread in strict mode.
    pub fn permits(&self, engine_name: &str, method: &str) -> bool {
        if self.check(engine_name, method) {
            return true;
        }
        if self.strict {
            log::error!("[{}] refusing {} from a foreign thread (strict thread checks)", engine_name, method);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_owner_thread_passes() {
        let affinity = ThreadAffinity::new(false);
        assert!(affinity.check("test", "evaluate"));
        assert_eq!(affinity.violations(), 0);
    }

    #[test]
    fn test_foreign_thread_is_reported_but_permitted() {
        let affinity = Arc::new(ThreadAffinity::new(false));
        let remote = affinity.clone();
        let (checked, permitted) = thread::spawn(move || {
            (remote.check("test", "evaluate"), remote.permits("test", "evaluate"))
        })
        .join()
        .unwrap();
        assert!(!checked);
        assert!(permitted);
        assert_eq!(affinity.violations(), 2);
    }

    #[test]
    fn test_strict_mode_refuses_foreign_thread() {
        let affinity = Arc::new(ThreadAffinity::new(true));
        let remote = affinity.clone();
        let permitted = thread::spawn(move || remote.permits("test", "evaluate")).join().unwrap();
        assert!(!permitted);
        assert!(affinity.permits("test", "evaluate"));
    }

    #[test]
    fn test_set_owner_moves_affinity() {
        let affinity = Arc::new(ThreadAffinity::new(false));
        let remote = affinity.clone();
        thread::spawn(move || {
            remote.set_owner(thread::current().id());
            assert!(remote.check("test", "evaluate"));
        })
        .join()
        .unwrap();
        assert!(!affinity.check("test", "evaluate"));
    }
}
