//! Thread lifecycle primitives.
//!
//! Every socket owns one [`TaskGroup`]; every thread the socket starts is
//! tracked there so close can await all of them. The [`ShutdownFlag`] is the
//! socket-wide cancellation signal: blocking loops poll it at least every
//! [`crossbar_core::deadline::POLL_INTERVAL`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbar_core::deadline::POLL_INTERVAL;
use crossbar_core::error::{Error, Result};
use tracing::trace;

/// One-way cancellation signal shared by a socket and its threads.
#[derive(Debug, Default)]
pub struct ShutdownFlag(AtomicBool);

impl ShutdownFlag {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Raise the signal. Irreversible.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Sleep for `dur`, waking early when `flag` is raised.
///
/// Returns true when the sleep was interrupted by shutdown.
pub fn sleep_interruptibly(flag: &ShutdownFlag, dur: Duration) -> bool {
    let mut left = dur;
    while !left.is_zero() {
        if flag.is_raised() {
            return true;
        }
        let slice = left.min(POLL_INTERVAL);
        std::thread::sleep(slice);
        left -= slice;
    }
    flag.is_raised()
}

/// Joinable set of threads belonging to one socket.
#[derive(Debug, Default)]
pub struct TaskGroup {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a named thread and track its handle.
    pub fn spawn<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(f)
            .map_err(Error::from)?;
        self.lock().push(handle);
        Ok(())
    }

    /// Wait for every tracked thread to exit.
    ///
    /// Threads must already have been told to stop; this only joins.
    pub fn join_all(&self) {
        let handles = std::mem::take(&mut *self.lock());
        trace!(count = handles.len(), "joining socket threads");
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Number of currently tracked threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn test_flag_raise() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_raised());
        flag.raise();
        assert!(flag.is_raised());
    }

    #[test]
    fn test_sleep_interrupted_quickly() {
        let flag = ShutdownFlag::new();
        flag.raise();
        let start = Instant::now();
        assert!(sleep_interruptibly(&flag, Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_join_all_waits_for_threads() {
        let group = TaskGroup::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            group
                .spawn("cb-test", move || {
                    std::thread::sleep(Duration::from_millis(10));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert_eq!(group.len(), 4);

        group.join_all();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert!(group.is_empty());
    }
}
