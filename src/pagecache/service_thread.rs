//! Cooperative timed sleep + kill primitive for background flushers
//! (spec.md §4.8, C8).

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Shared {
    killed: Mutex<bool>,
    condvar: Condvar,
}

impl Shared {
    /// Wait up to `duration`, or until `end()` is called. Returns `true` if
    /// the kill flag was observed set.
    fn sleep(&self, duration: Duration) -> bool {
        let guard = self.killed.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _timeout) = self
            .condvar
            .wait_timeout_while(guard, duration, |killed| !*killed)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }

    fn end(&self) {
        *self.killed.lock().unwrap_or_else(|e| e.into_inner()) = true;
        self.condvar.notify_all();
    }
}

/// A named thread that repeats `tick` every `interval` until `end()` (or
/// drop) signals it to stop.
pub struct ServiceThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl ServiceThread {
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let shared = Arc::new(Shared { killed: Mutex::new(false), condvar: Condvar::new() });
        let worker = shared.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                tick();
                if worker.sleep(interval) {
                    break;
                }
            })
            .expect("failed to spawn page cache service thread");
        Self { shared, handle: Some(handle) }
    }

    /// Signal the thread to stop and join it. Idempotent.
    pub fn end(&mut self) {
        self.shared.end();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ServiceThread {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn tick_runs_at_least_once_before_end() {
        let counter = Arc::new(AtomicU32::new(0));
        let worker_counter = counter.clone();
        let mut thread = ServiceThread::spawn("test-flusher", Duration::from_millis(5), move || {
            worker_counter.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(30));
        thread.end();
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }
}
