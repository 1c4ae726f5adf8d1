//! FIFO wait queue keyed by a condition (spec.md §4.9, C9).
//!
//! Each blocked caller gets its own `Condvar`, tracked by a shared queue so
//! `release_one_by_type` can wake the oldest waiter compatible with a
//! lock-type hint without waking everyone.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// Distinguishes read- from write-waiters so a write-lock release can pick
/// fairly between them (spec.md §4.7 locking discipline).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterKind {
    Read,
    Write,
    Generic,
}

struct Waiter {
    kind: WaiterKind,
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl Waiter {
    fn new(kind: WaiterKind) -> Self {
        Self { kind, signaled: Mutex::new(false), condvar: Condvar::new() }
    }

    fn signal(&self) {
        let mut guard = self.signaled.lock().unwrap_or_else(|e| e.into_inner());
        *guard = true;
        self.condvar.notify_one();
    }
}

/// A handle returned by `add`; block on it with `wait()` after dropping
/// whatever coarse lock (e.g. the page cache's `cache_lock`) guards the
/// condition being waited on.
pub struct Ticket(Arc<Waiter>);

impl Ticket {
    pub fn wait(&self) {
        let guard = self.0.signaled.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = self
            .0
            .condvar
            .wait_while(guard, |signaled| !*signaled)
            .unwrap_or_else(|e| e.into_inner());
    }
}

#[derive(Default)]
pub struct WaitQueue {
    waiters: Mutex<VecDeque<Arc<Waiter>>>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register this caller as waiting; call `.wait()` on the returned
    /// ticket only after releasing the lock that guards the condition.
    pub fn add(&self, kind: WaiterKind) -> Ticket {
        let waiter = Arc::new(Waiter::new(kind));
        self.waiters.lock().unwrap_or_else(|e| e.into_inner()).push_back(waiter.clone());
        Ticket(waiter)
    }

    /// Remove a registered-but-not-yet-waiting ticket (e.g. the waiter gave
    /// up before reacquiring the lock to call `wait()`).
    pub fn remove(&self, ticket: &Ticket) {
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|w| !Arc::ptr_eq(w, &ticket.0));
    }

    pub fn release_all(&self) {
        let mut queue = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
        for waiter in queue.drain(..) {
            waiter.signal();
        }
    }

    /// Wake the oldest waiter whose kind matches `hint`, falling back to
    /// the oldest waiter of any kind. Returns whether anyone was woken.
    pub fn release_one_by_type(&self, hint: WaiterKind) -> bool {
        let mut queue = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
        let position = queue.iter().position(|w| w.kind == hint).or_else(|| queue.front().map(|_| 0));
        let Some(position) = position else { return false };
        let waiter = queue.remove(position).expect("position came from this queue");
        drop(queue);
        waiter.signal();
        true
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn release_all_wakes_every_waiter() {
        let queue = Arc::new(WaitQueue::new());
        let done = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let queue = queue.clone();
            let done = done.clone();
            handles.push(thread::spawn(move || {
                let ticket = queue.add(WaiterKind::Generic);
                ticket.wait();
                done.store(true, Ordering::SeqCst);
            }));
        }

        thread::sleep(Duration::from_millis(20));
        queue.release_all();
        for h in handles {
            h.join().unwrap();
        }
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn release_one_by_type_prefers_matching_kind() {
        let queue = WaitQueue::new();
        let _read_ticket = queue.add(WaiterKind::Read);
        let write_ticket = queue.add(WaiterKind::Write);

        assert!(queue.release_one_by_type(WaiterKind::Write));
        write_ticket.wait();
    }
}
