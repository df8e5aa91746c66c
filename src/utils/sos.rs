//! Process-wide stop signal
//!
//! Clonable cancellation token shared between the signal handler and the
//! main thread. Cancelling is idempotent, so repeated SIGINTs are absorbed
//! while the first one drives the teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug)]
pub struct SignalOfStop {
    // Shared state between clones
    shared: Arc<SharedState>,
}

#[derive(Debug)]
struct SharedState {
    closing: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl SignalOfStop {
    pub fn new() -> SignalOfStop {
        SignalOfStop {
            shared: Arc::new(SharedState {
                closing: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Flip the flag and wake every waiter. Later calls are no-ops.
    pub fn cancel(&self) {
        self.shared.closing.store(true, Ordering::Relaxed);

        // Lock briefly so a waiter between its check and its wait still
        // sees the notification
        let _guard = self.shared.mutex.lock().unwrap();
        self.shared.condvar.notify_all();
    }

    pub fn cancelled(&self) -> bool {
        self.shared.closing.load(Ordering::Relaxed)
    }

    /// Block the calling thread until `cancel` runs.
    pub fn wait_cancellation(&self) {
        let mut guard = self.shared.mutex.lock().unwrap();

        while !self.cancelled() {
            guard = self.shared.condvar.wait(guard).unwrap();
        }
    }
}

impl Clone for SignalOfStop {
    fn clone(&self) -> SignalOfStop {
        SignalOfStop {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let sos = SignalOfStop::new();
        let clone = sos.clone();

        assert!(!clone.cancelled());
        sos.cancel();
        assert!(clone.cancelled());

        // Idempotent
        sos.cancel();
        assert!(clone.cancelled());
    }

    #[test]
    fn test_wait_unblocks_on_cancel() {
        let sos = SignalOfStop::new();
        let waiter = sos.clone();

        let handle = thread::spawn(move || {
            waiter.wait_cancellation();
            true
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        sos.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_wait_returns_immediately_when_already_cancelled() {
        let sos = SignalOfStop::new();
        sos.cancel();
        sos.wait_cancellation();
    }
}
