//! Process-wide interrupt state shared between the CLI and the pipelines.
//!
//! The first interrupt requests a clean stop: pipelines notice the flag at
//! their chunk-loop boundary and report a paused, resumable outcome. A second
//! interrupt is the cmd layer's cue to exit immediately; correctness is
//! preserved because the manifest / restore state were not yet advanced for
//! the chunk in flight.

use postgres::{CancelToken, NoTls};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<State>,
}

#[derive(Default)]
struct State {
    requested: AtomicBool,
    count: AtomicU32,
    cancel: Mutex<Option<CancelToken>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an interrupt request. Returns how many times it has been
    /// requested since the last reset (1 = clean stop, 2+ = force).
    ///
    /// The first request also fires the armed driver-level cancel so a
    /// blocking `COPY` returns instead of running to completion.
    pub fn request(&self) -> u32 {
        self.inner.requested.store(true, Ordering::SeqCst);
        let n = self.inner.count.fetch_add(1, Ordering::SeqCst) + 1;
        if n == 1 {
            self.fire_cancel();
        }
        n
    }

    /// Has an interrupt been requested since the last reset?
    pub fn observed(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Clear the interrupt state at the start of a new run.
    pub fn reset(&self) {
        self.inner.requested.store(false, Ordering::SeqCst);
        self.inner.count.store(0, Ordering::SeqCst);
        if let Ok(mut guard) = self.inner.cancel.lock() {
            *guard = None;
        }
    }

    /// Register the cancel token of a long-lived connection so that a later
    /// `request()` can abort its in-flight query.
    pub fn arm(&self, token: CancelToken) {
        if let Ok(mut guard) = self.inner.cancel.lock() {
            *guard = Some(token);
        }
    }

    /// Drop the armed cancel token once its connection is done.
    pub fn disarm(&self) {
        if let Ok(mut guard) = self.inner.cancel.lock() {
            *guard = None;
        }
    }

    fn fire_cancel(&self) {
        let token = match self.inner.cancel.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        if let Some(token) = token {
            // Cancellation goes over a separate connection; do it off-thread
            // so a signal handler never blocks on the network.
            std::thread::spawn(move || {
                let _ = token.cancel_query(NoTls);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_observed_reset() {
        let intr = Interrupt::new();
        assert!(!intr.observed());

        assert_eq!(intr.request(), 1);
        assert!(intr.observed());
        assert_eq!(intr.request(), 2);
        assert!(intr.observed());

        intr.reset();
        assert!(!intr.observed());
        assert_eq!(intr.request(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let intr = Interrupt::new();
        let other = intr.clone();
        other.request();
        assert!(intr.observed());
    }
}
