/// Cooperative cancellation for one queued action.
///
/// The dispatcher raises the signal when a newer hotkey preempts; the running
/// sequence checks it at every suspension point. The drain worker marks it
/// finished when the action returns (however it returns), which is what the
/// preempting hotkey waits on.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    raised:   AtomicBool,
    finished: Mutex<bool>,
    done:     Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    pub fn mark_finished(&self) {
        let mut finished = self.inner.finished.lock().unwrap_or_else(PoisonError::into_inner);
        *finished = true;
        self.inner.done.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        *self.inner.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until finished or `timeout` elapses. Returns true if finished.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let finished = self.inner.finished.lock().unwrap_or_else(PoisonError::into_inner);
        let (finished, _) = self
            .inner
            .done
            .wait_timeout_while(finished, timeout, |f| !*f)
            .unwrap_or_else(PoisonError::into_inner);
        *finished
    }
}
