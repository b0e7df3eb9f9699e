//! Cooperative stop signal shared between the watcher and its owner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Once set, stays set. Cloning shares the same signal.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal and wakes every pending [`sleep`](Self::sleep).
    /// Safe to call more than once, from any thread.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless stopped first.
    ///
    /// Returns `true` if the signal was set before or during the sleep.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent stop() is not lost.
        notified.as_mut().enable();

        if self.is_stopped() {
            return true;
        }

        tokio::select! {
            _ = &mut notified => true,
            _ = tokio::time::sleep(duration) => self.is_stopped(),
        }
    }
}
