//! Busy/idle tracking with blocking-wait semantics.

use std::time::Duration;

use tokio::sync::watch;

use fieldsync_core::UploadError;

/// Tracks whether the pipeline is busy and lets callers await the idle
/// transition. All concurrent waiters observe the same transition and are
/// released together.
pub struct IdleManager {
    state: watch::Sender<bool>,
}

impl IdleManager {
    pub fn new(idle: bool) -> Self {
        Self {
            state: watch::Sender::new(idle),
        }
    }

    pub fn is_idle(&self) -> bool {
        *self.state.borrow()
    }

    /// Marks the pipeline busy. Idempotent.
    pub fn set_busy(&self) {
        self.state.send_replace(false);
    }

    /// Marks the pipeline idle, releasing every registered waiter.
    pub fn set_idle(&self) {
        self.state.send_replace(true);
    }

    /// Resolves once the pipeline is idle, immediately if it already is.
    ///
    /// With a timeout, failure affects only the timed-out caller: busy/idle
    /// state and other waiters are untouched.
    pub async fn wait_for_idle(&self, wait: Option<Duration>) -> Result<(), UploadError> {
        let mut rx = self.state.subscribe();
        let idle = rx.wait_for(|idle| *idle);
        match wait {
            Some(duration) => match tokio::time::timeout(duration, idle).await {
                Ok(_) => Ok(()),
                Err(_) => Err(UploadError::IdleTimeout(duration)),
            },
            None => {
                // The sender lives in self, so this cannot fail while borrowed.
                let _ = idle.await;
                Ok(())
            }
        }
    }
}
