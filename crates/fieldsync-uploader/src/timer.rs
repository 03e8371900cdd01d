//! Single-shot retry timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

type Callback = Arc<dyn Fn() + Send + Sync>;

struct TimerInner {
    delay: Duration,
    callback: Callback,
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// Fires its callback once, `delay` after [`RetryTimer::start`].
///
/// `start` while a fire is pending is a no-op, so repeated failures retry on
/// a fixed cadence instead of pushing the deadline out. The pending handle is
/// cleared before the callback runs, so the callback may re-arm the timer.
pub struct RetryTimer {
    inner: Arc<TimerInner>,
}

impl RetryTimer {
    pub fn new(delay: Duration, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                delay,
                callback: Arc::new(callback),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Schedules the callback unless a fire is already pending.
    pub async fn start(&self) {
        let mut pending = self.inner.pending.lock().await;
        if pending.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            *inner.pending.lock().await = None;
            (inner.callback)();
        }));
    }

    /// Clears any pending fire. Safe to call when nothing is pending.
    pub async fn cancel(&self) {
        if let Some(handle) = self.inner.pending.lock().await.take() {
            handle.abort();
        }
    }
}
