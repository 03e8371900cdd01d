//! Single-flight drain runner for pumped events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;

use fieldsync_core::LoggedError;

pub type DrainFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type DrainFn = Arc<dyn Fn() -> DrainFuture + Send + Sync>;

#[derive(Default)]
struct PumpState {
    running: bool,
    rerun: bool,
}

/// Runs the drain function with at most one drain in flight.
///
/// `start` during an active drain records a rerun request instead of spawning
/// a second drain, so an event enqueued in the window between the drain's
/// final empty-check and its exit is never stranded.
pub struct Pump {
    state: Arc<Mutex<PumpState>>,
    drain: DrainFn,
}

impl Pump {
    pub fn new(drain: impl Fn() -> DrainFuture + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(PumpState::default())),
            drain: Arc::new(drain),
        }
    }

    /// Begins an asynchronous drain, or schedules a rerun if one is active.
    pub async fn start(&self) {
        {
            let mut state = self.state.lock().await;
            if state.running {
                state.rerun = true;
                return;
            }
            state.running = true;
        }

        let state = Arc::clone(&self.state);
        let drain = Arc::clone(&self.drain);
        tokio::spawn(async move {
            loop {
                if let Err(err) = drain().await {
                    // Errors that already carry the logged marker were
                    // reported at the failure site.
                    if err.downcast_ref::<LoggedError>().is_none() {
                        tracing::error!(error = %err, "Event drain failed");
                    }
                }
                let mut state = state.lock().await;
                if state.rerun {
                    state.rerun = false;
                    continue;
                }
                state.running = false;
                break;
            }
        });
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }
}
