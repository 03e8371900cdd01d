//! Connectivity signals.
//!
//! The uploader subscribes once at construction and also polls the live
//! state before each upload attempt. Production implementations adapt the
//! platform network monitor; tests drive a [`WatchConnectivity`] by hand.

use async_trait::async_trait;
use tokio::sync::watch;

#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Current connectivity state.
    async fn fetch(&self) -> bool;

    /// Stream of connectivity transitions. The receiver holds the current
    /// value and is notified on every change.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Watch-channel backed connectivity source. Doubles as the always-connected
/// default (`WatchConnectivity::new(true)`) and as a manually driven fake.
pub struct WatchConnectivity {
    state: watch::Sender<bool>,
}

impl WatchConnectivity {
    pub fn new(connected: bool) -> Self {
        Self {
            state: watch::Sender::new(connected),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.send_replace(connected);
    }
}

#[async_trait]
impl Connectivity for WatchConnectivity {
    async fn fetch(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
