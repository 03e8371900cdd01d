//! Offline-tolerant upload queue and sync coordinator.
//!
//! The [`PhotoUploader`] durably enqueues capture events, retries uploads
//! across connectivity changes and process restarts, and exposes idle and
//! pending-state introspection so callers can gate on in-flight work (for
//! example, blocking survey completion until photos finish syncing).
//!
//! Supporting pieces: [`IdleManager`] for blocking-wait semantics,
//! [`RetryTimer`] for the fixed retry cadence, [`Pump`] for the single-flight
//! event drain, [`SyncClient`] for document framing and best-effort upserts,
//! and [`SurveyStore`] bridging state-change actions to survey syncs.

pub mod connectivity;
pub mod idle;
pub mod pump;
pub mod store;
pub mod sync;
pub mod timer;
pub mod uploader;

pub use connectivity::{Connectivity, WatchConnectivity};
pub use idle::IdleManager;
pub use pump::Pump;
pub use store::{Action, SurveyState, SurveyStore};
pub use sync::SyncClient;
pub use timer::RetryTimer;
pub use uploader::{PhotoUploader, YieldFn, YieldFuture};
