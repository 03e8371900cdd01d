//! The upload orchestrator.
//!
//! Capture events are staged durably, then drained one at a time through the
//! event pump. Failed uploads are tracked per cycle so one bad item cannot
//! block the rest, and retries come from three triggers: the fixed-cadence
//! retry timer, a connectivity-regained signal, and every new enqueue.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;

use fieldsync_core::{log_if_error, Config, LoggedError, UploadError};
use fieldsync_storage::{StagingQueue, StagingResult};

use crate::connectivity::Connectivity;
use crate::idle::IdleManager;
use crate::pump::{DrainFuture, Pump};
use crate::sync::SyncClient;
use crate::timer::RetryTimer;

pub type YieldFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Cooperative yield invoked before each pumped event, so long drains
/// interleave with other work. Tests may substitute their own.
pub type YieldFn = Arc<dyn Fn() -> YieldFuture + Send + Sync>;

#[derive(Debug)]
enum Event {
    EnqueueFileContents {
        photo_id: String,
        filepath: PathBuf,
        remove_original: bool,
    },
    UploadNext,
}

/// Orchestrates staging and upload of captured photos.
///
/// Construct inside a tokio runtime: the uploader spawns its connectivity
/// listener and an initial upload pass for items staged in a prior process
/// lifetime. State per item: pending until `upload` succeeds, marked failed
/// for the rest of the cycle on error, retried in the next cycle.
pub struct PhotoUploader {
    inner: Arc<Inner>,
}

struct Inner {
    queue: Arc<dyn StagingQueue>,
    network: Arc<dyn Connectivity>,
    sync: Arc<SyncClient>,
    idle: IdleManager,
    timer: RetryTimer,
    pump: Pump,
    pending_events: Mutex<Vec<Event>>,
    failed_files: Mutex<HashSet<String>>,
    preview_sample_rate: u32,
    idleness: YieldFn,
}

impl PhotoUploader {
    pub fn new(
        config: &Config,
        queue: Arc<dyn StagingQueue>,
        network: Arc<dyn Connectivity>,
        sync: Arc<SyncClient>,
    ) -> Self {
        Self::with_yield(
            config,
            queue,
            network,
            sync,
            Arc::new(|| Box::pin(tokio::task::yield_now()) as YieldFuture),
        )
    }

    /// Like [`PhotoUploader::new`] with an injected yield function, so tests
    /// can run the drain deterministically or hold it open.
    pub fn with_yield(
        config: &Config,
        queue: Arc<dyn StagingQueue>,
        network: Arc<dyn Connectivity>,
        sync: Arc<SyncClient>,
        idleness: YieldFn,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let timer_ref = weak.clone();
            let pump_ref = weak.clone();
            Inner {
                queue,
                network: Arc::clone(&network),
                sync,
                idle: IdleManager::new(false),
                timer: RetryTimer::new(config.retry_delay(), move || {
                    if let Some(inner) = timer_ref.upgrade() {
                        tokio::spawn(async move { inner.upload_next().await });
                    }
                }),
                pump: Pump::new(move || {
                    let pump_ref = pump_ref.clone();
                    Box::pin(async move {
                        match pump_ref.upgrade() {
                            Some(inner) => inner.pump_events().await,
                            None => Ok(()),
                        }
                    }) as DrainFuture
                }),
                pending_events: Mutex::new(Vec::new()),
                failed_files: Mutex::new(HashSet::new()),
                preview_sample_rate: config.preview_sample_rate,
                idleness,
            }
        });

        // Items staged in a prior process lifetime are retried at startup.
        let startup = Arc::downgrade(&inner);
        tokio::spawn(async move {
            if let Some(inner) = startup.upgrade() {
                inner.upload_next().await;
            }
        });

        // A connectivity-regained signal bypasses the retry timer's delay.
        let listener = Arc::downgrade(&inner);
        let mut connectivity = network.subscribe();
        tokio::spawn(async move {
            while connectivity.changed().await.is_ok() {
                let connected = *connectivity.borrow_and_update();
                let Some(inner) = listener.upgrade() else {
                    break;
                };
                tracing::debug!(connected = connected, "Connectivity changed");
                if connected {
                    inner.upload_next().await;
                }
            }
        });

        Self { inner }
    }

    /// Stages the file at `filepath` under `photo_id` and kicks the upload
    /// loop. The source file is left in place.
    pub async fn enqueue_file_contents(
        &self,
        photo_id: &str,
        filepath: impl Into<PathBuf>,
    ) -> Result<(), UploadError> {
        let filepath = filepath.into();
        validate_args("enqueue_file_contents", photo_id, &filepath)?;
        self.inner
            .fire_event(Event::EnqueueFileContents {
                photo_id: photo_id.to_string(),
                filepath,
                remove_original: false,
            })
            .await;
        Ok(())
    }

    /// Stages every Nth preview frame (per the configured sample rate) and
    /// discards the rest immediately. Preview capture produces far more
    /// frames than diagnostics need; sampling bounds storage and bandwidth.
    pub async fn enqueue_preview_contents(
        &self,
        photo_id: &str,
        filepath: impl Into<PathBuf>,
        frame_index: u32,
    ) -> Result<(), UploadError> {
        let filepath = filepath.into();
        let sample_rate = self.inner.preview_sample_rate;
        if sample_rate > 0 && frame_index % sample_rate == 0 {
            validate_args("enqueue_preview_contents", photo_id, &filepath)?;
            self.inner
                .fire_event(Event::EnqueueFileContents {
                    photo_id: photo_id.to_string(),
                    filepath,
                    remove_original: true,
                })
                .await;
        } else if let Err(err) = self.inner.queue.delete_file(&filepath).await {
            tracing::warn!(
                path = %filepath.display(),
                error = %err,
                "Failed to discard off-sample preview frame"
            );
        }
        Ok(())
    }

    /// Resolves once no enqueue or upload events are pending and the pump has
    /// fully drained.
    pub async fn wait_for_idle(&self, wait: Option<Duration>) -> Result<(), UploadError> {
        self.inner.idle.wait_for_idle(wait).await
    }

    /// True iff the staging area still holds items awaiting upload.
    pub async fn has_pending_photos(&self) -> StagingResult<bool> {
        Ok(!self.inner.queue.list().await?.is_empty())
    }
}

impl Inner {
    async fn upload_next(&self) {
        self.fire_event(Event::UploadNext).await;
    }

    async fn fire_event(&self, event: Event) {
        {
            // The busy transition shares the queue lock with the drain's
            // empty-check, so a waiter is never released with work pending.
            let mut pending = self.pending_events.lock().await;
            self.idle.set_busy();
            pending.push(event);
        }
        self.pump.start().await;
    }

    async fn pump_events(&self) -> anyhow::Result<()> {
        loop {
            let batch = {
                let mut pending = self.pending_events.lock().await;
                if pending.is_empty() {
                    self.idle.set_idle();
                    return Ok(());
                }
                std::mem::take(&mut *pending)
            };
            tracing::debug!(events = batch.len(), "Processing event batch");
            for event in batch {
                (self.idleness)().await;
                if let Err(err) = self.handle_event(event).await {
                    // Transient failures carry the logged marker and were
                    // reported at the failure site; skip to the next event so
                    // one bad event cannot strand the rest of the batch.
                    if err.downcast_ref::<LoggedError>().is_some() {
                        continue;
                    }
                    // Unexpected errors abort the remainder of this batch;
                    // completed events stay completed and later fires
                    // restart the pump.
                    return Err(LoggedError::log("PhotoUploader.pump_events", err).into());
                }
            }
        }
    }

    async fn handle_event(&self, event: Event) -> anyhow::Result<()> {
        match event {
            Event::EnqueueFileContents {
                photo_id,
                filepath,
                remove_original,
            } => self.handle_enqueue(photo_id, filepath, remove_original).await,
            Event::UploadNext => self.handle_upload_next().await,
        }
    }

    async fn handle_enqueue(
        &self,
        photo_id: String,
        filepath: PathBuf,
        remove_original: bool,
    ) -> anyhow::Result<()> {
        log_if_error("PhotoUploader.handle_enqueue:queue.add", async {
            self.queue
                .add(&photo_id, &filepath, remove_original)
                .await
                .map_err(anyhow::Error::from)
        })
        .await?;
        (self.idleness)().await;

        // Attempt the freshly staged item right away.
        self.upload_next().await;
        Ok(())
    }

    async fn handle_upload_next(&self) -> anyhow::Result<()> {
        // Keep retrying on a fixed cadence until the pending set drains.
        self.timer.start().await;

        let pending = log_if_error("PhotoUploader.handle_upload_next:queue.list", async {
            self.queue.list().await.map_err(anyhow::Error::from)
        })
        .await?;
        (self.idleness)().await;

        if pending.is_empty() {
            tracing::debug!("No pending photos, resetting to dormant");
            self.failed_files.lock().await.clear();
            self.timer.cancel().await;
            return Ok(());
        }

        if !self.network.fetch().await {
            tracing::debug!("Offline, deferring uploads until connectivity returns");
            return Ok(());
        }

        let photo_id = {
            let mut failed = self.failed_files.lock().await;
            match pending.iter().find(|id| !failed.contains(*id)) {
                Some(id) => id.clone(),
                None => {
                    // Every pending item failed this cycle. Reset so the next
                    // timer fire or connectivity signal retries each of them,
                    // rather than looping over an exhausted set.
                    tracing::debug!(
                        pending = pending.len(),
                        "All pending photos failed this cycle, resetting failure set"
                    );
                    failed.clear();
                    return Ok(());
                }
            }
        };

        // One item's failure must not block the others.
        let uploaded = log_if_error("PhotoUploader.handle_upload_next:queue.upload", async {
            self.queue
                .upload(&photo_id)
                .await
                .map_err(anyhow::Error::from)
        })
        .await;
        if uploaded.is_err() {
            self.failed_files.lock().await.insert(photo_id.clone());
        }
        (self.idleness)().await;

        // Best effort regardless of upload outcome; sync failures are
        // recovered by the retry machinery.
        self.sync.sync_photo(&photo_id).await;
        (self.idleness)().await;

        // Continue draining the rest of the pending set.
        self.upload_next().await;
        Ok(())
    }
}

fn validate_args(func: &str, photo_id: &str, filepath: &Path) -> Result<(), UploadError> {
    if photo_id.is_empty() || filepath.as_os_str().is_empty() {
        let summary = format!(
            "{func} photo_id='{photo_id}' path='{}'",
            filepath.display()
        );
        tracing::error!(summary = %summary, "Invalid enqueue arguments");
        return Err(UploadError::InvalidArgument(summary));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_arguments_are_programmer_errors() {
        assert!(matches!(
            validate_args("enqueue_file_contents", "", Path::new("/tmp/p1.jpg")),
            Err(UploadError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate_args("enqueue_file_contents", "p1", Path::new("")),
            Err(UploadError::InvalidArgument(_))
        ));
        validate_args("enqueue_file_contents", "p1", Path::new("/tmp/p1.jpg")).unwrap();
    }
}
