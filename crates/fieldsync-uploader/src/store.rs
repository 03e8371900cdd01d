//! State-change actions and the dispatch bridge.
//!
//! Callers describe what happened as an [`Action`]; the store reduces it into
//! the survey state, routes capture actions to the [`PhotoUploader`], and
//! re-syncs the survey document whenever a change touches synced fields. The
//! match on actions is exhaustive, so adding a variant forces a decision here.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::sync::Mutex;

use fieldsync_core::{EventInfo, RdtInfo, SurveyInfo, UploadError};

use crate::sync::SyncClient;
use crate::uploader::PhotoUploader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Assigns the remote document id. Until this arrives, survey changes
    /// accumulate locally and nothing is synced.
    SetDocumentId { doc_id: String },
    /// Appends a lifecycle event (screen transition, consent, ...).
    AppendEvent { kind: String, ref_id: Option<String> },
    SetKitBarcode { barcode: String },
    SetRdtShown {
        result_shown: bool,
        interpretation_shown: bool,
    },
    /// A full-resolution capture: staged for upload and recorded as an event.
    PhotoCaptured { photo_id: String, filepath: PathBuf },
    /// A preview frame: sampled by the uploader, never an event.
    PreviewFrame {
        photo_id: String,
        filepath: PathBuf,
        frame_index: u32,
    },
    /// Drops all local survey state, e.g. when a participant starts over.
    ClearState,
}

#[derive(Debug, Clone, Default)]
pub struct SurveyState {
    pub doc_id: Option<String>,
    pub survey: SurveyInfo,
}

/// Owns the survey state and applies actions to it. No global state: each
/// store instance carries its own, and everything it needs is injected.
pub struct SurveyStore {
    state: Mutex<SurveyState>,
    uploader: Arc<PhotoUploader>,
    sync: Arc<SyncClient>,
}

impl SurveyStore {
    pub fn new(uploader: Arc<PhotoUploader>, sync: Arc<SyncClient>) -> Self {
        Self {
            state: Mutex::new(SurveyState::default()),
            uploader,
            sync,
        }
    }

    /// Applies `action` to the state, then performs its side effects.
    pub async fn dispatch(&self, action: Action) -> Result<(), UploadError> {
        match action {
            Action::SetDocumentId { doc_id } => {
                let snapshot = {
                    let mut state = self.state.lock().await;
                    state.doc_id = Some(doc_id);
                    state.clone()
                };
                self.sync_if_identified(snapshot).await;
            }
            Action::AppendEvent { kind, ref_id } => {
                let snapshot = {
                    let mut state = self.state.lock().await;
                    state.survey.events.push(EventInfo {
                        kind,
                        at: now(),
                        ref_id,
                    });
                    state.clone()
                };
                self.sync_if_identified(snapshot).await;
            }
            Action::SetKitBarcode { barcode } => {
                let snapshot = {
                    let mut state = self.state.lock().await;
                    state.survey.kit_barcode = Some(barcode);
                    state.clone()
                };
                self.sync_if_identified(snapshot).await;
            }
            Action::SetRdtShown {
                result_shown,
                interpretation_shown,
            } => {
                let snapshot = {
                    let mut state = self.state.lock().await;
                    state.survey.rdt_info = Some(RdtInfo {
                        result_shown,
                        interpretation_shown,
                    });
                    state.clone()
                };
                self.sync_if_identified(snapshot).await;
            }
            Action::PhotoCaptured { photo_id, filepath } => {
                self.uploader
                    .enqueue_file_contents(&photo_id, filepath)
                    .await?;
                let snapshot = {
                    let mut state = self.state.lock().await;
                    state.survey.events.push(EventInfo {
                        kind: "photo".to_string(),
                        at: now(),
                        ref_id: Some(photo_id),
                    });
                    state.clone()
                };
                self.sync_if_identified(snapshot).await;
            }
            Action::PreviewFrame {
                photo_id,
                filepath,
                frame_index,
            } => {
                self.uploader
                    .enqueue_preview_contents(&photo_id, filepath, frame_index)
                    .await?;
            }
            Action::ClearState => {
                *self.state.lock().await = SurveyState::default();
            }
        }
        Ok(())
    }

    pub async fn state(&self) -> SurveyState {
        self.state.lock().await.clone()
    }

    async fn sync_if_identified(&self, snapshot: SurveyState) {
        match snapshot.doc_id {
            Some(doc_id) => self.sync.sync_survey(&doc_id, snapshot.survey).await,
            None => {
                tracing::debug!("No document id yet, survey change kept local")
            }
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
