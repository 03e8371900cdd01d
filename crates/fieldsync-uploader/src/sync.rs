//! Document framing and best-effort sync to the remote collections.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use fieldsync_core::{frame, Config, DeviceInfo, PhotoInfo, ProtocolDocument, SurveyInfo};
use fieldsync_storage::RemoteStore;

/// Builds protocol envelopes and upserts them into the configured
/// collections. Every call frames the document fresh, so a retry after a
/// local mutation carries the current content hash and timestamp.
///
/// Sync failures are logged with identifying context and swallowed: callers
/// (the uploader's drain loop, the dispatch bridge) must not crash on a flaky
/// network, and recovery comes from the retry timer or the next state change.
pub struct SyncClient {
    store: Arc<dyn RemoteStore>,
    device: DeviceInfo,
    photo_collection: String,
    survey_collection: String,
}

impl SyncClient {
    pub fn new(config: &Config, device: DeviceInfo, store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            device,
            photo_collection: config.photo_collection.clone(),
            survey_collection: config.survey_collection.clone(),
        }
    }

    /// Best-effort upsert of the survey document keyed by `doc_id`.
    pub async fn sync_survey(&self, doc_id: &str, survey: SurveyInfo) {
        let document = ProtocolDocument::survey(doc_id, self.device.clone(), survey);
        self.sync_document(&self.survey_collection, doc_id, document)
            .await;
    }

    /// Best-effort upsert of the photo marker document keyed by `photo_id`.
    pub async fn sync_photo(&self, photo_id: &str) {
        let photo = PhotoInfo {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            photo_id: photo_id.to_string(),
        };
        let document = ProtocolDocument::photo(photo_id, self.device.clone(), photo);
        self.sync_document(&self.photo_collection, photo_id, document)
            .await;
    }

    async fn sync_document(&self, collection: &str, doc_id: &str, document: ProtocolDocument) {
        let result = async {
            let framed = frame(document)?;
            let value = serde_json::to_value(&framed)?;
            self.store.set(collection, doc_id, value).await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(collection = %collection, doc_id = %doc_id, "Synced document")
            }
            Err(err) => tracing::warn!(
                collection = %collection,
                doc_id = %doc_id,
                error = %err,
                "Document sync failed, will retry later"
            ),
        }
    }
}
