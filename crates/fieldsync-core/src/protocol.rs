//! Wire protocol documents and transport framing.
//!
//! Every outbound document is an envelope (`schemaId`, `docId`, device
//! metadata, a document-type discriminator, and the domain payload) framed
//! with transport metadata before the upsert. Field names follow the wire
//! format, so serialization uses camelCase throughout.
//!
//! Compatibility note: these shapes are shared with the receiving side. To
//! change them after real data exists, either add a new optional field or
//! bump `SCHEMA_ID` and version the containing types.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const SCHEMA_ID: i32 = 1;
pub const PROTOCOL_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "SURVEY")]
    Survey,
    #[serde(rename = "PHOTO")]
    Photo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    pub hostname: String,
}

/// Device identity stamped on every outbound document.
///
/// The installation id is generated once per [`DeviceInfo::detect`] call;
/// construct one instance at process start and share it (no module-level
/// singletons).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub installation: String,
    pub client_version: String,
    pub client_build: u32,
    pub platform: PlatformInfo,
}

impl DeviceInfo {
    pub fn detect() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            installation: Uuid::new_v4().to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            client_build: option_env!("FIELDSYNC_CLIENT_BUILD")
                .and_then(|b| b.parse().ok())
                .unwrap_or(0),
            platform: PlatformInfo {
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
                hostname: host,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoInfo {
    pub timestamp: String,
    pub photo_id: String,
}

/// A survey lifecycle event (screen transition, result shown, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    pub kind: String,
    pub at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdtInfo {
    pub result_shown: bool,
    pub interpretation_shown: bool,
}

/// Non-PII survey payload synced on relevant state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SurveyInfo {
    pub events: Vec<EventInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kit_barcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdt_info: Option<RdtInfo>,
}

/// The protocol envelope written to the remote collection, keyed by `doc_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDocument {
    pub schema_id: i32,
    pub doc_id: String,
    pub device: DeviceInfo,
    pub document_type: DocumentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survey: Option<SurveyInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoInfo>,
}

impl ProtocolDocument {
    pub fn survey(doc_id: impl Into<String>, device: DeviceInfo, survey: SurveyInfo) -> Self {
        Self {
            schema_id: SCHEMA_ID,
            doc_id: doc_id.into(),
            device,
            document_type: DocumentType::Survey,
            survey: Some(survey),
            photo: None,
        }
    }

    pub fn photo(doc_id: impl Into<String>, device: DeviceInfo, photo: PhotoInfo) -> Self {
        Self {
            schema_id: SCHEMA_ID,
            doc_id: doc_id.into(),
            device,
            document_type: DocumentType::Photo,
            survey: None,
            photo: Some(photo),
        }
    }
}

/// Transport metadata attached to every framed document. Computed fresh on
/// each sync attempt so resubmission after a local mutation always carries
/// the current hash and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportMetadata {
    pub sent_at: String,
    pub content_hash: String,
    pub last_writer: String,
    pub protocol_version: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramedDocument {
    #[serde(flatten)]
    pub document: ProtocolDocument,
    #[serde(rename = "_transport")]
    pub transport: TransportMetadata,
}

/// Hex-encoded SHA-256 of the document's canonical JSON serialization.
/// Canonical means the struct field order above; both sides must agree.
pub fn content_hash(document: &ProtocolDocument) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(document)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Wraps a document with transport metadata for the upsert.
pub fn frame(document: ProtocolDocument) -> Result<FramedDocument, serde_json::Error> {
    let content_hash = content_hash(&document)?;
    Ok(FramedDocument {
        transport: TransportMetadata {
            sent_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            content_hash,
            last_writer: "sender".to_string(),
            protocol_version: PROTOCOL_VERSION,
        },
        document,
    })
}
