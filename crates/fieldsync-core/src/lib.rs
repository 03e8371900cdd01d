//! Fieldsync Core Library
//!
//! This crate provides the protocol document models, envelope framing,
//! configuration, and error types shared across the fieldsync crates.

pub mod config;
pub mod error;
pub mod protocol;

// Re-export commonly used types
pub use config::Config;
pub use error::{log_if_error, LoggedError, UploadError};
pub use protocol::{
    content_hash, frame, DeviceInfo, DocumentType, EventInfo, FramedDocument, PhotoInfo,
    PlatformInfo, ProtocolDocument, RdtInfo, SurveyInfo, TransportMetadata, PROTOCOL_VERSION,
    SCHEMA_ID,
};
