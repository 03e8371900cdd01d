//! Configuration module
//!
//! Environment-driven configuration for the upload pipeline: remote
//! collection names, retry cadence, and preview-frame sampling.

use std::env;
use std::time::Duration;

const DEFAULT_PHOTO_COLLECTION: &str = "photos";
const DEFAULT_SURVEY_COLLECTION: &str = "surveys";
const DEFAULT_RETRY_DELAY_MS: u64 = 60_000;
const DEFAULT_PREVIEW_SAMPLE_RATE: u32 = 1;

#[derive(Clone, Debug)]
pub struct Config {
    /// Remote collection receiving photo documents.
    pub photo_collection: String,
    /// Remote collection receiving survey documents.
    pub survey_collection: String,
    /// Fixed delay between retry cycles while uploads keep failing.
    pub retry_delay_ms: u64,
    /// Stage every Nth preview frame; 0 disables preview staging entirely.
    pub preview_sample_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            photo_collection: DEFAULT_PHOTO_COLLECTION.to_string(),
            survey_collection: DEFAULT_SURVEY_COLLECTION.to_string(),
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            preview_sample_rate: DEFAULT_PREVIEW_SAMPLE_RATE,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let config = Config {
            photo_collection: env::var("FIELDSYNC_PHOTO_COLLECTION")
                .unwrap_or_else(|_| DEFAULT_PHOTO_COLLECTION.to_string()),
            survey_collection: env::var("FIELDSYNC_SURVEY_COLLECTION")
                .unwrap_or_else(|_| DEFAULT_SURVEY_COLLECTION.to_string()),
            retry_delay_ms: env::var("FIELDSYNC_RETRY_DELAY_MS")
                .unwrap_or_else(|_| DEFAULT_RETRY_DELAY_MS.to_string())
                .parse()
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            preview_sample_rate: env::var("FIELDSYNC_PREVIEW_SAMPLE_RATE")
                .unwrap_or_else(|_| DEFAULT_PREVIEW_SAMPLE_RATE.to_string())
                .parse()
                .unwrap_or(DEFAULT_PREVIEW_SAMPLE_RATE),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.photo_collection.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "FIELDSYNC_PHOTO_COLLECTION cannot be empty"
            ));
        }
        if self.survey_collection.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "FIELDSYNC_SURVEY_COLLECTION cannot be empty"
            ));
        }
        if self.retry_delay_ms == 0 {
            return Err(anyhow::anyhow!(
                "FIELDSYNC_RETRY_DELAY_MS must be greater than zero"
            ));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
