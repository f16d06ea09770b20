//! Error types for the winter peak engine.
//!
//! `ScheduleError` covers everything an accessor can report. Data-source
//! failures are carried as `SourceError` and folded into
//! `ScheduleError::DataUnavailable` at the controller boundary.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Errors surfaced by the schedule engine.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// A raw event record lacks a date or clock time, or they do not parse.
    #[error("Malformed event record: {reason}")]
    MalformedEventRecord { reason: String },

    /// A window whose end precedes its start.
    #[error("Invalid interval: end {end} is before start {start}")]
    InvalidInterval { start: String, end: String },

    /// The data source failed and no snapshot is available to serve.
    #[error("Winter credit data unavailable: {reason}")]
    DataUnavailable { reason: String },

    /// A required configuration option is absent.
    #[error("Missing required configuration key: {key}")]
    ConfigurationMissing { key: String },

    /// A configuration option is present but unusable.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfiguration { key: String, message: String },

    /// A local wall-clock time that does not exist in the configured zone.
    #[error("Local time {local} does not exist in the configured timezone")]
    NonexistentLocalTime { local: NaiveDateTime },

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

/// Errors reported by an [`EventSource`](crate::source::EventSource).
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// A telemetry sink refused a message.
#[derive(Error, Debug)]
#[error("Failed to publish '{topic}': {message}")]
pub struct PublishError {
    pub topic: String,
    pub message: String,
}

impl From<SourceError> for ScheduleError {
    fn from(err: SourceError) -> Self {
        ScheduleError::DataUnavailable {
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
