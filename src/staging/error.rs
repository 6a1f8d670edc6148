//! Staging Error Types
//!
//! The taxonomy separates what is fatal at startup (configuration), what is
//! surfaced to the caller and recorded on the transfer (preparation) and
//! what stays internal to the retrying executor (mover errors, defined next
//! to the executor).

use thiserror::Error;

use super::store::StoreError;

#[derive(Error, Debug)]
pub enum StagingError {
    /// Bad or missing access point settings. Fatal at startup, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An access point pre-flight check rejected its configuration.
    #[error("invalid access point property: {0}")]
    PropertyValidation(String),

    /// Any failure inside the transfer preparation pipeline. Recorded on the
    /// transfer record before it propagates.
    #[error("transfer preparation failed: {0}")]
    Preparation(String),

    /// A URL handed to an access point that is not below its remote base.
    #[error("URL '{url}' is not below base '{base}'")]
    ForeignUrl { url: String, base: String },

    /// A checkpoint file exists but cannot be trusted for resume.
    #[error("checkpoint integrity error: {0}")]
    Checkpoint(String),

    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
