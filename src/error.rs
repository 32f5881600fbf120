//! Error types for the library pipeline.
//!
//! Each service owns an error enum so callers can tell failure domains
//! apart. Per-document failures are caught by the sorter and recorded in
//! the run summary; only run-level failures propagate out of a run.

use thiserror::Error;

/// Failures talking to the remote object store.
///
/// Store calls are never retried internally; a transient failure surfaces
/// here and the caller decides whether to re-run.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure (connection, TLS, timeout).
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("unexpected store response: {0}")]
    Decode(String),

    /// The referenced object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),
}

/// Failures from the external classification service.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Transport-level failure (connection, TLS, timeout).
    #[error("classifier request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("classifier API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Model discovery found nothing that supports generation.
    #[error("no usable model advertised by the provider")]
    NoUsableModel,

    /// The response held no parsable JSON payload.
    #[error("unparsable classifier response: {0}")]
    Parse(String),
}

/// Sorter failures. Per-document variants are caught inside the run loop
/// and route the document to the error folder; `MissingRoot` aborts the run.
#[derive(Debug, Error)]
pub enum SorterError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// Library root folder id is not configured.
    #[error("library root folder is not configured")]
    MissingRoot,

    /// A brand/model segment sanitized down to nothing.
    #[error("cannot derive a folder name from {0:?}")]
    EmptyFolderName(String),
}

/// Full-text extraction failures (download or parse).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("text extraction failed: {0}")]
    Parse(String),
}

/// Run-level index synchronization failures.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Library root folder id is not configured.
    #[error("library root folder is not configured")]
    MissingRoot,

    /// The canonical index object was not found under the library root.
    /// The local snapshot has already been written when this is raised.
    #[error("canonical index object {0:?} not found under the library root")]
    IndexObjectMissing(String),

    /// Local snapshot could not be written.
    #[error("failed to write local index snapshot: {0}")]
    Snapshot(#[from] std::io::Error),

    /// Index could not be serialized to JSON.
    #[error("failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Missing or invalid environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}
