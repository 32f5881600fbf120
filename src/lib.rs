//! docshelf — classification, dedup, filing and indexing for a remote
//! technical-manual library.
//!
//! The pipeline: the [`sorter`] walks untriaged documents in the remote
//! store, hashes them for duplicate detection, classifies them through an
//! external provider and files them under
//! `category/brand/model/documentType` (or a quarantine folder). The
//! [`sync`] service independently rebuilds a flat index from the folder
//! paths, and [`retrieval`] ranks index entries for free-text queries.
//!
//! Services take their collaborators through the [`store::ObjectStore`]
//! and [`classify::Classifier`] traits, so everything is testable against
//! the in-memory store and a scripted classifier.

pub mod classify;
pub mod config;
pub mod dedup;
pub mod diagnostics;
pub mod error;
pub mod retrieval;
pub mod sorter;
pub mod store;
pub mod sync;
mod text;

pub use classify::{Classification, Classifier, GeminiClassifier};
pub use config::LibraryConfig;
pub use error::{ClassifyError, ConfigError, SorterError, StoreError, SyncError};
pub use sorter::{CancelFlag, RunHooks, RunStatus, RunSummary, SorterService};
pub use store::{HttpObjectStore, MemoryObjectStore, ObjectStore};
pub use sync::{IndexEntry, SyncService};

use tracing_subscriber::EnvFilter;

/// Initialize logging and `.env` loading for binary callers.
///
/// Honors `RUST_LOG`; defaults to warnings everywhere and info for this
/// crate. Library embedders with their own subscriber should skip this.
pub fn init_telemetry() {
    // Missing .env is fine; exported variables still apply
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,docshelf=info")),
        )
        .init();
}
