//! Object store gateway.
//!
//! Abstraction over the remote hierarchical file store the library lives in.
//! The sorter and the sync service only ever talk to [`ObjectStore`], so
//! tests can swap the HTTP backend for the in-memory one.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;

/// Opaque remote object id.
pub type FileId = String;

/// MIME type the store uses to mark folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Whether an entry is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Folder,
}

/// One child entry as listed by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub id: FileId,
    pub name: String,
    pub kind: EntryKind,
    pub mime_type: String,
    pub view_link: Option<String>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Gateway to the remote hierarchical store.
///
/// Every call hits the backing store: no caching, no internal retry. A
/// transient failure surfaces as [`StoreError`] and the caller decides
/// what to do with the affected document.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List the direct children of a folder.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, StoreError>;

    /// Return the id of the named child folder, creating it if absent.
    ///
    /// Idempotent: looks the name up first and only creates on a miss, so
    /// repeated filing runs reuse the same folder chain.
    async fn create_folder_if_absent(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<FileId, StoreError>;

    /// Re-parent a file to a different folder.
    async fn move_file(&self, id: &str, new_parent_id: &str) -> Result<(), StoreError>;

    /// Change a file's display name.
    async fn rename_file(&self, id: &str, new_name: &str) -> Result<(), StoreError>;

    /// Download a file's content.
    async fn download(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    /// Upload new content as a child of the given folder.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        parent_id: &str,
    ) -> Result<RemoteEntry, StoreError>;

    /// Overwrite an existing file's content in place, keeping its id.
    async fn update_content(&self, id: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
}
