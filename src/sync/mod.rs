//! Library index synchronization.
//!
//! Walks the whole library tree, derives per-file metadata from folder
//! paths ([`path_meta`]), and rebuilds the flat index from scratch: local
//! JSON snapshot first, then an in-place overwrite of the canonical remote
//! index object. Readers go through [`SyncService::load_index`], which
//! caches in-process and falls back snapshot → remote → empty.

pub mod path_meta;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::LibraryConfig;
use crate::error::SyncError;
use crate::sorter::RunHooks;
use crate::store::ObjectStore;

/// Name of the canonical index object under the library root.
pub const INDEX_FILE_NAME: &str = "library_index.json";

/// One indexed file. Serialized camelCase into the canonical index JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub file_id: String,
    /// Path under the library root, slash-separated, ending in the name.
    pub path: String,
    #[serde(default)]
    pub view_link: Option<String>,
    pub mime_type: String,
    pub category: String,
    pub brand: String,
    pub model: String,
    pub doc_type: String,
    #[serde(default)]
    pub fault_codes: Vec<String>,
    pub original_name: String,
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub file_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Rebuilds and serves the library index.
///
/// One sync run is a single sequential walk; concurrent runs against the
/// same library must be serialized by the caller, since the remote index
/// object is a single shared resource.
pub struct SyncService {
    store: Arc<dyn ObjectStore>,
    root_id: String,
    snapshot_path: PathBuf,
    cache: RwLock<Option<Arc<Vec<IndexEntry>>>>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        root_id: impl Into<String>,
        snapshot_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            root_id: root_id.into(),
            snapshot_path: snapshot_path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &LibraryConfig) -> Self {
        Self::new(
            store,
            config.root_folder_id.clone(),
            config.snapshot_path.clone(),
        )
    }

    /// Rebuild the index from a full walk and persist it.
    ///
    /// The local snapshot is written before the remote overwrite, so a
    /// failed remote step still leaves a usable fallback on disk.
    pub async fn sync_index(&self, hooks: &RunHooks) -> Result<SyncReport, SyncError> {
        if self.root_id.trim().is_empty() {
            return Err(SyncError::MissingRoot);
        }

        let started_at = Utc::now();
        hooks.log("Starting library index sync");

        let entries = self.walk_library(hooks).await?;
        tracing::info!("[Sync] Indexed {} files", entries.len());

        self.write_snapshot(&entries).await?;
        self.overwrite_remote(&entries).await?;
        self.invalidate_cache().await;

        let finished_at = Utc::now();
        hooks.log(&format!("Index sync finished: {} files", entries.len()));
        Ok(SyncReport {
            file_count: entries.len(),
            started_at,
            finished_at,
        })
    }

    /// Full traversal of the library tree with an explicit stack.
    ///
    /// Quarantine folders are deliberately included — the index has to show
    /// everything a person browsing the store can see. The only exclusion
    /// is the canonical index object itself.
    async fn walk_library(&self, hooks: &RunHooks) -> Result<Vec<IndexEntry>, SyncError> {
        let mut entries: Vec<IndexEntry> = Vec::new();
        let mut seen_files: HashSet<String> = HashSet::new();
        let mut seen_folders: HashSet<String> = HashSet::new();
        let mut stack: Vec<(String, Vec<String>)> = vec![(self.root_id.clone(), Vec::new())];

        while let Some((folder_id, segments)) = stack.pop() {
            if !seen_folders.insert(folder_id.clone()) {
                continue;
            }

            let children = self.store.list_children(&folder_id).await?;
            let mut files_here = 0usize;

            for child in children {
                if child.is_folder() {
                    let mut next = segments.clone();
                    next.push(child.name.clone());
                    stack.push((child.id, next));
                    continue;
                }

                if segments.is_empty() && child.name == INDEX_FILE_NAME {
                    continue;
                }
                // A file linked into several folders shows up once
                if !seen_files.insert(child.id.clone()) {
                    continue;
                }

                let meta = path_meta::derive(&segments, &child.name);
                let path = if segments.is_empty() {
                    child.name.clone()
                } else {
                    format!("{}/{}", segments.join("/"), child.name)
                };

                entries.push(IndexEntry {
                    file_id: child.id,
                    path,
                    view_link: child.view_link,
                    mime_type: child.mime_type,
                    category: meta.category,
                    brand: meta.brand,
                    model: meta.model,
                    doc_type: meta.doc_type,
                    fault_codes: meta.fault_codes,
                    original_name: child.name,
                });
                files_here += 1;
            }

            if files_here > 0 {
                let place = if segments.is_empty() {
                    "library root".to_string()
                } else {
                    segments.join("/")
                };
                hooks.log(&format!("Indexed {} files under {}", files_here, place));
            }
        }

        Ok(entries)
    }

    async fn write_snapshot(&self, entries: &[IndexEntry]) -> Result<(), SyncError> {
        if let Some(parent) = self.snapshot_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&self.snapshot_path, json).await?;
        tracing::debug!("[Sync] Snapshot written to {}", self.snapshot_path.display());
        Ok(())
    }

    /// Overwrite the canonical index object in place.
    ///
    /// Found by name once, then updated by id — never deleted and
    /// recreated, so readers holding the id keep a stable reference.
    async fn overwrite_remote(&self, entries: &[IndexEntry]) -> Result<(), SyncError> {
        let children = self.store.list_children(&self.root_id).await?;
        let index_obj = children
            .into_iter()
            .find(|c| !c.is_folder() && c.name == INDEX_FILE_NAME)
            .ok_or_else(|| SyncError::IndexObjectMissing(INDEX_FILE_NAME.to_string()))?;

        let json = serde_json::to_vec_pretty(entries)?;
        self.store.update_content(&index_obj.id, json).await?;
        tracing::info!("[Sync] Remote index object updated ({})", index_obj.id);
        Ok(())
    }

    /// Current index for readers: cache, then local snapshot, then remote
    /// download, then empty. Never fails hard; failures are logged and the
    /// next source is tried.
    pub async fn load_index(&self) -> Arc<Vec<IndexEntry>> {
        if let Some(cached) = self.cache.read().await.clone() {
            return cached;
        }

        let entries = Arc::new(self.load_uncached().await);
        *self.cache.write().await = Some(entries.clone());
        entries
    }

    /// Drop the cached copy so the next read goes back to the sources.
    pub async fn invalidate_cache(&self) {
        *self.cache.write().await = None;
    }

    async fn load_uncached(&self) -> Vec<IndexEntry> {
        match tokio::fs::read(&self.snapshot_path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<IndexEntry>>(&bytes) {
                Ok(entries) => return entries,
                Err(e) => {
                    tracing::warn!("[Sync] Snapshot unreadable, trying remote: {}", e);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("[Sync] Snapshot read failed, trying remote: {}", e);
            }
        }

        match self.download_remote().await {
            Ok(Some(entries)) => {
                // Refresh the local fallback for the next cold start
                if let Err(e) = self.write_snapshot(&entries).await {
                    tracing::debug!("[Sync] Could not refresh snapshot: {}", e);
                }
                entries
            }
            Ok(None) => {
                tracing::info!("[Sync] No index yet; starting empty");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("[Sync] Remote index unavailable: {}", e);
                Vec::new()
            }
        }
    }

    async fn download_remote(&self) -> Result<Option<Vec<IndexEntry>>, SyncError> {
        let children = self.store.list_children(&self.root_id).await?;
        let Some(index_obj) = children
            .into_iter()
            .find(|c| !c.is_folder() && c.name == INDEX_FILE_NAME)
        else {
            return Ok(None);
        };

        let bytes = self.store.download(&index_obj.id).await?;
        let entries = serde_json::from_slice(&bytes)?;
        Ok(Some(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;

    /// Root with an index object, one fully filed manual, one quarantined
    /// file, and one loose upload.
    async fn seeded_store() -> (Arc<MemoryObjectStore>, String) {
        let store = Arc::new(MemoryObjectStore::new());
        let root = store.root_id();

        store
            .upload(b"[]".to_vec(), INDEX_FILE_NAME, &root)
            .await
            .unwrap();

        let cat = store.create_folder_if_absent(&root, "Air_Conditioning").await.unwrap();
        let brand = store.create_folder_if_absent(&cat, "Daikin").await.unwrap();
        let model = store.create_folder_if_absent(&brand, "FTXS35").await.unwrap();
        let doc = store.create_folder_if_absent(&model, "User_Manual").await.unwrap();
        store
            .upload(b"%PDF-manual".to_vec(), "FTXS35_User_Manual_E3.pdf", &doc)
            .await
            .unwrap();

        let review = store.create_folder_if_absent(&root, "_MANUAL_REVIEW").await.unwrap();
        store
            .upload(b"%PDF-odd".to_vec(), "Bosch_GC7000.pdf", &review)
            .await
            .unwrap();

        store
            .upload(b"%PDF-loose".to_vec(), "loose_scan.pdf", &root)
            .await
            .unwrap();

        (store, root)
    }

    fn service(store: Arc<MemoryObjectStore>, root: &str) -> (SyncService, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let snapshot = dir.path().join("library_index.json");
        (SyncService::new(store, root, snapshot), dir)
    }

    #[tokio::test]
    async fn test_sync_indexes_every_file_except_the_index_object() {
        let (store, root) = seeded_store().await;
        let (sync, _dir) = service(store.clone(), &root);

        let report = sync.sync_index(&RunHooks::silent()).await.unwrap();
        assert_eq!(report.file_count, 3);

        let index = sync.load_index().await;
        assert_eq!(index.len(), 3);
        assert!(index.iter().all(|e| e.original_name != INDEX_FILE_NAME));

        let filed = index
            .iter()
            .find(|e| e.original_name == "FTXS35_User_Manual_E3.pdf")
            .unwrap();
        assert_eq!(filed.category, "Air_Conditioning");
        assert_eq!(filed.brand, "Daikin");
        assert_eq!(filed.model, "FTXS35");
        assert_eq!(filed.doc_type, "User_Manual");
        assert_eq!(filed.fault_codes, vec!["E3"]);
        assert_eq!(
            filed.path,
            "Air_Conditioning/Daikin/FTXS35/User_Manual/FTXS35_User_Manual_E3.pdf"
        );

        let quarantined = index
            .iter()
            .find(|e| e.original_name == "Bosch_GC7000.pdf")
            .unwrap();
        assert_eq!(quarantined.category, "_MANUAL_REVIEW");
    }

    #[tokio::test]
    async fn test_sync_overwrites_remote_object_in_place() {
        let (store, root) = seeded_store().await;
        let (sync, _dir) = service(store.clone(), &root);

        let before = store.list_children(&root).await.unwrap();
        let index_id = before
            .iter()
            .find(|c| c.name == INDEX_FILE_NAME)
            .unwrap()
            .id
            .clone();

        sync.sync_index(&RunHooks::silent()).await.unwrap();

        let bytes = store.download(&index_id).await.unwrap();
        let entries: Vec<IndexEntry> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_index_object_fails_but_writes_snapshot() {
        let store = Arc::new(MemoryObjectStore::new());
        let root = store.root_id();
        store.upload(b"%PDF".to_vec(), "a.pdf", &root).await.unwrap();

        let (sync, dir) = service(store, &root);
        let err = sync.sync_index(&RunHooks::silent()).await.unwrap_err();
        assert!(matches!(err, SyncError::IndexObjectMissing(_)));
        assert!(dir.path().join("library_index.json").exists());
    }

    #[tokio::test]
    async fn test_load_index_falls_back_to_remote_then_empty() {
        let (store, root) = seeded_store().await;

        // Populate the remote object through one service, then read through
        // a fresh one with no snapshot on disk
        let (writer, _wdir) = service(store.clone(), &root);
        writer.sync_index(&RunHooks::silent()).await.unwrap();

        let (reader, _rdir) = service(store.clone(), &root);
        let index = reader.load_index().await;
        assert_eq!(index.len(), 3);

        // No snapshot, no index object: empty
        let bare = Arc::new(MemoryObjectStore::new());
        let bare_root = bare.root_id();
        let (empty_reader, _edir) = service(bare, &bare_root);
        assert!(empty_reader.load_index().await.is_empty());
    }

    #[tokio::test]
    async fn test_cache_serves_until_invalidated() {
        let (store, root) = seeded_store().await;
        let (sync, dir) = service(store, &root);

        sync.sync_index(&RunHooks::silent()).await.unwrap();
        let first = sync.load_index().await;
        assert_eq!(first.len(), 3);

        // Remove the snapshot; the cached copy must still answer
        std::fs::remove_file(dir.path().join("library_index.json")).unwrap();
        let cached = sync.load_index().await;
        assert_eq!(cached.len(), 3);

        // After invalidation the loader re-reads sources (remote here)
        sync.invalidate_cache().await;
        let reloaded = sync.load_index().await;
        assert_eq!(reloaded.len(), 3);
    }
}
