//! In-memory object store.
//!
//! Backs tests and local dry-runs with the same [`ObjectStore`] surface as
//! the HTTP client: a flat node table with parent links, uuid ids and
//! `memory://` view links.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use super::{EntryKind, FileId, ObjectStore, RemoteEntry, FOLDER_MIME};
use crate::error::StoreError;
use async_trait::async_trait;

/// In-process store; cheap to create per test.
pub struct MemoryObjectStore {
    root_id: FileId,
    tree: Mutex<Tree>,
}

struct Tree {
    nodes: HashMap<FileId, Node>,
}

struct Node {
    name: String,
    kind: EntryKind,
    mime_type: String,
    parent: Option<FileId>,
    content: Vec<u8>,
}

impl MemoryObjectStore {
    /// Create an empty store with a fresh root folder.
    pub fn new() -> Self {
        let root_id = new_id();
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id.clone(),
            Node {
                name: "root".to_string(),
                kind: EntryKind::Folder,
                mime_type: FOLDER_MIME.to_string(),
                parent: None,
                content: Vec::new(),
            },
        );
        Self {
            root_id,
            tree: Mutex::new(Tree { nodes }),
        }
    }

    /// Id of the root folder.
    pub fn root_id(&self) -> FileId {
        self.root_id.clone()
    }

    /// Upload with an explicit mime type, for cases where the name alone
    /// would guess wrong (tests exercising the candidate filter).
    pub async fn upload_with_mime(
        &self,
        bytes: Vec<u8>,
        name: &str,
        mime_type: &str,
        parent_id: &str,
    ) -> Result<RemoteEntry, StoreError> {
        let mut tree = self.tree.lock().await;
        tree.require_folder(parent_id)?;
        Ok(tree.insert_file(name, mime_type, parent_id, bytes))
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    fn node(&self, id: &str) -> Result<&Node, StoreError> {
        self.nodes
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut Node, StoreError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn require_folder(&self, id: &str) -> Result<(), StoreError> {
        let node = self.node(id)?;
        if node.kind != EntryKind::Folder {
            return Err(StoreError::Decode(format!("{} is not a folder", id)));
        }
        Ok(())
    }

    fn entry(&self, id: &str, node: &Node) -> RemoteEntry {
        RemoteEntry {
            id: id.to_string(),
            name: node.name.clone(),
            kind: node.kind,
            mime_type: node.mime_type.clone(),
            view_link: Some(format!("memory://{}", id)),
        }
    }

    fn insert_file(
        &mut self,
        name: &str,
        mime_type: &str,
        parent_id: &str,
        content: Vec<u8>,
    ) -> RemoteEntry {
        let id = new_id();
        let node = Node {
            name: name.to_string(),
            kind: EntryKind::File,
            mime_type: mime_type.to_string(),
            parent: Some(parent_id.to_string()),
            content,
        };
        let entry = self.entry(&id, &node);
        self.nodes.insert(id, node);
        entry
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, StoreError> {
        let tree = self.tree.lock().await;
        tree.require_folder(folder_id)?;
        let mut children: Vec<RemoteEntry> = tree
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.as_deref() == Some(folder_id))
            .map(|(id, node)| tree.entry(id, node))
            .collect();
        // HashMap iteration order is arbitrary; keep listings deterministic
        children.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(children)
    }

    async fn create_folder_if_absent(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<FileId, StoreError> {
        let mut tree = self.tree.lock().await;
        tree.require_folder(parent_id)?;

        let existing = tree.nodes.iter().find(|(_, node)| {
            node.parent.as_deref() == Some(parent_id)
                && node.kind == EntryKind::Folder
                && node.name == name
        });
        if let Some((id, _)) = existing {
            return Ok(id.clone());
        }

        let id = new_id();
        tree.nodes.insert(
            id.clone(),
            Node {
                name: name.to_string(),
                kind: EntryKind::Folder,
                mime_type: FOLDER_MIME.to_string(),
                parent: Some(parent_id.to_string()),
                content: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn move_file(&self, id: &str, new_parent_id: &str) -> Result<(), StoreError> {
        let mut tree = self.tree.lock().await;
        tree.require_folder(new_parent_id)?;
        let node = tree.node_mut(id)?;
        node.parent = Some(new_parent_id.to_string());
        Ok(())
    }

    async fn rename_file(&self, id: &str, new_name: &str) -> Result<(), StoreError> {
        let mut tree = self.tree.lock().await;
        let node = tree.node_mut(id)?;
        node.name = new_name.to_string();
        Ok(())
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        let tree = self.tree.lock().await;
        let node = tree.node(id)?;
        Ok(node.content.clone())
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        parent_id: &str,
    ) -> Result<RemoteEntry, StoreError> {
        let mime = mime_guess::from_path(name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        self.upload_with_mime(bytes, name, &mime, parent_id).await
    }

    async fn update_content(&self, id: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let mut tree = self.tree.lock().await;
        let node = tree.node_mut(id)?;
        node.content = bytes;
        Ok(())
    }
}

fn new_id() -> FileId {
    Uuid::new_v4().to_string()
}
