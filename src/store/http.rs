//! HTTP object store backend.
//!
//! Drive-style JSON REST client: metadata under `{base}/files`, content
//! under `{base}/upload/files`. Bearer-token auth, one request per
//! operation, failures surface as [`StoreError`] without retry.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;

use super::{EntryKind, FileId, ObjectStore, RemoteEntry, FOLDER_MIME};
use crate::config::LibraryConfig;
use crate::error::StoreError;
use async_trait::async_trait;

/// Request timeout for store calls. Downloads of large manuals are the
/// slowest operation this has to cover.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Page size for child listings.
const PAGE_SIZE: u32 = 1000;

const LIST_FIELDS: &str = "files(id,name,mimeType,webViewLink),nextPageToken";
const ENTRY_FIELDS: &str = "id,name,mimeType,webViewLink";

/// Remote store client.
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpObjectStore {
    /// Create a client for the given API base URL and bearer token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Create a client from the environment configuration.
    pub fn from_config(config: &LibraryConfig) -> Result<Self, StoreError> {
        Self::new(config.store_url.clone(), config.store_token.clone())
    }

    fn files_url(&self, suffix: &str) -> String {
        format!("{}/files{}", self.base_url, suffix)
    }

    fn upload_url(&self, suffix: &str) -> String {
        format!("{}/upload/files{}", self.base_url, suffix)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Run a search query, following pagination to the end.
    async fn query_files(&self, query: &str) -> Result<Vec<FileMeta>, StoreError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.files_url(""))
                .header("Authorization", self.bearer())
                .query(&[
                    ("q", query),
                    ("fields", LIST_FIELDS),
                    ("pageSize", &PAGE_SIZE.to_string()),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = check(request.send().await?, query).await?;
            let page: FileList = response
                .json()
                .await
                .map_err(|e| StoreError::Decode(e.to_string()))?;

            files.extend(page.files);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(files)
    }

    async fn file_meta(&self, id: &str, fields: &str) -> Result<FileMeta, StoreError> {
        let response = self
            .client
            .get(self.files_url(&format!("/{}", id)))
            .header("Authorization", self.bearer())
            .query(&[("fields", fields)])
            .send()
            .await?;
        let response = check(response, id).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, StoreError> {
        let query = format!(
            "'{}' in parents and trashed = false",
            escape_query(folder_id)
        );
        let files = self.query_files(&query).await?;
        tracing::debug!("[Store] Listed {} children of {}", files.len(), folder_id);
        Ok(files.into_iter().map(FileMeta::into_entry).collect())
    }

    async fn create_folder_if_absent(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<FileId, StoreError> {
        let query = format!(
            "'{}' in parents and name = '{}' and mimeType = '{}' and trashed = false",
            escape_query(parent_id),
            escape_query(name),
            FOLDER_MIME
        );
        if let Some(existing) = self.query_files(&query).await?.into_iter().next() {
            return Ok(existing.id);
        }

        let body = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent_id],
        });
        let response = self
            .client
            .post(self.files_url(""))
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await?;
        let response = check(response, name).await?;
        let meta: FileMeta = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        tracing::info!("[Store] Created folder {:?} under {}", name, parent_id);
        Ok(meta.id)
    }

    async fn move_file(&self, id: &str, new_parent_id: &str) -> Result<(), StoreError> {
        // The store keeps explicit parent links, so the old ones must be
        // detached in the same update
        let meta = self.file_meta(id, "id,parents").await?;
        let remove = meta.parents.join(",");

        let response = self
            .client
            .patch(self.files_url(&format!("/{}", id)))
            .header("Authorization", self.bearer())
            .query(&[("addParents", new_parent_id), ("removeParents", &remove)])
            .json(&serde_json::json!({}))
            .send()
            .await?;
        check(response, id).await?;
        Ok(())
    }

    async fn rename_file(&self, id: &str, new_name: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .patch(self.files_url(&format!("/{}", id)))
            .header("Authorization", self.bearer())
            .json(&serde_json::json!({ "name": new_name }))
            .send()
            .await?;
        check(response, id).await?;
        Ok(())
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        let response = self
            .client
            .get(self.files_url(&format!("/{}", id)))
            .header("Authorization", self.bearer())
            .query(&[("alt", "media")])
            .send()
            .await?;
        let response = check(response, id).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
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

        // Metadata first, then content against the fresh id
        let body = serde_json::json!({
            "name": name,
            "mimeType": mime,
            "parents": [parent_id],
        });
        let response = self
            .client
            .post(self.files_url(""))
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await?;
        let response = check(response, name).await?;
        let created: FileMeta = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let response = self
            .client
            .patch(self.upload_url(&format!("/{}", created.id)))
            .header("Authorization", self.bearer())
            .header("Content-Type", &mime)
            .query(&[("uploadType", "media"), ("fields", ENTRY_FIELDS)])
            .body(bytes)
            .send()
            .await?;
        let response = check(response, name).await?;
        let meta: FileMeta = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        tracing::debug!("[Store] Uploaded {:?} as {}", name, meta.id);
        Ok(meta.into_entry())
    }

    async fn update_content(&self, id: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let response = self
            .client
            .patch(self.upload_url(&format!("/{}", id)))
            .header("Authorization", self.bearer())
            .query(&[("uploadType", "media")])
            .body(bytes)
            .send()
            .await?;
        check(response, id).await?;
        Ok(())
    }
}

/// Map a non-success response to a [`StoreError`].
async fn check(response: Response, what: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 404 {
        return Err(StoreError::NotFound(what.to_string()));
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Escape a value for use inside a single-quoted query literal.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

// Wire types

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileMeta>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMeta {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    web_view_link: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
}

impl FileMeta {
    fn into_entry(self) -> RemoteEntry {
        let mime_type = self
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let kind = if mime_type == FOLDER_MIME {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        RemoteEntry {
            id: self.id,
            name: self.name,
            kind,
            mime_type,
            view_link: self.web_view_link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_query_quotes() {
        assert_eq!(escape_query("O'Brien"), "O\\'Brien");
        assert_eq!(escape_query("plain"), "plain");
    }

    #[test]
    fn test_folder_meta_maps_to_folder_kind() {
        let meta = FileMeta {
            id: "f1".to_string(),
            name: "Heating_Boilers".to_string(),
            mime_type: Some(FOLDER_MIME.to_string()),
            web_view_link: None,
            parents: Vec::new(),
        };
        let entry = meta.into_entry();
        assert_eq!(entry.kind, EntryKind::Folder);
        assert!(entry.is_folder());
    }

    #[test]
    fn test_missing_mime_defaults_to_octet_stream() {
        let meta = FileMeta {
            id: "f2".to_string(),
            name: "manual.pdf".to_string(),
            mime_type: None,
            web_view_link: None,
            parents: Vec::new(),
        };
        let entry = meta.into_entry();
        assert_eq!(entry.mime_type, "application/octet-stream");
        assert_eq!(entry.kind, EntryKind::File);
    }
}
