//! Environment-backed configuration.
//!
//! All runtime settings come from environment variables; a `.env` file in
//! the working directory is honored. Key lookups keep the fallback names
//! existing deployments already export.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Default base URL of the classification provider.
pub const DEFAULT_CLASSIFIER_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Connection settings for the library services.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Base URL of the object store API.
    pub store_url: String,
    /// Bearer token for the object store.
    pub store_token: String,
    /// Remote id of the library root folder.
    pub root_folder_id: String,
    /// API key for the classification provider.
    pub classifier_key: String,
    /// Base URL of the classification provider.
    pub classifier_url: String,
    /// Where the local index snapshot is written.
    pub snapshot_path: PathBuf,
}

impl LibraryConfig {
    /// Load configuration from the environment (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Missing .env is fine; exported variables still apply
        let _ = dotenvy::dotenv();

        let store_url = first_env(&["DOCSHELF_STORE_URL"])
            .ok_or(ConfigError::MissingVar("DOCSHELF_STORE_URL"))?;
        let store_token = first_env(&["DOCSHELF_STORE_TOKEN"])
            .ok_or(ConfigError::MissingVar("DOCSHELF_STORE_TOKEN"))?;
        let root_folder_id = first_env(&["DOCSHELF_ROOT_FOLDER_ID", "DRIVE_FOLDER_ID"])
            .ok_or(ConfigError::MissingVar("DOCSHELF_ROOT_FOLDER_ID"))?;
        let classifier_key = first_env(&["GEMINI_API_KEY", "GEMINI_KEY"])
            .ok_or(ConfigError::MissingVar("GEMINI_API_KEY"))?;
        let classifier_url = first_env(&["DOCSHELF_CLASSIFIER_URL"])
            .unwrap_or_else(|| DEFAULT_CLASSIFIER_URL.to_string());
        let snapshot_path = first_env(&["DOCSHELF_SNAPSHOT_PATH"])
            .map(PathBuf::from)
            .unwrap_or_else(default_snapshot_path);

        Ok(Self {
            store_url,
            store_token,
            root_folder_id,
            classifier_key,
            classifier_url,
            snapshot_path,
        })
    }
}

/// First non-empty value among the given variable names.
fn first_env(keys: &[&'static str]) -> Option<String> {
    keys.iter().find_map(|key| match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    })
}

/// Default snapshot location under the platform data directory.
fn default_snapshot_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docshelf")
        .join(crate::sync::INDEX_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_env_skips_empty_values() {
        std::env::set_var("DOCSHELF_TEST_EMPTY", "   ");
        std::env::set_var("DOCSHELF_TEST_SET", "value");

        let found = first_env(&["DOCSHELF_TEST_MISSING", "DOCSHELF_TEST_EMPTY", "DOCSHELF_TEST_SET"]);
        assert_eq!(found.as_deref(), Some("value"));

        std::env::remove_var("DOCSHELF_TEST_EMPTY");
        std::env::remove_var("DOCSHELF_TEST_SET");
    }

    #[test]
    fn test_default_snapshot_path_ends_with_index_name() {
        let path = default_snapshot_path();
        assert!(path.ends_with(PathBuf::from("docshelf").join(crate::sync::INDEX_FILE_NAME)));
    }
}
