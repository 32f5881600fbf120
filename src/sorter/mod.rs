//! Classification and filing pipeline.
//!
//! One run walks the untriaged parts of the library, hashes each candidate
//! document, asks the classifier for metadata, and either files the
//! document under `category/brand/model/docType` or parks it in a
//! quarantine folder. Every per-document failure is recorded and the run
//! moves on; only a missing root configuration aborts a run.

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::{extract, Classification, Classifier, ClassifyInput, DocType};
use crate::config::LibraryConfig;
use crate::dedup::{sha256_hex, DedupTable, SeenFile};
use crate::error::SorterError;
use crate::store::{ObjectStore, RemoteEntry};
use crate::sync::INDEX_FILE_NAME;

/// Quarantine folder for documents needing a human decision.
pub const MANUAL_REVIEW_FOLDER: &str = "_MANUAL_REVIEW";
/// Quarantine folder for documents outside the library's scope.
pub const IRRELEVANT_FOLDER: &str = "_IRRELEVANT_OR_UNKNOWN";
/// Quarantine folder for exact-content duplicates.
pub const DUPLICATES_FOLDER: &str = "_DUPLICATES";
/// Quarantine folder for documents whose processing failed.
pub const ERROR_FOLDER: &str = "_AI_ERROR";
/// Holding folder for user uploads awaiting triage.
pub const UPLOADS_FOLDER: &str = "User_Uploads";

/// The fixed quarantine folders, all directly under the library root.
pub const QUARANTINE_FOLDERS: [&str; 4] = [
    MANUAL_REVIEW_FOLDER,
    IRRELEVANT_FOLDER,
    DUPLICATES_FOLDER,
    ERROR_FOLDER,
];

/// Longest filed display name; remote stores reject longer ones.
const MAX_FILED_NAME: usize = 200;

/// Cooperative cancellation for a running sorter.
///
/// Cloned into whoever needs to stop the run; polled before each document,
/// so the document in flight always completes.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop after the current document.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag before reusing it for a new run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

type ProgressFn = dyn Fn(usize, usize, &str) + Send + Sync;
type LogFn = dyn Fn(&str) + Send + Sync;

/// Progress and log callbacks for a run. No-ops by default.
#[derive(Default)]
pub struct RunHooks {
    on_progress: Option<Box<ProgressFn>>,
    on_log: Option<Box<LogFn>>,
}

impl RunHooks {
    /// Hooks that swallow everything; for tests and batch callers.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn with_progress(
        mut self,
        f: impl Fn(usize, usize, &str) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn with_log(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_log = Some(Box::new(f));
        self
    }

    pub fn progress(&self, current: usize, total: usize, message: &str) {
        if let Some(f) = &self.on_progress {
            f(current, total, message);
        }
    }

    pub fn log(&self, line: &str) {
        if let Some(f) = &self.on_log {
            f(line);
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Canceled,
}

/// A document parked in manual review or the irrelevant folder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineRecord {
    pub name: String,
    pub view_link: Option<String>,
    pub reason: String,
    /// Full classifier answer, kept for manual-review confirmation.
    pub suggestion: Option<Classification>,
}

/// A duplicate moved aside, pointing at the copy that stayed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRecord {
    pub name: String,
    pub view_link: Option<String>,
    pub original_name: String,
}

/// A document whose processing failed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub name: String,
    pub file_id: String,
    pub error: String,
    pub view_link: Option<String>,
}

/// Everything one sorter run did, returned to the caller whole.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Candidates found by the scan.
    pub scanned: usize,
    pub sorted: usize,
    pub manual_review: usize,
    pub irrelevant: usize,
    pub duplicates: usize,
    pub category_counts: HashMap<String, usize>,
    pub brand_counts: HashMap<String, usize>,
    pub type_counts: HashMap<String, usize>,
    pub manual_review_files: Vec<QuarantineRecord>,
    pub irrelevant_files: Vec<QuarantineRecord>,
    pub duplicate_files: Vec<DuplicateRecord>,
    pub failed: Vec<FailureRecord>,
}

impl RunSummary {
    fn start() -> Self {
        Self {
            status: RunStatus::Completed,
            started_at: Utc::now(),
            finished_at: None,
            scanned: 0,
            sorted: 0,
            manual_review: 0,
            irrelevant: 0,
            duplicates: 0,
            category_counts: HashMap::new(),
            brand_counts: HashMap::new(),
            type_counts: HashMap::new(),
            manual_review_files: Vec::new(),
            irrelevant_files: Vec::new(),
            duplicate_files: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Runs the classify → dedup → file/quarantine pipeline.
pub struct SorterService {
    store: Arc<dyn ObjectStore>,
    classifier: Arc<dyn Classifier>,
    root_id: String,
}

impl SorterService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        classifier: Arc<dyn Classifier>,
        root_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            classifier,
            root_id: root_id.into(),
        }
    }

    pub fn from_config(
        store: Arc<dyn ObjectStore>,
        classifier: Arc<dyn Classifier>,
        config: &LibraryConfig,
    ) -> Self {
        Self::new(store, classifier, config.root_folder_id.clone())
    }

    /// Run the pipeline over every untriaged candidate.
    ///
    /// With `force_full_rescan` the already-triaged subtrees (category and
    /// quarantine folders) are re-evaluated too, for when the
    /// classification scheme has changed. The summary is returned for any
    /// outcome; `Err` only means the run could not start.
    pub async fn run(
        &self,
        force_full_rescan: bool,
        cancel: &CancelFlag,
        hooks: &RunHooks,
    ) -> Result<RunSummary, SorterError> {
        if self.root_id.trim().is_empty() {
            return Err(SorterError::MissingRoot);
        }

        let mut summary = RunSummary::start();
        hooks.log("Starting sorter run");
        hooks.progress(0, 1, "Scanning library");

        let candidates = self.collect_candidates(force_full_rescan, hooks).await?;
        summary.scanned = candidates.len();
        let total = candidates.len();
        hooks.log(&format!(
            "Found {} files to process (force full rescan: {})",
            total, force_full_rescan
        ));

        let mut dedup = DedupTable::new();
        for (idx, doc) in candidates.iter().enumerate() {
            if cancel.is_canceled() {
                summary.status = RunStatus::Canceled;
                hooks.log("Sorter run canceled; stopping before the next document");
                break;
            }

            hooks.progress(idx + 1, total, &format!("Processing {}", doc.name));
            if let Err(e) = self
                .process_document(doc, &mut dedup, &mut summary, hooks)
                .await
            {
                tracing::warn!("[Sorter] Processing {} failed: {}", doc.name, e);
                hooks.log(&format!("Error processing {}: {}", doc.name, e));
                summary.failed.push(FailureRecord {
                    name: doc.name.clone(),
                    file_id: doc.id.clone(),
                    error: e.to_string(),
                    view_link: doc.view_link.clone(),
                });
                if let Err(move_err) = self.move_to_quarantine(&doc.id, ERROR_FOLDER).await {
                    tracing::error!(
                        "[Sorter] Could not move {} to {}: {}",
                        doc.name,
                        ERROR_FOLDER,
                        move_err
                    );
                }
            }
        }

        summary.finished_at = Some(Utc::now());
        hooks.progress(total, total, "Finished");
        hooks.log(&format!(
            "Sorter run {}: {} sorted, {} review, {} irrelevant, {} duplicates, {} failed",
            match summary.status {
                RunStatus::Completed => "completed",
                RunStatus::Canceled => "canceled",
            },
            summary.sorted,
            summary.manual_review,
            summary.irrelevant,
            summary.duplicates,
            summary.failed.len()
        ));
        tracing::info!(
            "[Sorter] Run finished: {}/{} sorted, {} failed",
            summary.sorted,
            summary.scanned,
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Upload user-provided bytes into the holding folder for a later run
    /// to triage.
    pub async fn upload_document(
        &self,
        bytes: Vec<u8>,
        name: &str,
    ) -> Result<RemoteEntry, SorterError> {
        if self.root_id.trim().is_empty() {
            return Err(SorterError::MissingRoot);
        }
        let holding = self
            .store
            .create_folder_if_absent(&self.root_id, UPLOADS_FOLDER)
            .await?;
        let entry = self.store.upload(bytes, name, &holding).await?;
        tracing::info!("[Sorter] Uploaded {} into {}", entry.name, UPLOADS_FOLDER);
        Ok(entry)
    }

    /// Gather candidate files, skipping already-triaged subtrees unless a
    /// full rescan is forced. Sorted by name so runs are deterministic.
    async fn collect_candidates(
        &self,
        force_full_rescan: bool,
        hooks: &RunHooks,
    ) -> Result<Vec<RemoteEntry>, SorterError> {
        let mut files: Vec<RemoteEntry> = Vec::new();
        let mut seen_folders: HashSet<String> = HashSet::new();
        let mut stack: Vec<(String, usize)> = vec![(self.root_id.clone(), 0)];

        while let Some((folder_id, depth)) = stack.pop() {
            if !seen_folders.insert(folder_id.clone()) {
                continue;
            }

            for child in self.store.list_children(&folder_id).await? {
                if child.is_folder() {
                    if depth == 0 && !force_full_rescan && is_triaged_folder(&child.name) {
                        hooks.log(&format!("Skipping already triaged folder: {}", child.name));
                        continue;
                    }
                    stack.push((child.id, depth + 1));
                } else if is_candidate(&child) {
                    files.push(child);
                }
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(files)
    }

    /// One document through the state machine: hash → duplicate check →
    /// classify → file or quarantine. Errors bubble to the run loop, which
    /// records the failure and moves the document to the error folder.
    async fn process_document(
        &self,
        doc: &RemoteEntry,
        dedup: &mut DedupTable,
        summary: &mut RunSummary,
        hooks: &RunHooks,
    ) -> Result<(), SorterError> {
        let bytes = self.store.download(&doc.id).await?;
        let digest = sha256_hex(&bytes);

        if let Some(original) = dedup.seen(&digest).cloned() {
            let dup_folder = self
                .store
                .create_folder_if_absent(&self.root_id, DUPLICATES_FOLDER)
                .await?;
            self.store.move_file(&doc.id, &dup_folder).await?;
            self.store
                .rename_file(&doc.id, &format!("{}_DUPLICATE_OF_{}", doc.name, original.name))
                .await?;
            summary.duplicates += 1;
            summary.duplicate_files.push(DuplicateRecord {
                name: doc.name.clone(),
                view_link: doc.view_link.clone(),
                original_name: original.name.clone(),
            });
            hooks.log(&format!("Duplicate moved aside: {} (of {})", doc.name, original.name));
            return Ok(());
        }
        dedup.record(
            &digest,
            SeenFile {
                file_id: doc.id.clone(),
                name: doc.name.clone(),
            },
        );

        let snippet = extract::bounded_text(&bytes, &doc.mime_type);
        let classification = self
            .classifier
            .classify(&ClassifyInput {
                file_name: &doc.name,
                text_snippet: &snippet,
                bytes: Some(&bytes),
                mime_type: &doc.mime_type,
            })
            .await?;

        self.route(doc, classification, summary, hooks).await
    }

    /// Decision policy over a classifier answer.
    async fn route(
        &self,
        doc: &RemoteEntry,
        classification: Classification,
        summary: &mut RunSummary,
        hooks: &RunHooks,
    ) -> Result<(), SorterError> {
        let nothing_resolved = !classification.brand_resolved()
            && !classification.model_resolved()
            && classification.doc_type.is_none();

        let Some(category) = classification.category.filter(|_| !nothing_resolved) else {
            self.move_to_quarantine(&doc.id, IRRELEVANT_FOLDER).await?;
            summary.irrelevant += 1;
            summary.irrelevant_files.push(QuarantineRecord {
                name: doc.name.clone(),
                view_link: doc.view_link.clone(),
                reason: classification.reason.clone(),
                suggestion: None,
            });
            hooks.log(&format!(
                "Moved to irrelevant: {} ({})",
                doc.name, classification.reason
            ));
            return Ok(());
        };

        match classification.doc_type {
            Some(doc_type)
                if classification.brand_resolved() && classification.model_resolved() =>
            {
                self.file_document(doc, category.as_str(), doc_type, &classification, summary)
                    .await?;
                hooks.log(&format!(
                    "Filed {} under {}/{}/{}/{}",
                    doc.name,
                    category.as_str(),
                    classification.brand,
                    classification.model,
                    doc_type.as_str()
                ));
                Ok(())
            }
            _ => {
                self.move_to_quarantine(&doc.id, MANUAL_REVIEW_FOLDER).await?;
                summary.manual_review += 1;
                summary.manual_review_files.push(QuarantineRecord {
                    name: doc.name.clone(),
                    view_link: doc.view_link.clone(),
                    reason: classification.reason.clone(),
                    suggestion: Some(classification.clone()),
                });
                hooks.log(&format!(
                    "Moved to manual review: {} ({})",
                    doc.name, classification.reason
                ));
                Ok(())
            }
        }
    }

    /// Build the folder chain, move the document in, rename it to carry
    /// its type and fault codes.
    async fn file_document(
        &self,
        doc: &RemoteEntry,
        category: &str,
        doc_type: DocType,
        classification: &Classification,
        summary: &mut RunSummary,
    ) -> Result<(), SorterError> {
        let brand = sanitize_folder_name(&classification.brand)?;
        let model = sanitize_folder_name(&classification.model)?;

        let mut parent = self
            .store
            .create_folder_if_absent(&self.root_id, category)
            .await?;
        for segment in [brand.as_str(), model.as_str(), doc_type.as_str()] {
            parent = self.store.create_folder_if_absent(&parent, segment).await?;
        }

        self.store.move_file(&doc.id, &parent).await?;
        self.store
            .rename_file(&doc.id, &filed_name(&doc.name, doc_type, &classification.fault_codes))
            .await?;

        summary.sorted += 1;
        *summary.category_counts.entry(category.to_string()).or_default() += 1;
        *summary.brand_counts.entry(brand).or_default() += 1;
        *summary
            .type_counts
            .entry(doc_type.as_str().to_string())
            .or_default() += 1;
        Ok(())
    }

    async fn move_to_quarantine(&self, id: &str, folder: &str) -> Result<(), SorterError> {
        let folder_id = self
            .store
            .create_folder_if_absent(&self.root_id, folder)
            .await?;
        self.store.move_file(id, &folder_id).await?;
        Ok(())
    }
}

/// Already handled by a previous run: a category folder or a quarantine
/// folder directly under the root.
fn is_triaged_folder(name: &str) -> bool {
    crate::classify::Category::from_str(name).is_some() || QUARANTINE_FOLDERS.contains(&name)
}

/// Only PDFs and images are sorter candidates; the canonical index object
/// and anything else are left where they are.
fn is_candidate(entry: &RemoteEntry) -> bool {
    if entry.name == INDEX_FILE_NAME {
        return false;
    }
    entry.mime_type == "application/pdf" || entry.mime_type.starts_with("image/")
}

/// Strip path-unsafe characters from a brand/model folder segment and
/// normalize whitespace to underscores.
pub fn sanitize_folder_name(name: &str) -> Result<String, SorterError> {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    if cleaned.is_empty() {
        return Err(SorterError::EmptyFolderName(name.to_string()));
    }
    Ok(cleaned)
}

/// Display name for a filed document: the original stem, the document type
/// in capitals, and any fault codes, capped for store limits.
pub fn filed_name(original: &str, doc_type: DocType, fault_codes: &[String]) -> String {
    // An "extension" longer than the name cap is not worth preserving
    let (stem, ext) = match original.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() + 1 < MAX_FILED_NAME => {
            (stem, Some(ext))
        }
        _ => (original, None),
    };

    let mut name = format!("{}_{}", stem, doc_type.as_str().to_uppercase());
    if !fault_codes.is_empty() {
        name.push('_');
        name.push_str(&fault_codes.join("_"));
    }
    let mut name: String = name
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();

    let limit = MAX_FILED_NAME.saturating_sub(ext.map(|e| e.len() + 1).unwrap_or(0));
    if name.chars().count() > limit {
        name = name.chars().take(limit).collect();
    }
    match ext {
        Some(ext) => format!("{}.{}", name, ext),
        None => name,
    }
}
