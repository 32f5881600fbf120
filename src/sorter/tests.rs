//! End-to-end sorter scenarios over the in-memory store and a scripted
//! classifier.

use std::collections::HashMap;
use std::sync::Arc;

use super::*;
use crate::classify::{Category, Classification, Classifier, ClassifyInput, DocType};
use crate::error::{ClassifyError, SorterError};
use crate::store::{MemoryObjectStore, ObjectStore};
use async_trait::async_trait;

enum Answer {
    Classified(Classification),
    Fail,
}

/// Classifier scripted per filename; unknown names get the default answer.
struct FakeClassifier {
    answers: HashMap<String, Answer>,
    default: Classification,
}

impl FakeClassifier {
    fn new() -> Self {
        Self {
            answers: HashMap::new(),
            default: daikin_user_manual(),
        }
    }

    fn answer(mut self, name: &str, classification: Classification) -> Self {
        self.answers
            .insert(name.to_string(), Answer::Classified(classification));
        self
    }

    fn failing(mut self, name: &str) -> Self {
        self.answers.insert(name.to_string(), Answer::Fail);
        self
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, input: &ClassifyInput<'_>) -> Result<Classification, ClassifyError> {
        match self.answers.get(input.file_name) {
            Some(Answer::Classified(c)) => Ok(c.clone()),
            Some(Answer::Fail) => Err(ClassifyError::Api {
                status: 503,
                message: "scripted failure".to_string(),
            }),
            None => Ok(self.default.clone()),
        }
    }

    async fn select_backing_model(&self) -> Result<String, ClassifyError> {
        Ok("models/fake".to_string())
    }
}

fn classification(
    category: Option<Category>,
    brand: &str,
    model: &str,
    doc_type: Option<DocType>,
    fault_codes: &[&str],
) -> Classification {
    Classification {
        category,
        brand: brand.to_string(),
        model: model.to_string(),
        doc_type,
        fault_codes: fault_codes.iter().map(|c| c.to_string()).collect(),
        reason: "scripted".to_string(),
    }
}

fn daikin_user_manual() -> Classification {
    classification(
        Some(Category::AirConditioning),
        "Daikin",
        "FTXS35",
        Some(DocType::UserManual),
        &["E3"],
    )
}

fn sorter(store: Arc<MemoryObjectStore>, classifier: FakeClassifier) -> SorterService {
    let root = store.root_id();
    SorterService::new(store, Arc::new(classifier), root)
}

async fn child_id(store: &MemoryObjectStore, parent: &str, name: &str) -> Option<String> {
    store
        .list_children(parent)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == name)
        .map(|c| c.id)
}

async fn names_in(store: &MemoryObjectStore, folder: &str) -> Vec<String> {
    store
        .list_children(folder)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect()
}

/// Walk the Air_Conditioning/Daikin/FTXS35/User_Manual chain.
async fn filed_chain(store: &MemoryObjectStore, root: &str) -> Option<String> {
    let mut parent = root.to_string();
    for segment in ["Air_Conditioning", "Daikin", "FTXS35", "User_Manual"] {
        parent = child_id(store, &parent, segment).await?;
    }
    Some(parent)
}

#[tokio::test]
async fn test_identical_pair_files_one_and_quarantines_the_other() {
    let store = Arc::new(MemoryObjectStore::new());
    let root = store.root_id();
    store.upload(b"%PDF-same".to_vec(), "a.pdf", &root).await.unwrap();
    store.upload(b"%PDF-same".to_vec(), "b.pdf", &root).await.unwrap();

    let sorter = sorter(store.clone(), FakeClassifier::new());
    let summary = sorter
        .run(false, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.sorted, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.duplicate_files[0].name, "b.pdf");
    assert_eq!(summary.duplicate_files[0].original_name, "a.pdf");

    let type_folder = filed_chain(&store, &root).await.unwrap();
    assert_eq!(names_in(&store, &type_folder).await, vec!["a_USER_MANUAL_E3.pdf"]);

    let dup_folder = child_id(&store, &root, DUPLICATES_FOLDER).await.unwrap();
    assert_eq!(
        names_in(&store, &dup_folder).await,
        vec!["b.pdf_DUPLICATE_OF_a.pdf"]
    );
}

#[tokio::test]
async fn test_rerun_without_force_files_nothing_more() {
    let store = Arc::new(MemoryObjectStore::new());
    let root = store.root_id();
    store.upload(b"%PDF-one".to_vec(), "a.pdf", &root).await.unwrap();

    let sorter = sorter(store.clone(), FakeClassifier::new());
    let first = sorter
        .run(false, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap();
    assert_eq!(first.sorted, 1);

    let second = sorter
        .run(false, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap();
    assert_eq!(second.scanned, 0);
    assert_eq!(second.sorted, 0);
}

#[tokio::test]
async fn test_force_full_rescan_revisits_filed_documents() {
    let store = Arc::new(MemoryObjectStore::new());
    let root = store.root_id();
    store.upload(b"%PDF-one".to_vec(), "a.pdf", &root).await.unwrap();

    let sorter = sorter(store.clone(), FakeClassifier::new());
    sorter
        .run(false, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap();

    let again = sorter
        .run(true, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap();
    assert_eq!(again.scanned, 1);
    assert_eq!(again.sorted, 1);
}

#[tokio::test]
async fn test_classifier_failure_is_isolated_to_its_document() {
    let store = Arc::new(MemoryObjectStore::new());
    let root = store.root_id();
    store.upload(b"%PDF-bad".to_vec(), "bad.pdf", &root).await.unwrap();
    store.upload(b"%PDF-good".to_vec(), "good.pdf", &root).await.unwrap();

    let classifier = FakeClassifier::new().failing("bad.pdf");
    let sorter = sorter(store.clone(), classifier);
    let summary = sorter
        .run(false, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap();

    assert_eq!(summary.sorted, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].name, "bad.pdf");
    assert!(summary.failed[0].error.contains("503"));

    let error_folder = child_id(&store, &root, ERROR_FOLDER).await.unwrap();
    assert_eq!(names_in(&store, &error_folder).await, vec!["bad.pdf"]);
    assert!(filed_chain(&store, &root).await.is_some());
}

#[tokio::test]
async fn test_partial_resolution_goes_to_manual_review_with_suggestion() {
    let store = Arc::new(MemoryObjectStore::new());
    let root = store.root_id();
    store.upload(b"%PDF-x".to_vec(), "odd.pdf", &root).await.unwrap();

    let partial = classification(
        Some(Category::HeatingBoilers),
        "Vaillant",
        "General_Model",
        Some(DocType::ServiceManual),
        &[],
    );
    let sorter = sorter(store.clone(), FakeClassifier::new().answer("odd.pdf", partial));
    let summary = sorter
        .run(false, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap();

    assert_eq!(summary.manual_review, 1);
    assert_eq!(summary.sorted, 0);
    let record = &summary.manual_review_files[0];
    assert_eq!(record.name, "odd.pdf");
    let suggestion = record.suggestion.as_ref().unwrap();
    assert_eq!(suggestion.brand, "Vaillant");
    assert_eq!(suggestion.doc_type, Some(DocType::ServiceManual));

    let review = child_id(&store, &root, MANUAL_REVIEW_FOLDER).await.unwrap();
    assert_eq!(names_in(&store, &review).await, vec!["odd.pdf"]);
}

#[tokio::test]
async fn test_unrecognized_documents_are_quarantined_as_irrelevant() {
    let store = Arc::new(MemoryObjectStore::new());
    let root = store.root_id();
    store.upload(b"%PDF-menu".to_vec(), "menu.pdf", &root).await.unwrap();
    store.upload(b"%PDF-blank".to_vec(), "blank.pdf", &root).await.unwrap();

    // Out-of-vocabulary category, and a valid category with nothing else
    let classifier = FakeClassifier::new()
        .answer("menu.pdf", Classification::unresolved("restaurant menu"))
        .answer(
            "blank.pdf",
            classification(Some(Category::OtherHvac), "Unknown", "General_Model", None, &[]),
        );
    let sorter = sorter(store.clone(), classifier);
    let summary = sorter
        .run(false, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap();

    assert_eq!(summary.irrelevant, 2);
    let menu = summary
        .irrelevant_files
        .iter()
        .find(|f| f.name == "menu.pdf")
        .unwrap();
    assert_eq!(menu.reason, "restaurant menu");

    let folder = child_id(&store, &root, IRRELEVANT_FOLDER).await.unwrap();
    let mut names = names_in(&store, &folder).await;
    names.sort();
    assert_eq!(names, vec!["blank.pdf", "menu.pdf"]);
}

#[tokio::test]
async fn test_cancellation_stops_after_the_current_document() {
    let store = Arc::new(MemoryObjectStore::new());
    let root = store.root_id();
    store.upload(b"%PDF-1".to_vec(), "a.pdf", &root).await.unwrap();
    store.upload(b"%PDF-2".to_vec(), "b.pdf", &root).await.unwrap();

    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    let hooks = RunHooks::silent().with_progress(move |current, _total, _msg| {
        if current == 1 {
            trigger.cancel();
        }
    });

    let sorter = sorter(store, FakeClassifier::new());
    let summary = sorter.run(false, &cancel, &hooks).await.unwrap();

    assert_eq!(summary.status, RunStatus::Canceled);
    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.sorted, 1);
}

#[tokio::test]
async fn test_cancel_before_start_processes_nothing() {
    let store = Arc::new(MemoryObjectStore::new());
    let root = store.root_id();
    store.upload(b"%PDF-1".to_vec(), "a.pdf", &root).await.unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();

    let sorter = sorter(store, FakeClassifier::new());
    let summary = sorter
        .run(false, &cancel, &RunHooks::silent())
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Canceled);
    assert_eq!(summary.sorted, 0);
}

#[tokio::test]
async fn test_upload_lands_in_holding_folder_and_gets_triaged() {
    let store = Arc::new(MemoryObjectStore::new());
    let root = store.root_id();

    let sorter = sorter(store.clone(), FakeClassifier::new());
    let entry = sorter
        .upload_document(b"%PDF-upload".to_vec(), "scan.pdf")
        .await
        .unwrap();
    assert_eq!(entry.name, "scan.pdf");

    let holding = child_id(&store, &root, UPLOADS_FOLDER).await.unwrap();
    assert_eq!(names_in(&store, &holding).await, vec!["scan.pdf"]);

    let summary = sorter
        .run(false, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap();
    assert_eq!(summary.sorted, 1);
    assert!(names_in(&store, &holding).await.is_empty());
}

#[tokio::test]
async fn test_non_candidate_files_are_ignored() {
    let store = Arc::new(MemoryObjectStore::new());
    let root = store.root_id();
    store
        .upload(b"[]".to_vec(), crate::sync::INDEX_FILE_NAME, &root)
        .await
        .unwrap();
    store.upload(b"notes".to_vec(), "notes.txt", &root).await.unwrap();

    let sorter = sorter(store, FakeClassifier::new());
    let summary = sorter
        .run(false, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap();
    assert_eq!(summary.scanned, 0);
}

#[tokio::test]
async fn test_missing_root_aborts_the_run() {
    let store = Arc::new(MemoryObjectStore::new());
    let sorter = SorterService::new(store, Arc::new(FakeClassifier::new()), "");
    let err = sorter
        .run(false, &CancelFlag::new(), &RunHooks::silent())
        .await
        .unwrap_err();
    assert!(matches!(err, SorterError::MissingRoot));
}

#[test]
fn test_sanitize_folder_name_strips_unsafe_characters() {
    assert_eq!(sanitize_folder_name("Daikin Europe N.V.").unwrap(), "Daikin_Europe_N.V.");
    assert_eq!(sanitize_folder_name("A/C: *indoor*?").unwrap(), "AC_indoor");
    assert!(matches!(
        sanitize_folder_name("///"),
        Err(SorterError::EmptyFolderName(_))
    ));
}

#[test]
fn test_filed_name_embeds_type_and_codes() {
    assert_eq!(
        filed_name("ftxs35 manual.pdf", DocType::UserManual, &["E3".to_string()]),
        "ftxs35_manual_USER_MANUAL_E3.pdf"
    );
    assert_eq!(
        filed_name("boiler", DocType::TechnicalData, &[]),
        "boiler_TECHNICAL_DATA"
    );
}

#[test]
fn test_filed_name_is_capped_but_keeps_extension() {
    let long = format!("{}.pdf", "x".repeat(400));
    let name = filed_name(&long, DocType::ServiceManual, &[]);
    assert!(name.chars().count() <= 200 + ".pdf".len());
    assert!(name.ends_with(".pdf"));
}

#[test]
fn test_filed_name_with_oversized_extension_is_capped_whole() {
    // A dot followed by 250 characters is not a real extension
    let odd = format!("a.{}", "x".repeat(250));
    let name = filed_name(&odd, DocType::UserManual, &[]);
    assert!(name.chars().count() <= 200);
    assert!(name.starts_with("a.x"));
}
