//! Intent-aware retrieval over the library index.
//!
//! Filters index entries by brand/model and orders them by how well their
//! document type serves the query's intent. The intent keyword sets and
//! the scoring table are static data; matching is plain containment, with
//! Greek diacritics folded so accented queries hit the unaccented keywords.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::classify::UNKNOWN_BRAND;
use crate::sync::IndexEntry;
use crate::text::uppercase_folded;

/// Coarse reading of what a free-text query is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryIntent {
    Fault,
    Installation,
    EndUser,
    SpareParts,
    General,
}

/// Document-type family an index entry belongs to for scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DocClass {
    Service,
    Installation,
    User,
    Spare,
    Technical,
    Other,
}

/// Keyword sets per intent, Greek and English, checked in order. First
/// match wins; no match means a general query.
static INTENT_KEYWORDS: &[(QueryIntent, &[&str])] = &[
    (
        QueryIntent::Fault,
        &["ERROR", "ΒΛΑΒΗ", "ΣΦΑΛΜΑ", "FAULT", "CODE", "ΚΩΔΙΚΟΣ", "FIX", "PROBLEM"],
    ),
    (
        QueryIntent::Installation,
        &["INSTALL", "ΕΓΚΑΤΑΣΤΑΣΗ", "ΣΥΝΔΕΣΗ", "PIPE", "WIRING", "ΔΙΑΣΤΑΣΕΙΣ"],
    ),
    (
        QueryIntent::EndUser,
        &["USER", "ΧΡΗΣΗ", "ΟΔΗΓΙΕΣ", "RESET", "ΚΟΥΜΠΙ", "MODE", "ECO"],
    ),
    (
        QueryIntent::SpareParts,
        &["PART", "ΑΝΤΑΛΛΑΚΤΙΚ", "SPARE", "VALVE", "PCB", "SENSOR", "ΑΙΣΘΗΤΗΡ", "ΤΙΜΗ"],
    ),
];

/// Relevance of each document-type family to each intent. Pairs absent
/// from the table score zero.
static SCORES: Lazy<HashMap<(QueryIntent, DocClass), i32>> = Lazy::new(|| {
    use DocClass::*;
    HashMap::from([
        ((QueryIntent::SpareParts, Spare), 100),
        ((QueryIntent::SpareParts, Service), 50),
        ((QueryIntent::SpareParts, Installation), 10),
        ((QueryIntent::SpareParts, User), 10),
        ((QueryIntent::SpareParts, Technical), 10),
        ((QueryIntent::SpareParts, Other), 10),
        ((QueryIntent::Fault, Service), 100),
        ((QueryIntent::Fault, Installation), 90),
        ((QueryIntent::Fault, User), 40),
        ((QueryIntent::Fault, Spare), 10),
        ((QueryIntent::Installation, Installation), 100),
        ((QueryIntent::Installation, Technical), 80),
        ((QueryIntent::Installation, Service), 60),
        ((QueryIntent::EndUser, User), 100),
        ((QueryIntent::EndUser, Installation), 50),
        ((QueryIntent::General, Service), 90),
        ((QueryIntent::General, Installation), 80),
        ((QueryIntent::General, User), 70),
        ((QueryIntent::General, Spare), 20),
    ])
});

/// Classify a free-text query by keyword membership.
pub fn detect_intent(query: &str) -> QueryIntent {
    let folded = uppercase_folded(query);
    for (intent, keywords) in INTENT_KEYWORDS {
        if keywords.iter().any(|k| folded.contains(k)) {
            return *intent;
        }
    }
    QueryIntent::General
}

fn doc_class(doc_type: &str) -> DocClass {
    let upper = uppercase_folded(doc_type);
    if upper.contains("SPARE") {
        DocClass::Spare
    } else if upper.contains("SERVICE") {
        DocClass::Service
    } else if upper.contains("INSTALLATION") {
        DocClass::Installation
    } else if upper.contains("USER") {
        DocClass::User
    } else if upper.contains("TECHNICAL") {
        DocClass::Technical
    } else {
        DocClass::Other
    }
}

fn score(intent: QueryIntent, entry: &IndexEntry) -> i32 {
    SCORES
        .get(&(intent, doc_class(&entry.doc_type)))
        .copied()
        .unwrap_or(0)
}

/// Brand-filtered, intent-ranked candidates for a query.
///
/// Brand matches exactly (case-insensitive); a non-empty model keyword
/// must appear in the entry's model. The sort is stable, so equal scores
/// keep their index order.
pub fn rank(
    index: &[IndexEntry],
    brand: &str,
    model_keyword: &str,
    query: &str,
) -> Vec<IndexEntry> {
    let target_brand = brand.to_uppercase();
    let target_model = model_keyword.trim().to_uppercase();

    let mut candidates: Vec<IndexEntry> = index
        .iter()
        .filter(|e| e.brand.to_uppercase() == target_brand)
        .filter(|e| target_model.is_empty() || e.model.to_uppercase().contains(&target_model))
        .cloned()
        .collect();

    let intent = detect_intent(query);
    tracing::debug!("[Retrieval] Intent {:?} for query {:?}", intent, query);

    candidates.sort_by_key(|e| std::cmp::Reverse(score(intent, e)));
    candidates
}

/// Keyword containment search over the whole index: every query token
/// must appear somewhere in the entry's path, metadata or fault codes.
/// Entry order is preserved; there is no scoring here.
pub fn search(index: &[IndexEntry], query: &str) -> Vec<IndexEntry> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(uppercase_folded)
        .collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    index
        .iter()
        .filter(|e| {
            let haystack = uppercase_folded(&format!(
                "{} {} {} {} {} {}",
                e.path,
                e.brand,
                e.model,
                e.doc_type,
                e.fault_codes.join(" "),
                e.original_name
            ));
            tokens.iter().all(|t| haystack.contains(t))
        })
        .cloned()
        .collect()
}

/// Distinct brands present in the index, uppercased and sorted, without
/// the unresolved marker.
pub fn brands(index: &[IndexEntry]) -> Vec<String> {
    let mut brands: Vec<String> = index
        .iter()
        .map(|e| e.brand.to_uppercase())
        .filter(|b| !b.is_empty() && b != &UNKNOWN_BRAND.to_uppercase())
        .collect();
    brands.sort();
    brands.dedup();
    brands
}
