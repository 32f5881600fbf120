//! Path-derived index metadata.
//!
//! The filing convention stores classification in the folder chain
//! (`category/brand/model/docType`), so indexing reads it back from the
//! path instead of re-classifying. Files that sit shallower than the
//! convention (quarantine, holding folders, loose uploads) fall back to
//! filename heuristics.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classify::{DocType, GENERIC_MODEL, UNKNOWN_BRAND};

/// Category recorded for files not under a recognized folder chain.
pub const UNSORTED_CATEGORY: &str = "Unsorted";

static FAULT_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"E\d+").expect("Invalid regex"));

/// Metadata carried by a file's location and name.
///
/// Plain strings rather than the fixed enums: quarantine folders and
/// free-text brand/model segments are legitimate values here.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMeta {
    pub category: String,
    pub brand: String,
    pub model: String,
    pub doc_type: String,
    pub fault_codes: Vec<String>,
}

/// Derive metadata from the folder segments between the library root
/// (exclusive) and the file, plus the filename.
pub fn derive(segments: &[String], file_name: &str) -> PathMeta {
    let fault_codes = fault_codes_from_name(file_name);

    if segments.len() >= 4 {
        return PathMeta {
            category: segments[0].clone(),
            brand: segments[1].clone(),
            model: segments[2].clone(),
            doc_type: segments[3].clone(),
            fault_codes,
        };
    }

    if segments.len() == 3 {
        return PathMeta {
            category: segments[0].clone(),
            brand: segments[1].clone(),
            model: segments[2].clone(),
            doc_type: doc_type_from_name(file_name).as_str().to_string(),
            fault_codes,
        };
    }

    let (brand, model) = brand_model_from_name(file_name);
    PathMeta {
        category: segments
            .first()
            .cloned()
            .unwrap_or_else(|| UNSORTED_CATEGORY.to_string()),
        brand,
        model,
        doc_type: doc_type_from_name(file_name).as_str().to_string(),
        fault_codes,
    }
}

/// Guess a document type from filename keywords, Greek or English.
/// Most specific first; `General_Manual` when nothing matches.
pub fn doc_type_from_name(file_name: &str) -> DocType {
    let upper = crate::text::uppercase_folded(file_name);
    let contains_any = |needles: &[&str]| needles.iter().any(|n| upper.contains(n));

    if contains_any(&["ERROR", "CODE", "ΣΦΑΛΜ", "ΒΛΑΒ"]) {
        DocType::ErrorCodes
    } else if contains_any(&["PART", "ΑΝΤΑΛΛ"]) {
        DocType::SparePartsList
    } else if contains_any(&["SERVICE", "ΣΕΡΒΙΣ"]) {
        DocType::ServiceManual
    } else if contains_any(&["INSTALL", "ΕΓΚΑΤ"]) {
        DocType::InstallationManual
    } else if contains_any(&["TECH", "DATA", "ΤΕΧΝ"]) {
        DocType::TechnicalData
    } else if contains_any(&["USER", "ΧΡΗΣ"]) {
        DocType::UserManual
    } else {
        DocType::GeneralManual
    }
}

/// Fault codes embedded in a filename (E-prefixed numbers), deduplicated
/// in order of appearance.
pub fn fault_codes_from_name(file_name: &str) -> Vec<String> {
    let upper = crate::text::uppercase_folded(file_name);
    let mut codes: Vec<String> = Vec::new();
    for m in FAULT_CODE.find_iter(&upper) {
        let code = m.as_str().to_string();
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}

/// Best-effort brand/model from the filename stem: first two tokens of an
/// underscore/hyphen/space split, skipping purely numeric leads.
fn brand_model_from_name(file_name: &str) -> (String, String) {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _ext)| stem)
        .unwrap_or(file_name);

    let tokens: Vec<&str> = stem
        .split(['_', '-', ' '])
        .filter(|t| !t.is_empty())
        .collect();

    let brand = tokens
        .first()
        .filter(|t| t.chars().any(|c| c.is_alphabetic()))
        .map(|t| t.to_string())
        .unwrap_or_else(|| UNKNOWN_BRAND.to_string());
    let model = tokens
        .get(1)
        .map(|t| t.to_string())
        .unwrap_or_else(|| GENERIC_MODEL.to_string());

    (brand, model)
}
