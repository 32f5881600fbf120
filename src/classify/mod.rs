//! Document classification.
//!
//! The fixed category/document-type vocabulary, the structured
//! classification result, and the [`Classifier`] seam the sorter calls
//! through. The remote implementation lives in [`gemini`]; tests plug in
//! fakes.

pub mod extract;
pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClassifyError;

pub use gemini::GeminiClassifier;

/// Brand marker the classifier returns when it cannot name a manufacturer.
pub const UNKNOWN_BRAND: &str = "Unknown";

/// Model marker the classifier returns when no specific model is named.
pub const GENERIC_MODEL: &str = "General_Model";

/// Top-level library category. Values double as folder names, so the
/// serialized form is the exact path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Heating_Boilers")]
    HeatingBoilers,
    #[serde(rename = "Heat_Pumps")]
    HeatPumps,
    #[serde(rename = "Air_Conditioning")]
    AirConditioning,
    #[serde(rename = "Solar_Systems")]
    SolarSystems,
    #[serde(rename = "Water_Heaters")]
    WaterHeaters,
    #[serde(rename = "Thermostats_Controllers")]
    ThermostatsControllers,
    #[serde(rename = "Spare_Parts_Valves")]
    SparePartsValves,
    #[serde(rename = "Other_HVAC")]
    OtherHvac,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::HeatingBoilers,
        Category::HeatPumps,
        Category::AirConditioning,
        Category::SolarSystems,
        Category::WaterHeaters,
        Category::ThermostatsControllers,
        Category::SparePartsValves,
        Category::OtherHvac,
    ];

    /// Folder-name form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::HeatingBoilers => "Heating_Boilers",
            Category::HeatPumps => "Heat_Pumps",
            Category::AirConditioning => "Air_Conditioning",
            Category::SolarSystems => "Solar_Systems",
            Category::WaterHeaters => "Water_Heaters",
            Category::ThermostatsControllers => "Thermostats_Controllers",
            Category::SparePartsValves => "Spare_Parts_Valves",
            Category::OtherHvac => "Other_HVAC",
        }
    }

    /// Parse a folder name or classifier answer; tolerant of case and
    /// surrounding whitespace, `None` for anything outside the vocabulary.
    pub fn from_str(s: &str) -> Option<Category> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

/// Document type within a model folder. Serialized form is the folder name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocType {
    #[serde(rename = "User_Manual")]
    UserManual,
    #[serde(rename = "Service_Manual")]
    ServiceManual,
    #[serde(rename = "Installation_Manual")]
    InstallationManual,
    #[serde(rename = "Technical_Data")]
    TechnicalData,
    #[serde(rename = "Error_Codes")]
    ErrorCodes,
    #[serde(rename = "Spare_Parts_List")]
    SparePartsList,
    #[serde(rename = "General_Manual")]
    GeneralManual,
}

impl DocType {
    pub const ALL: [DocType; 7] = [
        DocType::UserManual,
        DocType::ServiceManual,
        DocType::InstallationManual,
        DocType::TechnicalData,
        DocType::ErrorCodes,
        DocType::SparePartsList,
        DocType::GeneralManual,
    ];

    /// Folder-name form.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::UserManual => "User_Manual",
            DocType::ServiceManual => "Service_Manual",
            DocType::InstallationManual => "Installation_Manual",
            DocType::TechnicalData => "Technical_Data",
            DocType::ErrorCodes => "Error_Codes",
            DocType::SparePartsList => "Spare_Parts_List",
            DocType::GeneralManual => "General_Manual",
        }
    }

    /// Parse a folder name or classifier answer; `None` outside the
    /// vocabulary.
    pub fn from_str(s: &str) -> Option<DocType> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
    }
}

/// Structured classification of one document.
///
/// `category`/`doc_type` are `None` when the answer fell outside the fixed
/// vocabulary; brand and model carry the unresolved markers instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub category: Option<Category>,
    pub brand: String,
    pub model: String,
    pub doc_type: Option<DocType>,
    #[serde(default)]
    pub fault_codes: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

impl Classification {
    /// Low-confidence placeholder: nothing resolved, reason attached.
    pub fn unresolved(reason: impl Into<String>) -> Self {
        Self {
            category: None,
            brand: UNKNOWN_BRAND.to_string(),
            model: GENERIC_MODEL.to_string(),
            doc_type: None,
            fault_codes: Vec::new(),
            reason: reason.into(),
        }
    }

    pub fn brand_resolved(&self) -> bool {
        let brand = self.brand.trim();
        !brand.is_empty() && !brand.eq_ignore_ascii_case(UNKNOWN_BRAND)
    }

    pub fn model_resolved(&self) -> bool {
        let model = self.model.trim();
        !model.is_empty() && !model.eq_ignore_ascii_case(GENERIC_MODEL)
    }
}

/// Everything the classifier gets to look at for one document.
pub struct ClassifyInput<'a> {
    pub file_name: &'a str,
    /// Bounded text snippet; empty when extraction produced nothing.
    pub text_snippet: &'a str,
    /// Raw bytes for vision-capable input (images, scanned PDFs).
    pub bytes: Option<&'a [u8]>,
    pub mime_type: &'a str,
}

/// External classification service.
///
/// Injectable so runs can be tested without network access. One call per
/// document, no internal retry; a failed call routes that document to the
/// error folder and the run continues.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one document.
    async fn classify(&self, input: &ClassifyInput<'_>) -> Result<Classification, ClassifyError>;

    /// Name of the backing model this instance calls, discovering and
    /// caching it on first use.
    async fn select_backing_model(&self) -> Result<String, ClassifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_str(category.as_str()), Some(category));
        }
    }

    #[test]
    fn test_category_from_str_tolerates_case_and_whitespace() {
        assert_eq!(Category::from_str(" heat_pumps "), Some(Category::HeatPumps));
        assert_eq!(Category::from_str("other_hvac"), Some(Category::OtherHvac));
        assert_eq!(Category::from_str("Refrigeration"), None);
        assert_eq!(Category::from_str(""), None);
    }

    #[test]
    fn test_doc_type_round_trip() {
        for doc_type in DocType::ALL {
            assert_eq!(DocType::from_str(doc_type.as_str()), Some(doc_type));
        }
        assert_eq!(DocType::from_str("Quick_Start"), None);
    }

    #[test]
    fn test_serialized_form_is_folder_name() {
        let json = serde_json::to_string(&Category::AirConditioning).unwrap();
        assert_eq!(json, "\"Air_Conditioning\"");
        let json = serde_json::to_string(&DocType::SparePartsList).unwrap();
        assert_eq!(json, "\"Spare_Parts_List\"");
    }

    #[test]
    fn test_unresolved_placeholder() {
        let c = Classification::unresolved("no text");
        assert!(c.category.is_none());
        assert!(!c.brand_resolved());
        assert!(!c.model_resolved());
        assert!(c.doc_type.is_none());
        assert_eq!(c.reason, "no text");
    }

    #[test]
    fn test_resolution_markers_are_case_insensitive() {
        let mut c = Classification::unresolved("");
        c.brand = "unknown".to_string();
        c.model = "general_model".to_string();
        assert!(!c.brand_resolved());
        assert!(!c.model_resolved());

        c.brand = "Vaillant".to_string();
        c.model = "ecoTEC plus".to_string();
        assert!(c.brand_resolved());
        assert!(c.model_resolved());
    }
}
