//! Gemini-backed classification.
//!
//! Low-level [`GeminiClient`] (model discovery + JSON-mode generateContent)
//! and the [`Classifier`] implementation on top of it. The client is shared
//! with the diagnostics service, which reuses the same discovery and call
//! path for checklist generation.

use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;

use super::extract::{extract_json_object, prepare_image_for_vision};
use super::{Category, Classification, Classifier, ClassifyInput, DocType};
use crate::config::LibraryConfig;
use crate::error::ClassifyError;
use async_trait::async_trait;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Output cap for classification answers; the JSON is small.
const CLASSIFY_MAX_TOKENS: u32 = 500;

/// Generation method a model must advertise to be usable.
const GENERATE_METHOD: &str = "generateContent";

/// Low-level provider client.
///
/// Discovers a usable model once per instance and caches it; every
/// generation call is one request with no retry.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: OnceCell<String>,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ClassifyError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: OnceCell::new(),
        })
    }

    pub fn from_config(config: &LibraryConfig) -> Result<Self, ClassifyError> {
        Self::new(config.classifier_url.clone(), config.classifier_key.clone())
    }

    /// Resolve the backing model, discovering it on first call.
    pub async fn resolve_model(&self) -> Result<String, ClassifyError> {
        let model = self
            .model
            .get_or_try_init(|| self.discover_model())
            .await?;
        Ok(model.clone())
    }

    async fn discover_model(&self) -> Result<String, ClassifyError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| ClassifyError::Parse(e.to_string()))?;

        let model = pick_model(&list.models).ok_or(ClassifyError::NoUsableModel)?;
        tracing::info!("[Classifier] Using model {}", model);
        Ok(model)
    }

    /// One JSON-mode generation call; returns the raw response text.
    pub(crate) async fn generate_json(
        &self,
        parts: Vec<Part>,
        max_output_tokens: u32,
    ) -> Result<String, ClassifyError> {
        let model = self.resolve_model().await?;

        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens,
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(format!("{}/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Parse(e.to_string()))?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ClassifyError::Parse("no candidates in response".to_string()));
        }
        Ok(text)
    }
}

/// Prefer the fast tier, then pro, then anything that can generate.
fn pick_model(models: &[ModelInfo]) -> Option<String> {
    let usable: Vec<&ModelInfo> = models
        .iter()
        .filter(|m| {
            m.supported_generation_methods
                .iter()
                .any(|method| method == GENERATE_METHOD)
        })
        .collect();

    for needle in ["flash", "pro"] {
        if let Some(m) = usable.iter().find(|m| m.name.contains(needle)) {
            return Some(m.name.clone());
        }
    }
    usable.first().map(|m| m.name.clone())
}

/// [`Classifier`] backed by [`GeminiClient`].
pub struct GeminiClassifier {
    client: GeminiClient,
}

impl GeminiClassifier {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &LibraryConfig) -> Result<Self, ClassifyError> {
        Ok(Self::new(GeminiClient::from_config(config)?))
    }

    fn build_parts(&self, input: &ClassifyInput<'_>) -> Vec<Part> {
        let mut parts = vec![Part::text(classification_prompt(
            input.file_name,
            input.text_snippet,
        ))];

        if let Some(bytes) = input.bytes {
            if input.mime_type.starts_with("image/") {
                match prepare_image_for_vision(bytes) {
                    Ok(jpeg) => parts.push(Part::inline("image/jpeg", &jpeg)),
                    Err(reason) => {
                        // Unreadable image: classify from the filename alone
                        tracing::warn!("[Classifier] Image preparation failed: {}", reason);
                    }
                }
            } else if input.mime_type == "application/pdf" && input.text_snippet.is_empty() {
                // Scanned PDF with no text layer; let vision read the pages
                parts.push(Part::inline("application/pdf", bytes));
            }
        }

        parts
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, input: &ClassifyInput<'_>) -> Result<Classification, ClassifyError> {
        let parts = self.build_parts(input);
        let text = self.client.generate_json(parts, CLASSIFY_MAX_TOKENS).await?;
        parse_classification(&text)
    }

    async fn select_backing_model(&self) -> Result<String, ClassifyError> {
        self.client.resolve_model().await
    }
}

fn classification_prompt(file_name: &str, snippet: &str) -> String {
    let categories = Category::ALL.map(|c| c.as_str()).join(", ");
    let doc_types = DocType::ALL.map(|t| t.as_str()).join(", ");

    format!(
        r#"You are filing a technical document into an HVAC service company's manual library. The document may be in Greek or English.

Filename: {file_name}

Document text (may be empty for scanned files):
{snippet}

Respond with ONLY a JSON object:
{{
  "category": one of [{categories}], or null if this is not an HVAC technical document,
  "brand": the manufacturer name as the manufacturer spells it, or "Unknown",
  "model": the specific model or series designation, or "General_Model",
  "documentType": one of [{doc_types}], or null if unclear,
  "faultCodes": error/fault codes the document covers, e.g. ["E3", "F28"], or [],
  "reason": one short sentence explaining the decision
}}"#
    )
}

/// Parse the provider's JSON answer into a [`Classification`].
///
/// Unparsable responses are a [`ClassifyError::Parse`]; a parsed answer
/// with null or out-of-vocabulary fields maps to the unresolved markers
/// and drives the review/irrelevant routing instead.
fn parse_classification(text: &str) -> Result<Classification, ClassifyError> {
    let json = extract_json_object(text).map_err(ClassifyError::Parse)?;
    let raw: RawClassification =
        serde_json::from_str(&json).map_err(|e| ClassifyError::Parse(e.to_string()))?;

    let category = raw.category.as_deref().and_then(Category::from_str);
    let doc_type = raw.document_type.as_deref().and_then(DocType::from_str);
    let brand = raw
        .brand
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| super::UNKNOWN_BRAND.to_string());
    let model = raw
        .model
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| super::GENERIC_MODEL.to_string());
    let fault_codes = raw
        .fault_codes
        .into_iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();

    Ok(Classification {
        category,
        brand,
        model,
        doc_type,
        fault_codes,
        reason: raw.reason.unwrap_or_default(),
    })
}

// Wire types

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClassification {
    category: Option<String>,
    brand: Option<String>,
    model: Option<String>,
    #[serde(alias = "doc_type")]
    document_type: Option<String>,
    #[serde(default, alias = "fault_codes")]
    fault_codes: Vec<String>,
    reason: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub(crate) enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub(crate) fn inline(mime_type: &str, bytes: &[u8]) -> Self {
        Part::Inline {
            inline_data: InlineData {
                mime_type: mime_type.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}
