//! Troubleshooting checklist generation.
//!
//! Turns a fault code (plus optional manual text for context) into a
//! structured step-by-step checklist, in Greek or English. Uses the same
//! backing-model discovery and JSON-mode call path as the classifier.

use serde::{Deserialize, Serialize};

use crate::classify::extract::extract_json_object;
use crate::classify::gemini::{GeminiClient, Part};
use crate::config::LibraryConfig;
use crate::error::ClassifyError;

/// Output cap for checklist answers; a checklist is a page, not a manual.
const CHECKLIST_MAX_TOKENS: u32 = 2000;

/// Manual-context cap passed along with the fault code.
const CONTEXT_LIMIT: usize = 5000;

/// Language the checklist text is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecklistLanguage {
    Greek,
    English,
}

impl ChecklistLanguage {
    fn prompt_name(self) -> &'static str {
        match self {
            ChecklistLanguage::Greek => "GREEK (Ελληνικά)",
            ChecklistLanguage::English => "ENGLISH",
        }
    }
}

/// One binary check or action in a checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistStep {
    pub id: u32,
    pub action: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub tip: String,
}

/// A generated troubleshooting checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checklist {
    pub title: String,
    pub steps: Vec<ChecklistStep>,
}

/// Generates diagnostic checklists through the classification provider.
pub struct DiagnosticsService {
    client: GeminiClient,
}

impl DiagnosticsService {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &LibraryConfig) -> Result<Self, ClassifyError> {
        Ok(Self::new(GeminiClient::from_config(config)?))
    }

    /// Build a checklist for a fault code.
    ///
    /// `manual_context` is the relevant manual text when the caller has it;
    /// it is capped before sending. One call, no retry; a failure is the
    /// caller's to surface.
    pub async fn generate_checklist(
        &self,
        fault_code: &str,
        manual_context: &str,
        lang: ChecklistLanguage,
    ) -> Result<Checklist, ClassifyError> {
        let prompt = checklist_prompt(fault_code, manual_context, lang);
        let text = self
            .client
            .generate_json(vec![Part::text(prompt)], CHECKLIST_MAX_TOKENS)
            .await?;
        parse_checklist(&text)
    }
}

fn checklist_prompt(fault_code: &str, manual_context: &str, lang: ChecklistLanguage) -> String {
    let context: String = manual_context.chars().take(CONTEXT_LIMIT).collect();
    let target_lang = lang.prompt_name();

    format!(
        r#"ROLE: You are an expert HVAC field technician.
TASK: Create a strictly structured troubleshooting checklist for the following issue.

ISSUE/ERROR CODE: {fault_code}
MANUAL CONTEXT: {context}

CRITICAL LANGUAGE INSTRUCTION:
The user speaks {target_lang}.
You MUST output all text values (title, action, question, tip) in {target_lang}.
Translate technical terms where appropriate for a technician, but keep error codes intact.

REQUIREMENTS:
1. Break the solution into logical, sequential steps.
2. Each step must be a binary check (yes/no) or an action.
3. OUTPUT FORMAT: pure JSON only, no markdown.

JSON STRUCTURE:
{{
  "title": "Diagnosis title",
  "steps": [
    {{"id": 1, "action": "What to do", "question": "Question for the user", "tip": "Helpful tip"}}
  ]
}}"#
    )
}

fn parse_checklist(text: &str) -> Result<Checklist, ClassifyError> {
    let json = extract_json_object(text).map_err(ClassifyError::Parse)?;
    let checklist: Checklist =
        serde_json::from_str(&json).map_err(|e| ClassifyError::Parse(e.to_string()))?;
    if checklist.steps.is_empty() {
        return Err(ClassifyError::Parse("checklist has no steps".to_string()));
    }
    Ok(checklist)
}
