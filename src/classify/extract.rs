//! Text and payload extraction.
//!
//! Pure-Rust text extraction for classification snippets, image
//! preparation for vision input, and the fenced-JSON helper for provider
//! responses. Extraction is best-effort: a scanned PDF with no text layer
//! yields an empty snippet and the vision path carries the document.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::error::ExtractError;
use crate::store::ObjectStore;

/// Character cap on classification snippets, for token cost control.
pub const SNIPPET_LIMIT: usize = 5000;

/// Maximum image dimension (width or height) for vision payloads.
const MAX_DIMENSION: u32 = 1600;

/// Best-effort bounded text for the classifier prompt.
///
/// Never fails: extraction problems are logged and yield an empty snippet,
/// leaving the filename and the vision bytes to carry the document.
pub fn bounded_text(bytes: &[u8], mime_type: &str) -> String {
    let raw = if mime_type == "application/pdf" {
        match pdf_text(bytes) {
            Ok(text) => text,
            Err(reason) => {
                tracing::warn!("[Extract] PDF text unavailable: {}", reason);
                return String::new();
            }
        }
    } else if mime_type.starts_with("text/") {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        // Images and everything else go to vision untouched
        return String::new();
    };

    squeeze_whitespace(&raw).chars().take(SNIPPET_LIMIT).collect()
}

/// Full text of a stored document, for reading surfaces that need the
/// whole manual rather than a snippet.
pub async fn document_text(
    store: &dyn ObjectStore,
    id: &str,
    mime_type: &str,
) -> Result<String, ExtractError> {
    let bytes = store.download(id).await?;
    match mime_type {
        "application/pdf" => pdf_text(&bytes).map_err(ExtractError::Parse),
        m if m.starts_with("text/") => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        other => Err(ExtractError::Parse(format!(
            "unsupported content type {}",
            other
        ))),
    }
}

/// Extract text from PDF bytes.
///
/// Wrapped in catch_unwind: the pdf_extract crate (and its cff-parser
/// dependency) can panic on certain fonts/glyphs.
pub(crate) fn pdf_text(bytes: &[u8]) -> Result<String, String> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    })) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(format!("PDF extraction failed: {}", e)),
        Err(_panic) => Err("PDF extraction panicked - likely contains malformed fonts".to_string()),
    }
}

/// Prepare an image for vision input: resize if too large, re-encode as
/// JPEG for payload size.
pub(crate) fn prepare_image_for_vision(image_data: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory(image_data)
        .map_err(|e| format!("Failed to load image: {}", e))?;

    let img = resize_if_needed(img);

    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);
    img.write_to(&mut cursor, ImageFormat::Jpeg)
        .map_err(|e| format!("Failed to encode image: {}", e))?;

    Ok(buffer)
}

fn resize_if_needed(img: DynamicImage) -> DynamicImage {
    let (width, height) = (img.width(), img.height());

    if width <= MAX_DIMENSION && height <= MAX_DIMENSION {
        return img;
    }

    let scale = (MAX_DIMENSION as f32 / width.max(height) as f32).min(1.0);
    let new_width = (width as f32 * scale) as u32;
    let new_height = (height as f32 * scale) as u32;

    img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

/// Extract a JSON object from a response that might contain markdown or
/// other text.
///
/// Handles:
/// - ```json code blocks
/// - Plain ``` code blocks
/// - Raw JSON objects
pub(crate) fn extract_json_object(text: &str) -> Result<String, String> {
    // Try to find JSON in ```json blocks
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Ok(text[json_start..json_start + end].trim().to_string());
        }
    }

    // Try plain code blocks
    if let Some(start) = text.find("```") {
        let block_start = start + 3;
        let content_start = text[block_start..]
            .find('\n')
            .map(|i| block_start + i + 1)
            .unwrap_or(block_start);
        if let Some(end) = text[content_start..].find("```") {
            return Ok(text[content_start..content_start + end].trim().to_string());
        }
    }

    // Try to find raw JSON object; the braces must be in order
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start <= end {
            return Ok(text[start..=end].to_string());
        }
    }

    Err("No JSON object found in response".to_string())
}

/// Collapse whitespace runs; classification snippets don't need layout.
fn squeeze_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
