//! LLM-assisted document metadata extraction.
//!
//! Pulls a title, abstract, and extraction confidence out of the opening of
//! a document. Used by the indexer to denormalize `doc_title` onto chunks
//! when the caller did not supply one. Malformed model output yields `None`
//! rather than an error; only transport failures propagate.

use serde_json::Value;
use tracing::{debug, warn};

use nexus_core::{defaults, DocMetadata, GenerationBackend, Result};

const METADATA_SYSTEM_PROMPT: &str = "You are an expert academic paper parser. Extract the \
title and abstract from the document sample.

Instructions:
1. The title is typically at the very beginning, often on its own line.
2. The abstract usually appears after the title and author block, often labeled \"Abstract\".
3. Extract the COMPLETE abstract, not just the first sentence.
4. If no clear abstract exists, summarize the main contribution in 2-3 sentences.
5. Report a confidence score between 0.0 and 1.0 for the extraction.

Respond with ONLY a JSON object, no commentary:
{\"title\": \"<title>\", \"abstract\": \"<abstract>\", \"confidence\": <0.0-1.0>}";

/// Extract document metadata from the opening of `text`.
///
/// Returns `Ok(None)` when the response does not parse; the caller keeps
/// whatever metadata it already had.
pub async fn extract_doc_metadata(
    generator: &dyn GenerationBackend,
    text: &str,
) -> Result<Option<DocMetadata>> {
    let sample = sample_prefix(text, defaults::SECTION_SAMPLE_CHARS);
    let prompt = format!("Extract the title and abstract from this document:\n\n{}", sample);

    let response = generator
        .generate_with_system(METADATA_SYSTEM_PROMPT, &prompt)
        .await?;

    let metadata = parse_metadata_response(&response);
    match &metadata {
        Some(meta) => debug!(
            subsystem = "index",
            component = "metadata",
            op = "extract_doc_metadata",
            confidence = meta.confidence,
            "Extracted document metadata"
        ),
        None => warn!(
            subsystem = "index",
            component = "metadata",
            op = "extract_doc_metadata",
            response_len = response.len(),
            "Metadata response unparseable, keeping caller-supplied metadata"
        ),
    }

    Ok(metadata)
}

/// Parse the model's metadata response. A usable response needs at least a
/// non-empty title; abstract defaults to empty and confidence to 0.0.
pub fn parse_metadata_response(response: &str) -> Option<DocMetadata> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }

    let value: Value = serde_json::from_str(&response[start..=end]).ok()?;

    let title = value.get("title")?.as_str().map(str::trim)?;
    if title.is_empty() {
        return None;
    }

    let abstract_text = value
        .get("abstract")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0) as f32;

    Some(DocMetadata {
        title: title.to_string(),
        abstract_text,
        confidence,
    })
}

fn sample_prefix(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_inference::mock::MockInferenceBackend;

    #[test]
    fn test_parse_valid_metadata() {
        let response = r#"{"title": "Attention Is All You Need", "abstract": "We propose the Transformer.", "confidence": 0.95}"#;
        let meta = parse_metadata_response(response).unwrap();

        assert_eq!(meta.title, "Attention Is All You Need");
        assert_eq!(meta.abstract_text, "We propose the Transformer.");
        assert!((meta.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_parse_tolerates_surrounding_prose() {
        let response = "Sure! Here you go:\n{\"title\": \"A Study\", \"abstract\": \"Text.\", \"confidence\": 0.5}\nHope that helps.";
        let meta = parse_metadata_response(response).unwrap();
        assert_eq!(meta.title, "A Study");
    }

    #[test]
    fn test_parse_missing_fields_get_defaults() {
        let meta = parse_metadata_response(r#"{"title": "Only Title"}"#).unwrap();
        assert_eq!(meta.abstract_text, "");
        assert_eq!(meta.confidence, 0.0);
    }

    #[test]
    fn test_parse_confidence_clamped() {
        let meta = parse_metadata_response(r#"{"title": "T", "confidence": 3.5}"#).unwrap();
        assert_eq!(meta.confidence, 1.0);
    }

    #[test]
    fn test_parse_garbage_returns_none() {
        assert!(parse_metadata_response("no json here").is_none());
        assert!(parse_metadata_response(r#"{"abstract": "missing title"}"#).is_none());
        assert!(parse_metadata_response(r#"{"title": ""}"#).is_none());
    }

    #[tokio::test]
    async fn test_extract_metadata_happy_path() {
        let backend = MockInferenceBackend::new().with_default_response(
            r#"{"title": "Extracted Title", "abstract": "The abstract.", "confidence": 0.8}"#,
        );
        let meta = extract_doc_metadata(&backend, "Some paper text")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.title, "Extracted Title");
    }

    #[tokio::test]
    async fn test_extract_metadata_unparseable_is_none_not_error() {
        let backend = MockInferenceBackend::new().with_default_response("no structure");
        let meta = extract_doc_metadata(&backend, "Some paper text").await.unwrap();
        assert!(meta.is_none());
    }

    #[tokio::test]
    async fn test_extract_metadata_transport_failure_propagates() {
        let backend = MockInferenceBackend::new().with_failing_generation();
        assert!(extract_doc_metadata(&backend, "text").await.is_err());
    }
}
