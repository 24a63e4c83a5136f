//! LLM-assisted section outline parsing.
//!
//! Asks the generation service for the structural sections of a document
//! (Abstract, Methods, ...) with approximate character offsets. The outline
//! is a best-effort structural hint, never ground truth: any parse trouble
//! degrades to a single whole-document section, and downstream consumers
//! treat all boundaries as approximate.

use serde_json::Value;
use tracing::{debug, warn};

use nexus_core::{defaults, GenerationBackend, Result, Section, SectionOutline};

const OUTLINE_SYSTEM_PROMPT: &str = "You are an expert academic paper parser. \
Identify the major structural sections of the document sample (for example \
Abstract, Introduction, Methods, Results, Discussion, References).

Respond with ONLY a JSON array, no commentary, where each element is:
{\"title\": \"<section heading>\", \"start\": <character offset where the section begins>, \"end\": <character offset where it ends>}

Offsets are relative to the start of the sample. List sections in document order.";

/// Build the user prompt for the outline request.
fn outline_prompt(sample: &str) -> String {
    format!(
        "Identify the sections of this document (total length {} characters):\n\n{}",
        sample.len(),
        sample
    )
}

/// Ask the generation service for a section outline of `text`.
///
/// Samples a bounded prefix of the document to respect the generation
/// context limit. Transport failures propagate; a malformed response falls
/// back to a single whole-document section (`fallback = true`).
pub async fn parse_sections(
    generator: &dyn GenerationBackend,
    text: &str,
) -> Result<SectionOutline> {
    let sample = sample_prefix(text, defaults::SECTION_SAMPLE_CHARS);
    let response = generator
        .generate_with_system(OUTLINE_SYSTEM_PROMPT, &outline_prompt(sample))
        .await?;

    match parse_outline_response(&response, text.len()) {
        Some(sections) => {
            debug!(
                subsystem = "index",
                component = "sections",
                op = "parse_sections",
                result_count = sections.len(),
                "Parsed section outline"
            );
            Ok(SectionOutline::parsed(sections))
        }
        None => {
            warn!(
                subsystem = "index",
                component = "sections",
                op = "parse_sections",
                response_len = response.len(),
                "Section outline unparseable, falling back to whole document"
            );
            Ok(SectionOutline::whole_document(text.len()))
        }
    }
}

/// Parse the model's outline response into validated sections.
///
/// Returns `None` when nothing usable can be extracted. Individual entries
/// missing a title or a numeric in-range start are dropped; a missing or
/// non-numeric end defaults to the document length.
pub fn parse_outline_response(response: &str, doc_len: usize) -> Option<Vec<Section>> {
    let json = extract_json_array(response)?;
    let entries: Vec<Value> = serde_json::from_str(json).ok()?;

    let mut sections = Vec::new();
    for entry in &entries {
        let title = match entry.get("title").and_then(Value::as_str).map(str::trim) {
            Some(title) if !title.is_empty() => title,
            _ => continue,
        };

        let start = match entry.get("start").and_then(Value::as_u64) {
            Some(start) if (start as usize) < doc_len => start as usize,
            _ => continue,
        };

        let end = entry
            .get("end")
            .and_then(Value::as_u64)
            .map(|end| (end as usize).min(doc_len))
            .filter(|&end| end > start)
            .unwrap_or(doc_len);

        sections.push(Section {
            title: Some(truncate_title(title)),
            start,
            end,
        });
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections)
    }
}

/// Take a bounded, char-boundary-safe prefix of the document text.
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

/// Slice out the outermost JSON array, tolerating fences and commentary.
fn extract_json_array(response: &str) -> Option<&str> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }
    Some(&response[start..=end])
}

fn truncate_title(title: &str) -> String {
    if title.len() <= defaults::SECTION_TITLE_MAX_CHARS {
        return title.to_string();
    }
    let mut end = defaults::SECTION_TITLE_MAX_CHARS;
    while end > 0 && !title.is_char_boundary(end) {
        end -= 1;
    }
    title[..end].to_string()
}
