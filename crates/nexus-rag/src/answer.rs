//! Answer composition under a strict grounding contract.
//!
//! Builds a numbered context block from retrieved chunks, asks the
//! generation service to answer only from that context, and parses the
//! response into clean prose plus per-citation quote snippets. Citation
//! numbers refer to the context block order and are never renumbered
//! downstream.
//!
//! Parsing is tolerant of format drift: a missing `QUOTES USED` marker or
//! `ANSWER:` label degrades to best-effort text extraction, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use nexus_core::{
    defaults, format_page_range, likely_exceeds_limit, Answer, ChunkRecord, Citation,
    GenerationBackend, Result,
};

/// Fixed answer returned when no chunks were retrieved. No generation call
/// is made in that case.
pub const NO_CONTEXT_ANSWER: &str =
    "No indexed content was found for this source. Index it first, then ask again.";

const ANSWER_SYSTEM_PROMPT: &str = "You are a research assistant answering questions about \
academic documents.

Rules:
1. Answer using only the information in the provided context passages.
2. If the context does not contain the information needed, say so explicitly.
3. Never put bracketed citation numbers like [1] in your answer text.
4. Be concise but thorough.

After your answer, output a line reading exactly \"QUOTES USED:\" followed by one line per \
passage you drew on, in the form:
[<passage number>]: \"<exact quote from that passage>\"";

/// Matches `[n]: "quote"` or `[n]: 'quote'` citation lines.
static QUOTE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[(\d+)\]\s*:\s*(?:"([^"]+)"|'([^']+)')"#).expect("quote pattern compiles")
});

/// Case-insensitive `QUOTES USED` marker separating prose from quotes.
static QUOTES_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)quotes\s+used\s*:?").expect("marker pattern compiles"));

/// Leading `ANSWER:` label, if the model echoed one.
static ANSWER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*answer\s*:\s*").expect("label pattern compiles"));

/// Parsed generation response: prose plus quote-by-citation-number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub answer: String,
    pub quotes: HashMap<usize, String>,
    /// True when no marker structure was found and the whole response was
    /// used as prose.
    pub fallback: bool,
}

/// Composes grounded answers from retrieved chunks.
pub struct AnswerComposer {
    generator: Arc<dyn GenerationBackend>,
}

impl AnswerComposer {
    pub fn new(generator: Arc<dyn GenerationBackend>) -> Self {
        Self { generator }
    }

    /// Answer `question` from `chunks`, in retrieval order.
    ///
    /// An empty chunk list is a normal outcome, not an error: it returns the
    /// fixed not-found answer with no citations and no generation call.
    pub async fn answer(&self, question: &str, chunks: &[ChunkRecord]) -> Result<Answer> {
        if chunks.is_empty() {
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                citations: Vec::new(),
            });
        }

        let context = build_context(chunks);
        if likely_exceeds_limit(&context, defaults::ANSWER_CONTEXT_TOKEN_BUDGET) {
            warn!(
                subsystem = "answer",
                component = "composer",
                context_len = context.len(),
                "Answer context likely exceeds the token budget"
            );
        }

        let user_prompt = format!("Context:\n{}\n\nQuestion: {}", context, question);
        let response = self
            .generator
            .generate_with_system(ANSWER_SYSTEM_PROMPT, &user_prompt)
            .await?;

        let parsed = parse_answer_response(&response);
        debug!(
            subsystem = "answer",
            component = "composer",
            op = "answer",
            chunk_count = chunks.len(),
            quote_count = parsed.quotes.len(),
            fallback = parsed.fallback,
            "Parsed generation response"
        );

        let citations = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let citation_number = i + 1;
                let snippet = parsed
                    .quotes
                    .get(&citation_number)
                    .cloned()
                    .unwrap_or_else(|| preview(&chunk.content, defaults::SNIPPET_PREVIEW_CHARS));
                Citation {
                    chunk_id: chunk.id,
                    citation_number,
                    snippet,
                    doc_title: chunk.doc_title.clone(),
                    pages: format_page_range(chunk.page_start, chunk.page_end),
                    section_title: chunk.section_title.clone(),
                    source_type: chunk.source_type,
                }
            })
            .collect();

        Ok(Answer {
            answer: parsed.answer,
            citations,
        })
    }
}

/// Build the numbered context block. This ordering defines the citation
/// numbers for the whole answer.
pub fn build_context(chunks: &[ChunkRecord]) -> String {
    let blocks: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut meta = Vec::new();
            if let Some(section) = &chunk.section_title {
                meta.push(format!("section: {}", section));
            }
            if let Some(pages) = format_page_range(chunk.page_start, chunk.page_end) {
                meta.push(format!("pages: {}", pages));
            }
            match &chunk.doc_title {
                Some(title) => meta.push(format!("{}: \"{}\"", chunk.source_type, title)),
                None => meta.push(chunk.source_type.to_string()),
            }
            format!("[{}] ({})\n{}", i + 1, meta.join("; "), chunk.content)
        })
        .collect();

    blocks.join("\n\n")
}

/// Parse the generation response into prose and quotes.
///
/// The prose is everything before the case-insensitive `QUOTES USED`
/// marker, minus a leading `ANSWER:` label. Quote lines are matched
/// anywhere in the response, tolerating single or double quotes; the first
/// occurrence of each citation number wins.
pub fn parse_answer_response(response: &str) -> ParsedResponse {
    let (raw_answer, fallback) = match QUOTES_MARKER.find(response) {
        Some(marker) => (&response[..marker.start()], false),
        None => (response, true),
    };

    let mut answer = ANSWER_LABEL.replace(raw_answer, "").trim().to_string();
    let mut fallback = fallback;
    if answer.is_empty() {
        // Marker at the very start, or an empty prose part: degrade to the
        // whole response rather than returning nothing.
        answer = response.trim().to_string();
        fallback = true;
    }

    let mut quotes = HashMap::new();
    for captures in QUOTE_PATTERN.captures_iter(response) {
        let Some(number) = captures[1].parse::<usize>().ok().filter(|&n| n > 0) else {
            continue;
        };
        let quote = captures
            .get(2)
            .or_else(|| captures.get(3))
            .map(|m| m.as_str().to_string());
        if let Some(quote) = quote {
            quotes.entry(number).or_insert(quote);
        }
    }

    ParsedResponse {
        answer,
        quotes,
        fallback,
    }
}

/// Truncated, char-boundary-safe preview of chunk content.
fn preview(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        return content.to_string();
    }
    let mut end = max_chars;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &content[..end])
}
