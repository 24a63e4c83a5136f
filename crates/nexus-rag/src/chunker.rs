//! Section-aware token chunking.
//!
//! Splits each section of a document into token-bounded chunks whose ends
//! are snapped back to sentence or paragraph delimiters, so retrieval units
//! do not stop mid-sentence. Character offsets are recovered by decoding the
//! token prefix in front of each window, which tolerates the tokenizer's
//! lossy whitespace round-trip: offsets are provenance metadata, never used
//! to slice the original text.
//!
//! This module performs no I/O and only fails on malformed configuration.

use nexus_core::{defaults, ChunkCandidate, Error, Result, Section, Tokenizer};

/// Delimiters tried when snapping a chunk boundary, in preference order.
const BOUNDARY_DELIMITERS: [&str; 5] = [". ", "? ", "! ", "\n\n", "\n"];

/// Chunk window configuration.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Token window size; chunks may run shorter after boundary snapping.
    pub target_tokens: usize,
    /// Tokens of successive overlap between windows.
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_tokens: defaults::CHUNK_TARGET_TOKENS,
            overlap_tokens: defaults::CHUNK_OVERLAP_TOKENS,
        }
    }
}

impl ChunkerConfig {
    fn validate(&self) -> Result<()> {
        if self.target_tokens == 0 {
            return Err(Error::InvalidInput(
                "target_tokens must be greater than zero".to_string(),
            ));
        }
        if self.overlap_tokens >= self.target_tokens {
            return Err(Error::InvalidInput(format!(
                "overlap_tokens ({}) must be smaller than target_tokens ({})",
                self.overlap_tokens, self.target_tokens
            )));
        }
        Ok(())
    }
}

/// Split document text into chunk candidates, one section at a time.
///
/// With an empty `sections` slice the whole document is treated as a single
/// untitled section. Sections with model-estimated offsets are clamped to
/// the text before slicing; sections that collapse to nothing are skipped,
/// as are whitespace-only sections. Never returns empty or whitespace-only
/// chunks.
pub fn chunk_text(
    text: &str,
    sections: &[Section],
    tokenizer: &dyn Tokenizer,
    config: &ChunkerConfig,
) -> Result<Vec<ChunkCandidate>> {
    config.validate()?;

    let whole_document;
    let sections = if sections.is_empty() {
        whole_document = [Section::whole_document(text.len())];
        &whole_document[..]
    } else {
        sections
    };

    let mut candidates = Vec::new();

    for section in sections {
        let start = snap_to_char_boundary(text, section.start);
        let end = snap_to_char_boundary(text, section.end);
        if start >= end {
            continue;
        }

        let section_text = &text[start..end];
        if section_text.trim().is_empty() {
            continue;
        }

        chunk_section(
            section_text,
            start,
            section.title.as_deref(),
            tokenizer,
            config,
            &mut candidates,
        );
    }

    Ok(candidates)
}

fn chunk_section(
    section_text: &str,
    section_start: usize,
    title: Option<&str>,
    tokenizer: &dyn Tokenizer,
    config: &ChunkerConfig,
    out: &mut Vec<ChunkCandidate>,
) {
    let tokens = tokenizer.encode(section_text);

    if tokens.len() <= config.target_tokens {
        push_candidate(out, section_text, section_start, title);
        return;
    }

    let mut window_start = 0usize;
    while window_start < tokens.len() {
        let window_end = (window_start + config.target_tokens).min(tokens.len());
        let mut window_text = tokenizer.decode(&tokens[window_start..window_end]);

        // Snap the boundary back to the last delimiter in the back half of
        // the window, unless this window already reaches the section end.
        if window_end < tokens.len() {
            if let Some(cut) = snap_point(&window_text) {
                window_text.truncate(cut);
            }
        }

        let prefix_chars = if window_start == 0 {
            0
        } else {
            tokenizer.decode(&tokens[..window_start]).len()
        };
        push_candidate(out, &window_text, section_start + prefix_chars, title);

        if window_end >= tokens.len() {
            break;
        }

        // Advance by the tokens actually emitted minus the overlap, floored
        // at one token so pathological decode-length mismatches terminate.
        let emitted_tokens = tokenizer.count_tokens(&window_text);
        let advance = emitted_tokens
            .saturating_sub(config.overlap_tokens)
            .max(1);
        window_start += advance;
    }
}

/// Find the byte position to cut a window at: one past the last boundary
/// delimiter that lies in the back half of the window.
fn snap_point(window_text: &str) -> Option<usize> {
    let midpoint = window_text.len() / 2;
    for delimiter in BOUNDARY_DELIMITERS {
        if let Some(pos) = window_text.rfind(delimiter) {
            if pos >= midpoint {
                return Some(pos + delimiter.len());
            }
        }
    }
    None
}

/// Trim and record a chunk, adjusting offsets past leading whitespace.
/// Whitespace-only chunks are dropped.
fn push_candidate(
    out: &mut Vec<ChunkCandidate>,
    raw: &str,
    raw_start: usize,
    title: Option<&str>,
) {
    let content = raw.trim();
    if content.is_empty() {
        return;
    }

    let leading = raw.len() - raw.trim_start().len();
    let char_start = raw_start + leading;
    out.push(ChunkCandidate {
        content: content.to_string(),
        section_title: title.map(String::from),
        char_start,
        char_end: char_start + content.len(),
    });
}

/// Find UTF-8 safe boundary at or before the given position.
fn snap_to_char_boundary(text: &str, mut pos: usize) -> usize {
    if pos > text.len() {
        pos = text.len();
    }
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}
