//! Data model for the indexing and retrieval pipeline.
//!
//! `Page` and `Section` are transient: they exist only for the duration of an
//! indexing call and are never persisted. `ChunkRecord` is the atomic
//! retrieval unit, owned by the indexer and replaced wholesale on re-index.
//! `Citation` is derived at answer time and carries enough denormalized
//! provenance to be displayed without re-joining to the source document.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One page of extracted document text.
///
/// `char_start` is the byte offset of this page's first character within the
/// full concatenated document text. Pages arrive in order with strictly
/// increasing `char_start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed page number.
    pub number: i32,
    /// Text content of the page.
    pub text: String,
    /// Offset of the page's first character in the concatenated text.
    pub char_start: usize,
}

/// A model-estimated structural region of a document.
///
/// Offsets are approximate: sections may leave gaps or overlap, and consumers
/// must clamp them before slicing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Section heading, e.g. "Methods". `None` for the whole-document
    /// fallback section.
    pub title: Option<String>,
    /// Approximate start offset within the document text.
    pub start: usize,
    /// Approximate end offset within the document text.
    pub end: usize,
}

impl Section {
    /// A single section spanning the whole document, used when structural
    /// parsing was skipped or failed.
    pub fn whole_document(len: usize) -> Self {
        Self {
            title: None,
            start: 0,
            end: len,
        }
    }
}

/// Tagged result of section parsing: either a parsed outline or the
/// whole-document fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionOutline {
    pub sections: Vec<Section>,
    /// True when the outline is the whole-document fallback rather than a
    /// parsed model response.
    pub fallback: bool,
}

impl SectionOutline {
    pub fn parsed(sections: Vec<Section>) -> Self {
        Self {
            sections,
            fallback: false,
        }
    }

    pub fn whole_document(len: usize) -> Self {
        Self {
            sections: vec![Section::whole_document(len)],
            fallback: true,
        }
    }
}

/// The kind of entity a chunk was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// An uploaded paper's extracted text.
    Paper,
    /// A free-form note.
    Note,
    /// An experiment's protocol and results.
    Experiment,
    /// An individual experiment run.
    Run,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "paper"),
            Self::Note => write!(f, "note"),
            Self::Experiment => write!(f, "experiment"),
            Self::Run => write!(f, "run"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paper" => Ok(Self::Paper),
            "note" => Ok(Self::Note),
            "experiment" => Ok(Self::Experiment),
            "run" => Ok(Self::Run),
            _ => Err(Error::InvalidInput(format!("Invalid source type: {}", s))),
        }
    }
}

/// A chunk produced by the chunker, before embedding and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCandidate {
    /// Trimmed, non-empty chunk text.
    pub content: String,
    /// Title of the section this chunk was cut from.
    pub section_title: Option<String>,
    /// Byte offset of the chunk's first character in the document text.
    pub char_start: usize,
    /// Byte offset one past the chunk's last character.
    pub char_end: usize,
}

/// A chunk row ready for insertion. The store assigns the id and timestamp.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub user_id: i64,
    pub project_id: Option<i64>,
    pub source_type: SourceType,
    pub source_id: i64,
    pub content: String,
    /// 0-based position within the source, in order of creation.
    pub chunk_index: i32,
    pub section_title: Option<String>,
    pub char_start: i32,
    pub char_end: i32,
    pub page_start: Option<i32>,
    pub page_end: Option<i32>,
    pub doc_title: Option<String>,
    pub doc_authors: Option<String>,
    pub doc_year: Option<i32>,
    pub embedding: Vector,
}

/// A persisted chunk with full provenance metadata.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: i64,
    pub user_id: i64,
    pub project_id: Option<i64>,
    pub source_type: SourceType,
    pub source_id: i64,
    pub content: String,
    pub chunk_index: i32,
    pub section_title: Option<String>,
    pub char_start: i32,
    pub char_end: i32,
    pub page_start: Option<i32>,
    pub page_end: Option<i32>,
    pub doc_title: Option<String>,
    pub doc_authors: Option<String>,
    pub doc_year: Option<i32>,
    pub embedding: Vector,
    pub created_at: DateTime<Utc>,
}

/// A chunk paired with its cosine distance to a query embedding.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    /// Cosine distance (lower is closer).
    pub distance: f64,
}

/// Scope restriction for retrieval: owner is mandatory, project and source
/// narrow the pool further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFilter {
    pub user_id: i64,
    pub project_id: Option<i64>,
    pub source_type: Option<SourceType>,
    pub source_id: Option<i64>,
}

impl ChunkFilter {
    /// Filter scoped to a single owner.
    pub fn for_user(user_id: i64) -> Self {
        Self {
            user_id,
            project_id: None,
            source_type: None,
            source_id: None,
        }
    }

    /// Restrict to a project.
    pub fn with_project(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Restrict to a single source entity (e.g. one paper).
    pub fn with_source(mut self, source_type: SourceType, source_id: i64) -> Self {
        self.source_type = Some(source_type);
        self.source_id = Some(source_id);
        self
    }
}

/// Minimal value object handed to the indexer.
///
/// Ownership is expressed as plain identifiers, not a live entity graph: the
/// indexer never needs to see the surrounding CRUD records.
#[derive(Debug, Clone)]
pub struct IndexSource {
    pub source_type: SourceType,
    pub source_id: i64,
    pub user_id: i64,
    pub project_id: Option<i64>,
    /// Full extracted text. Empty or whitespace-only text is a `NoContent`
    /// error.
    pub text: String,
    /// Page table from the extraction collaborator, when available.
    pub pages: Option<Vec<Page>>,
    pub doc_title: Option<String>,
    pub doc_authors: Option<String>,
    pub doc_year: Option<i32>,
}

/// Document metadata extracted by the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub title: String,
    pub abstract_text: String,
    /// Model-reported extraction confidence in [0.0, 1.0].
    pub confidence: f32,
}

/// A citation attached to a generated answer.
///
/// Self-contained: carries enough provenance to be displayed and verified
/// without dereferencing the chunk again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: i64,
    /// 1-based, matching the numbering used in the answer context.
    pub citation_number: usize,
    /// Exact quote the model reported using, or a truncated preview of the
    /// chunk content when no quote was extracted.
    pub snippet: String,
    pub doc_title: Option<String>,
    /// Formatted page range: `"3"` or `"3-4"`. `None` when the source had no
    /// page table.
    pub pages: Option<String>,
    pub section_title: Option<String>,
    pub source_type: SourceType,
}

/// A grounded answer with its citations, in presentation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

/// Format a page range for display: `"3"` for a single page, `"3-4"` for a
/// span, `None` when the start page is unknown.
pub fn format_page_range(page_start: Option<i32>, page_end: Option<i32>) -> Option<String> {
    match (page_start, page_end) {
        (Some(start), Some(end)) if end > start => Some(format!("{}-{}", start, end)),
        (Some(start), _) => Some(start.to_string()),
        (None, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_source_type_display() {
        assert_eq!(SourceType::Paper.to_string(), "paper");
        assert_eq!(SourceType::Note.to_string(), "note");
        assert_eq!(SourceType::Experiment.to_string(), "experiment");
        assert_eq!(SourceType::Run.to_string(), "run");
    }

    #[test]
    fn test_source_type_from_str() {
        assert_eq!(SourceType::from_str("paper").unwrap(), SourceType::Paper);
        assert_eq!(SourceType::from_str("RUN").unwrap(), SourceType::Run);
        assert!(SourceType::from_str("dataset").is_err());
    }

    #[test]
    fn test_source_type_serde_roundtrip() {
        let json = serde_json::to_string(&SourceType::Experiment).unwrap();
        assert_eq!(json, "\"experiment\"");
        let back: SourceType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SourceType::Experiment);
    }

    #[test]
    fn test_section_whole_document() {
        let s = Section::whole_document(120);
        assert_eq!(s.title, None);
        assert_eq!(s.start, 0);
        assert_eq!(s.end, 120);
    }

    #[test]
    fn test_section_outline_fallback_flag() {
        let outline = SectionOutline::whole_document(10);
        assert!(outline.fallback);
        assert_eq!(outline.sections.len(), 1);

        let parsed = SectionOutline::parsed(vec![Section::whole_document(10)]);
        assert!(!parsed.fallback);
    }

    #[test]
    fn test_chunk_filter_builder() {
        let filter = ChunkFilter::for_user(7)
            .with_project(3)
            .with_source(SourceType::Paper, 42);
        assert_eq!(filter.user_id, 7);
        assert_eq!(filter.project_id, Some(3));
        assert_eq!(filter.source_type, Some(SourceType::Paper));
        assert_eq!(filter.source_id, Some(42));
    }

    #[test]
    fn test_format_page_range() {
        assert_eq!(format_page_range(Some(3), Some(3)), Some("3".to_string()));
        assert_eq!(
            format_page_range(Some(3), Some(5)),
            Some("3-5".to_string())
        );
        assert_eq!(format_page_range(Some(3), None), Some("3".to_string()));
        assert_eq!(format_page_range(None, Some(4)), None);
        assert_eq!(format_page_range(None, None), None);
    }
}
