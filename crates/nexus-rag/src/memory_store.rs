//! In-memory chunk store.
//!
//! Reference implementation of the `ChunkStore` contract used by the test
//! suites: cosine distance ranking with ascending-id tie-breaks, and
//! replace-on-reindex under a single lock so no reader ever observes a
//! mixed generation. Not intended for production data volumes.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use nexus_core::{
    ChunkFilter, ChunkRecord, ChunkStore, NewChunk, Result, ScoredChunk, SourceType, Vector,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<ChunkRecord>,
}

/// In-memory `ChunkStore` implementation.
#[derive(Default)]
pub struct MemoryChunkStore {
    inner: Mutex<Inner>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all sources (test helper).
    pub fn total_count(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }
}

fn matches_filter(chunk: &ChunkRecord, filter: &ChunkFilter) -> bool {
    if chunk.user_id != filter.user_id {
        return false;
    }
    if let Some(project_id) = filter.project_id {
        if chunk.project_id != Some(project_id) {
            return false;
        }
    }
    if let Some(source_type) = filter.source_type {
        if chunk.source_type != source_type {
            return false;
        }
    }
    if let Some(source_id) = filter.source_id {
        if chunk.source_id != source_id {
            return false;
        }
    }
    true
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x * y) as f64).sum();
    let mag_a: f64 = a.iter().map(|x| (x * x) as f64).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (x * x) as f64).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (mag_a * mag_b)
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn replace_for_source(
        &self,
        source_type: SourceType,
        source_id: i64,
        user_id: i64,
        chunks: Vec<NewChunk>,
    ) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();

        inner.rows.retain(|row| {
            !(row.source_type == source_type
                && row.source_id == source_id
                && row.user_id == user_id)
        });

        let count = chunks.len();
        let now = Utc::now();
        for chunk in chunks {
            inner.next_id += 1;
            let id = inner.next_id;
            inner.rows.push(ChunkRecord {
                id,
                user_id: chunk.user_id,
                project_id: chunk.project_id,
                source_type: chunk.source_type,
                source_id: chunk.source_id,
                content: chunk.content,
                chunk_index: chunk.chunk_index,
                section_title: chunk.section_title,
                char_start: chunk.char_start,
                char_end: chunk.char_end,
                page_start: chunk.page_start,
                page_end: chunk.page_end,
                doc_title: chunk.doc_title,
                doc_authors: chunk.doc_authors,
                doc_year: chunk.doc_year,
                embedding: chunk.embedding,
                created_at: now,
            });
        }

        Ok(count)
    }

    async fn nearest(
        &self,
        embedding: &Vector,
        filter: &ChunkFilter,
        limit: i64,
    ) -> Result<Vec<ScoredChunk>> {
        let inner = self.inner.lock().unwrap();

        let mut scored: Vec<ScoredChunk> = inner
            .rows
            .iter()
            .filter(|row| matches_filter(row, filter))
            .map(|row| ScoredChunk {
                chunk: row.clone(),
                distance: cosine_distance(embedding.as_slice(), row.embedding.as_slice()),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(limit.max(0) as usize);

        Ok(scored)
    }

    async fn get_for_source(
        &self,
        source_type: SourceType,
        source_id: i64,
        user_id: i64,
    ) -> Result<Vec<ChunkRecord>> {
        let inner = self.inner.lock().unwrap();

        let mut rows: Vec<ChunkRecord> = inner
            .rows
            .iter()
            .filter(|row| {
                row.source_type == source_type
                    && row.source_id == source_id
                    && row.user_id == user_id
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.chunk_index);

        Ok(rows)
    }
}
