//! Chunk store implementation.
//!
//! Chunk rows carry denormalized provenance (section, page range, document
//! metadata) so retrieval results can be cited without joining back to the
//! source entities. Nearest-neighbour search uses pgvector's `<=>` cosine
//! distance operator; the HNSW index created by the migration covers it.

use std::str::FromStr;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};

use nexus_core::{
    ChunkFilter, ChunkRecord, ChunkStore, Error, NewChunk, Result, ScoredChunk, SourceType,
};

const CHUNK_COLUMNS: &str = "id, user_id, project_id, source_type, source_id, content, \
     chunk_index, section_title, char_start, char_end, page_start, page_end, \
     doc_title, doc_authors, doc_year, embedding, created_at";

/// PostgreSQL implementation of `ChunkStore`.
pub struct PgChunkStore {
    pool: Pool<Postgres>,
}

impl PgChunkStore {
    /// Create a new PgChunkStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Count chunks for one source entity.
    pub async fn count_for_source(
        &self,
        source_type: SourceType,
        source_id: i64,
        user_id: i64,
    ) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM chunks
             WHERE source_type = $1 AND source_id = $2 AND user_id = $3",
        )
        .bind(source_type.to_string())
        .bind(source_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.get("count"))
    }
}

fn row_to_chunk(row: &PgRow) -> Result<ChunkRecord> {
    let source_type: String = row.get("source_type");
    Ok(ChunkRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        source_type: SourceType::from_str(&source_type)
            .map_err(|_| Error::Internal(format!("Unknown source_type in row: {}", source_type)))?,
        source_id: row.get("source_id"),
        content: row.get("content"),
        chunk_index: row.get("chunk_index"),
        section_title: row.get("section_title"),
        char_start: row.get("char_start"),
        char_end: row.get("char_end"),
        page_start: row.get("page_start"),
        page_end: row.get("page_end"),
        doc_title: row.get("doc_title"),
        doc_authors: row.get("doc_authors"),
        doc_year: row.get("doc_year"),
        embedding: row.get("embedding"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    async fn replace_for_source(
        &self,
        source_type: SourceType,
        source_id: i64,
        user_id: i64,
        chunks: Vec<NewChunk>,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Delete + insert inside one transaction: readers never see a mix of
        // old and new generations.
        sqlx::query(
            "DELETE FROM chunks WHERE source_type = $1 AND source_id = $2 AND user_id = $3",
        )
        .bind(source_type.to_string())
        .bind(source_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let count = chunks.len();
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (user_id, project_id, source_type, source_id, content,
                     chunk_index, section_title, char_start, char_end, page_start, page_end,
                     doc_title, doc_authors, doc_year, embedding)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            )
            .bind(chunk.user_id)
            .bind(chunk.project_id)
            .bind(chunk.source_type.to_string())
            .bind(chunk.source_id)
            .bind(&chunk.content)
            .bind(chunk.chunk_index)
            .bind(&chunk.section_title)
            .bind(chunk.char_start)
            .bind(chunk.char_end)
            .bind(chunk.page_start)
            .bind(chunk.page_end)
            .bind(&chunk.doc_title)
            .bind(&chunk.doc_authors)
            .bind(chunk.doc_year)
            .bind(&chunk.embedding)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "chunks",
            op = "replace_for_source",
            source_type = %source_type,
            source_id,
            chunk_count = count,
            "Replaced chunk generation"
        );

        Ok(count)
    }

    async fn nearest(
        &self,
        embedding: &Vector,
        filter: &ChunkFilter,
        limit: i64,
    ) -> Result<Vec<ScoredChunk>> {
        // $1 = query vector, $2 = limit, $3 = user_id; scope filters extend
        // the parameter list from $4.
        let mut clauses = vec!["user_id = $3".to_string()];
        let mut next_param = 4;

        if filter.project_id.is_some() {
            clauses.push(format!("project_id = ${}", next_param));
            next_param += 1;
        }
        if filter.source_type.is_some() {
            clauses.push(format!("source_type = ${}", next_param));
            next_param += 1;
        }
        if filter.source_id.is_some() {
            clauses.push(format!("source_id = ${}", next_param));
        }

        let query = format!(
            "SELECT {}, embedding <=> $1::vector AS distance
             FROM chunks
             WHERE {}
             ORDER BY embedding <=> $1::vector ASC, id ASC
             LIMIT $2",
            CHUNK_COLUMNS,
            clauses.join(" AND ")
        );

        let mut query_builder = sqlx::query(&query)
            .bind(embedding)
            .bind(limit)
            .bind(filter.user_id);

        if let Some(project_id) = filter.project_id {
            query_builder = query_builder.bind(project_id);
        }
        if let Some(source_type) = filter.source_type {
            query_builder = query_builder.bind(source_type.to_string());
        }
        if let Some(source_id) = filter.source_id {
            query_builder = query_builder.bind(source_id);
        }

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "chunks",
            op = "nearest",
            result_count = rows.len(),
            "Vector search complete"
        );

        rows.iter()
            .map(|row| {
                Ok(ScoredChunk {
                    chunk: row_to_chunk(row)?,
                    distance: row.get("distance"),
                })
            })
            .collect()
    }

    async fn get_for_source(
        &self,
        source_type: SourceType,
        source_id: i64,
        user_id: i64,
    ) -> Result<Vec<ChunkRecord>> {
        let query = format!(
            "SELECT {} FROM chunks
             WHERE source_type = $1 AND source_id = $2 AND user_id = $3
             ORDER BY chunk_index",
            CHUNK_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(source_type.to_string())
            .bind(source_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(row_to_chunk).collect()
    }
}
