//! Integration tests for the PostgreSQL chunk store.
//!
//! These require a live PostgreSQL with the pgvector extension. Run with:
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/nexus_test \
//!     cargo test -p nexus-db --features migrations -- --ignored
//! ```

use nexus_core::{ChunkFilter, ChunkStore, NewChunk, SourceType, Vector};
use nexus_db::{log_pool_metrics, Database};
use nexus_inference::mock::MockEmbeddingGenerator;

const DIM: usize = 1536;

async fn connect() -> Database {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for chunk store integration tests");
    let db = Database::connect(&url).await.expect("connect");
    #[cfg(feature = "migrations")]
    db.migrate().await.expect("migrate");
    log_pool_metrics(db.pool());
    db
}

fn chunk_for(user_id: i64, source_id: i64, index: i32, content: &str) -> NewChunk {
    NewChunk {
        user_id,
        project_id: Some(1),
        source_type: SourceType::Paper,
        source_id,
        content: content.to_string(),
        chunk_index: index,
        section_title: Some("Methods".to_string()),
        char_start: index * 100,
        char_end: index * 100 + content.len() as i32,
        page_start: Some(1),
        page_end: Some(2),
        doc_title: Some("Test Paper".to_string()),
        doc_authors: None,
        doc_year: Some(2026),
        embedding: Vector::from(MockEmbeddingGenerator::generate(content, DIM)),
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_replace_is_idempotent_in_count() {
    let db = connect().await;
    let user_id = 9001;
    let source_id = 4242;

    let chunks: Vec<NewChunk> = (0..3)
        .map(|i| chunk_for(user_id, source_id, i, &format!("chunk number {}", i)))
        .collect();

    let first = db
        .chunks
        .replace_for_source(SourceType::Paper, source_id, user_id, chunks.clone())
        .await
        .unwrap();
    let second = db
        .chunks
        .replace_for_source(SourceType::Paper, source_id, user_id, chunks)
        .await
        .unwrap();

    assert_eq!(first, 3);
    assert_eq!(second, 3);

    // No duplicate or orphaned rows survive the second generation.
    let count = db
        .chunks
        .count_for_source(SourceType::Paper, source_id, user_id)
        .await
        .unwrap();
    assert_eq!(count, 3);

    let stored = db
        .chunks
        .get_for_source(SourceType::Paper, source_id, user_id)
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].chunk_index, 0);
    assert_eq!(stored[2].chunk_index, 2);
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_nearest_respects_scope_filter() {
    let db = connect().await;
    let user_id = 9002;

    db.chunks
        .replace_for_source(
            SourceType::Paper,
            1,
            user_id,
            vec![chunk_for(user_id, 1, 0, "transformer attention heads")],
        )
        .await
        .unwrap();
    db.chunks
        .replace_for_source(
            SourceType::Paper,
            2,
            user_id,
            vec![chunk_for(user_id, 2, 0, "protein folding energy landscape")],
        )
        .await
        .unwrap();

    let query = Vector::from(MockEmbeddingGenerator::generate(
        "transformer attention heads",
        DIM,
    ));

    let scoped = ChunkFilter::for_user(user_id).with_source(SourceType::Paper, 2);
    let hits = db.chunks.nearest(&query, &scoped, 10).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.source_id, 2);

    let all = db
        .chunks
        .nearest(&query, &ChunkFilter::for_user(user_id), 10)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    // Exact-match content sorts first under cosine distance.
    assert_eq!(all[0].chunk.source_id, 1);
    assert!(all[0].distance <= all[1].distance);
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_replace_with_empty_clears_source() {
    let db = connect().await;
    let user_id = 9003;
    let source_id = 7;

    let mut note_chunk = chunk_for(user_id, source_id, 0, "stale note text");
    note_chunk.source_type = SourceType::Note;
    db.chunks
        .replace_for_source(SourceType::Note, source_id, user_id, vec![note_chunk])
        .await
        .unwrap();

    let count = db
        .chunks
        .replace_for_source(SourceType::Note, source_id, user_id, vec![])
        .await
        .unwrap();

    assert_eq!(count, 0);
    assert_eq!(
        db.chunks
            .count_for_source(SourceType::Note, source_id, user_id)
            .await
            .unwrap(),
        0
    );
}
