//! Two-stage retrieval: vector recall, then LLM relevance reranking.
//!
//! Stage 1 embeds the query and pulls a candidate pool by cosine distance,
//! re-sorted client-side by `(distance, chunk id)` so ordering is
//! deterministic for fixed embeddings regardless of the store backend.
//!
//! Stage 2 asks the generation service to score each candidate 1-10 and
//! keeps the best `final_k`. The rerank stage fails open: a malformed
//! response — or a failed rerank call — falls back to stage-1 order rather
//! than failing the query. Because the reranker is a non-deterministic
//! oracle, callers must not expect identical output for identical input
//! when reranking is enabled.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use nexus_core::{
    defaults, ChunkFilter, ChunkRecord, ChunkStore, EmbeddingBackend, Error, GenerationBackend,
    Result, ScoredChunk,
};

/// Parameters for one retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub filter: ChunkFilter,
    /// Candidate pool size for stage 1 when reranking.
    pub initial_k: usize,
    /// Number of chunks returned to the caller.
    pub final_k: usize,
    pub use_rerank: bool,
}

impl RetrievalRequest {
    /// A reranked retrieval with the default pool sizes.
    pub fn new(query: impl Into<String>, filter: ChunkFilter) -> Self {
        Self {
            query: query.into(),
            filter,
            initial_k: defaults::RETRIEVE_INITIAL_K,
            final_k: defaults::RETRIEVE_FINAL_K,
            use_rerank: true,
        }
    }

    pub fn without_rerank(mut self) -> Self {
        self.use_rerank = false;
        self
    }

    pub fn with_final_k(mut self, final_k: usize) -> Self {
        self.final_k = final_k;
        self
    }
}

/// Two-stage retriever over an injected store and inference backends.
pub struct Retriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    generator: Arc<dyn GenerationBackend>,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingBackend>,
        generator: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
        }
    }

    /// Retrieve the best `final_k` chunks for `query`, best-first.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ChunkRecord>> {
        if request.final_k == 0 {
            return Err(Error::InvalidInput(
                "final_k must be greater than zero".to_string(),
            ));
        }

        let vectors = self
            .embedder
            .embed_texts(std::slice::from_ref(&request.query))
            .await?;
        let query_vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Embedding service returned no vector".to_string()))?;

        let pool_k = if request.use_rerank {
            request.initial_k.max(request.final_k)
        } else {
            request.final_k
        };

        let mut candidates = self
            .store
            .nearest(&query_vec, &request.filter, pool_k as i64)
            .await?;

        // Deterministic stage-1 order: distance ascending, id ascending.
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });

        debug!(
            subsystem = "retrieve",
            component = "retriever",
            op = "stage1",
            result_count = candidates.len(),
            "Vector recall complete"
        );

        if request.use_rerank && candidates.len() > request.final_k {
            if let Some(order) = self.rerank(&request.query, &candidates).await {
                let reranked: Vec<ChunkRecord> = order
                    .into_iter()
                    .take(request.final_k)
                    .map(|idx| candidates[idx].chunk.clone())
                    .collect();
                return Ok(reranked);
            }
            warn!(
                subsystem = "retrieve",
                component = "retriever",
                op = "rerank",
                "Rerank unavailable, falling back to vector order"
            );
        }

        candidates.truncate(request.final_k);
        Ok(candidates.into_iter().map(|scored| scored.chunk).collect())
    }

    /// Run the rerank stage. Returns candidate indices best-first, or `None`
    /// when the response was malformed or the call failed.
    async fn rerank(&self, query: &str, candidates: &[ScoredChunk]) -> Option<Vec<usize>> {
        let prompt = rerank_prompt(query, candidates);

        let response = match self.generator.generate(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    subsystem = "retrieve",
                    component = "retriever",
                    op = "rerank",
                    error = %e,
                    "Rerank call failed"
                );
                return None;
            }
        };

        parse_rerank_response(&response, candidates.len())
    }
}

/// Build the rerank prompt: numbered passages, JSON scoring instructions.
pub fn rerank_prompt(query: &str, candidates: &[ScoredChunk]) -> String {
    let mut passages = String::new();
    for (i, scored) in candidates.iter().enumerate() {
        passages.push_str(&format!("Passage {}:\n{}\n\n", i + 1, scored.chunk.content));
    }

    format!(
        "Score each passage 1-10 for how relevant it is to the question.\n\n\
         Question: {}\n\n{}\
         Respond with ONLY a JSON array sorted by score descending, where each \
         element is {{\"index\": <passage number>, \"score\": <1-10>}}.",
        query, passages
    )
}

/// Parse the rerank response into 0-based candidate indices, best-first.
///
/// Strict: every element must be an object with an in-range 1-based integer
/// `index` and a numeric `score`, or the whole response is rejected.
/// Duplicate indices keep their best-scored occurrence.
pub fn parse_rerank_response(response: &str, candidate_count: usize) -> Option<Vec<usize>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }

    let entries: Vec<Value> = serde_json::from_str(&response[start..=end]).ok()?;
    if entries.is_empty() {
        return None;
    }

    let mut ranked = Vec::with_capacity(entries.len());
    for entry in &entries {
        let index = entry.get("index").and_then(Value::as_u64)?;
        let score = entry.get("score").and_then(Value::as_f64)?;
        if index < 1 || index as usize > candidate_count {
            return None;
        }
        ranked.push((index as usize - 1, score));
    }

    // Model output claims to be sorted; enforce it, keeping response order
    // for ties.
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut seen = vec![false; candidate_count];
    let mut order = Vec::with_capacity(ranked.len());
    for (idx, _) in ranked {
        if !seen[idx] {
            seen[idx] = true;
            order.push(idx);
        }
    }

    Some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use nexus_core::{NewChunk, SourceType, Vector};
    use nexus_inference::mock::MockInferenceBackend;

    /// Store returning preset scored candidates, ignoring the query vector.
    struct StaticStore {
        candidates: Vec<ScoredChunk>,
    }

    #[async_trait]
    impl ChunkStore for StaticStore {
        async fn replace_for_source(
            &self,
            _source_type: SourceType,
            _source_id: i64,
            _user_id: i64,
            _chunks: Vec<NewChunk>,
        ) -> Result<usize> {
            unimplemented!("not used by retriever tests")
        }

        async fn nearest(
            &self,
            _embedding: &Vector,
            _filter: &ChunkFilter,
            limit: i64,
        ) -> Result<Vec<ScoredChunk>> {
            let mut out = self.candidates.clone();
            out.truncate(limit as usize);
            Ok(out)
        }

        async fn get_for_source(
            &self,
            _source_type: SourceType,
            _source_id: i64,
            _user_id: i64,
        ) -> Result<Vec<ChunkRecord>> {
            unimplemented!("not used by retriever tests")
        }
    }

    fn chunk(id: i64, content: &str) -> ChunkRecord {
        ChunkRecord {
            id,
            user_id: 1,
            project_id: None,
            source_type: SourceType::Paper,
            source_id: 1,
            content: content.to_string(),
            chunk_index: id as i32,
            section_title: None,
            char_start: 0,
            char_end: content.len() as i32,
            page_start: None,
            page_end: None,
            doc_title: None,
            doc_authors: None,
            doc_year: None,
            embedding: Vector::from(vec![0.0; 4]),
            created_at: Utc::now(),
        }
    }

    fn scored(id: i64, distance: f64) -> ScoredChunk {
        ScoredChunk {
            chunk: chunk(id, &format!("content {}", id)),
            distance,
        }
    }

    fn retriever_with(
        candidates: Vec<ScoredChunk>,
        backend: MockInferenceBackend,
    ) -> Retriever {
        Retriever::new(
            Arc::new(StaticStore { candidates }),
            Arc::new(backend.clone()),
            Arc::new(backend),
        )
    }

    #[tokio::test]
    async fn test_stage1_ordering_is_deterministic() {
        // Distances [0.9, 0.1, 0.5] must come back as [idx1, idx2, idx0].
        let candidates = vec![scored(10, 0.9), scored(11, 0.1), scored(12, 0.5)];
        let retriever = retriever_with(candidates, MockInferenceBackend::new());

        let request = RetrievalRequest::new("query", ChunkFilter::for_user(1))
            .without_rerank()
            .with_final_k(3);
        let results = retriever.retrieve(&request).await.unwrap();

        let ids: Vec<i64> = results.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![11, 12, 10]);
    }

    #[tokio::test]
    async fn test_stage1_ties_break_by_id() {
        let candidates = vec![scored(20, 0.4), scored(7, 0.4), scored(3, 0.4)];
        let retriever = retriever_with(candidates, MockInferenceBackend::new());

        let request = RetrievalRequest::new("query", ChunkFilter::for_user(1))
            .without_rerank()
            .with_final_k(3);
        let results = retriever.retrieve(&request).await.unwrap();

        let ids: Vec<i64> = results.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 7, 20]);
    }

    #[tokio::test]
    async fn test_rerank_reorders_candidates() {
        let candidates = vec![scored(1, 0.1), scored(2, 0.2), scored(3, 0.3)];
        let backend = MockInferenceBackend::new().with_response_containing(
            "Score each passage",
            r#"[{"index": 3, "score": 9}, {"index": 1, "score": 5}, {"index": 2, "score": 2}]"#,
        );
        let retriever = retriever_with(candidates, backend);

        let request = RetrievalRequest::new("query", ChunkFilter::for_user(1)).with_final_k(2);
        let results = retriever.retrieve(&request).await.unwrap();

        let ids: Vec<i64> = results.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_rerank_unparseable_falls_back_to_stage1_order() {
        let candidates = vec![scored(1, 0.1), scored(2, 0.2), scored(3, 0.3)];
        let backend = MockInferenceBackend::new()
            .with_default_response("I think passage one is nice.");
        let retriever = retriever_with(candidates, backend);

        let request = RetrievalRequest::new("query", ChunkFilter::for_user(1)).with_final_k(2);
        let results = retriever.retrieve(&request).await.unwrap();

        // Exactly final_k results, stage-1 order, no error.
        let ids: Vec<i64> = results.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_rerank_call_failure_fails_open() {
        let candidates = vec![scored(1, 0.1), scored(2, 0.2), scored(3, 0.3)];
        let backend = MockInferenceBackend::new().with_failing_generation();
        let retriever = retriever_with(candidates, backend);

        let request = RetrievalRequest::new("query", ChunkFilter::for_user(1)).with_final_k(2);
        let results = retriever.retrieve(&request).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_no_rerank_call_when_pool_fits() {
        let candidates = vec![scored(1, 0.1), scored(2, 0.2)];
        let backend = MockInferenceBackend::new();
        let retriever = retriever_with(candidates, backend.clone());

        let request = RetrievalRequest::new("query", ChunkFilter::for_user(1)).with_final_k(5);
        let results = retriever.retrieve(&request).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(backend.generate_call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_generation_call_without_rerank() {
        let candidates = vec![scored(1, 0.1), scored(2, 0.2), scored(3, 0.3)];
        let backend = MockInferenceBackend::new();
        let retriever = retriever_with(candidates, backend.clone());

        let request = RetrievalRequest::new("query", ChunkFilter::for_user(1))
            .without_rerank()
            .with_final_k(1);
        retriever.retrieve(&request).await.unwrap();

        assert_eq!(backend.generate_call_count(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let backend = MockInferenceBackend::new().with_failing_embeddings();
        let retriever = retriever_with(vec![], backend);

        let request = RetrievalRequest::new("query", ChunkFilter::for_user(1));
        assert!(retriever.retrieve(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_final_k_zero_is_invalid() {
        let retriever = retriever_with(vec![], MockInferenceBackend::new());
        let request = RetrievalRequest::new("query", ChunkFilter::for_user(1)).with_final_k(0);
        assert!(matches!(
            retriever.retrieve(&request).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_rerank_valid() {
        let response = r#"[{"index": 2, "score": 8}, {"index": 1, "score": 3}]"#;
        assert_eq!(parse_rerank_response(response, 2), Some(vec![1, 0]));
    }

    #[test]
    fn test_parse_rerank_enforces_score_order() {
        // Model claimed to sort but didn't.
        let response = r#"[{"index": 1, "score": 2}, {"index": 2, "score": 9}]"#;
        assert_eq!(parse_rerank_response(response, 2), Some(vec![1, 0]));
    }

    #[test]
    fn test_parse_rerank_rejects_out_of_range() {
        let response = r#"[{"index": 5, "score": 8}]"#;
        assert_eq!(parse_rerank_response(response, 2), None);

        let response = r#"[{"index": 0, "score": 8}]"#;
        assert_eq!(parse_rerank_response(response, 2), None);
    }

    #[test]
    fn test_parse_rerank_rejects_malformed() {
        assert_eq!(parse_rerank_response("no json", 3), None);
        assert_eq!(parse_rerank_response("[]", 3), None);
        assert_eq!(
            parse_rerank_response(r#"[{"index": "one", "score": 5}]"#, 3),
            None
        );
        assert_eq!(parse_rerank_response(r#"[{"score": 5}]"#, 3), None);
    }

    #[test]
    fn test_parse_rerank_dedupes_indices() {
        let response =
            r#"[{"index": 1, "score": 9}, {"index": 1, "score": 4}, {"index": 2, "score": 6}]"#;
        assert_eq!(parse_rerank_response(response, 2), Some(vec![0, 1]));
    }
}
