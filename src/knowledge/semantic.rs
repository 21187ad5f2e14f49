//! 벡터(시맨틱) 검색 소스

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::SourceError;
use crate::graph::ArticleKey;

use super::candidate::{Candidate, CandidateMetadata, CandidateSource, SearchMethod};
use super::vector::{VectorHit, VectorStore};

/// 조문당 청크가 여러 개일 수 있어 k의 몇 배를 가져온 뒤 조문 단위로 줄임
const CHUNK_OVERFETCH: usize = 3;

/// 벡터 검색 소스
///
/// 쿼리를 한 번 임베딩하고, 유사도 임계값 미만의 청크는 버리며,
/// 같은 조문의 청크는 가장 유사한 하나만 남깁니다.
pub struct SemanticSearch {
    store: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    similarity_threshold: f32,
}

impl SemanticSearch {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            store,
            embedder,
            similarity_threshold,
        }
    }

    /// 임베딩 프로바이더 설정 여부
    pub fn is_enabled(&self) -> bool {
        self.embedder.is_some()
    }

    fn to_candidates(&self, hits: Vec<VectorHit>, k: usize) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        let mut ranked: Vec<(f32, VectorHit)> = hits
            .into_iter()
            .map(|hit| (hit.similarity(), hit))
            .filter(|(similarity, _)| *similarity >= self.similarity_threshold)
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .into_iter()
            .filter(|(_, hit)| seen.insert(ArticleKey::new(&hit.law_id, &hit.article_number)))
            .take(k)
            .map(|(similarity, hit)| {
                let section = (!hit.section.is_empty()).then_some(hit.section);
                let mut candidate = Candidate::new(
                    hit.chunk_text,
                    CandidateMetadata {
                        law_id: hit.law_id,
                        article_number: hit.article_number,
                        law_name: None,
                        section,
                    },
                );
                candidate.vector_score = similarity;
                candidate.methods.insert(SearchMethod::Vector);
                candidate
            })
            .collect()
    }
}

#[async_trait]
impl CandidateSource for SemanticSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>, SourceError> {
        let Some(embedder) = &self.embedder else {
            return Err(SourceError::unavailable(
                SearchMethod::Vector,
                "embedding provider not configured",
            ));
        };
        if k == 0 {
            return Ok(vec![]);
        }

        let query_embedding = embedder
            .embed_query(query)
            .await
            .map_err(|e| SourceError::unavailable(SearchMethod::Vector, format!("{:#}", e)))?;

        let hits = self
            .store
            .search(&query_embedding, k.saturating_mul(CHUNK_OVERFETCH))
            .await
            .map_err(|e| SourceError::unavailable(SearchMethod::Vector, format!("{:#}", e)))?;

        let candidates = self.to_candidates(hits, k);
        tracing::debug!("Vector search: {} candidates", candidates.len());
        Ok(candidates)
    }

    fn method(&self) -> SearchMethod {
        SearchMethod::Vector
    }
}

// ============================================================================
// Tests
// ============================================================================
