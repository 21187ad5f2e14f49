//! Vector Store - 조문 청크 벡터 검색 트레이트 및 메모리 구현
//!
//! 거리(distance)는 코사인 거리(1 - cosine similarity)입니다.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct ChunkEntry {
    /// `{law_id}_{article_number}_{chunk_index}`
    pub chunk_id: String,
    pub law_id: String,
    pub article_number: String,
    pub section: String,
    /// 조문 내 청크 순서 (0-based)
    pub chunk_index: i32,
    pub chunk_text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 벡터 검색 결과
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub law_id: String,
    pub article_number: String,
    pub section: String,
    pub chunk_index: i32,
    pub chunk_text: String,
    /// 코사인 거리 (0.0 ~ 2.0, 작을수록 유사)
    pub distance: f32,
}

impl VectorHit {
    /// 거리 → 유사도 (0.0 ~ 1.0)
    pub fn similarity(&self) -> f32 {
        (1.0 - self.distance).clamp(0.0, 1.0)
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 전체 교체
    ///
    /// 새 데이터가 모두 기록된 뒤에 검색 대상이 바뀝니다.
    /// 교체가 끝나기 전까지는 이전 데이터로 검색됩니다.
    async fn replace_all(&self, entries: &[ChunkEntry]) -> Result<usize>;

    /// 거리 오름차순 상위 `limit`개
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// MemoryVectorStore
// ============================================================================

/// 메모리 벡터 저장소 (전수 코사인 비교)
#[derive(Default)]
pub struct MemoryVectorStore {
    entries: RwLock<Vec<ChunkEntry>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn replace_all(&self, entries: &[ChunkEntry]) -> Result<usize> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        *guard = entries.to_vec();
        Ok(guard.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        let guard = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut hits: Vec<VectorHit> = guard
            .iter()
            .map(|e| VectorHit {
                chunk_id: e.chunk_id.clone(),
                law_id: e.law_id.clone(),
                article_number: e.article_number.clone(),
                section: e.section.clone(),
                chunk_index: e.chunk_index,
                chunk_text: e.chunk_text.clone(),
                distance: 1.0 - cosine_similarity(query_embedding, &e.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let guard = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(guard.len())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(number: &str, embedding: Vec<f32>) -> ChunkEntry {
        ChunkEntry {
            chunk_id: format!("URBAN_{}_0", number),
            law_id: "URBAN".to_string(),
            article_number: number.to_string(),
            section: String::new(),
            chunk_index: 0,
            chunk_text: format!("{} 본문", number),
            embedding,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-4);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-4);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-4);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_similarity_is_clamped() {
        let mut hit = VectorHit {
            chunk_id: String::new(),
            law_id: String::new(),
            article_number: String::new(),
            section: String::new(),
            chunk_index: 0,
            chunk_text: String::new(),
            distance: 1.6,
        };
        assert_eq!(hit.similarity(), 0.0);
        hit.distance = 0.25;
        assert!((hit.similarity() - 0.75).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_memory_store_search_and_replace() {
        let store = MemoryVectorStore::new();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.search(&[1.0, 0.0], 5).await.unwrap().is_empty());

        store
            .replace_all(&[
                entry("제1조", vec![0.0, 1.0]),
                entry("제2조", vec![1.0, 0.1]),
                entry("제3조", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].article_number, "제3조");
        assert_eq!(hits[1].article_number, "제2조");
        assert!(hits[0].distance <= hits[1].distance);

        store.replace_all(&[entry("제9조", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
