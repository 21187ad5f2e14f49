//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 쿼리는 `RETRIEVAL_QUERY`, 조문 청크는 `RETRIEVAL_DOCUMENT` 작업 유형으로 임베딩합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env(&config.gemini)?;
//! let vector = embedder.embed_query("재개발 조합 설립 요건").await?;
//! ```

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;
use crate::gemini::{has_api_key, GeminiClient};

/// 지원하는 출력 차원 (MRL)
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// batchEmbedContents 한 번에 보낼 수 있는 최대 요청 수
const MAX_BATCH: usize = 100;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 작업 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    RetrievalQuery,
    RetrievalDocument,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetrievalQuery => "RETRIEVAL_QUERY",
            Self::RetrievalDocument => "RETRIEVAL_DOCUMENT",
        }
    }
}

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 검색 쿼리 임베딩
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// 문서 배치 임베딩 (입력 순서 유지)
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Google Gemini 임베딩 구현체
///
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Clone)]
pub struct GeminiEmbedding {
    client: GeminiClient,
    model: String,
    dimension: usize,
}

/// embedContent 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    pub fn new(client: GeminiClient, config: &GeminiConfig) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&config.embedding_dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                config.embedding_dimension
            );
        }

        Ok(Self {
            client,
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env(config: &GeminiConfig) -> Result<Self> {
        let client = GeminiClient::from_env(Duration::from_secs(config.request_timeout_secs))?;
        Self::new(client, config)
    }

    fn request(&self, text: &str, task: TaskType) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task.as_str(),
            output_dimensionality: self.dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let response: EmbedResponse = self
            .client
            .call(&self.model, "embedContent", &self.request(text, TaskType::RetrievalQuery))
            .await?;
        Ok(response.embedding.values)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(MAX_BATCH).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({} texts, {} done)",
                i + 1,
                batch.len(),
                results.len()
            );

            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|t| self.request(t, TaskType::RetrievalDocument))
                    .collect(),
            };
            let response: BatchEmbedResponse = self
                .client
                .call(&self.model, "batchEmbedContents", &request)
                .await?;

            if response.embeddings.len() != batch.len() {
                anyhow::bail!(
                    "Embedding count mismatch: sent {}, received {}",
                    batch.len(),
                    response.embeddings.len()
                );
            }
            results.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 프로바이더 생성
///
/// API 키가 없으면 `None`을 반환합니다. 이 경우 벡터 검색은 비활성화되고
/// 하이브리드 검색은 키워드 + 그래프로만 동작합니다.
pub fn create_embedder(config: &GeminiConfig) -> Result<Option<GeminiEmbedding>> {
    if !has_api_key() {
        tracing::warn!("GEMINI_API_KEY not set; vector search disabled");
        return Ok(None);
    }

    let embedder = GeminiEmbedding::from_env(config)?;
    tracing::info!(
        "Using Gemini API embedding ({}, dimension: {})",
        embedder.model,
        embedder.dimension
    );
    Ok(Some(embedder))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiClient {
        GeminiClient::new("fake_key".to_string(), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_invalid_dimension() {
        let config = GeminiConfig {
            embedding_dimension: 999,
            ..Default::default()
        };
        let err = GeminiEmbedding::new(client(), &config).unwrap_err();
        assert!(err.to_string().contains("Invalid dimension"));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in SUPPORTED_DIMENSIONS {
            let config = GeminiConfig {
                embedding_dimension: dim,
                ..Default::default()
            };
            let embedder = GeminiEmbedding::new(client(), &config).unwrap();
            assert_eq!(embedder.dimension(), dim);
        }
    }

    #[test]
    fn test_request_body_uses_task_type() {
        let embedder = GeminiEmbedding::new(client(), &GeminiConfig::default()).unwrap();
        let body =
            serde_json::to_value(embedder.request("조합 설립", TaskType::RetrievalQuery)).unwrap();

        assert_eq!(body["model"], "models/gemini-embedding-001");
        assert_eq!(body["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(body["outputDimensionality"], 768);
        assert_eq!(body["content"]["parts"][0]["text"], "조합 설립");
    }

    #[test]
    fn test_batch_response_parsing() {
        let raw = r#"{"embeddings":[{"values":[0.1,0.2]},{"values":[0.3,0.4]}]}"#;
        let parsed: BatchEmbedResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_empty_query_skips_api() {
        let embedder = GeminiEmbedding::new(client(), &GeminiConfig::default()).unwrap();
        let v = embedder.embed_query("   ").await.unwrap();
        assert_eq!(v.len(), 768);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
