//! 설정 모듈
//!
//! 기본값 → `<data_dir>/config.json` → 환경변수 순서로 덮어씁니다.
//! 저장 위치: ~/.legal-graph-rag/

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 설정 파일 이름
pub const CONFIG_FILE_NAME: &str = "config.json";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.legal-graph-rag/)
///
/// `LEGAL_RAG_DATA_DIR` 환경변수가 있으면 우선합니다.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LEGAL_RAG_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".legal-graph-rag")
}

// ============================================================================
// Sections
// ============================================================================

/// Gemini API 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// 임베딩 모델
    pub embedding_model: String,
    /// 임베딩 차원 (768, 1536, 3072)
    pub embedding_dimension: usize,
    /// 답변 생성 모델
    pub chat_model: String,
    /// 답변 생성 temperature
    pub temperature: f32,
    /// HTTP 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            embedding_model: "gemini-embedding-001".to_string(),
            embedding_dimension: 768,
            chat_model: "gemini-1.5-flash".to_string(),
            temperature: 0.1,
            request_timeout_secs: 30,
        }
    }
}

/// 점수 결합 방식
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FusionStrategy {
    /// 소스별 최대값 정규화 후 가중합
    Weighted,
    /// Reciprocal Rank Fusion (순위 기반)
    ReciprocalRank { k: f32 },
}

impl Default for FusionStrategy {
    fn default() -> Self {
        Self::Weighted
    }
}

/// 하이브리드 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 기본 결과 수
    pub top_k: usize,
    /// 벡터 점수 가중치
    pub vector_weight: f32,
    /// 키워드 점수 가중치
    pub keyword_weight: f32,
    /// 벡터 유사도 임계값 (미만은 병합 전에 버림)
    pub similarity_threshold: f32,
    /// 그래프 확장으로만 찾은 조문에 주는 고정 점수 (0이면 순수 recall 확장)
    pub graph_only_score: f32,
    /// 소스별 제한 시간 (ms)
    pub source_timeout_ms: u64,
    /// 쿼리 최대 길이 (문자 수, 초과분은 잘라냄)
    pub max_query_chars: usize,
    /// 점수 결합 방식
    pub fusion: FusionStrategy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            vector_weight: 0.7,
            keyword_weight: 0.3,
            similarity_threshold: 0.7,
            graph_only_score: 0.05,
            source_timeout_ms: 5_000,
            max_query_chars: 1_000,
            fusion: FusionStrategy::Weighted,
        }
    }
}

impl RetrievalConfig {
    /// 소스별 제한 시간
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

/// 그래프 확장 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// 최대 홉 수
    pub max_depth: u32,
    /// BELONGS_TO 형제 조문 포함 여부
    pub include_siblings: bool,
    /// 시드 앞뒤로 포함할 형제 조문 수
    pub sibling_window: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            include_siblings: true,
            sibling_window: 1,
        }
    }
}

/// 청킹 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 간 중첩 (문자 수)
    pub chunk_overlap: usize,
    /// 이보다 짧은 청크는 버림
    pub min_chunk_chars: usize,
    /// 임베딩 배치 크기
    pub embed_batch_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            min_chunk_chars: 20,
            embed_batch_size: 100,
        }
    }
}

/// BM25 파라미터
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub k1: f32,
    pub b: f32,
    /// 음수 IDF 대체 비율 (평균 IDF 대비)
    pub epsilon: f32,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

// ============================================================================
// RagConfig
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// 데이터 디렉토리 (None이면 get_data_dir())
    pub data_dir: Option<PathBuf>,
    pub gemini: GeminiConfig,
    pub retrieval: RetrievalConfig,
    pub expansion: ExpansionConfig,
    pub chunking: ChunkingConfig,
    pub keyword: KeywordConfig,
}

impl RagConfig {
    /// 기본 위치에서 설정 로드
    ///
    /// 설정 파일이 없으면 기본값을 사용합니다.
    pub fn load() -> Result<Self> {
        let data_dir = get_data_dir();
        let mut config = Self::load_file(&data_dir.join(CONFIG_FILE_NAME))?.unwrap_or_default();
        if config.data_dir.is_none() {
            config.data_dir = Some(data_dir);
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// JSON 설정 파일 로드 (없으면 None)
    pub fn load_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(Some(config))
    }

    /// 환경변수 덮어쓰기
    pub fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("GEMINI_CHAT_MODEL") {
            if !model.is_empty() {
                self.gemini.chat_model = model;
            }
        }
        if let Some(dim) = env_parse::<usize>("EMBEDDING_DIMENSION") {
            self.gemini.embedding_dimension = dim;
        }
        if let Some(size) = env_parse::<usize>("CHUNK_SIZE") {
            self.chunking.chunk_size = size;
        }
        if let Some(overlap) = env_parse::<usize>("CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = overlap;
        }
        if let Some(threshold) = env_parse::<f32>("SIMILARITY_THRESHOLD") {
            self.retrieval.similarity_threshold = threshold;
        }
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        for (name, value) in [
            ("vector_weight", r.vector_weight),
            ("keyword_weight", r.keyword_weight),
            ("graph_only_score", r.graph_only_score),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("retrieval.{} must be finite and >= 0 (got {})", name, value);
            }
        }
        if r.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be > 0");
        }
        if !(0.0..=1.0).contains(&r.similarity_threshold) {
            anyhow::bail!(
                "retrieval.similarity_threshold must be within [0, 1] (got {})",
                r.similarity_threshold
            );
        }
        if self.chunking.chunk_size == 0 || self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        Ok(())
    }

    /// 실제 데이터 디렉토리
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(get_data_dir)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.vector_weight, 0.7);
        assert_eq!(config.retrieval.keyword_weight, 0.3);
        assert_eq!(config.expansion.max_depth, 2);
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.chunk_overlap, 50);
    }

    #[test]
    fn test_validate_rejects_negative_weight() {
        let mut config = RagConfig::default();
        config.retrieval.keyword_weight = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overlap_larger_than_chunk() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = 512;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "retrieval": { "top_k": 8, "fusion": { "kind": "reciprocal_rank", "k": 60.0 } } }"#,
        )
        .unwrap();

        let config = RagConfig::load_file(&path).unwrap().unwrap();
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.vector_weight, 0.7);
        assert_eq!(
            config.retrieval.fusion,
            FusionStrategy::ReciprocalRank { k: 60.0 }
        );
        assert_eq!(config.gemini.embedding_dimension, 768);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded = RagConfig::load_file(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }
}
