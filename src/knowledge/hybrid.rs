//! 하이브리드 검색 - 키워드(BM25) + 벡터 + 그래프 확장 통합
//!
//! 1. 키워드 검색(2k) → 키워드 결과를 시드로 그래프 확장, 벡터 검색(2k)을 병렬 실행
//! 2. `law_id_article_number` 키로 병합
//! 3. 소스별 최대값으로 정규화
//! 4. 가중합(또는 RRF)으로 결합
//! 5. 점수 내림차순, 동점은 조문 번호 오름차순으로 정렬 후 k개 반환
//!
//! 소스 하나가 실패하거나 제한 시간을 넘기면 나머지 소스로 계속 진행하고
//! 실패 내역을 `HybridSearchResult::failures`에 담습니다.
//!
//! ref: https://www.elastic.co/blog/hybrid-search-rrf

use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{ExpansionConfig, FusionStrategy, RetrievalConfig};
use crate::error::{RetrievalError, SourceError};
use crate::graph::{compare_article_numbers, ArticleKey, GraphStore};

use super::candidate::{Candidate, CandidateSource, SearchMethod};
use super::expansion::GraphExpander;

// ============================================================================
// Types
// ============================================================================

/// 벡터/키워드 가중치
///
/// 음수나 NaN은 허용하지 않습니다. 합이 1일 필요는 없습니다.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    vector: f32,
    keyword: f32,
}

impl HybridWeights {
    pub fn new(vector: f32, keyword: f32) -> Result<Self, RetrievalError> {
        for (name, value) in [("vector", vector), ("keyword", keyword)] {
            if !value.is_finite() || value < 0.0 {
                return Err(RetrievalError::InvalidWeight { name, value });
            }
        }
        Ok(Self { vector, keyword })
    }

    pub fn vector(&self) -> f32 {
        self.vector
    }

    pub fn keyword(&self) -> f32 {
        self.keyword
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            vector: 0.7,
            keyword: 0.3,
        }
    }
}

/// 실패한 소스
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub method: SearchMethod,
    pub message: String,
}

impl From<&SourceError> for SourceFailure {
    fn from(err: &SourceError) -> Self {
        Self {
            method: err.method(),
            message: err.to_string(),
        }
    }
}

/// 하이브리드 검색 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct HybridSearchResult {
    /// combined_score 내림차순
    pub candidates: Vec<Candidate>,
    /// 응답하지 못한 소스
    pub failures: Vec<SourceFailure>,
}

impl HybridSearchResult {
    /// 일부 소스가 실패한 결과인지
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// 단일 소스 결과를 같은 형태로 감싸기 (실패는 failures로)
    pub fn from_source(result: Result<Vec<Candidate>, SourceError>) -> Self {
        match result {
            Ok(candidates) => Self {
                candidates,
                failures: vec![],
            },
            Err(e) => Self {
                candidates: vec![],
                failures: vec![SourceFailure::from(&e)],
            },
        }
    }
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
pub struct HybridRetriever {
    keyword: Arc<dyn CandidateSource>,
    vector: Arc<dyn CandidateSource>,
    graph: Arc<dyn GraphStore>,
    expander: Arc<GraphExpander>,
    config: RetrievalConfig,
    weights: HybridWeights,
}

impl HybridRetriever {
    pub fn new(
        keyword: Arc<dyn CandidateSource>,
        vector: Arc<dyn CandidateSource>,
        graph: Arc<dyn GraphStore>,
        expansion: ExpansionConfig,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        let weights = HybridWeights::new(config.vector_weight, config.keyword_weight)?;
        Ok(Self {
            keyword,
            vector,
            expander: Arc::new(GraphExpander::new(Arc::clone(&graph), expansion)),
            graph,
            config,
            weights,
        })
    }

    /// 설정의 기본 k, 가중치로 검색
    pub async fn search(&self, query: &str) -> HybridSearchResult {
        self.hybrid_search(query, self.config.top_k, self.weights).await
    }

    /// 하이브리드 검색
    pub async fn hybrid_search(
        &self,
        query: &str,
        k: usize,
        weights: HybridWeights,
    ) -> HybridSearchResult {
        let Some(query) = self.prepare_query(query) else {
            return HybridSearchResult::default();
        };
        if k == 0 {
            return HybridSearchResult::default();
        }

        let fetch = k * 2;
        let timeout = self.config.source_timeout();

        // 소스마다 별도 태스크 (제한 시간은 태스크 핸들에 적용)
        let keyword_branch = async {
            let keyword = Arc::clone(&self.keyword);
            let q = query.clone();
            let seeds = run_source(SearchMethod::Keyword, timeout, async move {
                keyword.search(&q, fetch).await
            })
            .await;

            let expanded = match &seeds {
                Ok(seeds) if !seeds.is_empty() => {
                    let expander = Arc::clone(&self.expander);
                    let seeds = seeds.clone();
                    Some(
                        run_source(SearchMethod::Graph, timeout, async move {
                            expander.expand(&seeds, expander.max_depth()).await
                        })
                        .await,
                    )
                }
                _ => None,
            };
            (seeds, expanded)
        };
        let vector_branch = {
            let vector = Arc::clone(&self.vector);
            let q = query.clone();
            run_source(SearchMethod::Vector, timeout, async move {
                vector.search(&q, fetch).await
            })
        };

        let ((keyword_result, graph_result), vector_result) =
            tokio::join!(keyword_branch, vector_branch);

        let mut failures = Vec::new();
        let mut pools: Vec<Vec<Candidate>> = Vec::new();

        for result in [Some(keyword_result), graph_result, Some(vector_result)]
            .into_iter()
            .flatten()
        {
            match result {
                Ok(candidates) => pools.push(candidates),
                Err(e) => {
                    tracing::warn!("Degraded hybrid search: {}", e);
                    failures.push(SourceFailure::from(&e));
                }
            }
        }

        let mut candidates = merge(pools);
        normalize(&mut candidates);
        self.combine(&mut candidates, weights);
        rank(&mut candidates);
        candidates.truncate(k);
        self.hydrate_law_names(&mut candidates).await;

        tracing::debug!(
            "Hybrid search returned {} candidates ({} failed sources)",
            candidates.len(),
            failures.len()
        );

        HybridSearchResult {
            candidates,
            failures,
        }
    }

    /// 키워드 검색만 수행
    ///
    /// 정규화/결합 없이 BM25 원점수를 `combined_score`로 씁니다.
    pub async fn keyword_only(&self, query: &str, k: usize) -> Result<Vec<Candidate>, SourceError> {
        let Some(query) = self.prepare_query(query) else {
            return Ok(vec![]);
        };
        let keyword = Arc::clone(&self.keyword);
        let mut candidates = run_source(SearchMethod::Keyword, self.config.source_timeout(), async move {
            keyword.search(&query, k).await
        })
        .await?;
        for c in candidates.iter_mut() {
            c.combined_score = c.keyword_score;
        }
        self.hydrate_law_names(&mut candidates).await;
        Ok(candidates)
    }

    /// 벡터 검색만 수행 (유사도를 `combined_score`로)
    pub async fn vector_only(&self, query: &str, k: usize) -> Result<Vec<Candidate>, SourceError> {
        let Some(query) = self.prepare_query(query) else {
            return Ok(vec![]);
        };
        let vector = Arc::clone(&self.vector);
        let mut candidates = run_source(SearchMethod::Vector, self.config.source_timeout(), async move {
            vector.search(&query, k).await
        })
        .await?;
        for c in candidates.iter_mut() {
            c.combined_score = c.vector_score;
        }
        self.hydrate_law_names(&mut candidates).await;
        Ok(candidates)
    }

    /// 검색 설정
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// 공백 쿼리는 None, 긴 쿼리는 문자 경계에서 자름
    fn prepare_query(&self, query: &str) -> Option<String> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.chars().count() > self.config.max_query_chars {
            tracing::debug!(
                "Query truncated to {} chars",
                self.config.max_query_chars
            );
            return Some(trimmed.chars().take(self.config.max_query_chars).collect());
        }
        Some(trimmed.to_string())
    }

    fn combine(&self, candidates: &mut [Candidate], weights: HybridWeights) {
        match self.config.fusion {
            FusionStrategy::Weighted => {
                for c in candidates.iter_mut() {
                    c.combined_score = if c.is_graph_only() {
                        self.config.graph_only_score
                    } else {
                        weights.vector * c.normalized_vector_score
                            + weights.keyword * c.normalized_keyword_score
                    };
                }
            }
            FusionStrategy::ReciprocalRank { k } => {
                let k = k.max(0.0);
                let keyword_ranks = ranks_by(candidates, |c| c.keyword_score);
                let vector_ranks = ranks_by(candidates, |c| c.vector_score);

                for (i, c) in candidates.iter_mut().enumerate() {
                    c.combined_score = if c.is_graph_only() {
                        self.config.graph_only_score / (k + 1.0)
                    } else {
                        let rrf = |rank: Option<&usize>, weight: f32| {
                            rank.map_or(0.0, |r| weight / (k + *r as f32 + 1.0))
                        };
                        rrf(keyword_ranks.get(&i), weights.keyword)
                            + rrf(vector_ranks.get(&i), weights.vector)
                    };
                }
            }
        }
    }

    /// 법령 노드에서 법령명 채우기 (실패해도 결과에는 영향 없음)
    async fn hydrate_law_names(&self, candidates: &mut [Candidate]) {
        let mut cache: HashMap<String, Option<String>> = HashMap::new();

        for c in candidates.iter_mut().filter(|c| c.metadata.law_name.is_none()) {
            let law_id = c.metadata.law_id.clone();
            if !cache.contains_key(&law_id) {
                let name = match self.graph.get_law(&law_id).await {
                    Ok(law) => law.map(|l| l.name),
                    Err(e) => {
                        tracing::warn!("Failed to load law {}: {:#}", law_id, e);
                        None
                    }
                };
                cache.insert(law_id.clone(), name);
            }
            c.metadata.law_name = cache.get(&law_id).cloned().flatten();
        }
    }
}

// ============================================================================
// Pipeline Steps
// ============================================================================

/// 소스 검색을 별도 태스크로 실행하고 제한 시간을 적용
///
/// 시간을 넘기면 태스크를 취소하고 `SourceError::Timeout`을 돌려줍니다.
async fn run_source<T>(
    method: SearchMethod,
    after: Duration,
    fut: impl Future<Output = Result<T, SourceError>> + Send + 'static,
) -> Result<T, SourceError>
where
    T: Send + 'static,
{
    let mut handle = tokio::spawn(fut);
    match tokio::time::timeout(after, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(SourceError::unavailable(method, e)),
        Err(_) => {
            handle.abort();
            Err(SourceError::Timeout { method, after })
        }
    }
}

/// 조문 키 기준 병합 (처음 등장한 순서 유지)
fn merge(pools: Vec<Vec<Candidate>>) -> Vec<Candidate> {
    let mut index: HashMap<ArticleKey, usize> = HashMap::new();
    let mut merged: Vec<Candidate> = Vec::new();

    for candidate in pools.into_iter().flatten() {
        let key = candidate.key();
        match index.get(&key) {
            Some(&i) => merged[i].absorb(candidate),
            None => {
                index.insert(key, merged.len());
                merged.push(candidate);
            }
        }
    }

    merged
}

/// 소스별 최대값으로 [0, 1] 정규화 (최대값이 0이면 1로 나눔)
fn normalize(candidates: &mut [Candidate]) {
    let max_of = |f: fn(&Candidate) -> f32| {
        let max = candidates.iter().map(f).fold(0.0f32, f32::max);
        if max > 0.0 {
            max
        } else {
            1.0
        }
    };
    let max_vector = max_of(|c| c.vector_score);
    let max_keyword = max_of(|c| c.keyword_score);

    for c in candidates.iter_mut() {
        c.normalized_vector_score = (c.vector_score / max_vector).clamp(0.0, 1.0);
        c.normalized_keyword_score = (c.keyword_score / max_keyword).clamp(0.0, 1.0);
    }
}

/// 점수 > 0인 후보의 순위 (0-based, 점수 내림차순)
fn ranks_by(candidates: &[Candidate], score: fn(&Candidate) -> f32) -> HashMap<usize, usize> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, score(c)))
        .filter(|(_, s)| *s > 0.0)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored
        .into_iter()
        .enumerate()
        .map(|(rank, (i, _))| (i, rank))
        .collect()
}

/// 점수 내림차순, 동점은 조문 번호 → law_id 오름차순
fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                compare_article_numbers(&a.metadata.article_number, &b.metadata.article_number)
            })
            .then_with(|| a.metadata.law_id.cmp(&b.metadata.law_id))
    });
}

// ============================================================================
// Tests
// ============================================================================
