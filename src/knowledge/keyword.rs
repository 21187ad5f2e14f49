//! 키워드 인덱스 - Okapi BM25
//!
//! 전체 조문으로 한 번 구축되고 이후 읽기 전용입니다.
//! 재구축은 새 인덱스를 만든 뒤 `KeywordIndexHandle::swap`으로 교체합니다.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::config::KeywordConfig;
use crate::error::SourceError;
use crate::graph::StoredArticle;

use super::candidate::{Candidate, CandidateSource, SearchMethod};

/// 이 길이(문자 수) 이하의 조문은 인덱싱하지 않음
const MIN_INDEXED_CHARS: usize = 10;

// ============================================================================
// Bm25Index
// ============================================================================

/// BM25 인덱스
///
/// 토큰화는 공백 분리만 합니다 (형태소 분석 없음).
/// IDF가 음수인 흔한 단어는 `epsilon * 평균 IDF`로 대체합니다.
pub struct Bm25Index {
    params: KeywordConfig,
    docs: Vec<StoredArticle>,
    doc_lengths: Vec<usize>,
    /// term -> [(문서 위치, 빈도)]
    postings: HashMap<String, Vec<(usize, u32)>>,
    idf: HashMap<String, f32>,
    avg_doc_length: f32,
}

impl Bm25Index {
    /// 빈 인덱스
    pub fn empty(params: KeywordConfig) -> Self {
        Self {
            params,
            docs: Vec::new(),
            doc_lengths: Vec::new(),
            postings: HashMap::new(),
            idf: HashMap::new(),
            avg_doc_length: 0.0,
        }
    }

    /// 조문 목록으로 인덱스 구축
    pub fn build(articles: Vec<StoredArticle>, params: KeywordConfig) -> Self {
        let mut index = Self::empty(params);

        for stored in articles {
            if stored.article.content.trim().chars().count() <= MIN_INDEXED_CHARS {
                continue;
            }

            let position = index.docs.len();
            let mut frequencies: HashMap<&str, u32> = HashMap::new();
            let mut length = 0;
            for token in stored.article.content.split_whitespace() {
                *frequencies.entry(token).or_insert(0) += 1;
                length += 1;
            }

            for (term, tf) in frequencies {
                index
                    .postings
                    .entry(term.to_string())
                    .or_default()
                    .push((position, tf));
            }

            index.doc_lengths.push(length);
            index.docs.push(stored);
        }

        if !index.docs.is_empty() {
            let total: usize = index.doc_lengths.iter().sum();
            index.avg_doc_length = total as f32 / index.docs.len() as f32;
        }
        index.compute_idf();

        tracing::debug!(
            "BM25 index built: {} documents, {} terms",
            index.docs.len(),
            index.postings.len()
        );
        index
    }

    fn compute_idf(&mut self) {
        let n = self.docs.len() as f32;
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();

        for (term, postings) in &self.postings {
            let df = postings.len() as f32;
            let idf = (n - df + 0.5).ln() - (df + 0.5).ln();
            idf_sum += idf;
            if idf < 0.0 {
                negative.push(term.clone());
            }
            self.idf.insert(term.clone(), idf);
        }

        if self.idf.is_empty() {
            return;
        }

        let floor = self.params.epsilon * (idf_sum / self.idf.len() as f32);
        for term in negative {
            self.idf.insert(term, floor);
        }
    }

    /// 인덱싱된 문서 수
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// 고유 단어 수
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// 문서별 BM25 점수 (인덱스 순서)
    fn scores(&self, query: &str) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.docs.len()];
        let KeywordConfig { k1, b, .. } = self.params;

        for token in query.split_whitespace() {
            let (Some(postings), Some(&idf)) = (self.postings.get(token), self.idf.get(token))
            else {
                continue;
            };

            for &(position, tf) in postings {
                let tf = tf as f32;
                let dl = self.doc_lengths[position] as f32;
                let norm = 1.0 - b + b * dl / self.avg_doc_length;
                scores[position] += idf * (tf * (k1 + 1.0)) / (tf + k1 * norm);
            }
        }

        scores
    }

    /// 상위 k개 조문 검색
    ///
    /// 점수 > 0인 조문만 반환합니다. 동점은 인덱스(코퍼스) 순서를 유지합니다.
    pub fn search(&self, query: &str, k: usize) -> Vec<Candidate> {
        if k == 0 || self.docs.is_empty() || query.trim().is_empty() {
            return vec![];
        }

        let scores = self.scores(query);
        let mut ranked: Vec<(usize, f32)> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // sort_by는 안정 정렬이므로 동점은 코퍼스 순서
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);

        ranked
            .into_iter()
            .map(|(position, score)| {
                let mut candidate = Candidate::from_article(&self.docs[position], SearchMethod::Keyword);
                candidate.keyword_score = score;
                candidate
            })
            .collect()
    }
}

// ============================================================================
// KeywordIndexHandle
// ============================================================================

/// 교체 가능한 BM25 인덱스 핸들
///
/// 검색은 현재 인덱스의 Arc를 복제해서 사용하므로
/// 재구축 중에도 이전 인덱스로 계속 응답합니다.
pub struct KeywordIndexHandle {
    current: RwLock<Arc<Bm25Index>>,
}

impl KeywordIndexHandle {
    pub fn new(index: Bm25Index) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// 현재 인덱스
    pub fn load(&self) -> Arc<Bm25Index> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// 새 인덱스로 교체
    pub fn swap(&self, index: Bm25Index) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(index);
    }
}

// ============================================================================
// KeywordSearch
// ============================================================================

/// 키워드 검색 소스
pub struct KeywordSearch {
    index: Arc<KeywordIndexHandle>,
}

impl KeywordSearch {
    pub fn new(index: Arc<KeywordIndexHandle>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl CandidateSource for KeywordSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>, SourceError> {
        Ok(self.index.load().search(query, k))
    }

    fn method(&self) -> SearchMethod {
        SearchMethod::Keyword
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::stored;

    fn corpus() -> Vec<StoredArticle> {
        vec![
            stored("URBAN", "제24조", 0, "재개발 조합 설립 인가 요건 은 다음 과 같다"),
            stored("URBAN", "제25조", 1, "토지등소유자 동의 요건 은 다음 과 같다"),
            stored("URBAN", "제26조", 2, "정비구역 지정 절차 는 다음 과 같다"),
            stored("URBAN", "제27조", 3, "정비계획 수립 시기 는 다음 과 같다"),
            stored("URBAN", "제28조", 4, "사업시행 계획 인가 는 다음 과 같다"),
            stored("URBAN", "제29조", 5, "짧다"),
        ]
    }

    #[test]
    fn test_short_articles_are_not_indexed() {
        let index = Bm25Index::build(corpus(), KeywordConfig::default());
        assert_eq!(index.len(), 5);
        assert!(index.search("짧다", 10).is_empty());
    }

    #[test]
    fn test_rare_term_ranks_first() {
        let index = Bm25Index::build(corpus(), KeywordConfig::default());
        let results = index.search("재개발 조합", 10);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.article_number, "제24조");
        assert!(results[0].keyword_score > 0.0);
        assert_eq!(results[0].vector_score, 0.0);
        assert!(results[0].methods.contains(&SearchMethod::Keyword));
    }

    #[test]
    fn test_more_matching_terms_score_higher() {
        let index = Bm25Index::build(corpus(), KeywordConfig::default());
        let results = index.search("조합 설립 동의", 10);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.article_number, "제24조");
        assert_eq!(results[1].metadata.article_number, "제25조");
        assert!(results[0].keyword_score > results[1].keyword_score);
    }

    #[test]
    fn test_common_terms_use_epsilon_floor() {
        let index = Bm25Index::build(corpus(), KeywordConfig::default());
        // "다음"은 모든 문서에 등장 → 음수 IDF가 양수 floor로 대체됨
        let results = index.search("다음", 10);
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.keyword_score > 0.0));
        // 길이가 같은 문서끼리는 코퍼스 순서, 가장 긴 제24조가 마지막
        assert_eq!(results[0].metadata.article_number, "제25조");
        assert_eq!(results[1].metadata.article_number, "제26조");
        assert_eq!(results[4].metadata.article_number, "제24조");
    }

    #[test]
    fn test_empty_query_and_no_match() {
        let index = Bm25Index::build(corpus(), KeywordConfig::default());
        assert!(index.search("", 10).is_empty());
        assert!(index.search("   ", 10).is_empty());
        assert!(index.search("재건축", 10).is_empty());
        assert!(index.search("재개발", 0).is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = Bm25Index::empty(KeywordConfig::default());
        assert!(index.is_empty());
        assert!(index.search("재개발", 5).is_empty());
    }

    #[tokio::test]
    async fn test_handle_swap() {
        let handle = Arc::new(KeywordIndexHandle::new(Bm25Index::empty(
            KeywordConfig::default(),
        )));
        let search = KeywordSearch::new(Arc::clone(&handle));
        assert!(search.search("재개발", 5).await.unwrap().is_empty());

        let before = handle.load();
        handle.swap(Bm25Index::build(corpus(), KeywordConfig::default()));

        assert!(before.is_empty());
        assert_eq!(search.search("재개발", 5).await.unwrap().len(), 1);
    }
}
