//! 검색 후보 (Candidate) 및 소스 트레이트

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SourceError;
use crate::graph::{ArticleKey, StoredArticle};

// ============================================================================
// Types
// ============================================================================

/// 검색 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// BM25 키워드 검색
    Keyword,
    /// 임베딩 벡터 검색
    Vector,
    /// 그래프 확장
    Graph,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Vector => "vector",
            Self::Graph => "graph",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 후보 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandidateMetadata {
    pub law_id: String,
    pub article_number: String,
    pub law_name: Option<String>,
    pub section: Option<String>,
}

/// 검색 후보
///
/// 하나의 조문에 대한 검색 결과. 하이브리드 결과에서는 조문당 하나만 존재합니다.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub content: String,
    pub metadata: CandidateMetadata,
    /// 벡터 유사도 (0.0 ~ 1.0)
    pub vector_score: f32,
    /// BM25 원점수 (>= 0)
    pub keyword_score: f32,
    pub normalized_vector_score: f32,
    pub normalized_keyword_score: f32,
    /// 시드로부터의 홉 수 (시드 자신은 0)
    pub graph_hop_distance: Option<u32>,
    /// 확장 시드 조문 번호
    pub related_to: Option<String>,
    pub combined_score: f32,
    /// 이 후보를 찾은 소스
    pub methods: BTreeSet<SearchMethod>,
}

impl Candidate {
    /// 빈 점수의 후보 생성
    pub fn new(content: impl Into<String>, metadata: CandidateMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
            vector_score: 0.0,
            keyword_score: 0.0,
            normalized_vector_score: 0.0,
            normalized_keyword_score: 0.0,
            graph_hop_distance: None,
            related_to: None,
            combined_score: 0.0,
            methods: BTreeSet::new(),
        }
    }

    /// 저장된 조문에서 후보 생성
    pub fn from_article(stored: &StoredArticle, method: SearchMethod) -> Self {
        let article = &stored.article;
        let section = (!article.section.is_empty()).then(|| article.section.clone());

        let mut candidate = Self::new(
            article.content.clone(),
            CandidateMetadata {
                law_id: article.law_id.clone(),
                article_number: article.article_number.clone(),
                law_name: stored.law_name.clone(),
                section,
            },
        );
        candidate.methods.insert(method);
        candidate
    }

    /// 중복 제거 키
    pub fn key(&self) -> ArticleKey {
        ArticleKey::new(&self.metadata.law_id, &self.metadata.article_number)
    }

    /// 그래프 확장으로만 발견된 후보인지
    pub fn is_graph_only(&self) -> bool {
        !self.methods.contains(&SearchMethod::Keyword)
            && !self.methods.contains(&SearchMethod::Vector)
    }

    /// 같은 조문의 다른 후보를 병합
    ///
    /// 소스별 점수는 최대값, 홉 수는 최소값, 소스는 합집합.
    /// 본문은 더 긴 쪽을, 메타데이터는 비어 있는 필드만 채웁니다.
    pub fn absorb(&mut self, other: Candidate) {
        self.vector_score = self.vector_score.max(other.vector_score);
        self.keyword_score = self.keyword_score.max(other.keyword_score);

        match (self.graph_hop_distance, other.graph_hop_distance) {
            (Some(a), Some(b)) if b < a => {
                self.graph_hop_distance = Some(b);
                self.related_to = other.related_to.clone();
            }
            (None, Some(b)) => {
                self.graph_hop_distance = Some(b);
                self.related_to = other.related_to.clone();
            }
            _ => {}
        }

        if other.content.chars().count() > self.content.chars().count() {
            self.content = other.content;
        }

        if self.metadata.law_name.is_none() {
            self.metadata.law_name = other.metadata.law_name;
        }
        if self.metadata.section.is_none() {
            self.metadata.section = other.metadata.section;
        }

        self.methods.extend(other.methods);
    }
}

// ============================================================================
// CandidateSource Trait
// ============================================================================

/// 후보를 생산하는 검색 소스
///
/// 키워드/벡터 검색이 구현합니다. 실패는 `SourceError`로 보고되며
/// 하이브리드 엔진이 부분 결과로 처리합니다.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>, SourceError>;

    fn method(&self) -> SearchMethod;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(number: &str, content: &str) -> Candidate {
        Candidate::new(
            content,
            CandidateMetadata {
                law_id: "URBAN".to_string(),
                article_number: number.to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_absorb_keeps_max_scores_and_min_hop() {
        let mut a = candidate("제24조", "짧은 본문");
        a.keyword_score = 3.2;
        a.graph_hop_distance = Some(2);
        a.related_to = Some("제26조".to_string());
        a.methods.insert(SearchMethod::Keyword);

        let mut b = candidate("제24조", "조금 더 긴 본문입니다");
        b.vector_score = 0.81;
        b.keyword_score = 1.0;
        b.graph_hop_distance = Some(0);
        b.related_to = Some("제24조".to_string());
        b.metadata.law_name = Some("도시 및 주거환경정비법".to_string());
        b.methods.insert(SearchMethod::Vector);
        b.methods.insert(SearchMethod::Graph);

        a.absorb(b);

        assert_eq!(a.keyword_score, 3.2);
        assert_eq!(a.vector_score, 0.81);
        assert_eq!(a.graph_hop_distance, Some(0));
        assert_eq!(a.related_to.as_deref(), Some("제24조"));
        assert_eq!(a.content, "조금 더 긴 본문입니다");
        assert_eq!(a.metadata.law_name.as_deref(), Some("도시 및 주거환경정비법"));
        assert_eq!(a.methods.len(), 3);
        assert!(!a.is_graph_only());
    }

    #[test]
    fn test_graph_only() {
        let mut c = candidate("제25조", "본문");
        c.methods.insert(SearchMethod::Graph);
        assert!(c.is_graph_only());
        assert_eq!(c.key().to_string(), "URBAN_제25조");
    }

    #[test]
    fn test_search_method_display() {
        assert_eq!(SearchMethod::Keyword.to_string(), "keyword");
        assert_eq!(SearchMethod::Vector.to_string(), "vector");
        assert_eq!(SearchMethod::Graph.to_string(), "graph");
    }
}
