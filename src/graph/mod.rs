//! Graph 모듈 - 법령/조문 그래프 저장소
//!
//! - Law, Article 노드와 BELONGS_TO / REFERENCES 관계
//! - GraphStore: 외부 그래프 저장소 경계 (SQLite 구현 제공)
//! - ReferenceExtractor: 조문 본문에서 참조 조문 번호 추출

mod model;
mod references;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use model::{
    compare_article_numbers, Article, ArticleKey, ArticleNumber, GraphStats, Law, LawCategory,
    LawSummary, LawWrite, StoredArticle,
};
pub use references::{Anaphora, KoreanReferenceExtractor, Reference, ReferenceExtractor};
pub use sqlite::SqliteGraphStore;

// ============================================================================
// GraphStore Trait
// ============================================================================

/// 법령 그래프 저장소 트레이트 (async)
///
/// 검색 엔진이 사용하는 읽기 쿼리와, 수집 단계에서만 쓰는 쓰기 쿼리로 나뉩니다.
/// 쿼리 시점에는 읽기만 발생합니다.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// 조문 본문 부분 문자열 검색
    async fn search_articles(&self, term: &str, limit: usize) -> Result<Vec<StoredArticle>>;

    /// 키로 조문 조회
    async fn get_article(&self, key: &ArticleKey) -> Result<Option<StoredArticle>>;

    /// 조문 번호 목록으로 조회 (law_id가 None이면 전체 법령 대상)
    async fn find_articles(
        &self,
        law_id: Option<&str>,
        article_numbers: &[String],
    ) -> Result<Vec<StoredArticle>>;

    /// REFERENCES 1-hop 이웃 (양방향)
    async fn referenced_neighbors(&self, key: &ArticleKey) -> Result<Vec<StoredArticle>>;

    /// 같은 법령(BELONGS_TO)에서 조문 순서상 앞뒤 `window`개 형제 조문
    async fn sibling_articles(&self, key: &ArticleKey, window: usize)
        -> Result<Vec<StoredArticle>>;

    /// 법령 조회
    async fn get_law(&self, law_id: &str) -> Result<Option<Law>>;

    /// 법령 목록 (조문 수 포함)
    async fn list_laws(&self) -> Result<Vec<LawSummary>>;

    /// 전체 조문 (인덱스 구축용)
    async fn all_articles(&self) -> Result<Vec<StoredArticle>>;

    /// 라벨별 개수
    async fn stats(&self) -> Result<GraphStats>;

    /// 법령 교체: 기존 법령/조문/관계 삭제 → 법령/조문 생성 → REFERENCES 연결
    ///
    /// 한 트랜잭션으로 처리하므로 실패하면 기존 법령이 그대로 남습니다.
    async fn replace_law(&self, law: &Law, articles: &[Article]) -> Result<LawWrite>;
}
