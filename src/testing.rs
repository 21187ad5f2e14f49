//! 테스트 지원 - 결정적인 가짜 구현과 시험용 코퍼스
//!
//! 네트워크를 쓰지 않습니다.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{ExpansionConfig, KeywordConfig, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::SourceError;
use crate::graph::{
    Article, ArticleKey, GraphStats, GraphStore, KoreanReferenceExtractor, Law, LawCategory,
    LawSummary, LawWrite, ReferenceExtractor, SqliteGraphStore, StoredArticle,
};
use crate::knowledge::{
    Bm25Index, Candidate, CandidateMetadata, CandidateSource, HybridRetriever,
    KeywordIndexHandle, KeywordSearch, SearchMethod,
};
use crate::llm::CompletionProvider;

// ============================================================================
// Fixtures
// ============================================================================

/// 법령명 없는 저장 조문
pub fn stored(law_id: &str, number: &str, ordinal: u32, content: &str) -> StoredArticle {
    StoredArticle {
        article: Article {
            law_id: law_id.to_string(),
            article_number: number.to_string(),
            title: None,
            content: content.to_string(),
            section: String::new(),
            chapter: String::new(),
            subsections: vec![],
            items: vec![],
            references: vec![],
            ordinal,
        },
        law_name: None,
    }
}

fn metadata(law_id: &str, number: &str) -> CandidateMetadata {
    CandidateMetadata {
        law_id: law_id.to_string(),
        article_number: number.to_string(),
        ..Default::default()
    }
}

/// 키워드 검색 결과 후보
pub fn keyword_seed(law_id: &str, number: &str, score: f32) -> Candidate {
    let mut c = Candidate::new(format!("{} 본문 (키워드)", number), metadata(law_id, number));
    c.keyword_score = score;
    c.methods.insert(SearchMethod::Keyword);
    c
}

/// 벡터 검색 결과 후보
pub fn vector_hit(law_id: &str, number: &str, similarity: f32) -> Candidate {
    let mut c = Candidate::new(format!("{} 본문 (벡터)", number), metadata(law_id, number));
    c.vector_score = similarity;
    c.methods.insert(SearchMethod::Vector);
    c
}

/// 인메모리 SQLite 코퍼스 빌더
///
/// 조문 순서는 추가한 순서, 참조는 본문에서 추출합니다.
pub struct CorpusBuilder {
    law_id: String,
    law_name: String,
    articles: Vec<(String, String)>,
}

impl CorpusBuilder {
    pub fn new(law_id: &str, law_name: &str) -> Self {
        Self {
            law_id: law_id.to_string(),
            law_name: law_name.to_string(),
            articles: Vec::new(),
        }
    }

    pub fn article(mut self, number: &str, content: &str) -> Self {
        self.articles.push((number.to_string(), content.to_string()));
        self
    }

    pub async fn build(self) -> Arc<SqliteGraphStore> {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let extractor = KoreanReferenceExtractor;

        let articles: Vec<Article> = self
            .articles
            .iter()
            .enumerate()
            .map(|(i, (number, content))| Article {
                law_id: self.law_id.clone(),
                article_number: number.clone(),
                title: None,
                content: content.clone(),
                section: "제3장 정비사업의 시행".to_string(),
                chapter: "제3장 정비사업의 시행".to_string(),
                subsections: vec![],
                items: vec![],
                references: extractor
                    .find_references(content)
                    .into_iter()
                    .filter(|r| r != number)
                    .collect(),
                ordinal: i as u32,
            })
            .collect();

        let law = Law {
            law_id: self.law_id.clone(),
            name: self.law_name.clone(),
            category: LawCategory::from_name(&self.law_name),
            effective_date: None,
            status: "시행".to_string(),
        };
        store.replace_law(&law, &articles).await.unwrap();
        Arc::new(store)
    }
}

/// 도시 및 주거환경정비법 발췌 (제23조~제26조)
///
/// "조합 설립 요건"은 제24조에만 나오고, 제24조는 제25조를 참조합니다.
pub async fn urban_corpus() -> Arc<SqliteGraphStore> {
    CorpusBuilder::new("URBAN", "도시 및 주거환경정비법")
        .article(
            "제23조",
            "정비계획 의 입안권자 는 정비구역 을 지정 하려면 주민 공람 을 거쳐야 한다.",
        )
        .article(
            "제24조",
            "재개발사업 의 조합 설립 요건 은 토지등소유자 4분의 3 이상 의 동의 로 한다. 동의 방법 은 제25조 에 따른다.",
        )
        .article(
            "제25조",
            "토지등소유자 의 동의 는 서면 동의서 에 지장 을 날인 하고 신분증명서 사본 을 첨부 하여야 한다.",
        )
        .article(
            "제26조",
            "시장 군수 는 추진위원회 구성 을 승인 할 수 있다. 승인 절차 는 제24조 를 준용 한다.",
        )
        .build()
        .await
}

/// urban_corpus 위의 키워드 검색 + 주어진 벡터 소스, 기본 설정
pub async fn scenario_retriever(vector: Arc<dyn CandidateSource>) -> HybridRetriever {
    let graph = urban_corpus().await;
    let articles = graph.all_articles().await.unwrap();
    let index = Bm25Index::build(articles, KeywordConfig::default());
    let keyword = KeywordSearch::new(Arc::new(KeywordIndexHandle::new(index)));

    HybridRetriever::new(
        Arc::new(keyword),
        vector,
        graph,
        ExpansionConfig::default(),
        RetrievalConfig::default(),
    )
    .unwrap()
}

// ============================================================================
// Embedders
// ============================================================================

/// 모든 입력에 같은 벡터를 반환
pub struct FixedEmbedder {
    vector: Vec<f32>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.vector.clone())
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }

    fn dimension(&self) -> usize {
        self.vector.len()
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// 공백 토큰 해싱 bag-of-words 임베더 (L2 정규화)
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            vector[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// 항상 실패하는 임베더
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("embedding service down")
    }

    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding service down")
    }

    fn dimension(&self) -> usize {
        3
    }

    fn name(&self) -> &str {
        "failing"
    }
}

// ============================================================================
// Candidate Sources
// ============================================================================

/// 고정된 후보를 반환하는 소스
pub struct StaticSource {
    method: SearchMethod,
    candidates: Vec<Candidate>,
}

impl StaticSource {
    pub fn new(method: SearchMethod, candidates: Vec<Candidate>) -> Self {
        Self { method, candidates }
    }

    pub fn empty(method: SearchMethod) -> Self {
        Self::new(method, vec![])
    }
}

#[async_trait]
impl CandidateSource for StaticSource {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<Candidate>, SourceError> {
        Ok(self.candidates.iter().take(k).cloned().collect())
    }

    fn method(&self) -> SearchMethod {
        self.method
    }
}

/// 항상 Unavailable을 반환하는 소스
pub struct FailingSource {
    method: SearchMethod,
}

impl FailingSource {
    pub fn new(method: SearchMethod) -> Self {
        Self { method }
    }
}

#[async_trait]
impl CandidateSource for FailingSource {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Candidate>, SourceError> {
        Err(SourceError::unavailable(self.method, "connection refused"))
    }

    fn method(&self) -> SearchMethod {
        self.method
    }
}

/// 응답이 늦는 소스
pub struct SlowSource {
    method: SearchMethod,
    delay: Duration,
}

impl SlowSource {
    pub fn new(method: SearchMethod, delay: Duration) -> Self {
        Self { method, delay }
    }
}

#[async_trait]
impl CandidateSource for SlowSource {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Candidate>, SourceError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![])
    }

    fn method(&self) -> SearchMethod {
        self.method
    }
}

// ============================================================================
// Graph Store
// ============================================================================

/// 모든 호출이 실패하는 그래프 저장소
pub struct FailingGraphStore;

fn offline<T>() -> Result<T> {
    anyhow::bail!("graph store offline")
}

#[async_trait]
impl GraphStore for FailingGraphStore {
    async fn search_articles(&self, _term: &str, _limit: usize) -> Result<Vec<StoredArticle>> {
        offline()
    }

    async fn get_article(&self, _key: &ArticleKey) -> Result<Option<StoredArticle>> {
        offline()
    }

    async fn find_articles(
        &self,
        _law_id: Option<&str>,
        _article_numbers: &[String],
    ) -> Result<Vec<StoredArticle>> {
        offline()
    }

    async fn referenced_neighbors(&self, _key: &ArticleKey) -> Result<Vec<StoredArticle>> {
        offline()
    }

    async fn sibling_articles(
        &self,
        _key: &ArticleKey,
        _window: usize,
    ) -> Result<Vec<StoredArticle>> {
        offline()
    }

    async fn get_law(&self, _law_id: &str) -> Result<Option<Law>> {
        offline()
    }

    async fn list_laws(&self) -> Result<Vec<LawSummary>> {
        offline()
    }

    async fn all_articles(&self) -> Result<Vec<StoredArticle>> {
        offline()
    }

    async fn stats(&self) -> Result<GraphStats> {
        offline()
    }

    async fn replace_law(&self, _law: &Law, _articles: &[Article]) -> Result<LawWrite> {
        offline()
    }
}

/// 참조 이웃 조회가 스레드를 붙잡고 느리게 응답하는 저장소
///
/// 나머지 호출은 내부 저장소로 넘깁니다.
pub struct BlockingGraphStore {
    inner: Arc<dyn GraphStore>,
    delay: Duration,
}

impl BlockingGraphStore {
    pub fn new(inner: Arc<dyn GraphStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl GraphStore for BlockingGraphStore {
    async fn search_articles(&self, term: &str, limit: usize) -> Result<Vec<StoredArticle>> {
        self.inner.search_articles(term, limit).await
    }

    async fn get_article(&self, key: &ArticleKey) -> Result<Option<StoredArticle>> {
        self.inner.get_article(key).await
    }

    async fn find_articles(
        &self,
        law_id: Option<&str>,
        article_numbers: &[String],
    ) -> Result<Vec<StoredArticle>> {
        self.inner.find_articles(law_id, article_numbers).await
    }

    async fn referenced_neighbors(&self, key: &ArticleKey) -> Result<Vec<StoredArticle>> {
        std::thread::sleep(self.delay);
        self.inner.referenced_neighbors(key).await
    }

    async fn sibling_articles(
        &self,
        key: &ArticleKey,
        window: usize,
    ) -> Result<Vec<StoredArticle>> {
        self.inner.sibling_articles(key, window).await
    }

    async fn get_law(&self, law_id: &str) -> Result<Option<Law>> {
        self.inner.get_law(law_id).await
    }

    async fn list_laws(&self) -> Result<Vec<LawSummary>> {
        self.inner.list_laws().await
    }

    async fn all_articles(&self) -> Result<Vec<StoredArticle>> {
        self.inner.all_articles().await
    }

    async fn stats(&self) -> Result<GraphStats> {
        self.inner.stats().await
    }

    async fn replace_law(&self, law: &Law, articles: &[Article]) -> Result<LawWrite> {
        self.inner.replace_law(law, articles).await
    }
}

// ============================================================================
// Completion
// ============================================================================

/// 정해진 답변(또는 에러)을 돌려주고 받은 프롬프트를 기록
pub struct ScriptedCompletion {
    reply: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn answering(answer: &str) -> Self {
        Self {
            reply: Ok(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(answer) => Ok(answer.clone()),
            Err(message) => Err(anyhow::anyhow!("{}", message)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
