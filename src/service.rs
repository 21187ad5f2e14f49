//! 서비스 조립 - 저장소, 인덱스, 검색기, 답변 생성기 연결
//!
//! 전역 상태 없이 생성된 객체들을 묶어서 CLI에 제공합니다.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::answer::{AnswerComposer, LegalAnswer};
use crate::config::RagConfig;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::gemini::has_api_key;
use crate::graph::{GraphStats, GraphStore, KoreanReferenceExtractor, SqliteGraphStore};
use crate::ingest::{LawIngestor, LawParser};
use crate::knowledge::{
    Bm25Index, HybridRetriever, Indexer, KeywordIndexHandle, KeywordSearch, LanceVectorStore,
    SemanticSearch, VectorStore,
};
use crate::llm::{CompletionProvider, GeminiCompletion};

/// 그래프 DB 파일 이름
pub const GRAPH_DB_FILE: &str = "legal_graph.db";
/// LanceDB 디렉토리 이름
pub const VECTOR_DB_DIR: &str = "vectors.lance";

/// 서비스 상태
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub data_dir: PathBuf,
    pub laws: usize,
    pub articles: usize,
    pub references: usize,
    pub keyword_documents: usize,
    /// 키워드 인덱스의 고유 단어 수
    pub keyword_terms: usize,
    pub vector_chunks: usize,
    /// 임베딩 프로바이더 이름 (없으면 벡터 검색 비활성)
    pub embedder: Option<String>,
    /// 답변 생성 모델 이름
    pub completion: Option<String>,
}

/// 법령 RAG 서비스
pub struct LegalRag {
    config: RagConfig,
    graph: Arc<dyn GraphStore>,
    keyword_index: Arc<KeywordIndexHandle>,
    vectors: Arc<dyn VectorStore>,
    retriever: Arc<HybridRetriever>,
    indexer: Indexer,
    ingestor: LawIngestor,
    composer: Option<AnswerComposer>,
    embedder_name: Option<String>,
    completion_name: Option<String>,
}

impl LegalRag {
    /// 데이터 디렉토리의 저장소로 서비스 열기
    ///
    /// API 키가 없으면 벡터 검색과 답변 생성 없이 동작합니다.
    pub async fn open(config: RagConfig) -> Result<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let graph = Arc::new(
            SqliteGraphStore::open(&data_dir.join(GRAPH_DB_FILE))
                .context("Failed to open graph store")?,
        );
        let vectors = Arc::new(
            LanceVectorStore::open(&data_dir.join(VECTOR_DB_DIR))
                .await
                .context("Failed to open vector store")?,
        );

        let embedder = create_embedder(&config.gemini)?
            .map(|e| Arc::new(e) as Arc<dyn EmbeddingProvider>);

        let llm = if has_api_key() {
            Some(Arc::new(GeminiCompletion::from_env(&config.gemini)?) as Arc<dyn CompletionProvider>)
        } else {
            tracing::warn!("GEMINI_API_KEY not set; answer generation disabled");
            None
        };

        Self::from_parts(config, graph, vectors, embedder, llm).await
    }

    /// 구성 요소로 서비스 조립
    ///
    /// 키워드 인덱스는 그래프 저장소의 현재 조문으로 바로 구축합니다.
    pub async fn from_parts(
        config: RagConfig,
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        llm: Option<Arc<dyn CompletionProvider>>,
    ) -> Result<Self> {
        let articles = graph
            .all_articles()
            .await
            .context("Failed to load articles for keyword index")?;
        let keyword_index = Arc::new(KeywordIndexHandle::new(Bm25Index::build(
            articles,
            config.keyword,
        )));
        tracing::info!("Keyword index ready: {} documents", keyword_index.load().len());

        let semantic = SemanticSearch::new(
            Arc::clone(&vectors),
            embedder.clone(),
            config.retrieval.similarity_threshold,
        );
        let retriever = Arc::new(HybridRetriever::new(
            Arc::new(KeywordSearch::new(Arc::clone(&keyword_index))),
            Arc::new(semantic),
            Arc::clone(&graph),
            config.expansion.clone(),
            config.retrieval.clone(),
        )?);

        let indexer = Indexer::new(
            Arc::clone(&graph),
            Arc::clone(&keyword_index),
            Arc::clone(&vectors),
            embedder.clone(),
            &config.chunking,
            config.keyword,
        );

        let extractor = Arc::new(KoreanReferenceExtractor);
        let ingestor = LawIngestor::new(Arc::clone(&graph), LawParser::new(extractor.clone()));

        let completion_name = llm.as_ref().map(|l| l.name().to_string());
        let composer = llm.map(|llm| {
            AnswerComposer::new(Arc::clone(&retriever), Arc::clone(&graph), llm, extractor)
        });

        Ok(Self {
            embedder_name: embedder.as_ref().map(|e| e.name().to_string()),
            completion_name,
            config,
            graph,
            keyword_index,
            vectors,
            retriever,
            indexer,
            ingestor,
            composer,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn ingestor(&self) -> &LawIngestor {
        &self.ingestor
    }

    /// 질문에 답변 (답변 생성 모델이 없으면 에러)
    pub async fn ask(&self, question: &str) -> Result<LegalAnswer> {
        let composer = self.composer.as_ref().ok_or_else(|| {
            anyhow::anyhow!("Answer generation requires GEMINI_API_KEY (or GOOGLE_API_KEY)")
        })?;
        Ok(composer.ask(question).await)
    }

    /// 저장소/인덱스 상태
    pub async fn status(&self) -> Result<ServiceStatus> {
        let GraphStats {
            law_count,
            article_count,
            reference_count,
        } = self.graph.stats().await?;

        let keyword_index = self.keyword_index.load();

        Ok(ServiceStatus {
            data_dir: self.config.data_dir(),
            laws: law_count,
            articles: article_count,
            references: reference_count,
            keyword_documents: keyword_index.len(),
            keyword_terms: keyword_index.term_count(),
            vector_chunks: self.vectors.count().await?,
            embedder: self.embedder_name.clone(),
            completion: self.completion_name.clone(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{MemoryVectorStore, SearchMethod};
    use crate::testing::{HashingEmbedder, ScriptedCompletion};

    const LAW_TEXT: &str = "도시 및 주거환경정비법
시행일: 2024년 1월 19일

제3장 정비사업의 시행

제35조(조합설립인가 등) 재개발사업 의 조합 설립 요건 은 토지등소유자 4분의 3 이상 의 동의 로 한다. 동의 방법 은 제36조 에 따른다.

제36조(토지등소유자의 동의방법 등) 동의 는 서면 동의서 에 지장 을 날인 하고 신분증명서 사본 을 첨부 하여야 한다.

제37조(추진위원회의 구성) 시장 군수 는 추진위원회 구성 을 승인 할 수 있다.
";

    async fn service(llm: Option<Arc<dyn CompletionProvider>>) -> LegalRag {
        let graph = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
        LegalRag::from_parts(
            RagConfig::default(),
            graph,
            Arc::new(MemoryVectorStore::new()),
            Some(Arc::new(HashingEmbedder::new(64))),
            llm,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_index_and_search() {
        let rag = service(None).await;
        rag.ingestor().ingest_text(LAW_TEXT, "URBAN").await.unwrap();

        // 적재만으로는 인덱스에 반영되지 않음
        let before = rag.status().await.unwrap();
        assert_eq!(before.keyword_documents, 0);
        assert_eq!(before.keyword_terms, 0);

        let report = rag.indexer().rebuild().await.unwrap();
        assert_eq!(report.articles, 3);

        let status = rag.status().await.unwrap();
        assert_eq!(status.laws, 1);
        assert_eq!(status.keyword_documents, 3);
        assert!(status.keyword_terms > 10);
        assert_eq!(status.vector_chunks, 3);
        assert_eq!(status.embedder.as_deref(), Some("hashing"));
        assert!(status.completion.is_none());

        let result = rag.retriever().search("조합 설립 요건").await;
        assert!(!result.is_partial());
        let top = &result.candidates[0];
        assert_eq!(top.metadata.article_number, "제35조");
        assert!(top.methods.contains(&SearchMethod::Keyword));

        let referenced = result
            .candidates
            .iter()
            .find(|c| c.metadata.article_number == "제36조")
            .unwrap();
        assert_eq!(referenced.graph_hop_distance, Some(1));
        assert_eq!(referenced.metadata.law_name.as_deref(), Some("도시 및 주거환경정비법"));
    }

    #[tokio::test]
    async fn test_ask_requires_completion_provider() {
        let rag = service(None).await;
        assert!(rag.ask("조합 설립 요건").await.is_err());

        let llm = Arc::new(ScriptedCompletion::answering("제35조에 따릅니다."));
        let rag = service(Some(llm)).await;
        rag.ingestor().ingest_text(LAW_TEXT, "URBAN").await.unwrap();
        rag.indexer().rebuild_keyword_only().await.unwrap();

        let answer = rag.ask("조합 설립 요건").await.unwrap();
        assert_eq!(answer.answer, "제35조에 따릅니다.");
        assert_eq!(answer.sources[0].article_number, "제35조");
        assert_eq!(
            answer.sources[0].law_name.as_deref(),
            Some("도시 및 주거환경정비법")
        );
    }
}
