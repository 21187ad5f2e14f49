//! 인덱스 재구축 - 그래프 저장소의 조문으로 BM25/벡터 인덱스 생성
//!
//! 재구축은 오프라인 배치 작업입니다. 한 번에 하나만 실행되며,
//! 새 인덱스가 완성된 뒤에 교체되므로 검색은 중단되지 않습니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::{ChunkingConfig, KeywordConfig};
use crate::embedding::EmbeddingProvider;
use crate::graph::{GraphStore, StoredArticle};

use super::chunker::{ArticleChunker, Chunker};
use super::keyword::{Bm25Index, KeywordIndexHandle};
use super::vector::{ChunkEntry, VectorStore};

/// 재구축 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    /// 그래프 저장소의 전체 조문 수
    pub articles: usize,
    /// BM25에 색인된 조문 수
    pub keyword_documents: usize,
    /// 벡터 색인된 청크 수 (벡터 인덱스를 건너뛰었으면 None)
    pub vector_chunks: Option<usize>,
    pub elapsed: Duration,
}

/// 인덱스 빌더
pub struct Indexer {
    graph: Arc<dyn GraphStore>,
    keyword: Arc<KeywordIndexHandle>,
    vector: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    chunker: Box<dyn Chunker>,
    keyword_config: KeywordConfig,
    batch_size: usize,
    running: Mutex<()>,
}

impl Indexer {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        keyword: Arc<KeywordIndexHandle>,
        vector: Arc<dyn VectorStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        chunking: &ChunkingConfig,
        keyword_config: KeywordConfig,
    ) -> Self {
        Self {
            graph,
            keyword,
            vector,
            embedder,
            chunker: Box::new(ArticleChunker::new(chunking)),
            keyword_config,
            batch_size: chunking.embed_batch_size.max(1),
            running: Mutex::new(()),
        }
    }

    /// BM25 + 벡터 인덱스 재구축
    ///
    /// 임베딩 프로바이더가 없으면 벡터 인덱스는 건너뜁니다.
    pub async fn rebuild(&self) -> Result<IndexReport> {
        let _guard = self.running.lock().await;
        let started = Instant::now();

        let articles = self.load_articles().await?;
        let mut report = self.swap_keyword_index(&articles);

        match &self.embedder {
            Some(embedder) => {
                let chunks = self.rebuild_vectors(embedder.as_ref(), &articles).await?;
                report.vector_chunks = Some(chunks);
            }
            None => tracing::warn!("No embedding provider; vector index not rebuilt"),
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            "Index rebuilt: {} articles, {} keyword docs, {:?} chunks in {:?}",
            report.articles,
            report.keyword_documents,
            report.vector_chunks,
            report.elapsed
        );
        Ok(report)
    }

    /// BM25 인덱스만 재구축 (시작 시점, API 키 없는 환경)
    pub async fn rebuild_keyword_only(&self) -> Result<IndexReport> {
        let _guard = self.running.lock().await;
        let started = Instant::now();

        let articles = self.load_articles().await?;
        let mut report = self.swap_keyword_index(&articles);
        report.elapsed = started.elapsed();

        tracing::info!(
            "Keyword index rebuilt: {} docs in {:?}",
            report.keyword_documents,
            report.elapsed
        );
        Ok(report)
    }

    async fn load_articles(&self) -> Result<Vec<StoredArticle>> {
        self.graph
            .all_articles()
            .await
            .context("Failed to load articles from graph store")
    }

    fn swap_keyword_index(&self, articles: &[StoredArticle]) -> IndexReport {
        let index = Bm25Index::build(articles.to_vec(), self.keyword_config);
        let report = IndexReport {
            articles: articles.len(),
            keyword_documents: index.len(),
            ..Default::default()
        };
        self.keyword.swap(index);
        report
    }

    async fn rebuild_vectors(
        &self,
        embedder: &dyn EmbeddingProvider,
        articles: &[StoredArticle],
    ) -> Result<usize> {
        let chunks: Vec<_> = articles
            .iter()
            .flat_map(|stored| self.chunker.chunk_article(&stored.article))
            .collect();
        tracing::debug!(
            "{} chunker produced {} chunks from {} articles",
            self.chunker.name(),
            chunks.len(),
            articles.len()
        );

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = embedder
                .embed_documents(&texts)
                .await
                .context("Failed to embed chunks")?;

            if embeddings.len() != batch.len() {
                anyhow::bail!(
                    "Embedding provider returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                );
            }

            entries.extend(batch.iter().zip(embeddings).map(|(chunk, embedding)| ChunkEntry {
                chunk_id: chunk.chunk_id.clone(),
                law_id: chunk.law_id.clone(),
                article_number: chunk.article_number.clone(),
                section: chunk.section.clone(),
                chunk_index: chunk.chunk_index,
                chunk_text: chunk.text.clone(),
                embedding,
            }));

            tracing::info!("Embedded {}/{} chunks", entries.len(), chunks.len());
        }

        self.vector
            .replace_all(&entries)
            .await
            .context("Failed to replace vector index")
    }
}

// ============================================================================
// Tests
// ============================================================================
