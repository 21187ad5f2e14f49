//! legal-graph-rag - 도시정비 법령 그래프 하이브리드 RAG
//!
//! BM25 키워드 검색 + LanceDB 벡터 검색 + 조문 참조 그래프 확장을 결합해
//! 법령 조문을 찾고, Gemini로 출처가 달린 답변을 생성합니다.

pub mod answer;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod gemini;
pub mod graph;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod service;

#[cfg(test)]
mod testing;

// Re-exports
pub use answer::{AnswerComposer, LegalAnswer, SourceAttribution};
pub use config::{get_data_dir, RagConfig};
pub use embedding::{EmbeddingProvider, GeminiEmbedding};
pub use error::{RetrievalError, SourceError};
pub use gemini::{get_api_key, has_api_key};
pub use graph::{Article, ArticleKey, GraphStore, Law, SqliteGraphStore};
pub use knowledge::{
    Candidate, HybridRetriever, HybridSearchResult, HybridWeights, SearchMethod, SourceFailure,
};
pub use service::LegalRag;
