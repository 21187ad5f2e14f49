//! Knowledge 모듈 - 하이브리드 법령 검색
//!
//! - Keyword: BM25 키워드 검색 (교체 가능한 불변 인덱스)
//! - Vector: 조문 청크 임베딩 검색 (LanceDB / 메모리)
//! - Expansion: 참조/형제 관계를 따라가는 그래프 확장
//! - Hybrid: 병합 → 정규화 → 가중 결합 → 결정적 정렬
//! - Indexer: 그래프 저장소에서 인덱스 재구축

mod candidate;
mod chunker;
mod expansion;
mod hybrid;
mod indexer;
mod keyword;
mod lance;
mod semantic;
mod vector;

// Re-exports
pub use candidate::{Candidate, CandidateMetadata, CandidateSource, SearchMethod};
pub use chunker::{ArticleChunk, ArticleChunker, Chunker};
pub use expansion::GraphExpander;
pub use hybrid::{HybridRetriever, HybridSearchResult, HybridWeights, SourceFailure};
pub use indexer::{IndexReport, Indexer};
pub use keyword::{Bm25Index, KeywordIndexHandle, KeywordSearch};
pub use lance::LanceVectorStore;
pub use semantic::SemanticSearch;
pub use vector::{cosine_similarity, ChunkEntry, MemoryVectorStore, VectorHit, VectorStore};
