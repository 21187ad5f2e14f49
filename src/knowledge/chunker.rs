//! Text Chunking Module
//!
//! 조문 본문을 임베딩용 청크로 분할합니다.
//! 고정 길이(문자 수) 창을 쓰되, 창의 마지막 1/4 안에 항 번호(①…⑳),
//! 문장 끝, 줄바꿈이 있으면 그 위치에서 자릅니다.

use crate::config::ChunkingConfig;
use crate::graph::Article;

// ============================================================================
// Types
// ============================================================================

/// 조문 청크
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleChunk {
    /// `{law_id}_{article_number}_{chunk_index}`
    pub chunk_id: String,
    pub law_id: String,
    pub article_number: String,
    pub section: String,
    pub chunk_index: i32,
    pub text: String,
}

// ============================================================================
// Chunker
// ============================================================================

/// 청크 분할 전략
pub trait Chunker: Send + Sync {
    fn name(&self) -> &'static str;

    /// 텍스트를 청크로 분할, (분할 순서, 청크) 반환
    fn chunk(&self, text: &str) -> Vec<(usize, String)>;

    /// 조문을 청크로 분할
    fn chunk_article(&self, article: &Article) -> Vec<ArticleChunk> {
        self.chunk(&article.content)
            .into_iter()
            .map(|(idx, text)| ArticleChunk {
                chunk_id: format!("{}_{}_{}", article.law_id, article.article_number, idx),
                law_id: article.law_id.clone(),
                article_number: article.article_number.clone(),
                section: article.section.clone(),
                chunk_index: idx as i32,
                text,
            })
            .collect()
    }
}

// ============================================================================
// ArticleChunker
// ============================================================================

/// 조문 청커
pub struct ArticleChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_chars: usize,
}

impl ArticleChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: config.chunk_overlap.min(chunk_size - 1),
            min_chunk_chars: config.min_chunk_chars,
        }
    }

    /// 텍스트를 창 단위로 분할 (짧은 청크 포함)
    fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.trim().chars().collect();
        if chars.is_empty() {
            return vec![];
        }
        if chars.len() <= self.chunk_size {
            return vec![chars.iter().collect()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let hard_end = (start + self.chunk_size).min(chars.len());
            let end = if hard_end == chars.len() {
                hard_end
            } else {
                self.find_break(&chars, start, hard_end)
            };

            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }

            if end >= chars.len() {
                break;
            }

            let next = end.saturating_sub(self.chunk_overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// `[start, hard_end)` 창에서 자를 위치
    fn find_break(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let floor = start + self.chunk_size * 3 / 4;

        // 항 번호 앞, 문장 끝/줄바꿈 뒤
        for pos in (floor.max(start + 1)..hard_end).rev() {
            if is_subsection_mark(chars[pos]) || matches!(chars[pos - 1], '\n' | '.') {
                return pos;
            }
        }

        for pos in (floor.max(start + 1)..hard_end).rev() {
            if chars[pos - 1].is_whitespace() {
                return pos;
            }
        }

        hard_end
    }
}

impl Chunker for ArticleChunker {
    fn name(&self) -> &'static str {
        "article"
    }

    /// 너무 짧은 청크는 버리지만 순서 번호는 차지합니다.
    fn chunk(&self, text: &str) -> Vec<(usize, String)> {
        self.split(text)
            .into_iter()
            .enumerate()
            .filter(|(_, text)| text.chars().count() >= self.min_chunk_chars)
            .collect()
    }
}

impl Default for ArticleChunker {
    fn default() -> Self {
        Self::new(&ChunkingConfig::default())
    }
}

/// ① ~ ⑳
fn is_subsection_mark(c: char) -> bool {
    ('\u{2460}'..='\u{2473}').contains(&c)
}

// ============================================================================
// Tests
// ============================================================================
