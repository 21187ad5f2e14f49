//! 답변 생성 모듈 - 검색 결과로 프롬프트를 만들고 출처와 함께 답변 반환
//!
//! `AnswerComposer::ask`는 실패하지 않습니다. 검색 결과가 없으면 LLM을 호출하지 않고,
//! LLM 호출이 실패하면 대체 답변과 에러 메시지를 담아 반환합니다.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::graph::{ArticleKey, GraphStore, ReferenceExtractor};
use crate::knowledge::{Candidate, HybridRetriever, SearchMethod, SourceFailure};
use crate::llm::CompletionProvider;

static ARTICLE_NUMBER_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^제\d+조(의\d+)?$").expect("valid article number regex"));

/// 검색 결과가 없을 때의 답변
pub const NO_RESULT_ANSWER: &str =
    "관련 법령 조문을 찾지 못했습니다. 질문을 더 구체적으로 입력해 주세요.";

/// LLM 호출 실패 시 답변
pub const FALLBACK_ANSWER: &str = "죄송합니다. 현재 법령 검색 서비스에 문제가 발생했습니다.";

/// 출처 미리보기 길이 (문자 수)
const SOURCE_PREVIEW_CHARS: usize = 100;
/// 관련 조문 미리보기 길이
const RELATED_PREVIEW_CHARS: usize = 80;
/// 관련 조문을 찾을 상위 출처 수
const RELATED_FROM_TOP: usize = 3;
const RELATED_PER_SOURCE: usize = 2;
const RELATED_MAX: usize = 5;

const PROMPT_TEMPLATE: &str = "당신은 도시정비사업 법령 전문가입니다.
주어진 법령 조문들을 바탕으로 정확하고 신뢰할 수 있는 답변을 제공해주세요.

관련 법령 조문:
{context}

질문: {question}

답변 지침:
1. 반드시 제공된 법령 조문에 근거하여 답변하세요
2. 조문 번호와 법령명을 명시하여 출처를 분명히 하세요
3. 법령 해석은 보수적으로 접근하고, 불확실한 부분은 명시하세요
4. 실무적 조언보다는 법령 내용 자체에 집중하세요
5. 관련 조문들 간의 연관성도 설명해주세요

답변:";

// ============================================================================
// Types
// ============================================================================

/// 답변 출처 조문
#[derive(Debug, Clone, Serialize)]
pub struct SourceAttribution {
    pub law_id: String,
    pub article_number: String,
    pub law_name: Option<String>,
    pub section: Option<String>,
    pub content_preview: String,
    /// 벡터 유사도
    pub similarity_score: f32,
    pub keyword_score: f32,
    pub combined_score: f32,
    pub graph_hop_distance: Option<u32>,
    pub methods: Vec<SearchMethod>,
}

impl SourceAttribution {
    fn from_candidate(c: &Candidate) -> Self {
        Self {
            law_id: c.metadata.law_id.clone(),
            article_number: c.metadata.article_number.clone(),
            law_name: c.metadata.law_name.clone(),
            section: c.metadata.section.clone(),
            content_preview: preview(&c.content, SOURCE_PREVIEW_CHARS),
            similarity_score: c.vector_score,
            keyword_score: c.keyword_score,
            combined_score: c.combined_score,
            graph_hop_distance: c.graph_hop_distance,
            methods: c.methods.iter().copied().collect(),
        }
    }
}

/// 추천 관련 조문
#[derive(Debug, Clone, Serialize)]
pub struct RelatedArticle {
    pub law_id: String,
    pub article_number: String,
    pub content_preview: String,
    /// 추천 근거 (예: "참조관계")
    pub relation_type: String,
    /// 이 조문을 참조한 출처 조문
    pub referenced_from: String,
}

/// 검색 메타데이터
#[derive(Debug, Clone, Serialize)]
pub struct SearchMetadata {
    pub documents_found: usize,
    pub query_timestamp: DateTime<Utc>,
    pub methods: Vec<SearchMethod>,
    /// 일부 소스 실패 여부
    pub partial: bool,
    pub failures: Vec<SourceFailure>,
}

/// 질의 응답 결과
#[derive(Debug, Clone, Serialize)]
pub struct LegalAnswer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceAttribution>,
    /// 0.0 ~ 1.0 (소수 둘째 자리)
    pub confidence: f32,
    pub related_articles: Vec<RelatedArticle>,
    pub search_metadata: SearchMetadata,
    /// LLM 호출 실패 메시지
    pub error: Option<String>,
}

/// 출처 검증 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceValidation {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

// ============================================================================
// AnswerComposer
// ============================================================================

/// 답변 생성기
pub struct AnswerComposer {
    retriever: Arc<HybridRetriever>,
    graph: Arc<dyn GraphStore>,
    llm: Arc<dyn CompletionProvider>,
    extractor: Arc<dyn ReferenceExtractor>,
}

impl AnswerComposer {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        graph: Arc<dyn GraphStore>,
        llm: Arc<dyn CompletionProvider>,
        extractor: Arc<dyn ReferenceExtractor>,
    ) -> Self {
        Self {
            retriever,
            graph,
            llm,
            extractor,
        }
    }

    /// 질문에 답변
    pub async fn ask(&self, question: &str) -> LegalAnswer {
        let result = self.retriever.search(question).await;
        let candidates = &result.candidates;

        let methods: BTreeSet<SearchMethod> = candidates
            .iter()
            .flat_map(|c| c.methods.iter().copied())
            .collect();
        let search_metadata = SearchMetadata {
            documents_found: candidates.len(),
            query_timestamp: Utc::now(),
            methods: methods.into_iter().collect(),
            partial: result.is_partial(),
            failures: result.failures.clone(),
        };

        if candidates.is_empty() {
            tracing::info!("No sources found for question");
            return LegalAnswer {
                question: question.to_string(),
                answer: NO_RESULT_ANSWER.to_string(),
                sources: vec![],
                confidence: 0.0,
                related_articles: vec![],
                search_metadata,
                error: None,
            };
        }

        let sources: Vec<SourceAttribution> =
            candidates.iter().map(SourceAttribution::from_candidate).collect();
        let related_articles = self.related_articles(candidates).await;
        let prompt = build_prompt(question, candidates);

        let (answer, confidence, error) = match self.llm.complete(&prompt).await {
            Ok(answer) => (answer, confidence(candidates), None),
            Err(e) => {
                tracing::error!("Answer generation failed ({}): {:#}", self.llm.name(), e);
                (FALLBACK_ANSWER.to_string(), 0.0, Some(format!("{:#}", e)))
            }
        };

        tracing::info!(
            "Answered with {} sources (confidence {:.2})",
            sources.len(),
            confidence
        );

        LegalAnswer {
            question: question.to_string(),
            answer,
            sources,
            confidence,
            related_articles,
            search_metadata,
            error,
        }
    }

    /// 상위 출처가 참조하는 조문 추천
    ///
    /// 상위 3개 출처에서 각각 최대 2개, 전체 최대 5개.
    /// 이미 출처에 포함된 조문과 존재하지 않는 조문은 제외합니다.
    async fn related_articles(&self, candidates: &[Candidate]) -> Vec<RelatedArticle> {
        let cited: HashSet<ArticleKey> = candidates.iter().map(Candidate::key).collect();
        let mut recommended: HashSet<ArticleKey> = HashSet::new();
        let mut related = Vec::new();

        for source in candidates.iter().take(RELATED_FROM_TOP) {
            let refs: Vec<String> = self
                .extractor
                .find_references(&source.content)
                .into_iter()
                .filter(|r| *r != source.metadata.article_number)
                .collect();
            if refs.is_empty() {
                continue;
            }

            let found = match self
                .graph
                .find_articles(Some(&source.metadata.law_id), &refs)
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!("Failed to resolve related articles: {:#}", e);
                    continue;
                }
            };

            let mut taken = 0;
            for number in &refs {
                if taken == RELATED_PER_SOURCE || related.len() == RELATED_MAX {
                    break;
                }
                let Some(article) = found.iter().find(|a| a.article.article_number == *number)
                else {
                    continue;
                };
                let key = article.key();
                if cited.contains(&key) || !recommended.insert(key) {
                    continue;
                }

                related.push(RelatedArticle {
                    law_id: article.article.law_id.clone(),
                    article_number: article.article.article_number.clone(),
                    content_preview: preview(&article.article.content, RELATED_PREVIEW_CHARS),
                    relation_type: "참조관계".to_string(),
                    referenced_from: source.metadata.article_number.clone(),
                });
                taken += 1;
            }
        }

        related
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 프롬프트 생성
pub fn build_prompt(question: &str, candidates: &[Candidate]) -> String {
    let context = candidates
        .iter()
        .map(|c| {
            format!(
                "[{} {}]\n{}",
                c.metadata.law_name.as_deref().unwrap_or("법령명 미상"),
                c.metadata.article_number,
                c.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    fill_template(PROMPT_TEMPLATE, &context, question)
}

/// 템플릿의 `{context}`, `{question}`을 한 번에 치환
///
/// 치환된 값은 다시 훑지 않으므로 조문 본문이나 질문에 들어 있는 자리표시자는 그대로 남습니다.
fn fill_template(template: &str, context: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// 답변 신뢰도
///
/// `0.7 + min(0.1·n, 0.2) + 0.3·평균 벡터 유사도 + 0.05·소스 종류 수`, 최대 1.0
pub fn confidence(candidates: &[Candidate]) -> f32 {
    if candidates.is_empty() {
        return 0.0;
    }

    let n = candidates.len() as f32;
    let count_weight = (n * 0.1).min(0.2);
    let avg_similarity = candidates.iter().map(|c| c.vector_score).sum::<f32>() / n;
    let methods: HashSet<SearchMethod> = candidates
        .iter()
        .flat_map(|c| c.methods.iter().copied())
        .collect();
    let diversity_weight = methods.len() as f32 * 0.05;

    let score = (0.7 + count_weight + avg_similarity * 0.3 + diversity_weight).min(1.0);
    (score * 100.0).round() / 100.0
}

/// 출처 형식 검증
pub fn validate_sources(sources: &[SourceAttribution]) -> SourceValidation {
    let mut validation = SourceValidation {
        is_valid: true,
        ..Default::default()
    };

    for source in sources {
        if !source.article_number.is_empty()
            && !ARTICLE_NUMBER_FORMAT.is_match(&source.article_number)
        {
            validation.is_valid = false;
            validation
                .issues
                .push(format!("잘못된 조문 번호 형식: {}", source.article_number));
        }

        if source.law_name.as_deref().map_or(true, str::is_empty) {
            validation.issues.push("법령명이 누락되었습니다".to_string());
        }
    }

    if sources.len() < 2 {
        validation
            .suggestions
            .push("더 많은 관련 조문을 참조하는 것이 좋겠습니다".to_string());
    }

    validation
}

/// 앞부분 미리보기 (잘렸으면 "..." 추가)
fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
