//! 조문 참조 추출
//!
//! 조문 본문에서 다른 조문을 가리키는 표현을 찾습니다.
//! 법령 코퍼스마다 참조 문법이 다를 수 있으므로 트레이트로 분리합니다.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static ARTICLE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"제(\d+)조(?:의(\d+))?").expect("valid article reference regex"));

static ANAPHORA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"같은\s*법|이\s*법|같은\s*조|앞\s*조|다음\s*조").expect("valid anaphora regex")
});

// ============================================================================
// Types
// ============================================================================

/// 구체적인 조문 번호로 해석되지 않는 지시 표현
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anaphora {
    /// 같은 법
    SameLaw,
    /// 이 법
    ThisLaw,
    /// 같은 조
    SameArticle,
    /// 앞 조
    PrecedingArticle,
    /// 다음 조
    NextArticle,
}

impl Anaphora {
    fn from_match(text: &str) -> Option<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "같은법" => Some(Self::SameLaw),
            "이법" => Some(Self::ThisLaw),
            "같은조" => Some(Self::SameArticle),
            "앞조" => Some(Self::PrecedingArticle),
            "다음조" => Some(Self::NextArticle),
            _ => None,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::SameLaw => "같은 법",
            Self::ThisLaw => "이 법",
            Self::SameArticle => "같은 조",
            Self::PrecedingArticle => "앞 조",
            Self::NextArticle => "다음 조",
        }
    }
}

/// 추출된 참조
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// 제N조 / 제N조의M
    Article(String),
    /// 해석하지 않은 지시 표현
    Unresolved(Anaphora),
}

// ============================================================================
// ReferenceExtractor
// ============================================================================

/// 참조 추출 전략 트레이트
pub trait ReferenceExtractor: Send + Sync {
    /// 본문에 나타난 순서대로 중복 없이 참조 추출
    fn extract(&self, content: &str) -> Vec<Reference>;

    /// 구체적인 조문 번호만 반환
    fn find_references(&self, content: &str) -> Vec<String> {
        self.extract(content)
            .into_iter()
            .filter_map(|r| match r {
                Reference::Article(number) => Some(number),
                Reference::Unresolved(_) => None,
            })
            .collect()
    }

    /// 추출기 이름
    fn name(&self) -> &'static str;
}

/// 한국 법령 참조 추출기
///
/// `제N조`, `제N조의M`과 지시 표현(같은 법, 이 법, 앞 조, 다음 조 ...)을 찾습니다.
/// 지시 표현은 조문 번호로 해석하지 않습니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct KoreanReferenceExtractor;

impl ReferenceExtractor for KoreanReferenceExtractor {
    fn extract(&self, content: &str) -> Vec<Reference> {
        let mut found: Vec<(usize, Reference)> = Vec::new();

        for caps in ARTICLE_REF_RE.captures_iter(content) {
            let (Some(whole), Some(main)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let number = match caps.get(2) {
                Some(branch) => format!("제{}조의{}", main.as_str(), branch.as_str()),
                None => format!("제{}조", main.as_str()),
            };
            found.push((whole.start(), Reference::Article(number)));
        }

        for m in ANAPHORA_RE.find_iter(content) {
            if let Some(anaphora) = Anaphora::from_match(m.as_str()) {
                found.push((m.start(), Reference::Unresolved(anaphora)));
            }
        }

        found.sort_by_key(|(pos, _)| *pos);

        let mut seen = HashSet::new();
        found
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| seen.insert(r.clone()))
            .collect()
    }

    fn name(&self) -> &'static str {
        "korean-statute"
    }
}

// ============================================================================
// Tests
// ============================================================================
