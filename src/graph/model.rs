//! 법령 그래프 데이터 모델

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ARTICLE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^제(\d+)조(?:의(\d+))?$").expect("valid article number regex"));

// ============================================================================
// Law
// ============================================================================

/// 법령 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LawCategory {
    /// 법률
    Act,
    /// 대통령령 (시행령)
    Decree,
    /// 총리령/부령 (시행규칙)
    Rule,
    /// 자치법규 (조례)
    Ordinance,
    Other,
}

impl LawCategory {
    /// 법령명으로 종류 추정
    pub fn from_name(name: &str) -> Self {
        if name.contains("시행규칙") {
            Self::Rule
        } else if name.contains("시행령") {
            Self::Decree
        } else if name.contains("조례") {
            Self::Ordinance
        } else if name.ends_with('법') || name.ends_with("법률") || name.ends_with("특례법") {
            Self::Act
        } else {
            Self::Other
        }
    }

    /// 한국어 표기
    pub fn label(&self) -> &'static str {
        match self {
            Self::Act => "법률",
            Self::Decree => "대통령령",
            Self::Rule => "부령",
            Self::Ordinance => "조례",
            Self::Other => "기타",
        }
    }

    /// 한국어 표기에서 복원
    pub fn from_label(label: &str) -> Self {
        match label {
            "법률" => Self::Act,
            "대통령령" => Self::Decree,
            "부령" => Self::Rule,
            "조례" => Self::Ordinance,
            _ => Self::Other,
        }
    }
}

/// 법령 노드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Law {
    pub law_id: String,
    pub name: String,
    pub category: LawCategory,
    pub effective_date: Option<NaiveDate>,
    /// 시행 상태 (예: "시행")
    pub status: String,
}

/// 법령 목록 항목
#[derive(Debug, Clone)]
pub struct LawSummary {
    pub law: Law,
    pub article_count: usize,
}

// ============================================================================
// Article
// ============================================================================

/// 조문 노드
///
/// `(law_id, article_number)`는 유일합니다. 생성 후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub law_id: String,
    /// 제N조 / 제N조의M
    pub article_number: String,
    /// 조문 제목 (괄호 안)
    pub title: Option<String>,
    pub content: String,
    /// 편/장/절
    pub section: String,
    pub chapter: String,
    /// 항 (①, ②, ...)
    pub subsections: Vec<String>,
    /// 호 (1., 가., ...)
    pub items: Vec<String>,
    /// 본문에서 참조한 조문 번호
    pub references: Vec<String>,
    /// 법령 내 순서 (0부터)
    pub ordinal: u32,
}

impl Article {
    pub fn key(&self) -> ArticleKey {
        ArticleKey::new(&self.law_id, &self.article_number)
    }
}

/// 저장소에서 읽은 조문 (소속 법령명 포함)
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArticle {
    pub article: Article,
    /// BELONGS_TO 대상 법령명 (법령 노드가 없으면 None)
    pub law_name: Option<String>,
}

impl StoredArticle {
    pub fn key(&self) -> ArticleKey {
        self.article.key()
    }
}

/// 조문 식별자 (중복 제거 키)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArticleKey {
    pub law_id: String,
    pub article_number: String,
}

impl ArticleKey {
    pub fn new(law_id: impl Into<String>, article_number: impl Into<String>) -> Self {
        Self {
            law_id: law_id.into(),
            article_number: article_number.into(),
        }
    }
}

impl fmt::Display for ArticleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.law_id, self.article_number)
    }
}

// ============================================================================
// ArticleNumber
// ============================================================================

/// 파싱된 조문 번호
///
/// 자연 순서: 제2조 < 제10조 < 제10조의2 < 제11조
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArticleNumber {
    pub main: u32,
    pub branch: Option<u32>,
}

impl ArticleNumber {
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = ARTICLE_NUMBER_RE.captures(raw.trim())?;
        let main = caps.get(1)?.as_str().parse().ok()?;
        let branch = match caps.get(2) {
            Some(m) => Some(m.as_str().parse().ok()?),
            None => None,
        };
        Some(Self { main, branch })
    }
}

impl fmt::Display for ArticleNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.branch {
            Some(branch) => write!(f, "제{}조의{}", self.main, branch),
            None => write!(f, "제{}조", self.main),
        }
    }
}

/// 조문 번호 비교 (파싱 가능한 번호가 먼저, 같으면 문자열 순)
pub fn compare_article_numbers(a: &str, b: &str) -> Ordering {
    match (ArticleNumber::parse(a), ArticleNumber::parse(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

// ============================================================================
// Stats
// ============================================================================

/// 라벨별 노드/관계 수
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub law_count: usize,
    pub article_count: usize,
    pub reference_count: usize,
}

/// 법령 교체 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LawWrite {
    /// 같은 ID의 기존 법령을 지웠는지
    pub replaced: bool,
    pub articles: usize,
    pub references: usize,
}

// ============================================================================
// Tests
// ============================================================================
