//! 법령 텍스트 파서
//!
//! 추출된 법령 원문을 법령 메타데이터와 조문 목록으로 나눕니다.
//! - 조문: 줄 첫머리의 `제N조` / `제N조의M` (뒤에 `(제목)` 선택)
//! - 편/장/절: 조문 사이의 구획 제목을 추적해서 조문에 기록
//! - 항/호/참조: 공백을 정리한 본문에서 추출

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use regex::Regex;

use crate::graph::{Article, KoreanReferenceExtractor, Law, LawCategory, ReferenceExtractor};

/// 이 길이(문자)를 넘는 조문 본문은 잘라냄
const MAX_CONTENT_CHARS: usize = 20_000;
/// 잘라낼 때 남기는 길이
const TRUNCATED_CONTENT_CHARS: usize = 10_000;
/// 잘린 본문 끝에 붙이는 표시
pub const TRUNCATION_MARKER: &str = "... [내용이 길어 일부 생략됨]";

/// 법령명 탐색 범위 (문자)
const NAME_SCAN_CHARS: usize = 500;
/// 시행일 탐색 범위 (문자)
const DATE_SCAN_CHARS: usize = 1000;

static ARTICLE_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(제\d+조(?:의\d+)?)(?:[ \t]*\(([^)\n]*)\)|[ \t]|$)")
        .expect("valid article heading regex")
});

static DIVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(제\d+(?:의\d+)?(편|장|절))(?:[ \t][^\n]*)?$").expect("valid division regex")
});

static NAME_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*([가-힣 ]+(?:법(?: 시행령| 시행규칙)?|조례))[ \t]*$")
        .expect("valid law name regex")
});

static NAME_ACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([가-힣 ]+에[ \t]*관한[ \t]*법률|[가-힣 ]+특례법)").expect("valid act name regex")
});

static DATE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"시행일\s*[:：]\s*(\d{4})\s*년\s*(\d{1,2})\s*월\s*(\d{1,2})\s*일",
        r"(\d{4})\.\s*(\d{1,2})\.\s*(\d{1,2})\.\s*시행",
        r"(\d{4})-(\d{2})-(\d{2})\s*시행",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid effective date regex"))
    .collect()
});

static ITEM_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}|[가-하])\.").expect("valid item marker regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// 항 번호 (①~⑩)
const SUBSECTION_MARKERS: [char; 10] = ['①', '②', '③', '④', '⑤', '⑥', '⑦', '⑧', '⑨', '⑩'];

// ============================================================================
// Types
// ============================================================================

/// 파싱 결과
#[derive(Debug, Clone)]
pub struct ParsedLaw {
    pub law: Law,
    /// 법령 내 순서대로
    pub articles: Vec<Article>,
    /// 중복 조문 번호로 건너뛴 조문 수
    pub skipped_duplicates: usize,
}

/// 법령 텍스트 파서
pub struct LawParser {
    extractor: Arc<dyn ReferenceExtractor>,
}

impl Default for LawParser {
    fn default() -> Self {
        Self::new(Arc::new(KoreanReferenceExtractor))
    }
}

/// 조문 제목 위치
struct Heading<'a> {
    start: usize,
    body_start: usize,
    number: &'a str,
    title: Option<&'a str>,
}

impl LawParser {
    pub fn new(extractor: Arc<dyn ReferenceExtractor>) -> Self {
        Self { extractor }
    }

    /// 법령 원문 파싱
    pub fn parse(&self, text: &str, law_id: &str) -> ParsedLaw {
        let name = extract_law_name(text).unwrap_or_else(|| format!("법령_{}", law_id));
        let law = Law {
            law_id: law_id.to_string(),
            category: LawCategory::from_name(&name),
            name,
            effective_date: extract_effective_date(text),
            status: "시행".to_string(),
        };

        let headings: Vec<Heading> = ARTICLE_HEADING_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let number = caps.get(1)?;
                Some(Heading {
                    start: whole.start(),
                    body_start: whole.end(),
                    number: number.as_str(),
                    title: caps.get(2).map(|t| t.as_str().trim()).filter(|t| !t.is_empty()),
                })
            })
            .collect();

        let mut articles = Vec::with_capacity(headings.len());
        let mut seen = HashSet::new();
        let mut skipped_duplicates = 0;
        let mut section = String::new();
        let mut chapter = String::new();

        for (i, heading) in headings.iter().enumerate() {
            // 이 조문 앞까지 나온 구획 제목 반영
            let preceding_start = if i == 0 { 0 } else { headings[i - 1].body_start };
            track_divisions(&text[preceding_start..heading.start], &mut section, &mut chapter);

            if !seen.insert(heading.number) {
                tracing::warn!("Duplicate article {} in {}; skipped", heading.number, law_id);
                skipped_duplicates += 1;
                continue;
            }

            let body_end = headings.get(i + 1).map_or(text.len(), |next| next.start);
            let raw_body = DIVISION_RE.replace_all(&text[heading.body_start..body_end], "");
            let content = clean_content(&raw_body, heading.number);

            let references = self
                .extractor
                .find_references(&content)
                .into_iter()
                .filter(|r| r != heading.number)
                .collect();

            articles.push(Article {
                law_id: law_id.to_string(),
                article_number: heading.number.to_string(),
                title: heading.title.map(str::to_string),
                subsections: extract_subsections(&content),
                items: extract_items(&content),
                references,
                content,
                section: section.clone(),
                chapter: chapter.clone(),
                ordinal: articles.len() as u32,
            });
        }

        tracing::debug!(
            "Parsed {}: {} articles ({} duplicates skipped)",
            law.name,
            articles.len(),
            skipped_duplicates
        );

        ParsedLaw {
            law,
            articles,
            skipped_duplicates,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn head(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 앞부분에서 법령명 추출
fn extract_law_name(text: &str) -> Option<String> {
    let head = head(text, NAME_SCAN_CHARS);
    NAME_LINE_RE
        .captures(head)
        .or_else(|| NAME_ACT_RE.captures(head))
        .and_then(|caps| caps.get(1))
        .map(|m| WHITESPACE_RE.replace_all(m.as_str().trim(), " ").into_owned())
        .filter(|name| !name.is_empty())
}

/// 앞부분에서 시행일 추출
fn extract_effective_date(text: &str) -> Option<NaiveDate> {
    let head = head(text, DATE_SCAN_CHARS);
    DATE_RES.iter().find_map(|re| {
        let caps = re.captures(head)?;
        let year = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let day = caps.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// 편/장/절 제목 추적
fn track_divisions(text: &str, section: &mut String, chapter: &mut String) {
    for caps in DIVISION_RE.captures_iter(text) {
        let (Some(marker), Some(kind)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let heading = caps
            .get(0)
            .map_or(marker.as_str(), |m| m.as_str())
            .trim()
            .to_string();

        match kind.as_str() {
            "편" => {
                chapter.clear();
                *section = heading;
            }
            "장" => {
                *chapter = heading.clone();
                *section = heading;
            }
            _ => *section = heading,
        }
    }
}

/// 공백 정리 + 과도하게 긴 본문 자르기
fn clean_content(raw: &str, number: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(raw.trim(), " ").into_owned();
    let len = collapsed.chars().count();
    if len > MAX_CONTENT_CHARS {
        tracing::warn!("Article {} is too long ({} chars); truncated", number, len);
        format!("{}{}", head(&collapsed, TRUNCATED_CONTENT_CHARS), TRUNCATION_MARKER)
    } else {
        collapsed
    }
}

/// 항 추출 ("① 내용")
fn extract_subsections(content: &str) -> Vec<String> {
    let starts: Vec<usize> = content
        .char_indices()
        .filter(|(_, c)| SUBSECTION_MARKERS.contains(c))
        .map(|(i, _)| i)
        .collect();

    starts
        .iter()
        .enumerate()
        .filter_map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(content.len());
            let segment = &content[start..end];
            let mut chars = segment.chars();
            let marker = chars.next()?;
            let body = chars.as_str().trim();
            (!body.is_empty()).then(|| format!("{} {}", marker, body))
        })
        .collect()
}

/// 호 추출 ("1. 내용", "가. 내용")
///
/// 앞뒤가 공백인 번호만 호로 인정합니다. 호 본문은 다음 호나 다음 항 앞에서 끝납니다.
fn extract_items(content: &str) -> Vec<String> {
    let markers: Vec<(usize, usize)> = ITEM_MARKER_RE
        .find_iter(content)
        .filter(|m| {
            let before_ok = content[..m.start()]
                .chars()
                .next_back()
                .map_or(true, char::is_whitespace);
            let after_ok = content[m.end()..]
                .chars()
                .next()
                .map_or(true, char::is_whitespace);
            before_ok && after_ok
        })
        .map(|m| (m.start(), m.end()))
        .collect();

    markers
        .iter()
        .enumerate()
        .filter_map(|(n, &(start, marker_end))| {
            let next = markers.get(n + 1).map_or(content.len(), |&(s, _)| s);
            let body = &content[marker_end..next];
            let body = body
                .find(|c| SUBSECTION_MARKERS.contains(&c))
                .map_or(body, |cut| &body[..cut])
                .trim();
            (!body.is_empty()).then(|| format!("{} {}", &content[start..marker_end], body))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "도시 및 주거환경정비법
[시행 2024. 1. 19.] 시행일: 2024년 1월 19일

제1장 총칙

제1조(목적) 이 법은 도시기능의 회복이 필요한 지역을
계획적으로 정비하는 데 필요한 사항을 규정한다.

제2조(정의) 이 법에서 사용하는 용어의 뜻은 다음과 같다.
1. 정비구역이란 정비사업을 계획적으로 시행하기 위하여 지정된 구역을 말한다.
2. 정비사업이란 다음 각 목의 사업을 말한다.
가. 주거환경개선사업
나. 재개발사업

제3장 정비사업의 시행
제1절 조합

제35조(조합설립인가 등) ① 조합을 설립하려는 경우에는 제2조에 따른 요건을 갖추어야 한다.
② 제1항에 따른 인가를 받은 후 제36조의 절차를 따른다.

제35조(중복) 중복된 조문입니다.

제35조의2(특례) 제35조에도 불구하고 시장은 따로 정할 수 있다.
";

    fn parse(text: &str) -> ParsedLaw {
        LawParser::default().parse(text, "URBAN")
    }

    #[test]
    fn test_law_metadata() {
        let parsed = parse(SAMPLE);
        assert_eq!(parsed.law.law_id, "URBAN");
        assert_eq!(parsed.law.name, "도시 및 주거환경정비법");
        assert_eq!(parsed.law.category, LawCategory::Act);
        assert_eq!(parsed.law.effective_date, NaiveDate::from_ymd_opt(2024, 1, 19));
        assert_eq!(parsed.law.status, "시행");
    }

    #[test]
    fn test_law_name_fallbacks() {
        assert_eq!(
            extract_law_name("빈집 및 소규모주택 정비에 관한 특례법 [시행]").as_deref(),
            Some("빈집 및 소규모주택 정비에 관한 특례법")
        );
        assert_eq!(
            extract_law_name("\n도시 및 주거환경정비법 시행령\n제1조").as_deref(),
            Some("도시 및 주거환경정비법 시행령")
        );
        assert_eq!(parse("제1조 목적이 없는 조문").law.name, "법령_URBAN");
    }

    #[test]
    fn test_effective_date_formats() {
        assert_eq!(
            extract_effective_date("2023. 7. 18. 시행"),
            NaiveDate::from_ymd_opt(2023, 7, 18)
        );
        assert_eq!(
            extract_effective_date("2022-12-11 시행"),
            NaiveDate::from_ymd_opt(2022, 12, 11)
        );
        assert_eq!(extract_effective_date("시행일 미상"), None);
    }

    #[test]
    fn test_articles_split_in_order() {
        let parsed = parse(SAMPLE);
        let numbers: Vec<_> = parsed.articles.iter().map(|a| a.article_number.as_str()).collect();
        assert_eq!(numbers, vec!["제1조", "제2조", "제35조", "제35조의2"]);
        assert_eq!(parsed.skipped_duplicates, 1);

        let ordinals: Vec<_> = parsed.articles.iter().map(|a| a.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);

        let first = &parsed.articles[0];
        assert_eq!(first.title.as_deref(), Some("목적"));
        assert_eq!(
            first.content,
            "이 법은 도시기능의 회복이 필요한 지역을 계획적으로 정비하는 데 필요한 사항을 규정한다."
        );
    }

    #[test]
    fn test_divisions_tracked() {
        let parsed = parse(SAMPLE);
        assert_eq!(parsed.articles[0].section, "제1장 총칙");
        assert_eq!(parsed.articles[0].chapter, "제1장 총칙");
        assert_eq!(parsed.articles[2].section, "제1절 조합");
        assert_eq!(parsed.articles[2].chapter, "제3장 정비사업의 시행");

        // 구획 제목은 앞 조문 본문에 섞이지 않음
        assert!(!parsed.articles[1].content.contains("제3장"));
    }

    #[test]
    fn test_subsections_items_and_references() {
        let parsed = parse(SAMPLE);

        let definitions = &parsed.articles[1];
        assert_eq!(definitions.items.len(), 4);
        assert!(definitions.items[0].starts_with("1. 정비구역이란"));
        assert_eq!(definitions.items[2], "가. 주거환경개선사업");

        let union = &parsed.articles[2];
        assert_eq!(union.subsections.len(), 2);
        assert!(union.subsections[0].starts_with("① 조합을 설립하려는"));
        assert_eq!(union.references, vec!["제2조", "제36조"]);

        // 자기 참조 제외
        let special = &parsed.articles[3];
        assert_eq!(special.references, vec!["제35조"]);
    }

    #[test]
    fn test_inline_reference_is_not_heading() {
        let text = "제10조(목적) 다음 줄에 인용이 있다\n제25조에 따른 절차를 따른다.\n";
        let parsed = parse(text);
        assert_eq!(parsed.articles.len(), 1);
        assert_eq!(parsed.articles[0].references, vec!["제25조"]);
    }

    #[test]
    fn test_long_article_truncated() {
        let text = format!("제1조(장문) {}", "가".repeat(MAX_CONTENT_CHARS + 1));
        let parsed = parse(&text);
        let content = &parsed.articles[0].content;
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            content.chars().count(),
            TRUNCATED_CONTENT_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_no_articles() {
        let parsed = parse("부칙만 있는 문서");
        assert!(parsed.articles.is_empty());
    }
}
