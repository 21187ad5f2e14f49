//! PDF 텍스트 추출
//!
//! pdf-extract 크레이트로 법령 PDF의 텍스트를 추출합니다.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

/// "- 3 -", "=== Page 3 ===" 같은 쪽 번호 줄
static PAGE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-=]+\s*(?:Page\s*)?\d+\s*[-=]+\s*$").expect("valid page marker regex")
});

/// PDF에서 텍스트 추출
///
/// 스캔 문서처럼 텍스트가 없으면 빈 문자열을 반환합니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(String::new());
    }

    Ok(normalize_pdf_text(&text))
}

/// 페이지 구분 정리
///
/// 폼피드는 줄바꿈으로 바꾸고 쪽 번호 줄은 지웁니다.
/// 조문 제목이 줄 첫머리에 남아 있어야 조문 분할이 됩니다.
fn normalize_pdf_text(text: &str) -> String {
    text.split('\x0c')
        .flat_map(str::lines)
        .filter(|line| !PAGE_MARKER_RE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formfeed_becomes_newline() {
        let text = "제1조(목적) 본문\x0c제2조(정의) 본문";
        assert_eq!(normalize_pdf_text(text), "제1조(목적) 본문\n제2조(정의) 본문");
    }

    #[test]
    fn test_page_markers_removed() {
        let text = "제1조(목적) 본문\n- 1 -\n제2조(정의) 본문\n=== Page 2 ===\n계속";
        assert_eq!(
            normalize_pdf_text(text),
            "제1조(목적) 본문\n제2조(정의) 본문\n계속"
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(extract_text_from_pdf(Path::new("/nonexistent/law.pdf")).is_err());
    }
}
