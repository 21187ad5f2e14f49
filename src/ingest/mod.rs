//! 수집 모듈 - 법령 문서를 그래프 저장소에 적재
//!
//! 파일 읽기 → 텍스트 추출 (TXT / PDF) → 조문 파싱 → 법령/조문 저장 → 참조 관계 연결.
//! 적재 후 검색 인덱스는 `Indexer::rebuild`로 다시 만들어야 반영됩니다.

mod collector;
mod parser;
mod pdf;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::graph::GraphStore;

pub use collector::{CollectedFile, CollectorConfig, FileCollector, LawFileType};
pub use parser::{LawParser, ParsedLaw, TRUNCATION_MARKER};

/// 파일명 키워드 → 법령 ID
const KNOWN_LAW_IDS: [(&str, &str); 7] = [
    ("도시정비법", "urban_redevelopment_law"),
    ("소규모주택", "small_housing_law"),
    ("빈집정비", "vacant_house_law"),
    ("안양시", "anyang_ordinance"),
    ("성남시", "seongnam_ordinance"),
    ("용인시", "yongin_ordinance"),
    ("서울", "seoul_ordinance"),
];

// ============================================================================
// Reports
// ============================================================================

/// 법령 하나의 적재 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub law_id: String,
    pub law_name: String,
    pub articles: usize,
    pub references: usize,
    pub skipped_duplicates: usize,
    /// 같은 ID의 기존 법령을 교체했는지
    pub replaced: bool,
}

/// 폴더 적재 결과
#[derive(Debug, Default)]
pub struct BatchReport {
    pub ingested: Vec<IngestReport>,
    pub failed: Vec<(PathBuf, String)>,
}

// ============================================================================
// LawIngestor
// ============================================================================

/// 법령 적재기
pub struct LawIngestor {
    graph: Arc<dyn GraphStore>,
    parser: LawParser,
}

impl LawIngestor {
    pub fn new(graph: Arc<dyn GraphStore>, parser: LawParser) -> Self {
        Self { graph, parser }
    }

    /// 파일 적재 (law_id가 None이면 파일명에서 추정)
    pub async fn ingest_file(&self, path: &Path, law_id: Option<&str>) -> Result<IngestReport> {
        let file_type = LawFileType::from_path(path)
            .ok_or_else(|| anyhow::anyhow!("Unknown law document type: {:?}", path))?;
        let law_id = law_id.map_or_else(|| infer_law_id(path), str::to_string);

        let text = read_text(path, file_type).await?;
        tracing::info!("Ingesting {:?} as {}", path, law_id);
        self.ingest_text(&text, &law_id).await
    }

    /// 텍스트 적재
    ///
    /// 같은 ID의 법령이 이미 있으면 조문과 관계까지 한 번에 교체합니다.
    pub async fn ingest_text(&self, text: &str, law_id: &str) -> Result<IngestReport> {
        let parsed = self.parser.parse(text, law_id);
        if parsed.articles.is_empty() {
            tracing::warn!("No articles found for {}", law_id);
        }

        let write = self
            .graph
            .replace_law(&parsed.law, &parsed.articles)
            .await
            .with_context(|| format!("Failed to store law {}", law_id))?;

        tracing::info!(
            "Ingested {} ({}): {} articles, {} references",
            parsed.law.name,
            law_id,
            write.articles,
            write.references
        );

        Ok(IngestReport {
            law_id: law_id.to_string(),
            law_name: parsed.law.name,
            articles: write.articles,
            references: write.references,
            skipped_duplicates: parsed.skipped_duplicates,
            replaced: write.replaced,
        })
    }

    /// 폴더의 법령 파일 일괄 적재
    ///
    /// 파일별 실패는 기록하고 다음 파일로 넘어갑니다.
    /// 정리한 파일명이 겹치면 뒤에 오는 파일의 ID에 순번을 붙입니다.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<BatchReport> {
        let files = FileCollector::with_defaults().collect_directory(dir)?;
        let mut report = BatchReport::default();
        let mut used: HashMap<String, usize> = HashMap::new();

        for file in files {
            let base = infer_law_id(&file.path);
            let seen = used.entry(base.clone()).or_insert(0);
            *seen += 1;
            let law_id = if *seen == 1 {
                base
            } else {
                format!("{}_{}", base, seen)
            };

            match self.ingest_file(&file.path, Some(&law_id)).await {
                Ok(r) => report.ingested.push(r),
                Err(e) => {
                    tracing::warn!("Failed to ingest {:?}: {:#}", file.path, e);
                    report.failed.push((file.path, format!("{:#}", e)));
                }
            }
        }

        Ok(report)
    }
}

/// 파일에서 텍스트 읽기
async fn read_text(path: &Path, file_type: LawFileType) -> Result<String> {
    match file_type {
        LawFileType::Text => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read text file: {:?}", path))?;
            String::from_utf8(bytes)
                .with_context(|| format!("Law text file is not UTF-8: {:?}", path))
        }
        LawFileType::Pdf => {
            // PDF 추출은 CPU 바운드
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
                .await
                .context("PDF extraction task failed")?
        }
        LawFileType::Hwp | LawFileType::Doc => anyhow::bail!(
            "Unsupported law document format ({}): {:?}. Convert it to PDF or TXT first.",
            file_type.as_str(),
            path
        ),
    }
}

/// 파일명에서 법령 ID 추정
///
/// 알려진 법령 키워드가 있으면 그 ID에 나머지 파일명(시행령, 시행규칙 등)을 붙이고,
/// 없으면 정리한 파일명을 사용합니다. 같은 파일을 다시 적재하면 같은 ID가 나옵니다.
pub fn infer_law_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    if let Some((keyword, id)) = KNOWN_LAW_IDS.iter().find(|(keyword, _)| stem.contains(keyword)) {
        let rest = clean_id(&stem.replacen(keyword, " ", 1));
        return if rest.is_empty() {
            id.to_string()
        } else {
            format!("{}_{}", id, rest)
        };
    }

    let cleaned = clean_id(stem);
    if cleaned.is_empty() {
        "law".to_string()
    } else {
        cleaned
    }
}

/// 소문자화, 영숫자 외 문자는 `_`, 앞뒤 `_` 제거
fn clean_id(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    cleaned.trim_matches('_').to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ArticleKey, SqliteGraphStore};
    use crate::testing::FailingGraphStore;
    use tempfile::TempDir;

    const LAW_TEXT: &str = "도시 및 주거환경정비법
시행일: 2024년 1월 19일

제24조(조합설립) 조합을 설립하려면 제25조에 따른 동의를 받아야 한다.
제25조(동의) 토지등소유자의 동의 방법을 정한다.
";

    const DECREE_TEXT: &str = "도시 및 주거환경정비법 시행령
시행일: 2024년 1월 19일

제30조(동의서) 동의서는 서면으로 제출한다.
";

    fn ingestor() -> (Arc<SqliteGraphStore>, LawIngestor) {
        let store = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
        let ingestor = LawIngestor::new(store.clone(), LawParser::default());
        (store, ingestor)
    }

    #[test]
    fn test_infer_law_id() {
        assert_eq!(
            infer_law_id(Path::new("/data/도시정비법.txt")),
            "urban_redevelopment_law"
        );
        assert_eq!(
            infer_law_id(Path::new("도시정비법 시행령.txt")),
            "urban_redevelopment_law_시행령"
        );
        assert_eq!(
            infer_law_id(Path::new("도시정비법_시행규칙.pdf")),
            "urban_redevelopment_law_시행규칙"
        );
        assert_eq!(infer_law_id(Path::new("Housing Act (2024).pdf")), "housing_act__2024");
        assert_eq!(infer_law_id(Path::new("---.txt")), "law");
    }

    #[tokio::test]
    async fn test_ingest_text_writes_graph() {
        let (store, ingestor) = ingestor();

        let report = ingestor.ingest_text(LAW_TEXT, "URBAN").await.unwrap();
        assert_eq!(report.law_name, "도시 및 주거환경정비법");
        assert_eq!(report.articles, 2);
        assert_eq!(report.references, 1);
        assert!(!report.replaced);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.law_count, 1);
        assert_eq!(stats.article_count, 2);
        assert_eq!(stats.reference_count, 1);

        let neighbors = store
            .referenced_neighbors(&ArticleKey::new("URBAN", "제24조"))
            .await
            .unwrap();
        assert_eq!(neighbors[0].article.article_number, "제25조");
    }

    #[tokio::test]
    async fn test_reingest_replaces() {
        let (store, ingestor) = ingestor();
        ingestor.ingest_text(LAW_TEXT, "URBAN").await.unwrap();

        let report = ingestor.ingest_text(LAW_TEXT, "URBAN").await.unwrap();
        assert!(report.replaced);
        assert_eq!(store.stats().await.unwrap().article_count, 2);
        assert_eq!(store.stats().await.unwrap().reference_count, 1);
    }

    #[tokio::test]
    async fn test_act_and_decree_are_kept_apart() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("도시정비법.txt"), LAW_TEXT).unwrap();
        std::fs::write(dir.path().join("도시정비법 시행령.txt"), DECREE_TEXT).unwrap();

        let (store, ingestor) = ingestor();
        let report = ingestor.ingest_directory(dir.path()).await.unwrap();
        assert!(report.failed.is_empty());
        assert!(report.ingested.iter().all(|r| !r.replaced));

        let names: Vec<String> = store
            .list_laws()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.law.name)
            .collect();
        assert_eq!(
            names,
            vec!["도시 및 주거환경정비법", "도시 및 주거환경정비법 시행령"]
        );
        assert_eq!(store.stats().await.unwrap().article_count, 3);
    }

    #[tokio::test]
    async fn test_colliding_file_names_get_distinct_ids() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("housing act.txt"), LAW_TEXT).unwrap();
        std::fs::write(dir.path().join("housing_act.txt"), DECREE_TEXT).unwrap();

        let (store, ingestor) = ingestor();
        let report = ingestor.ingest_directory(dir.path()).await.unwrap();

        let ids: Vec<&str> = report.ingested.iter().map(|r| r.law_id.as_str()).collect();
        assert_eq!(ids, vec!["housing_act", "housing_act_2"]);
        assert_eq!(store.list_laws().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let ingestor = LawIngestor::new(Arc::new(FailingGraphStore), LawParser::default());
        let err = ingestor.ingest_text(LAW_TEXT, "URBAN").await.unwrap_err();
        assert!(format!("{:#}", err).contains("graph store offline"));
    }

    #[tokio::test]
    async fn test_ingest_directory_reports_unsupported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("도시정비법.txt"), LAW_TEXT).unwrap();
        std::fs::write(dir.path().join("조례.hwp"), [0u8; 8]).unwrap();

        let (store, ingestor) = ingestor();
        let report = ingestor.ingest_directory(dir.path()).await.unwrap();

        assert_eq!(report.ingested.len(), 1);
        assert_eq!(report.ingested[0].law_id, "urban_redevelopment_law");
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("Unsupported"));
        assert_eq!(store.list_laws().await.unwrap().len(), 1);
    }
}
