//! 법령 파일 수집
//!
//! 폴더를 재귀로 돌면서 법령 문서 파일을 모읍니다.
//! .gitignore 패턴을 존중하고, 알려진 법령 문서 확장자만 수집합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

// ============================================================================
// File Types
// ============================================================================

/// 법령 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LawFileType {
    /// UTF-8 텍스트
    Text,
    Pdf,
    /// 한글 문서 (추출 미지원)
    Hwp,
    /// MS Word 문서 (추출 미지원)
    Doc,
}

impl LawFileType {
    /// 확장자로 형식 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            "hwp" | "hwpx" => Some(Self::Hwp),
            "doc" | "docx" => Some(Self::Doc),
            _ => None,
        }
    }

    /// 파일 경로에서 형식 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// 텍스트 추출 가능 여부
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Text | Self::Pdf)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Pdf => "pdf",
            Self::Hwp => "hwp",
            Self::Doc => "doc",
        }
    }
}

/// 수집된 파일
#[derive(Debug, Clone)]
pub struct CollectedFile {
    pub path: PathBuf,
    pub file_type: LawFileType,
    pub size: u64,
}

// ============================================================================
// File Collector
// ============================================================================

/// 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// 법령 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 폴더 재귀 수집 (경로 순 정렬)
    ///
    /// 미지원 형식(HWP/DOC)도 수집해서 호출자가 건너뛴 이유를 보고할 수 있게 합니다.
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if !path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", path);
        }

        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let Some(file_type) = LawFileType::from_path(entry.path()) else {
                continue;
            };

            match self.collect_entry(entry.path(), file_type) {
                Ok(Some(file)) => files.push(file),
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to collect file: {:#}", e),
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!("Collected {} law files from {:?}", files.len(), path);
        Ok(files)
    }

    fn collect_entry(&self, path: &Path, file_type: LawFileType) -> Result<Option<CollectedFile>> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if self.config.max_file_size > 0 && metadata.len() > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", path, metadata.len());
            return Ok(None);
        }

        Ok(Some(CollectedFile {
            path: path.to_path_buf(),
            file_type,
            size: metadata.len(),
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
