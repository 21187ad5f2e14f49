//! CLI 모듈
//!
//! legal-graph-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::answer::validate_sources;
use crate::config::RagConfig;
use crate::gemini::has_api_key;
use crate::knowledge::{Candidate, HybridSearchResult, HybridWeights};
use crate::service::LegalRag;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "legal-graph-rag")]
#[command(version, about = "도시정비 법령 그래프 하이브리드 RAG", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 법령 파일 또는 폴더를 그래프 저장소에 적재
    Ingest {
        /// 적재할 파일 (TXT, PDF)
        #[arg(long)]
        file: Option<PathBuf>,

        /// 적재할 폴더 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 법령 ID (단일 파일만, 생략하면 파일명에서 추정)
        #[arg(long)]
        law_id: Option<String>,

        /// 적재 후 인덱스를 다시 만들지 않음
        #[arg(long)]
        no_index: bool,
    },

    /// 키워드/벡터 인덱스 재구축
    Index {
        /// 벡터 인덱스는 건너뛰고 키워드 인덱스만
        #[arg(long)]
        keyword_only: bool,
    },

    /// 조문 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 검색 방식
        #[arg(short, long, value_enum, default_value_t = SearchMode::Hybrid)]
        mode: SearchMode,

        /// 결과 개수
        #[arg(short, long)]
        limit: Option<usize>,

        /// 벡터 점수 가중치
        #[arg(long)]
        vector_weight: Option<f32>,

        /// 키워드 점수 가중치
        #[arg(long)]
        keyword_weight: Option<f32>,

        /// JSON 출력
        #[arg(long)]
        json: bool,
    },

    /// 법령 질의 응답
    Ask {
        /// 질문
        question: String,

        /// JSON 출력
        #[arg(long)]
        json: bool,
    },

    /// 적재된 법령 목록
    Laws,

    /// 상태 확인
    Status,
}

/// 검색 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchMode {
    /// 키워드 + 벡터 + 그래프 확장
    Hybrid,
    /// BM25 키워드만
    Keyword,
    /// 벡터 유사도만
    Vector,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::load().context("설정 로드 실패")?;
    let rag = LegalRag::open(config).await.context("서비스 초기화 실패")?;

    match cli.command {
        Commands::Ingest {
            file,
            dir,
            law_id,
            no_index,
        } => cmd_ingest(&rag, file, dir, law_id, no_index).await,
        Commands::Index { keyword_only } => cmd_index(&rag, keyword_only).await,
        Commands::Search {
            query,
            mode,
            limit,
            vector_weight,
            keyword_weight,
            json,
        } => cmd_search(&rag, &query, mode, limit, vector_weight, keyword_weight, json).await,
        Commands::Ask { question, json } => cmd_ask(&rag, &question, json).await,
        Commands::Laws => cmd_laws(&rag).await,
        Commands::Status => cmd_status(&rag).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 적재 명령어 (ingest)
async fn cmd_ingest(
    rag: &LegalRag,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    law_id: Option<String>,
    no_index: bool,
) -> Result<()> {
    if let Some(ref path) = file {
        println!("[*] 법령 적재 중: {}", path.display());
        let report = rag
            .ingestor()
            .ingest_file(path, law_id.as_deref())
            .await
            .context("법령 적재 실패")?;

        println!(
            "[OK] {} ({}): 조문 {} 개, 참조 관계 {} 개",
            report.law_name, report.law_id, report.articles, report.references
        );
        if report.skipped_duplicates > 0 {
            println!("[!] 중복 조문 {} 개 건너뜀", report.skipped_duplicates);
        }
    } else if let Some(ref path) = dir {
        if law_id.is_some() {
            bail!("--law-id는 --file과 함께만 사용할 수 있습니다");
        }

        println!("[*] 폴더 적재 중: {}", path.display());
        let batch = rag
            .ingestor()
            .ingest_directory(path)
            .await
            .context("폴더 적재 실패")?;

        for report in &batch.ingested {
            println!(
                "  [OK] {} ({}): 조문 {} 개",
                report.law_name, report.law_id, report.articles
            );
        }
        for (path, error) in &batch.failed {
            println!("  [!] {}: {}", path.display(), error);
        }
        println!();
        println!(
            "[OK] 완료: 성공 {}, 실패 {}",
            batch.ingested.len(),
            batch.failed.len()
        );
    } else {
        bail!("--file 또는 --dir를 지정해야 합니다");
    }

    if no_index {
        println!("[*] 인덱스 재구축 생략 (legal-graph-rag index 로 반영)");
        return Ok(());
    }
    cmd_index(rag, false).await
}

/// 인덱스 재구축 명령어 (index)
async fn cmd_index(rag: &LegalRag, keyword_only: bool) -> Result<()> {
    println!("[*] 인덱스 재구축 중...");

    let report = if keyword_only {
        rag.indexer().rebuild_keyword_only().await
    } else {
        rag.indexer().rebuild().await
    }
    .context("인덱스 재구축 실패")?;

    println!(
        "[OK] 조문 {} 개, 키워드 문서 {} 개 ({:.1}s)",
        report.articles,
        report.keyword_documents,
        report.elapsed.as_secs_f64()
    );
    match report.vector_chunks {
        Some(chunks) => println!("     벡터 청크: {} 개", chunks),
        None => println!("[!] 벡터 인덱스 생략 (API 키 미설정 또는 --keyword-only)"),
    }

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(
    rag: &LegalRag,
    query: &str,
    mode: SearchMode,
    limit: Option<usize>,
    vector_weight: Option<f32>,
    keyword_weight: Option<f32>,
    json: bool,
) -> Result<()> {
    let retrieval = &rag.config().retrieval;
    let weights = HybridWeights::new(
        vector_weight.unwrap_or(retrieval.vector_weight),
        keyword_weight.unwrap_or(retrieval.keyword_weight),
    )?;
    let k = limit.unwrap_or(retrieval.top_k);

    let retriever = rag.retriever();
    let result = match mode {
        SearchMode::Hybrid => retriever.hybrid_search(query, k, weights).await,
        SearchMode::Keyword => HybridSearchResult::from_source(retriever.keyword_only(query, k).await),
        SearchMode::Vector => HybridSearchResult::from_source(retriever.vector_only(query, k).await),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    for failure in &result.failures {
        println!("[!] {} 검색 실패: {}", failure.method, failure.message);
    }

    if result.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", result.candidates.len());
    for (i, candidate) in result.candidates.iter().enumerate() {
        print_candidate(i + 1, candidate);
    }

    Ok(())
}

fn print_candidate(rank: usize, c: &Candidate) {
    let methods: Vec<&str> = c.methods.iter().map(|m| m.as_str()).collect();

    println!(
        "{}. [{}] {} {} [점수: {:.4}]",
        rank,
        methods.join("+"),
        c.metadata.law_name.as_deref().unwrap_or(&c.metadata.law_id),
        c.metadata.article_number,
        c.combined_score
    );
    println!(
        "   키워드: {:.3} / 벡터: {:.3}",
        c.normalized_keyword_score, c.normalized_vector_score
    );
    if let (Some(hop), Some(seed)) = (c.graph_hop_distance, c.related_to.as_deref()) {
        if hop > 0 {
            println!("   그래프: {} 에서 {} 홉", seed, hop);
        }
    }
    println!("   내용: {}", truncate_text(&c.content, 200));
    println!();
}

/// 질의 응답 명령어 (ask)
async fn cmd_ask(rag: &LegalRag, question: &str, json: bool) -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }

    let answer = rag.ask(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}\n", answer.answer);
    if let Some(ref error) = answer.error {
        println!("[!] 답변 생성 실패: {}", error);
    }

    if !answer.sources.is_empty() {
        println!("[출처] (신뢰도 {:.2})", answer.confidence);
        for source in &answer.sources {
            println!(
                "  - {} {}: {}",
                source.law_name.as_deref().unwrap_or("법령명 미상"),
                source.article_number,
                truncate_text(&source.content_preview, 60)
            );
        }
    }

    if !answer.related_articles.is_empty() {
        println!("\n[관련 조문]");
        for related in &answer.related_articles {
            println!(
                "  - {} ({}에서 참조)",
                related.article_number, related.referenced_from
            );
        }
    }

    let validation = validate_sources(&answer.sources);
    for issue in validation.issues.iter().chain(&validation.suggestions) {
        println!("[!] {}", issue);
    }

    if answer.search_metadata.partial {
        println!("\n[!] 일부 검색 소스가 응답하지 않았습니다.");
    }

    Ok(())
}

/// 법령 목록 명령어 (laws)
async fn cmd_laws(rag: &LegalRag) -> Result<()> {
    let laws = rag.graph().list_laws().await.context("법령 목록 조회 실패")?;

    if laws.is_empty() {
        println!("[!] 적재된 법령이 없습니다.");
        return Ok(());
    }

    println!("[OK] 적재된 법령 ({} 건):\n", laws.len());
    for summary in laws {
        let law = &summary.law;
        let effective = law
            .effective_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!("  {} [{}]", law.name, law.category.label());
        println!(
            "        ID: {} | 시행일: {} | 조문 {} 개",
            law.law_id, effective, summary.article_count
        );
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(rag: &LegalRag) -> Result<()> {
    println!("legal-graph-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let status = rag.status().await.context("상태 조회 실패")?;
    println!("[*] 데이터 디렉토리: {}", status.data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (벡터 검색/답변 생성 비활성)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    println!(
        "[OK] 법령 {} 건, 조문 {} 개, 참조 관계 {} 개",
        status.laws, status.articles, status.references
    );
    println!(
        "[OK] 키워드 인덱스: {} 문서, {} 단어",
        status.keyword_documents, status.keyword_terms
    );
    println!("[OK] 벡터 인덱스: {} 청크", status.vector_chunks);
    if let Some(ref embedder) = status.embedder {
        println!("     임베딩: {}", embedder);
    }
    if let Some(ref completion) = status.completion {
        println!("     답변 모델: {}", completion);
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
