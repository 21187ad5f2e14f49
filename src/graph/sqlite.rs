//! SQLite Graph Store - rusqlite 기반 법령 그래프 저장소
//!
//! Law / Article 노드를 테이블로, BELONGS_TO는 articles.law_id로,
//! REFERENCES는 article_references 테이블로 표현합니다.
//! 저장 위치: ~/.legal-graph-rag/legal_graph.db

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};

use super::model::{
    Article, ArticleKey, GraphStats, Law, LawCategory, LawSummary, LawWrite, StoredArticle,
};
use super::GraphStore;

/// 조문 SELECT 컬럼 (law_name 포함)
const ARTICLE_SELECT: &str = "SELECT a.law_id, a.article_number, a.ordinal, a.title, a.content,
        a.section, a.chapter, a.subsections, a.items, a.refs, l.name
     FROM articles a
     LEFT JOIN laws l ON l.law_id = a.law_id";

// ============================================================================
// SqliteGraphStore
// ============================================================================

/// SQLite 기반 법령 그래프 저장소
///
/// articles는 laws에 외래키를 걸지 않습니다.
/// 법령 노드 없이 들어온 조문도 읽을 수 있어야 하기 때문입니다 (law_name = None).
pub struct SqliteGraphStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteGraphStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 메모리 DB (테스트/임시 용도)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: PathBuf::from(":memory:"),
        };
        store.initialize()?;
        Ok(store)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS laws (
                law_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                effective_date TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS articles (
                law_id TEXT NOT NULL,
                article_number TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                title TEXT,
                content TEXT NOT NULL,
                section TEXT NOT NULL DEFAULT '',
                chapter TEXT NOT NULL DEFAULT '',
                subsections TEXT NOT NULL DEFAULT '[]',
                items TEXT NOT NULL DEFAULT '[]',
                refs TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (law_id, article_number)
            );

            CREATE INDEX IF NOT EXISTS idx_articles_ordinal ON articles(law_id, ordinal);

            CREATE TABLE IF NOT EXISTS article_references (
                from_law TEXT NOT NULL,
                from_article TEXT NOT NULL,
                to_law TEXT NOT NULL,
                to_article TEXT NOT NULL,
                reference_type TEXT NOT NULL DEFAULT 'direct',
                PRIMARY KEY (from_law, from_article, to_law, to_article)
            );

            CREATE INDEX IF NOT EXISTS idx_references_to
                ON article_references(to_law, to_article);
            "#,
        )
        .context("Failed to initialize graph schema")?;

        tracing::debug!("Graph store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 커넥션 작업을 블로킹 스레드에서 실행
    ///
    /// rusqlite 호출은 동기 I/O라 런타임 워커를 막지 않도록 옮깁니다.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
            f(&mut guard)
        })
        .await
        .context("Graph store task failed")?
    }
}

fn query_articles(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<StoredArticle>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, row_to_stored)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read article rows")?;
    Ok(rows)
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn search_articles(&self, term: &str, limit: usize) -> Result<Vec<StoredArticle>> {
        let term = term.trim().to_string();
        if term.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        self.with_conn(move |conn| {
            let sql = format!(
                "{} WHERE instr(a.content, ?1) > 0 ORDER BY a.law_id, a.ordinal LIMIT ?2",
                ARTICLE_SELECT
            );
            query_articles(conn, &sql, params![term, limit as i64])
        })
        .await
    }

    async fn get_article(&self, key: &ArticleKey) -> Result<Option<StoredArticle>> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "{} WHERE a.law_id = ?1 AND a.article_number = ?2",
                ARTICLE_SELECT
            );
            let mut rows = query_articles(conn, &sql, params![key.law_id, key.article_number])?;
            Ok(rows.pop())
        })
        .await
    }

    async fn find_articles(
        &self,
        law_id: Option<&str>,
        article_numbers: &[String],
    ) -> Result<Vec<StoredArticle>> {
        if article_numbers.is_empty() {
            return Ok(vec![]);
        }

        let law_id = law_id.map(str::to_string);
        let mut values: Vec<String> = article_numbers.to_vec();

        self.with_conn(move |conn| {
            let placeholders = vec!["?"; values.len()].join(", ");
            let sql = match law_id {
                Some(id) => {
                    values.push(id);
                    format!(
                        "{} WHERE a.article_number IN ({}) AND a.law_id = ? ORDER BY a.law_id, a.ordinal",
                        ARTICLE_SELECT, placeholders
                    )
                }
                None => format!(
                    "{} WHERE a.article_number IN ({}) ORDER BY a.law_id, a.ordinal",
                    ARTICLE_SELECT, placeholders
                ),
            };
            query_articles(conn, &sql, params_from_iter(values.iter()))
        })
        .await
    }

    async fn referenced_neighbors(&self, key: &ArticleKey) -> Result<Vec<StoredArticle>> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let outgoing = format!(
                "{} JOIN article_references r ON a.law_id = r.to_law AND a.article_number = r.to_article
                 WHERE r.from_law = ?1 AND r.from_article = ?2 ORDER BY a.ordinal",
                ARTICLE_SELECT
            );
            let incoming = format!(
                "{} JOIN article_references r ON a.law_id = r.from_law AND a.article_number = r.from_article
                 WHERE r.to_law = ?1 AND r.to_article = ?2 ORDER BY a.ordinal",
                ARTICLE_SELECT
            );

            let mut neighbors =
                query_articles(conn, &outgoing, params![key.law_id, key.article_number])?;
            neighbors.extend(query_articles(
                conn,
                &incoming,
                params![key.law_id, key.article_number],
            )?);

            let mut seen = HashSet::new();
            neighbors.retain(|n| {
                let k = n.key();
                k != key && seen.insert(k)
            });
            Ok(neighbors)
        })
        .await
    }

    async fn sibling_articles(
        &self,
        key: &ArticleKey,
        window: usize,
    ) -> Result<Vec<StoredArticle>> {
        if window == 0 {
            return Ok(vec![]);
        }

        let key = key.clone();
        self.with_conn(move |conn| {
            let ordinal: Option<i64> = conn
                .query_row(
                    "SELECT ordinal FROM articles WHERE law_id = ?1 AND article_number = ?2",
                    params![key.law_id, key.article_number],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("Failed to look up ordinal of {}", key))?;

            // 존재하지 않는 조문이면 형제도 없음
            let Some(ordinal) = ordinal else {
                return Ok(vec![]);
            };

            let window = window as i64;
            let sql = format!(
                "{} WHERE a.law_id = ?1 AND a.ordinal BETWEEN ?2 AND ?3 AND a.article_number != ?4
                 ORDER BY a.ordinal",
                ARTICLE_SELECT
            );
            query_articles(
                conn,
                &sql,
                params![
                    key.law_id,
                    ordinal - window,
                    ordinal + window,
                    key.article_number
                ],
            )
        })
        .await
    }

    async fn get_law(&self, law_id: &str) -> Result<Option<Law>> {
        let law_id = law_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT law_id, name, category, effective_date, status FROM laws WHERE law_id = ?1",
                params![law_id],
                row_to_law,
            )
            .optional()
            .context("Failed to read law row")
        })
        .await
    }

    async fn list_laws(&self) -> Result<Vec<LawSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT l.law_id, l.name, l.category, l.effective_date, l.status,
                        (SELECT COUNT(*) FROM articles a WHERE a.law_id = l.law_id)
                 FROM laws l
                 ORDER BY l.name",
            )?;

            let laws = stmt
                .query_map([], |row| {
                    let law = row_to_law(row)?;
                    let count: i64 = row.get(5)?;
                    Ok(LawSummary {
                        law,
                        article_count: count as usize,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list laws")?;

            Ok(laws)
        })
        .await
    }

    async fn all_articles(&self) -> Result<Vec<StoredArticle>> {
        self.with_conn(|conn| {
            let sql = format!("{} ORDER BY a.law_id, a.ordinal", ARTICLE_SELECT);
            query_articles(conn, &sql, [])
        })
        .await
    }

    async fn stats(&self) -> Result<GraphStats> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<usize> {
                let n: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                    .with_context(|| format!("Failed to count {}", table))?;
                Ok(n as usize)
            };

            Ok(GraphStats {
                law_count: count("laws")?,
                article_count: count("articles")?,
                reference_count: count("article_references")?,
            })
        })
        .await
    }

    async fn replace_law(&self, law: &Law, articles: &[Article]) -> Result<LawWrite> {
        let law = law.clone();
        let articles = articles.to_vec();

        let law_id = law.law_id.clone();
        let write = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let replaced = delete_law_rows(&tx, &law.law_id)?;
                insert_law_row(&tx, &law)?;
                let articles = insert_article_rows(&tx, &articles)?;
                let references = link_reference_rows(&tx, &law.law_id)?;
                tx.commit().context("Failed to commit law")?;

                Ok(LawWrite {
                    replaced,
                    articles,
                    references,
                })
            })
            .await?;

        tracing::info!(
            "Stored law {}: {} articles, {} references (replaced: {})",
            law_id,
            write.articles,
            write.references,
            write.replaced
        );
        Ok(write)
    }
}

// ============================================================================
// Write Steps (트랜잭션 안에서 호출)
// ============================================================================

/// 법령과 소속 조문/관계 삭제, 지운 것이 있으면 true
fn delete_law_rows(conn: &Connection, law_id: &str) -> Result<bool> {
    conn.execute(
        "DELETE FROM article_references WHERE from_law = ?1 OR to_law = ?1",
        params![law_id],
    )?;
    let articles = conn.execute("DELETE FROM articles WHERE law_id = ?1", params![law_id])?;
    let laws = conn.execute("DELETE FROM laws WHERE law_id = ?1", params![law_id])?;
    Ok(laws + articles > 0)
}

fn insert_law_row(conn: &Connection, law: &Law) -> Result<()> {
    conn.execute(
        "INSERT INTO laws (law_id, name, category, effective_date, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            law.law_id,
            law.name,
            law.category.label(),
            law.effective_date.map(|d| d.to_string()),
            law.status,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("Failed to insert law {}", law.law_id))?;

    tracing::debug!("Created law node: {} ({})", law.name, law.law_id);
    Ok(())
}

/// 조문 노드 생성, 생성된 개수 반환 (중복 번호는 건너뜀)
fn insert_article_rows(conn: &Connection, articles: &[Article]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO articles
            (law_id, article_number, ordinal, title, content, section, chapter,
             subsections, items, refs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;

    let mut inserted = 0;
    for article in articles {
        let n = stmt
            .execute(params![
                article.law_id,
                article.article_number,
                article.ordinal,
                article.title,
                article.content,
                article.section,
                article.chapter,
                serde_json::to_string(&article.subsections)?,
                serde_json::to_string(&article.items)?,
                serde_json::to_string(&article.references)?,
            ])
            .with_context(|| format!("Failed to insert article {}", article.key()))?;

        if n == 0 {
            tracing::warn!("Duplicate article skipped: {}", article.key());
        }
        inserted += n;
    }
    Ok(inserted)
}

/// 법령 내 REFERENCES 관계 생성 (두 번째 패스), 생성된 관계 수 반환
///
/// 같은 법령에 없는 조문을 가리키는 참조는 건너뜁니다.
fn link_reference_rows(conn: &Connection, law_id: &str) -> Result<usize> {
    let rows: Vec<(String, String)> = {
        let mut stmt =
            conn.prepare("SELECT article_number, refs FROM articles WHERE law_id = ?1")?;
        let collected = stmt
            .query_map(params![law_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        collected
    };

    let existing: HashSet<&str> = rows.iter().map(|(n, _)| n.as_str()).collect();
    let mut edges: Vec<(&str, String)> = Vec::new();
    let mut dangling = 0usize;

    for (from, refs_json) in &rows {
        let refs: Vec<String> = serde_json::from_str(refs_json)
            .with_context(|| format!("Corrupt refs column: {}:{}", law_id, from))?;
        for target in refs {
            if target == *from {
                continue;
            }
            if existing.contains(target.as_str()) {
                edges.push((from.as_str(), target));
            } else {
                dangling += 1;
            }
        }
    }

    let mut created = 0;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO article_references (from_law, from_article, to_law, to_article)
         VALUES (?1, ?2, ?1, ?3)",
    )?;
    for (from, to) in &edges {
        created += stmt.execute(params![law_id, from, to])?;
    }

    tracing::debug!(
        "Linked {} references in {} ({} dangling)",
        created,
        law_id,
        dangling
    );
    Ok(created)
}

// ============================================================================
// Row Mapping
// ============================================================================

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredArticle> {
    let json_list = |idx: usize| -> rusqlite::Result<Vec<String>> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    };

    let ordinal: i64 = row.get(2)?;

    Ok(StoredArticle {
        article: Article {
            law_id: row.get(0)?,
            article_number: row.get(1)?,
            ordinal: ordinal.max(0) as u32,
            title: row.get(3)?,
            content: row.get(4)?,
            section: row.get(5)?,
            chapter: row.get(6)?,
            subsections: json_list(7)?,
            items: json_list(8)?,
            references: json_list(9)?,
        },
        law_name: row.get(10)?,
    })
}

fn row_to_law(row: &Row<'_>) -> rusqlite::Result<Law> {
    let category: String = row.get(2)?;
    let effective_date: Option<String> = row.get(3)?;

    Ok(Law {
        law_id: row.get(0)?,
        name: row.get(1)?,
        category: LawCategory::from_label(&category),
        effective_date: effective_date
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        status: row.get(4)?,
    })
}

// ============================================================================
// Tests
// ============================================================================
