//! LanceDB Vector Store - 조문 청크 벡터 검색
//!
//! 재구축할 때마다 새 세대 테이블(`article_chunks_<n>`)을 만들고,
//! 기록이 끝나면 활성 테이블을 바꾼 뒤 이전 세대를 삭제합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::vector::{ChunkEntry, VectorHit, VectorStore};

/// 세대 테이블 이름 접두사
const TABLE_PREFIX: &str = "article_chunks_";

#[derive(Debug, Default)]
struct Active {
    generation: u64,
    table: Option<String>,
}

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    active: RwLock<Active>,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// 기존 세대 테이블이 있으면 가장 최신 세대를 활성화합니다.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let names = db
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")?;

        let latest = names
            .iter()
            .filter_map(|name| {
                name.strip_prefix(TABLE_PREFIX)
                    .and_then(|n| n.parse::<u64>().ok())
            })
            .max();

        let active = match latest {
            Some(generation) => Active {
                generation,
                table: Some(table_name(generation)),
            },
            None => Active::default(),
        };

        if let Some(table) = &active.table {
            tracing::debug!("Active vector table: {}", table);
        }

        Ok(Self {
            db,
            active: RwLock::new(active),
        })
    }

    fn active_table(&self) -> Result<Option<String>> {
        let guard = self
            .active
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(guard.table.clone())
    }

    fn next_generation(&self) -> Result<u64> {
        let guard = self
            .active
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(guard.generation + 1)
    }

    /// 활성 테이블 교체, 이전 테이블 이름 반환
    fn activate(&self, generation: u64, table: Option<String>) -> Result<Option<String>> {
        let mut guard = self
            .active
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let previous = guard.table.take();
        *guard = Active { generation, table };
        Ok(previous)
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("law_id", DataType::Utf8, false),
            Field::new("article_number", DataType::Utf8, false),
            Field::new("section", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("chunk_text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[ChunkEntry]) -> Result<RecordBatch> {
        let Some(first) = entries.first() else {
            anyhow::bail!("Cannot create batch from empty entries");
        };

        let dimension = first.embedding.len();
        if dimension == 0 {
            anyhow::bail!("Empty embedding for chunk {}", first.chunk_id);
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch for chunk {}: expected {}, got {}",
                bad.chunk_id,
                dimension,
                bad.embedding.len()
            );
        }
        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        let column = |f: fn(&ChunkEntry) -> &str| -> StringArray {
            StringArray::from(entries.iter().map(f).collect::<Vec<_>>())
        };

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(column(|e| e.chunk_id.as_str())),
                Arc::new(column(|e| e.law_id.as_str())),
                Arc::new(column(|e| e.article_number.as_str())),
                Arc::new(column(|e| e.section.as_str())),
                Arc::new(Int32Array::from(
                    entries.iter().map(|e| e.chunk_index).collect::<Vec<_>>(),
                )),
                Arc::new(column(|e| e.chunk_text.as_str())),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    async fn drop_quietly(&self, table: &str) {
        if let Err(e) = self.db.drop_table(table).await {
            tracing::warn!("Failed to drop old vector table {}: {}", table, e);
        }
    }
}

fn table_name(generation: u64) -> String {
    format!("{}{}", TABLE_PREFIX, generation)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn replace_all(&self, entries: &[ChunkEntry]) -> Result<usize> {
        let generation = self.next_generation()?;

        if entries.is_empty() {
            if let Some(previous) = self.activate(generation, None)? {
                self.drop_quietly(&previous).await;
            }
            return Ok(0);
        }

        let name = table_name(generation);
        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.db
            .create_table(&name, batches)
            .execute()
            .await
            .with_context(|| format!("Failed to create vector table {}", name))?;

        if let Some(previous) = self.activate(generation, Some(name.clone()))? {
            self.drop_quietly(&previous).await;
        }

        tracing::info!("Vector table {} active ({} chunks)", name, entries.len());
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        let Some(name) = self.active_table()? else {
            return Ok(vec![]);
        };
        if limit == 0 {
            return Ok(vec![]);
        }

        let table = self
            .db
            .open_table(&name)
            .execute()
            .await
            .context("Failed to open table for search")?;

        let results = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut hits = Vec::new();

        for batch in batches {
            let chunk_ids = string_column(&batch, "chunk_id")?;
            let law_ids = string_column(&batch, "law_id")?;
            let article_numbers = string_column(&batch, "article_number")?;
            let sections = string_column(&batch, "section")?;
            let chunk_texts = string_column(&batch, "chunk_text")?;

            let chunk_indices = batch
                .column_by_name("chunk_index")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                hits.push(VectorHit {
                    chunk_id: chunk_ids.value(i).to_string(),
                    law_id: law_ids.value(i).to_string(),
                    article_number: article_numbers.value(i).to_string(),
                    section: sections.value(i).to_string(),
                    chunk_index: chunk_indices.value(i),
                    chunk_text: chunk_texts.value(i).to_string(),
                    distance: distances.value(i),
                });
            }
        }

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let Some(name) = self.active_table()? else {
            return Ok(0);
        };

        let table = self
            .db
            .open_table(&name)
            .execute()
            .await
            .context("Failed to open table for count")?;

        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn entry(number: &str, chunk_index: i32, hot: usize) -> ChunkEntry {
        let mut embedding = vec![0.0; DIM];
        embedding[hot] = 1.0;
        ChunkEntry {
            chunk_id: format!("URBAN_{}_{}", number, chunk_index),
            law_id: "URBAN".to_string(),
            article_number: number.to_string(),
            section: "제3장".to_string(),
            chunk_index,
            chunk_text: format!("{} 청크 {}", number, chunk_index),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_lance_replace_and_search() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("vectors.lance"))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.search(&[1.0; DIM], 3).await.unwrap().is_empty());

        let entries = vec![entry("제24조", 0, 0), entry("제24조", 1, 1), entry("제25조", 0, 2)];
        assert_eq!(store.replace_all(&entries).await.unwrap(), 3);
        assert_eq!(store.count().await.unwrap(), 3);

        let mut query = vec![0.0; DIM];
        query[2] = 1.0;
        let hits = store.search(&query, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "URBAN_제25조_0");
        assert!(hits[0].similarity() > 0.99);
    }

    #[tokio::test]
    async fn test_lance_rebuild_switches_generation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectors.lance");
        let store = LanceVectorStore::open(&path).await.unwrap();

        store.replace_all(&[entry("제1조", 0, 0)]).await.unwrap();
        store
            .replace_all(&[entry("제2조", 0, 1), entry("제3조", 0, 2)])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        // 다시 열어도 최신 세대를 사용
        let reopened = LanceVectorStore::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);

        store.replace_all(&[]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut bad = entry("제2조", 0, 0);
        bad.embedding.push(0.5);
        assert!(LanceVectorStore::entries_to_batch(&[entry("제1조", 0, 0), bad]).is_err());
    }
}
