//! LanceDB Vector Store - 컬럼형 벡터 저장소
//!
//! 벡터 컬럼은 FixedSizeList이므로 테이블의 차원은 첫 배치에서 정해집니다.
//! 프로바이더가 바뀌면 색인기가 `clear_all`로 테이블을 지우고 다시 만듭니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::ExecutableQuery;

use super::entity::EntityType;
use super::vector::{RecordMetadata, VectorRecord, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "vectors";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
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

        Ok(Self { db })
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("related_id", DataType::Utf8, false),
            Field::new("entity_type", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
            Field::new("timestamp", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(records: &[VectorRecord]) -> Result<RecordBatch> {
        let first = records
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty records"))?;
        let dimension = first.vector.len();

        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
            anyhow::bail!(
                "Vector dimension mismatch in batch: {} has {}, expected {}",
                bad.id,
                bad.vector.len(),
                dimension
            );
        }

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let related_ids: Vec<&str> = records.iter().map(|r| r.related_id.as_str()).collect();
        let entity_types: Vec<&str> = records.iter().map(|r| r.entity_type.as_str()).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let timestamps: Vec<String> = records.iter().map(|r| r.timestamp.to_rfc3339()).collect();
        let metadata: Vec<String> = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<Result<_, _>>()
            .context("Failed to serialize record metadata")?;

        let flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.vector.iter().copied())
            .collect();

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors = FixedSizeListArray::try_new(
            field,
            dimension as i32,
            Arc::new(Float32Array::from(flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create vector array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension as i32)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(related_ids)),
                Arc::new(StringArray::from(entity_types)),
                Arc::new(StringArray::from(texts)),
                Arc::new(vectors),
                Arc::new(StringArray::from(timestamps)),
                Arc::new(StringArray::from(metadata)),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// RecordBatch를 레코드로 변환
    fn batch_to_records(batch: &RecordBatch) -> Result<Vec<VectorRecord>> {
        let ids = string_column(batch, "id")?;
        let related_ids = string_column(batch, "related_id")?;
        let entity_types = string_column(batch, "entity_type")?;
        let texts = string_column(batch, "text")?;
        let timestamps = string_column(batch, "timestamp")?;
        let metadata = string_column(batch, "metadata")?;

        let vectors = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing vector column"))?;

        let mut records = Vec::with_capacity(batch.num_rows());

        for i in 0..batch.num_rows() {
            let entity_type = match entity_types.value(i).parse() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("Skipping vector record {}: {}", ids.value(i), e);
                    continue;
                }
            };

            let values = vectors.value(i);
            let values = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| anyhow::anyhow!("Vector column is not Float32"))?;

            records.push(VectorRecord {
                id: ids.value(i).to_string(),
                related_id: related_ids.value(i).to_string(),
                entity_type,
                text: texts.value(i).to_string(),
                vector: values.values().to_vec(),
                timestamp: DateTime::parse_from_rfc3339(timestamps.value(i))
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                metadata: serde_json::from_str::<RecordMetadata>(metadata.value(i))
                    .unwrap_or_default(),
            });
        }

        Ok(records)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vectors table")
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn save_vectors(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let batch = Self::records_to_batch(records)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(records.len())
    }

    async fn get_all_vectors(&self) -> Result<Vec<VectorRecord>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let stream = self
            .open_table()
            .await?
            .query()
            .execute()
            .await
            .context("Failed to scan vectors table")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut records = Vec::new();
        for batch in &batches {
            records.extend(Self::batch_to_records(batch)?);
        }
        Ok(records)
    }

    async fn delete_vectors_for(&self, entity_type: EntityType, related_id: &str) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let filter = format!(
            "entity_type = '{}' AND related_id = '{}'",
            entity_type.as_str(),
            escape_literal(related_id)
        );

        let before = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows for related_id")?;

        table
            .delete(&filter)
            .await
            .context("Failed to delete vectors")?;

        Ok(before)
    }

    async fn clear_all(&self) -> Result<()> {
        if !self.table_exists().await {
            return Ok(());
        }

        self.db
            .drop_table(TABLE_NAME)
            .await
            .context("Failed to drop vectors table")?;
        tracing::info!("Dropped LanceDB vectors table");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")?;
        Ok(count)
    }

    fn name(&self) -> &str {
        "lancedb"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 이름으로 Utf8 컬럼 조회
fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

/// SQL 문자열 리터럴 이스케이프 (작은따옴표 이중화)
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

// ============================================================================
// Tests
// ============================================================================
