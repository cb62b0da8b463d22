//! SQLite Vector Store - rusqlite 기반 벡터 레코드 저장소
//!
//! 벡터는 리틀 엔디언 f32 BLOB, 메타데이터는 JSON 텍스트로 저장합니다.
//! 저장 위치: ~/.story-rag/vectors.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};

use super::entity::EntityType;
use super::vector::{decode_vector, encode_vector, RecordMetadata, VectorRecord, VectorStore};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.story-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".story-rag")
}

// ============================================================================
// SqliteVectorStore
// ============================================================================

/// SQLite 벡터 저장소
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteVectorStore {
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

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                related_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL,
                timestamp TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            )",
            [],
        )
        .context("Failed to create vectors table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_vectors_related_id ON vectors(related_id)",
            [],
        )
        .context("Failed to create related_id index")?;

        tracing::debug!("Vector store initialized at {:?}", self.db_path);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn save_vectors(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        for record in records {
            let metadata = serde_json::to_string(&record.metadata)
                .context("Failed to serialize record metadata")?;

            tx.execute(
                "INSERT OR REPLACE INTO vectors
                    (id, related_id, entity_type, text, vector, timestamp, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.related_id,
                    record.entity_type.as_str(),
                    record.text,
                    encode_vector(&record.vector),
                    record.timestamp.to_rfc3339(),
                    metadata,
                ],
            )
            .context("Failed to insert vector record")?;
        }

        tx.commit().context("Failed to commit vector records")?;
        Ok(records.len())
    }

    async fn get_all_vectors(&self) -> Result<Vec<VectorRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, related_id, entity_type, text, vector, timestamp, metadata
             FROM vectors ORDER BY related_id, timestamp",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, related_id, entity_type, text, vector, timestamp, metadata) = row?;

            // 알 수 없는 타입의 레코드는 건너뜀 (다른 버전이 쓴 데이터)
            let entity_type: EntityType = match entity_type.parse() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("Skipping vector record {}: {}", id, e);
                    continue;
                }
            };

            records.push(VectorRecord {
                id,
                related_id,
                entity_type,
                text,
                vector: decode_vector(&vector),
                timestamp: parse_datetime(&timestamp),
                metadata: serde_json::from_str::<RecordMetadata>(&metadata).unwrap_or_default(),
            });
        }

        Ok(records)
    }

    async fn delete_vectors_for(&self, entity_type: EntityType, related_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "DELETE FROM vectors WHERE entity_type = ?1 AND related_id = ?2",
                params![entity_type.as_str(), related_id],
            )
            .context("Failed to delete vectors")?;
        Ok(rows)
    }

    async fn clear_all(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM vectors", [])
            .context("Failed to clear vectors")?;
        tracing::info!("Cleared all vectors in {:?}", self.db_path);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))
            .context("Failed to count vectors")?;
        Ok(count as usize)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteVectorStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteVectorStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn record(id: &str, related_id: &str, chunk: Option<usize>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            related_id: related_id.to_string(),
            entity_type: EntityType::Chapter,
            text: format!("text of {}", id),
            vector: vec![0.1, 0.2, 0.3],
            timestamp: Utc::now(),
            metadata: RecordMetadata {
                title: Some("Prologue".to_string()),
                chunk_index: chunk,
                total_chunks: chunk.map(|_| 2),
                content_hash: "h1".to_string(),
                provider: "test".to_string(),
                model: "bow".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_save_and_get_all() {
        let (_dir, store) = create_test_store();

        let saved = store
            .save_vectors(&[record("r1", "c1", Some(0)), record("r2", "c1", Some(1))])
            .await
            .unwrap();
        assert_eq!(saved, 2);

        let all = store.get_all_vectors().await.unwrap();
        assert_eq!(all.len(), 2);

        let r1 = all.iter().find(|r| r.id == "r1").unwrap();
        assert_eq!(r1.entity_type, EntityType::Chapter);
        assert_eq!(r1.vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(r1.metadata.chunk_index, Some(0));
        assert_eq!(r1.metadata.total_chunks, Some(2));
        assert!(r1.is_from("test", "bow"));
    }

    #[tokio::test]
    async fn test_delete_by_related_id() {
        let (_dir, store) = create_test_store();

        store
            .save_vectors(&[
                record("r1", "c1", Some(0)),
                record("r2", "c1", Some(1)),
                record("r3", "c2", None),
            ])
            .await
            .unwrap();

        let deleted = store
            .delete_vectors_for(EntityType::Chapter, "c1")
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count().await.unwrap(), 1);

        let deleted = store
            .delete_vectors_for(EntityType::Chapter, "missing")
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_delete_keeps_other_type_with_same_id() {
        let (_dir, store) = create_test_store();

        let mut character = record("r2", "1", None);
        character.entity_type = EntityType::Character;
        store
            .save_vectors(&[record("r1", "1", None), character])
            .await
            .unwrap();

        let deleted = store
            .delete_vectors_for(EntityType::Chapter, "1")
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.get_all_vectors().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entity_type, EntityType::Character);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (_dir, store) = create_test_store();

        store.save_vectors(&[record("r1", "c1", None)]).await.unwrap();
        store.clear_all().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("persist.db");

        {
            let store = SqliteVectorStore::open(&db_path).unwrap();
            store.save_vectors(&[record("r1", "c1", None)]).await.unwrap();
        }

        let store = SqliteVectorStore::open(&db_path).unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[test]
    fn test_parse_datetime_fallback() {
        let dt = parse_datetime("2024-01-02T03:04:05Z");
        assert_eq!(dt.to_rfc3339(), "2024-01-02T03:04:05+00:00");
        // 잘못된 값은 현재 시각으로 대체
        let _ = parse_datetime("not a date");
    }
}
