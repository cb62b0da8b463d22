//! Incremental Indexer - 엔티티를 벡터 레코드로 색인
//!
//! 정규 텍스트의 SHA-256 해시로 변경 여부를 판단하고, 바뀐 엔티티만
//! 다시 임베딩합니다. 한 엔티티의 레코드는 항상 한 번의 색인 패스에서
//! 만들어진 것만 남도록 삭제 후 삽입합니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::chunker::{sentence_chunker, ChunkConfig, Chunker};
use super::entity::{Chapter, Character, Entity, EntityType, WikiEntry};
use super::vector::{RecordMetadata, VectorRecord, VectorStore};
use crate::config::IndexConfig;
use crate::embedding::{EmbedTask, EmbeddingAdapter, EmbeddingCache};

// ============================================================================
// Content Hash Cache
// ============================================================================

/// 정규 텍스트 SHA-256 (hex)
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// (엔티티 타입, ID) → 마지막으로 색인한 정규 텍스트 해시
///
/// 불필요한 재임베딩을 막는 용도일 뿐이며, 비어 있어도 정확성에는 영향이 없습니다.
#[derive(Debug, Default)]
pub struct ContentHashCache {
    hashes: Mutex<HashMap<(EntityType, String), String>>,
}

impl ContentHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_type: EntityType, related_id: &str) -> Option<String> {
        self.hashes
            .lock()
            .ok()?
            .get(&(entity_type, related_id.to_string()))
            .cloned()
    }

    pub fn set(&self, entity_type: EntityType, related_id: &str, hash: String) {
        if let Ok(mut hashes) = self.hashes.lock() {
            hashes.insert((entity_type, related_id.to_string()), hash);
        }
    }

    pub fn remove(&self, entity_type: EntityType, related_id: &str) {
        if let Ok(mut hashes) = self.hashes.lock() {
            hashes.remove(&(entity_type, related_id.to_string()));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut hashes) = self.hashes.lock() {
            hashes.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.hashes.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Canonical Text
// ============================================================================

/// 엔티티 머리말 (청크마다 앞에 붙음)
pub fn header_text(entity: &Entity) -> String {
    match entity {
        Entity::Chapter(c) => chapter_header(c),
        Entity::Character(c) => format!("Character: {}", c.name),
        Entity::Wiki(w) => wiki_header(w),
    }
}

fn chapter_header(chapter: &Chapter) -> String {
    let mut header = format!("Chapter {}: {}", chapter.order, chapter.title);
    if !chapter.summary.trim().is_empty() {
        header.push_str("\nSummary: ");
        header.push_str(chapter.summary.trim());
    }
    header
}

fn wiki_header(entry: &WikiEntry) -> String {
    if entry.category.trim().is_empty() {
        entry.name.clone()
    } else {
        format!("{} [{}]", entry.name, entry.category)
    }
}

/// 엔티티 본문 (청킹/발췌 대상)
pub fn body_text(entity: &Entity) -> String {
    match entity {
        Entity::Chapter(c) => c.content.trim().to_string(),
        Entity::Character(c) => character_profile(c),
        Entity::Wiki(w) => w.description.trim().to_string(),
    }
}

fn character_profile(character: &Character) -> String {
    let fields = [
        ("Role", &character.role),
        ("Description", &character.description),
        ("Appearance", &character.appearance),
        ("Background", &character.background),
        ("Personality", &character.personality),
        ("Speaking style", &character.speaking_style),
        ("Motivation", &character.motivation),
    ];

    let mut lines: Vec<String> = fields
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(label, value)| format!("{}: {}", label, value.trim()))
        .collect();

    if !character.relationships.is_empty() {
        let relations = character
            .relationships
            .iter()
            .map(|r| format!("{} ({})", r.target_id, r.relation))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("Relationships: {}", relations));
    }

    lines.join("\n")
}

/// 정규 텍스트 = 머리말 + 본문 (해시 대상)
pub fn canonical_text(entity: &Entity) -> String {
    let header = header_text(entity);
    let body = body_text(entity);
    if body.is_empty() {
        header
    } else {
        format!("{}\n\n{}", header, body)
    }
}

// ============================================================================
// Options / Outcomes
// ============================================================================

/// 색인 옵션
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// 긴 본문을 청크로 나눌지
    pub chunking: bool,
    /// 해시가 같아도 다시 색인
    pub force: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunking: true,
            force: false,
        }
    }
}

/// 단일 엔티티 색인 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// 새 레코드 저장 완료
    Indexed { records: usize },
    /// 정규 텍스트가 바뀌지 않아 건너뜀
    Unchanged,
    /// 임베딩 불가, 저장소는 건드리지 않음
    Unavailable,
    /// 저장소 에러
    Failed { reason: String },
}

/// 진행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Indexing,
    Completed,
    Error,
}

/// 배치 진행 콜백 인자
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexProgress {
    /// 1부터 시작
    pub current: usize,
    pub total: usize,
    pub label: String,
    pub status: IndexStatus,
}

/// 배치 색인 요약
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub unavailable: usize,
    pub failed: usize,
    /// 저장된 레코드 수
    pub records: usize,
    /// (엔티티 ID, 에러)
    pub errors: Vec<(String, String)>,
}

// ============================================================================
// Indexer
// ============================================================================

/// 증분 색인기
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    adapter: EmbeddingAdapter,
    cache: Arc<EmbeddingCache>,
    hashes: Arc<ContentHashCache>,
    chunker: Box<dyn Chunker>,
    excerpt_chars: usize,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        adapter: EmbeddingAdapter,
        cache: Arc<EmbeddingCache>,
        hashes: Arc<ContentHashCache>,
        config: &IndexConfig,
    ) -> Self {
        let chunker = sentence_chunker(ChunkConfig {
            max_characters: config.chunk_size,
            overlap_characters: config.overlap,
        });

        Self {
            store,
            adapter,
            cache,
            hashes,
            chunker,
            excerpt_chars: config.excerpt_chars,
        }
    }

    pub fn hashes(&self) -> &Arc<ContentHashCache> {
        &self.hashes
    }

    /// 임베딩할 텍스트 목록 (청크 여부 포함)
    fn embedding_texts(&self, entity: &Entity, chunking: bool) -> (Vec<String>, bool) {
        let header = header_text(entity);
        let body = body_text(entity);

        if chunking && self.chunker.needs_chunking(&body) {
            let texts = self
                .chunker
                .chunk(&body)
                .into_iter()
                .map(|chunk| format!("{}\n\n{}", header, chunk))
                .collect();
            return (texts, true);
        }

        let excerpt: String = body.chars().take(self.excerpt_chars).collect();
        let text = if excerpt.is_empty() {
            header
        } else {
            format!("{}\n\n{}", header, excerpt)
        };
        (vec![text], false)
    }

    /// 단일 엔티티 색인
    pub async fn index(&self, entity: &Entity, options: &IndexOptions) -> IndexOutcome {
        let related_id = entity.id();
        let entity_type = entity.entity_type();
        let hash = content_hash(&canonical_text(entity));

        if !options.force
            && self.hashes.get(entity_type, related_id).as_deref() == Some(hash.as_str())
        {
            tracing::debug!("Skipping unchanged {} {}", entity_type, related_id);
            return IndexOutcome::Unchanged;
        }

        let Some(tag) = self.adapter.tag() else {
            return IndexOutcome::Unavailable;
        };

        let (texts, chunked) = self.embedding_texts(entity, options.chunking);

        // 삭제 전에 모든 임베딩을 먼저 확보
        let mut vectors = Vec::with_capacity(texts.len());
        for text in &texts {
            let vector = self
                .cache
                .get_or_compute(text, EmbedTask::Document, &self.adapter)
                .await;
            if vector.is_empty() {
                tracing::warn!(
                    "Embedding unavailable for {} {}, keeping existing records",
                    entity_type,
                    related_id
                );
                return IndexOutcome::Unavailable;
            }
            vectors.push(vector);
        }

        let total_chunks = texts.len();
        let timestamp = Utc::now();
        let title = entity.label();
        let records: Vec<VectorRecord> = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| VectorRecord {
                id: uuid::Uuid::new_v4().to_string(),
                related_id: related_id.to_string(),
                entity_type,
                text,
                vector,
                timestamp,
                metadata: RecordMetadata {
                    title: Some(title.clone()),
                    chunk_index: chunked.then_some(i),
                    total_chunks: chunked.then_some(total_chunks),
                    content_hash: hash.clone(),
                    provider: tag.provider.clone(),
                    model: tag.model.clone(),
                },
            })
            .collect();

        if let Err(e) = self.replace(entity_type, related_id, &records).await {
            tracing::warn!("Failed to store vectors for {}: {:#}", related_id, e);
            return IndexOutcome::Failed {
                reason: format!("{:#}", e),
            };
        }

        self.hashes.set(entity_type, related_id, hash);
        tracing::debug!(
            "Indexed {} {} ({} records)",
            entity_type,
            related_id,
            records.len()
        );
        IndexOutcome::Indexed {
            records: records.len(),
        }
    }

    /// 삭제 후 삽입 (트랜잭션 아님)
    async fn replace(
        &self,
        entity_type: EntityType,
        related_id: &str,
        records: &[VectorRecord],
    ) -> Result<usize> {
        self.store.delete_vectors_for(entity_type, related_id).await?;
        self.store.save_vectors(records).await
    }

    /// 순차 배치 색인
    ///
    /// 한 항목의 실패가 나머지를 막지 않습니다.
    pub async fn index_batch<F>(
        &self,
        entities: &[Entity],
        options: &IndexOptions,
        mut progress: F,
    ) -> BatchReport
    where
        F: FnMut(&IndexProgress),
    {
        let total = entities.len();
        let mut report = BatchReport {
            total,
            ..Default::default()
        };

        for (i, entity) in entities.iter().enumerate() {
            let label = entity.label();
            progress(&IndexProgress {
                current: i + 1,
                total,
                label: label.clone(),
                status: IndexStatus::Indexing,
            });

            let status = match self.index(entity, options).await {
                IndexOutcome::Indexed { records } => {
                    report.indexed += 1;
                    report.records += records;
                    IndexStatus::Completed
                }
                IndexOutcome::Unchanged => {
                    report.unchanged += 1;
                    IndexStatus::Completed
                }
                IndexOutcome::Unavailable => {
                    report.unavailable += 1;
                    report
                        .errors
                        .push((entity.id().to_string(), "embedding unavailable".to_string()));
                    IndexStatus::Error
                }
                IndexOutcome::Failed { reason } => {
                    report.failed += 1;
                    report.errors.push((entity.id().to_string(), reason));
                    IndexStatus::Error
                }
            };

            progress(&IndexProgress {
                current: i + 1,
                total,
                label,
                status,
            });
        }

        tracing::info!(
            "Batch indexed {}/{} (unchanged: {}, unavailable: {}, failed: {})",
            report.indexed,
            report.total,
            report.unchanged,
            report.unavailable,
            report.failed
        );
        report
    }

    /// 엔티티의 모든 레코드 삭제
    pub async fn remove(&self, entity_type: EntityType, related_id: &str) -> Result<usize> {
        let deleted = self.store.delete_vectors_for(entity_type, related_id).await?;
        self.hashes.remove(entity_type, related_id);
        Ok(deleted)
    }

    /// 저장소와 해시 캐시 전체 삭제
    pub async fn clear(&self) -> Result<()> {
        self.store.clear_all().await?;
        self.hashes.clear();
        Ok(())
    }

    /// 저장된 레코드가 다른 프로바이더로 만들어졌으면 전체 삭제
    ///
    /// 삭제했으면 `true`. 임베딩 불가 상태에서는 아무것도 하지 않습니다.
    pub async fn ensure_provider(&self) -> Result<bool> {
        let Some(tag) = self.adapter.tag() else {
            return Ok(false);
        };

        let records = self.store.get_all_vectors().await?;
        let stale = records
            .iter()
            .any(|r| !r.is_from(&tag.provider, &tag.model));

        if stale {
            tracing::warn!(
                "Stored vectors come from a different provider, clearing for re-index with {}",
                tag
            );
            self.clear().await?;
        }
        Ok(stale)
    }

    /// 저장된 레코드의 `content_hash`로 해시 캐시 채우기
    ///
    /// 현재 프로바이더로 만든 레코드만 사용합니다. 채운 엔티티 수를 반환합니다.
    pub async fn seed_hashes_from_store(&self) -> Result<usize> {
        let records = self.store.get_all_vectors().await?;
        let tag = self.adapter.tag();

        let mut seeded = 0;
        for record in &records {
            if record.metadata.content_hash.is_empty() {
                continue;
            }
            if let Some(tag) = &tag {
                if !record.is_from(&tag.provider, &tag.model) {
                    continue;
                }
            }
            if self
                .hashes
                .get(record.entity_type, &record.related_id)
                .is_none()
            {
                seeded += 1;
            }
            self.hashes.set(
                record.entity_type,
                &record.related_id,
                record.metadata.content_hash.clone(),
            );
        }

        tracing::debug!("Seeded {} content hashes from store", seeded);
        Ok(seeded)
    }
}

// ============================================================================
// Tests
// ============================================================================
