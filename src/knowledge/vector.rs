//! Vector Store - 벡터 레코드와 저장소 트레이트
//!
//! 저장소 구현체(SQLite, LanceDB)가 공통으로 따르는 읽기/쓰기 계약입니다.
//! 검색은 저장소가 아니라 검색기에서 전체 벡터를 읽어 수행합니다.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::EntityType;

// ============================================================================
// Types
// ============================================================================

/// 레코드 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// 엔티티 표시 이름 (챕터 제목, 인물 이름 등)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 청크 인덱스 (0-based, 청킹된 경우에만)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// 전체 청크 수 (청킹된 경우에만)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    /// 이 레코드를 만든 색인 패스의 정규 텍스트 해시
    #[serde(default)]
    pub content_hash: String,
    /// 임베딩 프로바이더 이름
    #[serde(default)]
    pub provider: String,
    /// 임베딩 모델 이름
    #[serde(default)]
    pub model: String,
}

/// 벡터 레코드 (저장 단위)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// 레코드 ID (UUID)
    pub id: String,
    /// 원본 엔티티 ID
    pub related_id: String,
    /// 엔티티 종류
    pub entity_type: EntityType,
    /// 임베딩된 텍스트
    pub text: String,
    /// 임베딩 벡터
    pub vector: Vec<f32>,
    /// 생성 시각
    pub timestamp: DateTime<Utc>,
    pub metadata: RecordMetadata,
}

impl VectorRecord {
    /// 같은 프로바이더/모델로 만든 레코드인지
    pub fn is_from(&self, provider: &str, model: &str) -> bool {
        self.metadata.provider == provider && self.metadata.model == model
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 저장소 트랜잭션은 보장하지 않습니다. 삭제 후 삽입 사이에 중단되면
/// 해당 엔티티는 다음 색인까지 검색에서 빠질 수 있습니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 레코드 배치 저장
    async fn save_vectors(&self, records: &[VectorRecord]) -> Result<usize>;

    /// 전체 레코드 조회
    async fn get_all_vectors(&self) -> Result<Vec<VectorRecord>>;

    /// 한 엔티티의 레코드 삭제
    ///
    /// ID는 타입 안에서만 유일하므로 타입과 ID를 함께 받습니다.
    async fn delete_vectors_for(&self, entity_type: EntityType, related_id: &str) -> Result<usize>;

    /// 전체 삭제
    async fn clear_all(&self) -> Result<()>;

    /// 레코드 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 저장소 이름 (로그/상태 표시용)
    fn name(&self) -> &str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 길이가 다르거나 비어 있거나 영벡터이면 0.0을 반환합니다.
/// 결과는 -1.0 ~ 1.0 범위입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// f32 벡터를 리틀 엔디언 바이트로 인코딩
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// 리틀 엔디언 바이트를 f32 벡터로 디코딩 (남는 바이트는 무시)
pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
