//! 테스트용 저장소

use anyhow::Result;
use async_trait::async_trait;

use super::entity::EntityType;
use super::vector::{VectorRecord, VectorStore};

/// 모든 연산이 실패하는 저장소
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl VectorStore for FailingStore {
    async fn save_vectors(&self, _records: &[VectorRecord]) -> Result<usize> {
        anyhow::bail!("store offline")
    }

    async fn get_all_vectors(&self) -> Result<Vec<VectorRecord>> {
        anyhow::bail!("store offline")
    }

    async fn delete_vectors_for(
        &self,
        _entity_type: EntityType,
        _related_id: &str,
    ) -> Result<usize> {
        anyhow::bail!("store offline")
    }

    async fn clear_all(&self) -> Result<()> {
        anyhow::bail!("store offline")
    }

    async fn count(&self) -> Result<usize> {
        anyhow::bail!("store offline")
    }

    fn name(&self) -> &str {
        "failing"
    }
}
