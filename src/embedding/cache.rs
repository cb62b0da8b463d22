//! 쿼리 임베딩 캐시
//!
//! 같은 텍스트를 반복해서 임베딩하지 않도록 (프로바이더 태그 + 용도 + 텍스트)의
//! SHA-256 해시를 키로 벡터를 보관합니다. 빈 벡터는 저장하지 않습니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use super::{EmbedTask, EmbeddingAdapter, ProviderTag};

/// 기본 TTL (1시간)
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
/// 기본 최대 엔트리 수
pub const DEFAULT_MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone)]
struct CacheEntry {
    vector: Vec<f32>,
    created_at: Instant,
}

/// 캐시 통계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

/// 임베딩 캐시
///
/// `Arc`로 공유하며, 잠금은 맵 조회/갱신 동안만 잡습니다.
/// 원격 호출은 잠금 밖에서 이루어집니다.
#[derive(Debug)]
pub struct EmbeddingCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl EmbeddingCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// 캐시된 벡터를 반환하거나, 어댑터로 계산해 저장
    ///
    /// 어댑터가 사용 불가이면 빈 벡터를 반환하고 아무것도 저장하지 않습니다.
    pub async fn get_or_compute(
        &self,
        text: &str,
        task: EmbedTask,
        adapter: &EmbeddingAdapter,
    ) -> Vec<f32> {
        let Some(tag) = adapter.tag() else {
            return Vec::new();
        };
        let key = cache_key(&tag, task, text);

        if let Some(vector) = self.lookup(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return vector;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let vector = adapter.embed_for(task, text).await;
        if !vector.is_empty() {
            self.insert(key, vector.clone());
        }
        vector
    }

    fn lookup(&self, key: &str) -> Option<Vec<f32>> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|entry| entry.created_at.elapsed() < self.ttl)
            .map(|entry| entry.vector.clone())
    }

    fn insert(&self, key: String, vector: Vec<f32>) {
        let Ok(mut entries) = self.entries.lock() else {
            tracing::warn!("Embedding cache lock poisoned, skipping insert");
            return;
        };

        entries.insert(
            key,
            CacheEntry {
                vector,
                created_at: Instant::now(),
            },
        );

        if entries.len() > self.max_entries {
            self.evict(&mut entries);
        }
    }

    /// 만료 엔트리를 먼저 지우고, 그래도 넘치면 오래된 순으로 제거
    fn evict(&self, entries: &mut HashMap<String, CacheEntry>) {
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.created_at.elapsed() < ttl);

        let overflow = entries.len().saturating_sub(self.max_entries);
        if overflow > 0 {
            let mut by_age: Vec<(String, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.created_at))
                .collect();
            by_age.sort_by_key(|(_, created)| *created);
            for (key, _) in by_age.into_iter().take(overflow) {
                entries.remove(&key);
            }
        }

        tracing::debug!("Embedding cache swept, {} entries remain", entries.len());
    }

    /// 현재 엔트리 수
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 전체 삭제
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// 캐시 키: SHA-256(provider / model / task / text)
fn cache_key(tag: &ProviderTag, task: EmbedTask, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tag.provider.as_bytes());
    hasher.update([0u8]);
    hasher.update(tag.model.as_bytes());
    hasher.update([0u8]);
    hasher.update(task.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::embedding::testing::{BagOfWordsEmbedding, FailingEmbedding};

    #[tokio::test]
    async fn test_hit_skips_provider() {
        let provider = Arc::new(BagOfWordsEmbedding::new());
        let adapter = EmbeddingAdapter::new(provider.clone());
        let cache = EmbeddingCache::default();

        let first = cache.get_or_compute("the dragon clan", EmbedTask::Query, &adapter).await;
        let second = cache.get_or_compute("the dragon clan", EmbedTask::Query, &adapter).await;

        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );
    }

    #[tokio::test]
    async fn test_expired_entry_recomputed() {
        let provider = Arc::new(BagOfWordsEmbedding::new());
        let adapter = EmbeddingAdapter::new(provider.clone());
        let cache = EmbeddingCache::new(Duration::ZERO, 10);

        cache.get_or_compute("query", EmbedTask::Query, &adapter).await;
        cache.get_or_compute("query", EmbedTask::Query, &adapter).await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_vectors_not_cached() {
        let adapter = EmbeddingAdapter::new(Arc::new(FailingEmbedding));
        let cache = EmbeddingCache::default();

        assert!(cache.get_or_compute("query", EmbedTask::Query, &adapter).await.is_empty());
        assert!(cache.is_empty());

        let unavailable = EmbeddingAdapter::unavailable("none");
        assert!(cache.get_or_compute("query", EmbedTask::Query, &unavailable).await.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_bound_evicts_oldest() {
        let adapter = EmbeddingAdapter::new(Arc::new(BagOfWordsEmbedding::new()));
        let cache = EmbeddingCache::new(DEFAULT_TTL, 3);

        for text in ["one", "two", "three", "four", "five"] {
            cache.get_or_compute(text, EmbedTask::Query, &adapter).await;
        }
        assert_eq!(cache.len(), 3);

        // 가장 최근 항목은 남아 있어야 함
        let hits_before = cache.stats().hits;
        cache.get_or_compute("five", EmbedTask::Query, &adapter).await;
        assert_eq!(cache.stats().hits, hits_before + 1);
    }

    #[test]
    fn test_key_depends_on_provider() {
        let a = ProviderTag {
            provider: "gemini".to_string(),
            model: "m".to_string(),
        };
        let b = ProviderTag {
            provider: "openai".to_string(),
            model: "m".to_string(),
        };
        let query = EmbedTask::Query;
        assert_ne!(cache_key(&a, query, "text"), cache_key(&b, query, "text"));
        assert_eq!(cache_key(&a, query, "text"), cache_key(&a, query, "text"));
        assert_ne!(
            cache_key(&a, query, "text"),
            cache_key(&a, EmbedTask::Document, "text")
        );
    }

    #[tokio::test]
    async fn test_query_and_document_cached_separately() {
        let provider = Arc::new(BagOfWordsEmbedding::new());
        let adapter = EmbeddingAdapter::new(provider.clone());
        let cache = EmbeddingCache::default();

        cache
            .get_or_compute("ember keep", EmbedTask::Document, &adapter)
            .await;
        cache
            .get_or_compute("ember keep", EmbedTask::Query, &adapter)
            .await;

        assert_eq!(cache.len(), 2);
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.query_calls(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let adapter = EmbeddingAdapter::new(Arc::new(BagOfWordsEmbedding::new()));
        let cache = EmbeddingCache::default();
        cache.get_or_compute("query", EmbedTask::Query, &adapter).await;
        cache.clear();
        assert!(cache.is_empty());
    }
}
