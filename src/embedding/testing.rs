//! 테스트용 임베딩 프로바이더

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;

use super::EmbeddingProvider;

const DIMENSION: usize = 64;

/// 결정적 단어 주머니 임베딩
///
/// 단어를 해시 버킷에 세어 넣으므로 같은 단어를 공유하는 텍스트끼리
/// 코사인 유사도가 높아집니다.
#[derive(Debug, Default)]
pub struct BagOfWordsEmbedding {
    calls: AtomicUsize,
    query_calls: AtomicUsize,
    last_input_chars: AtomicUsize,
    poison: Option<String>,
}

impl BagOfWordsEmbedding {
    pub fn new() -> Self {
        Self::default()
    }

    /// `marker`를 포함한 텍스트에서만 실패
    pub fn poisoned(marker: &str) -> Self {
        Self {
            poison: Some(marker.to_string()),
            ..Self::default()
        }
    }

    /// 지금까지의 embed 호출 수
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 그중 쿼리 임베딩 호출 수
    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn last_input_chars(&self) -> usize {
        self.last_input_chars.load(Ordering::SeqCst)
    }
}

/// FNV-1a
fn bucket(word: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMENSION as u64) as usize
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    let lower = text.to_lowercase();
    for word in lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
    {
        vector[bucket(word)] += 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_input_chars
            .store(text.chars().count(), Ordering::SeqCst);
        if let Some(marker) = &self.poison {
            if text.contains(marker.as_str()) {
                anyhow::bail!("poisoned input");
            }
        }
        Ok(bag_of_words(text))
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.embed(text).await
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }

    fn provider(&self) -> &str {
        "test"
    }
}

/// 항상 실패하는 프로바이더
#[derive(Debug, Default)]
pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("simulated outage")
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn provider(&self) -> &str {
        "test"
    }
}
