//! 임베딩 모듈 - 외부 임베딩 API 어댑터
//!
//! 텍스트를 벡터로 변환하는 프로바이더 트레이트와,
//! 모든 실패를 빈 벡터로 정규화하는 어댑터를 제공합니다.
//!
//! 빈 벡터는 "임베딩 불가"를 뜻하는 유일한 신호이며,
//! 나머지 시스템은 이 신호를 보고 키워드 전용 모드로 전환합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let adapter = EmbeddingAdapter::from_config(&config.provider);
//! let vector = adapter.embed("The dragon clan fell.").await; // 실패 시 vec![]
//! ```

pub mod cache;
mod gemini;
mod openai;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::EmbeddingError;

pub use cache::{CacheStats, EmbeddingCache};
pub use gemini::GeminiEmbedding;
pub use openai::OpenAiEmbedding;

/// 임베딩 입력 최대 길이 (문자 수)
pub const MAX_EMBED_CHARS: usize = 10_000;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩 (색인할 문서)
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 쿼리 임베딩
    ///
    /// 문서와 쿼리를 구분하는 모델만 재정의합니다. 기본 구현은 `embed`와 같습니다.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 이름
    fn name(&self) -> &str;

    /// 프로바이더 이름 (레코드 태깅용)
    fn provider(&self) -> &str;
}

// ============================================================================
// Embed Task
// ============================================================================

/// 임베딩 용도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedTask {
    /// 저장소에 넣을 엔티티 텍스트
    Document,
    /// 검색 쿼리
    Query,
}

impl EmbedTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedTask::Document => "document",
            EmbedTask::Query => "query",
        }
    }
}

// ============================================================================
// Provider Tag
// ============================================================================

/// 벡터 출처 태그
///
/// 서로 다른 프로바이더/모델의 벡터는 같은 공간에 있지 않으므로 비교하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderTag {
    pub provider: String,
    pub model: String,
}

impl std::fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

// ============================================================================
// EmbeddingAdapter
// ============================================================================

/// 임베딩 어댑터
///
/// 프로바이더가 없거나, 임베딩을 지원하지 않거나, 키가 없거나,
/// 호출이 실패하면 에러 대신 빈 벡터를 반환합니다.
#[derive(Clone)]
pub struct EmbeddingAdapter {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    unavailable_reason: Option<String>,
}

impl std::fmt::Debug for EmbeddingAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingAdapter")
            .field("tag", &self.tag())
            .field("unavailable_reason", &self.unavailable_reason)
            .finish()
    }
}

impl EmbeddingAdapter {
    /// 프로바이더로 생성
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider: Some(provider),
            unavailable_reason: None,
        }
    }

    /// 임베딩 없는 어댑터 (항상 빈 벡터)
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            provider: None,
            unavailable_reason: Some(reason.into()),
        }
    }

    /// 설정으로 생성
    ///
    /// 프로바이더 생성 실패는 에러가 아니라 "임베딩 불가" 상태로 기록됩니다.
    pub fn from_config(config: &ProviderConfig) -> Self {
        match create_provider(config) {
            Ok(provider) => {
                tracing::info!(
                    "Using {} embedding ({}, dimension: {})",
                    provider.provider(),
                    provider.name(),
                    provider.dimension()
                );
                Self::new(provider)
            }
            Err(e) => {
                tracing::warn!("Embeddings unavailable, keyword-only mode: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    /// 임베딩 사용 가능 여부
    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    /// 사용 불가 사유
    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    /// 현재 프로바이더 태그
    pub fn tag(&self) -> Option<ProviderTag> {
        self.provider.as_ref().map(|p| ProviderTag {
            provider: p.provider().to_string(),
            model: p.name().to_string(),
        })
    }

    /// 문서 임베딩 (실패 시 빈 벡터)
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_for(EmbedTask::Document, text).await
    }

    /// 쿼리 임베딩 (실패 시 빈 벡터)
    pub async fn embed_query(&self, text: &str) -> Vec<f32> {
        self.embed_for(EmbedTask::Query, text).await
    }

    /// 용도를 지정한 임베딩 (실패 시 빈 벡터)
    pub async fn embed_for(&self, task: EmbedTask, text: &str) -> Vec<f32> {
        match self.try_embed(task, text).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!("Embedding unavailable ({}): {}", task.as_str(), e);
                Vec::new()
            }
        }
    }

    async fn try_embed(&self, task: EmbedTask, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            EmbeddingError::Unsupported(
                self.unavailable_reason
                    .clone()
                    .unwrap_or_else(|| "none".to_string()),
            )
        })?;

        let input = truncate_chars(text, MAX_EMBED_CHARS);
        let vector = match task {
            EmbedTask::Document => provider.embed(input).await?,
            EmbedTask::Query => provider.embed_query(input).await?,
        };
        Ok(vector)
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// - Gemini: `GEMINI_API_KEY` > `GOOGLE_AI_API_KEY`
/// - OpenAI: `OPENAI_API_KEY`
/// - Anthropic: `ANTHROPIC_API_KEY`
pub fn get_api_key(kind: ProviderKind) -> Option<String> {
    for var in kind.api_key_vars() {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Some(key);
            }
        }
    }

    None
}

/// API 키 존재 여부 확인
pub fn has_api_key(kind: ProviderKind) -> bool {
    get_api_key(kind).is_some()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에서 임베딩 프로바이더 생성
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    if !config.kind.supports_embeddings() {
        return Err(EmbeddingError::Unsupported(config.kind.to_string()));
    }

    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| get_api_key(config.kind))
        .ok_or_else(|| EmbeddingError::MissingCredentials(config.kind.to_string()))?;

    let provider: Arc<dyn EmbeddingProvider> = match config.kind {
        ProviderKind::Gemini => Arc::new(GeminiEmbedding::new(
            api_key,
            config.model.clone(),
            config.dimension,
        )?),
        ProviderKind::OpenAi => Arc::new(OpenAiEmbedding::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
        )?),
        ProviderKind::Anthropic | ProviderKind::None => {
            return Err(EmbeddingError::Unsupported(config.kind.to_string()))
        }
    };

    Ok(provider)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문자 수 기준으로 자르기 (UTF-8 안전)
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// Tests
// ============================================================================
