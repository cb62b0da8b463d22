//! 에러 타입 정의
//!
//! 내부 로직은 `anyhow::Result`를 쓰고,
//! 호출자가 구분해야 하는 실패 유형만 여기서 열거합니다.

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Embedding Errors
// ============================================================================

/// 임베딩 실패 유형
///
/// 어떤 경우든 어댑터 경계에서 빈 벡터로 정규화되며 호출자에게 전파되지 않습니다.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// 설정된 프로바이더가 임베딩을 지원하지 않음
    #[error("provider '{0}' does not support embeddings")]
    Unsupported(String),

    /// API 키 없음
    #[error("missing credentials for provider '{0}'")]
    MissingCredentials(String),

    /// 원격 호출 실패 (네트워크, API 에러)
    #[error("embedding call failed: {0:#}")]
    CallFailed(#[from] anyhow::Error),
}

// ============================================================================
// Degradation Reasons
// ============================================================================

/// 검색 품질이 낮아진 이유
///
/// `Retrieval::degraded`와 함께 반환되어 "정상 하이브리드 결과"와
/// "키워드/최신순 폴백"을 구분할 수 있게 합니다.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DegradeReason {
    /// 임베딩 프로바이더 없음 또는 호출 실패 → 키워드 전용
    #[error("embedding provider unavailable, keyword-only scoring")]
    ProviderUnavailable,

    /// 공백뿐인 쿼리 → 임베딩 없이 키워드 전용
    #[error("query is empty, nothing to embed")]
    EmptyQuery,

    /// 현재 프로바이더로 색인된 벡터가 없음 → 키워드 전용
    #[error("no stored vectors for this entity type")]
    NoStoredVectors,

    /// 저장소 읽기 실패 → 결정적 폴백
    #[error("vector store failure: {0}")]
    StoreFailure(String),

    /// 설정으로 검색이 꺼져 있음
    #[error("retrieval disabled by configuration")]
    Disabled,
}

// ============================================================================
// Config Errors
// ============================================================================

/// 설정 파일 로드 에러
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown {field} '{value}'")]
    UnknownValue { field: &'static str, value: String },
}
