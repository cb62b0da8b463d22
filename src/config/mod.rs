//! 설정 모듈
//!
//! `<data_dir>/config.json`을 읽고(없으면 기본값), 그 위에 환경변수를 덮어씁니다.
//! 모든 필드는 기본값이 있으므로 부분 설정 파일도 허용됩니다.
//!
//! 환경변수:
//! - `STORY_RAG_PROVIDER` (gemini | openai | anthropic | none)
//! - `STORY_RAG_MODEL`
//! - `STORY_RAG_STORE` (sqlite | lance)
//! - `GEMINI_API_KEY` / `GOOGLE_AI_API_KEY`, `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::knowledge::get_data_dir;

/// 설정 파일 이름
pub const CONFIG_FILE: &str = "config.json";

// ============================================================================
// Provider
// ============================================================================

/// LLM/임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    Anthropic,
    #[default]
    None,
}

impl ProviderKind {
    /// 임베딩 API 지원 여부
    pub fn supports_embeddings(self) -> bool {
        matches!(self, ProviderKind::Gemini | ProviderKind::OpenAi)
    }

    /// API 키를 찾을 환경변수 (우선순위 순)
    pub fn api_key_vars(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Gemini => &["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"],
            ProviderKind::OpenAi => &["OPENAI_API_KEY"],
            ProviderKind::Anthropic => &["ANTHROPIC_API_KEY"],
            ProviderKind::None => &[],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::None => "none",
        };
        f.write_str(s)
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "none" | "" => Ok(ProviderKind::None),
            _ => Err(ConfigError::UnknownValue {
                field: "provider",
                value: s.to_string(),
            }),
        }
    }
}

/// 임베딩 프로바이더 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// 비어 있으면 환경변수에서 찾음
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// OpenAI 호환 서버 주소
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Gemini 출력 차원 (768, 1536, 3072)
    pub dimension: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::None,
            api_key: None,
            model: None,
            base_url: None,
            dimension: 768,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// 벡터 저장소 백엔드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Lance,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "lance" | "lancedb" => Ok(StoreBackend::Lance),
            _ => Err(ConfigError::UnknownValue {
                field: "store",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// 미지정 시 데이터 디렉토리 아래 (vectors.db / lance/)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// ============================================================================
// Cache / Index / Retrieval / Graph
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 100,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// 색인 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// 긴 챕터를 청크로 나눠 색인할지
    pub chunking: bool,
    pub chunk_size: usize,
    pub overlap: usize,
    /// 청킹하지 않을 때 본문에서 가져올 최대 문자 수
    pub excerpt_chars: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunking: true,
            chunk_size: 1500,
            overlap: 200,
            excerpt_chars: 2500,
        }
    }
}

/// 검색 점수/필터 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub enabled: bool,
    pub vector_weight: f32,
    pub keyword_weight: f32,
    /// 이보다 낮은 복합 점수는 키워드 근거가 없으면 제외
    pub similarity_floor: f32,
    /// 챕터는 키워드 점수가 이 값을 넘어야 하한 미만이어도 유지
    pub chapter_keyword_floor: f32,
    pub keyword_floor: f32,
    pub dedup_threshold: f32,
    pub recency_weight: f32,
    pub name_bonus: f32,
    pub category_bonus: f32,
    pub graph_bonus: f32,
    pub chapter_top_k: usize,
    pub character_top_k: usize,
    pub wiki_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vector_weight: 0.6,
            keyword_weight: 0.4,
            similarity_floor: 0.3,
            chapter_keyword_floor: 0.1,
            keyword_floor: 0.0,
            dedup_threshold: 0.7,
            recency_weight: 0.1,
            name_bonus: 0.2,
            category_bonus: 0.1,
            graph_bonus: 0.2,
            chapter_top_k: 3,
            character_top_k: 5,
            wiki_top_k: 5,
        }
    }
}

/// 관계 그래프 탐색 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub max_depth: usize,
    pub depth_decay: f32,
    pub min_path_weight: f32,
    /// "bfs" | "best_first"
    pub strategy: String,
    pub path_max_depth: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            depth_decay: 0.6,
            min_path_weight: 0.1,
            strategy: "bfs".to_string(),
            path_max_depth: 4,
        }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub graph: GraphConfig,
}

impl AppConfig {
    /// 기본 데이터 디렉토리에서 로드
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&get_data_dir())
    }

    /// 데이터 디렉토리에서 로드 (파일 → 환경변수 순)
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&data_dir.join(CONFIG_FILE))?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// 파일만 읽기 (없으면 기본값)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// 환경변수 덮어쓰기
    ///
    /// `lookup`은 변수 이름을 받아 값을 돌려주며, 테스트에서는 맵으로 대체합니다.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.is_empty());

        if let Some(provider) = get("STORY_RAG_PROVIDER") {
            self.provider.kind = provider.parse()?;
        }
        if let Some(model) = get("STORY_RAG_MODEL") {
            self.provider.model = Some(model);
        }
        if let Some(store) = get("STORY_RAG_STORE") {
            self.store.backend = store.parse()?;
        }

        if self.provider.api_key.is_none() {
            self.provider.api_key = self
                .provider
                .kind
                .api_key_vars()
                .iter()
                .find_map(|var| get(*var));
        }

        Ok(())
    }

    /// 저장소 경로 (설정 값이 없으면 데이터 디렉토리 기준)
    pub fn store_path(&self, data_dir: &Path) -> PathBuf {
        match (&self.store.path, self.store.backend) {
            (Some(path), _) => path.clone(),
            (None, StoreBackend::Sqlite) => data_dir.join("vectors.db"),
            (None, StoreBackend::Lance) => data_dir.join("lance"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
