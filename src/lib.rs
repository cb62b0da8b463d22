//! story-rag - 소설 집필용 컨텍스트 엔진
//!
//! 챕터, 인물, 설정(위키) 항목을 색인하고, 생성 요청마다
//! 벡터 유사도 + 키워드 하이브리드 검색과 인물 관계 그래프로
//! 관련 컨텍스트를 골라 줍니다.
//!
//! 임베딩 프로바이더나 저장소가 없어도 키워드/최신순 폴백으로 동작하며,
//! 품질 저하 여부는 결과에 함께 기록됩니다.

pub mod cli;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod knowledge;

// Re-exports
pub use config::AppConfig;
pub use context::{ContextAssembler, ContextRequest, GenerationContext};
pub use embedding::{
    create_provider, get_api_key, has_api_key, EmbedTask, EmbeddingAdapter, EmbeddingCache,
    EmbeddingProvider, GeminiEmbedding, OpenAiEmbedding,
};
pub use error::{ConfigError, DegradeReason, EmbeddingError};
pub use graph::{
    RelationWeightResolver, RelationshipGraph, RelationshipSummary, TraversalConfig,
    TraversalResult, TraversalStrategy,
};
pub use knowledge::{
    get_data_dir, Chapter, Character, CharacterRelationship, Entity, EntityType, HybridRetriever,
    IndexOptions, Indexer, LanceVectorStore, MatchType, Project, Retrieval, RetrievalMode,
    RetrievalResult, SqliteVectorStore, VectorRecord, VectorStore, WikiEntry,
};
