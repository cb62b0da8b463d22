//! Knowledge 모듈 - 서사 엔티티 색인과 하이브리드 검색
//!
//! - Entity: 챕터/인물/위키 항목과 프로젝트 파일
//! - Keywords: 키워드 추출과 Jaccard 유사도
//! - Store: SQLite 벡터 저장소 (기본), LanceDB 저장소
//! - Indexer: 내용 해시 기반 증분 색인
//! - Hybrid: 벡터 + 키워드 복합 점수와 폴백
//! - Chunker: 문장 경계 인식 텍스트 분할

mod chunker;
mod entity;
mod hybrid;
mod indexer;
mod keywords;
mod lance;
mod store;
mod vector;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use chunker::{sentence_chunker, ChunkConfig, Chunker, SentenceChunker};
pub use entity::{
    Chapter, Character, CharacterRelationship, Entity, EntityType, Project, Retrievable,
    WikiEntry,
};
pub use hybrid::{
    query_variants, HybridRetriever, MatchType, Retrieval, RetrievalMode, RetrievalResult,
};
pub use indexer::{
    body_text, canonical_text, content_hash, header_text, BatchReport, ContentHashCache,
    IndexOptions, IndexOutcome, IndexProgress, IndexStatus, Indexer,
};
pub use keywords::{extract_keywords, jaccard, keyword_set, MAX_KEYWORDS};
pub use lance::LanceVectorStore;
pub use store::{get_data_dir, SqliteVectorStore};
pub use vector::{
    cosine_similarity, decode_vector, encode_vector, RecordMetadata, VectorRecord, VectorStore,
};
