//! 생성 컨텍스트 조립
//!
//! 하나의 쿼리로 챕터/인물/위키 검색을 동시에 수행하고,
//! 선택된 인물의 관계 요약을 붙여 생성 호출자에게 넘길 묶음을 만듭니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let assembler = ContextAssembler::new(retriever);
//! let context = assembler
//!     .assemble(&ContextRequest::new("Aria confronts Vorn").current_chapter("c12"), &project)
//!     .await;
//! println!("{}", context.render_relationships());
//! ```

use serde::Serialize;

use crate::error::DegradeReason;
use crate::graph::{RelationshipGraph, RelationshipSummary};
use crate::knowledge::{
    Chapter, Character, HybridRetriever, Project, RetrievalMode, RetrievalResult, WikiEntry,
};

/// 관계 요약을 붙일 최대 인물 수
const MAX_SUMMARIES: usize = 3;

// ============================================================================
// Request / Output
// ============================================================================

/// 컨텍스트 요청
#[derive(Debug, Clone, Default)]
pub struct ContextRequest {
    pub query: String,
    /// 작성 중인 챕터 (후보에서 제외)
    pub current_chapter_id: Option<String>,
    pub chapter_top_k: Option<usize>,
    pub character_top_k: Option<usize>,
    pub wiki_top_k: Option<usize>,
}

impl ContextRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn current_chapter(mut self, id: impl Into<String>) -> Self {
        self.current_chapter_id = Some(id.into());
        self
    }
}

/// 생성 호출에 넘길 컨텍스트 묶음
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    pub relevant_chapters: Vec<RetrievalResult<Chapter>>,
    pub relevant_characters: Vec<RetrievalResult<Character>>,
    pub relevant_wiki_entries: Vec<RetrievalResult<WikiEntry>>,
    /// 세 검색 중 가장 낮은 단계의 모드
    pub retrieval_mode: RetrievalMode,
    pub degraded: bool,
    pub reasons: Vec<DegradeReason>,
    pub relationship_summaries: Vec<RelationshipSummary>,
}

impl GenerationContext {
    /// 프롬프트용 관계 요약 텍스트
    pub fn render_relationships(&self) -> String {
        self.relationship_summaries
            .iter()
            .map(RelationshipSummary::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.relevant_chapters.is_empty()
            && self.relevant_characters.is_empty()
            && self.relevant_wiki_entries.is_empty()
    }
}

// ============================================================================
// Assembler
// ============================================================================

/// 컨텍스트 조립기
pub struct ContextAssembler {
    retriever: HybridRetriever,
}

impl ContextAssembler {
    pub fn new(retriever: HybridRetriever) -> Self {
        Self { retriever }
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    /// 컨텍스트 조립 (실패하지 않음)
    pub async fn assemble(&self, request: &ContextRequest, project: &Project) -> GenerationContext {
        let config = self.retriever.config();
        let query = request.query.as_str();

        let (chapters, characters, wiki) = tokio::join!(
            self.retriever.retrieve_chapters(
                query,
                &project.chapters,
                request.chapter_top_k.unwrap_or(config.chapter_top_k),
                request.current_chapter_id.as_deref(),
            ),
            self.retriever.retrieve_characters(
                query,
                &project.characters,
                request.character_top_k.unwrap_or(config.character_top_k),
            ),
            self.retriever.retrieve_wiki(
                query,
                &project.wiki_entries,
                request.wiki_top_k.unwrap_or(config.wiki_top_k),
            ),
        );

        let retrieval_mode = [chapters.mode, characters.mode, wiki.mode]
            .into_iter()
            .min_by_key(|mode| mode_rank(*mode))
            .unwrap_or(RetrievalMode::Keyword);

        let mut reasons: Vec<DegradeReason> = Vec::new();
        for reason in [&chapters.reason, &characters.reason, &wiki.reason]
            .into_iter()
            .flatten()
        {
            if !reasons.contains(reason) {
                reasons.push(reason.clone());
            }
        }

        let graph = RelationshipGraph::build(&project.characters, self.retriever.resolver());
        let relationship_summaries: Vec<RelationshipSummary> = characters
            .results
            .iter()
            .take(MAX_SUMMARIES)
            .filter_map(|r| graph.summarize(&r.entity.id, self.retriever.traversal()))
            .collect();

        tracing::debug!(
            "Assembled context: {} chapters, {} characters, {} wiki entries ({:?})",
            chapters.len(),
            characters.len(),
            wiki.len(),
            retrieval_mode
        );

        GenerationContext {
            degraded: chapters.degraded || characters.degraded || wiki.degraded,
            relevant_chapters: chapters.results,
            relevant_characters: characters.results,
            relevant_wiki_entries: wiki.results,
            retrieval_mode,
            reasons,
            relationship_summaries,
        }
    }
}

/// 모드 단계 (낮을수록 품질이 낮음)
fn mode_rank(mode: RetrievalMode) -> u8 {
    match mode {
        RetrievalMode::Disabled => 0,
        RetrievalMode::Fallback => 1,
        RetrievalMode::Keyword => 2,
        RetrievalMode::Vector => 3,
        RetrievalMode::Hybrid => 4,
    }
}

// ============================================================================
// Tests
// ============================================================================
