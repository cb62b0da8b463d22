//! 하이브리드 검색 - 벡터 유사도 + 키워드 겹침 통합
//!
//! 후보 엔티티마다 복합 점수를 계산합니다.
//!
//! ```text
//! composite = 0.6 × vector + 0.4 × keyword   (벡터 사용 가능 시)
//! composite = keyword                        (키워드 전용)
//! ```
//!
//! 그 위에 종류별 보너스(챕터 최신성, 위키 카테고리, 인물 관계 그래프)를 더하고,
//! 하한 필터 → Jaccard 중복 제거 → 상위 K 순으로 고릅니다.
//!
//! 검색은 에러를 반환하지 않습니다. 임베딩이 없으면 키워드 전용으로,
//! 저장소가 실패하면 결정적 폴백으로 내려가고 그 사실을
//! `Retrieval::degraded` / `reason`에 기록합니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use super::entity::{Chapter, Character, Retrievable, WikiEntry};
use super::keywords::{extract_keywords, jaccard, keyword_set};
use super::vector::{cosine_similarity, VectorStore};
use crate::config::RetrievalConfig;
use crate::embedding::{EmbedTask, EmbeddingAdapter, EmbeddingCache};
use crate::error::DegradeReason;
use crate::graph::{RelationWeightResolver, RelationshipGraph, TraversalConfig};

/// 쿼리 변형 중 키워드 요약에 쓰는 키워드 수
const SHORT_FORM_KEYWORDS: usize = 5;
/// 이보다 긴 쿼리는 앞 절반을 추가 변형으로 사용
const LONG_QUERY_CHARS: usize = 100;
/// 그래프 보너스의 기준이 되는 상위 인물 수
const GRAPH_SEEDS: usize = 3;

/// 위키 카테고리 → 쿼리 트리거 단어
const CATEGORY_TRIGGERS: &[(&[&str], &[&str])] = &[
    (
        &["location", "place", "region", "city", "地点", "地理", "장소"],
        &["where", "city", "town", "travel", "journey", "arrive", "road", "border", "城", "山", "地方"],
    ),
    (
        &["item", "artifact", "weapon", "treasure", "物品", "法宝", "아이템"],
        &["sword", "blade", "weapon", "item", "artifact", "relic", "wield", "treasure", "剑", "宝"],
    ),
    (
        &["organization", "faction", "sect", "clan", "guild", "组织", "门派", "세력"],
        &["clan", "guild", "sect", "order", "faction", "army", "alliance", "门派", "宗", "帮"],
    ),
    (
        &["magic", "power", "ability", "skill", "功法", "能力", "마법"],
        &["spell", "magic", "power", "technique", "cultivat", "curse", "功", "法", "术"],
    ),
    (
        &["history", "event", "lore", "历史", "事件", "역사"],
        &["war", "ancient", "history", "legend", "past", "battle", "fall", "历史", "战"],
    ),
    (
        &["race", "species", "creature", "beast", "种族", "종족"],
        &["dragon", "beast", "creature", "race", "monster", "spirit", "龙", "兽", "妖"],
    ),
];

// ============================================================================
// Types
// ============================================================================

/// 결과가 선택된 근거
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Vector,
    Keyword,
    Hybrid,
    /// 관계 그래프 보너스로 포함된 인물
    Graph,
    /// 최신순/기본 선택으로 채워 넣은 항목
    Fallback,
}

/// 검색 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Vector,
    Keyword,
    Hybrid,
    /// 저장소 실패로 결정적 폴백 사용
    Fallback,
    Disabled,
}

/// 검색 결과 한 건
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult<T> {
    pub entity: T,
    pub relevance_score: f32,
    pub match_type: MatchType,
}

/// 검색 결과 묶음
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retrieval<T> {
    pub results: Vec<RetrievalResult<T>>,
    pub mode: RetrievalMode,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DegradeReason>,
}

impl<T> Retrieval<T> {
    fn new(results: Vec<RetrievalResult<T>>, mode: RetrievalMode, reason: Option<DegradeReason>) -> Self {
        Self {
            results,
            mode,
            degraded: reason.is_some(),
            reason,
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &T> {
        self.results.iter().map(|r| &r.entity)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl<T: Retrievable> Retrieval<T> {
    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.entity.id()).collect()
    }
}

/// 쿼리 쪽 신호 (변형 벡터, 후보 벡터, 키워드)
struct QuerySignals {
    keywords: Vec<String>,
    query_lower: String,
    query_vectors: Vec<Vec<f32>>,
    /// related_id → 레코드 벡터들
    candidate_vectors: HashMap<String, Vec<Vec<f32>>>,
    reason: Option<DegradeReason>,
}

impl QuerySignals {
    fn vectors_used(&self) -> bool {
        !self.query_vectors.is_empty() && !self.candidate_vectors.is_empty()
    }

    fn vector_score(&self, related_id: &str) -> f32 {
        let Some(records) = self.candidate_vectors.get(related_id) else {
            return 0.0;
        };

        self.query_vectors
            .iter()
            .flat_map(|q| records.iter().map(move |r| cosine_similarity(q, r)))
            .fold(0.0_f32, f32::max)
    }
}

/// 점수 계산 중인 후보
struct Candidate<'a, T> {
    entity: &'a T,
    vector: f32,
    keyword: f32,
    graph: f32,
    score: f32,
}

impl<T: Clone> Candidate<'_, T> {
    fn into_result(self, vectors_used: bool) -> RetrievalResult<T> {
        let match_type = if self.graph > 0.0 && self.keyword <= 0.0 {
            MatchType::Graph
        } else if vectors_used && self.vector > 0.0 && self.keyword > 0.0 {
            MatchType::Hybrid
        } else if vectors_used && self.vector > 0.0 {
            MatchType::Vector
        } else {
            MatchType::Keyword
        };

        RetrievalResult {
            entity: self.entity.clone(),
            relevance_score: self.score,
            match_type,
        }
    }
}

fn fallback_result<T: Clone>(entity: &T) -> RetrievalResult<T> {
    RetrievalResult {
        entity: entity.clone(),
        relevance_score: 0.0,
        match_type: MatchType::Fallback,
    }
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
///
/// 저장소, 임베딩 어댑터, 쿼리 캐시를 주입받아 종류별 검색을 수행합니다.
pub struct HybridRetriever {
    store: Arc<dyn VectorStore>,
    adapter: EmbeddingAdapter,
    cache: Arc<EmbeddingCache>,
    config: RetrievalConfig,
    resolver: RelationWeightResolver,
    traversal: TraversalConfig,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        adapter: EmbeddingAdapter,
        cache: Arc<EmbeddingCache>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            adapter,
            cache,
            config,
            resolver: RelationWeightResolver::default(),
            traversal: TraversalConfig::default(),
        }
    }

    /// 관계 그래프 설정 지정
    pub fn with_graph(mut self, resolver: RelationWeightResolver, traversal: TraversalConfig) -> Self {
        self.resolver = resolver;
        self.traversal = traversal;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn resolver(&self) -> &RelationWeightResolver {
        &self.resolver
    }

    pub fn traversal(&self) -> &TraversalConfig {
        &self.traversal
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    /// 쿼리 신호 준비
    ///
    /// 저장소 읽기 실패만 `Err`로 돌려 결정적 폴백을 유도합니다.
    async fn signals<T: Retrievable>(&self, query: &str) -> Result<QuerySignals, DegradeReason> {
        let entity_type = T::ENTITY_TYPE;
        let mut signals = QuerySignals {
            keywords: extract_keywords(query),
            query_lower: query.to_lowercase(),
            query_vectors: Vec::new(),
            candidate_vectors: HashMap::new(),
            reason: None,
        };

        if query.trim().is_empty() {
            signals.reason = Some(DegradeReason::EmptyQuery);
            return Ok(signals);
        }

        let Some(tag) = self.adapter.tag() else {
            signals.reason = Some(DegradeReason::ProviderUnavailable);
            return Ok(signals);
        };

        for variant in query_variants(query) {
            let vector = self
                .cache
                .get_or_compute(&variant, EmbedTask::Query, &self.adapter)
                .await;
            if !vector.is_empty() {
                signals.query_vectors.push(vector);
            }
        }
        if signals.query_vectors.is_empty() {
            signals.reason = Some(DegradeReason::ProviderUnavailable);
            return Ok(signals);
        }

        let records = self
            .store
            .get_all_vectors()
            .await
            .map_err(|e| DegradeReason::StoreFailure(format!("{:#}", e)))?;

        for record in records {
            if record.entity_type != entity_type || !record.is_from(&tag.provider, &tag.model) {
                continue;
            }
            signals
                .candidate_vectors
                .entry(record.related_id)
                .or_default()
                .push(record.vector);
        }

        if signals.candidate_vectors.is_empty() {
            tracing::debug!("No stored {} vectors from {}, keyword-only", entity_type, tag);
            signals.query_vectors.clear();
            signals.reason = Some(DegradeReason::NoStoredVectors);
        }

        Ok(signals)
    }

    fn mode(&self, signals: &QuerySignals) -> (RetrievalMode, Option<DegradeReason>) {
        if signals.vectors_used() {
            let mode = if self.config.keyword_weight > 0.0 {
                RetrievalMode::Hybrid
            } else {
                RetrievalMode::Vector
            };
            (mode, None)
        } else {
            let reason = signals
                .reason
                .clone()
                .unwrap_or(DegradeReason::ProviderUnavailable);
            (RetrievalMode::Keyword, Some(reason))
        }
    }

    // ------------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------------

    /// 키워드 점수 = 쿼리 키워드 포함 비율 + 이름 부분 일치 보너스
    fn keyword_score<T: Retrievable>(&self, signals: &QuerySignals, entity: &T) -> f32 {
        let text = entity.raw_text().to_lowercase();

        let mut score = if signals.keywords.is_empty() {
            0.0
        } else {
            let hits = signals
                .keywords
                .iter()
                .filter(|k| text.contains(k.as_str()))
                .count();
            hits as f32 / signals.keywords.len() as f32
        };

        let name = entity.display_name().trim().to_lowercase();
        if !name.is_empty() && signals.query_lower.contains(&name) {
            score += self.config.name_bonus;
        }
        score
    }

    fn score<'a, T: Retrievable>(&self, signals: &QuerySignals, pool: &'a [T]) -> Vec<Candidate<'a, T>> {
        let vectors_used = signals.vectors_used();

        pool.iter()
            .map(|entity| {
                let keyword = self.keyword_score(signals, entity);
                let vector = if vectors_used {
                    signals.vector_score(entity.id()).max(0.0)
                } else {
                    0.0
                };
                let score = if vectors_used {
                    self.config.vector_weight * vector + self.config.keyword_weight * keyword
                } else {
                    keyword
                };

                Candidate {
                    entity,
                    vector,
                    keyword,
                    graph: 0.0,
                    score,
                }
            })
            .collect()
    }

    /// 정렬 → 하한 필터 → 중복 제거 → 상위 K
    ///
    /// `exhaustive`이면 풀 전체를 정렬만 해서 반환합니다.
    /// 두 번째 반환값은 중복으로 제외된 ID입니다.
    fn select<'a, T: Retrievable>(
        &self,
        mut candidates: Vec<Candidate<'a, T>>,
        top_k: usize,
        keyword_floor: f32,
        exhaustive: bool,
    ) -> (Vec<Candidate<'a, T>>, HashSet<String>) {
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        if exhaustive {
            return (candidates, HashSet::new());
        }

        let floor = self.config.similarity_floor;
        let mut kept: Vec<(Candidate<'a, T>, HashSet<String>)> = Vec::new();
        let mut dropped = HashSet::new();

        for candidate in candidates {
            let passes = candidate.score >= floor
                || candidate.keyword > keyword_floor
                || candidate.graph > 0.0;
            if !passes {
                continue;
            }

            let set = keyword_set(&candidate.entity.raw_text());
            let duplicate = kept
                .iter()
                .any(|(_, other)| jaccard(&set, other) > self.config.dedup_threshold);
            if duplicate {
                dropped.insert(candidate.entity.id().to_string());
                continue;
            }
            kept.push((candidate, set));
        }

        let selected = kept.into_iter().take(top_k).map(|(c, _)| c).collect();
        (selected, dropped)
    }

    // ------------------------------------------------------------------------
    // Chapters
    // ------------------------------------------------------------------------

    /// 챕터 검색
    ///
    /// 현재 챕터는 후보에서 제외됩니다. 결과는 서사 순서로 정렬되며,
    /// K개에 못 미치면 최신 챕터로 채웁니다.
    pub async fn retrieve_chapters(
        &self,
        query: &str,
        pool: &[Chapter],
        top_k: usize,
        current_chapter_id: Option<&str>,
    ) -> Retrieval<Chapter> {
        let candidates: Vec<Chapter> = pool
            .iter()
            .filter(|c| Some(c.id.as_str()) != current_chapter_id)
            .cloned()
            .collect();

        if !self.config.enabled {
            return Retrieval::new(
                recent_chapters(&candidates, top_k),
                RetrievalMode::Disabled,
                Some(DegradeReason::Disabled),
            );
        }

        let signals = match self.signals::<Chapter>(query).await {
            Ok(signals) => signals,
            Err(reason) => {
                tracing::warn!("Chapter retrieval falling back to recency: {}", reason);
                return Retrieval::new(
                    recent_chapters(&candidates, top_k),
                    RetrievalMode::Fallback,
                    Some(reason),
                );
            }
        };

        let mut scored = self.score(&signals, &candidates);

        // 최신성 가중치: 1 + w × order / max_order
        let max_order = candidates.iter().map(|c| c.order).max().unwrap_or(0);
        if max_order > 0 {
            for c in &mut scored {
                c.score *= 1.0 + self.config.recency_weight * c.entity.order as f32 / max_order as f32;
            }
        }

        let exhaustive = candidates.len() <= top_k;
        let (selected, dropped) =
            self.select(scored, top_k, self.config.chapter_keyword_floor, exhaustive);

        let vectors_used = signals.vectors_used();
        let mut results: Vec<RetrievalResult<Chapter>> = selected
            .into_iter()
            .map(|c| c.into_result(vectors_used))
            .collect();

        if results.len() < top_k {
            let taken: HashSet<String> = results.iter().map(|r| r.entity.id.clone()).collect();
            let mut latest: Vec<&Chapter> = candidates.iter().collect();
            latest.sort_by(|a, b| b.order.cmp(&a.order));

            let padding = latest
                .into_iter()
                .filter(|c| !taken.contains(&c.id) && !dropped.contains(&c.id))
                .take(top_k - results.len())
                .map(fallback_result)
                .collect::<Vec<_>>();
            results.extend(padding);
        }

        results.sort_by_key(|r| r.entity.order);

        let (mode, reason) = self.mode(&signals);
        Retrieval::new(results, mode, reason)
    }

    // ------------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------------

    /// 인물 검색
    ///
    /// 상위 인물과 직접 연결된 인물은 `graph_bonus × path_weight`를 더 받습니다.
    pub async fn retrieve_characters(
        &self,
        query: &str,
        pool: &[Character],
        top_k: usize,
    ) -> Retrieval<Character> {
        if !self.config.enabled {
            return Retrieval::new(
                featured_characters(pool, top_k),
                RetrievalMode::Disabled,
                Some(DegradeReason::Disabled),
            );
        }

        let signals = match self.signals::<Character>(query).await {
            Ok(signals) => signals,
            Err(reason) => {
                tracing::warn!("Character retrieval falling back to featured: {}", reason);
                return Retrieval::new(
                    featured_characters(pool, top_k),
                    RetrievalMode::Fallback,
                    Some(reason),
                );
            }
        };

        let mut scored = self.score(&signals, pool);
        self.apply_graph_bonus(pool, &mut scored);

        let exhaustive = pool.len() <= top_k;
        let (selected, _) = self.select(scored, top_k, self.config.keyword_floor, exhaustive);

        let vectors_used = signals.vectors_used();
        let results = selected
            .into_iter()
            .map(|c| c.into_result(vectors_used))
            .collect();

        let (mode, reason) = self.mode(&signals);
        Retrieval::new(results, mode, reason)
    }

    fn apply_graph_bonus(&self, pool: &[Character], scored: &mut [Candidate<'_, Character>]) {
        let mut ranked: Vec<(&str, f32)> = scored
            .iter()
            .filter(|c| c.score > 0.0)
            .map(|c| (c.entity.id.as_str(), c.score))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let seeds: Vec<String> = ranked
            .into_iter()
            .take(GRAPH_SEEDS)
            .map(|(id, _)| id.to_string())
            .collect();

        if seeds.is_empty() {
            return;
        }

        let graph = RelationshipGraph::build(pool, &self.resolver);
        let config = TraversalConfig {
            max_depth: 1,
            include_seeds: false,
            ..self.traversal.clone()
        };

        let neighbours: HashMap<String, f32> = graph
            .traverse(&seeds, &config)
            .into_iter()
            .map(|r| (r.character.id, r.path_weight))
            .collect();

        for candidate in scored.iter_mut() {
            if let Some(path_weight) = neighbours.get(&candidate.entity.id) {
                candidate.graph = self.config.graph_bonus * path_weight;
                candidate.score += candidate.graph;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Wiki
    // ------------------------------------------------------------------------

    /// 위키 검색
    ///
    /// 항목 카테고리에 해당하는 트리거 단어가 쿼리에 있으면 `category_bonus`를 더합니다.
    pub async fn retrieve_wiki(
        &self,
        query: &str,
        pool: &[WikiEntry],
        top_k: usize,
    ) -> Retrieval<WikiEntry> {
        if !self.config.enabled {
            return Retrieval::new(
                first_wiki_entries(pool, top_k),
                RetrievalMode::Disabled,
                Some(DegradeReason::Disabled),
            );
        }

        let signals = match self.signals::<WikiEntry>(query).await {
            Ok(signals) => signals,
            Err(reason) => {
                tracing::warn!("Wiki retrieval falling back to first entries: {}", reason);
                return Retrieval::new(
                    first_wiki_entries(pool, top_k),
                    RetrievalMode::Fallback,
                    Some(reason),
                );
            }
        };

        let mut scored = self.score(&signals, pool);
        for candidate in &mut scored {
            let lists = category_trigger_hits(&candidate.entity.category, &signals.query_lower);
            candidate.score += self.config.category_bonus * lists as f32;
        }

        let exhaustive = pool.len() <= top_k;
        let (selected, _) = self.select(scored, top_k, self.config.keyword_floor, exhaustive);

        let vectors_used = signals.vectors_used();
        let results = selected
            .into_iter()
            .map(|c| c.into_result(vectors_used))
            .collect();

        let (mode, reason) = self.mode(&signals);
        Retrieval::new(results, mode, reason)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 쿼리 변형: 원문, 상위 키워드 요약, (긴 쿼리면) 앞 절반
pub fn query_variants(query: &str) -> Vec<String> {
    let query = query.trim();
    if query.is_empty() {
        return vec![];
    }

    let mut variants = vec![query.to_string()];

    let short = extract_keywords(query)
        .into_iter()
        .take(SHORT_FORM_KEYWORDS)
        .collect::<Vec<_>>()
        .join(" ");
    if !short.is_empty() && short != query.to_lowercase() {
        variants.push(short);
    }

    let len = query.chars().count();
    if len > LONG_QUERY_CHARS {
        variants.push(query.chars().take(len / 2).collect());
    }

    variants
}

/// 카테고리에 해당하는 트리거 목록 중 쿼리에 걸린 목록 수
fn category_trigger_hits(category: &str, query_lower: &str) -> usize {
    let category = category.to_lowercase();
    if category.trim().is_empty() {
        return 0;
    }

    CATEGORY_TRIGGERS
        .iter()
        .filter(|(categories, _)| categories.iter().any(|c| category.contains(c)))
        .filter(|(_, triggers)| triggers.iter().any(|t| query_lower.contains(t)))
        .count()
}

/// 최신 챕터 K개 (서사 순서로 반환)
fn recent_chapters(pool: &[Chapter], top_k: usize) -> Vec<RetrievalResult<Chapter>> {
    let mut latest: Vec<&Chapter> = pool.iter().collect();
    latest.sort_by(|a, b| b.order.cmp(&a.order));
    latest.truncate(top_k);
    latest.sort_by_key(|c| c.order);
    latest.into_iter().map(fallback_result).collect()
}

/// 활동 중이거나 주인공인 인물 K개
fn featured_characters(pool: &[Character], top_k: usize) -> Vec<RetrievalResult<Character>> {
    pool.iter()
        .filter(|c| c.is_featured())
        .take(top_k)
        .map(fallback_result)
        .collect()
}

/// 앞쪽 위키 항목 K개
fn first_wiki_entries(pool: &[WikiEntry], top_k: usize) -> Vec<RetrievalResult<WikiEntry>> {
    pool.iter().take(top_k).map(fallback_result).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::embedding::testing::BagOfWordsEmbedding;
    use crate::knowledge::entity::{CharacterRelationship, Entity};
    use crate::knowledge::indexer::{ContentHashCache, IndexOptions, Indexer};
    use crate::knowledge::store::SqliteVectorStore;
    use crate::knowledge::testing::FailingStore;
    use tempfile::TempDir;

    fn chapter(id: &str, order: u32, title: &str, content: &str) -> Chapter {
        Chapter {
            id: id.to_string(),
            title: title.to_string(),
            summary: String::new(),
            content: content.to_string(),
            order,
        }
    }

    fn five_chapters() -> Vec<Chapter> {
        vec![
            chapter("1", 1, "Arrival", "A quiet village wakes to morning rain."),
            chapter(
                "2",
                2,
                "Northern Pass",
                "The dragon clan suffered destruction at the northern pass.",
            ),
            chapter("3", 3, "Market Day", "Merchants argue over the price of salt."),
            chapter(
                "4",
                4,
                "Harbor Memory",
                "Survivors at the harbor still whisper how the dragon clan met destruction by fire.",
            ),
            chapter("5", 5, "Letters", "A letter arrives from the capital."),
        ]
    }

    fn keyword_only() -> HybridRetriever {
        HybridRetriever::new(
            Arc::new(FailingStore),
            EmbeddingAdapter::unavailable("none"),
            Arc::new(EmbeddingCache::default()),
            RetrievalConfig::default(),
        )
    }

    fn character(id: &str, name: &str, description: &str) -> Character {
        Character {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_query_variants() {
        assert!(query_variants("  ").is_empty());

        let variants = query_variants("The dragon clan's ruin");
        assert_eq!(variants, vec!["The dragon clan's ruin", "dragon clan ruin"]);

        let long = "word ".repeat(30);
        let variants = query_variants(&long);
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[2].chars().count(), long.trim().chars().count() / 2);
    }

    #[tokio::test]
    async fn test_keyword_fallback_scenario() {
        let retriever = keyword_only();
        let pool = five_chapters();

        let retrieval = retriever
            .retrieve_chapters("dragon clan's destruction", &pool, 2, None)
            .await;

        assert_eq!(retrieval.ids(), vec!["2", "4"]);
        assert_eq!(retrieval.mode, RetrievalMode::Keyword);
        assert!(retrieval.degraded);
        assert_eq!(retrieval.reason, Some(DegradeReason::ProviderUnavailable));
        assert!(retrieval
            .results
            .iter()
            .all(|r| r.match_type == MatchType::Keyword));
    }

    #[tokio::test]
    async fn test_keyword_fallback_padded_with_recency() {
        let retriever = keyword_only();
        let pool = five_chapters();

        let retrieval = retriever
            .retrieve_chapters("dragon clan's destruction", &pool, 3, None)
            .await;

        assert_eq!(retrieval.ids(), vec!["2", "4", "5"]);
        assert_eq!(retrieval.results[2].match_type, MatchType::Fallback);
    }

    #[tokio::test]
    async fn test_recency_weight_orders_by_score() {
        let retriever = keyword_only();
        let pool = five_chapters();
        let retrieval = retriever
            .retrieve_chapters("dragon clan's destruction", &pool, 2, None)
            .await;

        // 같은 키워드 점수라면 뒤 챕터가 더 높음
        let score = |id: &str| {
            retrieval
                .results
                .iter()
                .find(|r| r.entity.id == id)
                .map(|r| r.relevance_score)
                .unwrap()
        };
        assert!((score("2") - 1.04).abs() < 1e-4);
        assert!((score("4") - 1.08).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_current_chapter_excluded() {
        let retriever = keyword_only();
        let pool = five_chapters();

        let retrieval = retriever
            .retrieve_chapters("dragon clan's destruction", &pool, 3, Some("4"))
            .await;
        assert_eq!(retrieval.ids(), vec!["2", "3", "5"]);
    }

    #[tokio::test]
    async fn test_pool_smaller_than_k_returns_pool() {
        let retriever = keyword_only();
        let pool = vec![
            character("a", "Aria", "A swordswoman."),
            character("b", "Bren", "A merchant."),
        ];

        let retrieval = retriever.retrieve_characters("weather", &pool, 5).await;
        assert_eq!(retrieval.len(), 2);
    }

    #[tokio::test]
    async fn test_dedup_drops_near_duplicates() {
        let retriever = keyword_only();
        let text = "The dragon clan fell when the mountain fortress burned at dawn.";
        let pool = vec![
            chapter("1", 1, "Fall", text),
            chapter("2", 2, "Fall", text),
            chapter("3", 3, "Quiet", "Nothing happens."),
            chapter("4", 4, "Calm", "Tea is served."),
        ];

        let retrieval = retriever
            .retrieve_chapters("dragon clan fortress", &pool, 2, None)
            .await;

        let matched: Vec<&str> = retrieval
            .results
            .iter()
            .filter(|r| r.match_type != MatchType::Fallback)
            .map(|r| r.entity.id.as_str())
            .collect();
        assert_eq!(matched, vec!["2"]);
        // 중복으로 빠진 챕터는 채우기에도 쓰이지 않음
        assert!(!retrieval.ids().contains(&"1"));
    }

    #[tokio::test]
    async fn test_store_failure_falls_back() {
        let retriever = HybridRetriever::new(
            Arc::new(FailingStore),
            EmbeddingAdapter::new(Arc::new(BagOfWordsEmbedding::new())),
            Arc::new(EmbeddingCache::default()),
            RetrievalConfig::default(),
        );
        let pool = five_chapters();

        let retrieval = retriever
            .retrieve_chapters("dragon clan", &pool, 3, Some("5"))
            .await;

        assert_eq!(retrieval.ids(), vec!["2", "3", "4"]);
        assert_eq!(retrieval.mode, RetrievalMode::Fallback);
        assert!(matches!(
            retrieval.reason,
            Some(DegradeReason::StoreFailure(_))
        ));

        let mut featured = character("a", "Aria", "");
        featured.is_active = true;
        let characters = vec![character("b", "Bren", ""), featured];
        let retrieval = retriever.retrieve_characters("Aria", &characters, 5).await;
        assert_eq!(retrieval.ids(), vec!["a"]);

        let wiki: Vec<WikiEntry> = (0..4)
            .map(|i| WikiEntry {
                id: format!("w{}", i),
                name: format!("Entry {}", i),
                ..Default::default()
            })
            .collect();
        let retrieval = retriever.retrieve_wiki("anything", &wiki, 2).await;
        assert_eq!(retrieval.ids(), vec!["w0", "w1"]);
    }

    #[tokio::test]
    async fn test_disabled_returns_defaults() {
        let retriever = HybridRetriever::new(
            Arc::new(FailingStore),
            EmbeddingAdapter::unavailable("none"),
            Arc::new(EmbeddingCache::default()),
            RetrievalConfig {
                enabled: false,
                ..Default::default()
            },
        );

        let retrieval = retriever
            .retrieve_chapters("dragon", &five_chapters(), 2, None)
            .await;
        assert_eq!(retrieval.ids(), vec!["4", "5"]);
        assert_eq!(retrieval.mode, RetrievalMode::Disabled);
        assert_eq!(retrieval.reason, Some(DegradeReason::Disabled));
    }

    #[tokio::test]
    async fn test_hybrid_mode_with_indexed_vectors() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::open(&dir.path().join("t.db")).unwrap());
        let provider = Arc::new(BagOfWordsEmbedding::new());
        let adapter = EmbeddingAdapter::new(provider.clone());
        let cache = Arc::new(EmbeddingCache::default());

        let indexer = Indexer::new(
            store.clone(),
            adapter.clone(),
            cache.clone(),
            Arc::new(ContentHashCache::new()),
            &IndexConfig::default(),
        );
        let pool = five_chapters();
        let entities: Vec<Entity> = pool.iter().cloned().map(Entity::Chapter).collect();
        indexer
            .index_batch(&entities, &IndexOptions::default(), |_| {})
            .await;
        assert_eq!(provider.query_calls(), 0);

        let retriever = HybridRetriever::new(store, adapter, cache, RetrievalConfig::default());
        let retrieval = retriever
            .retrieve_chapters("dragon clan destruction", &pool, 2, None)
            .await;

        assert_eq!(retrieval.mode, RetrievalMode::Hybrid);
        assert!(!retrieval.degraded);
        assert_eq!(retrieval.ids(), vec!["2", "4"]);
        assert!(retrieval
            .results
            .iter()
            .all(|r| r.match_type == MatchType::Hybrid));

        // 쿼리는 쿼리 용도로 임베딩
        assert!(provider.query_calls() > 0);
    }

    #[tokio::test]
    async fn test_blank_query_reports_empty_query() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(BagOfWordsEmbedding::new());
        let retriever = HybridRetriever::new(
            Arc::new(SqliteVectorStore::open(&dir.path().join("t.db")).unwrap()),
            EmbeddingAdapter::new(provider.clone()),
            Arc::new(EmbeddingCache::default()),
            RetrievalConfig::default(),
        );

        let retrieval = retriever
            .retrieve_chapters("   ", &five_chapters(), 2, None)
            .await;

        assert_eq!(retrieval.mode, RetrievalMode::Keyword);
        assert!(retrieval.degraded);
        assert_eq!(retrieval.reason, Some(DegradeReason::EmptyQuery));
        assert_eq!(retrieval.ids(), vec!["4", "5"]);
        assert!(retrieval
            .results
            .iter()
            .all(|r| r.match_type == MatchType::Fallback));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_stored_vectors_is_keyword_mode() {
        let dir = TempDir::new().unwrap();
        let retriever = HybridRetriever::new(
            Arc::new(SqliteVectorStore::open(&dir.path().join("t.db")).unwrap()),
            EmbeddingAdapter::new(Arc::new(BagOfWordsEmbedding::new())),
            Arc::new(EmbeddingCache::default()),
            RetrievalConfig::default(),
        );

        let retrieval = retriever
            .retrieve_chapters("dragon clan's destruction", &five_chapters(), 2, None)
            .await;
        assert_eq!(retrieval.mode, RetrievalMode::Keyword);
        assert_eq!(retrieval.reason, Some(DegradeReason::NoStoredVectors));
        assert_eq!(retrieval.ids(), vec!["2", "4"]);
    }

    #[tokio::test]
    async fn test_graph_bonus_surfaces_nemesis() {
        let retriever = keyword_only();

        let mut aria = character("a", "Aria", "A swordswoman seeking her lost brother.");
        aria.relationships.push(CharacterRelationship {
            target_id: "v".to_string(),
            relation: "nemesis".to_string(),
        });
        let pool = vec![
            aria,
            character("v", "Vorn", "A warlord in black iron."),
            character("m", "Mira", "A baker."),
            character("t", "Tam", "A fisherman."),
            character("k", "Kell", "A scribe."),
            character("o", "Odo", "A farmer."),
        ];

        let retrieval = retriever
            .retrieve_characters("Aria draws her sword", &pool, 3)
            .await;

        assert_eq!(retrieval.ids(), vec!["a", "v"]);
        assert_eq!(retrieval.results[1].match_type, MatchType::Graph);
        // nemesis 1.0 × decay 0.6 × bonus 0.2
        assert!((retrieval.results[1].relevance_score - 0.12).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_wiki_category_bonus() {
        let retriever = keyword_only();
        let pool = vec![
            WikiEntry {
                id: "w1".to_string(),
                name: "Skyreach".to_string(),
                category: "Location".to_string(),
                description: "A floating city above the clouds.".to_string(),
            },
            WikiEntry {
                id: "w2".to_string(),
                name: "Sunblade".to_string(),
                category: "Artifact".to_string(),
                description: "A sword forged in a floating city.".to_string(),
            },
            WikiEntry {
                id: "w3".to_string(),
                name: "Tidecall".to_string(),
                category: "Magic".to_string(),
                description: "Summons waves.".to_string(),
            },
        ];

        let retrieval = retriever.retrieve_wiki("the floating city", &pool, 2).await;
        assert_eq!(retrieval.ids(), vec!["w1", "w2"]);
        assert!(retrieval.results[0].relevance_score > retrieval.results[1].relevance_score);
    }

    #[test]
    fn test_category_trigger_hits() {
        assert_eq!(category_trigger_hits("Location", "travel to the city"), 1);
        assert_eq!(category_trigger_hits("Location", "a quiet talk"), 0);
        assert_eq!(category_trigger_hits("", "city"), 0);
        assert_eq!(category_trigger_hits("门派", "他加入了宗门"), 1);
    }

    #[test]
    fn test_retrieval_serializes() {
        let retrieval: Retrieval<WikiEntry> = Retrieval::new(
            vec![],
            RetrievalMode::Keyword,
            Some(DegradeReason::ProviderUnavailable),
        );
        let json = serde_json::to_value(&retrieval).unwrap();
        assert_eq!(json["mode"], "keyword");
        assert_eq!(json["degraded"], true);
        assert_eq!(json["reason"]["kind"], "provider_unavailable");
    }
}
