//! 서사 엔티티 - 챕터, 인물, 설정(위키) 항목
//!
//! 엔티티의 소유권은 이 크레이트 밖의 집필 애플리케이션에 있습니다.
//! 여기서는 색인/검색에 필요한 필드만 읽기 전용으로 다룹니다.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Entity Type
// ============================================================================

/// 엔티티 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Chapter,
    Character,
    Wiki,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Chapter => "chapter",
            EntityType::Character => "character",
            EntityType::Wiki => "wiki",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chapter" => Ok(EntityType::Chapter),
            "character" => Ok(EntityType::Character),
            "wiki" => Ok(EntityType::Wiki),
            other => anyhow::bail!("Unknown entity type: {}", other),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// 챕터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    /// 서사상 순서 (1부터)
    #[serde(default)]
    pub order: u32,
}

/// 인물 간 관계 선언
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRelationship {
    /// 대상 인물 ID (ID가 없으면 이름으로도 해석)
    pub target_id: String,
    /// 자유 텍스트 관계 라벨 ("enemy", "師父" 등)
    pub relation: String,
}

/// 인물
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub role: String,
    pub description: String,
    pub appearance: String,
    pub background: String,
    pub personality: String,
    pub speaking_style: String,
    pub motivation: String,
    pub relationships: Vec<CharacterRelationship>,
    /// 현재 이야기에서 활동 중인 인물
    pub is_active: bool,
}

impl Character {
    /// 폴백 선정 대상 여부 (활동 중이거나 주인공 역할)
    pub fn is_featured(&self) -> bool {
        if self.is_active {
            return true;
        }
        let role = self.role.to_lowercase();
        role.contains("protagonist") || role.contains("主角") || role.contains("주인공")
    }
}

/// 설정(위키) 항목
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
}

/// 색인 대상 엔티티
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Chapter(Chapter),
    Character(Character),
    Wiki(WikiEntry),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::Chapter(c) => &c.id,
            Entity::Character(c) => &c.id,
            Entity::Wiki(w) => &w.id,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Chapter(_) => EntityType::Chapter,
            Entity::Character(_) => EntityType::Character,
            Entity::Wiki(_) => EntityType::Wiki,
        }
    }

    /// 진행 표시용 라벨
    pub fn label(&self) -> String {
        match self {
            Entity::Chapter(c) => format!("Chapter {}: {}", c.order, c.title),
            Entity::Character(c) => c.name.clone(),
            Entity::Wiki(w) => w.name.clone(),
        }
    }
}

// ============================================================================
// Retrievable
// ============================================================================

/// 하이브리드 검색 후보가 될 수 있는 엔티티
pub trait Retrievable: Clone + Send + Sync {
    const ENTITY_TYPE: EntityType;

    fn id(&self) -> &str;

    /// 이름 부분 일치 보너스에 쓰이는 표시 이름
    fn display_name(&self) -> &str;

    /// 키워드 점수 계산 대상 원문
    fn raw_text(&self) -> String;
}

impl Retrievable for Chapter {
    const ENTITY_TYPE: EntityType = EntityType::Chapter;

    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.title
    }

    fn raw_text(&self) -> String {
        format!("{}\n{}\n{}", self.title, self.summary, self.content)
    }
}

impl Retrievable for Character {
    const ENTITY_TYPE: EntityType = EntityType::Character;

    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn raw_text(&self) -> String {
        let fields: [&str; 8] = [
            &self.name,
            &self.role,
            &self.description,
            &self.appearance,
            &self.background,
            &self.personality,
            &self.speaking_style,
            &self.motivation,
        ];

        fields
            .iter()
            .filter(|s| !s.trim().is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Retrievable for WikiEntry {
    const ENTITY_TYPE: EntityType = EntityType::Wiki;

    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn raw_text(&self) -> String {
        format!("{}\n{}\n{}", self.name, self.category, self.description)
    }
}

// ============================================================================
// Project (Entity Provider)
// ============================================================================

/// 프로젝트 - 엔티티 컬렉션 묶음
///
/// CLI에서는 JSON 파일로 읽어 엔티티 제공자 역할을 합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub chapters: Vec<Chapter>,
    pub characters: Vec<Character>,
    pub wiki_entries: Vec<WikiEntry>,
}

impl Project {
    /// JSON 파일에서 프로젝트 로드
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project file: {:?}", path))?;
        let project: Project = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse project file: {:?}", path))?;
        project
            .validate()
            .with_context(|| format!("Invalid project file: {:?}", path))?;

        tracing::debug!(
            "Loaded project {:?}: {} chapters, {} characters, {} wiki entries",
            path,
            project.chapters.len(),
            project.characters.len(),
            project.wiki_entries.len()
        );
        Ok(project)
    }

    /// 모든 엔티티를 색인 순서(챕터 → 인물 → 위키)로 나열
    pub fn entities(&self) -> Vec<Entity> {
        let mut chapters = self.chapters.clone();
        chapters.sort_by_key(|c| c.order);

        chapters
            .into_iter()
            .map(Entity::Chapter)
            .chain(self.characters.iter().cloned().map(Entity::Character))
            .chain(self.wiki_entries.iter().cloned().map(Entity::Wiki))
            .collect()
    }

    /// 엔티티 ID 검사
    ///
    /// 벡터 레코드와 해시 캐시는 (타입, ID)로 구분하므로 같은 타입 안에서
    /// ID가 겹치면 안 됩니다. 타입이 다르면 같은 ID를 써도 됩니다.
    pub fn validate(&self) -> Result<()> {
        check_unique_ids(EntityType::Chapter, self.chapters.iter().map(|c| c.id.as_str()))?;
        check_unique_ids(
            EntityType::Character,
            self.characters.iter().map(|c| c.id.as_str()),
        )?;
        check_unique_ids(EntityType::Wiki, self.wiki_entries.iter().map(|w| w.id.as_str()))
    }
}

fn check_unique_ids<'a>(
    entity_type: EntityType,
    ids: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            anyhow::bail!("Empty {} id", entity_type);
        }
        if !seen.insert(id) {
            anyhow::bail!("Duplicate {} id: {}", entity_type, id);
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
