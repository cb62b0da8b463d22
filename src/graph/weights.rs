//! 관계 라벨 → 관계 강도 변환
//!
//! 순서가 있는 규칙 테이블로 동작합니다.
//! 1. 어휘 테이블 정확 일치
//! 2. 같은 테이블에서 부분 일치 (테이블 순서)
//! 3. 어근 휴리스틱
//! 4. 기본값 0.5
//!
//! 어휘를 늘려도 제어 흐름은 바뀌지 않습니다.

/// 규칙에 걸리지 않는 라벨의 가중치
pub const DEFAULT_WEIGHT: f32 = 0.5;

/// 어휘 항목 (라벨 → 가중치)
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyEntry {
    pub label: String,
    pub weight: f32,
}

/// 어근 규칙 (어근 중 하나라도 포함하면 가중치 적용)
#[derive(Debug, Clone, PartialEq)]
pub struct RootRule {
    pub roots: Vec<String>,
    pub weight: f32,
}

/// 기본 어휘. 부분 일치가 테이블 순서를 따르므로 강한 관계를 앞에 둡니다.
const VOCABULARY: &[(&str, f32)] = &[
    // 적대
    ("enemy", 1.0),
    ("archenemy", 1.0),
    ("nemesis", 1.0),
    ("foe", 1.0),
    ("rival", 0.9),
    ("敌人", 1.0),
    ("死敌", 1.0),
    ("仇人", 1.0),
    ("宿敌", 1.0),
    ("对手", 0.9),
    // 연애
    ("lover", 0.9),
    ("spouse", 0.9),
    ("husband", 0.9),
    ("wife", 0.9),
    ("girlfriend", 0.9),
    ("boyfriend", 0.9),
    ("fiance", 0.9),
    ("fiancee", 0.9),
    ("恋人", 0.9),
    ("爱人", 0.9),
    ("夫妻", 0.9),
    ("丈夫", 0.9),
    ("妻子", 0.9),
    ("未婚妻", 0.9),
    ("未婚夫", 0.9),
    // 직계 혈연
    ("father", 0.85),
    ("mother", 0.85),
    ("parent", 0.85),
    ("son", 0.85),
    ("daughter", 0.85),
    ("child", 0.85),
    ("grandfather", 0.8),
    ("grandmother", 0.8),
    ("grandchild", 0.8),
    ("父亲", 0.85),
    ("母亲", 0.85),
    ("儿子", 0.85),
    ("女儿", 0.85),
    ("祖父", 0.8),
    ("祖母", 0.8),
    // 사제
    ("mentor", 0.85),
    ("master", 0.85),
    ("teacher", 0.85),
    ("student", 0.85),
    ("disciple", 0.85),
    ("apprentice", 0.85),
    ("师父", 0.85),
    ("师傅", 0.85),
    ("师尊", 0.85),
    ("徒弟", 0.85),
    ("弟子", 0.85),
    // 형제
    ("brother", 0.8),
    ("sister", 0.8),
    ("sibling", 0.8),
    ("sworn brother", 0.8),
    ("兄弟", 0.8),
    ("姐妹", 0.8),
    ("哥哥", 0.8),
    ("弟弟", 0.8),
    ("姐姐", 0.8),
    ("妹妹", 0.8),
    ("师兄", 0.8),
    ("师姐", 0.8),
    // 우정/동맹
    ("best friend", 0.65),
    ("friend", 0.6),
    ("comrade", 0.6),
    ("companion", 0.6),
    ("ally", 0.55),
    ("挚友", 0.65),
    ("朋友", 0.6),
    ("同伴", 0.6),
    ("盟友", 0.55),
    // 지인
    ("acquaintance", 0.3),
    ("colleague", 0.35),
    ("neighbor", 0.35),
    ("相识", 0.3),
    ("同事", 0.35),
    ("邻居", 0.35),
    // 타인
    ("stranger", 0.1),
    ("陌生人", 0.1),
];

/// 기본 어근 규칙
const ROOTS: &[(&[&str], f32)] = &[
    (
        &["enem", "hostil", "hate", "betray", "vengean", "revenge", "敌", "仇", "恨"],
        0.9,
    ),
    (&["love", "romanc", "crush", "marri", "爱", "恋", "情", "婚"], 0.85),
    (
        &[
            "father", "mother", "parent", "daughter", "sibling", "brother", "sister", "cousin",
            "uncle", "aunt", "family", "kin", "父", "母", "亲", "兄", "姐", "妹", "叔", "姨",
        ],
        0.8,
    ),
    (&["friend", "ally", "allied", "comrad", "companion", "partner", "友", "伴"], 0.6),
];

/// 관계 가중치 해석기
#[derive(Debug, Clone)]
pub struct RelationWeightResolver {
    vocabulary: Vec<VocabularyEntry>,
    roots: Vec<RootRule>,
    default_weight: f32,
}

impl Default for RelationWeightResolver {
    fn default() -> Self {
        Self {
            vocabulary: VOCABULARY
                .iter()
                .map(|(label, weight)| VocabularyEntry {
                    label: label.to_string(),
                    weight: *weight,
                })
                .collect(),
            roots: ROOTS
                .iter()
                .map(|(roots, weight)| RootRule {
                    roots: roots.iter().map(|r| r.to_string()).collect(),
                    weight: *weight,
                })
                .collect(),
            default_weight: DEFAULT_WEIGHT,
        }
    }
}

impl RelationWeightResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 어휘 추가 (기존 항목보다 먼저 검사)
    pub fn with_label(mut self, label: &str, weight: f32) -> Self {
        self.vocabulary.insert(
            0,
            VocabularyEntry {
                label: label.trim().to_lowercase(),
                weight: weight.clamp(0.0, 1.0),
            },
        );
        self
    }

    /// 어근 규칙 추가 (기존 규칙 뒤에 검사)
    pub fn with_roots(mut self, roots: &[&str], weight: f32) -> Self {
        self.roots.push(RootRule {
            roots: roots.iter().map(|r| r.to_lowercase()).collect(),
            weight: weight.clamp(0.0, 1.0),
        });
        self
    }

    /// 라벨의 관계 강도 (항상 0.0 ~ 1.0)
    pub fn resolve(&self, label: &str) -> f32 {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return self.default_weight;
        }

        let weight = self
            .exact(&label)
            .or_else(|| self.substring(&label))
            .or_else(|| self.root(&label))
            .unwrap_or(self.default_weight);

        weight.clamp(0.0, 1.0)
    }

    fn exact(&self, label: &str) -> Option<f32> {
        self.vocabulary
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.weight)
    }

    fn substring(&self, label: &str) -> Option<f32> {
        self.vocabulary
            .iter()
            .find(|entry| contains_term(label, &entry.label))
            .map(|entry| entry.weight)
    }

    fn root(&self, label: &str) -> Option<f32> {
        self.roots
            .iter()
            .find(|rule| rule.roots.iter().any(|root| label.contains(root.as_str())))
            .map(|rule| rule.weight)
    }
}

/// 라벨에 어휘가 포함되는지
///
/// 라틴 문자 어휘는 단어 경계에서만 일치 ("son"이 "person"에 걸리지 않도록).
fn contains_term(label: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if !term.is_ascii() {
        return label.contains(term);
    }

    label.match_indices(term).any(|(start, _)| {
        let end = start + term.len();
        let before = label[..start].chars().next_back();
        let after = label[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
