//! 키워드 추출 - 어휘 점수와 중복 제거의 기반
//!
//! 자유 텍스트에서 후보 단어, 고유명사 형태의 구간, 인용 구간을 뽑습니다.
//! 결정적이며 실패하지 않습니다 (빈 입력 → 빈 목록).

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// 추출 결과 최대 개수
pub const MAX_KEYWORDS: usize = 50;

/// 토큰 길이 범위 (문자 수)
const MIN_TOKEN_CHARS: usize = 2;
const MAX_TOKEN_CHARS: usize = 10;

/// 영어 불용어 (점수와 중복 판정을 흐리는 기능어)
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "of", "to", "in", "on", "at", "by", "for",
    "with", "from", "into", "over", "under", "about", "after", "before", "as", "is", "it",
    "its", "be", "been", "being", "was", "were", "are", "am", "do", "does", "did", "so", "no",
    "not", "up", "we", "he", "she", "me", "my", "his", "her", "him", "our", "you", "your",
    "they", "them", "their", "this", "that", "these", "those", "there", "then", "than", "has",
    "had", "have", "who", "what", "when", "which", "will", "would", "can", "could", "should",
];

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"["“「『《]([^"”」』》]{2,40})["”」』》]"#).expect("static quoted-span regex")
    })
}

fn ideograph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\p{Han}\p{Katakana}]{2,4}").expect("static ideograph regex")
    })
}

fn capitalized_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2}\b").expect("static proper-noun regex")
    })
}

// ============================================================================
// Extraction
// ============================================================================

/// 텍스트에서 키워드 추출
///
/// 순서: 인용 구간 → 고유명사 구간 (라틴 대문자 연속어, 한자/가타카나 2~4자) → 일반 토큰.
/// 대소문자 무시로 중복 제거 후 소문자로 반환하며 최대 [`MAX_KEYWORDS`]개입니다.
pub fn extract_keywords(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut keywords = Vec::new();

    let mut push = |term: &str| {
        let term = term.trim().to_lowercase();
        if term.chars().count() < MIN_TOKEN_CHARS {
            return;
        }
        if seen.insert(term.clone()) {
            keywords.push(term);
        }
    };

    for cap in quoted_re().captures_iter(text) {
        if let Some(m) = cap.get(1) {
            push(m.as_str());
        }
    }

    for m in capitalized_re().find_iter(text) {
        push(m.as_str());
    }

    for m in ideograph_re().find_iter(text) {
        push(m.as_str());
    }

    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    for token in cleaned.split_whitespace() {
        let len = token.chars().count();
        if !(MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS).contains(&len) {
            continue;
        }
        if is_stop_word(token) {
            continue;
        }
        push(token);
    }

    keywords.truncate(MAX_KEYWORDS);
    keywords
}

fn is_stop_word(token: &str) -> bool {
    let lower = token.to_lowercase();
    STOP_WORDS.contains(&lower.as_str())
}

// ============================================================================
// Set Utilities
// ============================================================================

/// 키워드 집합 (중복 판정용)
pub fn keyword_set(text: &str) -> HashSet<String> {
    extract_keywords(text).into_iter().collect()
}

/// Jaccard 유사도 (교집합 / 합집합)
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    if inter == 0 {
        return 0.0;
    }
    let union = a.union(b).count();
    inter as f32 / union as f32
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(extract_keywords("").is_empty());
        assert!(extract_keywords("   \n").is_empty());
    }

    #[test]
    fn test_punctuation_split_and_stop_words() {
        let keywords = extract_keywords("The dragon clan's ruin!");
        assert_eq!(keywords, vec!["dragon", "clan", "ruin"]);

        // 11자 이상 토큰은 제외
        let keywords = extract_keywords("dragon clan's destruction");
        assert_eq!(keywords, vec!["dragon", "clan"]);
    }

    #[test]
    fn test_token_length_bounds() {
        let keywords = extract_keywords("x ab incomprehensibilities sword");
        assert!(keywords.contains(&"ab".to_string()));
        assert!(keywords.contains(&"sword".to_string()));
        assert!(!keywords.iter().any(|k| k.starts_with("incompre")));
        assert!(!keywords.contains(&"x".to_string()));
    }

    #[test]
    fn test_proper_nouns_latin_and_cjk() {
        let keywords = extract_keywords("Lord Varen met 林青云 at dawn");
        assert!(keywords.contains(&"lord varen".to_string()));
        assert!(keywords.contains(&"林青云".to_string()));
    }

    #[test]
    fn test_quoted_spans_first() {
        let keywords = extract_keywords(r#"She whispered "Ashen Crown" and left"#);
        assert_eq!(keywords[0], "ashen crown");

        let keywords = extract_keywords("他拿起了「天机剑」");
        assert_eq!(keywords[0], "天机剑");
    }

    #[test]
    fn test_dedup_case_insensitive() {
        let keywords = extract_keywords("Sword sword SWORD");
        assert_eq!(keywords, vec!["sword"]);
    }

    #[test]
    fn test_cap_at_fifty() {
        let text: String = (0..200).map(|i| format!("word{} ", i)).collect();
        assert_eq!(extract_keywords(&text).len(), MAX_KEYWORDS);
    }

    #[test]
    fn test_jaccard() {
        let a = keyword_set("dragon clan ruin");
        let b = keyword_set("dragon clan revenge");
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-6);
        assert_eq!(jaccard(&a, &HashSet::new()), 0.0);
        assert!((jaccard(&a, &a) - 1.0).abs() < 1e-6);
    }
}
