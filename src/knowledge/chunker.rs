//! Text Chunking Module
//!
//! 긴 원고를 문장 경계에서 나누고, 앞 청크의 끝부분을 다음 청크 앞에
//! 겹쳐 붙여 경계를 넘는 문맥을 보존합니다.

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수). 이보다 긴 본문만 청킹 대상
    pub max_characters: usize,
    /// 오버랩 크기 (문자 수)
    pub overlap_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_characters: 1500,
            overlap_characters: 200,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청킹이 필요한 길이인지
    fn needs_chunking(&self, text: &str) -> bool;
}

// ============================================================================
// SentenceChunker
// ============================================================================

/// 문장 경계 청커
///
/// - 문장 종결 부호(`.`, `!`, `?`, `。`, `！`, `？`, `…`)와 줄바꿈에서 분리
/// - 최대 크기까지 문장을 누적
/// - 직전 청크의 꼬리(오버랩)를 다음 청크 앞에 붙임
/// - 최대 크기를 넘는 단일 문장은 문자 단위로 강제 분할
pub struct SentenceChunker {
    config: ChunkConfig,
}

impl SentenceChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 문장 단위로 분할
    fn split_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut current = String::new();

        for c in text.chars() {
            current.push(c);
            if is_sentence_end(c) {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current.clear();
            }
        }

        let rest = current.trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }

        sentences
    }

    /// 최대 크기를 넘는 문장을 문자 단위로 분할
    fn split_oversized(&self, sentence: &str) -> Vec<String> {
        let max = self.config.max_characters.max(1);
        let chars: Vec<char> = sentence.chars().collect();
        chars
            .chunks(max)
            .map(|piece| piece.iter().collect::<String>())
            .collect()
    }

    /// 청크 꼬리에서 오버랩 텍스트 추출 (단어 경계에서 시작)
    fn overlap_tail<'a>(&self, chunk: &'a str) -> &'a str {
        let overlap = self.config.overlap_characters;
        if overlap == 0 {
            return "";
        }

        let total = chunk.chars().count();
        if total <= overlap {
            return chunk;
        }

        let start = char_to_byte(chunk, total - overlap);
        let tail = &chunk[start..];

        // 공백이 있으면 다음 단어 시작부터 (공백 없는 CJK 문장은 그대로)
        match tail.find(char::is_whitespace) {
            Some(pos) if pos + 1 < tail.len() => tail[pos..].trim_start(),
            _ => tail,
        }
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        if !self.needs_chunking(text) {
            return vec![text.trim().to_string()];
        }

        let max = self.config.max_characters;
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        let pieces = self
            .split_sentences(text)
            .into_iter()
            .flat_map(|s| {
                if s.chars().count() > max {
                    self.split_oversized(&s)
                } else {
                    vec![s]
                }
            });

        for sentence in pieces {
            let current_len = current.chars().count();
            let sentence_len = sentence.chars().count();

            if !current.is_empty() && current_len + 1 + sentence_len > max {
                let tail = self.overlap_tail(&current).to_string();
                chunks.push(std::mem::take(&mut current));
                current = tail;
            }

            if !current.is_empty() {
                let sep = joiner(&current, &sentence);
                current.push_str(sep);
            }
            current.push_str(&sentence);
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }

        chunks
    }

    fn needs_chunking(&self, text: &str) -> bool {
        text.chars().count() > self.config.max_characters
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문장 종결 문자 여부
fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | '…' | '\n')
}

/// 문장 사이 구분 문자 (CJK 문장 사이에는 공백을 넣지 않음)
fn joiner(current: &str, next: &str) -> &'static str {
    let prev_ascii = current.chars().last().map(|c| c.is_ascii()).unwrap_or(true);
    let next_ascii = next.chars().next().map(|c| c.is_ascii()).unwrap_or(true);
    if prev_ascii || next_ascii {
        " "
    } else {
        ""
    }
}

/// 문자 인덱스를 바이트 인덱스로 변환 (UTF-8 안전)
#[inline]
fn char_to_byte(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

// ============================================================================
// Factory Function
// ============================================================================

/// 문장 청커 생성 (설정 지정)
pub fn sentence_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(SentenceChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================
