//! Google Gemini 임베딩 프로바이더
//!
//! 분당 요청 수 제한과 429 응답 시 지수 백오프를 내장합니다.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::EmbeddingProvider;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 기본 모델 (MRL 지원, 출력 차원 선택 가능)
pub const DEFAULT_MODEL: &str = "gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 무료 티어: 60 RPM, 요청 간 최소 1초
const REQUESTS_PER_WINDOW: usize = 60;
const WINDOW: Duration = Duration::from_secs(60);
const MIN_INTERVAL: Duration = Duration::from_millis(1000);

/// 문서/쿼리는 서로 다른 taskType으로 임베딩
const TASK_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";
const TASK_QUERY: &str = "RETRIEVAL_QUERY";

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
    dimension: usize,
    window: Mutex<RequestWindow>,
}

// ============================================================================
// Rate Limiting
// ============================================================================

/// 최근 요청 시각 (슬라이딩 윈도우)
#[derive(Debug, Default)]
struct RequestWindow {
    sent: VecDeque<Instant>,
}

impl RequestWindow {
    /// `now`에 요청하려면 기다려야 하는 시간
    fn delay(&self, now: Instant) -> Duration {
        let since_last = self
            .sent
            .back()
            .map(|last| MIN_INTERVAL.saturating_sub(now.duration_since(*last)))
            .unwrap_or_default();

        let in_window: Vec<&Instant> = self
            .sent
            .iter()
            .filter(|t| now.duration_since(**t) < WINDOW)
            .collect();
        let window_full = in_window
            .first()
            .filter(|_| in_window.len() >= REQUESTS_PER_WINDOW)
            .map(|oldest| WINDOW.saturating_sub(now.duration_since(**oldest)))
            .unwrap_or_default();

        since_last.max(window_full)
    }

    fn record(&mut self, now: Instant) {
        while self
            .sent
            .front()
            .is_some_and(|t| now.duration_since(*t) >= WINDOW)
        {
            self.sent.pop_front();
        }
        self.sent.push_back(now);
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// 요청 한 번의 결과
enum Attempt {
    Done(Vec<f32>),
    /// 네트워크 오류, 429
    Retry(anyhow::Error),
    Fatal(anyhow::Error),
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}

// ============================================================================
// GeminiEmbedding
// ============================================================================

impl GeminiEmbedding {
    /// 모델과 출력 차원을 지정하여 생성 (768, 1536, 3072 중 선택)
    pub fn new(api_key: String, model: Option<String>, dimension: usize) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }

        let model = model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/{}:embedContent", GEMINI_API_BASE, model),
            model,
            client,
            dimension,
            window: Mutex::new(RequestWindow::default()),
        })
    }

    /// 요청 주소
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request<'a>(&self, text: &'a str, task_type: &'static str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
            task_type,
            output_dimensionality: self.dimension,
        }
    }

    /// 윈도우가 허락할 때까지 대기 후 요청 기록
    async fn throttle(&self) {
        let mut window = self.window.lock().await;
        let wait = window.delay(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Gemini rate limit: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        window.record(Instant::now());
    }

    async fn send(&self, request: &EmbedRequest<'_>) -> Attempt {
        self.throttle().await;

        // API 키는 URL이 아닌 헤더로 전송
        let response = match self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(anyhow::anyhow!("Failed to send embedding request: {}", e)),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Attempt::Fatal(anyhow::anyhow!("Failed to read response body: {}", e)),
        };

        if status.is_success() {
            return match serde_json::from_str::<EmbedResponse>(&body) {
                Ok(parsed) => Attempt::Done(parsed.embedding.values),
                Err(e) => Attempt::Fatal(anyhow::anyhow!("Failed to parse embedding response: {}", e)),
            };
        }

        if status.as_u16() == 429 {
            return Attempt::Retry(anyhow::anyhow!("Rate limit exceeded (429)"));
        }

        match serde_json::from_str::<GeminiError>(&body) {
            Ok(error) => Attempt::Fatal(anyhow::anyhow!(
                "Gemini API error ({}): {}",
                error.error.status,
                error.error.message
            )),
            Err(_) => Attempt::Fatal(anyhow::anyhow!("Gemini API error ({}): {}", status, body)),
        }
    }

    /// 재시도 루프 (429, 네트워크 오류만 재시도)
    async fn embed_as(&self, text: &str, task_type: &'static str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = self.request(text, task_type);
        let mut attempt = 0;

        loop {
            match self.send(&request).await {
                Attempt::Done(values) => return Ok(values),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Retry(e) if attempt >= MAX_RETRIES => {
                    return Err(e.context(format!("Embedding failed after {} retries", MAX_RETRIES)))
                }
                Attempt::Retry(e) => {
                    let wait = backoff(attempt);
                    tracing::warn!(
                        "{}, retrying in {:?} (attempt {}/{})",
                        e,
                        wait,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_as(text, TASK_DOCUMENT).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_as(text, TASK_QUERY).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder() -> GeminiEmbedding {
        GeminiEmbedding::new("fake_key".to_string(), None, DEFAULT_DIMENSION).unwrap()
    }

    #[test]
    fn test_dimensions() {
        for dim in SUPPORTED_DIMENSIONS {
            assert!(GeminiEmbedding::new("fake_key".to_string(), None, dim).is_ok());
        }

        let err = GeminiEmbedding::new("fake_key".to_string(), None, 999)
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("Invalid dimension"));
    }

    #[test]
    fn test_model_override() {
        let embedder =
            GeminiEmbedding::new("fake_key".to_string(), Some("text-embedding-004".into()), 768)
                .unwrap();
        assert_eq!(embedder.name(), "text-embedding-004");
        assert!(embedder.endpoint().ends_with("/text-embedding-004:embedContent"));

        assert_eq!(self::embedder().name(), DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_empty_text_skips_network() {
        let vector = embedder().embed("   ").await.unwrap();
        assert_eq!(vector.len(), DEFAULT_DIMENSION);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_request_shape() {
        let embedder = embedder();
        let json = serde_json::to_value(embedder.request("hi", TASK_DOCUMENT)).unwrap();
        assert_eq!(json["model"], "models/gemini-embedding-001");
        assert_eq!(json["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(json["outputDimensionality"], 768);
        assert_eq!(json["content"]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_query_request_uses_query_task() {
        let json = serde_json::to_value(embedder().request("dragon clan", TASK_QUERY)).unwrap();
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["content"]["parts"][0]["text"], "dragon clan");
    }

    #[tokio::test]
    async fn test_empty_query_skips_network() {
        let vector = embedder().embed_query("").await.unwrap();
        assert_eq!(vector.len(), DEFAULT_DIMENSION);
    }

    #[test]
    fn test_window_min_interval() {
        let start = Instant::now();
        let mut window = RequestWindow::default();
        assert_eq!(window.delay(start), Duration::ZERO);

        window.record(start);
        let wait = window.delay(start + Duration::from_millis(400));
        assert_eq!(wait, Duration::from_millis(600));
        assert_eq!(window.delay(start + MIN_INTERVAL), Duration::ZERO);
    }

    #[test]
    fn test_window_full() {
        let start = Instant::now();
        let mut window = RequestWindow::default();
        for i in 0..REQUESTS_PER_WINDOW as u64 {
            window.record(start + Duration::from_secs(i / 2));
        }

        // 가장 오래된 요청이 윈도우를 벗어날 때까지
        let now = start + Duration::from_secs(40);
        assert_eq!(window.delay(now), Duration::from_secs(20));

        window.record(start + WINDOW + Duration::from_secs(1));
        assert!(window.sent.len() < REQUESTS_PER_WINDOW + 1);
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(0), Duration::from_millis(2000));
        assert_eq!(backoff(2), Duration::from_millis(8000));
    }
}
