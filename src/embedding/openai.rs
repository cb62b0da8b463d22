//! OpenAI 호환 임베딩 프로바이더 (`/v1/embeddings`)
//!
//! `base_url`을 바꾸면 같은 규격을 따르는 자체 호스팅 서버에도 사용할 수 있습니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// 알려진 모델의 출력 차원
fn model_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// OpenAI 호환 임베딩 구현체
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    client: reqwest::Client,
    model: String,
    endpoint: String,
    dimension: usize,
}

impl OpenAiEmbedding {
    /// 생성 (모델/주소 미지정 시 기본값)
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Result<Self> {
        let model = model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension: model_dimension(&model),
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
        })
    }

    /// 요청 주소
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiEmbedding {
    async fn request(&self, input: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let expected = input.len();
        let request = EmbeddingsRequest {
            model: &self.model,
            input,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                anyhow::bail!("OpenAI API error ({}): {}", status, error.error.message);
            }
            anyhow::bail!("OpenAI API error ({}): {}", status, body);
        }

        let mut parsed: EmbeddingsResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;
        if parsed.data.len() != expected {
            anyhow::bail!(
                "Expected {} embeddings, got {}",
                expected,
                parsed.data.len()
            );
        }
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        self.request(vec![text])
            .await?
            .into_iter()
            .next()
            .context("Empty embedding response")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        tracing::debug!("Embedding batch of {} texts", texts.len());
        self.request(texts.iter().map(String::as_str).collect()).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "openai"
    }
}
