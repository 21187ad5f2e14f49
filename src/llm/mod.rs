//! LLM 모듈 - 답변 생성용 텍스트 완성 서비스
//!
//! 프롬프트 문자열을 넘기고 자유 형식 텍스트를 돌려받습니다.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;
use crate::gemini::GeminiClient;

/// 최대 출력 토큰
const MAX_OUTPUT_TOKENS: u32 = 2048;

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// 텍스트 완성 프로바이더 트레이트
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Gemini generateContent
// ============================================================================

/// Gemini 답변 생성 구현체
#[derive(Debug, Clone)]
pub struct GeminiCompletion {
    client: GeminiClient,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiCompletion {
    pub fn new(client: GeminiClient, config: &GeminiConfig) -> Self {
        Self {
            client,
            model: config.chat_model.clone(),
            temperature: config.temperature,
        }
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env(config: &GeminiConfig) -> Result<Self> {
        let client = GeminiClient::from_env(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self::new(client, config))
    }

    fn request(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        }
    }
}

/// 첫 번째 후보의 텍스트 파트를 이어붙임
fn response_text(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl CompletionProvider for GeminiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response: GenerateResponse = self
            .client
            .call(&self.model, "generateContent", &self.request(prompt))
            .await?;

        response_text(response)
            .ok_or_else(|| anyhow::anyhow!("Empty response from {}", self.model))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn completion() -> GeminiCompletion {
        let client = GeminiClient::new("fake_key".to_string(), Duration::from_secs(1)).unwrap();
        GeminiCompletion::new(client, &GeminiConfig::default())
    }

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(completion().request("질문")).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "질문");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_response_text_joins_parts() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"제24조에 "},{"text":"따릅니다."}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response_text(parsed).as_deref(), Some("제24조에 따릅니다."));
    }

    #[test]
    fn test_empty_response_is_none() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(response_text(parsed).is_none());

        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(response_text(blocked).is_none());
    }
}
