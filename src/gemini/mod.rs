//! Gemini API 공통 클라이언트
//!
//! 임베딩과 답변 생성이 같은 HTTP 클라이언트, API 키, Rate Limiter를 공유합니다.
//! API 키는 URL이 아닌 `x-goog-api-key` 헤더로 전송합니다.
//! source: https://ai.google.dev/gemini-api/docs

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Gemini REST API 기본 경로
pub const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// API 키 환경변수 (우선순위 순)
const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "GOOGLE_AI_API_KEY"];

// ============================================================================
// RateLimiter
// ============================================================================

/// 슬라이딩 윈도우 Rate Limiter
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
        }
    }

    /// 요청 가능할 때까지 대기
    async fn acquire(&mut self) {
        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        self.requests.push(Instant::now());
    }
}

// ============================================================================
// GeminiClient
// ============================================================================

/// Gemini API 에러 응답
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

/// Gemini HTTP 클라이언트
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                RATE_LIMIT_RPM,
                RATE_LIMIT_WINDOW,
            ))),
        })
    }

    /// 환경변수의 API 키로 생성
    pub fn from_env(timeout: Duration) -> Result<Self> {
        Self::new(get_api_key()?, timeout)
    }

    /// `{API_BASE}/{model}:{method}` 호출
    ///
    /// 429와 전송 실패는 지수 백오프로 재시도하고, 그 외 에러는 즉시 실패합니다.
    pub async fn call<Req, Resp>(&self, model: &str, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}:{}", API_BASE, model, method);
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));

            let response = match self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send {} request: {}", method, e));
                    if attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                return serde_json::from_str(&body)
                    .with_context(|| format!("Failed to parse {} response", method));
            }

            if status.as_u16() == 429 {
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(anyhow::anyhow!("Rate limit exceeded (429)"));
                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                return Err(api_error(status, &body));
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("{} failed after {} retries", method, MAX_RETRIES)))
    }
}

fn api_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(error) => anyhow::anyhow!(
            "Gemini API error ({}): {}",
            error.error.status,
            error.error.message
        ),
        Err(_) => anyhow::anyhow!("Gemini API error ({}): {}", status, body),
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위: `GEMINI_API_KEY` > `GOOGLE_API_KEY` > `GOOGLE_AI_API_KEY`
pub fn get_api_key() -> Result<String> {
    for var in API_KEY_VARS {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    API_KEY_VARS
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_parsing() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = api_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(err.to_string().contains("INVALID_ARGUMENT"));
        assert!(err.to_string().contains("API key not valid"));

        let raw = api_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(raw.to_string().contains("upstream down"));
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_burst_within_window() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(limiter.requests.len(), 3);
    }
}
