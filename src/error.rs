//! 검색 계층 에러 타입
//!
//! 하이브리드 엔진이 소스별 실패를 구분해서 처리할 수 있도록
//! thiserror 기반의 타입 에러를 제공합니다.
//! 저장소/HTTP 어댑터 내부는 anyhow를 그대로 사용합니다.

use std::time::Duration;

use thiserror::Error;

use crate::knowledge::SearchMethod;

/// 검색 소스 실패
///
/// 키워드 인덱스, 벡터 인덱스, 그래프 저장소 중 하나가 응답하지 못한 경우.
/// 하이브리드 엔진은 이 에러를 쿼리 전체 실패로 전파하지 않고
/// `SourceFailure`로 기록한 뒤 나머지 소스로 계속 진행합니다.
#[derive(Debug, Error)]
pub enum SourceError {
    /// 소스에 접근할 수 없음 (연결 실패, 인덱스 미구축, API 키 없음 등)
    #[error("{method} source unavailable: {reason}")]
    Unavailable { method: SearchMethod, reason: String },

    /// 소스별 제한 시간 초과
    #[error("{method} source timed out after {after:?}")]
    Timeout { method: SearchMethod, after: Duration },
}

impl SourceError {
    /// anyhow 에러를 Unavailable로 변환
    pub fn unavailable(method: SearchMethod, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            method,
            reason: err.to_string(),
        }
    }

    /// 실패한 소스
    pub fn method(&self) -> SearchMethod {
        match self {
            Self::Unavailable { method, .. } | Self::Timeout { method, .. } => *method,
        }
    }
}

/// 하이브리드 검색 호출 에러
///
/// 소스 장애는 여기에 포함되지 않습니다 (graceful degradation).
/// 호출자가 잘못된 인자를 넘긴 경우만 해당합니다.
#[derive(Debug, Error, PartialEq)]
pub enum RetrievalError {
    #[error("invalid {name} weight: {value} (must be finite and >= 0)")]
    InvalidWeight { name: &'static str, value: f32 },
}
