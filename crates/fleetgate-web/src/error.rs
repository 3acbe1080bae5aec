//! API 에러 처리.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleetgate_core::error::CoreError;
use serde::Serialize;
use thiserror::Error;

/// API 에러
#[derive(Debug, Error)]
pub enum ApiError {
    /// 내부 서버 오류
    #[error("내부 서버 오류: {0}")]
    Internal(String),

    /// 리소스를 찾을 수 없음
    #[error("리소스를 찾을 수 없음: {0}")]
    NotFound(String),

    /// 잘못된 요청
    #[error("잘못된 요청: {0}")]
    BadRequest(String),

    /// 대상 에이전트와 통신 불가 (오프라인, 스트림 닫힘)
    #[error("에이전트 통신 불가: {0}")]
    Unavailable(String),
}

/// 에러 응답 본문
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// 에러 메시지
    pub error: String,
    /// HTTP 상태 코드
    pub status: u16,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            ApiError::Internal(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unavailable(msg) => msg,
        };

        let body = ErrorResponse {
            error: message,
            status: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            CoreError::Validation { .. } | CoreError::UnknownMetric(_) => {
                ApiError::BadRequest(err.to_string())
            }
            CoreError::Network(_) => ApiError::Unavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
