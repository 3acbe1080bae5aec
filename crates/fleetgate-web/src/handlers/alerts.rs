//! 알림 규칙 API 핸들러.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use fleetgate_core::models::alert::{AlertRule, Comparison};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::agents::CommandResponse;
use crate::AppState;

/// 규칙 생성/갱신 요청
#[derive(Debug, Deserialize)]
pub struct AlertRuleRequest {
    /// 규칙 ID (비어 있거나 UUID가 아니면 새로 발급)
    #[serde(default)]
    pub id: Option<String>,
    /// 규칙 이름
    pub name: String,
    /// 메트릭 타입 ("cpu", "memory", "rps", "error_rate")
    pub metric_type: String,
    /// 비교 연산자 ("gt", "lt")
    pub comparison: Comparison,
    /// 임계값
    pub threshold: f64,
    /// 집계 윈도우 (초, 기본: 300)
    #[serde(default)]
    pub window_secs: Option<u64>,
    /// 활성화 여부 (기본: true)
    #[serde(default)]
    pub enabled: Option<bool>,
    /// 쉼표 구분 수신자
    #[serde(default)]
    pub recipients: String,
}

impl AlertRuleRequest {
    fn into_rule(self) -> Result<AlertRule, ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::BadRequest("규칙 이름이 비어 있습니다".to_string()));
        }
        if !self.threshold.is_finite() {
            return Err(ApiError::BadRequest("임계값이 유효한 숫자가 아닙니다".to_string()));
        }

        let id = self
            .id
            .filter(|id| Uuid::parse_str(id).is_ok())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(AlertRule {
            id,
            name: self.name.trim().to_string(),
            metric_type: self.metric_type,
            comparison: self.comparison,
            threshold: self.threshold,
            window_secs: self.window_secs.filter(|secs| *secs > 0).unwrap_or(300),
            enabled: self.enabled.unwrap_or(true),
            recipients: self.recipients,
        })
    }
}

/// 규칙 목록
///
/// GET /api/alerts
pub async fn list_rules(State(state): State<AppState>) -> Result<Json<Vec<AlertRule>>, ApiError> {
    Ok(Json(state.alert_rules.list_rules().await?))
}

/// 규칙 생성/갱신
///
/// POST /api/alerts
pub async fn create_rule(
    State(state): State<AppState>,
    Json(request): Json<AlertRuleRequest>,
) -> Result<(StatusCode, Json<AlertRule>), ApiError> {
    let rule = request.into_rule()?;
    state.alert_rules.upsert_rule(&rule).await?;
    info!("알림 규칙 저장: {} ({})", rule.name, rule.id);
    Ok((StatusCode::CREATED, Json(rule)))
}

/// 규칙 삭제
///
/// DELETE /api/alerts/{id}
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    if !state.alert_rules.delete_rule(&id).await? {
        return Err(ApiError::NotFound(format!("알림 규칙 {id}")));
    }
    info!("알림 규칙 삭제: {id}");
    Ok(Json(CommandResponse {
        success: true,
        message: format!("알림 규칙 {id} 삭제됨"),
    }))
}
