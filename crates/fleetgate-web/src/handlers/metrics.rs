//! 헬스 체크와 Prometheus 텍스트 메트릭.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::metrics::MetricsSnapshot;
use crate::AppState;

/// 헬스 체크 응답
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 상태
    pub status: &'static str,
    /// 게이트웨이 버전
    pub version: &'static str,
}

/// 헬스 체크
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: state.build.version,
    })
}

/// Prometheus 메트릭
///
/// GET /metrics
pub async fn prometheus(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.metrics.observe(&snapshot(&state));
    let body = state
        .metrics
        .encode()
        .map_err(|e| ApiError::Internal(format!("메트릭 인코딩 실패: {e}")))?;
    Ok(([(header::CONTENT_TYPE, state.metrics.content_type())], body))
}

/// 스크레이프 시점 값 수집
fn snapshot(state: &AppState) -> MetricsSnapshot {
    let stats = state.pipeline.stats();
    let tasks = tokio::runtime::Handle::try_current()
        .map(|handle| handle.metrics().num_alive_tasks())
        .unwrap_or(0);

    MetricsSnapshot {
        agents: state.registry.status_counts(),
        messages_total: stats.messages_total(),
        queues: state.pipeline.queue_status(),
        store_ops_total: stats.store_ops_total(),
        store_latency_seconds_total: stats.store_latency_seconds_total(),
        tasks: tasks as i64,
        fallback_requests_total: state.analytics.fallback().total_requests(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use fleetgate_core::models::agent::Heartbeat;
    use fleetgate_core::models::telemetry::LogEntry;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_version() {
        let (state, _store) = test_support::state();
        let response = crate::api_router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn prometheus_text_has_counters() {
        let (state, _store) = test_support::state();
        let (tx, _rx) = mpsc::channel(4);
        state
            .registry
            .upsert_on_heartbeat("a1", &Heartbeat::default(), None, tx);
        state.pipeline.stats().record_message();
        state.pipeline.stats().record_message();
        state
            .pipeline
            .ingest_log("a1", LogEntry::default(), chrono::Utc::now())
            .unwrap();

        let response = crate::api_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain; version=0.0.4"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("fleetgate_agents_total{status=\"online\"} 1"));
        assert!(text.contains("fleetgate_messages_total 2"));
        assert!(text.contains("fleetgate_queue_dropped_total{kind=\"log\"} 0"));
        assert!(text.contains("fleetgate_queue_length{kind=\"log\"} 1"));
        assert!(text.contains("# TYPE fleetgate_queue_dropped_total counter"));
    }
}
