//! 분석 API 핸들러 (대시보드, 리포트, 트레이스, 지리 통계).

use axum::extract::{Path, Query, State};
use axum::Json;
use fleetgate_core::models::analytics::{
    AgentScope, AnalyticsQuery, AnalyticsResponse, GeoSummary, ReportData, Trace, TraceFilter,
    TraceList,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::AppState;

/// 대시보드 쿼리
///
/// GET /api/analytics?window=&agent_id=&agent_ids=&from=&to=&timezone=
#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsParams {
    /// 상대 윈도우 (기본: 24h)
    pub window: Option<String>,
    /// 단일 에이전트 ID
    pub agent_id: Option<String>,
    /// 쉼표 구분 에이전트 ID 목록
    pub agent_ids: Option<String>,
    /// 절대 시작 (Unix ms)
    pub from: Option<i64>,
    /// 절대 종료 (Unix ms)
    pub to: Option<i64>,
    /// IANA 타임존 (기본: UTC)
    pub timezone: Option<String>,
}

impl AnalyticsParams {
    fn into_query(self) -> AnalyticsQuery {
        AnalyticsQuery {
            scope: AgentScope::from_params(self.agent_id.as_deref(), self.agent_ids.as_deref()),
            window: self.window.unwrap_or_default(),
            from_ms: self.from.unwrap_or(0),
            to_ms: self.to.unwrap_or(0),
            timezone: self.timezone.unwrap_or_default(),
        }
    }
}

/// 대시보드 분석 조회
///
/// 저장소 장애 시에도 인메모리 집계로 응답하므로 실패하지 않는다.
pub async fn get_analytics(
    State(state): State<AppState>,
    Query(params): Query<AnalyticsParams>,
) -> Json<AnalyticsResponse> {
    let query = params.into_query();
    Json(state.analytics.query(&query).await)
}

/// 리포트 쿼리
#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    /// 시작 (Unix ms, 기본: 24시간 전)
    pub from: Option<i64>,
    /// 종료 (Unix ms, 기본: 현재)
    pub to: Option<i64>,
    /// 쉼표 구분 에이전트 ID 목록 (기본: 전체)
    pub agent_ids: Option<String>,
}

/// 리포트 생성
///
/// GET /api/reports?from=&to=&agent_ids=
pub async fn get_report(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Json<ReportData>, ApiError> {
    let agent_ids: Vec<String> = params
        .agent_ids
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();

    let report = state
        .analytics
        .report_data(params.from.unwrap_or(0), params.to.unwrap_or(0), &agent_ids)
        .await?;
    Ok(Json(report))
}

/// 트레이스 목록 쿼리
#[derive(Debug, Default, Deserialize)]
pub struct TraceParams {
    /// 시간 윈도우 (기본: 1h)
    pub window: Option<String>,
    /// 단일 에이전트 ID
    pub agent_id: Option<String>,
    /// 쉼표 구분 에이전트 ID 목록
    pub agent_ids: Option<String>,
    /// 상태 필터 ("5xx", "4xx", 정확한 코드)
    pub status: Option<String>,
    /// 메서드 필터
    pub method: Option<String>,
    /// URI 부분 문자열
    pub uri: Option<String>,
    /// 최대 개수 (기본: 100)
    pub limit: Option<usize>,
}

/// 트레이스 목록
///
/// GET /api/traces?window=&agent_id=&status=&method=&uri=&limit=
pub async fn list_traces(
    State(state): State<AppState>,
    Query(params): Query<TraceParams>,
) -> Result<Json<TraceList>, ApiError> {
    let filter = TraceFilter {
        scope: AgentScope::from_params(params.agent_id.as_deref(), params.agent_ids.as_deref()),
        window: params.window.unwrap_or_default(),
        status: params.status.unwrap_or_default(),
        method: params.method.unwrap_or_default(),
        uri: params.uri.unwrap_or_default(),
        limit: params.limit.unwrap_or(0),
    };
    Ok(Json(state.analytics.list_traces(&filter).await?))
}

/// 트레이스 상세
///
/// GET /api/traces/{agent_id}/{trace_id}
pub async fn get_trace(
    State(state): State<AppState>,
    Path((agent_id, trace_id)): Path<(String, String)>,
) -> Result<Json<Trace>, ApiError> {
    Ok(Json(
        state.analytics.trace_details(&agent_id, &trace_id).await?,
    ))
}

/// 지리 통계 쿼리
#[derive(Debug, Default, Deserialize)]
pub struct GeoParams {
    /// 시간 윈도우 (기본: 24h)
    pub window: Option<String>,
    /// 단일 에이전트 ID
    pub agent_id: Option<String>,
    /// 쉼표 구분 에이전트 ID 목록
    pub agent_ids: Option<String>,
}

/// 지리 통계
///
/// GET /api/geo?window=&agent_id=
pub async fn get_geo(
    State(state): State<AppState>,
    Query(params): Query<GeoParams>,
) -> Json<GeoSummary> {
    let scope = AgentScope::from_params(params.agent_id.as_deref(), params.agent_ids.as_deref());
    let window = params.window.unwrap_or_default();
    Json(state.analytics.geo_summary(&window, &scope).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use fleetgate_core::models::telemetry::{LogEntry, LogItem};
    use fleetgate_core::ports::telemetry_store::TelemetryStore;
    use tower::ServiceExt;

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn item(agent: &str, status: i32, request_id: &str) -> LogItem {
        LogItem {
            entry: LogEntry {
                request_method: "GET".to_string(),
                request_uri: "/api/orders".to_string(),
                status,
                request_time: 0.2,
                body_bytes_sent: 512,
                remote_addr: "203.0.113.9".to_string(),
                request_id: request_id.to_string(),
                ..Default::default()
            },
            agent_id: agent.to_string(),
            client_ip: "203.0.113.9".to_string(),
            geo: Default::default(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn analytics_counts_stored_logs() {
        let (state, store) = test_support::state();
        store
            .insert_access_logs(&[item("a1", 200, "r1"), item("a2", 500, "r2")])
            .await
            .unwrap();

        let (status, body) = get(crate::api_router(state.clone()), "/api/analytics?window=1h").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["total_requests"], 2);

        let (_, scoped) = get(crate::api_router(state), "/api/analytics?window=1h&agent_id=a1").await;
        assert_eq!(scoped["summary"]["total_requests"], 1);
    }

    #[tokio::test]
    async fn inverted_report_range_is_bad_request() {
        let (state, _store) = test_support::state();
        let (status, body) = get(
            crate::api_router(state),
            "/api/reports?from=1700000000000&to=1600000000000",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn unknown_trace_is_not_found() {
        let (state, _store) = test_support::state();
        let (status, body) = get(crate::api_router(state), "/api/traces/a1/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn empty_geo_summary() {
        let (state, _store) = test_support::state();
        let (status, body) = get(crate::api_router(state), "/api/geo?window=1h").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_object());
    }
}
