//! API 라우트 정의.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers;
use crate::AppState;

/// API 라우트 생성
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // 대시보드 분석
        .route("/analytics", get(handlers::analytics::get_analytics))
        // 리포트
        .route("/reports", get(handlers::analytics::get_report))
        // 트레이스
        .route("/traces", get(handlers::analytics::list_traces))
        .route(
            "/traces/{agent_id}/{trace_id}",
            get(handlers::analytics::get_trace),
        )
        // 지리 통계
        .route("/geo", get(handlers::analytics::get_geo))
        // 에이전트 인벤토리
        .route("/agents", get(handlers::agents::list_agents))
        .route("/agents/{id}", get(handlers::agents::get_agent))
        .route("/agents/{id}", delete(handlers::agents::remove_agent))
        .route("/agents/{id}/update", post(handlers::agents::update_agent))
        // 실시간 로그 (SSE)
        .route("/agents/{id}/logs", get(handlers::logs::stream_logs))
        // 알림 규칙
        .route("/alerts", get(handlers::alerts::list_rules))
        .route("/alerts", post(handlers::alerts::create_rule))
        .route("/alerts/{id}", delete(handlers::alerts::delete_rule))
}
