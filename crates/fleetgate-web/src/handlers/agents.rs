//! 에이전트 인벤토리 API 핸들러.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use fleetgate_core::models::agent::{AgentRecord, StatusCounts};
use fleetgate_core::models::protocol::{CommandPayload, ServerCommand};
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::AppState;

/// 에이전트 목록 응답
#[derive(Debug, Serialize)]
pub struct AgentListResponse {
    /// 에이전트 (ID 순)
    pub agents: Vec<AgentRecord>,
    /// 상태별 수
    pub counts: StatusCounts,
    /// 게이트웨이 버전
    pub system_version: String,
}

/// 명령/삭제 결과
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// 성공 여부
    pub success: bool,
    /// 결과 메시지
    pub message: String,
}

/// 에이전트 목록
///
/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentListResponse> {
    let agents = state
        .registry
        .list_all()
        .iter()
        .map(|session| session.snapshot())
        .collect();

    Json(AgentListResponse {
        agents,
        counts: state.registry.status_counts(),
        system_version: state.build.version.to_string(),
    })
}

/// 에이전트 단건 조회
///
/// GET /api/agents/{id}
pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgentRecord>, ApiError> {
    let session = state
        .registry
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("에이전트 {id}")))?;
    Ok(Json(session.snapshot()))
}

/// 인벤토리에서 에이전트 삭제
///
/// DELETE /api/agents/{id}
pub async fn remove_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    state
        .registry
        .remove(&id)
        .ok_or_else(|| ApiError::NotFound(format!("에이전트 {id}")))?;
    Ok(Json(CommandResponse {
        success: true,
        message: format!("에이전트 {id} 삭제됨"),
    }))
}

/// 원격 업데이트 명령 전송
///
/// POST /api/agents/{id}/update
pub async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = update_command(&state.http_address, Utc::now().timestamp());
    state.registry.send_command(&id, command).await?;

    info!("에이전트 원격 업데이트 요청: {id}");
    Ok(Json(CommandResponse {
        success: true,
        message: "업데이트 명령 전송됨".to_string(),
    }))
}

/// 업데이트 명령 생성 (`upd-{unix초}`)
fn update_command(http_address: &str, unix_secs: i64) -> ServerCommand {
    ServerCommand {
        command_id: format!("upd-{unix_secs}"),
        payload: CommandPayload::Update {
            version: "latest".to_string(),
            update_url: format!("http://{http_address}/updates"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use fleetgate_core::models::agent::Heartbeat;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    async fn call(app: axum::Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn heartbeat(hostname: &str) -> Heartbeat {
        Heartbeat {
            hostname: hostname.to_string(),
            version: "1.25.3".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn update_command_format() {
        let cmd = update_command("gw:5021", 1_700_000_000);
        assert_eq!(cmd.command_id, "upd-1700000000");
        assert_eq!(
            cmd.payload,
            CommandPayload::Update {
                version: "latest".to_string(),
                update_url: "http://gw:5021/updates".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn list_and_get_agents() {
        let (state, _store) = test_support::state();
        let (tx, _rx) = mpsc::channel(4);
        state
            .registry
            .upsert_on_heartbeat("b1", &heartbeat("edge-b"), None, tx.clone());
        state
            .registry
            .upsert_on_heartbeat("a1", &heartbeat("edge-a"), None, tx);
        state.registry.mark_offline("b1");

        let (status, body) = call(crate::api_router(state.clone()), Method::GET, "/api/agents").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agents"][0]["agent_id"], "a1");
        assert_eq!(body["agents"][1]["status"], "offline");
        assert_eq!(body["counts"]["online"], 1);

        let (status, body) = call(crate::api_router(state.clone()), Method::GET, "/api/agents/a1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hostname"], "edge-a");
        assert_eq!(body["ip"], "unknown");

        let (status, _) = call(crate::api_router(state), Method::GET, "/api/agents/zz").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_agent_removes_session() {
        let (state, _store) = test_support::state();
        let (tx, _rx) = mpsc::channel(4);
        state
            .registry
            .upsert_on_heartbeat("a1", &heartbeat("edge-a"), None, tx);

        let (status, body) = call(crate::api_router(state.clone()), Method::DELETE, "/api/agents/a1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(state.registry.get("a1").is_none());

        let (status, _) = call(crate::api_router(state), Method::DELETE, "/api/agents/a1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_reaches_online_agent_stream() {
        let (state, _store) = test_support::state();
        let (tx, mut rx) = mpsc::channel(4);
        state
            .registry
            .upsert_on_heartbeat("a1", &heartbeat("edge-a"), None, tx);

        let (status, body) = call(crate::api_router(state.clone()), Method::POST, "/api/agents/a1/update").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let cmd = rx.recv().await.unwrap();
        assert!(cmd.command_id.starts_with("upd-"));
        match cmd.payload {
            CommandPayload::Update { update_url, .. } => {
                assert_eq!(update_url, "http://gw.local:5021/updates");
            }
            other => panic!("예상치 못한 명령: {other:?}"),
        }

        state.registry.mark_offline("a1");
        let (status, _) = call(crate::api_router(state), Method::POST, "/api/agents/a1/update").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
