//! 실시간 로그 SSE 핸들러.
//!
//! 구독을 등록한 뒤 에이전트에 `log_request` 명령을 보낸다.
//! 클라이언트 연결이 끊기면 스트림과 함께 구독이 drop되어 자동 해제된다.

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use fleetgate_core::models::protocol::{CommandPayload, LogRequest, ServerCommand};
use fleetgate_registry::LogSubscription;
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

/// 로그 스트림 쿼리
#[derive(Debug, Deserialize)]
pub struct LogStreamParams {
    /// 로그 종류 (기본: access)
    #[serde(default = "default_log_type")]
    pub log_type: String,
    /// tail 줄 수 (기본: 100)
    #[serde(default = "default_tail_lines")]
    pub tail: u32,
    /// 계속 수신 여부 (기본: true)
    #[serde(default = "default_follow")]
    pub follow: bool,
}

fn default_log_type() -> String {
    "access".to_string()
}

fn default_tail_lines() -> u32 {
    100
}

fn default_follow() -> bool {
    true
}

/// 실시간 로그 구독
///
/// GET /api/agents/{id}/logs?log_type=&tail=&follow=
pub async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LogStreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state.registry.subscribe_logs(&id)?;

    let command = ServerCommand {
        command_id: format!("log-{}", subscription.id()),
        payload: CommandPayload::LogRequest(LogRequest {
            instance_id: id.clone(),
            log_type: params.log_type,
            tail_lines: params.tail,
            follow: params.follow,
        }),
    };
    // 실패 시 subscription이 drop되며 구독도 해제된다
    state.registry.send_command(&id, command).await?;
    debug!("로그 스트림 시작: {id} ({})", subscription.id());

    Ok(Sse::new(log_events(subscription)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

/// 구독을 SSE 이벤트 스트림으로 변환 (세션 종료 시 끝남)
fn log_events(subscription: LogSubscription) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(subscription, |mut subscription| async move {
        loop {
            let entry = subscription.recv().await?;
            match serde_json::to_string(&entry) {
                Ok(json) => {
                    let event = Event::default().event("log").data(json);
                    return Some((Ok(event), subscription));
                }
                Err(e) => warn!("로그 직렬화 실패, 건너뜀: {e}"),
            }
        }
    })
}
