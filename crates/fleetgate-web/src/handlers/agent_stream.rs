//! 에이전트 스트림 핸들러.
//!
//! 연결마다 수신 루프 하나와 명령 송신 태스크 하나를 둔다.
//! 수신 메시지는 도착 순서대로 처리되며, 첫 하트비트 전의 로그/메트릭은 무시한다.
//! 루프가 어떤 이유로 끝나든 세션은 정확히 한 번 오프라인으로 전환된다.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use chrono::Utc;
use fleetgate_core::models::protocol::{AgentMessage, AgentPayload, ServerCommand};
use fleetgate_registry::CommandSender;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::AppState;

/// 연결당 명령 버퍼
const COMMAND_BUFFER: usize = 32;

/// 에이전트 스트림 업그레이드
///
/// GET /agent/connect
pub async fn agent_connect(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, Some(peer), state))
}

async fn handle_socket(socket: WebSocket, peer: Option<SocketAddr>, state: AppState) {
    let (mut sink, mut frames) = socket.split();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ServerCommand>(COMMAND_BUFFER);

    // 명령 송신 태스크
    let writer = tokio::spawn(async move {
        while let Some(command) = cmd_rx.recv().await {
            let json = match serde_json::to_string(&command) {
                Ok(json) => json,
                Err(e) => {
                    warn!("명령 직렬화 실패 ({}): {e}", command.command_id);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                debug!("명령 전송 실패, 송신 종료: {e}");
                break;
            }
        }
    });

    let shutdown = wait_for_shutdown(state.shutdown.clone());
    tokio::pin!(shutdown);

    let mut connection = Connection {
        state: &state,
        peer,
        stream: cmd_tx,
        agent_id: None,
    };

    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = &mut shutdown => {
                debug!("종료 신호로 에이전트 스트림 종료");
                break;
            }
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue, // Ping/Pong/Binary
            Some(Err(e)) => {
                warn!("에이전트 스트림 수신 에러: {e}");
                break;
            }
        };

        let message: AgentMessage = match serde_json::from_str(text.as_str()) {
            Ok(message) => message,
            Err(e) => {
                warn!("잘못된 에이전트 메시지, 연결 종료: {e}");
                break;
            }
        };
        connection.handle(message);
    }

    connection.close();
    writer.abort();
}

/// 연결 하나의 처리 상태
struct Connection<'a> {
    state: &'a AppState,
    peer: Option<SocketAddr>,
    stream: CommandSender,
    /// 첫 하트비트로 확정된 에이전트 ID
    agent_id: Option<String>,
}

impl Connection<'_> {
    fn handle(&mut self, message: AgentMessage) {
        self.state.pipeline.stats().record_message();

        match message.payload {
            AgentPayload::Heartbeat(heartbeat) => {
                if let Some(previous) = self.agent_id.as_deref() {
                    if previous != message.agent_id {
                        info!("연결의 에이전트 ID 변경: {previous} -> {}", message.agent_id);
                        self.state.registry.disconnect(previous, &self.stream);
                    }
                }
                self.state.registry.upsert_on_heartbeat(
                    &message.agent_id,
                    &heartbeat,
                    self.peer,
                    self.stream.clone(),
                );
                self.agent_id = Some(message.agent_id);
            }
            AgentPayload::LogEntry(entry) => {
                let Some(agent_id) = self.agent_id.as_deref() else {
                    debug!("하트비트 전 로그 무시: {}", message.agent_id);
                    return;
                };
                let now = Utc::now();
                self.state.registry.publish_log(agent_id, &entry);
                self.state.analytics.fallback().record(&entry, now);
                // 큐 포화 폐기는 파이프라인에서 기록된다
                let _ = self.state.pipeline.ingest_log(agent_id, entry, now);
            }
            AgentPayload::Metrics(metrics) => {
                let Some(agent_id) = self.agent_id.as_deref() else {
                    debug!("하트비트 전 메트릭 무시: {}", message.agent_id);
                    return;
                };
                let rps = self
                    .state
                    .registry
                    .record_request_counter(agent_id, metrics.total_requests);
                let _ = self
                    .state
                    .pipeline
                    .ingest_metrics(agent_id, &metrics, rps, Utc::now());
            }
        }
    }

    fn close(self) {
        match self.agent_id.as_deref() {
            Some(agent_id) => {
                self.state.registry.disconnect(agent_id, &self.stream);
            }
            None => debug!("하트비트 없이 연결 종료"),
        }
    }
}

/// 종료 신호 대기 (서버 밖에서 라우터만 쓸 때는 영원히 대기)
async fn wait_for_shutdown(shutdown_rx: Option<watch::Receiver<bool>>) {
    let Some(mut shutdown_rx) = shutdown_rx else {
        return std::future::pending().await;
    };
    loop {
        if *shutdown_rx.borrow() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use fleetgate_core::models::agent::AgentStatus;
    use fleetgate_core::models::protocol::CommandPayload;
    use fleetgate_core::models::telemetry::TelemetryKind;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn serve(state: AppState) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = crate::stream_router(state);
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        addr
    }

    fn text(json: serde_json::Value) -> WsMessage {
        WsMessage::Text(json.to_string().into())
    }

    fn heartbeat(agent_id: &str) -> WsMessage {
        text(serde_json::json!({
            "agent_id": agent_id,
            "payload": {
                "type": "heartbeat",
                "hostname": "web-7d9f8-abcd1",
                "version": "1.25.3",
                "uptime": 42.0
            }
        }))
    }

    fn log_entry(agent_id: &str, uri: &str) -> WsMessage {
        text(serde_json::json!({
            "agent_id": agent_id,
            "payload": {
                "type": "log_entry",
                "remote_addr": "203.0.113.5",
                "request_method": "GET",
                "request_uri": uri,
                "status": 200,
                "request_time": 0.05,
                "request_id": "req-1"
            }
        }))
    }

    fn queue_len(state: &AppState, kind: TelemetryKind) -> usize {
        state
            .pipeline
            .queue_status()
            .into_iter()
            .find(|q| q.kind == kind)
            .map(|q| q.len)
            .unwrap_or(0)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("조건이 충족되지 않음");
    }

    #[tokio::test]
    async fn stream_registers_ingests_and_goes_offline() {
        let (state, _store) = test_support::state();
        let addr = serve(state.clone()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/agent/connect"))
            .await
            .unwrap();

        // 하트비트 전 로그는 무시된다
        ws.send(log_entry("a1", "/early")).await.unwrap();
        ws.send(heartbeat("a1")).await.unwrap();
        ws.send(log_entry("a1", "/orders")).await.unwrap();
        ws.send(text(serde_json::json!({
            "agent_id": "a1",
            "payload": {
                "type": "metrics",
                "active_connections": 3,
                "total_requests": 100,
                "system": { "cpu_usage_percent": 12.5 }
            }
        })))
        .await
        .unwrap();

        eventually(|| state.pipeline.stats().messages_total() == 4).await;
        let session = state.registry.get("a1").unwrap();
        assert_eq!(session.status(), AgentStatus::Online);
        let record = session.snapshot();
        assert_eq!(record.ip, "127.0.0.1");
        assert!(record.is_pod);
        assert_eq!(record.uptime, "42.0s");

        assert_eq!(queue_len(&state, TelemetryKind::Log), 1);
        assert_eq!(queue_len(&state, TelemetryKind::Proxy), 1);
        assert_eq!(queue_len(&state, TelemetryKind::System), 1);
        assert_eq!(state.analytics.fallback().total_requests(), 1);

        ws.close(None).await.unwrap();
        eventually(|| state.registry.get("a1").is_some_and(|s| !s.is_online())).await;
    }

    #[tokio::test]
    async fn commands_reach_the_agent() {
        let (state, _store) = test_support::state();
        let addr = serve(state.clone()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/agent/connect"))
            .await
            .unwrap();
        ws.send(heartbeat("a1")).await.unwrap();
        eventually(|| state.registry.get("a1").is_some_and(|s| s.is_online())).await;

        let command = ServerCommand {
            command_id: "upd-1".to_string(),
            payload: CommandPayload::Update {
                version: "latest".to_string(),
                update_url: "http://gw/updates".to_string(),
            },
        };
        state.registry.send_command("a1", command.clone()).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let received: ServerCommand = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(received, command);
    }

    #[tokio::test]
    async fn malformed_frame_closes_connection() {
        let (state, _store) = test_support::state();
        let addr = serve(state.clone()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/agent/connect"))
            .await
            .unwrap();
        ws.send(heartbeat("a1")).await.unwrap();
        ws.send(WsMessage::Text("{not json".into())).await.unwrap();

        eventually(|| state.registry.get("a1").is_some_and(|s| !s.is_online())).await;
    }

    #[tokio::test]
    async fn stale_connection_close_keeps_reconnected_session_online() {
        let (state, _store) = test_support::state();
        let addr = serve(state.clone()).await;
        let url = format!("ws://{addr}/agent/connect");

        let (mut first, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        first.send(heartbeat("a1")).await.unwrap();
        eventually(|| state.pipeline.stats().messages_total() == 1).await;

        let (mut second, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        second.send(heartbeat("a1")).await.unwrap();
        eventually(|| state.pipeline.stats().messages_total() == 2).await;

        first.close(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(state.registry.get("a1").unwrap().is_online());

        second.close(None).await.unwrap();
        eventually(|| state.registry.get("a1").is_some_and(|s| !s.is_online())).await;
    }
}
