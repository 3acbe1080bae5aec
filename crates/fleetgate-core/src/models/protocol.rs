//! 에이전트 스트림 프로토콜.
//!
//! WebSocket JSON 텍스트 프레임으로 교환되는 태그 유니온.
//! 에이전트 → 게이트웨이: [`AgentMessage`], 게이트웨이 → 에이전트: [`ServerCommand`].

use serde::{Deserialize, Serialize};

use super::agent::Heartbeat;
use super::telemetry::{LogEntry, ProxyMetrics};

/// 에이전트 → 게이트웨이 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// 발신 에이전트 ID
    pub agent_id: String,
    /// 페이로드
    pub payload: AgentPayload,
}

/// 에이전트 메시지 페이로드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentPayload {
    /// 상태/식별 하트비트
    Heartbeat(Heartbeat),
    /// 액세스 로그 한 줄
    LogEntry(LogEntry),
    /// 프록시 메트릭
    Metrics(ProxyMetrics),
}

/// 게이트웨이 → 에이전트 명령
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCommand {
    /// 명령 ID
    pub command_id: String,
    /// 페이로드
    pub payload: CommandPayload,
}

/// 명령 페이로드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    /// 로그 스트리밍 요청
    LogRequest(LogRequest),
    /// 원격 업데이트
    Update {
        /// 대상 버전
        version: String,
        /// 업데이트 다운로드 URL
        update_url: String,
    },
}

/// 로그 스트리밍 요청
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRequest {
    /// 대상 에이전트 ID
    pub instance_id: String,
    /// 로그 종류 ("access", "error")
    pub log_type: String,
    /// tail 줄 수
    pub tail_lines: u32,
    /// 계속 수신 여부
    pub follow: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_command_wire_format() {
        let cmd = ServerCommand {
            command_id: "upd-1".to_string(),
            payload: CommandPayload::Update {
                version: "latest".to_string(),
                update_url: "http://gw:5021/updates".to_string(),
            },
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["payload"]["type"], "update");
        assert_eq!(value["payload"]["update_url"], "http://gw:5021/updates");
    }

    #[test]
    fn log_entry_payload_tag() {
        let json = r#"{"agent_id":"a","payload":{"type":"log_entry","status":404,"request_uri":"/x"}}"#;
        let msg: AgentMessage = serde_json::from_str(json).unwrap();
        match msg.payload {
            AgentPayload::LogEntry(entry) => {
                assert_eq!(entry.status, 404);
                assert_eq!(entry.request_uri, "/x");
            }
            other => panic!("예상치 못한 페이로드: {other:?}"),
        }
    }

    #[test]
    fn unknown_payload_type_rejected() {
        let json = r#"{"agent_id":"a","payload":{"type":"bogus"}}"#;
        assert!(serde_json::from_str::<AgentMessage>(json).is_err());
    }
}
