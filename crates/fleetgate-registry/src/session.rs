//! 에이전트 세션.
//!
//! 세션마다 자체 `parking_lot::Mutex`를 가지며, 잠금은 필드 갱신 동안만 유지한다.
//! 저장소 쓰기나 스트림 전송은 잠금 밖에서 수행된다.

use chrono::{DateTime, Utc};
use fleetgate_core::models::agent::{AgentRecord, AgentStatus, Heartbeat};
use fleetgate_core::models::protocol::ServerCommand;
use fleetgate_core::models::telemetry::LogEntry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::heartbeat::{format_uptime, infer_pod, resolve_versions};

/// 에이전트로 명령을 보내는 스트림 핸들
pub type CommandSender = mpsc::Sender<ServerCommand>;

/// 공유 세션 참조
pub type SessionRef = Arc<AgentSession>;

/// 누적 요청 카운터 샘플
#[derive(Debug, Clone, Copy)]
struct RequestSample {
    total: u64,
    at: DateTime<Utc>,
}

struct SessionState {
    record: AgentRecord,
    stream: Option<CommandSender>,
    log_subscribers: HashMap<String, mpsc::Sender<LogEntry>>,
    last_request_sample: Option<RequestSample>,
}

/// 연결된 (또는 알려진) 에이전트 하나
pub struct AgentSession {
    id: String,
    state: Mutex<SessionState>,
}

impl AgentSession {
    /// 레코드로부터 세션 생성 (스트림 없음)
    pub fn from_record(record: AgentRecord) -> Self {
        Self {
            id: record.agent_id.clone(),
            state: Mutex::new(SessionState {
                record,
                stream: None,
                log_subscribers: HashMap::new(),
                last_request_sample: None,
            }),
        }
    }

    /// 에이전트 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 현재 필드 스냅샷
    pub fn snapshot(&self) -> AgentRecord {
        self.state.lock().record.clone()
    }

    /// 연결 상태
    pub fn status(&self) -> AgentStatus {
        self.state.lock().record.status
    }

    /// 온라인 여부
    pub fn is_online(&self) -> bool {
        self.status() == AgentStatus::Online
    }

    /// 명령 스트림 핸들 (온라인일 때만)
    pub fn command_sender(&self) -> Option<CommandSender> {
        let state = self.state.lock();
        match state.record.status {
            AgentStatus::Online => state.stream.clone(),
            AgentStatus::Offline => None,
        }
    }

    /// 하트비트 반영 후 영속화용 스냅샷 반환
    pub(crate) fn apply_heartbeat(
        &self,
        hb: &Heartbeat,
        ip: String,
        stream: CommandSender,
        now: DateTime<Utc>,
    ) -> AgentRecord {
        let versions = resolve_versions(hb);
        let is_pod = infer_pod(&hb.hostname, hb.is_pod);

        let mut state = self.state.lock();
        let record = &mut state.record;
        record.hostname = hb.hostname.clone();
        record.version = versions.proxy;
        record.agent_version = versions.agent;
        record.build_date = hb.build_date.clone();
        record.git_commit = hb.git_commit.clone();
        record.git_branch = hb.git_branch.clone();
        record.instances_count = hb.instances.len() as u32;
        record.uptime = format_uptime(hb.uptime);
        record.ip = ip;
        record.is_pod = is_pod;
        record.pod_ip = hb.pod_ip.clone();
        record.status = AgentStatus::Online;
        record.last_seen = now;
        let snapshot = record.clone();
        state.stream = Some(stream);
        snapshot
    }

    /// 오프라인 전환. 이미 오프라인이면 `None`.
    ///
    /// 스트림과 로그 구독자를 해제한다 (구독자 수신 측은 채널 종료를 관찰).
    pub(crate) fn mark_offline(&self, now: DateTime<Utc>) -> Option<AgentRecord> {
        let mut state = self.state.lock();
        if state.record.status == AgentStatus::Offline && state.stream.is_none() {
            return None;
        }
        state.record.status = AgentStatus::Offline;
        state.record.last_seen = now;
        state.stream = None;
        state.log_subscribers.clear();
        state.last_request_sample = None;
        Some(state.record.clone())
    }

    /// 주어진 스트림이 현재 스트림일 때만 오프라인 전환
    ///
    /// 재연결 이후 이전 연결의 종료가 새 연결을 끊지 않도록 한다.
    pub(crate) fn release_stream(
        &self,
        stream: &CommandSender,
        now: DateTime<Utc>,
    ) -> Option<AgentRecord> {
        let is_current = {
            let state = self.state.lock();
            state
                .stream
                .as_ref()
                .is_some_and(|current| current.same_channel(stream))
        };
        if is_current {
            self.mark_offline(now)
        } else {
            None
        }
    }

    /// 저장소에서 복원된 세션을 오프라인으로 강등. 변경되었으면 스냅샷 반환.
    pub(crate) fn demote_restored(&self) -> Option<AgentRecord> {
        let mut state = self.state.lock();
        if state.record.status == AgentStatus::Online {
            state.record.status = AgentStatus::Offline;
            Some(state.record.clone())
        } else {
            None
        }
    }

    // ============================================================
    // 로그 구독
    // ============================================================

    /// 로그 구독자 등록
    pub(crate) fn add_log_subscriber(self: &Arc<Self>, buffer: usize) -> LogSubscription {
        let subscription_id = uuid::Uuid::new_v4().simple().to_string();
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.state
            .lock()
            .log_subscribers
            .insert(subscription_id.clone(), tx);
        LogSubscription {
            id: subscription_id,
            session: Arc::downgrade(self),
            rx,
        }
    }

    /// 로그 구독자 해제 (없으면 false)
    pub fn remove_log_subscriber(&self, subscription_id: &str) -> bool {
        self.state
            .lock()
            .log_subscribers
            .remove(subscription_id)
            .is_some()
    }

    /// 구독자 수
    pub fn log_subscriber_count(&self) -> usize {
        self.state.lock().log_subscribers.len()
    }

    /// 로그 한 줄을 모든 구독자에게 비차단 전달. 전달된 구독자 수 반환.
    ///
    /// 버퍼가 가득 찬 구독자는 이번 항목을 건너뛰고, 닫힌 구독자는 제거된다.
    pub fn publish_log(&self, entry: &LogEntry) -> usize {
        let mut state = self.state.lock();
        if state.log_subscribers.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        state
            .log_subscribers
            .retain(|id, tx| match tx.try_send(entry.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    debug!("로그 구독자 버퍼 포화, 항목 건너뜀: {id}");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        delivered
    }

    // ============================================================
    // 요청 카운터
    // ============================================================

    /// 누적 요청 카운터 샘플 기록 후 초당 요청 수 반환
    ///
    /// 첫 샘플, 카운터 리셋(감소), 경과 시간 0이면 0.
    pub fn record_request_total(&self, total: u64, now: DateTime<Utc>) -> f64 {
        let mut state = self.state.lock();
        let previous = state.last_request_sample.replace(RequestSample { total, at: now });
        let Some(prev) = previous else {
            return 0.0;
        };

        let elapsed = (now - prev.at).num_milliseconds() as f64 / 1000.0;
        if total < prev.total || elapsed <= 0.0 {
            return 0.0;
        }
        (total - prev.total) as f64 / elapsed
    }
}

/// 실시간 로그 구독. drop 시 구독자 목록에서 자동 해제된다.
pub struct LogSubscription {
    id: String,
    session: Weak<AgentSession>,
    rx: mpsc::Receiver<LogEntry>,
}

impl LogSubscription {
    /// 구독 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 다음 로그 수신. 세션이 오프라인이 되거나 해제되면 `None`.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.rx.recv().await
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            session.remove_log_subscriber(&self.id);
        }
    }
}
