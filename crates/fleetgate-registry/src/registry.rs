//! 세션 레지스트리.
//!
//! 에이전트 ID → 세션의 샤드 맵. 전역 잠금 없이 세션 단위로 갱신하며,
//! 모든 상태 변경은 [`PersistenceDispatcher`]로 비동기 영속화된다.

use chrono::Utc;
use dashmap::DashMap;
use fleetgate_core::error::CoreError;
use fleetgate_core::models::agent::{AgentRecord, AgentStatus, Heartbeat, StatusCounts};
use fleetgate_core::models::protocol::ServerCommand;
use fleetgate_core::models::telemetry::LogEntry;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::heartbeat::peer_ip;
use crate::persistence::PersistenceDispatcher;
use crate::session::{AgentSession, CommandSender, LogSubscription, SessionRef};

/// 에이전트 세션 레지스트리
pub struct SessionRegistry {
    sessions: DashMap<String, SessionRef>,
    persistence: PersistenceDispatcher,
    log_buffer: usize,
}

impl SessionRegistry {
    /// 새 레지스트리 생성
    pub fn new(persistence: PersistenceDispatcher, log_buffer: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            persistence,
            log_buffer,
        }
    }

    /// 저장소에서 읽은 레코드로 초기화
    ///
    /// 복원된 세션은 모두 오프라인으로 시작하며, 강등된 레코드는 다시 영속화된다.
    /// 이미 존재하는 세션은 덮어쓰지 않는다.
    pub fn hydrate(&self, records: Vec<AgentRecord>) -> usize {
        let mut restored = 0;
        for record in records {
            let agent_id = record.agent_id.clone();
            if self.sessions.contains_key(&agent_id) {
                continue;
            }
            let session = Arc::new(AgentSession::from_record(record));
            if let Some(demoted) = session.demote_restored() {
                self.persistence.upsert(demoted);
            }
            self.sessions.insert(agent_id, session);
            restored += 1;
        }
        info!("에이전트 세션 복원: {restored}개");
        restored
    }

    /// 하트비트 수신 시 세션 생성/갱신
    pub fn upsert_on_heartbeat(
        &self,
        agent_id: &str,
        heartbeat: &Heartbeat,
        peer: Option<SocketAddr>,
        stream: CommandSender,
    ) -> SessionRef {
        let session = self
            .sessions
            .entry(agent_id.to_string())
            .or_insert_with(|| {
                info!("새 에이전트 등록: {agent_id}");
                Arc::new(AgentSession::from_record(AgentRecord::new(agent_id)))
            })
            .clone();

        let snapshot = session.apply_heartbeat(heartbeat, peer_ip(peer), stream, Utc::now());
        debug!(
            "하트비트: {agent_id} (host={}, version={})",
            snapshot.hostname, snapshot.version
        );
        self.persistence.upsert(snapshot);
        session
    }

    /// 세션 오프라인 전환 (이미 오프라인이면 false)
    pub fn mark_offline(&self, agent_id: &str) -> bool {
        let Some(session) = self.get(agent_id) else {
            return false;
        };
        match session.mark_offline(Utc::now()) {
            Some(snapshot) => {
                info!("에이전트 연결 종료, 오프라인 전환: {agent_id}");
                self.persistence.upsert(snapshot);
                true
            }
            None => false,
        }
    }

    /// 연결 종료 처리. `stream`이 세션의 현재 스트림일 때만 오프라인 전환.
    pub fn disconnect(&self, agent_id: &str, stream: &CommandSender) -> bool {
        let Some(session) = self.get(agent_id) else {
            return false;
        };
        match session.release_stream(stream, Utc::now()) {
            Some(snapshot) => {
                info!("에이전트 연결 종료, 오프라인 전환: {agent_id}");
                self.persistence.upsert(snapshot);
                true
            }
            None => {
                debug!("이전 연결 종료 무시 (재연결됨): {agent_id}");
                false
            }
        }
    }

    /// 세션 조회
    pub fn get(&self, agent_id: &str) -> Option<SessionRef> {
        self.sessions.get(agent_id).map(|entry| entry.value().clone())
    }

    /// 전체 세션 (ID 순)
    pub fn list_all(&self) -> Vec<SessionRef> {
        let mut sessions: Vec<SessionRef> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| a.id().cmp(b.id()));
        sessions
    }

    /// 세션 삭제 및 저장소 레코드 삭제 요청
    pub fn remove(&self, agent_id: &str) -> Option<SessionRef> {
        let (_, session) = self.sessions.remove(agent_id)?;
        self.persistence.remove(agent_id);
        info!("에이전트 인벤토리에서 수동 삭제: {agent_id}");
        Some(session)
    }

    /// 저장소에서 이미 정리된 오프라인 세션을 메모리에서만 제거
    ///
    /// 그 사이 재연결된 세션은 유지한다.
    pub fn evict_offline(&self, agent_id: &str) -> bool {
        self.sessions
            .remove_if(agent_id, |_, session| !session.is_online())
            .is_some()
    }

    /// 온라인 세션 수
    pub fn online_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_online())
            .count()
    }

    /// 상태별 세션 수
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.sessions.iter() {
            match entry.value().status() {
                AgentStatus::Online => counts.online += 1,
                AgentStatus::Offline => counts.offline += 1,
            }
        }
        counts
    }

    /// 전체 세션 수
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// 세션이 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // ============================================================
    // 로그 구독 / 명령
    // ============================================================

    /// 실시간 로그 구독 (에이전트가 온라인이어야 함)
    pub fn subscribe_logs(&self, agent_id: &str) -> Result<LogSubscription, CoreError> {
        let session = self.require_online(agent_id)?;
        let subscription = session.add_log_subscriber(self.log_buffer);
        debug!("로그 구독 시작: {agent_id} ({})", subscription.id());
        Ok(subscription)
    }

    /// 로그 구독 해제 (없으면 false)
    pub fn unsubscribe_logs(&self, agent_id: &str, subscription_id: &str) -> bool {
        self.get(agent_id)
            .is_some_and(|session| session.remove_log_subscriber(subscription_id))
    }

    /// 에이전트 로그를 구독자에게 전달
    pub fn publish_log(&self, agent_id: &str, entry: &LogEntry) -> usize {
        self.get(agent_id)
            .map(|session| session.publish_log(entry))
            .unwrap_or(0)
    }

    /// 에이전트에 명령 전송
    pub async fn send_command(&self, agent_id: &str, command: ServerCommand) -> Result<(), CoreError> {
        let session = self.require_online(agent_id)?;
        let sender = session
            .command_sender()
            .ok_or_else(|| CoreError::Network(format!("에이전트 스트림 없음: {agent_id}")))?;

        let command_id = command.command_id.clone();
        sender
            .send(command)
            .await
            .map_err(|_| CoreError::Network(format!("에이전트 스트림 닫힘: {agent_id}")))?;
        debug!("명령 전송: {agent_id} ({command_id})");
        Ok(())
    }

    /// 누적 요청 카운터 기록 후 초당 요청 수 반환 (세션 없으면 0)
    pub fn record_request_counter(&self, agent_id: &str, total: u64) -> f64 {
        self.get(agent_id)
            .map(|session| session.record_request_total(total, Utc::now()))
            .unwrap_or(0.0)
    }

    fn require_online(&self, agent_id: &str) -> Result<SessionRef, CoreError> {
        let session = self.get(agent_id).ok_or_else(|| CoreError::NotFound {
            resource_type: "Agent".to_string(),
            id: agent_id.to_string(),
        })?;
        if !session.is_online() {
            return Err(CoreError::Network(format!("에이전트 오프라인: {agent_id}")));
        }
        Ok(session)
    }
}
