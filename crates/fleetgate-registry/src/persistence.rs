//! 세션 변경 영속화 디스패처.
//!
//! 스트림 처리 경로는 바운디드 채널에 작업만 넣고 즉시 반환한다. 채널이 가득 차면
//! 작업을 폐기하고 경고한다. 단일 백그라운드 태스크가 순서대로 메타데이터 저장소에
//! 반영하며, 실패는 경고 로그만 남기고 재시도하지 않는다.

use fleetgate_core::models::agent::AgentRecord;
use fleetgate_core::ports::metadata_store::AgentStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 영속화 작업
#[derive(Debug, Clone)]
pub enum PersistOp {
    /// 레코드 삽입/갱신
    Upsert(AgentRecord),
    /// 레코드 삭제
    Remove(String),
}

/// 영속화 작업 송신 핸들
#[derive(Clone)]
pub struct PersistenceDispatcher {
    tx: mpsc::Sender<PersistOp>,
    dropped: Arc<AtomicU64>,
}

impl PersistenceDispatcher {
    /// 워커 태스크를 시작하고 송신 핸들 반환
    ///
    /// 모든 핸들이 drop되면 남은 작업을 처리한 뒤 워커가 종료된다.
    pub fn spawn(store: Arc<dyn AgentStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (dispatcher, rx) = Self::channel(capacity);
        let handle = tokio::spawn(run_worker(store, rx));
        (dispatcher, handle)
    }

    /// 외부 수신자를 가진 디스패처 (테스트/수동 배선용, 용량 0은 1로 보정)
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PersistOp>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dispatcher = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (dispatcher, rx)
    }

    /// 대기열 초과로 폐기된 누적 작업 수
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 레코드 갱신 요청
    pub fn upsert(&self, record: AgentRecord) {
        self.dispatch(PersistOp::Upsert(record));
    }

    /// 레코드 삭제 요청
    pub fn remove(&self, agent_id: &str) {
        self.dispatch(PersistOp::Remove(agent_id.to_string()));
    }

    fn dispatch(&self, op: PersistOp) {
        match self.tx.try_send(op) {
            Ok(()) => {}
            Err(TrySendError::Full(op)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("영속화 대기열 가득 참, 작업 폐기 (누적 {total}건): {op:?}");
            }
            Err(TrySendError::Closed(_)) => warn!("영속화 워커 종료됨, 작업 폐기"),
        }
    }
}

async fn run_worker(store: Arc<dyn AgentStore>, mut rx: mpsc::Receiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            PersistOp::Upsert(record) => {
                if let Err(e) = store.upsert_agent(&record).await {
                    warn!("에이전트 상태 저장 실패 ({}): {e}", record.agent_id);
                }
            }
            PersistOp::Remove(agent_id) => match store.remove_agent(&agent_id).await {
                Ok(true) => debug!("에이전트 레코드 삭제: {agent_id}"),
                Ok(false) => debug!("삭제할 에이전트 레코드 없음: {agent_id}"),
                Err(e) => warn!("에이전트 레코드 삭제 실패 ({agent_id}): {e}"),
            },
        }
    }
    debug!("영속화 워커 종료");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use fleetgate_core::error::CoreError;
    use fleetgate_core::models::agent::AgentStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        ops: Mutex<Vec<String>>,
        fail_upserts: bool,
    }

    #[async_trait]
    impl AgentStore for RecordingStore {
        async fn upsert_agent(&self, record: &AgentRecord) -> Result<(), CoreError> {
            self.ops
                .lock()
                .unwrap()
                .push(format!("upsert:{}:{}", record.agent_id, record.status));
            if self.fail_upserts {
                return Err(CoreError::Storage("disk full".to_string()));
            }
            Ok(())
        }

        async fn update_status(
            &self,
            _agent_id: &str,
            _status: AgentStatus,
            _last_seen: DateTime<Utc>,
        ) -> Result<(), CoreError> {
            Ok(())
        }

        async fn remove_agent(&self, agent_id: &str) -> Result<bool, CoreError> {
            self.ops.lock().unwrap().push(format!("remove:{agent_id}"));
            Ok(true)
        }

        async fn load_all(&self) -> Result<Vec<AgentRecord>, CoreError> {
            Ok(Vec::new())
        }

        async fn prune_stale(&self, _cutoff: DateTime<Utc>) -> Result<Vec<String>, CoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn applies_ops_in_order() {
        let store = Arc::new(RecordingStore::default());
        let (dispatcher, handle) = PersistenceDispatcher::spawn(store.clone(), 16);

        let mut online = AgentRecord::new("a1");
        online.status = AgentStatus::Online;
        dispatcher.upsert(online);
        dispatcher.upsert(AgentRecord::new("a1"));
        dispatcher.remove("a1");
        drop(dispatcher);
        handle.await.unwrap();

        let ops = store.ops.lock().unwrap().clone();
        assert_eq!(ops, vec!["upsert:a1:online", "upsert:a1:offline", "remove:a1"]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_worker() {
        let store = Arc::new(RecordingStore {
            fail_upserts: true,
            ..Default::default()
        });
        let (dispatcher, handle) = PersistenceDispatcher::spawn(store.clone(), 16);
        dispatcher.upsert(AgentRecord::new("a1"));
        dispatcher.upsert(AgentRecord::new("a2"));
        drop(dispatcher);
        handle.await.unwrap();
        assert_eq!(store.ops.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn channel_dispatcher_exposes_ops() {
        let (dispatcher, mut rx) = PersistenceDispatcher::channel(4);
        dispatcher.remove("gone");
        match rx.recv().await {
            Some(PersistOp::Remove(id)) => assert_eq!(id, "gone"),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (dispatcher, mut rx) = PersistenceDispatcher::channel(2);
        dispatcher.upsert(AgentRecord::new("a1"));
        dispatcher.upsert(AgentRecord::new("a2"));
        dispatcher.upsert(AgentRecord::new("a3"));
        dispatcher.remove("a4");
        assert_eq!(dispatcher.dropped(), 2);

        let mut kept = Vec::new();
        while let Ok(op) = rx.try_recv() {
            kept.push(op);
        }
        assert_eq!(kept.len(), 2);
        assert!(matches!(&kept[0], PersistOp::Upsert(r) if r.agent_id == "a1"));

        // 여유가 생기면 다시 수락
        dispatcher.remove("a5");
        assert!(matches!(rx.try_recv(), Ok(PersistOp::Remove(id)) if id == "a5"));
        assert_eq!(dispatcher.dropped(), 2);
    }
}
