//! 오래된 오프라인 에이전트와 보존 기간 초과 텔레메트리 정리.
//!
//! 주기마다 메타데이터 저장소에서 보존 기간을 넘긴 오프라인 에이전트를 지우고,
//! 해당 에이전트의 텔레메트리와 메모리 세션을 함께 제거한 뒤 TTL 정리를 실행한다.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fleetgate_core::config::{AgentsConfig, RetentionPolicy};
use fleetgate_core::error::CoreError;
use fleetgate_core::ports::metadata_store::AgentStore;
use fleetgate_core::ports::telemetry_store::TelemetryStore;
use fleetgate_registry::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 정리 1회 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneSummary {
    /// 삭제된 에이전트 ID
    pub agents: Vec<String>,
    /// 에이전트 삭제로 지운 텔레메트리 행
    pub agent_rows: usize,
    /// TTL 초과로 지운 행
    pub expired_rows: usize,
}

/// 정리 스케줄러
pub struct Pruner {
    agents: Arc<dyn AgentStore>,
    telemetry: Arc<dyn TelemetryStore>,
    registry: Arc<SessionRegistry>,
    offline_retention: Duration,
    retention: RetentionPolicy,
    interval: Duration,
}

impl Pruner {
    /// 새 스케줄러 생성
    pub fn new(
        agents: Arc<dyn AgentStore>,
        telemetry: Arc<dyn TelemetryStore>,
        registry: Arc<SessionRegistry>,
        config: &AgentsConfig,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            agents,
            telemetry,
            registry,
            offline_retention: config.offline_retention(),
            retention,
            interval: config.prune_interval(),
        }
    }

    /// 정리 루프 (시작 직후 한 번, 이후 주기마다)
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("정리 스케줄러 시작: 주기 {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.prune_once(Utc::now()).await {
                        warn!("정리 실패: {e}");
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("정리 스케줄러 종료");
                    break;
                }
            }
        }
    }

    /// 정리 1회 실행
    ///
    /// 에이전트 정리가 실패해도 TTL 정리는 계속 진행한다.
    pub async fn prune_once(&self, now: DateTime<Utc>) -> Result<PruneSummary, CoreError> {
        let mut summary = PruneSummary::default();

        let retention =
            ChronoDuration::from_std(self.offline_retention).unwrap_or(ChronoDuration::MAX);
        let cutoff = now
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        match self.agents.prune_stale(cutoff).await {
            Ok(ids) => {
                for id in &ids {
                    match self.telemetry.delete_agent_data(id).await {
                        Ok(rows) => summary.agent_rows += rows,
                        Err(e) => warn!("에이전트 {id} 텔레메트리 삭제 실패: {e}"),
                    }
                    // 정리 사이에 재연결했다면 온라인 세션은 남는다
                    if !self.registry.evict_offline(id) {
                        debug!("에이전트 {id} 세션 유지 (온라인 또는 없음)");
                    }
                }
                summary.agents = ids;
            }
            Err(e) => warn!("오프라인 에이전트 정리 실패: {e}"),
        }

        let report = self.telemetry.purge_expired(now, &self.retention).await?;
        summary.expired_rows = report.total();

        if summary.agents.is_empty() && summary.expired_rows == 0 {
            debug!("정리할 항목 없음");
        } else {
            info!(
                "정리 완료: 에이전트 {}개 (텔레메트리 {}행), 만료 {}행",
                summary.agents.len(),
                summary.agent_rows,
                summary.expired_rows
            );
        }
        Ok(summary)
    }
}
