//! 게이트웨이 자체 메트릭 수집기.
//!
//! 주기마다 처리량(eps), 온라인 세션 수, 프로세스 CPU/메모리, 살아있는 태스크 수,
//! 평균 저장소 쓰기 지연을 모아 게이트웨이 큐에 넣는다.

use chrono::Utc;
use fleetgate_core::models::telemetry::{GatewayMetricItem, TelemetryKind};
use fleetgate_registry::SessionRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::pipeline::IngestPipeline;

/// 게이트웨이 ID 결정: `GATEWAY_ID` 환경변수 → 설정값 → 호스트명
pub fn resolve_gateway_id(configured: &str) -> String {
    choose_gateway_id(
        std::env::var("GATEWAY_ID").ok().as_deref(),
        configured,
        System::host_name(),
    )
}

/// 공백뿐인 값은 비어 있는 것으로 본다
fn choose_gateway_id(env: Option<&str>, configured: &str, host: Option<String>) -> String {
    [env.unwrap_or_default(), configured]
        .into_iter()
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(str::to_string)
        .or(host)
        .unwrap_or_else(|| "fleetgate".to_string())
}

/// 자체 메트릭 수집기
pub struct GatewayMonitor {
    gateway_id: String,
    interval: Duration,
    pipeline: Arc<IngestPipeline>,
    registry: Arc<SessionRegistry>,
    sys: System,
    pid: Pid,
    last_dropped: BTreeMap<TelemetryKind, u64>,
}

impl GatewayMonitor {
    /// 새 수집기 생성
    pub fn new(
        gateway_id: String,
        interval: Duration,
        pipeline: Arc<IngestPipeline>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        Self {
            gateway_id,
            interval: interval.max(Duration::from_secs(1)),
            pipeline,
            registry,
            sys,
            pid,
            last_dropped: BTreeMap::new(),
        }
    }

    /// 수집 루프
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "게이트웨이 자체 메트릭 수집 시작: {} ({}초 주기)",
            self.gateway_id,
            self.interval.as_secs()
        );
        let mut interval = tokio::time::interval(self.interval);
        // 첫 틱은 즉시 발생하므로 건너뛴다
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let item = self.collect();
                    debug!(
                        "게이트웨이 메트릭: eps={:.1}, 연결={}, 태스크={}, DB 지연={:.2}ms",
                        item.eps, item.active_connections, item.task_count, item.db_latency_ms
                    );
                    if let Err(e) = self.pipeline.ingest_gateway(item) {
                        warn!("게이트웨이 메트릭 폐기: {e}");
                    }
                    self.report_drops();
                }
                _ = shutdown_rx.changed() => {
                    info!("게이트웨이 자체 메트릭 수집 종료");
                    break;
                }
            }
        }
    }

    /// 메트릭 한 건 수집 (구간 카운터 소비)
    pub fn collect(&mut self) -> GatewayMetricItem {
        let window = self.pipeline.stats().take_window();

        self.sys
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let (cpu_usage, memory_mb) = match self.sys.process(self.pid) {
            Some(process) => (
                f64::from(process.cpu_usage()),
                process.memory() as f64 / 1024.0 / 1024.0,
            ),
            None => (0.0, 0.0),
        };

        let task_count = tokio::runtime::Handle::try_current()
            .map(|handle| handle.metrics().num_alive_tasks() as u64)
            .unwrap_or(0);

        GatewayMetricItem {
            gateway_id: self.gateway_id.clone(),
            timestamp: Utc::now(),
            eps: window.messages as f64 / self.interval.as_secs_f64(),
            active_connections: self.registry.online_count() as u64,
            cpu_usage,
            memory_mb,
            task_count,
            db_latency_ms: window.mean_store_latency_ms(),
        }
    }

    /// 직전 틱 이후 늘어난 큐 폐기 수 경고
    fn report_drops(&mut self) {
        for status in self.pipeline.queue_status() {
            let previous = self.last_dropped.insert(status.kind, status.dropped).unwrap_or(0);
            let delta = status.dropped.saturating_sub(previous);
            if delta > 0 {
                warn!("{} 큐 포화로 {delta}개 폐기 (누적 {})", status.kind, status.dropped);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoResolver;
    use crate::stats::IngestStats;
    use fleetgate_core::config::IngestConfig;
    use fleetgate_core::models::agent::Heartbeat;
    use fleetgate_registry::PersistenceDispatcher;
    use tokio::sync::mpsc;

    fn fixture() -> (Arc<IngestPipeline>, Arc<SessionRegistry>) {
        let pipeline = Arc::new(IngestPipeline::new(
            IngestConfig::default(),
            GeoResolver::new(),
            Arc::new(IngestStats::new()),
        ));
        let (dispatcher, _rx) = PersistenceDispatcher::channel(256);
        (pipeline, Arc::new(SessionRegistry::new(dispatcher, 100)))
    }

    #[test]
    fn env_gateway_id_wins_over_config() {
        let host = || Some("host-a".to_string());
        assert_eq!(choose_gateway_id(Some(" gw-env "), "gw-cfg", host()), "gw-env");
        assert_eq!(choose_gateway_id(Some("  "), " gw-cfg ", host()), "gw-cfg");
        assert_eq!(choose_gateway_id(None, "gw-cfg", host()), "gw-cfg");
        assert_eq!(choose_gateway_id(None, "", host()), "host-a");
        assert_eq!(choose_gateway_id(None, "", None), "fleetgate");
        assert!(!resolve_gateway_id("").is_empty());
    }

    #[tokio::test]
    async fn collect_computes_eps_and_connections() {
        let (pipeline, registry) = fixture();
        let (tx, _cmd_rx) = mpsc::channel(1);
        registry.upsert_on_heartbeat("a1", &Heartbeat::default(), None, tx);

        for _ in 0..50 {
            pipeline.stats().record_message();
        }
        pipeline.stats().record_store_op(Duration::from_millis(3));

        let mut monitor = GatewayMonitor::new(
            "gw".to_string(),
            Duration::from_secs(10),
            pipeline.clone(),
            registry,
        );
        let item = monitor.collect();
        assert_eq!(item.gateway_id, "gw");
        assert!((item.eps - 5.0).abs() < 1e-9);
        assert_eq!(item.active_connections, 1);
        assert!((item.db_latency_ms - 3.0).abs() < 1e-6);
        assert!(item.memory_mb >= 0.0);

        // 구간 카운터는 소비됨
        assert_eq!(monitor.collect().eps, 0.0);
    }
}
