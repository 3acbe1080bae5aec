//! 수집 파이프라인.
//!
//! 에이전트 메시지를 다섯 종류의 텔레메트리 항목으로 바꿔 종류별 큐에 넣는다.
//! 로그 보강(클라이언트 IP → 지오)과 스팬 파생은 큐 투입 전에 동기적으로 수행된다.

use chrono::{DateTime, TimeZone, Utc};
use fleetgate_core::config::{IngestConfig, QueueConfig};
use fleetgate_core::error::CoreError;
use fleetgate_core::models::telemetry::{
    GatewayMetricItem, LogEntry, LogItem, ProxyMetricItem, ProxyMetrics, SpanItem,
    SystemMetricItem, TelemetryKind,
};
use fleetgate_core::ports::telemetry_store::TelemetryStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::flusher::{Flusher, StoreBatch};
use crate::geo::{extract_client_ip, GeoResolver};
use crate::queue::BoundedQueue;
use crate::spans::derive_spans;
use crate::stats::IngestStats;

/// 큐 상태 (`/metrics`, 로그용)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    /// 텔레메트리 종류
    pub kind: TelemetryKind,
    /// 현재 길이
    pub len: usize,
    /// 용량
    pub capacity: usize,
    /// 누적 수락
    pub accepted: u64,
    /// 누적 폐기
    pub dropped: u64,
}

/// 종류별 큐 + 보강기 묶음
pub struct IngestPipeline {
    geo: GeoResolver,
    config: IngestConfig,
    stats: Arc<IngestStats>,
    logs: Arc<BoundedQueue<LogItem>>,
    spans: Arc<BoundedQueue<SpanItem>>,
    system: Arc<BoundedQueue<SystemMetricItem>>,
    proxy: Arc<BoundedQueue<ProxyMetricItem>>,
    gateway: Arc<BoundedQueue<GatewayMetricItem>>,
}

impl IngestPipeline {
    /// 설정대로 큐 생성
    pub fn new(config: IngestConfig, geo: GeoResolver, stats: Arc<IngestStats>) -> Self {
        Self {
            logs: Arc::new(queue_for(TelemetryKind::Log, &config.log)),
            spans: Arc::new(queue_for(TelemetryKind::Span, &config.span)),
            system: Arc::new(queue_for(TelemetryKind::System, &config.system)),
            proxy: Arc::new(queue_for(TelemetryKind::Proxy, &config.proxy)),
            gateway: Arc::new(queue_for(TelemetryKind::Gateway, &config.gateway)),
            geo,
            config,
            stats,
        }
    }

    /// 공유 통계
    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// 액세스 로그 수집
    ///
    /// 로그 항목과 파생 스팬을 각각의 큐에 넣는다. 스팬 폐기는 로그 결과에 영향을 주지 않으며,
    /// 반환값은 로그 항목의 큐 투입 결과이다.
    pub fn ingest_log(
        &self,
        agent_id: &str,
        entry: LogEntry,
        received_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let timestamp = if entry.timestamp > 0 {
            Utc.timestamp_opt(entry.timestamp, 0)
                .single()
                .unwrap_or(received_at)
        } else {
            received_at
        };

        let client_ip = extract_client_ip(&entry.x_forwarded_for, &entry.remote_addr);
        let geo = if client_ip.is_empty() {
            Default::default()
        } else {
            self.geo.lookup(&client_ip)
        };

        // 스팬 폐기는 큐가 카운트/경고한다
        for span in derive_spans(&entry, agent_id, timestamp) {
            let _ = self.spans.offer(span);
        }

        let item = LogItem {
            entry,
            agent_id: agent_id.to_string(),
            client_ip,
            geo,
            timestamp,
        };
        self.logs.offer(item)
    }

    /// 프록시 메트릭 수집 (시스템 메트릭 포함 시 함께)
    pub fn ingest_metrics(
        &self,
        agent_id: &str,
        metrics: &ProxyMetrics,
        requests_per_second: f64,
        received_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let proxy_result = self.proxy.offer(ProxyMetricItem::from_metrics(
            agent_id,
            received_at,
            metrics,
            requests_per_second,
        ));

        let system_result = match &metrics.system {
            Some(system) => self.system.offer(SystemMetricItem {
                agent_id: agent_id.to_string(),
                timestamp: received_at,
                metrics: system.clone(),
            }),
            None => Ok(()),
        };

        proxy_result.and(system_result)
    }

    /// 게이트웨이 자체 메트릭 수집
    pub fn ingest_gateway(&self, item: GatewayMetricItem) -> Result<(), CoreError> {
        self.gateway.offer(item)
    }

    /// 종류별 플러셔 태스크 시작
    pub fn spawn_flushers(
        &self,
        store: Arc<dyn TelemetryStore>,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_one(&self.logs, &self.config.log, &store, shutdown_rx),
            self.spawn_one(&self.spans, &self.config.span, &store, shutdown_rx),
            self.spawn_one(&self.system, &self.config.system, &store, shutdown_rx),
            self.spawn_one(&self.proxy, &self.config.proxy, &store, shutdown_rx),
            self.spawn_one(&self.gateway, &self.config.gateway, &store, shutdown_rx),
        ]
    }

    fn spawn_one<T: StoreBatch>(
        &self,
        queue: &Arc<BoundedQueue<T>>,
        config: &QueueConfig,
        store: &Arc<dyn TelemetryStore>,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let flusher = Flusher::new(
            queue.clone(),
            store.clone(),
            self.stats.clone(),
            config.batch_size,
            config.flush_interval(),
        );
        tokio::spawn(flusher.run(shutdown_rx.clone()))
    }

    /// 종류별 큐 상태 (종류 순)
    pub fn queue_status(&self) -> Vec<QueueStatus> {
        vec![
            status_of(&self.logs),
            status_of(&self.spans),
            status_of(&self.system),
            status_of(&self.proxy),
            status_of(&self.gateway),
        ]
    }

    /// 전체 누적 폐기 수
    pub fn total_dropped(&self) -> u64 {
        self.queue_status().iter().map(|s| s.dropped).sum()
    }
}

fn queue_for<T>(kind: TelemetryKind, config: &QueueConfig) -> BoundedQueue<T> {
    BoundedQueue::new(kind, config.queue_capacity, config.batch_size)
}

fn status_of<T>(queue: &BoundedQueue<T>) -> QueueStatus {
    QueueStatus {
        kind: queue.kind(),
        len: queue.len(),
        capacity: queue.capacity(),
        accepted: queue.accepted(),
        dropped: queue.dropped(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleetgate_core::config::RetentionPolicy;
    use fleetgate_core::models::analytics::{
        AgentScope, LogSample, LogTotals, TimeRange, TraceFilter,
    };
    use fleetgate_core::models::telemetry::SystemMetrics;
    use fleetgate_core::ports::telemetry_store::PurgeReport;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// 배치 크기를 기록하는 가짜 저장소
    #[derive(Default)]
    struct RecordingStore {
        log_batches: Mutex<Vec<usize>>,
        span_batches: Mutex<Vec<usize>>,
        metric_batches: Mutex<Vec<(TelemetryKind, usize)>>,
        fail: AtomicBool,
    }

    impl RecordingStore {
        fn result(&self) -> Result<(), CoreError> {
            if self.fail.load(Ordering::Relaxed) {
                Err(CoreError::Storage("unavailable".to_string()))
            } else {
                Ok(())
            }
        }

        fn logged(&self) -> usize {
            self.log_batches.lock().unwrap().iter().sum()
        }
    }

    #[async_trait]
    impl TelemetryStore for RecordingStore {
        async fn insert_access_logs(&self, items: &[LogItem]) -> Result<(), CoreError> {
            self.log_batches.lock().unwrap().push(items.len());
            self.result()
        }
        async fn insert_spans(&self, items: &[SpanItem]) -> Result<(), CoreError> {
            self.span_batches.lock().unwrap().push(items.len());
            self.result()
        }
        async fn insert_system_metrics(&self, items: &[SystemMetricItem]) -> Result<(), CoreError> {
            self.metric_batches
                .lock()
                .unwrap()
                .push((TelemetryKind::System, items.len()));
            self.result()
        }
        async fn insert_proxy_metrics(&self, items: &[ProxyMetricItem]) -> Result<(), CoreError> {
            self.metric_batches
                .lock()
                .unwrap()
                .push((TelemetryKind::Proxy, items.len()));
            self.result()
        }
        async fn insert_gateway_metrics(&self, items: &[GatewayMetricItem]) -> Result<(), CoreError> {
            self.metric_batches
                .lock()
                .unwrap()
                .push((TelemetryKind::Gateway, items.len()));
            self.result()
        }
        async fn query_access_logs(&self, _: TimeRange, _: &AgentScope) -> Result<Vec<LogItem>, CoreError> {
            Ok(Vec::new())
        }
        async fn query_log_samples(
            &self,
            _: TimeRange,
            _: &AgentScope,
        ) -> Result<Vec<LogSample>, CoreError> {
            Ok(Vec::new())
        }
        async fn query_recent_logs(
            &self,
            _: TimeRange,
            _: &AgentScope,
            _: usize,
        ) -> Result<Vec<LogItem>, CoreError> {
            Ok(Vec::new())
        }
        async fn sum_access_logs(&self, _: TimeRange, _: &AgentScope) -> Result<LogTotals, CoreError> {
            Ok(LogTotals::default())
        }
        async fn count_statuses(
            &self,
            _: TimeRange,
            _: &AgentScope,
        ) -> Result<Vec<(i32, u64)>, CoreError> {
            Ok(Vec::new())
        }
        async fn query_system_metrics(
            &self,
            _: TimeRange,
            _: &AgentScope,
        ) -> Result<Vec<SystemMetricItem>, CoreError> {
            Ok(Vec::new())
        }
        async fn query_proxy_metrics(
            &self,
            _: TimeRange,
            _: &AgentScope,
        ) -> Result<Vec<ProxyMetricItem>, CoreError> {
            Ok(Vec::new())
        }
        async fn query_gateway_metrics(&self, _: TimeRange) -> Result<Vec<GatewayMetricItem>, CoreError> {
            Ok(Vec::new())
        }
        async fn query_root_spans(
            &self,
            _: DateTime<Utc>,
            _: &TraceFilter,
        ) -> Result<Vec<SpanItem>, CoreError> {
            Ok(Vec::new())
        }
        async fn query_trace(&self, _: &str, _: &str) -> Result<Vec<SpanItem>, CoreError> {
            Ok(Vec::new())
        }
        async fn delete_agent_data(&self, _: &str) -> Result<usize, CoreError> {
            Ok(0)
        }
        async fn purge_expired(
            &self,
            _: DateTime<Utc>,
            _: &RetentionPolicy,
        ) -> Result<PurgeReport, CoreError> {
            Ok(PurgeReport::default())
        }
    }

    fn small_config() -> IngestConfig {
        let mut config = IngestConfig::default();
        config.log = QueueConfig {
            queue_capacity: 4,
            batch_size: 2,
            flush_interval_ms: 50,
        };
        config.span = QueueConfig {
            queue_capacity: 100,
            batch_size: 10,
            flush_interval_ms: 50,
        };
        config
    }

    fn pipeline(config: IngestConfig) -> IngestPipeline {
        IngestPipeline::new(config, GeoResolver::new(), Arc::new(IngestStats::new()))
    }

    fn entry(uri: &str) -> LogEntry {
        LogEntry {
            timestamp: 1_700_000_000,
            remote_addr: "10.0.0.9:5555".to_string(),
            x_forwarded_for: "8.8.8.8, 10.0.0.1".to_string(),
            request_method: "GET".to_string(),
            request_uri: uri.to_string(),
            status: 200,
            request_time: 0.1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn log_is_enriched_before_enqueue() {
        let p = pipeline(small_config());
        p.ingest_log("a1", entry("/"), Utc::now()).unwrap();

        let mut out = Vec::new();
        p.logs.drain_into(&mut out, 10);
        let item = &out[0];
        assert_eq!(item.client_ip, "8.8.8.8");
        assert_eq!(item.geo.city, "Mountain View");
        assert_eq!(item.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(p.spans.len(), 1);
    }

    #[tokio::test]
    async fn zero_timestamp_uses_receive_time() {
        let p = pipeline(small_config());
        let mut e = entry("/");
        e.timestamp = 0;
        let now = Utc::now();
        p.ingest_log("a1", e, now).unwrap();

        let mut out = Vec::new();
        p.logs.drain_into(&mut out, 1);
        assert_eq!(out[0].timestamp, now);
    }

    #[tokio::test]
    async fn overflow_is_counted_per_kind() {
        let p = pipeline(small_config());
        for i in 0..5 {
            let result = p.ingest_log("a1", entry(&format!("/{i}")), Utc::now());
            assert_eq!(result.is_ok(), i < 4);
        }
        let status = p.queue_status();
        assert_eq!(status[0].kind, TelemetryKind::Log);
        assert_eq!(status[0].dropped, 1);
        assert_eq!(status[0].len, 4);
        assert_eq!(status[1].dropped, 0);
        assert_eq!(p.total_dropped(), 1);
    }

    #[tokio::test]
    async fn metrics_split_into_proxy_and_system() {
        let p = pipeline(small_config());
        let metrics = ProxyMetrics {
            active_connections: 3,
            total_requests: 100,
            system: Some(SystemMetrics {
                cpu_usage_percent: 12.0,
                ..Default::default()
            }),
            ..Default::default()
        };
        p.ingest_metrics("a1", &metrics, 2.5, Utc::now()).unwrap();
        assert_eq!(p.proxy.len(), 1);
        assert_eq!(p.system.len(), 1);

        let mut out = Vec::new();
        p.proxy.drain_into(&mut out, 1);
        assert_eq!(out[0].requests_per_second, 2.5);
    }

    #[tokio::test]
    async fn flush_pending_writes_full_batches() {
        let p = pipeline(small_config());
        let store = Arc::new(RecordingStore::default());
        for i in 0..3 {
            p.ingest_log("a1", entry(&format!("/{i}")), Utc::now()).unwrap();
        }

        let flusher = Flusher::new(p.logs.clone(), store.clone(), p.stats.clone(), 2, Duration::from_secs(60));
        let mut buffer = Vec::new();
        assert_eq!(flusher.flush_pending(&mut buffer).await, 3);
        assert_eq!(*store.log_batches.lock().unwrap(), vec![2, 1]);
        assert!(buffer.is_empty());
        assert_eq!(p.stats.take_window().store_ops, 2);
    }

    #[tokio::test]
    async fn failed_batch_is_discarded() {
        let p = pipeline(small_config());
        let store = Arc::new(RecordingStore::default());
        store.fail.store(true, Ordering::Relaxed);
        p.ingest_log("a1", entry("/"), Utc::now()).unwrap();

        let flusher = Flusher::new(p.logs.clone(), store.clone(), p.stats.clone(), 2, Duration::from_secs(60));
        let mut buffer = Vec::new();
        flusher.flush_pending(&mut buffer).await;
        store.fail.store(false, Ordering::Relaxed);
        assert_eq!(flusher.flush_pending(&mut buffer).await, 0);
        assert_eq!(store.log_batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn flushers_drain_on_interval_and_shutdown() {
        let p = pipeline(small_config());
        let store = Arc::new(RecordingStore::default());
        let (tx, rx) = watch::channel(false);
        let handles = p.spawn_flushers(store.clone(), &rx);

        p.ingest_log("a1", entry("/a"), Utc::now()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.logged(), 1);

        p.ingest_log("a1", entry("/b"), Utc::now()).unwrap();
        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.logged(), 2);
        assert_eq!(store.span_batches.lock().unwrap().iter().sum::<usize>(), 2);
    }
}
