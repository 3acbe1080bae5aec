//! 배치 플러셔.
//!
//! 종류별 단일 태스크가 큐를 자체 버퍼로 비우고, 배치 크기 또는 주기에 도달하면
//! 한 번의 벌크 삽입을 수행한다. 실패한 배치는 로그만 남기고 폐기한다 (최대 1회 전달).

use async_trait::async_trait;
use fleetgate_core::error::CoreError;
use fleetgate_core::models::telemetry::{
    GatewayMetricItem, LogItem, ProxyMetricItem, SpanItem, SystemMetricItem,
};
use fleetgate_core::ports::telemetry_store::TelemetryStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::queue::BoundedQueue;
use crate::stats::IngestStats;

/// 벌크 삽입 가능한 텔레메트리 항목
#[async_trait]
pub trait StoreBatch: Sized + Send + Sync + 'static {
    /// 배치 한 번 저장
    async fn write_batch(store: &dyn TelemetryStore, batch: &[Self]) -> Result<(), CoreError>;
}

#[async_trait]
impl StoreBatch for LogItem {
    async fn write_batch(store: &dyn TelemetryStore, batch: &[Self]) -> Result<(), CoreError> {
        store.insert_access_logs(batch).await
    }
}

#[async_trait]
impl StoreBatch for SpanItem {
    async fn write_batch(store: &dyn TelemetryStore, batch: &[Self]) -> Result<(), CoreError> {
        store.insert_spans(batch).await
    }
}

#[async_trait]
impl StoreBatch for SystemMetricItem {
    async fn write_batch(store: &dyn TelemetryStore, batch: &[Self]) -> Result<(), CoreError> {
        store.insert_system_metrics(batch).await
    }
}

#[async_trait]
impl StoreBatch for ProxyMetricItem {
    async fn write_batch(store: &dyn TelemetryStore, batch: &[Self]) -> Result<(), CoreError> {
        store.insert_proxy_metrics(batch).await
    }
}

#[async_trait]
impl StoreBatch for GatewayMetricItem {
    async fn write_batch(store: &dyn TelemetryStore, batch: &[Self]) -> Result<(), CoreError> {
        store.insert_gateway_metrics(batch).await
    }
}

/// 큐 하나를 담당하는 플러셔
pub struct Flusher<T> {
    queue: Arc<BoundedQueue<T>>,
    store: Arc<dyn TelemetryStore>,
    stats: Arc<IngestStats>,
    batch_size: usize,
    interval: Duration,
}

impl<T: StoreBatch> Flusher<T> {
    /// 새 플러셔 생성
    pub fn new(
        queue: Arc<BoundedQueue<T>>,
        store: Arc<dyn TelemetryStore>,
        stats: Arc<IngestStats>,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            store,
            stats,
            batch_size: batch_size.max(1),
            interval,
        }
    }

    /// 플러시 루프. 종료 신호 수신 시 남은 항목을 모두 저장한 뒤 반환.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let kind = self.queue.kind();
        info!(
            "{kind} 플러셔 시작 (batch={}, interval={}ms)",
            self.batch_size,
            self.interval.as_millis()
        );

        let mut buffer = Vec::with_capacity(self.batch_size);
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.flush_pending(&mut buffer).await;
                }
                _ = self.queue.notified() => {
                    self.flush_pending(&mut buffer).await;
                }
                _ = shutdown_rx.changed() => {
                    let flushed = self.flush_pending(&mut buffer).await;
                    info!("{kind} 플러셔 종료 (최종 {flushed}개 저장)");
                    break;
                }
            }
        }
    }

    /// 큐에 쌓인 항목을 배치 단위로 모두 저장. 처리한 항목 수 반환.
    pub async fn flush_pending(&self, buffer: &mut Vec<T>) -> usize {
        let mut total = 0;
        loop {
            let taken = self.queue.drain_into(buffer, self.batch_size);
            if taken == 0 {
                break;
            }
            self.write(buffer).await;
            total += taken;
            if taken < self.batch_size {
                break;
            }
        }
        total
    }

    async fn write(&self, buffer: &mut Vec<T>) {
        let count = buffer.len();
        let started = Instant::now();
        let result = T::write_batch(self.store.as_ref(), buffer).await;
        self.stats.record_store_op(started.elapsed());

        match result {
            Ok(()) => debug!("{} 배치 저장: {count}개", self.queue.kind()),
            Err(e) => warn!("{} 배치 {count}개 저장 실패, 폐기: {e}", self.queue.kind()),
        }
        buffer.clear();
    }
}
