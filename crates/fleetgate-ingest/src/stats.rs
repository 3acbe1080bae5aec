//! 게이트웨이 카운터.
//!
//! 수신 메시지 수와 저장소 쓰기 지연을 원자적으로 누적한다.
//! 자체 메트릭 틱은 구간 카운터를 교환(swap)해 읽고, `/metrics`는 누적값을 읽는다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 구간 스냅샷 (자체 메트릭 틱 사이)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowSnapshot {
    /// 구간 동안 수신 메시지 수
    pub messages: u64,
    /// 구간 동안 저장소 쓰기 횟수
    pub store_ops: u64,
    /// 구간 동안 저장소 쓰기 총 지연 (ns)
    pub store_latency_ns: u64,
}

impl WindowSnapshot {
    /// 평균 저장소 쓰기 지연 (ms), 쓰기 없으면 0
    pub fn mean_store_latency_ms(&self) -> f64 {
        if self.store_ops == 0 {
            0.0
        } else {
            self.store_latency_ns as f64 / self.store_ops as f64 / 1_000_000.0
        }
    }
}

/// 공유 수집 통계
#[derive(Debug, Default)]
pub struct IngestStats {
    messages_total: AtomicU64,
    messages_window: AtomicU64,
    store_ops_total: AtomicU64,
    store_latency_ns_total: AtomicU64,
    store_ops_window: AtomicU64,
    store_latency_ns_window: AtomicU64,
}

impl IngestStats {
    /// 새 통계
    pub fn new() -> Self {
        Self::default()
    }

    /// 에이전트 메시지 1건 수신
    pub fn record_message(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
        self.messages_window.fetch_add(1, Ordering::Relaxed);
    }

    /// 저장소 쓰기 1회 기록
    pub fn record_store_op(&self, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.store_ops_total.fetch_add(1, Ordering::Relaxed);
        self.store_latency_ns_total.fetch_add(ns, Ordering::Relaxed);
        self.store_ops_window.fetch_add(1, Ordering::Relaxed);
        self.store_latency_ns_window.fetch_add(ns, Ordering::Relaxed);
    }

    /// 구간 카운터를 0으로 교환하며 읽기
    pub fn take_window(&self) -> WindowSnapshot {
        WindowSnapshot {
            messages: self.messages_window.swap(0, Ordering::Relaxed),
            store_ops: self.store_ops_window.swap(0, Ordering::Relaxed),
            store_latency_ns: self.store_latency_ns_window.swap(0, Ordering::Relaxed),
        }
    }

    /// 누적 메시지 수
    pub fn messages_total(&self) -> u64 {
        self.messages_total.load(Ordering::Relaxed)
    }

    /// 누적 저장소 쓰기 횟수
    pub fn store_ops_total(&self) -> u64 {
        self.store_ops_total.load(Ordering::Relaxed)
    }

    /// 누적 저장소 쓰기 지연 (초)
    pub fn store_latency_seconds_total(&self) -> f64 {
        self.store_latency_ns_total.load(Ordering::Relaxed) as f64 / 1e9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_swaps_to_zero_but_totals_remain() {
        let stats = IngestStats::new();
        for _ in 0..20 {
            stats.record_message();
        }
        stats.record_store_op(Duration::from_millis(4));
        stats.record_store_op(Duration::from_millis(6));

        let window = stats.take_window();
        assert_eq!(window.messages, 20);
        assert_eq!(window.store_ops, 2);
        assert!((window.mean_store_latency_ms() - 5.0).abs() < 1e-9);

        assert_eq!(stats.take_window(), WindowSnapshot::default());
        assert_eq!(stats.messages_total(), 20);
        assert_eq!(stats.store_ops_total(), 2);
        assert!((stats.store_latency_seconds_total() - 0.010).abs() < 1e-9);
    }

    #[test]
    fn no_ops_means_zero_latency() {
        assert_eq!(WindowSnapshot::default().mean_store_latency_ms(), 0.0);
    }
}
