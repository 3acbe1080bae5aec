//! 바운디드 텔레메트리 큐.
//!
//! `crossbeam::queue::ArrayQueue` 위의 offer-or-drop 큐. 가득 차면 항목을 돌려받아
//! 폐기하고 종류별 드롭 카운터를 올린다. 생산자는 절대 대기하지 않는다.
//! 폐기 경고는 첫 건과 이후 `DROP_WARN_EVERY`건마다 남긴다.

use crossbeam::queue::ArrayQueue;
use fleetgate_core::error::CoreError;
use fleetgate_core::models::telemetry::TelemetryKind;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::warn;

/// 폐기 경고 간격
const DROP_WARN_EVERY: u64 = 1000;

/// 누적 폐기 수가 경고 대상인지 (첫 폐기, 이후 간격마다)
fn drop_warning_due(dropped_total: u64) -> bool {
    dropped_total == 1 || dropped_total % DROP_WARN_EVERY == 0
}

/// 종류 하나의 바운디드 FIFO 큐
pub struct BoundedQueue<T> {
    kind: TelemetryKind,
    items: ArrayQueue<T>,
    /// 이 길이에 도달하면 플러셔를 깨운다
    wake_threshold: usize,
    dropped: AtomicU64,
    accepted: AtomicU64,
    notify: Notify,
}

impl<T> BoundedQueue<T> {
    /// 새 큐 생성 (capacity 0은 1로 보정)
    pub fn new(kind: TelemetryKind, capacity: usize, wake_threshold: usize) -> Self {
        Self {
            kind,
            items: ArrayQueue::new(capacity.max(1)),
            wake_threshold: wake_threshold.max(1),
            dropped: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// 비차단 추가. 가득 차면 항목을 폐기하고 `QueueFull`.
    pub fn offer(&self, item: T) -> Result<(), CoreError> {
        match self.items.push(item) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                if self.items.len() >= self.wake_threshold {
                    self.notify.notify_one();
                }
                Ok(())
            }
            Err(_rejected) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if drop_warning_due(total) {
                    warn!(
                        "{} 큐 가득 참 (용량 {}), 항목 폐기 누적 {total}건",
                        self.kind,
                        self.items.capacity()
                    );
                }
                Err(CoreError::QueueFull {
                    kind: self.kind.as_str(),
                })
            }
        }
    }

    /// 최대 `max`개를 꺼내 `buffer`에 추가. 꺼낸 개수 반환.
    pub fn drain_into(&self, buffer: &mut Vec<T>, max: usize) -> usize {
        let mut taken = 0;
        while taken < max {
            match self.items.pop() {
                Some(item) => {
                    buffer.push(item);
                    taken += 1;
                }
                None => break,
            }
        }
        taken
    }

    /// 배치 임계치 도달 알림 대기
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// 텔레메트리 종류
    pub fn kind(&self) -> TelemetryKind {
        self.kind
    }

    /// 현재 길이
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 용량
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// 누적 폐기 수
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 누적 수락 수
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}
