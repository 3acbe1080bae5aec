//! 저장소 기반 분석 엔진.
//!
//! 합계와 상태 코드 건수는 저장소가 SQL로 집계하고, 버킷/백분위/순위는
//! 필요한 컬럼만 투영한 로그로 메모리에서 계산한다.
//! 액세스 로그를 읽을 수 없으면 대시보드는 인메모리 폴백 집계로 응답한다.

mod alerting;
mod dashboard;
mod geo;
mod report;
mod traces;

pub use dashboard::{build_dashboard, DashboardRows};

use fleetgate_core::error::CoreError;
use fleetgate_core::ports::telemetry_store::TelemetryStore;
use std::sync::Arc;
use tracing::warn;

use crate::fallback::FallbackAggregator;

/// 분석 질의 엔진
pub struct AnalyticsEngine {
    store: Arc<dyn TelemetryStore>,
    fallback: Arc<FallbackAggregator>,
}

impl AnalyticsEngine {
    /// 새 엔진 생성
    pub fn new(store: Arc<dyn TelemetryStore>, fallback: Arc<FallbackAggregator>) -> Self {
        Self { store, fallback }
    }

    /// 폴백 집계 (연결 핸들러가 로그를 반영할 때 사용)
    pub fn fallback(&self) -> &Arc<FallbackAggregator> {
        &self.fallback
    }
}

/// 보조 조회 실패는 빈 결과로 대체하고 경고만 남긴다
fn or_empty<T>(result: Result<Vec<T>, CoreError>, what: &str) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!("{what} 조회 실패, 빈 결과로 대체: {e}");
        Vec::new()
    })
}
