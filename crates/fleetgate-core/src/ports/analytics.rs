//! 메트릭 집계 포트.
//!
//! 구현: `fleetgate-analytics` crate. 알림 엔진이 소비한다.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::alert::AlertMetric;

/// 알림 평가용 집계 프리미티브
#[async_trait]
pub trait MetricAggregator: Send + Sync {
    /// 최근 `window_secs`초 동안의 메트릭 집계값 (데이터 없으면 0)
    async fn metric_aggregate(&self, metric: AlertMetric, window_secs: u64)
        -> Result<f64, CoreError>;
}
