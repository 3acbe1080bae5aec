//! 알림 평가용 메트릭 집계.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fleetgate_core::error::CoreError;
use fleetgate_core::models::alert::AlertMetric;
use fleetgate_core::models::analytics::{AgentScope, TimeRange};
use fleetgate_core::ports::analytics::MetricAggregator;

use super::AnalyticsEngine;
use crate::aggregate::{sanitize, Kpi};

/// 집계 윈도우 상한 (1년)
const MAX_WINDOW_SECS: u64 = 365 * 24 * 3600;

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0u64), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sanitize(sum / count as f64)
    }
}

impl AnalyticsEngine {
    /// 기준 시각을 지정한 메트릭 집계
    pub async fn metric_aggregate_at(
        &self,
        metric: AlertMetric,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<f64, CoreError> {
        let secs = window_secs.min(MAX_WINDOW_SECS) as i64;
        let range = TimeRange::ending_at(now, Duration::seconds(secs));
        let scope = AgentScope::All;

        let value = match metric {
            AlertMetric::Cpu => {
                let rows = self.store.query_system_metrics(range, &scope).await?;
                mean(rows.iter().map(|r| r.metrics.cpu_usage_percent))
            }
            AlertMetric::Memory => {
                let rows = self.store.query_system_metrics(range, &scope).await?;
                mean(rows.iter().map(|r| r.metrics.memory_usage_percent))
            }
            AlertMetric::Rps => {
                let rows = self.store.query_proxy_metrics(range, &scope).await?;
                mean(rows.iter().map(|r| r.requests_per_second))
            }
            AlertMetric::ErrorRate => {
                let totals = self.store.sum_access_logs(range, &scope).await?;
                Kpi::from(totals).error_rate()
            }
        };
        Ok(value)
    }
}

#[async_trait]
impl MetricAggregator for AnalyticsEngine {
    async fn metric_aggregate(
        &self,
        metric: AlertMetric,
        window_secs: u64,
    ) -> Result<f64, CoreError> {
        self.metric_aggregate_at(metric, window_secs, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{base, log, BrokenStore};
    use crate::fallback::FallbackAggregator;
    use fleetgate_core::config::AnalyticsConfig;
    use fleetgate_core::models::telemetry::{
        ProxyMetricItem, ProxyMetrics, SystemMetricItem, SystemMetrics,
    };
    use fleetgate_core::ports::telemetry_store::TelemetryStore;
    use fleetgate_storage::SqliteStorage;
    use std::sync::Arc;

    async fn engine() -> AnalyticsEngine {
        let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let system = |mins: i64, cpu: f64| SystemMetricItem {
            agent_id: "a1".to_string(),
            timestamp: base() - Duration::minutes(mins),
            metrics: SystemMetrics {
                cpu_usage_percent: cpu,
                memory_usage_percent: cpu / 2.0,
                ..Default::default()
            },
        };
        store
            .insert_system_metrics(&[system(1, 80.0), system(2, 100.0), system(30, 0.0)])
            .await
            .unwrap();
        store
            .insert_proxy_metrics(&[
                ProxyMetricItem::from_metrics("a1", base(), &ProxyMetrics::default(), 12.0),
                ProxyMetricItem::from_metrics("a2", base(), &ProxyMetrics::default(), 8.0),
            ])
            .await
            .unwrap();
        store
            .insert_access_logs(&[
                log("a1", base(), "/", 200, 0.1),
                log("a1", base(), "/", 503, 0.1),
                log("a1", base(), "/", 0, 0.1),
                log("a2", base(), "/", 200, 0.1),
            ])
            .await
            .unwrap();
        AnalyticsEngine::new(
            store,
            Arc::new(FallbackAggregator::new(AnalyticsConfig::default())),
        )
    }

    #[tokio::test]
    async fn aggregates_over_window() {
        let engine = engine().await;
        let cpu = engine
            .metric_aggregate_at(AlertMetric::Cpu, 300, base())
            .await
            .unwrap();
        assert!((cpu - 90.0).abs() < 1e-9);

        let memory = engine
            .metric_aggregate_at(AlertMetric::Memory, 300, base())
            .await
            .unwrap();
        assert!((memory - 45.0).abs() < 1e-9);

        let rps = engine
            .metric_aggregate_at(AlertMetric::Rps, 60, base())
            .await
            .unwrap();
        assert!((rps - 10.0).abs() < 1e-9);

        let error_rate = engine
            .metric_aggregate_at(AlertMetric::ErrorRate, 60, base())
            .await
            .unwrap();
        assert!((error_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_window_is_zero() {
        let engine = engine().await;
        let far_future = base() + Duration::days(1);
        let cpu = engine
            .metric_aggregate_at(AlertMetric::Cpu, 60, far_future)
            .await
            .unwrap();
        assert_eq!(cpu, 0.0);
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        let engine = AnalyticsEngine::new(
            Arc::new(BrokenStore),
            Arc::new(FallbackAggregator::new(AnalyticsConfig::default())),
        );
        assert!(engine.metric_aggregate(AlertMetric::Cpu, 60).await.is_err());
    }
}
