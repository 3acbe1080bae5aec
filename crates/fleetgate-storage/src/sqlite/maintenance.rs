//! 보존 정책 정리와 에이전트 텔레메트리 삭제.

use chrono::{DateTime, Duration, Utc};
use fleetgate_core::config::RetentionPolicy;
use fleetgate_core::error::CoreError;
use fleetgate_core::ports::telemetry_store::PurgeReport;
use tracing::{debug, info};

use super::{db_err, SqliteStorage};

/// 에이전트 단위로 삭제하는 텔레메트리 테이블
const AGENT_TABLES: [&str; 4] = ["access_logs", "spans", "system_metrics", "proxy_metrics"];

/// 밀리초 기준 메트릭 테이블
const METRIC_TABLES: [&str; 3] = ["system_metrics", "proxy_metrics", "gateway_metrics"];

fn cutoff(now: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
    let ttl = Duration::from_std(ttl).unwrap_or(Duration::MAX);
    now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl SqliteStorage {
    pub(super) fn delete_agent_data_sync(&self, agent_id: &str) -> Result<usize, CoreError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_err("트랜잭션 시작 실패"))?;

        let mut deleted = 0;
        for table in AGENT_TABLES {
            deleted += tx
                .execute(
                    &format!("DELETE FROM {table} WHERE agent_id = ?1"),
                    [agent_id],
                )
                .map_err(db_err("에이전트 데이터 삭제 실패"))?;
        }
        tx.commit().map_err(db_err("트랜잭션 커밋 실패"))?;

        info!("에이전트 {agent_id} 텔레메트리 {deleted}행 삭제");
        Ok(deleted)
    }

    pub(super) fn purge_expired_sync(
        &self,
        now: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> Result<PurgeReport, CoreError> {
        let log_cutoff = cutoff(now, policy.log_ttl).timestamp_millis();
        let span_cutoff = cutoff(now, policy.span_ttl).timestamp_micros();
        let metric_cutoff = cutoff(now, policy.metric_ttl).timestamp_millis();

        let conn = self.lock()?;
        let mut report = PurgeReport {
            access_logs: conn
                .execute("DELETE FROM access_logs WHERE timestamp_ms < ?1", [log_cutoff])
                .map_err(db_err("액세스 로그 정리 실패"))?,
            spans: conn
                .execute("DELETE FROM spans WHERE start_us < ?1", [span_cutoff])
                .map_err(db_err("스팬 정리 실패"))?,
            metrics: 0,
        };
        for table in METRIC_TABLES {
            report.metrics += conn
                .execute(
                    &format!("DELETE FROM {table} WHERE timestamp_ms < ?1"),
                    [metric_cutoff],
                )
                .map_err(db_err("메트릭 정리 실패"))?;
        }

        if report.total() > 0 {
            info!(
                "보존 정책 적용: 로그 {}, 스팬 {}, 메트릭 {}행 삭제",
                report.access_logs, report.spans, report.metrics
            );
        } else {
            debug!("보존 정책 적용: 삭제 대상 없음");
        }
        Ok(report)
    }
}
