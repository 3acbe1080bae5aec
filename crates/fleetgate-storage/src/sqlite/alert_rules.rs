//! 알림 규칙 (AlertRuleStore 포트 구현).

use async_trait::async_trait;
use fleetgate_core::error::CoreError;
use fleetgate_core::models::alert::{AlertRule, Comparison};
use fleetgate_core::ports::metadata_store::AlertRuleStore;
use tracing::{debug, warn};

use super::{db_err, SqliteStorage};

#[async_trait]
impl AlertRuleStore for SqliteStorage {
    async fn list_rules(&self) -> Result<Vec<AlertRule>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, metric_type, comparison, threshold, window_secs, enabled, recipients
                 FROM alert_rules ORDER BY id",
            )
            .map_err(db_err("쿼리 준비 실패"))?;

        let rows = stmt
            .query_map([], |row| {
                let comparison: String = row.get(3)?;
                Ok(AlertRule {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    metric_type: row.get(2)?,
                    comparison: Comparison::from(comparison),
                    threshold: row.get(4)?,
                    window_secs: row.get::<_, i64>(5)?.max(0) as u64,
                    enabled: row.get(6)?,
                    recipients: row.get(7)?,
                })
            })
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut rules = Vec::new();
        for row in rows {
            match row {
                Ok(rule) => rules.push(rule),
                Err(e) => warn!("알림 규칙 행 읽기 실패: {e}"),
            }
        }
        Ok(rules)
    }

    async fn upsert_rule(&self, rule: &AlertRule) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO alert_rules (id, name, metric_type, comparison, threshold, window_secs, enabled, recipients)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                metric_type = excluded.metric_type,
                comparison = excluded.comparison,
                threshold = excluded.threshold,
                window_secs = excluded.window_secs,
                enabled = excluded.enabled,
                recipients = excluded.recipients",
            rusqlite::params![
                rule.id,
                rule.name,
                rule.metric_type,
                rule.comparison.as_str(),
                rule.threshold,
                rule.window_secs as i64,
                rule.enabled,
                rule.recipients,
            ],
        )
        .map_err(db_err("알림 규칙 저장 실패"))?;

        debug!("알림 규칙 저장: {} ({})", rule.id, rule.name);
        Ok(())
    }

    async fn delete_rule(&self, id: &str) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM alert_rules WHERE id = ?1", [id])
            .map_err(db_err("알림 규칙 삭제 실패"))?;
        Ok(deleted > 0)
    }
}
