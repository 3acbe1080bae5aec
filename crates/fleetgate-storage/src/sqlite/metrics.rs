//! 메트릭 저장/조회 (시스템, 프록시, 게이트웨이).

use fleetgate_core::error::CoreError;
use fleetgate_core::models::analytics::{AgentScope, TimeRange};
use fleetgate_core::models::telemetry::{
    GatewayMetricItem, ProxyMetricItem, SystemMetricItem, SystemMetrics,
};
use tracing::debug;

use super::{db_err, from_millis, range_params, scope_clause, SqliteStorage};

impl SqliteStorage {
    // --------------------------------------------------------
    // 시스템 메트릭
    // --------------------------------------------------------

    pub(super) fn insert_system_metrics_sync(
        &self,
        items: &[SystemMetricItem],
    ) -> Result<(), CoreError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_err("트랜잭션 시작 실패"))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO system_metrics (
                        timestamp_ms, agent_id, cpu_usage, memory_usage, memory_total, memory_used,
                        network_rx_bytes, network_tx_bytes, network_rx_rate, network_tx_rate,
                        cpu_user, cpu_system, cpu_iowait
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )
                .map_err(db_err("쿼리 준비 실패"))?;

            for item in items {
                let m = &item.metrics;
                stmt.execute(rusqlite::params![
                    item.timestamp.timestamp_millis(),
                    item.agent_id,
                    m.cpu_usage_percent,
                    m.memory_usage_percent,
                    m.memory_total_bytes as i64,
                    m.memory_used_bytes as i64,
                    m.network_rx_bytes as i64,
                    m.network_tx_bytes as i64,
                    m.network_rx_rate,
                    m.network_tx_rate,
                    m.cpu_user_percent,
                    m.cpu_system_percent,
                    m.cpu_iowait_percent,
                ])
                .map_err(db_err("시스템 메트릭 저장 실패"))?;
            }
        }
        tx.commit().map_err(db_err("트랜잭션 커밋 실패"))?;

        debug!("시스템 메트릭 {}건 저장", items.len());
        Ok(())
    }

    pub(super) fn query_system_metrics_sync(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<SystemMetricItem>, CoreError> {
        let mut params = range_params(range);
        let scope_sql = scope_clause(scope, "agent_id", &mut params);
        let sql = format!(
            "SELECT timestamp_ms, agent_id, cpu_usage, memory_usage, memory_total, memory_used,
                    network_rx_bytes, network_tx_bytes, network_rx_rate, network_tx_rate,
                    cpu_user, cpu_system, cpu_iowait
             FROM system_metrics
             WHERE timestamp_ms >= ? AND timestamp_ms <= ?{scope_sql}
             ORDER BY timestamp_ms ASC, id ASC"
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err("쿼리 준비 실패"))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(SystemMetricItem {
                    timestamp: from_millis(row.get(0)?),
                    agent_id: row.get(1)?,
                    metrics: SystemMetrics {
                        cpu_usage_percent: row.get(2)?,
                        memory_usage_percent: row.get(3)?,
                        memory_total_bytes: row.get::<_, i64>(4)? as u64,
                        memory_used_bytes: row.get::<_, i64>(5)? as u64,
                        network_rx_bytes: row.get::<_, i64>(6)? as u64,
                        network_tx_bytes: row.get::<_, i64>(7)? as u64,
                        network_rx_rate: row.get(8)?,
                        network_tx_rate: row.get(9)?,
                        cpu_user_percent: row.get(10)?,
                        cpu_system_percent: row.get(11)?,
                        cpu_iowait_percent: row.get(12)?,
                    },
                })
            })
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(db_err("행 읽기 실패"))?);
        }
        Ok(items)
    }

    // --------------------------------------------------------
    // 프록시 메트릭
    // --------------------------------------------------------

    pub(super) fn insert_proxy_metrics_sync(
        &self,
        items: &[ProxyMetricItem],
    ) -> Result<(), CoreError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_err("트랜잭션 시작 실패"))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO proxy_metrics (
                        timestamp_ms, agent_id, active_connections, accepted_connections,
                        handled_connections, total_requests, reading, writing, waiting,
                        requests_per_second
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .map_err(db_err("쿼리 준비 실패"))?;

            for item in items {
                stmt.execute(rusqlite::params![
                    item.timestamp.timestamp_millis(),
                    item.agent_id,
                    item.active_connections as i64,
                    item.accepted_connections as i64,
                    item.handled_connections as i64,
                    item.total_requests as i64,
                    item.reading as i64,
                    item.writing as i64,
                    item.waiting as i64,
                    item.requests_per_second,
                ])
                .map_err(db_err("프록시 메트릭 저장 실패"))?;
            }
        }
        tx.commit().map_err(db_err("트랜잭션 커밋 실패"))?;

        debug!("프록시 메트릭 {}건 저장", items.len());
        Ok(())
    }

    pub(super) fn query_proxy_metrics_sync(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<ProxyMetricItem>, CoreError> {
        let mut params = range_params(range);
        let scope_sql = scope_clause(scope, "agent_id", &mut params);
        let sql = format!(
            "SELECT timestamp_ms, agent_id, active_connections, accepted_connections,
                    handled_connections, total_requests, reading, writing, waiting,
                    requests_per_second
             FROM proxy_metrics
             WHERE timestamp_ms >= ? AND timestamp_ms <= ?{scope_sql}
             ORDER BY timestamp_ms ASC, id ASC"
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err("쿼리 준비 실패"))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(ProxyMetricItem {
                    timestamp: from_millis(row.get(0)?),
                    agent_id: row.get(1)?,
                    active_connections: row.get::<_, i64>(2)? as u64,
                    accepted_connections: row.get::<_, i64>(3)? as u64,
                    handled_connections: row.get::<_, i64>(4)? as u64,
                    total_requests: row.get::<_, i64>(5)? as u64,
                    reading: row.get::<_, i64>(6)? as u64,
                    writing: row.get::<_, i64>(7)? as u64,
                    waiting: row.get::<_, i64>(8)? as u64,
                    requests_per_second: row.get(9)?,
                })
            })
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(db_err("행 읽기 실패"))?);
        }
        Ok(items)
    }

    // --------------------------------------------------------
    // 게이트웨이 메트릭
    // --------------------------------------------------------

    pub(super) fn insert_gateway_metrics_sync(
        &self,
        items: &[GatewayMetricItem],
    ) -> Result<(), CoreError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_err("트랜잭션 시작 실패"))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO gateway_metrics (
                        timestamp_ms, gateway_id, eps, active_connections, cpu_usage,
                        memory_mb, task_count, db_latency_ms
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(db_err("쿼리 준비 실패"))?;

            for item in items {
                stmt.execute(rusqlite::params![
                    item.timestamp.timestamp_millis(),
                    item.gateway_id,
                    item.eps,
                    item.active_connections as i64,
                    item.cpu_usage,
                    item.memory_mb,
                    item.task_count as i64,
                    item.db_latency_ms,
                ])
                .map_err(db_err("게이트웨이 메트릭 저장 실패"))?;
            }
        }
        tx.commit().map_err(db_err("트랜잭션 커밋 실패"))?;

        debug!("게이트웨이 메트릭 {}건 저장", items.len());
        Ok(())
    }

    pub(super) fn query_gateway_metrics_sync(
        &self,
        range: TimeRange,
    ) -> Result<Vec<GatewayMetricItem>, CoreError> {
        let params = range_params(range);
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp_ms, gateway_id, eps, active_connections, cpu_usage,
                        memory_mb, task_count, db_latency_ms
                 FROM gateway_metrics
                 WHERE timestamp_ms >= ? AND timestamp_ms <= ?
                 ORDER BY timestamp_ms ASC, id ASC",
            )
            .map_err(db_err("쿼리 준비 실패"))?;

        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(GatewayMetricItem {
                    timestamp: from_millis(row.get(0)?),
                    gateway_id: row.get(1)?,
                    eps: row.get(2)?,
                    active_connections: row.get::<_, i64>(3)? as u64,
                    cpu_usage: row.get(4)?,
                    memory_mb: row.get(5)?,
                    task_count: row.get::<_, i64>(6)? as u64,
                    db_latency_ms: row.get(7)?,
                })
            })
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(db_err("행 읽기 실패"))?);
        }
        Ok(items)
    }
}
