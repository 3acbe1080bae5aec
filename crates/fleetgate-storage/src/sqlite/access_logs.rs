//! 액세스 로그 저장/조회.

use fleetgate_core::error::CoreError;
use fleetgate_core::models::analytics::{AgentScope, LogSample, LogTotals, TimeRange};
use fleetgate_core::models::telemetry::{GeoLocation, LogEntry, LogItem};
use rusqlite::types::Value;
use rusqlite::Row;
use tracing::debug;

use super::{db_err, from_millis, range_params, scope_clause, SqliteStorage};

const SELECT_COLUMNS: &str = "timestamp_ms, agent_id, remote_addr, x_forwarded_for, client_ip,
    request_method, request_uri, status, body_bytes_sent, request_time, request_id,
    upstream_addr, upstream_status, upstream_connect_time, upstream_header_time,
    upstream_response_time, user_agent, referer, country, country_code, city, region,
    latitude, longitude, timezone, isp";

impl SqliteStorage {
    pub(super) fn insert_access_logs_sync(&self, items: &[LogItem]) -> Result<(), CoreError> {
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
                    "INSERT INTO access_logs (
                        timestamp_ms, agent_id, remote_addr, x_forwarded_for, client_ip,
                        request_method, request_uri, status, body_bytes_sent, request_time,
                        request_id, upstream_addr, upstream_status, upstream_connect_time,
                        upstream_header_time, upstream_response_time, user_agent, referer,
                        country, country_code, city, region, latitude, longitude, timezone, isp
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                              ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
                )
                .map_err(db_err("쿼리 준비 실패"))?;

            for item in items {
                let e = &item.entry;
                let g = &item.geo;
                stmt.execute(rusqlite::params![
                    item.timestamp.timestamp_millis(),
                    item.agent_id,
                    e.remote_addr,
                    e.x_forwarded_for,
                    item.client_ip,
                    e.request_method,
                    e.request_uri,
                    e.status,
                    e.body_bytes_sent,
                    e.request_time,
                    e.request_id,
                    e.upstream_addr,
                    e.upstream_status,
                    e.upstream_connect_time,
                    e.upstream_header_time,
                    e.upstream_response_time,
                    e.user_agent,
                    e.referer,
                    g.country,
                    g.country_code,
                    g.city,
                    g.region,
                    g.latitude,
                    g.longitude,
                    g.timezone,
                    g.isp,
                ])
                .map_err(db_err("액세스 로그 저장 실패"))?;
            }
        }
        tx.commit().map_err(db_err("트랜잭션 커밋 실패"))?;

        debug!("액세스 로그 {}건 저장", items.len());
        Ok(())
    }

    pub(super) fn query_access_logs_sync(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<LogItem>, CoreError> {
        let mut params = range_params(range);
        let scope_sql = scope_clause(scope, "agent_id", &mut params);
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM access_logs
             WHERE timestamp_ms >= ? AND timestamp_ms <= ?{scope_sql}
             ORDER BY timestamp_ms ASC, id ASC"
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err("쿼리 준비 실패"))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), row_to_log_item)
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(db_err("행 읽기 실패"))?);
        }
        Ok(items)
    }

    pub(super) fn query_log_samples_sync(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<LogSample>, CoreError> {
        let mut params = range_params(range);
        let scope_sql = scope_clause(scope, "agent_id", &mut params);
        let sql = format!(
            "SELECT timestamp_ms, agent_id, remote_addr, request_uri, status,
                    body_bytes_sent, request_time
             FROM access_logs
             WHERE timestamp_ms >= ? AND timestamp_ms <= ?{scope_sql}
             ORDER BY timestamp_ms ASC, id ASC"
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err("쿼리 준비 실패"))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(LogSample {
                    timestamp: from_millis(row.get(0)?),
                    agent_id: row.get(1)?,
                    remote_addr: row.get(2)?,
                    request_uri: row.get(3)?,
                    status: row.get(4)?,
                    body_bytes_sent: row.get(5)?,
                    request_time: row.get(6)?,
                })
            })
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row.map_err(db_err("행 읽기 실패"))?);
        }
        Ok(samples)
    }

    pub(super) fn query_recent_logs_sync(
        &self,
        range: TimeRange,
        scope: &AgentScope,
        limit: usize,
    ) -> Result<Vec<LogItem>, CoreError> {
        let mut params = range_params(range);
        let scope_sql = scope_clause(scope, "agent_id", &mut params);
        params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM access_logs
             WHERE timestamp_ms >= ? AND timestamp_ms <= ?{scope_sql}
             ORDER BY timestamp_ms DESC, id DESC
             LIMIT ?"
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err("쿼리 준비 실패"))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), row_to_log_item)
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(db_err("행 읽기 실패"))?);
        }
        Ok(items)
    }

    pub(super) fn sum_access_logs_sync(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<LogTotals, CoreError> {
        let mut params = range_params(range);
        let scope_sql = scope_clause(scope, "agent_id", &mut params);
        let sql = format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status >= 400 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(MAX(body_bytes_sent, 0)), 0),
                    COALESCE(SUM(request_time), 0.0)
             FROM access_logs
             WHERE timestamp_ms >= ? AND timestamp_ms <= ? AND status > 0{scope_sql}"
        );

        let conn = self.lock()?;
        conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| {
            Ok(LogTotals {
                requests: row.get::<_, i64>(0)?.max(0) as u64,
                errors: row.get::<_, i64>(1)?.max(0) as u64,
                bytes: row.get::<_, i64>(2)?.max(0) as u64,
                latency_sum: row.get(3)?,
            })
        })
        .map_err(db_err("액세스 로그 합계 조회 실패"))
    }

    pub(super) fn count_statuses_sync(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<(i32, u64)>, CoreError> {
        let mut params = range_params(range);
        let scope_sql = scope_clause(scope, "agent_id", &mut params);
        let sql = format!(
            "SELECT status, COUNT(*) FROM access_logs
             WHERE timestamp_ms >= ? AND timestamp_ms <= ? AND status > 0{scope_sql}
             GROUP BY status
             ORDER BY status ASC"
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err("쿼리 준비 실패"))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok((row.get::<_, i32>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
            })
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row.map_err(db_err("행 읽기 실패"))?);
        }
        Ok(counts)
    }
}

fn row_to_log_item(row: &Row<'_>) -> rusqlite::Result<LogItem> {
    let timestamp = from_millis(row.get(0)?);
    Ok(LogItem {
        timestamp,
        agent_id: row.get(1)?,
        client_ip: row.get(4)?,
        entry: LogEntry {
            timestamp: timestamp.timestamp(),
            remote_addr: row.get(2)?,
            x_forwarded_for: row.get(3)?,
            request_method: row.get(5)?,
            request_uri: row.get(6)?,
            status: row.get(7)?,
            body_bytes_sent: row.get(8)?,
            request_time: row.get(9)?,
            request_id: row.get(10)?,
            upstream_addr: row.get(11)?,
            upstream_status: row.get(12)?,
            upstream_connect_time: row.get(13)?,
            upstream_header_time: row.get(14)?,
            upstream_response_time: row.get(15)?,
            user_agent: row.get(16)?,
            referer: row.get(17)?,
        },
        geo: GeoLocation {
            country: row.get(18)?,
            country_code: row.get(19)?,
            city: row.get(20)?,
            region: row.get(21)?,
            latitude: row.get(22)?,
            longitude: row.get(23)?,
            timezone: row.get(24)?,
            isp: row.get(25)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use fleetgate_core::ports::telemetry_store::TelemetryStore;

    fn log_item(agent: &str, secs: i64, status: i32) -> LogItem {
        let timestamp = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        LogItem {
            entry: LogEntry {
                timestamp: timestamp.timestamp(),
                request_uri: format!("/api/{secs}"),
                request_method: "GET".to_string(),
                status,
                request_time: 0.125,
                body_bytes_sent: 512,
                ..Default::default()
            },
            agent_id: agent.to_string(),
            client_ip: "8.8.8.8".to_string(),
            geo: GeoLocation {
                country: "United States".to_string(),
                country_code: "US".to_string(),
                ..Default::default()
            },
            timestamp,
        }
    }

    #[tokio::test]
    async fn insert_and_query_by_range() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let items = vec![
            log_item("a1", 0, 200),
            log_item("a1", 60, 500),
            log_item("a2", 120, 404),
        ];
        storage.insert_access_logs(&items).await.unwrap();

        let start = items[0].timestamp;
        let all = storage
            .query_access_logs(
                TimeRange::new(start, start + Duration::seconds(120)),
                &AgentScope::All,
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].entry.status, 500);
        assert_eq!(all[0].geo.country_code, "US");
        assert!((all[0].entry.request_time - 0.125).abs() < 1e-9);

        let narrow = storage
            .query_access_logs(
                TimeRange::new(start + Duration::seconds(1), start + Duration::seconds(60)),
                &AgentScope::All,
            )
            .await
            .unwrap();
        assert_eq!(narrow.len(), 1);
    }

    #[tokio::test]
    async fn query_respects_scope() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let items = vec![
            log_item("a1", 0, 200),
            log_item("a2", 1, 200),
            log_item("a3", 2, 200),
        ];
        storage.insert_access_logs(&items).await.unwrap();
        let range = TimeRange::new(items[0].timestamp, items[2].timestamp);

        let single = storage
            .query_access_logs(range, &AgentScope::Single("a2".to_string()))
            .await
            .unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].agent_id, "a2");

        let list = storage
            .query_access_logs(
                range,
                &AgentScope::List(vec!["a1".to_string(), "a3".to_string()]),
            )
            .await
            .unwrap();
        assert_eq!(list.len(), 2);
    }

    #[tokio::test]
    async fn samples_recent_and_totals() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut items = vec![
            log_item("a1", 0, 200),
            log_item("a1", 10, 503),
            log_item("a2", 20, 0),
            log_item("a2", 30, 404),
        ];
        items[3].entry.body_bytes_sent = -7;
        storage.insert_access_logs(&items).await.unwrap();
        let range = TimeRange::new(items[0].timestamp, items[3].timestamp);

        let samples = storage
            .query_log_samples(range, &AgentScope::All)
            .await
            .unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[1].status, 503);
        assert_eq!(samples[1].request_uri, "/api/10");
        assert_eq!(samples[3].agent_id, "a2");

        let recent = storage
            .query_recent_logs(range, &AgentScope::All, 2)
            .await
            .unwrap();
        let uris: Vec<&str> = recent.iter().map(|l| l.entry.request_uri.as_str()).collect();
        assert_eq!(uris, vec!["/api/30", "/api/20"]);

        let totals = storage
            .sum_access_logs(range, &AgentScope::All)
            .await
            .unwrap();
        assert_eq!(totals.requests, 3);
        assert_eq!(totals.errors, 2);
        assert_eq!(totals.bytes, 1024);
        assert!((totals.latency_sum - 0.375).abs() < 1e-9);

        let single = storage
            .sum_access_logs(range, &AgentScope::Single("a2".to_string()))
            .await
            .unwrap();
        assert_eq!(single.requests, 1);

        let statuses = storage
            .count_statuses(range, &AgentScope::All)
            .await
            .unwrap();
        assert_eq!(statuses, vec![(200, 1), (404, 1), (503, 1)]);
    }

    #[tokio::test]
    async fn empty_range_totals_are_zero() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let range = TimeRange::new(start, start + Duration::hours(1));
        let totals = storage
            .sum_access_logs(range, &AgentScope::All)
            .await
            .unwrap();
        assert_eq!(totals, LogTotals::default());
        assert!(storage
            .count_statuses(range, &AgentScope::List(Vec::new()))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn waiting_on_connection_does_not_stall_runtime() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let holder_storage = storage.clone();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = std::thread::spawn(move || {
            let _conn = holder_storage.lock().unwrap();
            locked_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
        locked_rx.recv().unwrap();

        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let range = TimeRange::new(start, start + Duration::hours(1));
        let query = tokio::spawn({
            let storage = storage.clone();
            async move { storage.sum_access_logs(range, &AgentScope::All).await }
        });

        // 단일 스레드 런타임의 타이머가 잠금 대기 중에도 진행된다
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!query.is_finished());

        release_tx.send(()).unwrap();
        let totals = query.await.unwrap().unwrap();
        assert_eq!(totals.requests, 0);
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn empty_batch_is_noop() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.insert_access_logs(&[]).await.unwrap();
    }
}
