//! 스키마 마이그레이션.
//!
//! 버전 기반 SQLite 스키마 관리.
//! 시각은 INTEGER 밀리초(스팬은 마이크로초)로 저장한다.

use rusqlite::Connection;
use tracing::{debug, info};

/// 현재 스키마 버전
const CURRENT_VERSION: u32 = 3;

/// 스키마 마이그레이션 실행
pub fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = get_version(conn)?;
    info!("현재 스키마 버전: {current}, 목표: {CURRENT_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }

    if current < 2 {
        migrate_v2(conn)?;
    }

    if current < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// 현재 스키마 버전 조회
fn get_version(conn: &Connection) -> Result<u32, rusqlite::Error> {
    let result: Result<u32, _> = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    );
    result.or(Ok(0))
}

/// V1: access_logs + spans 테이블
fn migrate_v1(conn: &Connection) -> Result<(), rusqlite::Error> {
    debug!("마이그레이션 V1 실행: access_logs + spans 테이블");

    conn.execute_batch(
        "
        -- 액세스 로그 (지리 정보 포함)
        CREATE TABLE IF NOT EXISTS access_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp_ms INTEGER NOT NULL,
            agent_id TEXT NOT NULL,
            remote_addr TEXT NOT NULL DEFAULT '',
            x_forwarded_for TEXT NOT NULL DEFAULT '',
            client_ip TEXT NOT NULL DEFAULT '',
            request_method TEXT NOT NULL DEFAULT '',
            request_uri TEXT NOT NULL DEFAULT '',
            status INTEGER NOT NULL DEFAULT 0,
            body_bytes_sent INTEGER NOT NULL DEFAULT 0,
            request_time REAL NOT NULL DEFAULT 0,
            request_id TEXT NOT NULL DEFAULT '',
            upstream_addr TEXT NOT NULL DEFAULT '',
            upstream_status TEXT NOT NULL DEFAULT '',
            upstream_connect_time REAL NOT NULL DEFAULT 0,
            upstream_header_time REAL NOT NULL DEFAULT 0,
            upstream_response_time REAL NOT NULL DEFAULT 0,
            user_agent TEXT NOT NULL DEFAULT '',
            referer TEXT NOT NULL DEFAULT '',
            country TEXT NOT NULL DEFAULT '',
            country_code TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            region TEXT NOT NULL DEFAULT '',
            latitude REAL NOT NULL DEFAULT 0,
            longitude REAL NOT NULL DEFAULT 0,
            timezone TEXT NOT NULL DEFAULT '',
            isp TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_access_logs_ts ON access_logs(timestamp_ms);
        CREATE INDEX IF NOT EXISTS idx_access_logs_agent_ts ON access_logs(agent_id, timestamp_ms);

        -- 파생 스팬 (속성은 JSON 텍스트)
        CREATE TABLE IF NOT EXISTS spans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trace_id TEXT NOT NULL,
            span_id TEXT NOT NULL,
            parent_span_id TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL,
            start_us INTEGER NOT NULL,
            end_us INTEGER NOT NULL,
            attributes TEXT NOT NULL DEFAULT '{}',
            agent_id TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_spans_trace ON spans(agent_id, trace_id, start_us);
        CREATE INDEX IF NOT EXISTS idx_spans_name_start ON spans(name, start_us);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;

    info!("마이그레이션 V1 완료");
    Ok(())
}

/// V2: system_metrics + proxy_metrics + gateway_metrics 테이블
fn migrate_v2(conn: &Connection) -> Result<(), rusqlite::Error> {
    debug!("마이그레이션 V2 실행: 메트릭 테이블");

    conn.execute_batch(
        "
        -- 에이전트 호스트 시스템 메트릭
        CREATE TABLE IF NOT EXISTS system_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp_ms INTEGER NOT NULL,
            agent_id TEXT NOT NULL,
            cpu_usage REAL NOT NULL DEFAULT 0,
            memory_usage REAL NOT NULL DEFAULT 0,
            memory_total INTEGER NOT NULL DEFAULT 0,
            memory_used INTEGER NOT NULL DEFAULT 0,
            network_rx_bytes INTEGER NOT NULL DEFAULT 0,
            network_tx_bytes INTEGER NOT NULL DEFAULT 0,
            network_rx_rate REAL NOT NULL DEFAULT 0,
            network_tx_rate REAL NOT NULL DEFAULT 0,
            cpu_user REAL NOT NULL DEFAULT 0,
            cpu_system REAL NOT NULL DEFAULT 0,
            cpu_iowait REAL NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_system_metrics_ts ON system_metrics(timestamp_ms);
        CREATE INDEX IF NOT EXISTS idx_system_metrics_agent_ts ON system_metrics(agent_id, timestamp_ms);

        -- 프록시 연결/요청 카운터
        CREATE TABLE IF NOT EXISTS proxy_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp_ms INTEGER NOT NULL,
            agent_id TEXT NOT NULL,
            active_connections INTEGER NOT NULL DEFAULT 0,
            accepted_connections INTEGER NOT NULL DEFAULT 0,
            handled_connections INTEGER NOT NULL DEFAULT 0,
            total_requests INTEGER NOT NULL DEFAULT 0,
            reading INTEGER NOT NULL DEFAULT 0,
            writing INTEGER NOT NULL DEFAULT 0,
            waiting INTEGER NOT NULL DEFAULT 0,
            requests_per_second REAL NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_proxy_metrics_ts ON proxy_metrics(timestamp_ms);
        CREATE INDEX IF NOT EXISTS idx_proxy_metrics_agent_ts ON proxy_metrics(agent_id, timestamp_ms);

        -- 게이트웨이 자체 메트릭
        CREATE TABLE IF NOT EXISTS gateway_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp_ms INTEGER NOT NULL,
            gateway_id TEXT NOT NULL,
            eps REAL NOT NULL DEFAULT 0,
            active_connections INTEGER NOT NULL DEFAULT 0,
            cpu_usage REAL NOT NULL DEFAULT 0,
            memory_mb REAL NOT NULL DEFAULT 0,
            task_count INTEGER NOT NULL DEFAULT 0,
            db_latency_ms REAL NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_gateway_metrics_ts ON gateway_metrics(timestamp_ms);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )?;

    info!("마이그레이션 V2 완료");
    Ok(())
}

/// V3: agents + alert_rules 메타데이터 테이블
fn migrate_v3(conn: &Connection) -> Result<(), rusqlite::Error> {
    debug!("마이그레이션 V3 실행: agents + alert_rules 테이블");

    conn.execute_batch(
        "
        -- 에이전트 인벤토리
        CREATE TABLE IF NOT EXISTS agents (
            agent_id TEXT PRIMARY KEY,
            hostname TEXT NOT NULL DEFAULT '',
            version TEXT NOT NULL DEFAULT '',
            agent_version TEXT NOT NULL DEFAULT '',
            build_date TEXT NOT NULL DEFAULT '',
            git_commit TEXT NOT NULL DEFAULT '',
            git_branch TEXT NOT NULL DEFAULT '',
            instances_count INTEGER NOT NULL DEFAULT 0,
            uptime TEXT NOT NULL DEFAULT '',
            ip TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'offline',
            last_seen_ms INTEGER NOT NULL,
            is_pod INTEGER NOT NULL DEFAULT 0,
            pod_ip TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_agents_status_seen ON agents(status, last_seen_ms);

        -- 알림 규칙
        CREATE TABLE IF NOT EXISTS alert_rules (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            metric_type TEXT NOT NULL,
            comparison TEXT NOT NULL,
            threshold REAL NOT NULL,
            window_secs INTEGER NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            recipients TEXT NOT NULL DEFAULT ''
        );

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )?;

    info!("마이그레이션 V3 완료");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn migration_all_versions() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in [
            "access_logs",
            "spans",
            "system_metrics",
            "proxy_metrics",
            "gateway_metrics",
            "agents",
            "alert_rules",
        ] {
            assert!(table_exists(&conn, table), "{table} 테이블 누락");
        }

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, i64::from(CURRENT_VERSION));
    }
}
