//! SQLite 저장소 어댑터.
//!
//! `TelemetryStore` + `AgentStore` + `AlertRuleStore` 포트 구현.
//!
//! # 모듈 구조
//! - `access_logs`: 액세스 로그 삽입/조회
//! - `spans`: 스팬 삽입, 루트 스팬/트레이스 조회
//! - `metrics`: 시스템/프록시/게이트웨이 메트릭
//! - `maintenance`: TTL 정리, 에이전트 데이터 삭제
//! - `agents`: 에이전트 인벤토리 (AgentStore 포트)
//! - `alert_rules`: 알림 규칙 (AlertRuleStore 포트)

mod access_logs;
mod agents;
mod alert_rules;
mod maintenance;
mod metrics;
mod spans;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetgate_core::config::RetentionPolicy;
use fleetgate_core::error::CoreError;
use fleetgate_core::models::analytics::{AgentScope, LogSample, LogTotals, TimeRange, TraceFilter};
use fleetgate_core::models::telemetry::{
    GatewayMetricItem, LogItem, ProxyMetricItem, SpanItem, SystemMetricItem,
};
use fleetgate_core::ports::telemetry_store::{PurgeReport, TelemetryStore};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

use crate::migration;

/// SQLite 저장소: 시계열 + 메타데이터 포트 구현
///
/// 복제본은 같은 연결을 공유한다.
#[derive(Clone)]
pub struct SqliteStorage {
    pub(super) conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// 파일 기반 SQLite 저장소 생성
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path)
            .map_err(|e| CoreError::Storage(format!("SQLite 열기 실패: {e}")))?;

        // 쓰기 위주 워크로드용 PRAGMA
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA cache_size=8000;
            PRAGMA temp_store=MEMORY;
            PRAGMA mmap_size=268435456;
            PRAGMA page_size=4096;
            ",
        )
        .map_err(|e| CoreError::Storage(format!("PRAGMA 설정 실패: {e}")))?;

        migration::run_migrations(&conn)
            .map_err(|e| CoreError::Storage(format!("마이그레이션 실패: {e}")))?;

        info!("SQLite 저장소 초기화: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 인메모리 SQLite 저장소 생성 (테스트용)
    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CoreError::Storage(format!("인메모리 SQLite 생성 실패: {e}")))?;

        migration::run_migrations(&conn)
            .map_err(|e| CoreError::Storage(format!("마이그레이션 실패: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 연결 잠금
    pub(super) fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("잠금 획득 실패: {e}")))
    }
}

// ============================================================
// 공용 헬퍼
// ============================================================

/// rusqlite 에러 → 저장소 에러
pub(super) fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> CoreError {
    move |e| CoreError::Storage(format!("{context}: {e}"))
}

/// 밀리초 → UTC 시각
pub(super) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// 마이크로초 → UTC 시각
pub(super) fn from_micros(us: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(us).unwrap_or_default()
}

/// 에이전트 범위 WHERE 조각 생성 (파라미터는 `params`에 추가)
///
/// 빈 목록은 아무 행도 매칭하지 않는다.
pub(super) fn scope_clause(scope: &AgentScope, column: &str, params: &mut Vec<Value>) -> String {
    match scope {
        AgentScope::All => String::new(),
        AgentScope::Single(id) => {
            params.push(Value::Text(id.clone()));
            format!(" AND {column} = ?")
        }
        AgentScope::List(ids) if ids.is_empty() => " AND 0".to_string(),
        AgentScope::List(ids) => {
            let placeholders = vec!["?"; ids.len()].join(",");
            params.extend(ids.iter().cloned().map(Value::Text));
            format!(" AND {column} IN ({placeholders})")
        }
    }
}

/// 범위 WHERE 조각 (`timestamp_ms` 기준, 양 끝 포함)
pub(super) fn range_params(range: TimeRange) -> Vec<Value> {
    vec![
        Value::Integer(range.start.timestamp_millis()),
        Value::Integer(range.end.timestamp_millis()),
    ]
}

// ============================================================
// TelemetryStore 포트: 동기 구현을 블로킹 풀에서 실행
// ============================================================

/// 동기 저장소 작업을 블로킹 스레드 풀에서 실행
///
/// 연결 잠금과 SQLite I/O가 비동기 워커 스레드를 점유하지 않는다.
async fn run_blocking<T, F>(task: F) -> Result<T, CoreError>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| CoreError::Internal(format!("저장소 작업 실패: {e}")))?
}

#[async_trait]
impl TelemetryStore for SqliteStorage {
    async fn insert_access_logs(&self, items: &[LogItem]) -> Result<(), CoreError> {
        let storage = self.clone();
        let items = items.to_vec();
        run_blocking(move || storage.insert_access_logs_sync(&items)).await
    }

    async fn insert_spans(&self, items: &[SpanItem]) -> Result<(), CoreError> {
        let storage = self.clone();
        let items = items.to_vec();
        run_blocking(move || storage.insert_spans_sync(&items)).await
    }

    async fn insert_system_metrics(&self, items: &[SystemMetricItem]) -> Result<(), CoreError> {
        let storage = self.clone();
        let items = items.to_vec();
        run_blocking(move || storage.insert_system_metrics_sync(&items)).await
    }

    async fn insert_proxy_metrics(&self, items: &[ProxyMetricItem]) -> Result<(), CoreError> {
        let storage = self.clone();
        let items = items.to_vec();
        run_blocking(move || storage.insert_proxy_metrics_sync(&items)).await
    }

    async fn insert_gateway_metrics(&self, items: &[GatewayMetricItem]) -> Result<(), CoreError> {
        let storage = self.clone();
        let items = items.to_vec();
        run_blocking(move || storage.insert_gateway_metrics_sync(&items)).await
    }

    async fn query_access_logs(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<LogItem>, CoreError> {
        let storage = self.clone();
        let scope = scope.clone();
        run_blocking(move || storage.query_access_logs_sync(range, &scope)).await
    }

    async fn query_log_samples(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<LogSample>, CoreError> {
        let storage = self.clone();
        let scope = scope.clone();
        run_blocking(move || storage.query_log_samples_sync(range, &scope)).await
    }

    async fn query_recent_logs(
        &self,
        range: TimeRange,
        scope: &AgentScope,
        limit: usize,
    ) -> Result<Vec<LogItem>, CoreError> {
        let storage = self.clone();
        let scope = scope.clone();
        run_blocking(move || storage.query_recent_logs_sync(range, &scope, limit)).await
    }

    async fn sum_access_logs(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<LogTotals, CoreError> {
        let storage = self.clone();
        let scope = scope.clone();
        run_blocking(move || storage.sum_access_logs_sync(range, &scope)).await
    }

    async fn count_statuses(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<(i32, u64)>, CoreError> {
        let storage = self.clone();
        let scope = scope.clone();
        run_blocking(move || storage.count_statuses_sync(range, &scope)).await
    }

    async fn query_system_metrics(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<SystemMetricItem>, CoreError> {
        let storage = self.clone();
        let scope = scope.clone();
        run_blocking(move || storage.query_system_metrics_sync(range, &scope)).await
    }

    async fn query_proxy_metrics(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<ProxyMetricItem>, CoreError> {
        let storage = self.clone();
        let scope = scope.clone();
        run_blocking(move || storage.query_proxy_metrics_sync(range, &scope)).await
    }

    async fn query_gateway_metrics(
        &self,
        range: TimeRange,
    ) -> Result<Vec<GatewayMetricItem>, CoreError> {
        let storage = self.clone();
        run_blocking(move || storage.query_gateway_metrics_sync(range)).await
    }

    async fn query_root_spans(
        &self,
        since: DateTime<Utc>,
        filter: &TraceFilter,
    ) -> Result<Vec<SpanItem>, CoreError> {
        let storage = self.clone();
        let filter = filter.clone();
        run_blocking(move || storage.query_root_spans_sync(since, &filter)).await
    }

    async fn query_trace(
        &self,
        agent_id: &str,
        trace_id: &str,
    ) -> Result<Vec<SpanItem>, CoreError> {
        let storage = self.clone();
        let (agent_id, trace_id) = (agent_id.to_string(), trace_id.to_string());
        run_blocking(move || storage.query_trace_sync(&agent_id, &trace_id)).await
    }

    async fn delete_agent_data(&self, agent_id: &str) -> Result<usize, CoreError> {
        let storage = self.clone();
        let agent_id = agent_id.to_string();
        run_blocking(move || storage.delete_agent_data_sync(&agent_id)).await
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> Result<PurgeReport, CoreError> {
        let storage = self.clone();
        let policy = *policy;
        run_blocking(move || storage.purge_expired_sync(now, &policy)).await
    }
}
