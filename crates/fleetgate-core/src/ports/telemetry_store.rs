//! 시계열 저장소 포트.
//!
//! 구현: `fleetgate-storage` crate (rusqlite)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::RetentionPolicy;
use crate::error::CoreError;
use crate::models::analytics::{AgentScope, LogSample, LogTotals, TimeRange, TraceFilter};
use crate::models::telemetry::{
    GatewayMetricItem, LogItem, ProxyMetricItem, SpanItem, SystemMetricItem,
};

/// TTL 정리 결과 (테이블별 삭제 행 수)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// 액세스 로그
    pub access_logs: usize,
    /// 스팬
    pub spans: usize,
    /// 시스템/프록시/게이트웨이 메트릭
    pub metrics: usize,
}

impl PurgeReport {
    /// 총 삭제 행 수
    pub fn total(&self) -> usize {
        self.access_logs + self.spans + self.metrics
    }
}

/// 시계열 텔레메트리 저장소
///
/// 다섯 테이블의 벌크 삽입, 범위+에이전트 범위 조회, 트레이스 조회, 보존 정리.
/// 집계 질의는 원본 행 대신 투영/합계를 돌려준다.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    // ============================================================
    // 벌크 삽입 (배치 플러셔 전용)
    // ============================================================

    /// 액세스 로그 벌크 삽입
    async fn insert_access_logs(&self, items: &[LogItem]) -> Result<(), CoreError>;

    /// 스팬 벌크 삽입
    async fn insert_spans(&self, items: &[SpanItem]) -> Result<(), CoreError>;

    /// 시스템 메트릭 벌크 삽입
    async fn insert_system_metrics(&self, items: &[SystemMetricItem]) -> Result<(), CoreError>;

    /// 프록시 메트릭 벌크 삽입
    async fn insert_proxy_metrics(&self, items: &[ProxyMetricItem]) -> Result<(), CoreError>;

    /// 게이트웨이 메트릭 벌크 삽입
    async fn insert_gateway_metrics(&self, items: &[GatewayMetricItem]) -> Result<(), CoreError>;

    // ============================================================
    // 범위 조회
    // ============================================================

    /// 범위 내 액세스 로그 (시각 오름차순)
    async fn query_access_logs(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<LogItem>, CoreError>;

    /// 범위 내 액세스 로그의 집계용 컬럼만 (시각 오름차순)
    async fn query_log_samples(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<LogSample>, CoreError>;

    /// 범위 내 최신 액세스 로그 `limit`건 (최신 순)
    async fn query_recent_logs(
        &self,
        range: TimeRange,
        scope: &AgentScope,
        limit: usize,
    ) -> Result<Vec<LogItem>, CoreError>;

    // ============================================================
    // 저장소 측 집계
    // ============================================================

    /// 범위 내 요청/에러/바이트/지연 합계
    async fn sum_access_logs(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<LogTotals, CoreError>;

    /// 범위 내 상태 코드별 건수 (상태 코드 오름차순, 0 제외)
    async fn count_statuses(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<(i32, u64)>, CoreError>;

    /// 범위 내 시스템 메트릭 (시각 오름차순)
    async fn query_system_metrics(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<SystemMetricItem>, CoreError>;

    /// 범위 내 프록시 메트릭 (시각 오름차순)
    async fn query_proxy_metrics(
        &self,
        range: TimeRange,
        scope: &AgentScope,
    ) -> Result<Vec<ProxyMetricItem>, CoreError>;

    /// 범위 내 게이트웨이 메트릭 (에이전트 범위 무관)
    async fn query_gateway_metrics(
        &self,
        range: TimeRange,
    ) -> Result<Vec<GatewayMetricItem>, CoreError>;

    // ============================================================
    // 트레이스
    // ============================================================

    /// `since` 이후 루트 "request" 스팬 (최신 순, 필터 적용)
    async fn query_root_spans(
        &self,
        since: DateTime<Utc>,
        filter: &TraceFilter,
    ) -> Result<Vec<SpanItem>, CoreError>;

    /// 한 트레이스의 모든 스팬 (시작 시각 순)
    async fn query_trace(&self, agent_id: &str, trace_id: &str)
        -> Result<Vec<SpanItem>, CoreError>;

    // ============================================================
    // 정리
    // ============================================================

    /// 에이전트의 모든 텔레메트리 삭제
    async fn delete_agent_data(&self, agent_id: &str) -> Result<usize, CoreError>;

    /// 보존 기간 초과 행 삭제
    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> Result<PurgeReport, CoreError>;
}
