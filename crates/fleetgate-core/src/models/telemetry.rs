//! 텔레메트리 모델.
//!
//! 에이전트가 보고하는 액세스 로그/메트릭 원본과,
//! 인제스트 파이프라인이 큐에 넣는 다섯 종류의 텔레메트리 항목.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================
// 에이전트 원본 페이로드
// ============================================================

/// 프록시 액세스 로그 한 줄 (에이전트 파싱 결과)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    /// 요청 완료 시각 (Unix 초, 0이면 수신 시각 사용)
    pub timestamp: i64,
    /// 원격 주소
    pub remote_addr: String,
    /// X-Forwarded-For 헤더
    pub x_forwarded_for: String,
    /// HTTP 메서드
    pub request_method: String,
    /// 요청 URI
    pub request_uri: String,
    /// 응답 상태 코드
    pub status: i32,
    /// 응답 바디 크기 (바이트)
    pub body_bytes_sent: i64,
    /// 요청 처리 시간 (초)
    pub request_time: f64,
    /// 요청 ID (트레이스 ID로 사용)
    pub request_id: String,
    /// 업스트림 주소
    pub upstream_addr: String,
    /// 업스트림 상태
    pub upstream_status: String,
    /// 업스트림 연결 시간 (초)
    pub upstream_connect_time: f64,
    /// 업스트림 헤더 수신 시간 (초)
    pub upstream_header_time: f64,
    /// 업스트림 응답 시간 (초)
    pub upstream_response_time: f64,
    /// User-Agent
    pub user_agent: String,
    /// Referer
    pub referer: String,
}

/// 에이전트 호스트 시스템 메트릭
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemMetrics {
    /// CPU 사용률 (0.0 ~ 100.0)
    pub cpu_usage_percent: f64,
    /// 메모리 사용률 (0.0 ~ 100.0)
    pub memory_usage_percent: f64,
    /// 전체 메모리 (바이트)
    pub memory_total_bytes: u64,
    /// 사용 메모리 (바이트)
    pub memory_used_bytes: u64,
    /// 누적 수신 바이트
    pub network_rx_bytes: u64,
    /// 누적 송신 바이트
    pub network_tx_bytes: u64,
    /// 수신 속도 (bytes/sec)
    pub network_rx_rate: f64,
    /// 송신 속도 (bytes/sec)
    pub network_tx_rate: f64,
    /// 사용자 모드 CPU
    pub cpu_user_percent: f64,
    /// 시스템 모드 CPU
    pub cpu_system_percent: f64,
    /// I/O 대기 CPU
    pub cpu_iowait_percent: f64,
}

/// 프록시 stub_status 메트릭 (+ 선택적 시스템 메트릭)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyMetrics {
    /// 활성 연결
    pub active_connections: u64,
    /// 누적 수락 연결
    pub accepted_connections: u64,
    /// 누적 처리 연결
    pub handled_connections: u64,
    /// 누적 요청 수
    pub total_requests: u64,
    /// 요청 읽는 중
    pub reading: u64,
    /// 응답 쓰는 중
    pub writing: u64,
    /// keep-alive 대기
    pub waiting: u64,
    /// 호스트 시스템 메트릭
    pub system: Option<SystemMetrics>,
}

/// 지리 위치 (GeoIP 조회 결과)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoLocation {
    /// 국가명
    pub country: String,
    /// ISO 국가 코드
    pub country_code: String,
    /// 도시
    pub city: String,
    /// 지역
    pub region: String,
    /// 위도
    pub latitude: f64,
    /// 경도
    pub longitude: f64,
    /// 타임존
    pub timezone: String,
    /// ISP
    pub isp: String,
}

impl GeoLocation {
    /// 빈 위치 여부 (국가 미상)
    pub fn is_empty(&self) -> bool {
        self.country.is_empty()
    }
}

// ============================================================
// 파이프라인 항목
// ============================================================

/// 보강된 액세스 로그 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogItem {
    /// 원본 로그
    pub entry: LogEntry,
    /// 에이전트 ID
    pub agent_id: String,
    /// 추출된 클라이언트 IP
    pub client_ip: String,
    /// 지리 위치
    pub geo: GeoLocation,
    /// 정규화된 요청 시각
    pub timestamp: DateTime<Utc>,
}

/// 파생 스팬 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanItem {
    /// 트레이스 ID
    pub trace_id: String,
    /// 스팬 ID
    pub span_id: String,
    /// 부모 스팬 ID (루트는 빈 문자열)
    pub parent_id: String,
    /// 스팬 이름 ("request", "upstream", "upstream_connect")
    pub name: String,
    /// 시작 시각
    pub start: DateTime<Utc>,
    /// 종료 시각
    pub end: DateTime<Utc>,
    /// 속성
    pub attributes: BTreeMap<String, String>,
    /// 에이전트 ID
    pub agent_id: String,
}

impl SpanItem {
    /// 스팬 길이 (밀리초)
    pub fn duration_ms(&self) -> f64 {
        (self.end - self.start)
            .num_microseconds()
            .map(|us| us as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

/// 에이전트 시스템 메트릭 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetricItem {
    /// 에이전트 ID
    pub agent_id: String,
    /// 수신 시각
    pub timestamp: DateTime<Utc>,
    /// 메트릭 값
    pub metrics: SystemMetrics,
}

/// 프록시 메트릭 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyMetricItem {
    /// 에이전트 ID
    pub agent_id: String,
    /// 수신 시각
    pub timestamp: DateTime<Utc>,
    /// 활성 연결
    pub active_connections: u64,
    /// 누적 수락 연결
    pub accepted_connections: u64,
    /// 누적 처리 연결
    pub handled_connections: u64,
    /// 누적 요청 수
    pub total_requests: u64,
    /// 요청 읽는 중
    pub reading: u64,
    /// 응답 쓰는 중
    pub writing: u64,
    /// keep-alive 대기
    pub waiting: u64,
    /// 카운터 차분 기반 초당 요청 수
    pub requests_per_second: f64,
}

impl ProxyMetricItem {
    /// 원본 메트릭과 계산된 rps로 항목 생성
    pub fn from_metrics(
        agent_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        metrics: &ProxyMetrics,
        requests_per_second: f64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp,
            active_connections: metrics.active_connections,
            accepted_connections: metrics.accepted_connections,
            handled_connections: metrics.handled_connections,
            total_requests: metrics.total_requests,
            reading: metrics.reading,
            writing: metrics.writing,
            waiting: metrics.waiting,
            requests_per_second,
        }
    }
}

/// 게이트웨이 자체 메트릭 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMetricItem {
    /// 게이트웨이 ID
    pub gateway_id: String,
    /// 수집 시각
    pub timestamp: DateTime<Utc>,
    /// 초당 수신 메시지
    pub eps: f64,
    /// 온라인 에이전트 수
    pub active_connections: u64,
    /// 프로세스 CPU 사용률
    pub cpu_usage: f64,
    /// 프로세스 메모리 (MB)
    pub memory_mb: f64,
    /// 살아있는 비동기 태스크 수
    pub task_count: u64,
    /// 평균 저장소 쓰기 지연 (ms)
    pub db_latency_ms: f64,
}

/// 텔레메트리 항목 (스트림별 variant)
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryItem {
    /// 액세스 로그
    Log(LogItem),
    /// 파생 스팬
    Span(SpanItem),
    /// 시스템 메트릭
    System(SystemMetricItem),
    /// 프록시 메트릭
    Proxy(ProxyMetricItem),
    /// 게이트웨이 자체 메트릭
    Gateway(GatewayMetricItem),
}

impl TelemetryItem {
    /// 항목 종류
    pub fn kind(&self) -> TelemetryKind {
        match self {
            Self::Log(_) => TelemetryKind::Log,
            Self::Span(_) => TelemetryKind::Span,
            Self::System(_) => TelemetryKind::System,
            Self::Proxy(_) => TelemetryKind::Proxy,
            Self::Gateway(_) => TelemetryKind::Gateway,
        }
    }
}

/// 텔레메트리 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryKind {
    /// 액세스 로그
    Log,
    /// 스팬
    Span,
    /// 시스템 메트릭
    System,
    /// 프록시 메트릭
    Proxy,
    /// 게이트웨이 메트릭
    Gateway,
}

impl TelemetryKind {
    /// 모든 종류
    pub const ALL: [TelemetryKind; 5] = [
        TelemetryKind::Log,
        TelemetryKind::Span,
        TelemetryKind::System,
        TelemetryKind::Proxy,
        TelemetryKind::Gateway,
    ];

    /// 이름 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Span => "span",
            Self::System => "system",
            Self::Proxy => "proxy",
            Self::Gateway => "gateway",
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
