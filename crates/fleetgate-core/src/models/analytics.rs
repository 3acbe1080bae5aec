//! 분석 질의/응답 모델.
//!
//! 시간 범위, 에이전트 범위, 대시보드 분석 응답, 리포트, 트레이스, 지리 통계.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::telemetry::{LogItem, SpanItem};

// ============================================================
// 질의 파라미터
// ============================================================

/// 닫힌 시간 범위 `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// 시작 (포함)
    pub start: DateTime<Utc>,
    /// 종료 (포함)
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// 범위 생성
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `end`에서 `duration`만큼 거슬러 올라간 범위
    pub fn ending_at(end: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start: end - duration,
            end,
        }
    }

    /// 범위 길이
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// 직전 동일 길이 기간 `[start - duration, start)`
    pub fn previous(&self) -> Self {
        Self {
            start: self.start - self.duration(),
            end: self.start - Duration::milliseconds(1),
        }
    }

    /// 시각 포함 여부
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// 에이전트 범위
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum AgentScope {
    /// 전체 에이전트
    #[default]
    All,
    /// 단일 에이전트
    Single(String),
    /// 명시적 목록
    List(Vec<String>),
}

impl AgentScope {
    /// HTTP 파라미터에서 범위 결정
    ///
    /// `agent_ids`(쉼표 목록)가 있으면 목록, 아니면 `agent_id`가
    /// 비어있지 않고 "all"이 아니면 단일, 나머지는 전체.
    pub fn from_params(agent_id: Option<&str>, agent_ids: Option<&str>) -> Self {
        if let Some(list) = agent_ids {
            let ids: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !ids.is_empty() {
                return Self::List(ids);
            }
        }
        match agent_id.map(str::trim) {
            Some(id) if !id.is_empty() && id != "all" => Self::Single(id.to_string()),
            _ => Self::All,
        }
    }

    /// 에이전트 포함 여부
    pub fn includes(&self, agent_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Single(id) => id == agent_id,
            Self::List(ids) => ids.iter().any(|id| id == agent_id),
        }
    }

    /// 서버 분포 표시 대상 여부 (전체/목록)
    pub fn is_multi(&self) -> bool {
        !matches!(self, Self::Single(_))
    }
}

/// 대시보드 분석 질의
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsQuery {
    /// 상대 윈도우 ("5m" ~ "30d")
    pub window: String,
    /// 절대 시작 (ms, 0이면 미사용)
    pub from_ms: i64,
    /// 절대 종료 (ms, 0이면 미사용)
    pub to_ms: i64,
    /// 에이전트 범위
    pub scope: AgentScope,
    /// 클라이언트 타임존 (IANA)
    pub timezone: String,
}

// ============================================================
// 저장소 집계 결과
// ============================================================

/// 집계용 액세스 로그 투영
///
/// 버킷/백분위/순위 계산에 필요한 컬럼만 담는다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSample {
    /// 수집 시각
    pub timestamp: DateTime<Utc>,
    /// 에이전트 ID
    pub agent_id: String,
    /// 원격 주소
    pub remote_addr: String,
    /// 요청 URI
    pub request_uri: String,
    /// 응답 상태 (0 = 응답 없음)
    pub status: i32,
    /// 응답 바이트
    pub body_bytes_sent: i64,
    /// 처리 시간 (초)
    pub request_time: f64,
}

impl From<&LogItem> for LogSample {
    fn from(item: &LogItem) -> Self {
        Self {
            timestamp: item.timestamp,
            agent_id: item.agent_id.clone(),
            remote_addr: item.entry.remote_addr.clone(),
            request_uri: item.entry.request_uri.clone(),
            status: item.entry.status,
            body_bytes_sent: item.entry.body_bytes_sent,
            request_time: item.entry.request_time,
        }
    }
}

/// 범위 내 액세스 로그 합계 (상태 코드 0 행 제외)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LogTotals {
    /// 요청 수
    pub requests: u64,
    /// 4xx/5xx 수
    pub errors: u64,
    /// 전송 바이트 (음수 값은 0)
    pub bytes: u64,
    /// 처리 시간 합 (초)
    pub latency_sum: f64,
}

// ============================================================
// 대시보드 응답
// ============================================================

/// 요청 수 시계열 포인트
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// 버킷 라벨
    pub time: String,
    /// 요청 수
    pub requests: u64,
    /// 에러 수
    pub errors: u64,
}

/// 상태 코드별 요청 수
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    /// 상태 코드 문자열
    pub code: String,
    /// 요청 수
    pub count: u64,
}

/// 엔드포인트 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointStat {
    /// URI
    pub uri: String,
    /// 요청 수
    pub requests: u64,
    /// 에러 수
    pub errors: u64,
    /// p95 지연 (ms)
    pub p95: f64,
    /// 트래픽 (사람이 읽는 형식)
    pub traffic: String,
}

/// 지연 백분위 포인트 (ms)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPoint {
    /// 버킷 라벨
    pub time: String,
    /// p50
    pub p50: f64,
    /// p95
    pub p95: f64,
    /// p99
    pub p99: f64,
}

/// 요약 KPI (직전 기간 대비 변화량 포함)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    /// 총 요청 수
    pub total_requests: u64,
    /// 에러율 (%)
    pub error_rate: f64,
    /// 평균 지연 (ms)
    pub avg_latency: f64,
    /// 총 전송 바이트
    pub total_bandwidth: u64,
    /// 요청 수 변화량
    pub requests_delta: f64,
    /// 평균 지연 변화량 (ms)
    pub latency_delta: f64,
    /// 에러율 변화량 (%p)
    pub error_rate_delta: f64,
}

/// 지연 히스토그램 버킷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyBucket {
    /// 버킷 라벨 ("0-50ms" 등)
    pub bucket: String,
    /// 요청 수
    pub count: u64,
}

/// 서버(에이전트)별 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStat {
    /// 에이전트 ID
    pub hostname: String,
    /// 요청 수
    pub requests: u64,
    /// 에러율 (%)
    pub error_rate: f64,
    /// 전송 바이트
    pub traffic: u64,
}

/// 시스템 메트릭 포인트 (버킷 평균)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetricPoint {
    /// 버킷 라벨
    pub time: String,
    /// CPU 사용률
    pub cpu_usage: f64,
    /// 메모리 사용률
    pub memory_usage: f64,
    /// 수신 속도
    pub network_rx_rate: f64,
    /// 송신 속도
    pub network_tx_rate: f64,
    /// 사용자 CPU
    pub cpu_user: f64,
    /// 시스템 CPU
    pub cpu_system: f64,
    /// I/O 대기
    pub cpu_iowait: f64,
}

/// 프록시 연결 포인트 (버킷 평균)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPoint {
    /// 버킷 라벨
    pub time: String,
    /// 평균 활성 연결
    pub active: f64,
    /// 평균 대기 연결
    pub waiting: f64,
    /// 평균 초당 요청
    pub requests: f64,
}

/// 상태 코드 계열별 시계열 + 24시간 합계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpStatusMetrics {
    /// 2xx 시계열
    pub status_2xx: Vec<TimeSeriesPoint>,
    /// 3xx 시계열
    pub status_3xx: Vec<TimeSeriesPoint>,
    /// 4xx 시계열
    pub status_4xx: Vec<TimeSeriesPoint>,
    /// 5xx 시계열
    pub status_5xx: Vec<TimeSeriesPoint>,
    /// 최근 24시간 200 합계
    pub total_200_24h: u64,
    /// 최근 24시간 404 합계
    pub total_404_24h: u64,
    /// 최근 24시간 503 합계
    pub total_503_24h: u64,
}

/// 인사이트 등급
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightLevel {
    /// 정보
    Info,
    /// 경고
    Warning,
    /// 심각
    Critical,
}

/// 파생 인사이트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// 등급
    #[serde(rename = "type")]
    pub level: InsightLevel,
    /// 제목
    pub title: String,
    /// 메시지
    pub message: String,
}

/// 최근 요청 (상세 로그 뷰)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentRequest {
    /// Unix 초
    pub timestamp: i64,
    /// 원격 주소
    pub remote_addr: String,
    /// HTTP 메서드
    pub request_method: String,
    /// URI
    pub request_uri: String,
    /// 상태 코드
    pub status: i32,
    /// 전송 바이트
    pub body_bytes_sent: i64,
    /// 요청 처리 시간 (초)
    pub request_time: f64,
    /// 업스트림 주소
    pub upstream_addr: String,
    /// 업스트림 상태
    pub upstream_status: String,
}

/// 게이트웨이 자체 메트릭 포인트 (버킷 평균)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayMetricPoint {
    /// 버킷 라벨
    pub time: String,
    /// 초당 메시지
    pub eps: f64,
    /// 활성 연결
    pub active_connections: f64,
    /// CPU 사용률
    pub cpu_usage: f64,
    /// 메모리 (MB)
    pub memory_mb: f64,
    /// 태스크 수
    pub task_count: f64,
    /// 저장소 지연 (ms)
    pub db_latency_ms: f64,
}

/// 대시보드 분석 응답
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResponse {
    /// 요청 수 시계열
    pub request_rate: Vec<TimeSeriesPoint>,
    /// 상태 코드 분포
    pub status_distribution: Vec<StatusCount>,
    /// 상위 엔드포인트
    pub top_endpoints: Vec<EndpointStat>,
    /// 지연 백분위 시계열
    pub latency_trend: Vec<LatencyPoint>,
    /// 요약 KPI
    pub summary: AnalyticsSummary,
    /// 지연 히스토그램
    pub latency_distribution: Vec<LatencyBucket>,
    /// 서버 분포
    pub server_distribution: Vec<ServerStat>,
    /// 시스템 메트릭 시계열
    pub system_metrics: Vec<SystemMetricPoint>,
    /// 연결 시계열
    pub connections_history: Vec<ConnectionPoint>,
    /// 상태 코드 상세
    pub http_status_metrics: HttpStatusMetrics,
    /// 인사이트
    pub insights: Vec<Insight>,
    /// 최근 요청
    pub recent_requests: Vec<RecentRequest>,
    /// 게이트웨이 메트릭 시계열
    pub gateway_metrics: Vec<GatewayMetricPoint>,
}

// ============================================================
// 리포트
// ============================================================

/// 리포트 요약
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// 총 요청 수
    pub total_requests: u64,
    /// 에러율 (%)
    pub error_rate: f64,
    /// 총 전송 바이트
    pub total_bandwidth: u64,
    /// 평균 지연 (ms)
    pub avg_latency: f64,
    /// 고유 방문자 (원격 주소 기준)
    pub unique_visitors: u64,
}

/// 리포트 데이터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    /// 생성 시각 (Unix 초)
    pub generated_at: i64,
    /// 요약
    pub summary: ReportSummary,
    /// 트래픽 추이
    pub traffic_trend: Vec<TimeSeriesPoint>,
    /// 상위 URI
    pub top_uris: Vec<EndpointStat>,
    /// 상위 서버
    pub top_servers: Vec<ServerStat>,
}

// ============================================================
// 트레이스
// ============================================================

/// 트레이스 목록 필터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceFilter {
    /// 시간 윈도우 ("5m", "15m", "1h", "6h", "24h")
    pub window: String,
    /// 에이전트 범위
    pub scope: AgentScope,
    /// 상태 필터 ("5xx", "4xx", 정확한 코드)
    pub status: String,
    /// 메서드 필터
    pub method: String,
    /// URI 부분 문자열
    pub uri: String,
    /// 최대 개수 (0이면 100)
    pub limit: usize,
}

/// 트레이스 (요청 ID 단위 스팬 묶음)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// 요청 ID
    pub request_id: String,
    /// 스팬 (시작 시각 순)
    pub spans: Vec<SpanItem>,
}

/// 트레이스 목록
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceList {
    /// 트레이스 (최신 순)
    pub traces: Vec<Trace>,
}

// ============================================================
// 지리 통계
// ============================================================

/// 위치별 집계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// 국가
    pub country: String,
    /// 국가 코드
    pub country_code: String,
    /// 도시
    pub city: String,
    /// 위도
    pub latitude: f64,
    /// 경도
    pub longitude: f64,
    /// 요청 수
    pub requests: u64,
    /// 에러 수
    pub errors: u64,
    /// 평균 지연 (ms)
    pub avg_latency: f64,
}

/// 국가별 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountryStat {
    /// 국가
    pub country: String,
    /// 국가 코드
    pub country_code: String,
    /// 요청 수
    pub requests: u64,
    /// 에러 수
    pub errors: u64,
    /// 전송 바이트
    pub bandwidth: u64,
    /// 에러율 (%)
    pub error_rate: f64,
}

/// 도시별 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityStat {
    /// 도시
    pub city: String,
    /// 국가
    pub country: String,
    /// 국가 코드
    pub country_code: String,
    /// 위도
    pub latitude: f64,
    /// 경도
    pub longitude: f64,
    /// 요청 수
    pub requests: u64,
}

/// 위치가 확인된 최근 요청
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoRequest {
    /// Unix 초
    pub timestamp: i64,
    /// 클라이언트 IP
    pub client_ip: String,
    /// 국가
    pub country: String,
    /// 국가 코드
    pub country_code: String,
    /// 도시
    pub city: String,
    /// 위도
    pub latitude: f64,
    /// 경도
    pub longitude: f64,
    /// 메서드
    pub method: String,
    /// URI
    pub uri: String,
    /// 상태 코드
    pub status: i32,
}

/// 지리 분석 응답
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoSummary {
    /// 위치별 집계
    pub locations: Vec<GeoPoint>,
    /// 국가별 통계
    pub country_stats: Vec<CountryStat>,
    /// 도시별 통계
    pub city_stats: Vec<CityStat>,
    /// 최근 요청
    pub recent_requests: Vec<GeoRequest>,
    /// 국가 수
    pub total_countries: u64,
    /// 도시 수
    pub total_cities: u64,
    /// 위치 확인 요청 수
    pub total_requests: u64,
    /// 최다 요청 국가 코드
    pub top_country_code: String,
}
