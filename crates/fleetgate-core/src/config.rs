//! 게이트웨이 설정 구조체.
//!
//! 서버 포트, 저장소 경로/보존 기간, 인제스트 큐 용량, 에이전트 보존 정책,
//! 알림 엔진, SMTP 설정을 정의한다. 바이너리에서 `config` crate로
//! 기본값 → 설정 파일 → 환경변수(`FLEETGATE__SECTION__KEY`) 순으로 병합 로드.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 게이트웨이 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// 서버 바인드 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 인제스트 파이프라인 설정
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 에이전트 세션 설정
    #[serde(default)]
    pub agents: AgentsConfig,
    /// 알림 엔진 설정
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// SMTP 설정
    #[serde(default)]
    pub smtp: SmtpConfig,
    /// 분석 엔진 설정
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl GatewayConfig {
    /// 기본 설정 생성
    pub fn default_config() -> Self {
        Self::default()
    }

    /// 설정값 유효성 검증
    ///
    /// 0 용량/배치/주기는 플러셔가 동작할 수 없으므로 거부한다.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, queue) in self.ingest.queues() {
            if queue.queue_capacity == 0 {
                return Err(CoreError::Validation {
                    field: format!("ingest.{name}.queue_capacity"),
                    message: "0보다 커야 합니다".to_string(),
                });
            }
            if queue.batch_size == 0 {
                return Err(CoreError::Validation {
                    field: format!("ingest.{name}.batch_size"),
                    message: "0보다 커야 합니다".to_string(),
                });
            }
            if queue.flush_interval_ms == 0 {
                return Err(CoreError::Validation {
                    field: format!("ingest.{name}.flush_interval_ms"),
                    message: "0보다 커야 합니다".to_string(),
                });
            }
        }
        if self.ingest.self_metrics_interval_secs == 0 {
            return Err(CoreError::Validation {
                field: "ingest.self_metrics_interval_secs".to_string(),
                message: "0보다 커야 합니다".to_string(),
            });
        }
        if self.alerts.interval_secs == 0 {
            return Err(CoreError::Validation {
                field: "alerts.interval_secs".to_string(),
                message: "0보다 커야 합니다".to_string(),
            });
        }
        if self.agents.log_subscriber_buffer == 0 {
            return Err(CoreError::Validation {
                field: "agents.log_subscriber_buffer".to_string(),
                message: "0보다 커야 합니다".to_string(),
            });
        }
        if self.agents.persist_queue_capacity == 0 {
            return Err(CoreError::Validation {
                field: "agents.persist_queue_capacity".to_string(),
                message: "0보다 커야 합니다".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================
// 서버 설정
// ============================================================

/// 서버 바인드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 바인드 호스트
    #[serde(default = "default_host")]
    pub host: String,
    /// 에이전트 스트림 포트
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,
    /// HTTP 쿼리 API 포트
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// 게이트웨이 ID (`GATEWAY_ID` 환경변수가 우선, 둘 다 비면 호스트명)
    #[serde(default)]
    pub gateway_id: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_stream_port() -> u16 {
    5020
}

fn default_http_port() -> u16 {
    5021
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            stream_port: default_stream_port(),
            http_port: default_http_port(),
            gateway_id: String::new(),
        }
    }
}

impl ServerConfig {
    /// 에이전트 업데이트 URL 생성용 HTTP 주소
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

// ============================================================
// 저장소 설정
// ============================================================

/// 저장소 설정: 시계열/메타데이터 DB 경로와 테이블별 보존 기간
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 데이터 디렉토리 (None이면 플랫폼 기본 경로)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// 시계열 DB 파일 이름
    #[serde(default = "default_telemetry_db")]
    pub telemetry_db: String,
    /// 메타데이터 DB 파일 이름
    #[serde(default = "default_metadata_db")]
    pub metadata_db: String,
    /// 액세스 로그 보존 기간 (일)
    #[serde(default = "default_log_ttl_days")]
    pub log_ttl_days: u32,
    /// 스팬 보존 기간 (일)
    #[serde(default = "default_log_ttl_days")]
    pub span_ttl_days: u32,
    /// 메트릭 보존 기간 (일)
    #[serde(default = "default_metric_ttl_days")]
    pub metric_ttl_days: u32,
}

fn default_telemetry_db() -> String {
    "telemetry.db".to_string()
}

fn default_metadata_db() -> String {
    "metadata.db".to_string()
}

fn default_log_ttl_days() -> u32 {
    7
}

fn default_metric_ttl_days() -> u32 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            telemetry_db: default_telemetry_db(),
            metadata_db: default_metadata_db(),
            log_ttl_days: default_log_ttl_days(),
            span_ttl_days: default_log_ttl_days(),
            metric_ttl_days: default_metric_ttl_days(),
        }
    }
}

impl StorageConfig {
    /// 테이블별 보존 정책
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            log_ttl: Duration::from_secs(u64::from(self.log_ttl_days) * 86_400),
            span_ttl: Duration::from_secs(u64::from(self.span_ttl_days) * 86_400),
            metric_ttl: Duration::from_secs(u64::from(self.metric_ttl_days) * 86_400),
        }
    }
}

/// 시계열 테이블 보존 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// 액세스 로그 TTL
    pub log_ttl: Duration,
    /// 스팬 TTL
    pub span_ttl: Duration,
    /// 시스템/프록시/게이트웨이 메트릭 TTL
    pub metric_ttl: Duration,
}

// ============================================================
// 인제스트 설정
// ============================================================

/// 큐 하나의 용량/배치 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// 바운디드 큐 용량
    pub queue_capacity: usize,
    /// 배치 플러시 크기
    pub batch_size: usize,
    /// 플러시 주기 (밀리초)
    pub flush_interval_ms: u64,
}

impl QueueConfig {
    /// 플러시 주기 Duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

fn default_log_queue() -> QueueConfig {
    QueueConfig {
        queue_capacity: 100_000,
        batch_size: 10_000,
        flush_interval_ms: 100,
    }
}

fn default_span_queue() -> QueueConfig {
    QueueConfig {
        queue_capacity: 200_000,
        batch_size: 20_000,
        flush_interval_ms: 100,
    }
}

fn default_metric_queue() -> QueueConfig {
    QueueConfig {
        queue_capacity: 10_000,
        batch_size: 100,
        flush_interval_ms: 5_000,
    }
}

fn default_gateway_queue() -> QueueConfig {
    QueueConfig {
        queue_capacity: 1_000,
        batch_size: 100,
        flush_interval_ms: 5_000,
    }
}

fn default_self_metrics_interval_secs() -> u64 {
    10
}

/// 인제스트 파이프라인 설정: 종류별 큐
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// 액세스 로그 큐
    #[serde(default = "default_log_queue")]
    pub log: QueueConfig,
    /// 스팬 큐
    #[serde(default = "default_span_queue")]
    pub span: QueueConfig,
    /// 시스템 메트릭 큐
    #[serde(default = "default_metric_queue")]
    pub system: QueueConfig,
    /// 프록시 메트릭 큐
    #[serde(default = "default_metric_queue")]
    pub proxy: QueueConfig,
    /// 게이트웨이 자체 메트릭 큐
    #[serde(default = "default_gateway_queue")]
    pub gateway: QueueConfig,
    /// 자체 메트릭 수집 주기 (초)
    #[serde(default = "default_self_metrics_interval_secs")]
    pub self_metrics_interval_secs: u64,
    /// 추가 GeoIP CSV 경로
    #[serde(default)]
    pub geo_csv_path: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log: default_log_queue(),
            span: default_span_queue(),
            system: default_metric_queue(),
            proxy: default_metric_queue(),
            gateway: default_gateway_queue(),
            self_metrics_interval_secs: default_self_metrics_interval_secs(),
            geo_csv_path: None,
        }
    }
}

impl IngestConfig {
    /// (이름, 큐 설정) 목록
    pub fn queues(&self) -> [(&'static str, &QueueConfig); 5] {
        [
            ("log", &self.log),
            ("span", &self.span),
            ("system", &self.system),
            ("proxy", &self.proxy),
            ("gateway", &self.gateway),
        ]
    }
}

// ============================================================
// 에이전트 설정
// ============================================================

/// 에이전트 세션 보존/정리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// 오프라인 에이전트 보존 기간 (일)
    #[serde(default = "default_offline_retention_days")]
    pub offline_retention_days: u32,
    /// 정리 주기 (시간)
    #[serde(default = "default_prune_interval_hours")]
    pub prune_interval_hours: u64,
    /// 로그 구독 채널 버퍼
    #[serde(default = "default_log_subscriber_buffer")]
    pub log_subscriber_buffer: usize,
    /// 상태 영속화 대기열 용량 (가득 차면 작업 폐기)
    #[serde(default = "default_persist_queue_capacity")]
    pub persist_queue_capacity: usize,
}

fn default_offline_retention_days() -> u32 {
    10
}

fn default_prune_interval_hours() -> u64 {
    12
}

fn default_log_subscriber_buffer() -> usize {
    100
}

fn default_persist_queue_capacity() -> usize {
    4096
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            offline_retention_days: default_offline_retention_days(),
            prune_interval_hours: default_prune_interval_hours(),
            log_subscriber_buffer: default_log_subscriber_buffer(),
            persist_queue_capacity: default_persist_queue_capacity(),
        }
    }
}

impl AgentsConfig {
    /// 오프라인 보존 기간 Duration
    pub fn offline_retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.offline_retention_days) * 86_400)
    }

    /// 정리 주기 Duration
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_hours.max(1) * 3_600)
    }
}

// ============================================================
// 알림 엔진 설정
// ============================================================

/// 알림 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// 알림 엔진 활성화
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 평가 주기 (초)
    #[serde(default = "default_alert_interval_secs")]
    pub interval_secs: u64,
    /// 규칙당 평가 타임아웃 (초)
    #[serde(default = "default_evaluation_timeout_secs")]
    pub evaluation_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_alert_interval_secs() -> u64 {
    60
}

fn default_evaluation_timeout_secs() -> u64 {
    30
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_alert_interval_secs(),
            evaluation_timeout_secs: default_evaluation_timeout_secs(),
        }
    }
}

// ============================================================
// SMTP 설정
// ============================================================

/// SMTP 설정: host가 비어 있으면 이메일 대신 로그로만 기록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP 호스트
    #[serde(default)]
    pub host: String,
    /// SMTP 포트
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// 사용자명 (비어 있으면 AUTH 생략)
    #[serde(default)]
    pub username: String,
    /// 비밀번호
    #[serde(default)]
    pub password: String,
    /// 발신자 주소
    #[serde(default = "default_smtp_from")]
    pub from: String,
    /// 연결/응답 타임아웃 (초)
    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_smtp_port() -> u16 {
    25
}

fn default_smtp_from() -> String {
    "fleetgate@localhost".to_string()
}

fn default_smtp_timeout_secs() -> u64 {
    10
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_smtp_from(),
            timeout_secs: default_smtp_timeout_secs(),
        }
    }
}

impl SmtpConfig {
    /// SMTP 전송 가능 여부
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

// ============================================================
// 분석 엔진 설정
// ============================================================

/// 분석 엔진 설정: 인메모리 폴백 집계 상한
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// 폴백 상태 코드 맵 최대 키 수
    #[serde(default = "default_fallback_max_status_codes")]
    pub fallback_max_status_codes: usize,
    /// 폴백 엔드포인트 맵 최대 키 수
    #[serde(default = "default_fallback_max_endpoints")]
    pub fallback_max_endpoints: usize,
    /// 폴백 시계열 최대 포인트 수
    #[serde(default = "default_fallback_max_points")]
    pub fallback_max_points: usize,
}

fn default_fallback_max_status_codes() -> usize {
    64
}

fn default_fallback_max_endpoints() -> usize {
    1_000
}

fn default_fallback_max_points() -> usize {
    24
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            fallback_max_status_codes: default_fallback_max_status_codes(),
            fallback_max_endpoints: default_fallback_max_endpoints(),
            fallback_max_points: default_fallback_max_points(),
        }
    }
}
