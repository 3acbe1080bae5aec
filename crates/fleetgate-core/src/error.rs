//! FleetGate 핵심 에러 타입.
//!
//! 모든 어댑터 crate가 공유하는 단일 에러 열거형.
//! 웹 레이어는 `ApiError`로, 바이너리는 `anyhow`로 변환한다.

use thiserror::Error;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 ({field}): {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "Agent", "AlertRule")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),

    /// 네트워크 에러 (연결 실패, 프로토콜 오류)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 저장소 에러 (쿼리/삽입 실패, 저장소 불가)
    #[error("저장소 에러: {0}")]
    Storage(String),

    /// 바운디드 큐 포화로 항목 폐기됨
    #[error("{kind} 큐 포화, 항목 폐기")]
    QueueFull {
        /// 텔레메트리 종류 이름
        kind: &'static str,
    },

    /// 알 수 없는 메트릭 타입
    #[error("알 수 없는 메트릭 타입: {0}")]
    UnknownMetric(String),

    /// 작업 타임아웃
    #[error("타임아웃: {0}초 초과")]
    Timeout(u64),

    /// 이미 실행 중인 컴포넌트 재시작 시도
    #[error("이미 실행 중: {0}")]
    AlreadyRunning(String),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}
