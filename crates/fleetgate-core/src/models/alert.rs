//! 알림 규칙 모델.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 임계값 비교 연산자
///
/// "gt"/"lt" 외의 값은 보존하되 절대 트리거되지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Comparison {
    /// 초과
    GreaterThan,
    /// 미만
    LessThan,
    /// 알 수 없는 연산자
    Other(String),
}

impl Comparison {
    /// 값이 임계값을 넘었는지 판정
    pub fn triggers(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::Other(_) => false,
        }
    }

    /// 연산자 문자열
    pub fn as_str(&self) -> &str {
        match self {
            Self::GreaterThan => "gt",
            Self::LessThan => "lt",
            Self::Other(op) => op,
        }
    }
}

impl From<String> for Comparison {
    fn from(value: String) -> Self {
        match value.as_str() {
            "gt" => Self::GreaterThan,
            "lt" => Self::LessThan,
            _ => Self::Other(value),
        }
    }
}

impl From<Comparison> for String {
    fn from(value: Comparison) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 알림 대상 메트릭
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertMetric {
    /// 평균 CPU 사용률
    Cpu,
    /// 평균 메모리 사용률
    Memory,
    /// 평균 초당 요청
    Rps,
    /// 에러율
    ErrorRate,
}

impl AlertMetric {
    /// 메트릭 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Rps => "rps",
            Self::ErrorRate => "error_rate",
        }
    }
}

impl FromStr for AlertMetric {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            "rps" => Ok(Self::Rps),
            "error_rate" => Ok(Self::ErrorRate),
            other => Err(CoreError::UnknownMetric(other.to_string())),
        }
    }
}

impl fmt::Display for AlertMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 사용자 정의 임계값 규칙
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// 규칙 ID
    pub id: String,
    /// 규칙 이름
    pub name: String,
    /// 메트릭 타입 (평가 시 [`AlertMetric`]으로 파싱)
    pub metric_type: String,
    /// 비교 연산자
    pub comparison: Comparison,
    /// 임계값
    pub threshold: f64,
    /// 집계 윈도우 (초)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// 활성화 여부
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 쉼표 구분 수신자
    #[serde(default)]
    pub recipients: String,
}

fn default_window_secs() -> u64 {
    300
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    /// 수신자 목록 (공백 제거, 빈 항목 제외)
    pub fn recipient_list(&self) -> Vec<&str> {
        self.recipients
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .collect()
    }
}
