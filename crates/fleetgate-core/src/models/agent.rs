//! 에이전트 모델.
//!
//! 하트비트 페이로드와 영속화/API 조회용 에이전트 레코드.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 프록시 인스턴스 정보 (하트비트 내 인스턴스 목록)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceInfo {
    /// 인스턴스 식별자
    pub id: String,
    /// 프록시 소프트웨어 버전
    pub version: String,
    /// 인스턴스 상태
    pub status: String,
}

/// 에이전트 하트비트 페이로드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heartbeat {
    /// 호스트명
    pub hostname: String,
    /// 상위 레벨 버전 (프록시 또는 에이전트)
    pub version: String,
    /// 에이전트 바이너리 버전
    pub agent_version: String,
    /// 빌드 일자
    pub build_date: String,
    /// 빌드 커밋
    pub git_commit: String,
    /// 빌드 브랜치
    pub git_branch: String,
    /// 프록시 인스턴스 목록
    pub instances: Vec<InstanceInfo>,
    /// 가동 시간 (초)
    pub uptime: f64,
    /// 자체 보고 파드 여부
    pub is_pod: bool,
    /// 파드 IP
    pub pod_ip: String,
}

/// 에이전트 연결 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// 스트림 연결됨
    Online,
    /// 연결 끊김
    #[default]
    Offline,
}

impl AgentStatus {
    /// 저장소/프로토콜 문자열 표현
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    /// 문자열에서 변환 (알 수 없으면 offline)
    pub fn parse(value: &str) -> Self {
        match value {
            "online" => Self::Online,
            _ => Self::Offline,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 에이전트 레코드: 메타데이터 저장소 행이자 API 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// 안정적 에이전트 ID
    pub agent_id: String,
    /// 호스트명
    pub hostname: String,
    /// 프록시 소프트웨어 버전
    pub version: String,
    /// 에이전트 바이너리 버전
    pub agent_version: String,
    /// 빌드 일자
    pub build_date: String,
    /// 빌드 커밋
    pub git_commit: String,
    /// 빌드 브랜치
    pub git_branch: String,
    /// 인스턴스 수
    pub instances_count: u32,
    /// 가동 시간 문자열 (예: "12.5s")
    pub uptime: String,
    /// 네트워크 주소 (포트 제외)
    pub ip: String,
    /// 연결 상태
    pub status: AgentStatus,
    /// 마지막 활동 시각
    pub last_seen: DateTime<Utc>,
    /// 파드 여부
    pub is_pod: bool,
    /// 파드 IP
    pub pod_ip: String,
}

impl AgentRecord {
    /// ID만 채운 빈 레코드
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            hostname: String::new(),
            version: String::new(),
            agent_version: String::new(),
            build_date: String::new(),
            git_commit: String::new(),
            git_branch: String::new(),
            instances_count: 0,
            uptime: String::new(),
            ip: String::new(),
            status: AgentStatus::Offline,
            last_seen: Utc::now(),
            is_pod: false,
            pod_ip: String::new(),
        }
    }
}

/// 상태별 에이전트 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// 온라인 수
    pub online: usize,
    /// 오프라인 수
    pub offline: usize,
}
