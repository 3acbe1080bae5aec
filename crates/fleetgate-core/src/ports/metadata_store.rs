//! 메타데이터 저장소 포트 (에이전트, 알림 규칙).
//!
//! 구현: `fleetgate-storage` crate (rusqlite)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::models::agent::{AgentRecord, AgentStatus};
use crate::models::alert::AlertRule;

/// 에이전트 인벤토리 저장소
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// 에이전트 레코드 삽입/갱신
    async fn upsert_agent(&self, record: &AgentRecord) -> Result<(), CoreError>;

    /// 상태만 갱신
    async fn update_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        last_seen: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    /// 에이전트 삭제 (없으면 false)
    async fn remove_agent(&self, agent_id: &str) -> Result<bool, CoreError>;

    /// 전체 에이전트 로드 (ID 순)
    async fn load_all(&self) -> Result<Vec<AgentRecord>, CoreError>;

    /// `cutoff` 이전부터 오프라인인 에이전트 삭제 후 ID 반환
    async fn prune_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, CoreError>;
}

/// 알림 규칙 저장소
#[async_trait]
pub trait AlertRuleStore: Send + Sync {
    /// 전체 규칙 (ID 순)
    async fn list_rules(&self) -> Result<Vec<AlertRule>, CoreError>;

    /// 규칙 삽입/갱신
    async fn upsert_rule(&self, rule: &AlertRule) -> Result<(), CoreError>;

    /// 규칙 삭제 (없으면 false)
    async fn delete_rule(&self, id: &str) -> Result<bool, CoreError>;
}
