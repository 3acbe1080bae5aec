//! 에이전트 인벤토리 (AgentStore 포트 구현).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetgate_core::error::CoreError;
use fleetgate_core::models::agent::{AgentRecord, AgentStatus};
use fleetgate_core::ports::metadata_store::AgentStore;
use tracing::{debug, info};

use super::{db_err, from_millis, SqliteStorage};

#[async_trait]
impl AgentStore for SqliteStorage {
    async fn upsert_agent(&self, record: &AgentRecord) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO agents (
                agent_id, hostname, version, agent_version, build_date, git_commit, git_branch,
                instances_count, uptime, ip, status, last_seen_ms, is_pod, pod_ip
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(agent_id) DO UPDATE SET
                hostname = excluded.hostname,
                version = excluded.version,
                agent_version = excluded.agent_version,
                build_date = excluded.build_date,
                git_commit = excluded.git_commit,
                git_branch = excluded.git_branch,
                instances_count = excluded.instances_count,
                uptime = excluded.uptime,
                ip = excluded.ip,
                status = excluded.status,
                last_seen_ms = excluded.last_seen_ms,
                is_pod = excluded.is_pod,
                pod_ip = excluded.pod_ip",
            rusqlite::params![
                record.agent_id,
                record.hostname,
                record.version,
                record.agent_version,
                record.build_date,
                record.git_commit,
                record.git_branch,
                record.instances_count,
                record.uptime,
                record.ip,
                record.status.as_str(),
                record.last_seen.timestamp_millis(),
                record.is_pod,
                record.pod_ip,
            ],
        )
        .map_err(db_err("에이전트 저장 실패"))?;

        debug!("에이전트 저장: {} ({})", record.agent_id, record.status);
        Ok(())
    }

    async fn update_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        last_seen: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE agents SET status = ?1, last_seen_ms = ?2 WHERE agent_id = ?3",
                rusqlite::params![status.as_str(), last_seen.timestamp_millis(), agent_id],
            )
            .map_err(db_err("에이전트 상태 갱신 실패"))?;

        if updated == 0 {
            return Err(CoreError::NotFound {
                resource_type: "Agent".to_string(),
                id: agent_id.to_string(),
            });
        }
        Ok(())
    }

    async fn remove_agent(&self, agent_id: &str) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM agents WHERE agent_id = ?1", [agent_id])
            .map_err(db_err("에이전트 삭제 실패"))?;
        Ok(deleted > 0)
    }

    async fn load_all(&self) -> Result<Vec<AgentRecord>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT agent_id, hostname, version, agent_version, build_date, git_commit,
                        git_branch, instances_count, uptime, ip, status, last_seen_ms, is_pod, pod_ip
                 FROM agents ORDER BY agent_id",
            )
            .map_err(db_err("쿼리 준비 실패"))?;

        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(10)?;
                Ok(AgentRecord {
                    agent_id: row.get(0)?,
                    hostname: row.get(1)?,
                    version: row.get(2)?,
                    agent_version: row.get(3)?,
                    build_date: row.get(4)?,
                    git_commit: row.get(5)?,
                    git_branch: row.get(6)?,
                    instances_count: row.get(7)?,
                    uptime: row.get(8)?,
                    ip: row.get(9)?,
                    status: AgentStatus::parse(&status),
                    last_seen: from_millis(row.get(11)?),
                    is_pod: row.get(12)?,
                    pod_ip: row.get(13)?,
                })
            })
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db_err("행 읽기 실패"))?);
        }
        Ok(records)
    }

    async fn prune_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, CoreError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_err("트랜잭션 시작 실패"))?;

        let ids: Vec<String> = {
            let mut stmt = tx
                .prepare(
                    "SELECT agent_id FROM agents
                     WHERE status = 'offline' AND last_seen_ms < ?1
                     ORDER BY agent_id",
                )
                .map_err(db_err("쿼리 준비 실패"))?;
            let rows = stmt
                .query_map([cutoff.timestamp_millis()], |row| row.get(0))
                .map_err(db_err("쿼리 실행 실패"))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row.map_err(db_err("행 읽기 실패"))?);
            }
            ids
        };

        for id in &ids {
            tx.execute("DELETE FROM agents WHERE agent_id = ?1", [id])
                .map_err(db_err("에이전트 삭제 실패"))?;
        }
        tx.commit().map_err(db_err("트랜잭션 커밋 실패"))?;

        if !ids.is_empty() {
            info!("오래된 오프라인 에이전트 {}개 정리", ids.len());
        }
        Ok(ids)
    }
}
