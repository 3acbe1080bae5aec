//! 트레이스 목록/상세.

use chrono::{DateTime, Utc};
use fleetgate_core::error::CoreError;
use fleetgate_core::models::analytics::{Trace, TraceFilter, TraceList};
use tracing::debug;

use super::AnalyticsEngine;
use crate::tiers::trace_window;

impl AnalyticsEngine {
    /// 윈도우 내 루트 요청 스팬 목록 (최신 순)
    pub async fn list_traces(&self, filter: &TraceFilter) -> Result<TraceList, CoreError> {
        self.list_traces_at(filter, Utc::now()).await
    }

    /// 기준 시각을 지정한 트레이스 목록
    pub async fn list_traces_at(
        &self,
        filter: &TraceFilter,
        now: DateTime<Utc>,
    ) -> Result<TraceList, CoreError> {
        let since = now - trace_window(&filter.window);
        let roots = self.store.query_root_spans(since, filter).await?;
        debug!("트레이스 조회: {}건 (since {since})", roots.len());

        Ok(TraceList {
            traces: roots
                .into_iter()
                .map(|root| Trace {
                    request_id: root.trace_id.clone(),
                    spans: vec![root],
                })
                .collect(),
        })
    }

    /// 한 트레이스의 전체 스팬 (시작 시각 순)
    pub async fn trace_details(&self, agent_id: &str, trace_id: &str) -> Result<Trace, CoreError> {
        let spans = self.store.query_trace(agent_id, trace_id).await?;
        if spans.is_empty() {
            return Err(CoreError::NotFound {
                resource_type: "Trace".to_string(),
                id: trace_id.to_string(),
            });
        }
        Ok(Trace {
            request_id: trace_id.to_string(),
            spans,
        })
    }
}
