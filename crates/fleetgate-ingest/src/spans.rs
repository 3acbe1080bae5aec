//! 액세스 로그 → 트레이스 스팬 파생.
//!
//! 로그 한 줄에서 최대 세 개의 스팬을 만든다:
//! `request` (루트) → `upstream` → `upstream_connect`.

use chrono::{DateTime, Duration, Utc};
use fleetgate_core::models::telemetry::{LogEntry, SpanItem};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 루트 스팬 이름
pub const ROOT_SPAN: &str = "request";
/// 업스트림 스팬 이름
pub const UPSTREAM_SPAN: &str = "upstream";
/// 업스트림 연결 스팬 이름
pub const UPSTREAM_CONNECT_SPAN: &str = "upstream_connect";

/// 로그 항목에서 스팬 파생
///
/// `end`는 요청 완료 시각. 트레이스 ID는 request id, 없으면 새 UUID.
pub fn derive_spans(entry: &LogEntry, agent_id: &str, end: DateTime<Utc>) -> Vec<SpanItem> {
    let trace_id = if entry.request_id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        entry.request_id.clone()
    };

    let root_id = Uuid::new_v4().to_string();
    let root_start = end - seconds(entry.request_time);

    let root_attrs = BTreeMap::from([
        ("uri".to_string(), entry.request_uri.clone()),
        ("method".to_string(), entry.request_method.clone()),
        ("status".to_string(), entry.status.to_string()),
        ("agent_id".to_string(), agent_id.to_string()),
        ("client".to_string(), entry.remote_addr.clone()),
    ]);

    let mut spans = vec![SpanItem {
        trace_id: trace_id.clone(),
        span_id: root_id.clone(),
        parent_id: String::new(),
        name: ROOT_SPAN.to_string(),
        start: root_start,
        end,
        attributes: root_attrs,
        agent_id: agent_id.to_string(),
    }];

    if entry.upstream_addr.is_empty() || entry.upstream_response_time <= 0.0 {
        return spans;
    }

    let upstream_id = Uuid::new_v4().to_string();
    let upstream_start = end - seconds(entry.upstream_response_time);
    let upstream_attrs = BTreeMap::from([
        ("upstream_addr".to_string(), entry.upstream_addr.clone()),
        ("upstream_status".to_string(), entry.upstream_status.clone()),
    ]);

    spans.push(SpanItem {
        trace_id: trace_id.clone(),
        span_id: upstream_id.clone(),
        parent_id: root_id,
        name: UPSTREAM_SPAN.to_string(),
        start: upstream_start,
        end,
        attributes: upstream_attrs.clone(),
        agent_id: agent_id.to_string(),
    });

    if entry.upstream_connect_time > 0.0 {
        spans.push(SpanItem {
            trace_id,
            span_id: Uuid::new_v4().to_string(),
            parent_id: upstream_id,
            name: UPSTREAM_CONNECT_SPAN.to_string(),
            start: upstream_start,
            end: upstream_start + seconds(entry.upstream_connect_time),
            attributes: upstream_attrs,
            agent_id: agent_id.to_string(),
        });
    }

    spans
}

fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::microseconds((value * 1_000_000.0).round() as i64)
    } else {
        Duration::zero()
    }
}
