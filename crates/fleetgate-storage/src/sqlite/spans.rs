//! 스팬 저장, 루트 스팬 목록, 트레이스 상세 조회.

use chrono::{DateTime, Utc};
use fleetgate_core::error::CoreError;
use fleetgate_core::models::analytics::TraceFilter;
use fleetgate_core::models::telemetry::SpanItem;
use rusqlite::types::Value;
use rusqlite::Row;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{db_err, from_micros, scope_clause, SqliteStorage};

/// 루트 스팬 기본 조회 한도
const DEFAULT_TRACE_LIMIT: usize = 100;

impl SqliteStorage {
    pub(super) fn insert_spans_sync(&self, items: &[SpanItem]) -> Result<(), CoreError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_err("트랜잭션 시작 실패"))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO spans (trace_id, span_id, parent_span_id, name, start_us, end_us, attributes, agent_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(db_err("쿼리 준비 실패"))?;

            for span in items {
                let attributes = serde_json::to_string(&span.attributes)?;
                stmt.execute(rusqlite::params![
                    span.trace_id,
                    span.span_id,
                    span.parent_id,
                    span.name,
                    span.start.timestamp_micros(),
                    span.end.timestamp_micros(),
                    attributes,
                    span.agent_id,
                ])
                .map_err(db_err("스팬 저장 실패"))?;
            }
        }
        tx.commit().map_err(db_err("트랜잭션 커밋 실패"))?;

        debug!("스팬 {}건 저장", items.len());
        Ok(())
    }

    pub(super) fn query_root_spans_sync(
        &self,
        since: DateTime<Utc>,
        filter: &TraceFilter,
    ) -> Result<Vec<SpanItem>, CoreError> {
        let mut params = vec![Value::Integer(since.timestamp_micros())];
        let mut sql = String::from(
            "SELECT trace_id, span_id, parent_span_id, name, start_us, end_us, attributes, agent_id
             FROM spans WHERE name = 'request' AND start_us >= ?",
        );
        sql.push_str(&scope_clause(&filter.scope, "agent_id", &mut params));

        match filter.status.trim() {
            "" => {}
            "5xx" => {
                sql.push_str(" AND CAST(json_extract(attributes, '$.status') AS INTEGER) >= 500");
            }
            "4xx" => {
                sql.push_str(
                    " AND CAST(json_extract(attributes, '$.status') AS INTEGER) BETWEEN 400 AND 499",
                );
            }
            code => {
                sql.push_str(" AND json_extract(attributes, '$.status') = ?");
                params.push(Value::Text(code.to_string()));
            }
        }

        if !filter.method.is_empty() {
            sql.push_str(" AND json_extract(attributes, '$.method') = ?");
            params.push(Value::Text(filter.method.clone()));
        }

        if !filter.uri.is_empty() {
            sql.push_str(" AND json_extract(attributes, '$.uri') LIKE ?");
            params.push(Value::Text(format!("%{}%", filter.uri)));
        }

        let limit = if filter.limit == 0 {
            DEFAULT_TRACE_LIMIT
        } else {
            filter.limit
        };
        sql.push_str(" ORDER BY start_us DESC, id DESC LIMIT ?");
        params.push(Value::Integer(limit as i64));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err("쿼리 준비 실패"))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), row_to_span)
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut spans = Vec::new();
        for row in rows {
            match row {
                Ok(span) => spans.push(span),
                Err(e) => warn!("루트 스팬 행 읽기 실패: {e}"),
            }
        }
        Ok(spans)
    }

    pub(super) fn query_trace_sync(
        &self,
        agent_id: &str,
        trace_id: &str,
    ) -> Result<Vec<SpanItem>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT trace_id, span_id, parent_span_id, name, start_us, end_us, attributes, agent_id
                 FROM spans WHERE agent_id = ?1 AND trace_id = ?2
                 ORDER BY start_us ASC, id ASC",
            )
            .map_err(db_err("쿼리 준비 실패"))?;

        let rows = stmt
            .query_map(rusqlite::params![agent_id, trace_id], row_to_span)
            .map_err(db_err("쿼리 실행 실패"))?;

        let mut spans = Vec::new();
        for row in rows {
            spans.push(row.map_err(db_err("행 읽기 실패"))?);
        }
        Ok(spans)
    }
}

fn row_to_span(row: &Row<'_>) -> rusqlite::Result<SpanItem> {
    let attributes_json: String = row.get(6)?;
    let attributes: BTreeMap<String, String> =
        serde_json::from_str(&attributes_json).unwrap_or_default();

    Ok(SpanItem {
        trace_id: row.get(0)?,
        span_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        start: from_micros(row.get(4)?),
        end: from_micros(row.get(5)?),
        attributes,
        agent_id: row.get(7)?,
    })
}
