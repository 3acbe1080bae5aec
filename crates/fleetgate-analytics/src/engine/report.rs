//! 기간 리포트.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use fleetgate_core::error::CoreError;
use fleetgate_core::models::analytics::{
    AgentScope, EndpointStat, LogSample, ReportData, ReportSummary, ServerStat, TimeRange,
    TimeSeriesPoint,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::AnalyticsEngine;
use crate::aggregate::{clamp_bytes, format_bytes, is_error, percentile, Kpi};
use crate::tiers::{BucketTier, BucketWidth, Bucketer};

/// 상위 URI/서버 최대 개수
const TOP_N: usize = 10;

impl AnalyticsEngine {
    /// 리포트 데이터 생성
    ///
    /// `from_ms`/`to_ms`가 0이면 각각 24시간 전/현재. 종료가 시작보다 앞서면 거부한다.
    /// 저장소 조회가 실패하면 빈 리포트를 반환한다.
    pub async fn report_data(
        &self,
        from_ms: i64,
        to_ms: i64,
        agent_ids: &[String],
    ) -> Result<ReportData, CoreError> {
        let now = Utc::now();
        let start = millis_or(from_ms, now - Duration::hours(24));
        let end = millis_or(to_ms, now);
        if end < start {
            return Err(CoreError::Validation {
                field: "to".to_string(),
                message: "종료 시각이 시작 시각보다 앞섭니다".to_string(),
            });
        }

        let range = TimeRange::new(start, end);
        let scope = if agent_ids.is_empty() {
            AgentScope::All
        } else {
            AgentScope::List(agent_ids.to_vec())
        };

        let logs = match self.store.query_log_samples(range, &scope).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!("리포트 로그 조회 실패, 빈 리포트 반환: {e}");
                Vec::new()
            }
        };
        debug!("리포트 생성: {} ~ {}, 로그 {}건", start, end, logs.len());

        let mut report = build_report(&logs, &range);
        report.generated_at = now.timestamp();
        Ok(report)
    }
}

fn millis_or(ms: i64, default: DateTime<Utc>) -> DateTime<Utc> {
    if ms <= 0 {
        return default;
    }
    Utc.timestamp_millis_opt(ms).single().unwrap_or(default)
}

#[derive(Default)]
struct UriAcc {
    requests: u64,
    errors: u64,
    bytes: u64,
    latencies: Vec<f64>,
}

/// 로그로 리포트 구성 (추이는 48시간 초과 시 일 단위, 아니면 시 단위)
pub(crate) fn build_report(logs: &[LogSample], range: &TimeRange) -> ReportData {
    let tier = if range.duration() > Duration::hours(48) {
        BucketTier {
            width: BucketWidth::Day,
            format: "%Y-%m-%d",
        }
    } else {
        BucketTier {
            width: BucketWidth::Hour,
            format: "%H:00",
        }
    };
    let bucketer = Bucketer::with_tier(tier, Tz::UTC);

    let mut trend: BTreeMap<NaiveDateTime, (u64, u64)> = BTreeMap::new();
    let mut uris: BTreeMap<&str, UriAcc> = BTreeMap::new();
    let mut servers: BTreeMap<&str, Kpi> = BTreeMap::new();
    let mut visitors: BTreeSet<&str> = BTreeSet::new();

    let mut kpi = Kpi::default();
    for sample in logs {
        let error = is_error(sample.status);

        let point = trend.entry(bucketer.key(sample.timestamp)).or_default();
        point.0 += 1;
        point.1 += u64::from(error);

        let uri = uris.entry(sample.request_uri.as_str()).or_default();
        uri.requests += 1;
        uri.errors += u64::from(error);
        uri.bytes += clamp_bytes(sample.body_bytes_sent);
        uri.latencies.push(sample.request_time);

        servers
            .entry(sample.agent_id.as_str())
            .or_default()
            .record_sample(sample);
        visitors.insert(sample.remote_addr.as_str());
        kpi.record_sample(sample);
    }

    let mut top_uris: Vec<(&str, UriAcc)> = uris.into_iter().collect();
    top_uris.sort_by(|a, b| b.1.requests.cmp(&a.1.requests));
    let mut top_servers: Vec<(&str, Kpi)> = servers.into_iter().collect();
    top_servers.sort_by(|a, b| b.1.requests.cmp(&a.1.requests));

    ReportData {
        generated_at: 0,
        summary: ReportSummary {
            total_requests: kpi.requests,
            error_rate: kpi.error_rate(),
            total_bandwidth: kpi.bytes,
            avg_latency: kpi.avg_latency_ms(),
            unique_visitors: visitors.len() as u64,
        },
        traffic_trend: trend
            .iter()
            .map(|(key, (requests, errors))| TimeSeriesPoint {
                time: bucketer.label(key),
                requests: *requests,
                errors: *errors,
            })
            .collect(),
        top_uris: top_uris
            .into_iter()
            .take(TOP_N)
            .map(|(uri, mut acc)| {
                acc.latencies.sort_by(f64::total_cmp);
                EndpointStat {
                    uri: uri.to_string(),
                    requests: acc.requests,
                    errors: acc.errors,
                    p95: percentile(&acc.latencies, 95.0) * 1000.0,
                    traffic: format_bytes(acc.bytes),
                }
            })
            .collect(),
        top_servers: top_servers
            .into_iter()
            .take(TOP_N)
            .map(|(agent_id, kpi)| ServerStat {
                hostname: agent_id.to_string(),
                requests: kpi.requests,
                error_rate: kpi.error_rate(),
                traffic: kpi.bytes,
            })
            .collect(),
    }
}
