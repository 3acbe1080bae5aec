//! 인메모리 폴백 집계.
//!
//! 에이전트 연결 태스크가 로그를 받을 때마다 갱신한다. 시계열 저장소를 읽을 수 없을 때
//! 대시보드 응답을 이 집계로 대신한다. 모든 맵과 시계열은 상한이 있으며
//! 상한을 넘는 새 키는 무시된다.

use chrono::{DateTime, Duration, DurationRound, Utc};
use chrono_tz::Tz;
use fleetgate_core::config::AnalyticsConfig;
use fleetgate_core::models::analytics::{
    AnalyticsResponse, EndpointStat, StatusCount, TimeRange, TimeSeriesPoint,
};
use fleetgate_core::models::telemetry::LogEntry;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};

use crate::aggregate::{
    body_bytes, format_bytes, is_error, latency_bucket_index, latency_histogram, summarize, Kpi,
};
use crate::insights::generate_insights;
use crate::tiers::Bucketer;

#[derive(Debug, Default, Clone, Copy)]
struct EndpointTotals {
    requests: u64,
    errors: u64,
    bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct HourlyPoint {
    hour: DateTime<Utc>,
    requests: u64,
    errors: u64,
}

impl HourlyPoint {
    /// 시간 버킷 `[hour, hour + 1h)`이 범위와 겹치는지
    fn overlaps(&self, range: &TimeRange) -> bool {
        self.hour <= range.end && self.hour + Duration::hours(1) > range.start
    }
}

#[derive(Debug, Default)]
struct FallbackState {
    kpi: Kpi,
    status_codes: BTreeMap<i32, u64>,
    endpoints: BTreeMap<String, EndpointTotals>,
    hourly: VecDeque<HourlyPoint>,
    latency_counts: [u64; 5],
}

/// 상한이 있는 누적 집계
#[derive(Debug)]
pub struct FallbackAggregator {
    config: AnalyticsConfig,
    state: Mutex<FallbackState>,
}

impl FallbackAggregator {
    /// 새 집계 생성
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            config,
            state: Mutex::new(FallbackState::default()),
        }
    }

    /// 로그 한 건 반영
    pub fn record(&self, entry: &LogEntry, received_at: DateTime<Utc>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.kpi.record(entry);
        if entry.status <= 0 {
            return;
        }
        let error = is_error(entry.status);
        state.latency_counts[latency_bucket_index(entry.request_time)] += 1;

        let status_cap = self.config.fallback_max_status_codes;
        if state.status_codes.contains_key(&entry.status) || state.status_codes.len() < status_cap {
            *state.status_codes.entry(entry.status).or_default() += 1;
        }

        let endpoint_cap = self.config.fallback_max_endpoints;
        if let Some(totals) = state.endpoints.get_mut(&entry.request_uri) {
            totals.requests += 1;
            totals.errors += u64::from(error);
            totals.bytes += body_bytes(entry);
        } else if state.endpoints.len() < endpoint_cap {
            state.endpoints.insert(
                entry.request_uri.clone(),
                EndpointTotals {
                    requests: 1,
                    errors: u64::from(error),
                    bytes: body_bytes(entry),
                },
            );
        }

        let hour = received_at
            .duration_trunc(Duration::hours(1))
            .unwrap_or(received_at);
        match state.hourly.back_mut() {
            Some(point) if point.hour == hour => {
                point.requests += 1;
                point.errors += u64::from(error);
                return;
            }
            _ => {}
        }
        state.hourly.push_back(HourlyPoint {
            hour,
            requests: 1,
            errors: u64::from(error),
        });
        while state.hourly.len() > self.config.fallback_max_points {
            state.hourly.pop_front();
        }
    }

    /// 누적 요청 수
    pub fn total_requests(&self) -> u64 {
        self.state.lock().kpi.requests
    }

    /// 폴백 응답 구성
    ///
    /// 백분위와 직전 기간 변화량은 추적하지 않으므로 0으로 채운다.
    pub fn snapshot(&self, range: &TimeRange, tz: Tz) -> AnalyticsResponse {
        let state = self.state.lock();
        let bucketer = Bucketer::for_range(range, tz);

        let mut series: BTreeMap<_, TimeSeriesPoint> = BTreeMap::new();
        for point in state.hourly.iter().filter(|p| p.overlaps(range)) {
            let key = bucketer.key(point.hour);
            let entry = series.entry(key).or_insert_with(|| TimeSeriesPoint {
                time: bucketer.label(&key),
                ..Default::default()
            });
            entry.requests += point.requests;
            entry.errors += point.errors;
        }

        let status_distribution = state
            .status_codes
            .iter()
            .map(|(code, count)| StatusCount {
                code: code.to_string(),
                count: *count,
            })
            .collect();

        let mut top: Vec<(&String, &EndpointTotals)> = state.endpoints.iter().collect();
        top.sort_by(|a, b| b.1.requests.cmp(&a.1.requests).then_with(|| a.0.cmp(b.0)));
        let top_endpoints = top
            .into_iter()
            .take(10)
            .map(|(uri, totals)| EndpointStat {
                uri: uri.clone(),
                requests: totals.requests,
                errors: totals.errors,
                p95: 0.0,
                traffic: format_bytes(totals.bytes),
            })
            .collect();

        let summary = summarize(&state.kpi, &state.kpi);
        let insights = generate_insights(&summary, &[]);

        AnalyticsResponse {
            request_rate: series.into_values().collect(),
            status_distribution,
            top_endpoints,
            summary,
            latency_distribution: latency_histogram(&state.latency_counts),
            insights,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(uri: &str, status: i32) -> LogEntry {
        LogEntry {
            request_uri: uri.to_string(),
            status,
            body_bytes_sent: 2048,
            request_time: 0.07,
            ..Default::default()
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn caps(status: usize, endpoints: usize, points: usize) -> AnalyticsConfig {
        AnalyticsConfig {
            fallback_max_status_codes: status,
            fallback_max_endpoints: endpoints,
            fallback_max_points: points,
        }
    }

    #[test]
    fn totals_and_maps() {
        let agg = FallbackAggregator::new(AnalyticsConfig::default());
        agg.record(&entry("/a", 200), base());
        agg.record(&entry("/a", 500), base() + Duration::minutes(5));
        agg.record(&entry("/b", 200), base() + Duration::minutes(10));
        agg.record(&entry("/b", 0), base() + Duration::minutes(11));

        let range = TimeRange::ending_at(base() + Duration::hours(2), Duration::hours(24));
        let resp = agg.snapshot(&range, Tz::UTC);
        assert_eq!(agg.total_requests(), 3);
        assert_eq!(resp.summary.total_requests, 3);
        assert!((resp.summary.error_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(resp.summary.requests_delta, 0.0);
        assert_eq!(resp.status_distribution.len(), 2);
        assert_eq!(resp.status_distribution[0].code, "200");
        assert_eq!(resp.top_endpoints[0].uri, "/a");
        assert_eq!(resp.top_endpoints[0].errors, 1);
        assert_eq!(resp.top_endpoints[0].traffic, "4.0 KB");
        assert_eq!(resp.latency_distribution[1].count, 3);
        assert_eq!(resp.request_rate.len(), 1);
        assert_eq!(resp.request_rate[0].requests, 3);
        assert_eq!(resp.request_rate[0].time, "05-01 10:00");
    }

    #[test]
    fn caps_ignore_new_keys() {
        let agg = FallbackAggregator::new(caps(1, 1, 2));
        agg.record(&entry("/a", 200), base());
        agg.record(&entry("/b", 404), base());
        agg.record(&entry("/a", 200), base());

        let range = TimeRange::ending_at(base() + Duration::hours(1), Duration::hours(24));
        let resp = agg.snapshot(&range, Tz::UTC);
        assert_eq!(resp.status_distribution.len(), 1);
        assert_eq!(resp.status_distribution[0].count, 2);
        assert_eq!(resp.top_endpoints.len(), 1);
        assert_eq!(resp.top_endpoints[0].requests, 2);
        // KPI 카운터는 상한과 무관
        assert_eq!(resp.summary.total_requests, 3);
    }

    #[test]
    fn window_inside_one_hour_keeps_that_hour() {
        let agg = FallbackAggregator::new(AnalyticsConfig::default());
        agg.record(&entry("/a", 200), base() + Duration::minutes(20));
        agg.record(&entry("/a", 503), base() + Duration::minutes(40));
        agg.record(&entry("/a", 200), base() - Duration::minutes(30));

        // 10:45 ~ 10:50, 10:00 버킷 안쪽
        let range = TimeRange::ending_at(base() + Duration::minutes(50), Duration::minutes(5));
        let resp = agg.snapshot(&range, Tz::UTC);
        assert_eq!(resp.request_rate.len(), 1);
        assert_eq!(resp.request_rate[0].requests, 2);
        assert_eq!(resp.request_rate[0].errors, 1);

        // 버킷 끝과 맞닿은 범위는 제외
        let after = TimeRange::new(base() + Duration::hours(1), base() + Duration::hours(2));
        assert!(agg.snapshot(&after, Tz::UTC).request_rate.is_empty());
    }

    #[test]
    fn hourly_ring_is_bounded() {
        let agg = FallbackAggregator::new(caps(64, 100, 3));
        for h in 0..5 {
            agg.record(&entry("/a", 200), base() + Duration::hours(h));
        }
        let range = TimeRange::ending_at(base() + Duration::hours(6), Duration::days(3));
        let resp = agg.snapshot(&range, Tz::UTC);
        assert_eq!(resp.request_rate.len(), 3);
        assert_eq!(resp.request_rate[0].time, "05-01 12:00");
    }
}
