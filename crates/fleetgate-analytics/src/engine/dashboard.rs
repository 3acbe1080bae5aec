//! 대시보드 분석 응답.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use fleetgate_core::models::analytics::{
    AgentScope, AnalyticsQuery, AnalyticsResponse, ConnectionPoint, EndpointStat,
    GatewayMetricPoint, HttpStatusMetrics, LatencyPoint, LogSample, LogTotals, RecentRequest,
    ServerStat, StatusCount, SystemMetricPoint, TimeRange, TimeSeriesPoint,
};
use fleetgate_core::models::telemetry::{
    GatewayMetricItem, LogItem, ProxyMetricItem, SystemMetricItem,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{or_empty, AnalyticsEngine};
use crate::aggregate::{
    clamp_bytes, format_bytes, is_error, latency_bucket_index, latency_histogram, percentile,
    summarize, Kpi,
};
use crate::insights::generate_insights;
use crate::tiers::{parse_timezone, resolve_range, Bucketer};

/// 상위 엔드포인트 최대 개수
const TOP_ENDPOINTS: usize = 10;
/// 최근 요청 최대 개수
const RECENT_REQUESTS: usize = 50;

/// 대시보드 구성에 필요한 조회 결과 묶음
#[derive(Debug, Default)]
pub struct DashboardRows {
    /// 현재 범위 로그 투영 (시각 오름차순)
    pub samples: Vec<LogSample>,
    /// 현재 범위 최신 로그 (최신 순, 최대 50건)
    pub recent: Vec<LogItem>,
    /// 직전 동일 길이 기간 합계
    pub previous: LogTotals,
    /// 최근 24시간 상태 코드별 건수
    pub last_day_statuses: Vec<(i32, u64)>,
    /// 시스템 메트릭
    pub system: Vec<SystemMetricItem>,
    /// 프록시 메트릭
    pub proxy: Vec<ProxyMetricItem>,
    /// 게이트웨이 메트릭
    pub gateway: Vec<GatewayMetricItem>,
}

impl AnalyticsEngine {
    /// 대시보드 분석 질의
    pub async fn query(&self, query: &AnalyticsQuery) -> AnalyticsResponse {
        self.query_at(query, Utc::now()).await
    }

    /// 기준 시각을 지정한 대시보드 질의
    pub async fn query_at(&self, query: &AnalyticsQuery, now: DateTime<Utc>) -> AnalyticsResponse {
        let range = resolve_range(&query.window, query.from_ms, query.to_ms, now);
        let tz = parse_timezone(&query.timezone);
        let scope = &query.scope;

        let samples = match self.store.query_log_samples(range, scope).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!("액세스 로그 조회 실패, 인메모리 폴백 집계로 응답: {e}");
                return self.fallback.snapshot(&range, tz);
            }
        };

        let recent = or_empty(
            self.store
                .query_recent_logs(range, scope, RECENT_REQUESTS)
                .await,
            "최근 요청",
        );
        let previous = self
            .store
            .sum_access_logs(range.previous(), scope)
            .await
            .unwrap_or_else(|e| {
                warn!("직전 기간 합계 조회 실패, 0으로 대체: {e}");
                LogTotals::default()
            });
        let last_day_statuses = or_empty(
            self.store
                .count_statuses(TimeRange::ending_at(now, Duration::hours(24)), scope)
                .await,
            "24시간 상태 코드",
        );
        let system = or_empty(
            self.store.query_system_metrics(range, scope).await,
            "시스템 메트릭",
        );
        let proxy = or_empty(
            self.store.query_proxy_metrics(range, scope).await,
            "프록시 메트릭",
        );
        let gateway = or_empty(
            self.store.query_gateway_metrics(range).await,
            "게이트웨이 메트릭",
        );

        debug!(
            "분석 질의: {} ~ {}, 로그 {}건",
            range.start,
            range.end,
            samples.len()
        );

        let rows = DashboardRows {
            samples,
            recent,
            previous,
            last_day_statuses,
            system,
            proxy,
            gateway,
        };
        build_dashboard(&rows, scope, &Bucketer::for_range(&range, tz))
    }
}

// ============================================================
// 순수 집계
// ============================================================

#[derive(Default)]
struct EndpointAcc {
    requests: u64,
    errors: u64,
    bytes: u64,
    latencies: Vec<f64>,
}

#[derive(Default)]
struct StatusClasses {
    ok: u64,
    redirect: u64,
    client_error: u64,
    server_error: u64,
}

/// 조회 결과로 대시보드 응답 구성
pub fn build_dashboard(
    rows: &DashboardRows,
    scope: &AgentScope,
    bucketer: &Bucketer,
) -> AnalyticsResponse {
    let mut rate: BTreeMap<NaiveDateTime, (u64, u64)> = BTreeMap::new();
    let mut latency: BTreeMap<NaiveDateTime, Vec<f64>> = BTreeMap::new();
    let mut classes: BTreeMap<NaiveDateTime, StatusClasses> = BTreeMap::new();
    let mut statuses: BTreeMap<i32, u64> = BTreeMap::new();
    let mut endpoints: BTreeMap<&str, EndpointAcc> = BTreeMap::new();
    let mut servers: BTreeMap<&str, Kpi> = BTreeMap::new();
    let mut histogram = [0u64; 5];
    let mut current = Kpi::default();

    for sample in &rows.samples {
        let key = bucketer.key(sample.timestamp);
        let error = is_error(sample.status);

        let point = rate.entry(key).or_default();
        point.0 += 1;
        point.1 += u64::from(error);

        latency.entry(key).or_default().push(sample.request_time);

        let class = classes.entry(key).or_default();
        match sample.status {
            200..=299 => class.ok += 1,
            300..=399 => class.redirect += 1,
            400..=499 => class.client_error += 1,
            s if s >= 500 => class.server_error += 1,
            _ => {}
        }

        let ep = endpoints.entry(sample.request_uri.as_str()).or_default();
        ep.requests += 1;
        ep.errors += u64::from(error);
        ep.bytes += clamp_bytes(sample.body_bytes_sent);
        ep.latencies.push(sample.request_time);

        if sample.status > 0 {
            *statuses.entry(sample.status).or_default() += 1;
            histogram[latency_bucket_index(sample.request_time)] += 1;
        }
        if scope.is_multi() {
            servers
                .entry(sample.agent_id.as_str())
                .or_default()
                .record_sample(sample);
        }
        current.record_sample(sample);
    }

    let summary = summarize(&current, &Kpi::from(rows.previous));

    let system_metrics = system_series(&rows.system, bucketer);
    let insights = generate_insights(&summary, &system_metrics);

    AnalyticsResponse {
        request_rate: rate
            .iter()
            .map(|(key, (requests, errors))| TimeSeriesPoint {
                time: bucketer.label(key),
                requests: *requests,
                errors: *errors,
            })
            .collect(),
        status_distribution: statuses
            .into_iter()
            .map(|(code, count)| StatusCount {
                code: code.to_string(),
                count,
            })
            .collect(),
        top_endpoints: top_endpoints(endpoints),
        latency_trend: latency
            .into_iter()
            .map(|(key, mut samples)| {
                samples.sort_by(f64::total_cmp);
                LatencyPoint {
                    time: bucketer.label(&key),
                    p50: percentile(&samples, 50.0) * 1000.0,
                    p95: percentile(&samples, 95.0) * 1000.0,
                    p99: percentile(&samples, 99.0) * 1000.0,
                }
            })
            .collect(),
        summary,
        latency_distribution: latency_histogram(&histogram),
        server_distribution: server_distribution(servers),
        connections_history: connection_series(&rows.proxy, bucketer),
        http_status_metrics: status_metrics(&classes, &rows.last_day_statuses, bucketer),
        insights,
        recent_requests: recent_requests(&rows.recent),
        gateway_metrics: gateway_series(&rows.gateway, bucketer),
        system_metrics,
    }
}

fn top_endpoints(endpoints: BTreeMap<&str, EndpointAcc>) -> Vec<EndpointStat> {
    let mut ranked: Vec<(&str, EndpointAcc)> = endpoints.into_iter().collect();
    // 안정 정렬: 동점은 URI 오름차순 유지
    ranked.sort_by(|a, b| b.1.requests.cmp(&a.1.requests));
    ranked
        .into_iter()
        .take(TOP_ENDPOINTS)
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
        .collect()
}

fn server_distribution(servers: BTreeMap<&str, Kpi>) -> Vec<ServerStat> {
    let mut stats: Vec<ServerStat> = servers
        .into_iter()
        .map(|(agent_id, kpi)| ServerStat {
            hostname: agent_id.to_string(),
            requests: kpi.requests,
            error_rate: kpi.error_rate(),
            traffic: kpi.bytes,
        })
        .collect();
    stats.sort_by(|a, b| b.requests.cmp(&a.requests));
    stats
}

fn status_metrics(
    classes: &BTreeMap<NaiveDateTime, StatusClasses>,
    last_day: &[(i32, u64)],
    bucketer: &Bucketer,
) -> HttpStatusMetrics {
    let series = |pick: fn(&StatusClasses) -> u64| -> Vec<TimeSeriesPoint> {
        classes
            .iter()
            .map(|(key, c)| TimeSeriesPoint {
                time: bucketer.label(key),
                requests: pick(c),
                errors: 0,
            })
            .collect()
    };
    let total = |code: i32| {
        last_day
            .iter()
            .find(|(status, _)| *status == code)
            .map_or(0, |(_, count)| *count)
    };

    HttpStatusMetrics {
        status_2xx: series(|c| c.ok),
        status_3xx: series(|c| c.redirect),
        status_4xx: series(|c| c.client_error),
        status_5xx: series(|c| c.server_error),
        total_200_24h: total(200),
        total_404_24h: total(404),
        total_503_24h: total(503),
    }
}

/// 최신 순 로그 → 최근 요청 목록
fn recent_requests(logs: &[LogItem]) -> Vec<RecentRequest> {
    logs.iter()
        .take(RECENT_REQUESTS)
        .map(|item| {
            let e = &item.entry;
            RecentRequest {
                timestamp: item.timestamp.timestamp(),
                remote_addr: e.remote_addr.clone(),
                request_method: e.request_method.clone(),
                request_uri: e.request_uri.clone(),
                status: e.status,
                body_bytes_sent: e.body_bytes_sent,
                request_time: e.request_time,
                upstream_addr: e.upstream_addr.clone(),
                upstream_status: e.upstream_status.clone(),
            }
        })
        .collect()
}

/// 버킷별 평균 (버킷 시작 순)
fn bucket_means<T, const N: usize>(
    items: &[T],
    bucketer: &Bucketer,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
    values: impl Fn(&T) -> [f64; N],
) -> Vec<(String, [f64; N])> {
    let mut sums: BTreeMap<NaiveDateTime, (u64, [f64; N])> = BTreeMap::new();
    for item in items {
        let (count, acc) = sums
            .entry(bucketer.key(timestamp(item)))
            .or_insert((0, [0.0; N]));
        *count += 1;
        for (slot, value) in acc.iter_mut().zip(values(item)) {
            *slot += value;
        }
    }
    sums.into_iter()
        .map(|(key, (count, acc))| (bucketer.label(&key), acc.map(|sum| sum / count as f64)))
        .collect()
}

fn system_series(items: &[SystemMetricItem], bucketer: &Bucketer) -> Vec<SystemMetricPoint> {
    bucket_means(items, bucketer, |i| i.timestamp, |i| {
        let m = &i.metrics;
        [
            m.cpu_usage_percent,
            m.memory_usage_percent,
            m.network_rx_rate,
            m.network_tx_rate,
            m.cpu_user_percent,
            m.cpu_system_percent,
            m.cpu_iowait_percent,
        ]
    })
    .into_iter()
    .map(|(time, [cpu, mem, rx, tx, user, system, iowait])| SystemMetricPoint {
        time,
        cpu_usage: cpu,
        memory_usage: mem,
        network_rx_rate: rx,
        network_tx_rate: tx,
        cpu_user: user,
        cpu_system: system,
        cpu_iowait: iowait,
    })
    .collect()
}

fn connection_series(items: &[ProxyMetricItem], bucketer: &Bucketer) -> Vec<ConnectionPoint> {
    bucket_means(items, bucketer, |i| i.timestamp, |i| {
        [
            i.active_connections as f64,
            i.waiting as f64,
            i.requests_per_second,
        ]
    })
    .into_iter()
    .map(|(time, [active, waiting, requests])| ConnectionPoint {
        time,
        active,
        waiting,
        requests,
    })
    .collect()
}

fn gateway_series(items: &[GatewayMetricItem], bucketer: &Bucketer) -> Vec<GatewayMetricPoint> {
    bucket_means(items, bucketer, |i| i.timestamp, |i| {
        [
            i.eps,
            i.active_connections as f64,
            i.cpu_usage,
            i.memory_mb,
            i.task_count as f64,
            i.db_latency_ms,
        ]
    })
    .into_iter()
    .map(|(time, [eps, conns, cpu, mem, tasks, db])| GatewayMetricPoint {
        time,
        eps,
        active_connections: conns,
        cpu_usage: cpu,
        memory_mb: mem,
        task_count: tasks,
        db_latency_ms: db,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{base, log, BrokenStore};
    use crate::fallback::FallbackAggregator;
    use chrono_tz::Tz;
    use fleetgate_core::config::AnalyticsConfig;
    use fleetgate_core::models::analytics::InsightLevel;
    use fleetgate_core::models::telemetry::SystemMetrics;
    use fleetgate_core::ports::telemetry_store::TelemetryStore;
    use fleetgate_storage::SqliteStorage;
    use std::sync::Arc;

    fn hour_bucketer() -> Bucketer {
        Bucketer::for_range(
            &TimeRange::ending_at(base(), Duration::hours(1)),
            Tz::UTC,
        )
    }

    fn system(at: DateTime<Utc>, cpu: f64) -> SystemMetricItem {
        SystemMetricItem {
            agent_id: "a1".to_string(),
            timestamp: at,
            metrics: SystemMetrics {
                cpu_usage_percent: cpu,
                memory_usage_percent: 40.0,
                ..Default::default()
            },
        }
    }

    /// 로그 목록 → 저장소 조회 결과 형태
    fn rows_of(logs: Vec<LogItem>) -> DashboardRows {
        DashboardRows {
            samples: logs.iter().map(LogSample::from).collect(),
            recent: logs.iter().rev().cloned().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn series_and_distributions() {
        let t0 = base() - Duration::minutes(10);
        let rows = rows_of(vec![
            log("a1", t0, "/api", 200, 0.010),
            log("a1", t0 + Duration::seconds(20), "/api", 502, 0.300),
            log("a2", t0 + Duration::minutes(1), "/home", 301, 0.070),
            log("a2", t0 + Duration::minutes(1), "/home", 0, 0.0),
        ]);
        let resp = build_dashboard(&rows, &AgentScope::All, &hour_bucketer());

        assert_eq!(resp.request_rate.len(), 2);
        assert_eq!(resp.request_rate[0].time, "11:50");
        assert_eq!(resp.request_rate[0].requests, 2);
        assert_eq!(resp.request_rate[0].errors, 1);

        let codes: Vec<&str> = resp
            .status_distribution
            .iter()
            .map(|s| s.code.as_str())
            .collect();
        assert_eq!(codes, vec!["200", "301", "502"]);

        assert_eq!(resp.summary.total_requests, 3);
        assert!((resp.summary.error_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(resp.summary.requests_delta, 3.0);

        assert_eq!(resp.latency_distribution.len(), 5);
        assert_eq!(resp.latency_distribution[0].count, 1);
        assert_eq!(resp.latency_distribution[1].count, 1);
        assert_eq!(resp.latency_distribution[3].count, 1);

        assert_eq!(resp.top_endpoints[0].uri, "/api");
        assert_eq!(resp.top_endpoints[0].traffic, "2.0 KB");
        assert!(resp.top_endpoints[0].p95 > 250.0);

        assert_eq!(resp.server_distribution.len(), 2);
        assert_eq!(resp.http_status_metrics.status_5xx[0].requests, 1);
        assert_eq!(resp.http_status_metrics.status_3xx[1].requests, 1);

        assert_eq!(resp.recent_requests.len(), 4);
        assert_eq!(resp.recent_requests[0].request_uri, "/home");
        assert_eq!(resp.insights[0].title, "Spike in Error Rate");
    }

    #[test]
    fn single_scope_has_no_server_distribution() {
        let rows = rows_of(vec![log("a1", base(), "/", 200, 0.01)]);
        let resp = build_dashboard(
            &rows,
            &AgentScope::Single("a1".to_string()),
            &hour_bucketer(),
        );
        assert!(resp.server_distribution.is_empty());
    }

    #[test]
    fn system_averages_drive_cpu_insight() {
        let rows = DashboardRows {
            system: vec![
                system(base() - Duration::minutes(2), 50.0),
                system(base() - Duration::seconds(10), 90.0),
                system(base() - Duration::seconds(5), 94.0),
            ],
            ..Default::default()
        };
        let resp = build_dashboard(&rows, &AgentScope::All, &hour_bucketer());
        assert_eq!(resp.system_metrics.len(), 2);
        assert!((resp.system_metrics[1].cpu_usage - 92.0).abs() < 1e-9);
        assert_eq!(resp.insights.len(), 1);
        assert_eq!(resp.insights[0].level, InsightLevel::Critical);
        assert_eq!(resp.insights[0].title, "CPU Exhaustion");
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let rows = rows_of((0..30)
            .map(|i| {
                log(
                    &format!("a{}", i % 3),
                    base() - Duration::minutes(i),
                    &format!("/p{}", i % 4),
                    200,
                    0.02,
                )
            })
            .collect());
        let a = build_dashboard(&rows, &AgentScope::All, &hour_bucketer());
        let b = build_dashboard(&rows, &AgentScope::All, &hour_bucketer());
        assert_eq!(a, b);
        // 동점은 URI 순
        assert_eq!(a.top_endpoints[0].uri, "/p0");
        assert_eq!(a.top_endpoints[1].uri, "/p1");
    }

    #[tokio::test]
    async fn query_reads_store_with_previous_period() {
        let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
        store
            .insert_access_logs(&[
                log("a1", base() - Duration::minutes(30), "/x", 200, 0.1),
                log("a1", base() - Duration::minutes(20), "/x", 500, 0.1),
                log("a1", base() - Duration::minutes(90), "/x", 200, 0.1),
            ])
            .await
            .unwrap();
        let engine = AnalyticsEngine::new(
            store,
            Arc::new(FallbackAggregator::new(AnalyticsConfig::default())),
        );

        let query = AnalyticsQuery {
            window: "1h".to_string(),
            ..Default::default()
        };
        let resp = engine.query_at(&query, base()).await;
        assert_eq!(resp.summary.total_requests, 2);
        assert_eq!(resp.summary.requests_delta, 1.0);
        assert!((resp.summary.error_rate_delta - 50.0).abs() < 1e-9);
        assert_eq!(resp.http_status_metrics.total_200_24h, 2);
        assert_eq!(resp.recent_requests[0].status, 500);
    }

    #[tokio::test]
    async fn recent_requests_capped_while_totals_cover_window() {
        let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let logs: Vec<LogItem> = (0..60)
            .map(|i| log("a1", base() - Duration::seconds(i * 30), "/y", 200, 0.05))
            .collect();
        store.insert_access_logs(&logs).await.unwrap();
        let engine = AnalyticsEngine::new(
            store,
            Arc::new(FallbackAggregator::new(AnalyticsConfig::default())),
        );

        let query = AnalyticsQuery {
            window: "1h".to_string(),
            ..Default::default()
        };
        let resp = engine.query_at(&query, base()).await;
        assert_eq!(resp.summary.total_requests, 60);
        assert_eq!(resp.recent_requests.len(), RECENT_REQUESTS);
        assert_eq!(resp.recent_requests[0].timestamp, base().timestamp());
        assert_eq!(resp.top_endpoints[0].requests, 60);
    }

    #[tokio::test]
    async fn store_failure_uses_fallback() {
        let fallback = Arc::new(FallbackAggregator::new(AnalyticsConfig::default()));
        fallback.record(&log("a1", base(), "/f", 503, 0.2).entry, base());
        let engine = AnalyticsEngine::new(Arc::new(BrokenStore), fallback);

        let resp = engine.query_at(&AnalyticsQuery::default(), base()).await;
        assert_eq!(resp.summary.total_requests, 1);
        assert_eq!(resp.top_endpoints[0].uri, "/f");
        assert_eq!(resp.status_distribution[0].code, "503");
    }
}
