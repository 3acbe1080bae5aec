//! 지리 분석.

use chrono::{DateTime, Utc};
use fleetgate_core::models::analytics::{
    AgentScope, CityStat, CountryStat, GeoPoint, GeoRequest, GeoSummary, TimeRange,
};
use fleetgate_core::models::telemetry::LogItem;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use super::AnalyticsEngine;
use crate::aggregate::{body_bytes, is_error, Kpi};
use crate::tiers::geo_window;

const MAX_LOCATIONS: usize = 100;
const MAX_COUNTRIES: usize = 50;
const MAX_CITIES: usize = 100;
const MAX_RECENT: usize = 50;

impl AnalyticsEngine {
    /// 지리 통계 (저장소 실패 시 빈 결과)
    pub async fn geo_summary(&self, window: &str, scope: &AgentScope) -> GeoSummary {
        self.geo_summary_at(window, scope, Utc::now()).await
    }

    /// 기준 시각을 지정한 지리 통계
    pub async fn geo_summary_at(
        &self,
        window: &str,
        scope: &AgentScope,
        now: DateTime<Utc>,
    ) -> GeoSummary {
        let range = TimeRange::ending_at(now, geo_window(window));
        match self.store.query_access_logs(range, scope).await {
            Ok(logs) => build_geo(&logs),
            Err(e) => {
                warn!("지리 통계 로그 조회 실패: {e}");
                GeoSummary::default()
            }
        }
    }
}

/// (국가, 코드, 도시, 위도, 경도) 위치 키. 좌표는 비트 패턴으로 비교한다.
type LocationKey<'a> = (&'a str, &'a str, &'a str, u64, u64);

#[derive(Default)]
struct LocationAcc {
    requests: u64,
    errors: u64,
    latency_sum: f64,
}

struct CityAcc {
    latitude: f64,
    longitude: f64,
    requests: u64,
}

fn build_geo(logs: &[LogItem]) -> GeoSummary {
    let mut locations: BTreeMap<LocationKey<'_>, LocationAcc> = BTreeMap::new();
    let mut countries: BTreeMap<(&str, &str), Kpi> = BTreeMap::new();
    let mut cities: BTreeMap<(&str, &str, &str), CityAcc> = BTreeMap::new();
    let mut country_codes: BTreeSet<&str> = BTreeSet::new();
    let mut city_names: BTreeSet<&str> = BTreeSet::new();
    let mut total_requests = 0u64;

    for item in logs {
        let geo = &item.geo;
        if geo.country.is_empty() {
            continue;
        }
        let entry = &item.entry;
        total_requests += 1;
        country_codes.insert(geo.country_code.as_str());
        city_names.insert(geo.city.as_str());

        // 국가 통계는 상태 코드 0 행도 요청으로 센다
        let country = countries
            .entry((geo.country.as_str(), geo.country_code.as_str()))
            .or_default();
        country.requests += 1;
        country.errors += u64::from(is_error(entry.status));
        country.bytes += body_bytes(entry);

        if geo.latitude != 0.0 {
            let loc = locations
                .entry((
                    geo.country.as_str(),
                    geo.country_code.as_str(),
                    geo.city.as_str(),
                    geo.latitude.to_bits(),
                    geo.longitude.to_bits(),
                ))
                .or_default();
            loc.requests += 1;
            loc.errors += u64::from(is_error(entry.status));
            loc.latency_sum += entry.request_time;
        }

        if !geo.city.is_empty() && geo.city != "Unknown" {
            cities
                .entry((
                    geo.city.as_str(),
                    geo.country.as_str(),
                    geo.country_code.as_str(),
                ))
                .or_insert(CityAcc {
                    latitude: geo.latitude,
                    longitude: geo.longitude,
                    requests: 0,
                })
                .requests += 1;
        }
    }

    let mut location_points: Vec<GeoPoint> = locations
        .into_iter()
        .map(|((country, code, city, lat, lon), acc)| GeoPoint {
            country: country.to_string(),
            country_code: code.to_string(),
            city: city.to_string(),
            latitude: f64::from_bits(lat),
            longitude: f64::from_bits(lon),
            requests: acc.requests,
            errors: acc.errors,
            avg_latency: acc.latency_sum / acc.requests as f64 * 1000.0,
        })
        .collect();
    location_points.sort_by(|a, b| b.requests.cmp(&a.requests));
    location_points.truncate(MAX_LOCATIONS);

    let mut country_stats: Vec<CountryStat> = countries
        .into_iter()
        .map(|((country, code), kpi)| CountryStat {
            country: country.to_string(),
            country_code: code.to_string(),
            requests: kpi.requests,
            errors: kpi.errors,
            bandwidth: kpi.bytes,
            error_rate: kpi.error_rate(),
        })
        .collect();
    country_stats.sort_by(|a, b| b.requests.cmp(&a.requests));
    country_stats.truncate(MAX_COUNTRIES);

    let mut city_stats: Vec<CityStat> = cities
        .into_iter()
        .map(|((city, country, code), acc)| CityStat {
            city: city.to_string(),
            country: country.to_string(),
            country_code: code.to_string(),
            latitude: acc.latitude,
            longitude: acc.longitude,
            requests: acc.requests,
        })
        .collect();
    city_stats.sort_by(|a, b| b.requests.cmp(&a.requests));
    city_stats.truncate(MAX_CITIES);

    let recent_requests = logs
        .iter()
        .rev()
        .filter(|item| !item.geo.country.is_empty() && item.geo.latitude != 0.0)
        .take(MAX_RECENT)
        .map(|item| GeoRequest {
            timestamp: item.timestamp.timestamp(),
            client_ip: item.client_ip.clone(),
            country: item.geo.country.clone(),
            country_code: item.geo.country_code.clone(),
            city: item.geo.city.clone(),
            latitude: item.geo.latitude,
            longitude: item.geo.longitude,
            method: item.entry.request_method.clone(),
            uri: item.entry.request_uri.clone(),
            status: item.entry.status,
        })
        .collect();

    GeoSummary {
        top_country_code: country_stats
            .first()
            .map(|c| c.country_code.clone())
            .unwrap_or_default(),
        locations: location_points,
        country_stats,
        city_stats,
        recent_requests,
        total_countries: country_codes.len() as u64,
        total_cities: city_names.len() as u64,
        total_requests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{base, log, BrokenStore};
    use crate::fallback::FallbackAggregator;
    use chrono::Duration;
    use fleetgate_core::config::AnalyticsConfig;
    use fleetgate_core::models::telemetry::GeoLocation;
    use std::sync::Arc;

    fn located(at: DateTime<Utc>, code: &str, city: &str, lat: f64, status: i32) -> LogItem {
        let mut item = log("a1", at, "/geo", status, 0.05);
        item.geo = GeoLocation {
            country: format!("Country {code}"),
            country_code: code.to_string(),
            city: city.to_string(),
            latitude: lat,
            longitude: lat / 2.0,
            ..Default::default()
        };
        item
    }

    #[test]
    fn aggregates_by_location_country_and_city() {
        let t = base();
        let logs = vec![
            located(t, "KR", "Seoul", 37.5, 200),
            located(t + Duration::seconds(1), "KR", "Seoul", 37.5, 500),
            located(t + Duration::seconds(2), "KR", "Unknown", 0.0, 200),
            located(t + Duration::seconds(3), "US", "Austin", 30.2, 200),
            log("a1", t + Duration::seconds(4), "/private", 200, 0.01),
        ];
        let geo = build_geo(&logs);

        assert_eq!(geo.total_requests, 4);
        assert_eq!(geo.total_countries, 2);
        assert_eq!(geo.total_cities, 3);
        assert_eq!(geo.top_country_code, "KR");

        assert_eq!(geo.locations.len(), 2);
        assert_eq!(geo.locations[0].city, "Seoul");
        assert_eq!(geo.locations[0].errors, 1);
        assert!((geo.locations[0].avg_latency - 50.0).abs() < 1e-9);

        assert_eq!(geo.country_stats[0].requests, 3);
        assert!((geo.country_stats[0].error_rate - 100.0 / 3.0).abs() < 1e-9);

        let cities: Vec<&str> = geo.city_stats.iter().map(|c| c.city.as_str()).collect();
        assert_eq!(cities, vec!["Seoul", "Austin"]);

        assert_eq!(geo.recent_requests.len(), 3);
        assert_eq!(geo.recent_requests[0].country_code, "US");
    }

    #[tokio::test]
    async fn store_failure_yields_empty_summary() {
        let engine = AnalyticsEngine::new(
            Arc::new(BrokenStore),
            Arc::new(FallbackAggregator::new(AnalyticsConfig::default())),
        );
        let geo = engine.geo_summary("1h", &AgentScope::All).await;
        assert_eq!(geo, GeoSummary::default());
    }
}
