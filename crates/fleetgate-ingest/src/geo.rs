//! 클라이언트 IP 지오 보강.
//!
//! 잘 알려진 공인 주소 테이블을 먼저 조회하고, 사설/루프백/링크로컬 주소는
//! 빈 위치를 돌려준다. 나머지 공인 IPv4는 첫 옥텟 대역으로 대략적인 지역을 추정한다.

use fleetgate_core::error::CoreError;
use fleetgate_core::models::telemetry::GeoLocation;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use tracing::info;

/// (ip, country, code, city, region, lat, lon, timezone, isp)
type WellKnownRow = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    f64,
    f64,
    &'static str,
    &'static str,
);

const WELL_KNOWN_ROWS: &[WellKnownRow] = &[
    ("8.8.8.8", "United States", "US", "Mountain View", "California", 37.4056, -122.0775, "America/Los_Angeles", "Google"),
    ("8.8.4.4", "United States", "US", "Mountain View", "California", 37.4056, -122.0775, "America/Los_Angeles", "Google"),
    ("1.1.1.1", "Australia", "AU", "Sydney", "New South Wales", -33.8688, 151.2093, "Australia/Sydney", "Cloudflare"),
    ("1.0.0.1", "Australia", "AU", "Sydney", "New South Wales", -33.8688, 151.2093, "Australia/Sydney", "Cloudflare"),
    ("52.95.110.1", "United States", "US", "Ashburn", "Virginia", 39.0438, -77.4874, "America/New_York", "Amazon AWS"),
    ("13.107.21.200", "United States", "US", "Redmond", "Washington", 47.6740, -122.1215, "America/Los_Angeles", "Microsoft"),
    ("91.198.174.192", "Netherlands", "NL", "Amsterdam", "North Holland", 52.3676, 4.9041, "Europe/Amsterdam", "Wikimedia"),
    ("203.0.113.10", "Japan", "JP", "Tokyo", "Tokyo", 35.6762, 139.6503, "Asia/Tokyo", "Test Network"),
    ("185.199.108.153", "United States", "US", "San Francisco", "California", 37.7749, -122.4194, "America/Los_Angeles", "GitHub"),
    ("34.117.59.81", "United States", "US", "The Dalles", "Oregon", 45.5946, -121.1787, "America/Los_Angeles", "Google Cloud"),
    ("151.101.1.69", "United States", "US", "San Francisco", "California", 37.7749, -122.4194, "America/Los_Angeles", "Fastly"),
    ("104.16.132.229", "United States", "US", "San Francisco", "California", 37.7749, -122.4194, "America/Los_Angeles", "Cloudflare"),
    ("139.130.4.5", "Australia", "AU", "Melbourne", "Victoria", -37.8136, 144.9631, "Australia/Melbourne", "Telstra"),
    ("177.54.144.106", "Brazil", "BR", "São Paulo", "São Paulo", -23.5505, -46.6333, "America/Sao_Paulo", "Claro"),
    ("41.203.65.114", "South Africa", "ZA", "Johannesburg", "Gauteng", -26.2041, 28.0473, "Africa/Johannesburg", "MTN"),
    ("103.21.244.0", "Singapore", "SG", "Singapore", "Central Singapore", 1.3521, 103.8198, "Asia/Singapore", "Cloudflare"),
    ("202.12.29.205", "Japan", "JP", "Osaka", "Osaka", 34.6937, 135.5023, "Asia/Tokyo", "APNIC"),
    ("196.216.2.1", "Nigeria", "NG", "Lagos", "Lagos", 6.5244, 3.3792, "Africa/Lagos", "MainOne"),
    ("103.10.124.1", "India", "IN", "Mumbai", "Maharashtra", 19.0760, 72.8777, "Asia/Kolkata", "Reliance Jio"),
    ("49.36.128.1", "India", "IN", "New Delhi", "Delhi", 28.6139, 77.2090, "Asia/Kolkata", "Airtel"),
    ("185.93.0.1", "United Kingdom", "GB", "London", "England", 51.5074, -0.1278, "Europe/London", "BT"),
    ("185.157.0.1", "Germany", "DE", "Frankfurt", "Hesse", 50.1109, 8.6821, "Europe/Berlin", "Deutsche Telekom"),
    ("80.67.169.12", "France", "FR", "Paris", "Île-de-France", 48.8566, 2.3522, "Europe/Paris", "FDN"),
    ("99.79.0.1", "Canada", "CA", "Toronto", "Ontario", 43.6532, -79.3832, "America/Toronto", "Rogers"),
    ("189.240.36.1", "Mexico", "MX", "Mexico City", "Mexico City", 19.4326, -99.1332, "America/Mexico_City", "Telmex"),
    ("223.5.5.5", "China", "CN", "Hangzhou", "Zhejiang", 30.2741, 120.1551, "Asia/Shanghai", "Alibaba"),
    ("77.88.8.8", "Russia", "RU", "Moscow", "Moscow", 55.7558, 37.6173, "Europe/Moscow", "Yandex"),
    ("168.126.63.1", "South Korea", "KR", "Seoul", "Seoul", 37.5665, 126.9780, "Asia/Seoul", "Korea Telecom"),
    ("94.200.0.1", "United Arab Emirates", "AE", "Dubai", "Dubai", 25.2048, 55.2708, "Asia/Dubai", "Etisalat"),
];

static WELL_KNOWN: Lazy<HashMap<String, GeoLocation>> = Lazy::new(|| {
    WELL_KNOWN_ROWS
        .iter()
        .map(|&(ip, country, code, city, region, lat, lon, tz, isp)| {
            (
                ip.to_string(),
                GeoLocation {
                    country: country.to_string(),
                    country_code: code.to_string(),
                    city: city.to_string(),
                    region: region.to_string(),
                    latitude: lat,
                    longitude: lon,
                    timezone: tz.to_string(),
                    isp: isp.to_string(),
                },
            )
        })
        .collect()
});

/// IP → 지리 위치 해석기
#[derive(Debug, Clone, Default)]
pub struct GeoResolver {
    /// CSV로 추가된 항목 (내장 테이블보다 우선)
    custom: HashMap<String, GeoLocation>,
}

impl GeoResolver {
    /// 내장 테이블만 사용하는 해석기
    pub fn new() -> Self {
        Self::default()
    }

    /// IP 조회. 알 수 없으면 빈 위치.
    pub fn lookup(&self, ip: &str) -> GeoLocation {
        let ip = ip.trim();
        if ip.is_empty() {
            return GeoLocation::default();
        }

        if let Some(loc) = self.custom.get(ip).or_else(|| WELL_KNOWN.get(ip)) {
            return loc.clone();
        }

        match ip.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) if !is_non_public_v4(&v4) => guess_by_first_octet(v4.octets()[0]),
            _ => GeoLocation::default(),
        }
    }

    /// CSV(`ip,country,country_code,city,lat,lon,timezone`)로 테이블 확장
    ///
    /// 첫 줄(헤더)과 필드가 7개 미만인 줄은 건너뛴다. 추가된 항목 수 반환.
    pub fn load_csv(&mut self, path: &Path) -> Result<usize, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let mut loaded = 0;

        for line in content.lines().skip(1) {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 7 || fields[0].is_empty() {
                continue;
            }
            let location = GeoLocation {
                country: fields[1].to_string(),
                country_code: fields[2].to_string(),
                city: fields[3].to_string(),
                latitude: fields[4].parse().unwrap_or(0.0),
                longitude: fields[5].parse().unwrap_or(0.0),
                timezone: fields[6].to_string(),
                ..Default::default()
            };
            self.custom.insert(fields[0].to_string(), location);
            loaded += 1;
        }

        info!("지오 CSV 로드: {loaded}개 항목 ({})", path.display());
        Ok(loaded)
    }

    /// 사용자 정의 항목 수
    pub fn custom_len(&self) -> usize {
        self.custom.len()
    }
}

fn is_non_public_v4(ip: &Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified()
}

fn guess_by_first_octet(first: u8) -> GeoLocation {
    let (country, code, lat, lon) = match first {
        1..=126 => ("United States", "US", 39.8283, -98.5795),
        128..=191 => ("Europe", "EU", 50.1109, 8.6821),
        192..=223 => ("Asia Pacific", "AP", 35.6762, 139.6503),
        _ => return GeoLocation::default(),
    };
    GeoLocation {
        country: country.to_string(),
        country_code: code.to_string(),
        city: "Unknown".to_string(),
        latitude: lat,
        longitude: lon,
        ..Default::default()
    }
}

/// 클라이언트 IP 추출
///
/// X-Forwarded-For 첫 항목 우선, 없으면 원격 주소(포트 제거), 둘 다 없으면 빈 문자열.
pub fn extract_client_ip(forwarded_for: &str, remote_addr: &str) -> String {
    if let Some(first) = forwarded_for.split(',').next() {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    let remote = remote_addr.trim();
    if remote.is_empty() {
        return String::new();
    }
    match remote.parse::<std::net::SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => remote.to_string(),
    }
}
