//! KPI 공식과 집계 프리미티브.
//!
//! 저장소 기반 질의와 폴백 집계가 같은 함수를 공유한다.

use fleetgate_core::models::analytics::{AnalyticsSummary, LatencyBucket, LogSample, LogTotals};
use fleetgate_core::models::telemetry::LogEntry;

/// 지연 히스토그램 라벨 (고정 순서)
pub const LATENCY_BUCKETS: [&str; 5] = ["0-50ms", "50-100ms", "100-200ms", "200-500ms", "500ms+"];

/// 요청 처리 시간(초)의 히스토그램 버킷 인덱스
pub fn latency_bucket_index(request_time: f64) -> usize {
    if request_time < 0.05 {
        0
    } else if request_time < 0.1 {
        1
    } else if request_time < 0.2 {
        2
    } else if request_time < 0.5 {
        3
    } else {
        4
    }
}

/// 버킷 카운트 → 응답 히스토그램 (다섯 버킷 모두 포함)
pub fn latency_histogram(counts: &[u64; 5]) -> Vec<LatencyBucket> {
    LATENCY_BUCKETS
        .iter()
        .zip(counts.iter())
        .map(|(label, count)| LatencyBucket {
            bucket: (*label).to_string(),
            count: *count,
        })
        .collect()
}

/// NaN/무한대를 0으로
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// 정렬된 표본의 백분위 (선형 보간, 표본 없으면 0)
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sanitize(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
        }
    }
}

/// 바이트 수를 사람이 읽는 형식으로 (1024 단위)
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {prefix}B", bytes as f64 / div as f64)
}

/// 로그 바이트 필드 (음수는 0)
pub fn body_bytes(entry: &LogEntry) -> u64 {
    clamp_bytes(entry.body_bytes_sent)
}

/// 음수 바이트 값은 0
pub fn clamp_bytes(bytes: i64) -> u64 {
    u64::try_from(bytes).unwrap_or(0)
}

/// 에러 응답 여부 (4xx/5xx)
pub fn is_error(status: i32) -> bool {
    status >= 400
}

/// 요청/에러/바이트/지연 누적기
///
/// 상태 코드 0(응답 없음)은 KPI에서 제외한다.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Kpi {
    /// 요청 수
    pub requests: u64,
    /// 에러 수
    pub errors: u64,
    /// 전송 바이트
    pub bytes: u64,
    /// 처리 시간 합 (초)
    pub latency_sum: f64,
}

impl Kpi {
    /// 로그 한 건 반영
    pub fn record(&mut self, entry: &LogEntry) {
        self.record_parts(entry.status, entry.body_bytes_sent, entry.request_time);
    }

    /// 투영된 로그 한 건 반영
    pub fn record_sample(&mut self, sample: &LogSample) {
        self.record_parts(sample.status, sample.body_bytes_sent, sample.request_time);
    }

    fn record_parts(&mut self, status: i32, body_bytes_sent: i64, request_time: f64) {
        if status <= 0 {
            return;
        }
        self.requests += 1;
        if is_error(status) {
            self.errors += 1;
        }
        self.bytes += clamp_bytes(body_bytes_sent);
        self.latency_sum += sanitize(request_time);
    }

    /// 로그 목록 집계
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Self {
        let mut kpi = Self::default();
        for entry in entries {
            kpi.record(entry);
        }
        kpi
    }

    /// 에러율 (%), 요청 없으면 0
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        sanitize(self.errors as f64 / self.requests as f64 * 100.0)
    }

    /// 평균 지연 (ms), 요청 없으면 0
    pub fn avg_latency_ms(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        sanitize(self.latency_sum / self.requests as f64 * 1000.0)
    }
}

impl From<LogTotals> for Kpi {
    fn from(totals: LogTotals) -> Self {
        Self {
            requests: totals.requests,
            errors: totals.errors,
            bytes: totals.bytes,
            latency_sum: sanitize(totals.latency_sum),
        }
    }
}

/// 현재/직전 기간 KPI → 요약
pub fn summarize(current: &Kpi, previous: &Kpi) -> AnalyticsSummary {
    AnalyticsSummary {
        total_requests: current.requests,
        error_rate: current.error_rate(),
        avg_latency: current.avg_latency_ms(),
        total_bandwidth: current.bytes,
        requests_delta: current.requests as f64 - previous.requests as f64,
        latency_delta: sanitize(current.avg_latency_ms() - previous.avg_latency_ms()),
        error_rate_delta: sanitize(current.error_rate() - previous.error_rate()),
    }
}
