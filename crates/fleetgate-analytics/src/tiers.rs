//! 조회 윈도우와 시간 버킷 계층.
//!
//! 범위 길이에 따라 버킷 폭과 라벨 형식이 정해지며, 라벨은 클라이언트 타임존으로 렌더링된다.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use fleetgate_core::models::analytics::TimeRange;

/// 대시보드 윈도우 (알 수 없으면 24h)
pub fn analytics_window(window: &str) -> Duration {
    match window {
        "5m" => Duration::minutes(5),
        "15m" => Duration::minutes(15),
        "30m" => Duration::minutes(30),
        "1h" => Duration::hours(1),
        "3h" => Duration::hours(3),
        "6h" => Duration::hours(6),
        "12h" => Duration::hours(12),
        "2d" => Duration::days(2),
        "3d" => Duration::days(3),
        "7d" => Duration::days(7),
        "30d" => Duration::days(30),
        _ => Duration::hours(24),
    }
}

/// 트레이스 윈도우 (알 수 없으면 1h)
pub fn trace_window(window: &str) -> Duration {
    match window {
        "5m" => Duration::minutes(5),
        "15m" => Duration::minutes(15),
        "6h" => Duration::hours(6),
        "24h" => Duration::hours(24),
        _ => Duration::hours(1),
    }
}

/// 지리 통계 윈도우 (알 수 없으면 24h)
pub fn geo_window(window: &str) -> Duration {
    match window {
        "1h" => Duration::hours(1),
        "6h" => Duration::hours(6),
        "12h" => Duration::hours(12),
        "7d" => Duration::days(7),
        _ => Duration::hours(24),
    }
}

/// 질의 범위 결정. 절대 범위(ms)가 둘 다 양수면 우선한다.
pub fn resolve_range(window: &str, from_ms: i64, to_ms: i64, now: DateTime<Utc>) -> TimeRange {
    if from_ms > 0 && to_ms > 0 {
        if let (Some(start), Some(end)) = (
            Utc.timestamp_millis_opt(from_ms).single(),
            Utc.timestamp_millis_opt(to_ms).single(),
        ) {
            return TimeRange::new(start, end);
        }
    }
    TimeRange::ending_at(now, analytics_window(window))
}

/// 타임존 이름 파싱 (유효하지 않으면 UTC)
pub fn parse_timezone(name: &str) -> Tz {
    name.trim().parse::<Tz>().unwrap_or(Tz::UTC)
}

/// 버킷 폭
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketWidth {
    /// 1분
    Minute,
    /// 5분
    FiveMinutes,
    /// 15분
    FifteenMinutes,
    /// 1시간
    Hour,
    /// 1일
    Day,
}

/// 버킷 폭 + 라벨 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketTier {
    /// 버킷 폭
    pub width: BucketWidth,
    /// strftime 라벨 형식
    pub format: &'static str,
}

/// 범위 길이로 버킷 계층 선택
pub fn tier_for(range: &TimeRange, tz: &Tz) -> BucketTier {
    let duration = range.duration();
    let (width, format) = if duration <= Duration::hours(1) {
        (BucketWidth::Minute, "%H:%M")
    } else if duration <= Duration::hours(3) {
        (BucketWidth::FiveMinutes, "%H:%M")
    } else if duration <= Duration::hours(6) {
        (BucketWidth::FifteenMinutes, "%H:%M")
    } else if duration <= Duration::hours(12) {
        let crosses_day = range.start.with_timezone(tz).date_naive()
            != range.end.with_timezone(tz).date_naive();
        if crosses_day {
            (BucketWidth::Hour, "%m-%d %H:%M")
        } else {
            (BucketWidth::Hour, "%H:%M")
        }
    } else if duration <= Duration::hours(24) {
        (BucketWidth::Hour, "%m-%d %H:%M")
    } else if duration <= Duration::days(7) {
        (BucketWidth::Hour, "%m-%d %H:00")
    } else {
        (BucketWidth::Day, "%Y-%m-%d")
    };
    BucketTier { width, format }
}

/// 타임스탬프 → 버킷 키/라벨 변환기
#[derive(Debug, Clone, Copy)]
pub struct Bucketer {
    tier: BucketTier,
    tz: Tz,
}

impl Bucketer {
    /// 범위와 타임존으로 생성
    pub fn for_range(range: &TimeRange, tz: Tz) -> Self {
        Self {
            tier: tier_for(range, &tz),
            tz,
        }
    }

    /// 명시적 계층으로 생성
    pub fn with_tier(tier: BucketTier, tz: Tz) -> Self {
        Self { tier, tz }
    }

    /// 선택된 계층
    pub fn tier(&self) -> BucketTier {
        self.tier
    }

    /// 버킷 시작 시각 (클라이언트 로컬 시각 기준)
    pub fn key(&self, ts: DateTime<Utc>) -> NaiveDateTime {
        truncate(ts.with_timezone(&self.tz).naive_local(), self.tier.width)
    }

    /// 버킷 라벨
    pub fn label(&self, key: &NaiveDateTime) -> String {
        key.format(self.tier.format).to_string()
    }
}

fn truncate(local: NaiveDateTime, width: BucketWidth) -> NaiveDateTime {
    let (h, m) = (local.hour(), local.minute());
    let time = match width {
        BucketWidth::Minute => NaiveTime::from_hms_opt(h, m, 0),
        BucketWidth::FiveMinutes => NaiveTime::from_hms_opt(h, m - m % 5, 0),
        BucketWidth::FifteenMinutes => NaiveTime::from_hms_opt(h, m - m % 15, 0),
        BucketWidth::Hour => NaiveTime::from_hms_opt(h, 0, 0),
        BucketWidth::Day => NaiveTime::from_hms_opt(0, 0, 0),
    };
    local.date().and_time(time.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    fn range(hours: i64, end: DateTime<Utc>) -> TimeRange {
        TimeRange::ending_at(end, Duration::hours(hours))
    }

    #[test]
    fn unknown_windows_fall_back() {
        assert_eq!(analytics_window("bogus"), Duration::hours(24));
        assert_eq!(analytics_window("30d"), Duration::days(30));
        assert_eq!(trace_window(""), Duration::hours(1));
        assert_eq!(geo_window("7d"), Duration::days(7));
        assert_eq!(geo_window("30m"), Duration::hours(24));
    }

    #[test]
    fn absolute_range_takes_precedence() {
        let now = at(12, 0);
        let r = resolve_range("1h", 1_700_000_000_000, 1_700_003_600_000, now);
        assert_eq!(r.start.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(r.duration(), Duration::hours(1));

        let r = resolve_range("1h", 0, 1_700_003_600_000, now);
        assert_eq!(r.end, now);
        assert_eq!(r.duration(), Duration::hours(1));
    }

    #[test]
    fn tier_table() {
        let tz = Tz::UTC;
        let end = at(12, 0);
        assert_eq!(tier_for(&range(1, end), &tz).width, BucketWidth::Minute);
        assert_eq!(tier_for(&range(3, end), &tz).width, BucketWidth::FiveMinutes);
        assert_eq!(tier_for(&range(6, end), &tz).width, BucketWidth::FifteenMinutes);

        let same_day = tier_for(&range(12, end), &tz);
        assert_eq!((same_day.width, same_day.format), (BucketWidth::Hour, "%H:%M"));
        let crossing = tier_for(&range(12, at(6, 0)), &tz);
        assert_eq!(crossing.format, "%m-%d %H:%M");

        assert_eq!(tier_for(&range(24, end), &tz).format, "%m-%d %H:%M");
        assert_eq!(tier_for(&range(72, end), &tz).format, "%m-%d %H:00");
        let long = tier_for(&range(24 * 30, end), &tz);
        assert_eq!((long.width, long.format), (BucketWidth::Day, "%Y-%m-%d"));
    }

    #[test]
    fn buckets_truncate_and_render_in_client_timezone() {
        let seoul = parse_timezone("Asia/Seoul");
        let b = Bucketer::for_range(&range(3, at(12, 0)), seoul);
        let key = b.key(at(10, 17));
        assert_eq!(b.label(&key), "19:15");

        let utc = Bucketer::for_range(&range(3, at(12, 0)), parse_timezone("Not/AZone"));
        assert_eq!(utc.label(&utc.key(at(10, 17))), "10:15");
    }

    #[test]
    fn keys_order_chronologically() {
        let b = Bucketer::for_range(&range(1, at(12, 0)), Tz::UTC);
        assert!(b.key(at(11, 5)) < b.key(at(11, 6)));
        assert_eq!(b.key(at(11, 5)), b.key(at(11, 5) + Duration::seconds(59)));
    }
}
