//! 요약 KPI와 최신 시스템 포인트에서 파생되는 인사이트.

use fleetgate_core::models::analytics::{
    AnalyticsSummary, Insight, InsightLevel, SystemMetricPoint,
};

/// 평균 지연 경고 임계값 (ms)
const LATENCY_WARN_MS: f64 = 200.0;
/// 에러율 심각 임계값 (%)
const ERROR_RATE_CRITICAL: f64 = 5.0;
/// CPU 심각 임계값 (%)
const CPU_CRITICAL: f64 = 80.0;
/// 메모리 경고 임계값 (%)
const MEMORY_WARN: f64 = 85.0;

fn insight(level: InsightLevel, title: &str, message: String) -> Insight {
    Insight {
        level,
        title: title.to_string(),
        message,
    }
}

/// 인사이트 생성 (규칙은 누적 적용, 해당 없으면 정상 안내 1건)
pub fn generate_insights(summary: &AnalyticsSummary, system: &[SystemMetricPoint]) -> Vec<Insight> {
    let mut insights = Vec::new();

    if summary.avg_latency > LATENCY_WARN_MS {
        insights.push(insight(
            InsightLevel::Warning,
            "High Latency Detected",
            format!(
                "Average latency is {:.2}ms, which is above the 200ms threshold.",
                summary.avg_latency
            ),
        ));
    }

    if summary.error_rate > ERROR_RATE_CRITICAL {
        insights.push(insight(
            InsightLevel::Critical,
            "Spike in Error Rate",
            format!(
                "Error rate has climbed to {:.2}%. Check upstream health.",
                summary.error_rate
            ),
        ));
    }

    if let Some(last) = system.last() {
        if last.cpu_usage > CPU_CRITICAL {
            insights.push(insight(
                InsightLevel::Critical,
                "CPU Exhaustion",
                format!(
                    "CPU usage is currently at {:.1}% on selected node(s).",
                    last.cpu_usage
                ),
            ));
        }
        if last.memory_usage > MEMORY_WARN {
            insights.push(insight(
                InsightLevel::Warning,
                "High Memory Pressure",
                format!(
                    "Memory usage is at {:.1}%. Consider scaling up.",
                    last.memory_usage
                ),
            ));
        }
    }

    if insights.is_empty() {
        insights.push(insight(
            InsightLevel::Info,
            "Systems Healthy",
            "All metrics are within normal operational parameters.".to_string(),
        ));
    }
    insights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_when_nothing_fires() {
        let insights = generate_insights(&AnalyticsSummary::default(), &[]);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].level, InsightLevel::Info);
        assert_eq!(insights[0].title, "Systems Healthy");
    }

    #[test]
    fn rules_are_additive() {
        let summary = AnalyticsSummary {
            avg_latency: 250.0,
            error_rate: 12.5,
            ..Default::default()
        };
        let system = vec![
            SystemMetricPoint {
                cpu_usage: 99.0,
                ..Default::default()
            },
            SystemMetricPoint {
                cpu_usage: 85.5,
                memory_usage: 90.0,
                ..Default::default()
            },
        ];
        let insights = generate_insights(&summary, &system);
        let titles: Vec<&str> = insights.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "High Latency Detected",
                "Spike in Error Rate",
                "CPU Exhaustion",
                "High Memory Pressure"
            ]
        );
        assert_eq!(
            insights[0].message,
            "Average latency is 250.00ms, which is above the 200ms threshold."
        );
        assert_eq!(
            insights[1].message,
            "Error rate has climbed to 12.50%. Check upstream health."
        );
        assert_eq!(
            insights[2].message,
            "CPU usage is currently at 85.5% on selected node(s)."
        );
    }

    #[test]
    fn thresholds_are_strict() {
        let summary = AnalyticsSummary {
            avg_latency: 200.0,
            error_rate: 5.0,
            ..Default::default()
        };
        let insights = generate_insights(&summary, &[]);
        assert_eq!(insights[0].title, "Systems Healthy");
    }
}
