//! 규칙 한 건 평가와 알림 발송.

use chrono::{DateTime, Utc};
use fleetgate_core::error::CoreError;
use fleetgate_core::models::alert::{AlertMetric, AlertRule};
use fleetgate_core::ports::analytics::MetricAggregator;
use fleetgate_core::ports::notifier::Notifier;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 규칙 평가 결과
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// 임계값 미도달
    Quiet(f64),
    /// 트리거되어 알림 발송 (이메일 발송 성공 수)
    Triggered {
        /// 집계값
        value: f64,
        /// 발송 성공한 이메일 수
        delivered: usize,
    },
    /// 이번 틱 건너뜀 (알 수 없는 메트릭, 집계 실패, 타임아웃)
    Skipped,
}

/// 알림 제목/본문 생성
pub fn format_alert(
    rule: &AlertRule,
    metric: AlertMetric,
    value: f64,
    at: DateTime<Utc>,
) -> (String, String) {
    let subject = format!("[ALERT] {} triggered", rule.name);
    let body = format!(
        "Alert Rule '{}' has been triggered.\n\nMetric: {}\nCurrent Value: {:.2}\nThreshold: {} {:.2}\nTime: {}",
        rule.name,
        metric,
        value,
        rule.comparison,
        rule.threshold,
        at.format("%a, %d %b %Y %H:%M:%S UTC"),
    );
    (subject, body)
}

/// 규칙 한 건 평가
///
/// 집계는 `timeout` 안에 끝나야 하며, 실패하면 이번 틱만 건너뛴다.
pub async fn evaluate_rule(
    rule: &AlertRule,
    aggregator: &dyn MetricAggregator,
    notifier: &dyn Notifier,
    timeout: Duration,
) -> RuleOutcome {
    let metric: AlertMetric = match rule.metric_type.parse() {
        Ok(metric) => metric,
        Err(e) => {
            warn!("규칙 {} 건너뜀: {e}", rule.id);
            return RuleOutcome::Skipped;
        }
    };

    let aggregate = aggregator.metric_aggregate(metric, rule.window_secs);
    let value = match tokio::time::timeout(timeout, aggregate).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!("규칙 {} 집계 실패: {e}", rule.id);
            return RuleOutcome::Skipped;
        }
        Err(_) => {
            warn!(
                "규칙 {} 평가 실패: {}",
                rule.id,
                CoreError::Timeout(timeout.as_secs())
            );
            return RuleOutcome::Skipped;
        }
    };

    if !rule.comparison.triggers(value, rule.threshold) {
        debug!(
            "규칙 {}: {metric}={value:.2}, 임계값 {} {:.2} 미도달",
            rule.id, rule.comparison, rule.threshold
        );
        return RuleOutcome::Quiet(value);
    }

    info!(
        "알림 트리거: {} ({metric}={value:.2} {} {:.2})",
        rule.name, rule.comparison, rule.threshold
    );
    let (subject, body) = format_alert(rule, metric, value, Utc::now());
    let delivered = dispatch(rule, notifier, &subject, &body).await;
    RuleOutcome::Triggered { value, delivered }
}

/// 수신자 분류 결과
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Recipients<'a> {
    /// `@`를 포함한 이메일 주소
    pub emails: Vec<&'a str>,
    /// 나머지 (웹훅 대상)
    pub webhooks: Vec<&'a str>,
}

/// 규칙 수신자를 이메일/웹훅으로 분류
pub fn route_recipients(rule: &AlertRule) -> Recipients<'_> {
    let (emails, webhooks) = rule
        .recipient_list()
        .into_iter()
        .partition(|recipient| recipient.contains('@'));
    Recipients { emails, webhooks }
}

/// 수신자별 발송. 실패는 수신자 단위로 격리된다.
async fn dispatch(rule: &AlertRule, notifier: &dyn Notifier, subject: &str, body: &str) -> usize {
    let recipients = route_recipients(rule);
    let mut delivered = 0;
    for recipient in recipients.emails {
        match notifier.send(recipient, subject, body).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!("알림 발송 실패 ({recipient}): {e}"),
        }
    }
    for hook in recipients.webhooks {
        // TODO: 웹훅 수신자 HTTP POST 발송
        info!("웹훅 알림 미구현, 기록만 남김: {hook}");
    }
    delivered
}
