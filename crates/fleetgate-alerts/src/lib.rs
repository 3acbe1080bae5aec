//! # fleetgate-alerts
//!
//! 사용자 정의 임계값 규칙을 주기적으로 평가해 수신자에게 알린다.
//! 집계는 `MetricAggregator` 포트, 발송은 `Notifier` 포트에 위임한다.

pub mod engine;
pub mod evaluator;

pub use engine::{AlertEngine, EvaluationSummary};
pub use evaluator::{evaluate_rule, format_alert, route_recipients, Recipients, RuleOutcome};
