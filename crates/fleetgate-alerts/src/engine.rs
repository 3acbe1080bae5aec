//! 알림 평가 엔진.
//!
//! 정지 → `start()` → 실행(주기 평가) → `stop()` → 정지.
//! 틱마다 활성 규칙을 각각 별도 태스크에서 평가한다. `stop()`은 틱 루프만 끝내며
//! 이미 시작된 평가는 끝까지 진행된다.

use fleetgate_core::config::AlertsConfig;
use fleetgate_core::error::CoreError;
use fleetgate_core::ports::analytics::MetricAggregator;
use fleetgate_core::ports::metadata_store::AlertRuleStore;
use fleetgate_core::ports::notifier::Notifier;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::evaluator::{evaluate_rule, RuleOutcome};

/// 평가 1회 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    /// 평가한 활성 규칙 수
    pub evaluated: usize,
    /// 트리거된 규칙 수
    pub triggered: usize,
    /// 건너뛴 규칙 수
    pub skipped: usize,
}

struct Running {
    stop_tx: watch::Sender<bool>,
    ticker: JoinHandle<()>,
}

/// 주기적 규칙 평가기
pub struct AlertEngine {
    rules: Arc<dyn AlertRuleStore>,
    aggregator: Arc<dyn MetricAggregator>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    timeout: Duration,
    running: Mutex<Option<Running>>,
}

impl AlertEngine {
    /// 새 엔진 생성 (정지 상태)
    pub fn new(
        rules: Arc<dyn AlertRuleStore>,
        aggregator: Arc<dyn MetricAggregator>,
        notifier: Arc<dyn Notifier>,
        config: &AlertsConfig,
    ) -> Self {
        Self {
            rules,
            aggregator,
            notifier,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            timeout: Duration::from_secs(config.evaluation_timeout_secs.max(1)),
            running: Mutex::new(None),
        }
    }

    /// 실행 여부
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.ticker.is_finished())
    }

    /// 주기 평가 시작. 이미 실행 중이면 거부한다.
    pub fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.ticker.is_finished()) {
            return Err(CoreError::AlreadyRunning("alert engine".to_string()));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let ticker = tokio::spawn(async move { engine.tick_loop(stop_rx).await });
        *running = Some(Running { stop_tx, ticker });

        info!("알림 엔진 시작 ({}초 주기)", self.interval.as_secs());
        Ok(())
    }

    /// 주기 평가 중지 (실행 중이 아니었으면 false)
    pub fn stop(&self) -> bool {
        match self.running.lock().take() {
            Some(running) => {
                let _ = running.stop_tx.send(true);
                info!("알림 엔진 중지 요청");
                true
            }
            None => false,
        }
    }

    async fn tick_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        // 첫 틱은 즉시 발생하므로 건너뛴다
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let engine = Arc::clone(&self);
                    tokio::spawn(async move {
                        engine.evaluate_once().await;
                    });
                }
                _ = stop_rx.changed() => {
                    info!("알림 엔진 틱 루프 종료");
                    break;
                }
            }
        }
    }

    /// 활성 규칙 전체를 한 번 평가하고 모두 끝날 때까지 기다린다
    pub async fn evaluate_once(&self) -> EvaluationSummary {
        let rules = match self.rules.list_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!("알림 규칙 조회 실패: {e}");
                return EvaluationSummary::default();
            }
        };

        let handles: Vec<JoinHandle<RuleOutcome>> = rules
            .into_iter()
            .filter(|rule| rule.enabled)
            .map(|rule| {
                let aggregator = Arc::clone(&self.aggregator);
                let notifier = Arc::clone(&self.notifier);
                let timeout = self.timeout;
                tokio::spawn(async move {
                    evaluate_rule(&rule, aggregator.as_ref(), notifier.as_ref(), timeout).await
                })
            })
            .collect();

        let mut summary = EvaluationSummary {
            evaluated: handles.len(),
            ..Default::default()
        };
        for handle in handles {
            match handle.await {
                Ok(RuleOutcome::Triggered { .. }) => summary.triggered += 1,
                Ok(RuleOutcome::Quiet(_)) => {}
                Ok(RuleOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    warn!("규칙 평가 태스크 실패: {e}");
                    summary.skipped += 1;
                }
            }
        }

        debug!(
            "알림 평가 완료: {}개 평가, {}개 트리거, {}개 건너뜀",
            summary.evaluated, summary.triggered, summary.skipped
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::tests::{rule, FixedAggregator, RecordingNotifier};
    use async_trait::async_trait;
    use fleetgate_core::models::alert::{AlertMetric, AlertRule};

    struct MemoryRules(Vec<AlertRule>);

    #[async_trait]
    impl AlertRuleStore for MemoryRules {
        async fn list_rules(&self) -> Result<Vec<AlertRule>, CoreError> {
            Ok(self.0.clone())
        }
        async fn upsert_rule(&self, _rule: &AlertRule) -> Result<(), CoreError> {
            Ok(())
        }
        async fn delete_rule(&self, _id: &str) -> Result<bool, CoreError> {
            Ok(false)
        }
    }

    fn engine(rules: Vec<AlertRule>) -> (Arc<AlertEngine>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = Arc::new(FixedAggregator::new(&[
            (AlertMetric::Cpu, 95.0),
            (AlertMetric::ErrorRate, 1.0),
        ]));
        let engine = AlertEngine::new(
            Arc::new(MemoryRules(rules)),
            aggregator,
            notifier.clone(),
            &AlertsConfig::default(),
        );
        (Arc::new(engine), notifier)
    }

    #[tokio::test]
    async fn evaluate_once_skips_disabled_rules() {
        let mut disabled = rule("off", "cpu", "gt", 10.0);
        disabled.enabled = false;
        let (engine, notifier) = engine(vec![
            rule("hot", "cpu", "gt", 90.0),
            rule("calm", "error_rate", "gt", 5.0),
            rule("bad", "disk", "gt", 1.0),
            disabled,
        ]);

        let summary = engine.evaluate_once().await;
        assert_eq!(
            summary,
            EvaluationSummary {
                evaluated: 3,
                triggered: 1,
                skipped: 1
            }
        );
        assert_eq!(notifier.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (engine, _) = engine(vec![]);
        engine.start().unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.start(), Err(CoreError::AlreadyRunning(_))));

        assert!(engine.stop());
        assert!(!engine.stop());
        engine.start().unwrap();
        assert!(engine.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_interval_until_stopped() {
        let (engine, notifier) = engine(vec![rule("hot", "cpu", "gt", 90.0)]);
        engine.start().unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(notifier.sent.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(notifier.sent.lock().len(), 2);

        engine.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(notifier.sent.lock().len(), 2);
    }
}
