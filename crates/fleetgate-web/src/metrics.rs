//! Prometheus 레지스트리.
//!
//! 스크레이프 시점에 레지스트리/파이프라인/폴백 집계의 현재 값을 반영한 뒤
//! `TextEncoder`로 인코딩한다.

use fleetgate_core::models::agent::StatusCounts;
use fleetgate_ingest::QueueStatus;
use parking_lot::Mutex;
use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::BuildInfo;

/// 스크레이프 시점 입력값
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// 상태별 에이전트 수
    pub agents: StatusCounts,
    /// 누적 수신 메시지
    pub messages_total: u64,
    /// 큐 상태
    pub queues: Vec<QueueStatus>,
    /// 누적 저장소 배치 쓰기
    pub store_ops_total: u64,
    /// 누적 저장소 쓰기 지연 (초)
    pub store_latency_seconds_total: f64,
    /// 런타임 태스크 수
    pub tasks: i64,
    /// 폴백 집계 누적 요청
    pub fallback_requests_total: u64,
}

/// 게이트웨이 메트릭 레지스트리
pub struct GatewayMetrics {
    registry: Registry,
    info: IntGaugeVec,
    agents: IntGaugeVec,
    messages: IntCounter,
    queue_dropped: IntCounterVec,
    queue_length: IntGaugeVec,
    store_ops: IntCounter,
    store_latency_avg_ms: Gauge,
    tasks: IntGauge,
    fallback_requests: IntCounter,
    // 누적 원천값을 카운터 증분으로 옮기는 구간 직렬화
    refresh: Mutex<()>,
}

impl GatewayMetrics {
    /// `fleetgate` 네임스페이스 레지스트리 생성
    pub fn new(build: BuildInfo) -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("fleetgate".into()), None)?;

        let info = IntGaugeVec::new(
            Opts::new("info", "Gateway version information"),
            &["version", "build_date", "git_commit"],
        )?;
        let agents = IntGaugeVec::new(
            Opts::new("agents_total", "Registered agents by status"),
            &["status"],
        )?;
        let messages = IntCounter::new("messages_total", "Messages received from agents")?;
        let queue_dropped = IntCounterVec::new(
            Opts::new(
                "queue_dropped_total",
                "Telemetry items dropped on full queues",
            ),
            &["kind"],
        )?;
        let queue_length = IntGaugeVec::new(
            Opts::new("queue_length", "Items waiting in ingest queues"),
            &["kind"],
        )?;
        let store_ops = IntCounter::new(
            "store_operations_total",
            "Batch writes to the time-series store",
        )?;
        let store_latency_avg_ms = Gauge::new(
            "store_latency_avg_ms",
            "Average batch write latency in milliseconds",
        )?;
        let tasks = IntGauge::new("tasks", "Alive runtime tasks")?;
        let fallback_requests = IntCounter::new(
            "fallback_requests_total",
            "Requests counted by the in-memory aggregate",
        )?;

        registry.register(Box::new(info.clone()))?;
        registry.register(Box::new(agents.clone()))?;
        registry.register(Box::new(messages.clone()))?;
        registry.register(Box::new(queue_dropped.clone()))?;
        registry.register(Box::new(queue_length.clone()))?;
        registry.register(Box::new(store_ops.clone()))?;
        registry.register(Box::new(store_latency_avg_ms.clone()))?;
        registry.register(Box::new(tasks.clone()))?;
        registry.register(Box::new(fallback_requests.clone()))?;

        info.with_label_values(&[build.version, build.build_date, build.git_commit])
            .set(1);

        Ok(Self {
            registry,
            info,
            agents,
            messages,
            queue_dropped,
            queue_length,
            store_ops,
            store_latency_avg_ms,
            tasks,
            fallback_requests,
            refresh: Mutex::new(()),
        })
    }

    /// 스냅샷 반영
    pub fn observe(&self, snapshot: &MetricsSnapshot) {
        let _guard = self.refresh.lock();

        self.agents
            .with_label_values(&["online"])
            .set(snapshot.agents.online as i64);
        self.agents
            .with_label_values(&["offline"])
            .set(snapshot.agents.offline as i64);

        advance(&self.messages, snapshot.messages_total);
        advance(&self.store_ops, snapshot.store_ops_total);
        advance(&self.fallback_requests, snapshot.fallback_requests_total);

        for queue in &snapshot.queues {
            let kind = queue.kind.as_str();
            advance(&self.queue_dropped.with_label_values(&[kind]), queue.dropped);
            self.queue_length
                .with_label_values(&[kind])
                .set(queue.len as i64);
        }

        let avg_ms = if snapshot.store_ops_total == 0 {
            0.0
        } else {
            snapshot.store_latency_seconds_total * 1000.0 / snapshot.store_ops_total as f64
        };
        self.store_latency_avg_ms.set(avg_ms);
        self.tasks.set(snapshot.tasks);
    }

    /// 텍스트 포맷 인코딩
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// 응답 Content-Type
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// 빌드 정보 게이지 (테스트/진단용)
    pub fn info(&self) -> &IntGaugeVec {
        &self.info
    }
}

/// 누적값까지 카운터 증가 (원천이 줄어든 경우는 무시)
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}
