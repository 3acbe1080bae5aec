//! # fleetgate-app
//!
//! FleetGate 게이트웨이 바이너리 진입점.
//! 설정 로드, DI 와이어링, 백그라운드 태스크 오케스트레이션, 종료 처리.

mod config_loader;
mod lifecycle;
mod pruner;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use fleetgate_alerts::AlertEngine;
use fleetgate_analytics::{AnalyticsEngine, FallbackAggregator};
use fleetgate_core::config::GatewayConfig;
use fleetgate_core::ports::metadata_store::AgentStore;
use fleetgate_ingest::monitor::resolve_gateway_id;
use fleetgate_ingest::{GatewayMonitor, GeoResolver, IngestPipeline, IngestStats};
use fleetgate_registry::{PersistenceDispatcher, SessionRegistry};
use fleetgate_storage::SqliteStorage;
use fleetgate_web::{AppState, WebServer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::lifecycle::ShutdownCoordinator;
use crate::pruner::Pruner;

/// 종료 시 백그라운드 태스크 대기 한도
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// FleetGate 텔레메트리 게이트웨이
///
/// 프록시 에이전트 스트림 수집, 분석 API, 임계값 알림
#[derive(Parser, Debug)]
#[command(name = "fleetgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (TOML/YAML/JSON)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// 데이터 저장 경로 (기본: 플랫폼 데이터 디렉토리)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 에이전트 스트림 포트
    #[arg(long)]
    stream_port: Option<u16>,

    /// HTTP API 포트
    #[arg(long)]
    http_port: Option<u16>,

    /// 인메모리 저장소 사용 (재시작 시 데이터 유실)
    #[arg(long)]
    in_memory: bool,
}

/// CLI 인자로 설정 오버라이드
fn apply_overrides(config: &mut GatewayConfig, args: &Args) {
    if let Some(port) = args.stream_port {
        config.server.stream_port = port;
    }
    if let Some(port) = args.http_port {
        config.server.http_port = port;
    }
    if let Some(ref dir) = args.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
}

/// 텔레메트리/메타데이터 저장소 열기
fn open_stores(
    config: &GatewayConfig,
    in_memory: bool,
) -> Result<(Arc<SqliteStorage>, Arc<SqliteStorage>)> {
    if in_memory {
        info!("인메모리 저장소 사용");
        return Ok((
            Arc::new(SqliteStorage::open_in_memory()?),
            Arc::new(SqliteStorage::open_in_memory()?),
        ));
    }

    let data_dir = config_loader::resolve_data_dir(config.storage.data_dir.as_deref());
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("데이터 디렉토리 생성 실패: {}", data_dir.display()))?;

    let telemetry_path = data_dir.join(&config.storage.telemetry_db);
    let metadata_path = data_dir.join(&config.storage.metadata_db);
    info!(
        "저장소: 텔레메트리 {}, 메타데이터 {}",
        telemetry_path.display(),
        metadata_path.display()
    );
    Ok((
        Arc::new(SqliteStorage::open(&telemetry_path)?),
        Arc::new(SqliteStorage::open(&metadata_path)?),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "fleetgate={0},fleetgate_app={0},fleetgate_core={0},fleetgate_storage={0},fleetgate_network={0},fleetgate_registry={0},fleetgate_ingest={0},fleetgate_analytics={0},fleetgate_alerts={0},fleetgate_web={0},tower_http=warn",
        args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    info!("FleetGate 게이트웨이 시작 (v{})", env!("CARGO_PKG_VERSION"));

    // 설정 로드
    let mut config = config_loader::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config
        .validate()
        .map_err(|e| anyhow!("설정 검증 실패: {e}"))?;

    let lifecycle = ShutdownCoordinator::new(SHUTDOWN_GRACE);

    // ── 어댑터 생성 (DI 와이어링) ──

    // 1. 저장소
    let (telemetry_store, metadata_store) = open_stores(&config, args.in_memory)?;

    // 2. 세션 레지스트리 + 비동기 영속화
    let (persistence, persistence_worker) = PersistenceDispatcher::spawn(
        metadata_store.clone(),
        config.agents.persist_queue_capacity,
    );
    let registry = Arc::new(SessionRegistry::new(
        persistence,
        config.agents.log_subscriber_buffer,
    ));
    match metadata_store.load_all().await {
        Ok(records) => {
            let restored = registry.hydrate(records);
            info!("에이전트 인벤토리 복원: {restored}개");
        }
        Err(e) => warn!("에이전트 인벤토리 복원 실패, 빈 상태로 시작: {e}"),
    }

    // 3. 수집 파이프라인 + 플러셔
    let mut geo = GeoResolver::new();
    if let Some(ref path) = config.ingest.geo_csv_path {
        match geo.load_csv(path) {
            Ok(count) => info!("GeoIP CSV 로드: {count}개 범위"),
            Err(e) => warn!("GeoIP CSV 로드 실패, 내장 테이블만 사용: {e}"),
        }
    }
    let stats = Arc::new(IngestStats::new());
    let pipeline = Arc::new(IngestPipeline::new(config.ingest.clone(), geo, stats));
    let flushers = pipeline.spawn_flushers(telemetry_store.clone(), &lifecycle.subscribe());

    // 4. 게이트웨이 자체 메트릭
    let gateway_id = resolve_gateway_id(&config.server.gateway_id);
    info!("게이트웨이 ID: {gateway_id}");
    let monitor = GatewayMonitor::new(
        gateway_id,
        Duration::from_secs(config.ingest.self_metrics_interval_secs),
        pipeline.clone(),
        registry.clone(),
    );
    let monitor_handle = tokio::spawn(monitor.run(lifecycle.subscribe()));

    // 5. 분석 엔진
    let fallback = Arc::new(FallbackAggregator::new(config.analytics.clone()));
    let analytics = Arc::new(AnalyticsEngine::new(telemetry_store.clone(), fallback));

    // 6. 알림 엔진
    let notifier = fleetgate_network::email_notifier(&config.smtp);
    let alerts = Arc::new(AlertEngine::new(
        metadata_store.clone(),
        analytics.clone(),
        notifier,
        &config.alerts,
    ));
    if config.alerts.enabled {
        alerts.start()?;
    } else {
        info!("알림 엔진 비활성화");
    }

    // 7. 정리 스케줄러
    let pruner = Pruner::new(
        metadata_store.clone(),
        telemetry_store.clone(),
        registry.clone(),
        &config.agents,
        config.storage.retention(),
    );
    let pruner_handle = tokio::spawn(pruner.run(lifecycle.subscribe()));

    // 8. 웹 서버 (에이전트 스트림 + HTTP API)
    let state = AppState::new(
        registry.clone(),
        pipeline.clone(),
        analytics,
        metadata_store.clone(),
        config.server.http_address(),
    )
    .context("메트릭 레지스트리 생성 실패")?;
    let server = WebServer::new(state, &config.server);
    let server_rx = lifecycle.subscribe();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_rx).await {
            error!("웹 서버 에러: {e}");
        }
    });

    info!("게이트웨이 준비 완료. Ctrl+C로 종료.");
    let reason = lifecycle.wait_for_signal().await;

    // ── 종료 ──
    alerts.stop();

    lifecycle.drain("웹 서버", vec![server_handle]).await;
    lifecycle
        .drain("주기 작업", vec![monitor_handle, pruner_handle])
        .await;

    // 플러셔는 종료 신호 후 남은 큐를 비우고 끝난다
    lifecycle.drain("플러셔", flushers).await;
    info!("미처리 텔레메트리 폐기 누계: {}", pipeline.total_dropped());

    // 레지스트리 핸들이 모두 drop되면 영속화 워커가 남은 작업을 쓰고 끝난다
    drop(registry);
    drop(pipeline);
    lifecycle.drain("영속화 워커", vec![persistence_worker]).await;

    info!("FleetGate 게이트웨이 종료 ({})", reason.as_str());
    Ok(())
}
