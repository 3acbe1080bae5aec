//! # fleetgate-web
//!
//! 게이트웨이 서버.
//! Axum 기반으로 두 개의 리스너를 띄운다.
//!
//! ## 기능
//! - 에이전트 스트림 (`/agent/connect`, WebSocket JSON 프레임)
//! - HTTP 질의 API (분석, 리포트, 트레이스, 지리 통계, 에이전트, 알림 규칙)
//! - 실시간 로그 구독 (SSE)
//! - Prometheus 텍스트 메트릭, 헬스 체크

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;

use axum::routing::get;
use axum::Router;
use fleetgate_analytics::AnalyticsEngine;
use fleetgate_core::config::ServerConfig;
use fleetgate_core::ports::metadata_store::AlertRuleStore;
use fleetgate_ingest::IngestPipeline;
use fleetgate_registry::SessionRegistry;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::metrics::GatewayMetrics;

/// 빌드 정보 (`/health`, `/metrics`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    /// 게이트웨이 버전
    pub version: &'static str,
    /// 빌드 일자
    pub build_date: &'static str,
    /// 빌드 커밋
    pub git_commit: &'static str,
}

impl BuildInfo {
    /// 컴파일 시점 정보 (`FLEETGATE_BUILD_DATE`, `FLEETGATE_GIT_COMMIT`)
    pub const fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build_date: match option_env!("FLEETGATE_BUILD_DATE") {
                Some(date) => date,
                None => "unknown",
            },
            git_commit: match option_env!("FLEETGATE_GIT_COMMIT") {
                Some(commit) => commit,
                None => "unknown",
            },
        }
    }
}

/// 서버 애플리케이션 상태
#[derive(Clone)]
pub struct AppState {
    /// 에이전트 세션 레지스트리
    pub registry: Arc<SessionRegistry>,
    /// 수집 파이프라인
    pub pipeline: Arc<IngestPipeline>,
    /// 분석 엔진
    pub analytics: Arc<AnalyticsEngine>,
    /// 알림 규칙 저장소
    pub alert_rules: Arc<dyn AlertRuleStore>,
    /// 업데이트 URL 생성용 HTTP 주소
    pub http_address: String,
    /// 빌드 정보
    pub build: BuildInfo,
    /// Prometheus 레지스트리
    pub metrics: Arc<GatewayMetrics>,
    /// 종료 신호 (에이전트 스트림 루프용, 서버 실행 전에는 None)
    pub shutdown: Option<watch::Receiver<bool>>,
}

impl AppState {
    /// 새 상태 생성 (메트릭 등록 실패 시 에러)
    pub fn new(
        registry: Arc<SessionRegistry>,
        pipeline: Arc<IngestPipeline>,
        analytics: Arc<AnalyticsEngine>,
        alert_rules: Arc<dyn AlertRuleStore>,
        http_address: impl Into<String>,
    ) -> Result<Self, prometheus::Error> {
        let build = BuildInfo::current();
        Ok(Self {
            registry,
            pipeline,
            analytics,
            alert_rules,
            http_address: http_address.into(),
            build,
            metrics: Arc::new(GatewayMetrics::new(build)?),
            shutdown: None,
        })
    }
}

/// 에이전트 스트림 라우터
pub fn stream_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/agent/connect",
            get(handlers::agent_stream::agent_connect),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP 질의 API 라우터
pub fn api_router(state: AppState) -> Router {
    // CORS 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::metrics::health))
        .route("/metrics", get(handlers::metrics::prometheus))
        .nest("/api", routes::api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 게이트웨이 서버 (스트림 + HTTP)
pub struct WebServer {
    state: AppState,
    host: String,
    stream_port: u16,
    http_port: u16,
}

impl WebServer {
    /// 새 서버 생성
    pub fn new(state: AppState, config: &ServerConfig) -> Self {
        Self {
            state,
            host: config.host.clone(),
            stream_port: config.stream_port,
            http_port: config.http_port,
        }
    }

    /// 서버 실행
    ///
    /// 두 리스너를 모두 바인드한 뒤 종료 신호까지 서빙한다.
    /// 바인드 실패는 즉시 에러로 반환된다.
    pub async fn run(mut self, shutdown_rx: watch::Receiver<bool>) -> Result<(), std::io::Error> {
        let stream_listener = TcpListener::bind((self.host.as_str(), self.stream_port)).await?;
        let http_listener = TcpListener::bind((self.host.as_str(), self.http_port)).await?;
        info!(
            "에이전트 스트림 서버 시작: ws://{}/agent/connect",
            stream_listener.local_addr()?
        );
        info!("HTTP API 서버 시작: http://{}", http_listener.local_addr()?);

        self.state.shutdown = Some(shutdown_rx.clone());
        let stream_app = stream_router(self.state.clone());
        let api_app = api_router(self.state);

        let stream_server = axum::serve(
            stream_listener,
            stream_app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()))
        .into_future();
        let api_server = axum::serve(http_listener, api_app)
            .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
            .into_future();

        tokio::try_join!(stream_server, api_server)?;
        info!("게이트웨이 서버 종료");
        Ok(())
    }
}

/// 종료 신호 대기 (송신측이 사라져도 종료로 간주)
async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            info!("서버 종료 신호 수신");
            break;
        }
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
}
