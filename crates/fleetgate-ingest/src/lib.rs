//! # fleetgate-ingest
//!
//! 에이전트 텔레메트리 수집 파이프라인.
//!
//! - [`geo`]: 클라이언트 IP 추출 및 지오 보강
//! - [`spans`]: 액세스 로그에서 트레이스 스팬 파생
//! - [`queue`]: offer-or-drop 바운디드 큐
//! - [`flusher`]: 종류별 배치 플러셔
//! - [`pipeline`]: 큐 묶음과 수집 진입점
//! - [`monitor`]: 게이트웨이 자체 메트릭
//! - [`stats`]: 메시지/저장소 지연 카운터

pub mod flusher;
pub mod geo;
pub mod monitor;
pub mod pipeline;
pub mod queue;
pub mod spans;
pub mod stats;

pub use geo::GeoResolver;
pub use monitor::GatewayMonitor;
pub use pipeline::{IngestPipeline, QueueStatus};
pub use stats::IngestStats;
