//! # fleetgate-analytics
//!
//! 분석 질의 엔진.
//! - [`tiers`]: 조회 윈도우, 범위 길이별 버킷 계층, 타임존 라벨
//! - [`aggregate`]: KPI 공식, 백분위, 바이트 표기, 지연 히스토그램
//! - [`insights`]: 요약 KPI 기반 인사이트
//! - [`fallback`]: 저장소 장애 시 사용하는 상한 있는 인메모리 집계
//! - [`AnalyticsEngine`]: 대시보드, 리포트, 트레이스, 지리 통계, 알림용 메트릭 집계

pub mod aggregate;
pub mod engine;
pub mod fallback;
pub mod insights;
pub mod tiers;

pub use engine::AnalyticsEngine;
pub use fallback::FallbackAggregator;
