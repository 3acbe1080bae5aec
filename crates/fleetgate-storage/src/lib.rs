//! # fleetgate-storage
//!
//! SQLite 기반 저장소 어댑터.
//! - [`SqliteStorage`]: `TelemetryStore` + `AgentStore` + `AlertRuleStore` 포트 구현
//! - [`migration`]: 버전 기반 스키마 마이그레이션
//!
//! 시계열 DB와 메타데이터 DB는 같은 타입의 인스턴스 두 개로 분리해 연다.

pub mod migration;
pub mod sqlite;

pub use sqlite::SqliteStorage;
