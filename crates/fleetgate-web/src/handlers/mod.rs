//! API 핸들러 모듈.

pub mod agent_stream;
pub mod agents;
pub mod alerts;
pub mod analytics;
pub mod logs;
pub mod metrics;
