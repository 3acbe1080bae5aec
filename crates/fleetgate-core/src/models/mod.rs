//! FleetGate 도메인 모델.
//!
//! 에이전트-게이트웨이 간 공유하는 프로토콜 메시지와
//! 텔레메트리/분석/알림 데이터 구조체를 정의한다.
//! 모든 모델은 `serde` Serialize/Deserialize를 구현한다.

pub mod agent;
pub mod alert;
pub mod analytics;
pub mod protocol;
pub mod telemetry;
