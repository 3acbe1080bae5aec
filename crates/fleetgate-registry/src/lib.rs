//! # fleetgate-registry
//!
//! 연결된 에이전트 세션의 메모리 내 레지스트리.
//!
//! - [`registry`]: 샤드 맵 기반 [`SessionRegistry`]
//! - [`session`]: 세션별 잠금, 로그 구독, 요청 카운터
//! - [`heartbeat`]: 버전 보정/파드 추론 규칙
//! - [`persistence`]: 메타데이터 저장소로의 비동기 영속화

pub mod heartbeat;
pub mod persistence;
pub mod registry;
pub mod session;

pub use persistence::PersistenceDispatcher;
pub use registry::SessionRegistry;
pub use session::{AgentSession, CommandSender, LogSubscription, SessionRef};
