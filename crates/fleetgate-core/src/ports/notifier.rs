//! 알림 발송 포트.
//!
//! 구현: `fleetgate-network` crate (SMTP, 로그 전용)

use async_trait::async_trait;

use crate::error::CoreError;

/// 외부 알림 채널
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 수신자 한 명에게 알림 발송
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), CoreError>;
}
