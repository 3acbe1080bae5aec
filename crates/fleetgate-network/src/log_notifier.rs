//! 로그 전용 알림 어댑터.

use async_trait::async_trait;
use fleetgate_core::error::CoreError;
use fleetgate_core::ports::notifier::Notifier;
use tracing::info;

/// SMTP 미설정 환경용: 알림 내용을 로그로만 남긴다
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), CoreError> {
        info!(recipient, subject, "알림 (SMTP 미설정, 로그 기록): {body}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_succeeds() {
        let notifier = LogNotifier;
        notifier
            .send("ops@example.com", "[ALERT] cpu triggered", "body")
            .await
            .unwrap();
    }
}
