//! # fleetgate-network
//!
//! 외부 알림 채널 어댑터.
//! - [`smtp::SmtpNotifier`]: SMTP 이메일 발송 (AUTH PLAIN 지원, 평문 전송)
//! - [`log_notifier::LogNotifier`]: SMTP 미설정 시 로그로만 기록
//!
//! 두 어댑터 모두 `fleetgate_core::ports::notifier::Notifier` 포트를 구현한다.

pub mod log_notifier;
pub mod smtp;

use std::sync::Arc;

use fleetgate_core::config::SmtpConfig;
use fleetgate_core::ports::notifier::Notifier;

/// 설정에 맞는 이메일 알림 어댑터 생성
///
/// SMTP 호스트가 비어 있으면 [`log_notifier::LogNotifier`]로 대체한다.
pub fn email_notifier(config: &SmtpConfig) -> Arc<dyn Notifier> {
    if config.is_configured() {
        Arc::new(smtp::SmtpNotifier::new(config.clone()))
    } else {
        Arc::new(log_notifier::LogNotifier)
    }
}
