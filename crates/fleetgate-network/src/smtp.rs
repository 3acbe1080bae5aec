//! SMTP 이메일 알림 어댑터.
//!
//! tokio `TcpStream` 위에서 최소한의 SMTP 대화를 수행한다:
//! 인사 → EHLO → (AUTH PLAIN) → MAIL FROM → RCPT TO → DATA → QUIT.
//! TLS/STARTTLS는 지원하지 않는다.

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use fleetgate_core::config::SmtpConfig;
use fleetgate_core::error::CoreError;
use fleetgate_core::ports::notifier::Notifier;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// SMTP 알림 어댑터
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    /// 새 SMTP 어댑터 생성
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs.max(1))
    }

    /// 메일 한 통 발송
    async fn deliver(&self, recipient: &str, subject: &str, body: &str) -> Result<(), CoreError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let stream = tokio::time::timeout(self.timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| CoreError::Timeout(self.config.timeout_secs))?
            .map_err(|e| CoreError::Network(format!("SMTP 연결 실패 ({addr}): {e}")))?;

        let (read_half, write_half) = stream.into_split();
        let mut session = SmtpSession {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout: self.timeout(),
        };

        session.expect(220).await?;
        session.command("EHLO fleetgate", 250).await?;

        if !self.config.username.is_empty() {
            let token = base64::engine::general_purpose::STANDARD.encode(format!(
                "\0{}\0{}",
                self.config.username, self.config.password
            ));
            session.command(&format!("AUTH PLAIN {token}"), 235).await?;
        }

        session
            .command(&format!("MAIL FROM:<{}>", self.config.from), 250)
            .await?;
        session
            .command_any(&format!("RCPT TO:<{recipient}>"), &[250, 251])
            .await?;
        session.command("DATA", 354).await?;

        let message = build_message(&self.config.from, recipient, subject, body);
        session.write_raw(&message).await?;
        session.expect(250).await?;

        // QUIT 응답 실패는 이미 전달된 메일에 영향 없음
        if let Err(e) = session.command("QUIT", 221).await {
            debug!("SMTP QUIT 응답 무시: {e}");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), CoreError> {
        self.deliver(recipient, subject, body).await?;
        info!("알림 이메일 발송 완료: {recipient}");
        Ok(())
    }
}

// ============================================================
// SMTP 세션
// ============================================================

struct SmtpSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl SmtpSession {
    /// 명령 전송 후 기대 코드 확인
    async fn command(&mut self, line: &str, expected: u16) -> Result<(), CoreError> {
        self.command_any(line, &[expected]).await
    }

    async fn command_any(&mut self, line: &str, expected: &[u16]) -> Result<(), CoreError> {
        self.write_raw(&format!("{line}\r\n")).await?;
        let code = self.read_reply().await?;
        if expected.contains(&code) {
            Ok(())
        } else {
            let verb = line.split_whitespace().next().unwrap_or(line);
            Err(CoreError::Network(format!(
                "SMTP {verb} 거부: 응답 코드 {code}"
            )))
        }
    }

    async fn expect(&mut self, expected: u16) -> Result<(), CoreError> {
        let code = self.read_reply().await?;
        if code == expected {
            Ok(())
        } else {
            Err(CoreError::Network(format!(
                "SMTP 예상 응답 {expected}, 수신 {code}"
            )))
        }
    }

    async fn write_raw(&mut self, data: &str) -> Result<(), CoreError> {
        tokio::time::timeout(self.timeout, self.writer.write_all(data.as_bytes()))
            .await
            .map_err(|_| CoreError::Timeout(self.timeout.as_secs()))??;
        Ok(())
    }

    /// 응답 읽기 (여러 줄 응답은 "250-" 연속 줄 처리)
    async fn read_reply(&mut self) -> Result<u16, CoreError> {
        loop {
            let mut line = String::new();
            let read = tokio::time::timeout(self.timeout, self.reader.read_line(&mut line))
                .await
                .map_err(|_| CoreError::Timeout(self.timeout.as_secs()))??;
            if read == 0 {
                return Err(CoreError::Network("SMTP 연결이 닫힘".to_string()));
            }

            let code = line
                .get(..3)
                .and_then(|c| c.parse::<u16>().ok())
                .ok_or_else(|| CoreError::Network(format!("SMTP 응답 형식 오류: {}", line.trim_end())))?;

            if line.as_bytes().get(3) != Some(&b'-') {
                return Ok(code);
            }
        }
    }
}

/// RFC 5322 메시지 생성 (DATA 종료 시퀀스 포함)
fn build_message(from: &str, to: &str, subject: &str, body: &str) -> String {
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S +0000");
    let mut message = format!(
        "From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\nDate: {date}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"utf-8\"\r\n\r\n"
    );

    for line in body.lines() {
        // dot-stuffing
        if line.starts_with('.') {
            message.push('.');
        }
        message.push_str(line);
        message.push_str("\r\n");
    }
    message.push_str(".\r\n");
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// 고정 응답을 돌려주는 가짜 SMTP 서버. 수신한 전체 대화를 반환.
    async fn fake_server(rcpt_code: u16) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut transcript = String::new();

            write_half.write_all(b"220 fake ESMTP\r\n").await.unwrap();
            let mut in_data = false;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                transcript.push_str(&line);

                if in_data {
                    if line == ".\r\n" {
                        in_data = false;
                        write_half.write_all(b"250 queued\r\n").await.unwrap();
                    }
                    continue;
                }

                let reply: &[u8] = if line.starts_with("EHLO") {
                    b"250-fake\r\n250 AUTH PLAIN\r\n"
                } else if line.starts_with("AUTH") {
                    b"235 ok\r\n"
                } else if line.starts_with("MAIL") {
                    b"250 ok\r\n"
                } else if line.starts_with("RCPT") {
                    if rcpt_code == 250 {
                        b"250 ok\r\n"
                    } else {
                        b"550 no such user\r\n"
                    }
                } else if line.starts_with("DATA") {
                    in_data = true;
                    b"354 go ahead\r\n"
                } else if line.starts_with("QUIT") {
                    write_half.write_all(b"221 bye\r\n").await.unwrap();
                    break;
                } else {
                    b"500 unknown\r\n"
                };
                write_half.write_all(reply).await.unwrap();
            }
            transcript
        });

        (port, handle)
    }

    fn config(port: u16, username: &str) -> SmtpConfig {
        SmtpConfig {
            host: "127.0.0.1".to_string(),
            port,
            username: username.to_string(),
            password: "secret".to_string(),
            from: "fleetgate@example.com".to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn delivers_message_with_auth() {
        let (port, handle) = fake_server(250).await;
        let notifier = SmtpNotifier::new(config(port, "bot"));

        notifier
            .send(
                "ops@example.com",
                "[ALERT] cpu triggered",
                "Alert Rule 'cpu' has been triggered.\n.hidden",
            )
            .await
            .unwrap();

        let transcript = handle.await.unwrap();
        let token = base64::engine::general_purpose::STANDARD.encode("\0bot\0secret");
        assert!(transcript.contains(&format!("AUTH PLAIN {token}")));
        assert!(transcript.contains("RCPT TO:<ops@example.com>"));
        assert!(transcript.contains("Subject: [ALERT] cpu triggered"));
        assert!(transcript.contains("\r\n..hidden\r\n"));
    }

    #[tokio::test]
    async fn skips_auth_without_username() {
        let (port, handle) = fake_server(250).await;
        let notifier = SmtpNotifier::new(config(port, ""));
        notifier.send("ops@example.com", "s", "b").await.unwrap();
        assert!(!handle.await.unwrap().contains("AUTH"));
    }

    #[tokio::test]
    async fn rejected_recipient_is_network_error() {
        let (port, _handle) = fake_server(550).await;
        let notifier = SmtpNotifier::new(config(port, ""));
        let err = notifier
            .send("nobody@example.com", "s", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Network(msg) if msg.contains("550")));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let notifier = SmtpNotifier::new(config(port, ""));
        let err = notifier.send("ops@example.com", "s", "b").await.unwrap_err();
        assert!(matches!(err, CoreError::Network(_)));
    }

    #[test]
    fn message_terminates_with_dot() {
        let msg = build_message("a@x", "b@y", "subj", "line1\nline2");
        assert!(msg.ends_with("line2\r\n.\r\n"));
        assert!(msg.contains("Content-Type: text/plain"));
    }
}
