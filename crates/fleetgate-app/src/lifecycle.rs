//! 게이트웨이 종료 처리.
//!
//! 종료 신호 브로드캐스트, OS 시그널 대기, 백그라운드 태스크의 제한 시간 내 회수.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 종료 원인
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupt,
    Terminate,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

/// 태스크 그룹 회수 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// 모두 종료 (비정상 종료 개수 포함)
    Completed { failed: usize },
    /// 제한 시간 초과
    TimedOut,
}

/// 종료 조정자
///
/// 수신기는 `subscribe`로 나눠 주고, 시그널이 오면 `true`를 브로드캐스트한다.
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx, grace }
    }

    /// 종료 수신기
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// 종료 브로드캐스트 (중복 호출 무시)
    pub fn trigger(&self, reason: StopReason) {
        let first = self.tx.send_if_modified(|stopping| {
            if *stopping {
                false
            } else {
                *stopping = true;
                true
            }
        });
        if first {
            info!("종료 시작 ({})", reason.as_str());
        }
    }

    /// OS 시그널 대기 후 종료 브로드캐스트
    pub async fn wait_for_signal(&self) -> StopReason {
        let reason = next_signal().await;
        self.trigger(reason);
        reason
    }

    /// 태스크 그룹을 제한 시간 안에 회수
    pub async fn drain(&self, label: &str, handles: Vec<JoinHandle<()>>) -> DrainOutcome {
        let outcome = drain_within(self.grace, handles).await;
        match outcome {
            DrainOutcome::Completed { failed: 0 } => info!("{label} 종료 완료"),
            DrainOutcome::Completed { failed } => {
                warn!("{label} 종료, 비정상 종료 태스크 {failed}개")
            }
            DrainOutcome::TimedOut => {
                warn!("{label} 종료 대기 시간 초과 ({}초)", self.grace.as_secs())
            }
        }
        outcome
    }
}

/// 핸들 전체 대기, 패닉/취소는 실패로 집계
async fn drain_within(grace: Duration, handles: Vec<JoinHandle<()>>) -> DrainOutcome {
    let join_all = async move {
        let mut failed = 0;
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("백그라운드 태스크 비정상 종료: {e}");
                failed += 1;
            }
        }
        failed
    };
    match tokio::time::timeout(grace, join_all).await {
        Ok(failed) => DrainOutcome::Completed { failed },
        Err(_) => DrainOutcome::TimedOut,
    }
}

#[cfg(unix)]
async fn next_signal() -> StopReason {
    use tokio::signal::unix::{signal, SignalKind};
    match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(mut sigint), Ok(mut sigterm)) => {
            tokio::select! {
                _ = sigint.recv() => StopReason::Interrupt,
                _ = sigterm.recv() => StopReason::Terminate,
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!("시그널 핸들러 등록 실패, Ctrl+C만 대기: {e}");
            wait_for_ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn next_signal() -> StopReason {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> StopReason {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // 시그널을 받을 수 없으면 외부 종료까지 계속 실행
        warn!("Ctrl+C 핸들러 등록 실패: {e}");
        std::future::pending::<()>().await;
    }
    StopReason::Interrupt
}
