//! 하트비트 해석 규칙.
//!
//! 버전 보정, 파드 추론, 가동 시간/주소 표기. 모두 순수 함수.

use fleetgate_core::models::agent::Heartbeat;
use std::net::SocketAddr;

/// 에이전트 버전을 알 수 없을 때의 기본값
pub const DEFAULT_AGENT_VERSION: &str = "0.1.0";

/// 보정된 버전 쌍
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersions {
    /// 프록시 소프트웨어 버전
    pub proxy: String,
    /// 에이전트 바이너리 버전
    pub agent: String,
}

/// 하트비트에서 프록시/에이전트 버전 결정
///
/// 첫 인스턴스 버전이 유효하면 상위 버전을 덮어쓴다. 에이전트 버전이 비어 있고
/// 상위 버전이 보정된 프록시 버전과 다르면 구버전 에이전트가 보낸 자기 버전으로 본다.
pub fn resolve_versions(hb: &Heartbeat) -> ResolvedVersions {
    let mut proxy = hb.version.clone();
    if let Some(first) = hb.instances.first() {
        if !first.version.is_empty() && first.version != "unknown" {
            proxy = first.version.clone();
        }
    }

    let mut agent = hb.agent_version.clone();
    if agent.is_empty() && !hb.version.is_empty() && hb.version != proxy {
        agent = hb.version.clone();
    }
    if agent.is_empty() {
        agent = DEFAULT_AGENT_VERSION.to_string();
    }

    ResolvedVersions { proxy, agent }
}

/// 파드 여부 추론
///
/// `<deployment>-<replicaset>-<hash>` 형태 호스트명 (세그먼트 3개 이상, 마지막 두 개 4자 이상)
pub fn infer_pod(hostname: &str, self_reported: bool) -> bool {
    if self_reported {
        return true;
    }
    let parts: Vec<&str> = hostname.split('-').collect();
    let n = parts.len();
    n >= 3 && parts[n - 1].len() >= 4 && parts[n - 2].len() >= 4
}

/// 가동 시간 표기 (예: "12.5s")
pub fn format_uptime(seconds: f64) -> String {
    format!("{seconds:.1}s")
}

/// 피어 주소에서 포트 제거
pub fn peer_ip(peer: Option<SocketAddr>) -> String {
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgate_core::models::agent::InstanceInfo;

    fn heartbeat(version: &str, agent_version: &str, instance_version: Option<&str>) -> Heartbeat {
        Heartbeat {
            version: version.to_string(),
            agent_version: agent_version.to_string(),
            instances: instance_version
                .map(|v| {
                    vec![InstanceInfo {
                        version: v.to_string(),
                        ..Default::default()
                    }]
                })
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    #[test]
    fn instance_version_overrides_and_old_agent_version_recovered() {
        let v = resolve_versions(&heartbeat("0.2.3", "", Some("1.25.3")));
        assert_eq!(v.proxy, "1.25.3");
        assert_eq!(v.agent, "0.2.3");
    }

    #[test]
    fn unknown_instance_version_ignored() {
        let v = resolve_versions(&heartbeat("1.24.0", "", Some("unknown")));
        assert_eq!(v.proxy, "1.24.0");
        assert_eq!(v.agent, DEFAULT_AGENT_VERSION);
    }

    #[test]
    fn explicit_agent_version_kept() {
        let v = resolve_versions(&heartbeat("1.24.0", "0.5.0", Some("1.25.0")));
        assert_eq!(v.proxy, "1.25.0");
        assert_eq!(v.agent, "0.5.0");
    }

    #[test]
    fn empty_everything_defaults() {
        let v = resolve_versions(&heartbeat("", "", None));
        assert_eq!(v.proxy, "");
        assert_eq!(v.agent, "0.1.0");
    }

    #[test]
    fn pod_inference() {
        assert!(infer_pod("web-7d9f8c6b5d-x2kqz", false));
        assert!(!infer_pod("web-7d9f8c6b5d-x2k", false));
        assert!(!infer_pod("edge-01", false));
        assert!(!infer_pod("plainhost", false));
        assert!(infer_pod("plainhost", true));
    }

    #[test]
    fn uptime_and_peer_formatting() {
        assert_eq!(format_uptime(12.54), "12.5s");
        assert_eq!(format_uptime(0.0), "0.0s");
        let addr: SocketAddr = "10.1.2.3:54321".parse().unwrap();
        assert_eq!(peer_ip(Some(addr)), "10.1.2.3");
        let v6: SocketAddr = "[::1]:80".parse().unwrap();
        assert_eq!(peer_ip(Some(v6)), "::1");
        assert_eq!(peer_ip(None), "unknown");
    }
}
