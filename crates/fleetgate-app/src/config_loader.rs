//! 설정 로드.
//!
//! 기본값 → TOML/YAML/JSON 파일 → `FLEETGATE__SECTION__KEY` 환경변수 순으로 병합한다.

use anyhow::Context;
use fleetgate_core::config::GatewayConfig;
use std::path::{Path, PathBuf};

/// 환경변수 접두사
const ENV_PREFIX: &str = "FLEETGATE";
/// 환경변수 구분자
const ENV_SEPARATOR: &str = "__";

/// 설정 파일 + 프로세스 환경변수로 로드
pub fn load(path: Option<&Path>) -> anyhow::Result<GatewayConfig> {
    load_with_env(path, environment())
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

fn load_with_env(
    path: Option<&Path>,
    env: config::Environment,
) -> anyhow::Result<GatewayConfig> {
    let defaults = config::Config::try_from(&GatewayConfig::default_config())
        .context("기본 설정 직렬화 실패")?;

    let mut builder = config::Config::builder().add_source(defaults);
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config: GatewayConfig = builder
        .add_source(env)
        .build()
        .context("설정 병합 실패")?
        .try_deserialize()
        .context("설정 역직렬화 실패")?;
    Ok(config)
}

/// 데이터 디렉토리 결정 (설정값 → 플랫폼 데이터 디렉토리 → ./data)
pub fn resolve_data_dir(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }
    directories::ProjectDirs::from("io", "fleetgate", "gateway")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}
