//! Layered settings: compiled defaults, then `~/.jamroom/settings.json`,
//! then `JAMROOM_*` environment variables (`__` separates nested keys).

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

use jamroom_server::{RelayConfig, ServerConfig};
use jamroom_store::DirectoryConfig;
use jamroom_telemetry::TelemetryConfig;

pub const ENV_PREFIX: &str = "JAMROOM_";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub store: DirectoryConfig,
    pub telemetry: TelemetryConfig,
}

/// Resolve the default settings file (`~/.jamroom/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".jamroom").join("settings.json")
}

impl Settings {
    /// Load from `file` (missing file means defaults) with env overrides.
    pub fn load(file: &Path) -> Result<Self, figment::Error> {
        Self::figment(file, ENV_PREFIX).extract()
    }

    fn figment(file: &Path, env_prefix: &str) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Json::file(file))
            .merge(Env::prefixed(env_prefix).split("__"))
    }
}
