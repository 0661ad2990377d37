use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::{
    orchestrator::PruneScope,
    tools::{default_tools, ToolCatalog, ToolSpec},
};

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub scene_service_url: Option<String>,
    pub prune_scope: PruneScope,
    pub resolution_timeout_ms: Option<u64>,
    pub tools: Vec<ToolSpec>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            scene_service_url: Some("http://127.0.0.1:8091".into()),
            prune_scope: PruneScope::default(),
            resolution_timeout_ms: None,
            tools: default_tools(),
        }
    }
}

impl SessionSettings {
    pub fn resolution_timeout(&self) -> Option<Duration> {
        self.resolution_timeout_ms.map(Duration::from_millis)
    }

    pub fn tool_catalog(&self) -> ToolCatalog {
        ToolCatalog::new(self.tools.clone())
    }
}

/// Reads settings from `path` (absent file means defaults), then applies
/// environment overrides.
pub fn load_settings(path: &Path) -> Result<SessionSettings, ConfigError> {
    let settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<SessionSettings>(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => SessionSettings::default(),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(apply_env_overrides(settings, |key| std::env::var(key).ok()))
}

pub fn apply_env_overrides(
    mut settings: SessionSettings,
    env: impl Fn(&str) -> Option<String>,
) -> SessionSettings {
    if let Some(v) = env("SCENE_SERVICE_URL") {
        settings.scene_service_url = Some(v);
    }
    if let Some(v) = env("APP__SCENE_SERVICE_URL") {
        settings.scene_service_url = Some(v);
    }

    if let Some(v) = env("APP__PRUNE_SCOPE") {
        match v.trim() {
            "renderer" => settings.prune_scope = PruneScope::Renderer,
            "snapshot_only" => settings.prune_scope = PruneScope::SnapshotOnly,
            other => warn!(value = other, "ignoring unknown APP__PRUNE_SCOPE"),
        }
    }

    if let Some(v) = env("APP__RESOLUTION_TIMEOUT_MS") {
        match v.trim().parse::<u64>() {
            Ok(0) => settings.resolution_timeout_ms = None,
            Ok(parsed) => settings.resolution_timeout_ms = Some(parsed),
            Err(_) => warn!(value = %v, "ignoring non-numeric APP__RESOLUTION_TIMEOUT_MS"),
        }
    }

    settings
}
