use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "scene_server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub scene_path: Option<PathBuf>,
    pub force_status: Option<u16>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8091".into(),
            scene_path: None,
            force_status: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    scene_path: Option<PathBuf>,
    force_status: Option<u16>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_CONFIG_FILE), |key| std::env::var(key).ok())
}

/// File values first, then environment. A malformed file is logged and
/// skipped rather than aborting startup.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.bind_addr {
                    settings.server_bind = v;
                }
                if let Some(v) = file_cfg.scene_path {
                    settings.scene_path = Some(v);
                }
                if let Some(v) = file_cfg.force_status {
                    settings.force_status = Some(v);
                }
            }
            Err(error) => warn!(path = %path.display(), %error, "ignoring malformed config file"),
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("APP__SCENE_PATH") {
        settings.scene_path = (!v.trim().is_empty()).then(|| PathBuf::from(v));
    }

    if let Some(v) = env("APP__FORCE_STATUS") {
        match v.trim().parse::<u16>() {
            Ok(status) => settings.force_status = Some(status),
            Err(_) if v.trim().is_empty() => settings.force_status = None,
            Err(_) => warn!(value = %v, "APP__FORCE_STATUS is not a status code; ignoring"),
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
