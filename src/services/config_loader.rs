use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

pub const CONFIG_ENV_VAR: &str = "RIDDLER_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "riddler.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Bytes pushed per simulated transmission step of an upload.
    #[serde(default = "default_upload_chunk_bytes")]
    pub upload_chunk_bytes: usize,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            upload_chunk_bytes: default_upload_chunk_bytes(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_file: default_session_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UiConfig {
    #[serde(default = "default_toast_seconds")]
    pub toast_seconds: f32,
    #[serde(default = "default_max_toasts")]
    pub max_toasts: usize,
    #[serde(default = "default_preview_max_dimension")]
    pub preview_max_dimension: u32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            toast_seconds: default_toast_seconds(),
            max_toasts: default_max_toasts(),
            preview_max_dimension: default_preview_max_dimension(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RiddlerConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl Default for RiddlerConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            worker_threads: default_worker_threads(),
            session: SessionConfig::default(),
            backend: BackendConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_worker_threads() -> usize {
    2
}

fn default_session_file() -> PathBuf {
    PathBuf::from(".riddler").join("session.json")
}

fn default_upload_chunk_bytes() -> usize {
    64 * 1024
}

fn default_chunk_delay_ms() -> u64 {
    25
}

fn default_toast_seconds() -> f32 {
    4.0
}

fn default_max_toasts() -> usize {
    5
}

fn default_preview_max_dimension() -> u32 {
    96
}

pub fn config_path_from_env() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn load_riddler_config(config_path: &Path) -> Result<RiddlerConfig> {
    if !config_path.exists() {
        info!(
            "{} not found, using defaults",
            config_path.display()
        );
        return Ok(RiddlerConfig::default());
    }

    let raw = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config at {}", config_path.display()))?;

    toml::from_str::<RiddlerConfig>(&raw)
        .with_context(|| format!("Failed to parse config at {}", config_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_riddler_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RiddlerConfig::default());
        assert_eq!(config.ui.max_toasts, 5);
    }

    #[test]
    fn partial_sections_keep_their_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("riddler.toml");
        fs::write(
            &path,
            r#"
log_dir = "var/log"

[backend]
chunk_delay_ms = 0

[ui]
toast_seconds = 1.5
"#,
        )
        .unwrap();

        let config = load_riddler_config(&path).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("var/log"));
        assert_eq!(config.backend.chunk_delay_ms, 0);
        assert_eq!(config.backend.upload_chunk_bytes, 64 * 1024);
        assert_eq!(config.ui.toast_seconds, 1.5);
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("riddler.toml");
        fs::write(&path, "worker_threads = \"many\"").unwrap();

        let err = load_riddler_config(&path).unwrap_err();
        assert!(format!("{err}").contains("Failed to parse config"));
    }
}
