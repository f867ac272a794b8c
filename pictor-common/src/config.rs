//! Configuration loading and resolution
//!
//! Settings are resolved with the following priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`PICTOR_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service settings
///
/// One instance is constructed at process start and passed by reference into
/// every component that needs it. There are no global handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP bind host
    pub host: String,
    /// HTTP bind port
    pub port: u16,
    /// Path to the SQLite database file
    pub database_path: PathBuf,
    /// Public base URL of this service (used in notification links)
    pub public_base_url: String,
    /// Maximum accepted upload size in bytes
    pub max_upload_size: usize,
    /// Number of pipeline worker tasks
    pub worker_count: usize,
    /// Maximum asset fetch attempts before the stage fails terminally
    pub fetch_max_attempts: u32,
    /// Fixed wait between asset fetch attempts, in milliseconds
    pub fetch_retry_interval_ms: u64,
    /// Object storage gateway endpoint (uploads are PUT here)
    pub storage_endpoint: String,
    /// Public base URL under which stored objects are reachable
    pub storage_public_base: String,
    /// Vision model API endpoint (Ollama-compatible)
    pub model_endpoint: String,
    /// Vision model name
    pub model_name: String,
    /// Mail gateway endpoint (notifications are POSTed here as JSON)
    pub mail_endpoint: Option<String>,
    /// Sender address for notification emails
    pub mail_from: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5741,
            database_path: default_data_dir().join("pictor.db"),
            public_base_url: "http://127.0.0.1:5741".to_string(),
            max_upload_size: 10 * 1024 * 1024,
            worker_count: 4,
            fetch_max_attempts: 5,
            fetch_retry_interval_ms: 2000,
            storage_endpoint: "http://127.0.0.1:9000/pictor".to_string(),
            storage_public_base: "http://127.0.0.1:9000/pictor".to_string(),
            model_endpoint: "http://127.0.0.1:11434".to_string(),
            model_name: "moondream:v2".to_string(),
            mail_endpoint: None,
            mail_from: "noreply@pictor.local".to_string(),
        }
    }
}

impl Settings {
    /// Resolve settings from the configured sources
    ///
    /// `cli_config` is the optional `--config` path from the command line.
    /// When absent, `PICTOR_CONFIG` and then the platform config path are
    /// consulted. Environment variables override file values field by field.
    pub fn resolve(cli_config: Option<&Path>) -> Result<Self> {
        let mut settings = match config_file_path(cli_config) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))
    }

    /// Apply `PICTOR_*` environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PICTOR_HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("PICTOR_PORT") {
            if let Ok(port) = v.parse() {
                self.port = port;
            } else {
                tracing::warn!("Ignoring non-numeric PICTOR_PORT: {}", v);
            }
        }
        if let Ok(v) = std::env::var("PICTOR_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PICTOR_PUBLIC_BASE_URL") {
            self.public_base_url = v;
        }
        if let Ok(v) = std::env::var("PICTOR_STORAGE_ENDPOINT") {
            self.storage_endpoint = v;
        }
        if let Ok(v) = std::env::var("PICTOR_STORAGE_PUBLIC_BASE") {
            self.storage_public_base = v;
        }
        if let Ok(v) = std::env::var("PICTOR_MODEL_ENDPOINT") {
            self.model_endpoint = v;
        }
        if let Ok(v) = std::env::var("PICTOR_MODEL_NAME") {
            self.model_name = v;
        }
        if let Ok(v) = std::env::var("PICTOR_MAIL_ENDPOINT") {
            self.mail_endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("PICTOR_MAIL_FROM") {
            self.mail_from = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_upload_size == 0 {
            return Err(Error::Config("max_upload_size must be non-zero".to_string()));
        }
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be non-zero".to_string()));
        }
        if self.fetch_max_attempts == 0 {
            return Err(Error::Config(
                "fetch_max_attempts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Fixed wait between fetch attempts
    pub fn fetch_retry_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_interval_ms)
    }

    /// Results link embedded in notification emails
    pub fn results_link(&self, task_id: &uuid::Uuid) -> String {
        format!(
            "{}/status/{}",
            self.public_base_url.trim_end_matches('/'),
            task_id
        )
    }
}

/// Locate the config file following the priority order
///
/// Returns None when no config file exists anywhere; defaults apply then.
fn config_file_path(cli_config: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_config {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var("PICTOR_CONFIG") {
        return Some(PathBuf::from(path));
    }

    // Priority 3: Platform config directory
    let user_config = dirs::config_dir().map(|d| d.join("pictor").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    let system_config = PathBuf::from("/etc/pictor/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Platform default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pictor"))
        .unwrap_or_else(|| PathBuf::from("./pictor_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.fetch_max_attempts, 5);
        assert_eq!(settings.fetch_retry_interval(), Duration::from_secs(2));
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
port = 8080
max_upload_size = 1024
model_name = "llava:7b"
"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.max_upload_size, 1024);
        assert_eq!(settings.model_name, "llava:7b");
        // Unspecified fields fall back to defaults
        assert_eq!(settings.host, "127.0.0.1");
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number").unwrap();

        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn results_link_joins_base_and_id() {
        let mut settings = Settings::default();
        settings.public_base_url = "https://pictor.example.com/".to_string();
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            settings.results_link(&id),
            format!("https://pictor.example.com/status/{}", id)
        );
    }
}
