//! Configuration management for localai-router
//!
//! TOML file with built-in defaults, overridden by environment variables.
//! Location: ~/.localai-router/config.toml

use crate::errors::{Result, RouterError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub services: ServicesConfig,
    pub detector: DetectorConfig,
    pub monitor: MonitorConfig,
    pub inference: InferenceConfig,
    pub collaborators: CollaboratorsConfig,
    pub snapshot: SnapshotConfig,
    pub logging: LoggingConfig,
}

/// Base URLs of the local AI services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub inference_url: String,
    pub vector_store_url: String,
    pub embedding_url: String,
}

/// Capability detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub cache_ttl_secs: u64,
    pub probe_timeout_secs: u64,
    /// Force local-deployment mode regardless of what probes find
    pub local_override: bool,
}

/// Health polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub probe_timeout_secs: u64,
}

/// Local generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub generation_timeout_secs: u64,
    pub model_refresh_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub code_models: Vec<String>,
    pub reasoning_models: Vec<String>,
    pub general_models: Vec<String>,
}

/// Embedding server and vector store request defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorsConfig {
    pub embedding_model: String,
    pub default_collection: String,
    pub search_limit: usize,
    pub request_timeout_secs: u64,
}

/// Snapshot persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub dir: String,
    pub interval_secs: u64,
    pub max_backup_files: usize,
}

/// Log filter used when RUST_LOG is not set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            inference_url: "http://localhost:11434".to_string(),
            vector_store_url: "http://localhost:6333".to_string(),
            embedding_url: "http://localhost:8001".to_string(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60,
            probe_timeout_secs: 3,
            local_override: false,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            probe_timeout_secs: 5,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            generation_timeout_secs: 120,
            model_refresh_secs: 60,
            temperature: 0.7,
            max_tokens: 1000,
            code_models: to_strings(&[
                "deepseek-coder:33b",
                "deepseek-coder:6.7b",
                "codellama:13b",
                "codellama:7b",
            ]),
            reasoning_models: to_strings(&["llama3.1:70b", "mixtral:8x7b", "llama3.1:8b"]),
            general_models: to_strings(&["llama3.1:8b", "mixtral:8x7b", "llama3:8b", "mistral:7b"]),
        }
    }
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            default_collection: "default".to_string(),
            search_limit: 10,
            request_timeout_secs: 30,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: "~/.localai-router/snapshots".to_string(),
            interval_secs: 3600,
            max_backup_files: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from file or defaults, then apply environment overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match path {
            Some(config_path) => Self::load_from_file(&config_path)?,
            None => Self::load_default()?,
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RouterError::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| RouterError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from the standard location, or built-in defaults if absent
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Standard config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".localai-router").join("config.toml"))
    }

    /// Overlay environment-style inputs onto the loaded values
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.services.inference_url = url;
        }
        if let Some(url) = lookup("QDRANT_URL") {
            self.services.vector_store_url = url;
        }
        if let Some(url) = lookup("EMBEDDING_SERVER_URL") {
            self.services.embedding_url = url;
        }
        if let Some(flag) = lookup("LOCAL_AI_ENABLED") {
            self.detector.local_override = flag.eq_ignore_ascii_case("true") || flag == "1";
        }
        if let Some(value) = lookup("HEALTH_POLL_INTERVAL_SECS") {
            self.monitor.poll_interval_secs = parse_number("HEALTH_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = lookup("SNAPSHOT_INTERVAL_SECS") {
            self.snapshot.interval_secs = parse_number("SNAPSHOT_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = lookup("MAX_BACKUP_FILES") {
            self.snapshot.max_backup_files = parse_number("MAX_BACKUP_FILES", &value)?;
        }
        if let Some(dir) = lookup("SNAPSHOT_DIR") {
            self.snapshot.dir = dir;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("detector.cache_ttl_secs", self.detector.cache_ttl_secs),
            ("detector.probe_timeout_secs", self.detector.probe_timeout_secs),
            ("monitor.poll_interval_secs", self.monitor.poll_interval_secs),
            ("monitor.probe_timeout_secs", self.monitor.probe_timeout_secs),
            ("inference.generation_timeout_secs", self.inference.generation_timeout_secs),
            ("inference.model_refresh_secs", self.inference.model_refresh_secs),
            ("collaborators.request_timeout_secs", self.collaborators.request_timeout_secs),
            ("snapshot.interval_secs", self.snapshot.interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(RouterError::Config(format!("{} must be greater than 0", name)));
            }
        }

        if self.snapshot.max_backup_files == 0 {
            return Err(RouterError::Config(
                "snapshot.max_backup_files must be greater than 0".to_string(),
            ));
        }

        if self.collaborators.search_limit == 0 {
            return Err(RouterError::Config(
                "collaborators.search_limit must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.inference.temperature) {
            return Err(RouterError::Config(
                "inference.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        for (name, url) in [
            ("services.inference_url", &self.services.inference_url),
            ("services.vector_store_url", &self.services.vector_store_url),
            ("services.embedding_url", &self.services.embedding_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RouterError::Config(format!("{} must be an http(s) URL: {}", name, url)));
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RouterError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RouterError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| RouterError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Snapshot directory with tilde expanded
    pub fn snapshot_dir(&self) -> PathBuf {
        Self::expand_path(&self.snapshot.dir)
    }
}

impl DetectorConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl InferenceConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn model_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.model_refresh_secs)
    }
}

impl CollaboratorsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SnapshotConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RouterError::Config(format!("{} must be a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.services.inference_url, "http://localhost:11434");
        assert_eq!(config.monitor.poll_interval_secs, 30);
        assert_eq!(config.snapshot.max_backup_files, 50);
        assert!(!config.detector.local_override);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_interval() {
        let mut config = Config::default();
        config.monitor.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_backups() {
        let mut config = Config::default();
        config.snapshot.max_backup_files = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_url() {
        let mut config = Config::default();
        config.services.vector_store_url = "localhost:6333".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("OLLAMA_BASE_URL", "http://gpu-box:11434"),
            ("LOCAL_AI_ENABLED", "true"),
            ("MAX_BACKUP_FILES", "7"),
            ("HEALTH_POLL_INTERVAL_SECS", "10"),
        ]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.services.inference_url, "http://gpu-box:11434");
        assert!(config.detector.local_override);
        assert_eq!(config.snapshot.max_backup_files, 7);
        assert_eq!(config.monitor.poll_interval_secs, 10);
        assert_eq!(config.services.embedding_url, "http://localhost:8001");
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let vars = env(&[("SNAPSHOT_INTERVAL_SECS", "hourly")]);
        let mut config = Config::default();
        assert!(config.apply_env(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [snapshot]
            max_backup_files = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.snapshot.max_backup_files, 3);
        assert_eq!(config.snapshot.interval_secs, 3600);
        assert_eq!(config.monitor.probe_timeout_secs, 5);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.detector.local_override = true;
        config.save(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert!(loaded.detector.local_override);
        assert_eq!(loaded.inference.code_models, config.inference.code_models);
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let expanded = Config::expand_path("/var/lib/snapshots");
        assert_eq!(expanded, PathBuf::from("/var/lib/snapshots"));
    }
}
