use dbxbridge::ClientConfig;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub client: ClientConfig,
    pub cli: CliConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// How long one-shot commands wait for the daemon before giving up.
    pub connect_wait_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self { connect_wait_ms: 5000 }
    }
}

impl CliConfig {
    pub fn connect_wait(&self) -> Duration {
        Duration::from_millis(self.connect_wait_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            client: ClientConfig::default(),
            cli: CliConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: explicit path, then the user config dir, then
    /// `./dbxbridge.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => log::warn!("Skipping config {}: {:#}", candidate.display(), e),
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let file_name = format!("{}.yml", env!("CARGO_PKG_NAME"));
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(env!("CARGO_PKG_NAME")).join(&file_name));
        }
        paths.push(PathBuf::from(file_name));
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Point both channels at `dir` instead of the daemon's default directory.
    pub fn with_socket_dir(mut self, dir: &Path) -> Self {
        let sockets = ClientConfig::with_socket_dir(dir);
        self.client.command.socket_path = sockets.command.socket_path;
        self.client.events.socket_path = sockets.events.socket_path;
        self
    }
}
