use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

/// Where the catalog lives and how long the client may wait for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub app_name: Option<String>,
    /// Socket connect timeout handed to the driver (milliseconds)
    pub connect_timeout_ms: u64,
    /// How long the driver waits for a usable server (milliseconds)
    pub server_selection_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "plp_bookstore".to_string(),
            collection: "books".to_string(),
            app_name: Some("shelf".to_string()),
            connect_timeout_ms: 10_000,
            server_selection_timeout_ms: 30_000,
        }
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_millis(self.server_selection_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `shelf_core=debug`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from TOML file, with environment variable overrides.
    /// Falls back to defaults if file is not found. SHELF_CONFIG overrides the path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        ConfigLoader::new(|key| env::var(key).ok()).load(path)
    }
}

/// Resolves configuration from a file and environment variables.
pub(crate) struct ConfigLoader<F> {
    lookup: F,
}

impl<F> ConfigLoader<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub(crate) fn new(lookup: F) -> Self {
        Self { lookup }
    }

    pub(crate) fn load<P: AsRef<Path>>(&self, default_path: P) -> anyhow::Result<Config> {
        let cfg_path = (self.lookup)("SHELF_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_path.as_ref().to_path_buf());

        let mut cfg = match fs::read_to_string(&cfg_path) {
            Ok(s) => toml::from_str::<Config>(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };

        self.apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    /// Apply SHELF_* environment variable overrides.
    fn apply_env_overrides(&self, cfg: &mut Config) {
        if let Some(v) = (self.lookup)("SHELF_URI").or_else(|| (self.lookup)("MONGODB_URI")) {
            cfg.store.uri = v;
        }

        if let Some(v) = (self.lookup)("SHELF_DATABASE") {
            cfg.store.database = v;
        }

        if let Some(v) = (self.lookup)("SHELF_COLLECTION") {
            cfg.store.collection = v;
        }

        if let Some(v) = (self.lookup)("SHELF_LOG") {
            cfg.logging.filter = v;
        }
    }
}
