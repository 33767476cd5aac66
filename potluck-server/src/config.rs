use std::path::PathBuf;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load the configuration from a YAML file.
    pub fn load(yml_path: &str) -> anyhow::Result<Self> {
        let yml = std::fs::read_to_string(yml_path)?;
        Self::from_yaml(&yml)
    }

    pub fn from_yaml(yml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yml)?;
        Ok(config)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub tls: Option<TLSConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TLSConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    /// How long a writer waits for the lock before giving up
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    crate::database::DEFAULT_BUSY_TIMEOUT_MS
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    /// Prefix of every blob key, staged or permanent
    #[serde(default = "default_bucket_root")]
    pub bucket_root: String,
    pub backend: StorageBackend,
}

fn default_bucket_root() -> String {
    "media".into()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageBackend {
    Local {
        base_dir: PathBuf,
        #[serde(default = "default_public_base_url")]
        public_base_url: String,
    },
    Gcs {
        bucket: String,
    },
}

fn default_public_base_url() -> String {
    "/media".into()
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfig {
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
        }
    }
}
