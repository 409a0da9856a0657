//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use stationfeed_core::{DEFAULT_BATCH_SIZE, DEFAULT_OBJECT_KEY, DEFAULT_URL_EXPIRY};
use stationfeed_gbfs::config::{DEFAULT_FEED_URL, DEFAULT_LOCAL_PATH, DEFAULT_SHARD_SIZE};
use stationfeed_gbfs::transform::DEFAULT_MAX_CAPACITY;

/// Environment variable selecting the output: `LOCAL` or a bucket name
pub const FILE_OUTPUT_ENV: &str = "FILE_OUTPUT";

/// Global configuration for stationfeed
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub output: OutputConfig,
    pub http: HttpSettings,
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    #[serde(deserialize_with = "deserialize_env_var")]
    pub url: String,
    pub max_capacity: u32,
    pub batch_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            max_capacity: DEFAULT_MAX_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Local,
    Object,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub local_path: PathBuf,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub bucket: String,
    pub key: String,
    /// Hand out a signed URL instead of the object reference
    pub presign: bool,
    pub url_expiry_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::Local,
            local_path: PathBuf::from(DEFAULT_LOCAL_PATH),
            bucket: "pge-data-bucket".to_string(),
            key: DEFAULT_OBJECT_KEY.to_string(),
            presign: true,
            url_expiry_secs: DEFAULT_URL_EXPIRY.as_secs(),
        }
    }
}

/// Resolved destination before any store is constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChoice {
    Local(PathBuf),
    Object { bucket: String },
}

impl OutputConfig {
    /// Apply the `FILE_OUTPUT` rule on top of the file settings.
    ///
    /// `LOCAL` selects the local file; any other non-empty value is the
    /// bucket to upload to. Unset or empty falls back to `mode`.
    pub fn resolve(&self, file_output: Option<&str>) -> OutputChoice {
        match file_output.map(str::trim).filter(|v| !v.is_empty()) {
            Some("LOCAL") => OutputChoice::Local(self.local_path.clone()),
            Some(bucket) => OutputChoice::Object {
                bucket: bucket.to_string(),
            },
            None => match self.mode {
                OutputMode::Local => OutputChoice::Local(self.local_path.clone()),
                OutputMode::Object => OutputChoice::Object {
                    bucket: self.bucket.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub connect_timeout: u64,
    pub read_timeout: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            read_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Filter threads (1 = inline)
    pub default: usize,
    pub shard_size: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            default: 1,
            shard_size: DEFAULT_SHARD_SIZE,
        }
    }
}

/// Deserialize a string that may be an environment reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    expand_env_var(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("environment variable in {raw} is not set"))
    })
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./stationfeed.toml (current directory)
    /// 2. ~/.config/stationfeed/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("stationfeed.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "stationfeed") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
