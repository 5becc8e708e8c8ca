//! Configuration loading and resolution

use crate::models::DEFAULT_INTERFACES;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Deployment environment
///
/// Local and testing run against the filesystem-backed archive; staging and
/// production additionally enforce the manifest freshness health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Testing,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Testing => "testing",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// True for environments backed by the real archive deployment
    pub fn is_deployed(self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Environment::Local),
            "testing" => Ok(Environment::Testing),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(Error::Config(format!("unknown environment: {}", other))),
        }
    }
}

/// Locale fallbacks applied when a key has no value for a requested locale
pub static DEFAULT_FALLBACK_LOCALES: Lazy<BTreeMap<String, String>> = Lazy::new(|| {
    BTreeMap::from([
        ("fr-BE".to_string(), "fr-FR".to_string()),
        ("nl-BE".to_string(), "nl-NL".to_string()),
        ("de-AT".to_string(), "de-DE".to_string()),
        ("en-US".to_string(), "en-GB".to_string()),
    ])
});

/// Service configuration
///
/// Every field has a compiled default so the service starts with no config
/// file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    pub database_path: PathBuf,
    pub archive_root: PathBuf,
    pub local_files_root: PathBuf,
    pub interfaces: Vec<String>,
    pub queue_name: String,
    pub reconcile_cooldown_secs: u64,
    pub worker_count: usize,
    pub job_max_attempts: u32,
    pub job_retry_backoff_secs: u64,
    pub fallback_locales: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        let data = default_data_dir();
        Self {
            environment: Environment::Local,
            database_path: data.join("lexsync.sqlite"),
            archive_root: data.join("archive"),
            local_files_root: data.join("live"),
            interfaces: DEFAULT_INTERFACES.iter().map(|s| s.to_string()).collect(),
            queue_name: "translations".to_string(),
            reconcile_cooldown_secs: 300,
            worker_count: 4,
            job_max_attempts: 3,
            job_retry_backoff_secs: 60,
            fallback_locales: DEFAULT_FALLBACK_LOCALES.clone(),
        }
    }
}

impl Config {
    /// Resolve and load configuration following the priority order:
    /// 1. Explicit path (command-line argument)
    /// 2. LEXSYNC_CONFIG environment variable
    /// 3. Platform config file (user dir, then /etc/lexsync on Linux)
    /// 4. Compiled defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Config> {
        if let Some(path) = cli_path {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var("LEXSYNC_CONFIG") {
            return Self::from_file(Path::new(&path));
        }

        if let Some(path) = user_config_file() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        if cfg!(target_os = "linux") {
            let system = PathBuf::from("/etc/lexsync/config.toml");
            if system.exists() {
                return Self::from_file(&system);
            }
        }

        Ok(Self::default().with_env_overrides())
    }

    /// Load from a specific TOML file; missing fields take compiled defaults
    pub fn from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Config {
        if let Ok(env) = std::env::var("LEXSYNC_ENV") {
            if let Ok(parsed) = env.parse() {
                self.environment = parsed;
            }
        }
        if let Ok(path) = std::env::var("LEXSYNC_DB") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(root) = std::env::var("LEXSYNC_ARCHIVE_ROOT") {
            self.archive_root = PathBuf::from(root);
        }
        self
    }
}

/// OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lexsync"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/lexsync"))
}

fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lexsync").join("config.toml"))
}
