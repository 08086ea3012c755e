//! Layered configuration.
//!
//! Sources, later overriding earlier:
//! 1. `order-desk.toml` in the working directory (if present)
//! 2. the file passed with `--config` (required if given)
//! 3. environment variables prefixed `ORDER_DESK__`, nested with `__`
//!    (e.g. `ORDER_DESK__BACKEND__KIND=hosted`)

use serde::Deserialize;

use crate::error::ConfigError;
use crate::notifications::NotificationPermission;

pub const DEFAULT_CONFIG_FILE: &str = "order-desk";
pub const CONFIG_ENV_PREFIX: &str = "ORDER_DESK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process store with demo data.
    #[default]
    Memory,
    /// The hosted backend-as-a-service.
    Hosted,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Project URL of the hosted backend.
    pub url: String,
    /// Public (anonymous) project key.
    pub anon_key: String,
    /// Override for the change-feed websocket URL.
    pub realtime_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            url: String::new(),
            anon_key: String::new(),
            realtime_url: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StaffAccount {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub staff: Vec<StaffAccount>,
    pub seed_demo_orders: bool,
    /// Seconds between simulated customer orders; off when unset.
    pub demo_feed_secs: Option<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            staff: vec![StaffAccount {
                email: "staff@grocer.test".to_string(),
                password: "grocer".to_string(),
            }],
            seed_demo_orders: true,
            demo_feed_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// When false the desktop notification capability is treated as absent.
    pub enabled: bool,
    /// Permission state at startup.
    pub permission: NotificationPermission,
    /// What the permission prompt answers when asked.
    pub prompt_answer: NotificationPermission,
    pub icon: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            permission: NotificationPermission::Default,
            prompt_answer: NotificationPermission::Granted,
            icon: "/vite.svg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub memory: MemoryConfig,
    pub notifications: NotificationConfig,
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Toml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Checks the settings the selected backend needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend.kind {
            BackendKind::Hosted => {
                if self.backend.url.trim().is_empty() {
                    return Err(ConfigError::Invalid("backend.url is required for the hosted backend".into()));
                }
                if self.backend.anon_key.trim().is_empty() {
                    return Err(ConfigError::Invalid("backend.anon_key is required for the hosted backend".into()));
                }
            }
            BackendKind::Memory => {
                if self.memory.staff.is_empty() {
                    return Err(ConfigError::Invalid("memory.staff needs at least one account".into()));
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.memory.seed_demo_orders = false;
        config
    }
}
