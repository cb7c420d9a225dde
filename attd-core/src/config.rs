use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Default socket path used when neither the config file nor a flag sets one.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/attd";

/// Default base URL of the time tracking service.
pub const DEFAULT_API_BASE_URL: &str = "https://hackhour.hackclub.com";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AttdConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
    /// Delay between the final reply write and closing the connection.
    pub linger_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            log_level: "info".to_string(),
            linger_ms: 1000,
        }
    }
}

impl ServiceConfig {
    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    /// When false, notifications are written to the log instead of the desktop.
    pub enabled: bool,
    pub title: String,
    pub daemon_title: String,
    pub icon_path: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: "Arcade Time Tracker".to_string(),
            daemon_title: "Arcade Time Tracker Daemon".to_string(),
            icon_path: "./assets/ico.png".to_string(),
        }
    }
}

/// What happens when an identity that already has live reminder tasks gets another one.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Every task keeps running; overlapping sessions all fire.
    #[default]
    Additive,
    /// Live tasks for the identity are cancelled before the new one starts.
    Replace,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReminderConfig {
    pub tick_seconds: u64,
    pub overlap: OverlapPolicy,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 60,
            overlap: OverlapPolicy::Additive,
        }
    }
}

impl ReminderConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }
}

impl AttdConfig {
    /// Load defaults, then the optional TOML file at `path`, then `ATTD_<SECTION>__<KEY>`
    /// environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let path = shellexpand::tilde(path).into_owned();
        let s = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix("ATTD")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let mut config: AttdConfig = s.try_deserialize()?;
        config.service.socket_path = shellexpand::tilde(&config.service.socket_path).into_owned();
        config.notifications.icon_path =
            shellexpand::tilde(&config.notifications.icon_path).into_owned();
        Ok(config)
    }

    /// Apply the `--pipe-path` startup flag, which wins over every other layer.
    pub fn with_socket_path(mut self, socket_path: Option<String>) -> Self {
        if let Some(path) = socket_path.filter(|p| !p.is_empty()) {
            self.service.socket_path = shellexpand::tilde(&path).into_owned();
        }
        self
    }
}
