use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const ENV_PREFIX: &str = "LATENCY_MONITOR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitoring: MonitoringConfig,
    pub thresholds: Thresholds,
    pub notifications: NotificationSettings,
    pub alerts: AlertConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Layered load: optional `config.{toml,json,...}` in the working
    /// directory, then `LATENCY_MONITOR__SECTION__KEY` environment overrides.
    pub fn load() -> Result<Self, MonitorError> {
        Self::build(config::File::with_name("config").required(false))
    }

    pub fn load_from(path: &Path) -> Result<Self, MonitorError> {
        Self::build(config::File::from(path).required(true))
    }

    fn build<S>(file: S) -> Result<Self, MonitorError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.warn_on_suspicious_values();
        Ok(config)
    }

    fn warn_on_suspicious_values(&self) {
        if !self.thresholds.is_ordered() {
            let clamped = self.thresholds.normalized();
            warn!(
                "Latency thresholds out of order ({}/{}/{}ms), clamping to {}/{}/{}ms",
                self.thresholds.excellent_ms,
                self.thresholds.good_ms,
                self.thresholds.fair_ms,
                clamped.excellent_ms,
                clamped.good_ms,
                clamped.fair_ms,
            );
        }
        if self.monitoring.ping_timeout_ms == 0 {
            warn!("ping_timeout_ms is 0, every probe will time out");
        }
    }
}

/// Allowed polling periods, in seconds.
pub const POLL_INTERVAL_OPTIONS: [u64; 5] = [1, 2, 3, 5, 10];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PollInterval(u64);

impl PollInterval {
    pub fn secs(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        PollInterval(3)
    }
}

impl TryFrom<u64> for PollInterval {
    type Error = MonitorError;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        if POLL_INTERVAL_OPTIONS.contains(&secs) {
            Ok(PollInterval(secs))
        } else {
            Err(MonitorError::InvalidPollInterval(secs))
        }
    }
}

impl From<PollInterval> for u64 {
    fn from(interval: PollInterval) -> Self {
        interval.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub poll_interval: PollInterval,
    pub ping_timeout_ms: u64,
    pub history_retention_secs: u64,
    pub history_max_points: usize,
    pub gateway_cache_secs: u64,
    pub ping_program: String,
    pub route_program: String,
}

impl MonitoringConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_secs)
    }

    pub fn gateway_cache_validity(&self) -> Duration {
        Duration::from_secs(self.gateway_cache_secs)
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            poll_interval: PollInterval::default(),
            ping_timeout_ms: 2000,
            history_retention_secs: 600,
            history_max_points: 300,
            gateway_cache_secs: 30,
            ping_program: "ping".to_string(),
            route_program: "netstat".to_string(),
        }
    }
}

/// Latency cut points in milliseconds, lower-inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub excellent_ms: f64,
    pub good_ms: f64,
    pub fair_ms: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            excellent_ms: 50.0,
            good_ms: 100.0,
            fair_ms: 200.0,
        }
    }
}

impl Thresholds {
    pub fn is_ordered(&self) -> bool {
        self.excellent_ms <= self.good_ms && self.good_ms <= self.fair_ms
    }

    /// Raises each bound to at least the previous one so tiers stay monotonic.
    pub fn normalized(&self) -> Self {
        let good_ms = self.good_ms.max(self.excellent_ms);
        let fair_ms = self.fair_ms.max(good_ms);
        Self {
            excellent_ms: self.excellent_ms,
            good_ms,
            fair_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub notify_on_poor: bool,
    pub notify_on_offline: bool,
    pub notify_on_recovery: bool,
    pub sound: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            notify_on_poor: true,
            notify_on_offline: true,
            notify_on_recovery: false,
            sound: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub log_intents: bool,
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            log_intents: true,
            webhook_url: None,
            webhook_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub hosts_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            hosts_file: PathBuf::from("data/hosts.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: PathBuf,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
            file_prefix: "latency-monitor.log".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn poll_interval_accepts_only_listed_periods() {
        for secs in POLL_INTERVAL_OPTIONS {
            assert_eq!(PollInterval::try_from(secs).unwrap().secs(), secs);
        }
        assert!(matches!(
            PollInterval::try_from(4),
            Err(MonitorError::InvalidPollInterval(4))
        ));
        assert!(PollInterval::try_from(0).is_err());
    }

    #[test]
    fn normalized_clamps_inverted_bounds() {
        let inverted = Thresholds {
            excellent_ms: 100.0,
            good_ms: 50.0,
            fair_ms: 20.0,
        };
        assert!(!inverted.is_ordered());

        let clamped = inverted.normalized();
        assert!(clamped.is_ordered());
        assert_eq!(clamped.good_ms, 100.0);
        assert_eq!(clamped.fair_ms, 100.0);

        let defaults = Thresholds::default();
        assert_eq!(defaults.normalized(), defaults);
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[monitoring]\npoll_interval = 5\n\n[notifications]\nnotify_on_recovery = true\n\n[thresholds]\nfair_ms = 250.0"
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.monitoring.poll_interval.secs(), 5);
        assert_eq!(config.monitoring.ping_timeout_ms, 2000);
        assert!(config.notifications.notify_on_recovery);
        assert!(config.notifications.notify_on_poor);
        assert_eq!(config.thresholds.fair_ms, 250.0);
        assert_eq!(config.thresholds.excellent_ms, 50.0);
    }

    #[test]
    fn rejects_disallowed_poll_interval_in_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[monitoring]\npoll_interval = 7").unwrap();

        tokio_test::assert_err!(AppConfig::load_from(file.path()));
    }
}
