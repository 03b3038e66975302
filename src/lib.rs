//! Network latency monitor.
//!
//! Discovers default gateways, pings them alongside user-defined hosts on a
//! fixed period, classifies round-trip times into tiers, keeps ten minutes
//! of history and raises notification intents when the overall tier
//! degrades or recovers.

pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{MonitorError, Result};
pub use models::config::{AppConfig, NotificationSettings, PollInterval, Thresholds};
pub use models::host::Host;
pub use models::metrics::{HistorySample, LatencyStatus, Reading, TierDuration};
pub use services::monitor::{MonitorDeps, MonitorService, SharedMonitor, TickOutcome};
pub use services::notifier::{IntentKind, NotificationIntent};
pub use services::scheduler::{Scheduler, SchedulerHandle};
