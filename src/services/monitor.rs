use crate::error::{MonitorError, Result};
use crate::models::config::{AppConfig, MonitoringConfig, NotificationSettings, PollInterval, Thresholds};
use crate::models::host::Host;
use crate::models::metrics::{HistorySample, LatencyStatus, Reading, TierDuration};
use crate::services::gateway::{GatewayDiscovery, NetstatRouteTable, RouteTable};
use crate::services::history::HistoryStore;
use crate::services::host_store::HostStore;
use crate::services::notifier::{evaluate, NotificationIntent};
use crate::services::probe::{probe_many, Pinger, SystemPinger};
use crate::utils::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type SharedMonitor = Arc<RwLock<MonitorService>>;

/// External capabilities the engine runs against.
#[derive(Clone)]
pub struct MonitorDeps {
    pub pinger: Arc<dyn Pinger>,
    pub route_table: Arc<dyn RouteTable>,
    pub clock: Arc<dyn Clock>,
    pub host_store: HostStore,
}

impl MonitorDeps {
    pub fn system(config: &AppConfig) -> Self {
        Self {
            pinger: Arc::new(SystemPinger::new(config.monitoring.ping_program.clone())),
            route_table: Arc::new(NetstatRouteTable::new(config.monitoring.route_program.clone())),
            clock: Arc::new(SystemClock),
            host_store: HostStore::new(config.storage.hosts_file.clone()),
        }
    }
}

/// Hosts and parameters for one round of probes, detached from the engine.
pub struct ProbePlan {
    pub hosts: Vec<Host>,
    pinger: Arc<dyn Pinger>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    thresholds: Thresholds,
}

impl ProbePlan {
    pub async fn run(self) -> Vec<Reading> {
        probe_many(
            self.pinger.as_ref(),
            &self.hosts,
            self.timeout,
            &self.thresholds,
            self.clock.as_ref(),
        )
        .await
    }
}

/// Result of one polling tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickOutcome {
    pub timestamp: DateTime<Utc>,
    pub overall_status: LatencyStatus,
    pub previous_status: LatencyStatus,
    pub worst_latency_ms: Option<f64>,
    pub reading_count: usize,
    pub intents: Vec<NotificationIntent>,
}

pub struct MonitorService {
    config: MonitoringConfig,
    thresholds: Thresholds,
    notifications: NotificationSettings,
    pinger: Arc<dyn Pinger>,
    clock: Arc<dyn Clock>,
    discovery: GatewayDiscovery,
    host_store: HostStore,
    discovered_hosts: Vec<Host>,
    user_hosts: Vec<Host>,
    fallback_hosts: Vec<Host>,
    hosts: Vec<Host>,
    latest_readings: HashMap<Uuid, Reading>,
    history: HistoryStore,
    overall_status: LatencyStatus,
    worst_latency: Option<f64>,
}

impl MonitorService {
    /// Loads persisted user hosts and runs the first gateway discovery.
    pub async fn new(config: &AppConfig, deps: MonitorDeps) -> Self {
        let discovery = GatewayDiscovery::new(
            deps.route_table,
            deps.clock.clone(),
            config.monitoring.gateway_cache_validity(),
        );
        let user_hosts = deps.host_store.load().await;

        let mut service = Self {
            config: config.monitoring.clone(),
            thresholds: config.thresholds,
            notifications: config.notifications,
            pinger: deps.pinger,
            clock: deps.clock,
            discovery,
            host_store: deps.host_store,
            discovered_hosts: Vec::new(),
            user_hosts,
            fallback_hosts: default_hosts(),
            hosts: Vec::new(),
            latest_readings: HashMap::new(),
            history: HistoryStore::new(),
            overall_status: LatencyStatus::Unknown,
            worst_latency: None,
        };

        service.refresh_hosts(false).await;
        service
    }

    // Host management

    /// Re-runs gateway discovery and rebuilds the host list. Readings of
    /// the replaced gateways are dropped with them.
    pub async fn refresh_hosts(&mut self, force_refresh: bool) {
        let discovered = self.discovery.discover_hosts(force_refresh).await;
        let replaced = std::mem::replace(&mut self.discovered_hosts, discovered);
        for host in &replaced {
            self.latest_readings.remove(&host.id());
        }
        self.rebuild_hosts();
    }

    pub async fn add_host(&mut self, address: &str, label: &str) -> Result<Host> {
        let address = address.trim();
        if !is_acceptable_address(address) {
            return Err(MonitorError::InvalidHost(address.to_string()));
        }
        let label = label.trim();
        let label = if label.is_empty() { address } else { label };

        let host = Host::new(address, label, true);
        info!("Adding host {} ({})", host.label, host.address);
        self.user_hosts.push(host.clone());
        self.persist_user_hosts().await;
        self.rebuild_hosts();
        Ok(host)
    }

    /// Removes a user-defined host and its latest reading.
    pub async fn remove_host(&mut self, id: Uuid) -> Result<Host> {
        let index = self
            .user_hosts
            .iter()
            .position(|host| host.id() == id)
            .ok_or(MonitorError::HostNotFound(id))?;

        let host = self.user_hosts.remove(index);
        self.latest_readings.remove(&id);
        info!("Removed host {} ({})", host.label, host.address);
        self.persist_user_hosts().await;
        self.rebuild_hosts();
        Ok(host)
    }

    /// Flips the enabled flag. Only user-defined hosts keep the change
    /// across a discovery refresh.
    pub async fn toggle_host(&mut self, id: Uuid) -> Result<Host> {
        if let Some(host) = self.user_hosts.iter_mut().find(|host| host.id() == id) {
            host.is_enabled = !host.is_enabled;
            let toggled = host.clone();
            self.persist_user_hosts().await;
            self.rebuild_hosts();
            return Ok(toggled);
        }

        let host = self
            .discovered_hosts
            .iter_mut()
            .chain(self.fallback_hosts.iter_mut())
            .find(|host| host.id() == id)
            .ok_or(MonitorError::HostNotFound(id))?;
        host.is_enabled = !host.is_enabled;
        let toggled = host.clone();
        self.rebuild_hosts();
        Ok(toggled)
    }

    fn rebuild_hosts(&mut self) {
        let mut hosts: Vec<Host> = self
            .discovered_hosts
            .iter()
            .chain(self.user_hosts.iter())
            .cloned()
            .collect();

        if hosts.is_empty() {
            debug!("No gateways or user hosts, falling back to public resolvers");
            hosts = self.fallback_hosts.clone();
        }
        self.hosts = hosts;
    }

    async fn persist_user_hosts(&self) {
        if let Err(e) = self.host_store.save(&self.user_hosts).await {
            warn!("Failed to persist user hosts: {}", e);
        }
    }

    // Polling

    pub fn enabled_hosts(&self) -> Vec<Host> {
        self.hosts.iter().filter(|host| host.is_enabled).cloned().collect()
    }

    /// Snapshot for the next tick; `None` when nothing is enabled.
    pub fn probe_plan(&self) -> Option<ProbePlan> {
        let hosts = self.enabled_hosts();
        if hosts.is_empty() {
            return None;
        }

        Some(ProbePlan {
            hosts,
            pinger: self.pinger.clone(),
            clock: self.clock.clone(),
            timeout: self.config.ping_timeout(),
            thresholds: self.thresholds,
        })
    }

    /// Folds one tick's readings into the engine state. Readings for hosts
    /// removed while the probes were in flight are discarded.
    pub fn apply_readings(&mut self, mut readings: Vec<Reading>) -> TickOutcome {
        let now = self.clock.now();

        let before = readings.len();
        readings.retain(|reading| self.hosts.iter().any(|host| host.id() == reading.host_id));
        if readings.len() < before {
            debug!("Discarded {} reading(s) for hosts no longer monitored", before - readings.len());
        }

        for reading in &readings {
            self.latest_readings.insert(reading.host_id, reading.clone());
        }

        let new_status = LatencyStatus::worst(readings.iter().map(|r| r.status));
        self.worst_latency = readings
            .iter()
            .filter_map(|r| r.latency_ms)
            .max_by(|a, b| a.total_cmp(b));

        let previous_status = self.overall_status;
        let mut intents = Vec::new();
        if new_status != previous_status {
            info!("Overall status changed: {} -> {}", previous_status, new_status);
            intents = evaluate(previous_status, new_status, &self.notifications, &self.thresholds);
            self.overall_status = new_status;
        }

        let reading_count = readings.len();
        self.history.append(HistorySample::new(readings, now));
        self.history.trim(self.config.history_retention(), now);

        TickOutcome {
            timestamp: now,
            overall_status: new_status,
            previous_status,
            worst_latency_ms: self.worst_latency,
            reading_count,
            intents,
        }
    }

    /// Runs a full tick in place. The scheduler splits this around the lock.
    pub async fn poll(&mut self) -> Option<TickOutcome> {
        let plan = self.probe_plan()?;
        let readings = plan.run().await;
        Some(self.apply_readings(readings))
    }

    // Settings

    pub fn poll_interval(&self) -> PollInterval {
        self.config.poll_interval
    }

    pub fn set_poll_interval(&mut self, interval: PollInterval) {
        self.config.poll_interval = interval;
    }

    pub fn notification_settings(&self) -> NotificationSettings {
        self.notifications
    }

    pub fn set_notification_settings(&mut self, settings: NotificationSettings) {
        self.notifications = settings;
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    // Read side

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn user_hosts(&self) -> &[Host] {
        &self.user_hosts
    }

    pub fn overall_status(&self) -> LatencyStatus {
        self.overall_status
    }

    pub fn worst_latency(&self) -> Option<f64> {
        self.worst_latency
    }

    pub fn latest_reading(&self, host_id: Uuid) -> Option<&Reading> {
        self.latest_readings.get(&host_id)
    }

    /// Latest reading per host, ordered by label.
    pub fn sorted_readings(&self) -> Vec<Reading> {
        let mut readings: Vec<Reading> = self.latest_readings.values().cloned().collect();
        readings.sort_by(|a, b| a.host_label.cmp(&b.host_label));
        readings
    }

    pub fn history(&self) -> Vec<HistorySample> {
        self.history.snapshot()
    }

    pub fn downsampled_history(&self, max_points: usize) -> Vec<HistorySample> {
        self.history.downsample(max_points)
    }

    pub fn default_history_points(&self) -> usize {
        self.config.history_max_points
    }

    pub fn time_in_each_tier(&self) -> Vec<TierDuration> {
        self.history.time_in_each_tier(self.clock.now())
    }

    pub fn total_history_duration(&self) -> f64 {
        self.history.total_duration(self.clock.now())
    }
}

fn default_hosts() -> Vec<Host> {
    vec![
        Host::new("8.8.8.8", "Google DNS", false),
        Host::new("1.1.1.1", "Cloudflare", false),
    ]
}

fn is_acceptable_address(address: &str) -> bool {
    !address.is_empty()
        && !address.starts_with('-')
        && !address.chars().any(|c| c.is_whitespace() || c.is_control())
}
