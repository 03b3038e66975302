use async_trait::async_trait;
use chrono::Utc;
use latency_monitor::services::classifier::classify;
use latency_monitor::services::gateway::RouteTable;
use latency_monitor::services::host_store::HostStore;
use latency_monitor::services::probe::Pinger;
use latency_monitor::utils::clock::ManualClock;
use latency_monitor::{
    AppConfig, IntentKind, LatencyStatus, MonitorDeps, MonitorService, PollInterval, Scheduler, Thresholds,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Answers from a fixed address -> latency table; unknown addresses time out.
struct TablePinger {
    latencies: parking_lot::Mutex<HashMap<String, Option<f64>>>,
}

impl TablePinger {
    fn new(entries: &[(&str, Option<f64>)]) -> Self {
        Self {
            latencies: parking_lot::Mutex::new(
                entries
                    .iter()
                    .map(|(address, latency)| (address.to_string(), *latency))
                    .collect(),
            ),
        }
    }

    fn set(&self, address: &str, latency: Option<f64>) {
        self.latencies.lock().insert(address.to_string(), latency);
    }
}

#[async_trait]
impl Pinger for TablePinger {
    async fn ping(&self, address: &str, _timeout: Duration) -> Option<f64> {
        self.latencies.lock().get(address).copied().flatten()
    }
}

struct StaticRoutes(&'static str);

#[async_trait]
impl RouteTable for StaticRoutes {
    async fn dump(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

const TWO_GATEWAYS: &str = "\
Destination        Gateway            Flags               Netif Expire
default            192.168.1.1        UGScg                 en0
default            10.0.0.1           UGScIg                en7
default            127.0.0.1          UGScIg                lo0
";

async fn engine(pinger: Arc<TablePinger>, routes: &'static str) -> MonitorService {
    let deps = MonitorDeps {
        pinger,
        route_table: Arc::new(StaticRoutes(routes)),
        clock: Arc::new(ManualClock::new(Utc::now())),
        host_store: HostStore::in_memory(),
    };
    MonitorService::new(&AppConfig::default(), deps).await
}

#[test]
fn boundary_scenario_with_default_thresholds() {
    let t = Thresholds::default();
    assert_eq!(classify(Some(49.9), &t), LatencyStatus::Excellent);
    assert_eq!(classify(Some(50.0), &t), LatencyStatus::Good);
    assert_eq!(classify(Some(199.9), &t), LatencyStatus::Fair);
    assert_eq!(classify(Some(200.0), &t), LatencyStatus::Poor);
}

#[tokio::test]
async fn worst_of_aggregation_and_single_offline_intent() {
    let pinger = Arc::new(TablePinger::new(&[
        ("192.168.1.1", Some(30.0)),
        ("10.0.0.1", Some(20.0)),
    ]));
    let mut monitor = engine(pinger.clone(), TWO_GATEWAYS).await;

    let addresses: Vec<&str> = monitor.hosts().iter().map(|h| h.address.as_str()).collect();
    assert_eq!(addresses, vec!["10.0.0.1", "192.168.1.1"]);

    let first = monitor.poll().await.unwrap();
    assert_eq!(first.overall_status, LatencyStatus::Excellent);

    pinger.set("10.0.0.1", None);
    let second = monitor.poll().await.unwrap();
    assert_eq!(second.overall_status, LatencyStatus::Offline);
    assert_eq!(second.worst_latency_ms, Some(30.0));
    let offline: Vec<_> = second
        .intents
        .iter()
        .filter(|intent| intent.kind == IntentKind::Offline)
        .collect();
    assert_eq!(offline.len(), 1);

    let third = monitor.poll().await.unwrap();
    assert!(third.intents.is_empty());
}

#[tokio::test]
async fn refresh_recreates_gateway_identities() {
    let pinger = Arc::new(TablePinger::new(&[]));
    let mut monitor = engine(pinger, TWO_GATEWAYS).await;
    let before: Vec<_> = monitor.hosts().iter().map(|h| h.id()).collect();

    monitor.refresh_hosts(true).await;
    let after: Vec<_> = monitor.hosts().iter().map(|h| h.id()).collect();

    assert_eq!(before.len(), after.len());
    assert!(before.iter().all(|id| !after.contains(id)));
}

#[tokio::test(start_paused = true)]
async fn scheduler_drives_the_engine() {
    let pinger = Arc::new(TablePinger::new(&[("192.168.1.1", Some(250.0)), ("10.0.0.1", Some(5.0))]));
    let monitor = Arc::new(RwLock::new(engine(pinger.clone(), TWO_GATEWAYS).await));

    let scheduler = Scheduler::start(monitor.clone(), PollInterval::try_from(2).unwrap(), Vec::new());
    let mut events = scheduler.handle().subscribe();

    let first = events.recv().await.unwrap();
    assert_eq!(first.overall_status, LatencyStatus::Poor);
    assert_eq!(first.intents.len(), 1);
    assert_eq!(first.intents[0].kind, IntentKind::Degraded);

    pinger.set("192.168.1.1", Some(12.0));
    let second = events.recv().await.unwrap();
    assert_eq!(second.overall_status, LatencyStatus::Excellent);
    // recovery notifications are off by default
    assert!(second.intents.is_empty());

    scheduler.shutdown().await;
    assert_eq!(monitor.read().await.history().len(), 2);
}
