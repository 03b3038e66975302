//! Fixed-period polling loop.
//!
//! One task per engine. Each tick snapshots a probe plan under a read lock,
//! probes with no lock held, then folds the readings back in under a write
//! lock. Interval changes reset the ticker inside the same task.

use crate::models::config::PollInterval;
use crate::services::monitor::{SharedMonitor, TickOutcome};
use crate::services::notifier::{dispatch_all, Notifier};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

pub type TickEvent = TickOutcome;

/// Cloneable control surface of a running [`Scheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    interval_tx: Arc<watch::Sender<PollInterval>>,
    events: broadcast::Sender<TickEvent>,
}

impl SchedulerHandle {
    /// Cancels the pending tick and reschedules with the new period.
    pub fn set_interval(&self, period: PollInterval) {
        self.interval_tx.send_if_modified(|current| {
            if *current == period {
                return false;
            }
            *current = period;
            true
        });
    }

    pub fn interval(&self) -> PollInterval {
        *self.interval_tx.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TickEvent> {
        self.events.subscribe()
    }
}

pub struct Scheduler {
    handle: SchedulerHandle,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Scheduler {
    pub fn start(monitor: SharedMonitor, period: PollInterval, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        let (interval_tx, interval_rx) = watch::channel(period);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!("Starting latency polling every {}s", period.secs());
        let task = tokio::spawn(run_loop(
            monitor,
            interval_rx,
            shutdown_rx,
            events.clone(),
            notifiers,
        ));

        Self {
            handle: SchedulerHandle {
                interval_tx: Arc::new(interval_tx),
                events,
            },
            shutdown_tx,
            task,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Stops ticking and waits for the loop to exit. An in-flight tick is
    /// dropped, which kills its ping children.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!("Polling loop panicked: {}", e);
            }
        }
        info!("Latency polling stopped");
    }
}

fn ticker(period: PollInterval, immediate: bool) -> Interval {
    let duration = period.as_duration();
    let mut ticker = if immediate {
        interval(duration)
    } else {
        interval_at(Instant::now() + duration, duration)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run_loop(
    monitor: SharedMonitor,
    mut interval_rx: watch::Receiver<PollInterval>,
    mut shutdown_rx: watch::Receiver<bool>,
    events: broadcast::Sender<TickEvent>,
    notifiers: Vec<Arc<dyn Notifier>>,
) {
    let mut ticks = ticker(*interval_rx.borrow_and_update(), true);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let period = *interval_rx.borrow_and_update();
                info!("Poll interval changed to {}s", period.secs());
                ticks = ticker(period, false);
            }
            _ = ticks.tick() => {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = run_tick(&monitor, &events, &notifiers) => {}
                }
            }
        }
    }
}

async fn run_tick(monitor: &SharedMonitor, events: &broadcast::Sender<TickEvent>, notifiers: &[Arc<dyn Notifier>]) {
    let plan = monitor.read().await.probe_plan();
    let Some(plan) = plan else {
        debug!("No enabled hosts, skipping tick");
        return;
    };

    let readings = plan.run().await;
    let outcome = monitor.write().await.apply_readings(readings);
    debug!(
        "Tick: {} reading(s), overall {}, worst {:?}ms",
        outcome.reading_count, outcome.overall_status, outcome.worst_latency_ms
    );

    dispatch_all(notifiers, &outcome.intents).await;
    // no subscribers is fine
    let _ = events.send(outcome);
}
