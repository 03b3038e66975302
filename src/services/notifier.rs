use crate::error::Result;
use crate::models::config::{AlertConfig, NotificationSettings, Thresholds};
use crate::models::metrics::LatencyStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Degraded,
    Offline,
    Recovered,
}

/// What to tell the user. Delivery belongs to a [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub kind: IntentKind,
    pub title: String,
    pub body: String,
    pub sound: bool,
}

impl NotificationIntent {
    fn new(kind: IntentKind, title: &str, body: String, settings: &NotificationSettings) -> Self {
        Self {
            kind,
            title: title.to_string(),
            body,
            sound: settings.sound,
        }
    }
}

/// Edge-triggered notification policy for an overall-status transition.
pub fn evaluate(
    previous: LatencyStatus,
    current: LatencyStatus,
    settings: &NotificationSettings,
    thresholds: &Thresholds,
) -> Vec<NotificationIntent> {
    let mut intents = Vec::new();
    if previous == current {
        return intents;
    }

    if current == LatencyStatus::Poor && settings.notify_on_poor && !previous.is_problematic() {
        intents.push(NotificationIntent::new(
            IntentKind::Degraded,
            "High Network Latency",
            format!(
                "Network latency has exceeded {}ms",
                thresholds.normalized().fair_ms
            ),
            settings,
        ));
    } else if current == LatencyStatus::Offline
        && settings.notify_on_offline
        && previous != LatencyStatus::Offline
    {
        intents.push(NotificationIntent::new(
            IntentKind::Offline,
            "Network Offline",
            "Unable to reach monitored hosts".to_string(),
            settings,
        ));
    }

    if settings.notify_on_recovery
        && previous.is_problematic()
        && !current.is_problematic()
        && current != LatencyStatus::Unknown
    {
        intents.push(NotificationIntent::new(
            IntentKind::Recovered,
            "Network Recovered",
            "Network latency has returned to normal".to_string(),
            settings,
        ));
    }

    intents
}

/// Delivery channel for notification intents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, intent: &NotificationIntent) -> Result<()>;
}

/// Writes intents to the application log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn dispatch(&self, intent: &NotificationIntent) -> Result<()> {
        match intent.kind {
            IntentKind::Recovered => info!("{}: {}", intent.title, intent.body),
            IntentKind::Degraded | IntentKind::Offline => warn!("{}: {}", intent.title, intent.body),
        }
        Ok(())
    }
}

/// POSTs each intent as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("latency-monitor/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn dispatch(&self, intent: &NotificationIntent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(intent)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub fn build_notifiers(alerts: &AlertConfig) -> Result<Vec<Arc<dyn Notifier>>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if alerts.log_intents {
        notifiers.push(Arc::new(LogNotifier));
    }
    if let Some(url) = alerts.webhook_url.as_deref().filter(|url| !url.is_empty()) {
        info!("Webhook alerts enabled: {}", url);
        notifiers.push(Arc::new(WebhookNotifier::new(
            url,
            Duration::from_secs(alerts.webhook_timeout_secs),
        )?));
    }

    Ok(notifiers)
}

/// Hands every intent to every notifier. Failures are logged and skipped.
pub async fn dispatch_all(notifiers: &[Arc<dyn Notifier>], intents: &[NotificationIntent]) {
    for intent in intents {
        for notifier in notifiers {
            if let Err(e) = notifier.dispatch(intent).await {
                warn!("Failed to deliver {:?} notification: {}", intent.kind, e);
            }
        }
    }
}
