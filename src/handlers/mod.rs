use crate::error::MonitorError;
use crate::models::config::{NotificationSettings, PollInterval, POLL_INTERVAL_OPTIONS};
use crate::models::host::{AddHostRequest, Host};
use crate::models::metrics::{HistorySample, LatencyStatus, Reading, TierDuration};
use crate::services::monitor::SharedMonitor;
use crate::services::scheduler::SchedulerHandle;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use uuid::Uuid;

// State
#[derive(Clone)]
pub struct AppState {
    pub monitor: SharedMonitor,
    pub scheduler: SchedulerHandle,
}

pub fn create_app(monitor: SharedMonitor, scheduler: SchedulerHandle) -> Router {
    let state = AppState { monitor, scheduler };

    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/history", get(api_history))
        .route("/api/history/tiers", get(api_tiers))
        .route("/api/hosts", get(list_hosts).post(add_host))
        .route("/api/hosts/refresh", post(refresh_hosts))
        .route("/api/hosts/:id", delete(remove_host))
        .route("/api/hosts/:id/toggle", post(toggle_host))
        .route("/api/settings", get(get_settings).put(update_settings))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = match &self {
            MonitorError::HostNotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::InvalidHost(_) | MonitorError::InvalidPollInterval(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    overall_status: LatencyStatus,
    worst_latency_ms: Option<f64>,
    readings: Vec<ReadingView>,
}

#[derive(Debug, Serialize)]
struct ReadingView {
    #[serde(flatten)]
    reading: Reading,
    display_latency: String,
}

async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    let monitor = state.monitor.read().await;

    let readings = monitor
        .sorted_readings()
        .into_iter()
        .map(|reading| ReadingView {
            display_latency: reading.display_latency(),
            reading,
        })
        .collect();

    Json(StatusResponse {
        overall_status: monitor.overall_status(),
        worst_latency_ms: monitor.worst_latency(),
        readings,
    })
}

#[derive(Deserialize)]
struct HistoryQuery {
    max_points: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    samples: Vec<HistorySample>,
    count: usize,
}

async fn api_history(State(state): State<AppState>, Query(params): Query<HistoryQuery>) -> impl IntoResponse {
    let monitor = state.monitor.read().await;
    let max_points = params.max_points.unwrap_or_else(|| monitor.default_history_points());
    let samples = monitor.downsampled_history(max_points);

    Json(HistoryResponse {
        count: samples.len(),
        samples,
    })
}

#[derive(Debug, Serialize)]
struct TiersResponse {
    tiers: Vec<TierDuration>,
    total_duration_secs: f64,
}

async fn api_tiers(State(state): State<AppState>) -> impl IntoResponse {
    let monitor = state.monitor.read().await;
    Json(TiersResponse {
        tiers: monitor.time_in_each_tier(),
        total_duration_secs: monitor.total_history_duration(),
    })
}

async fn list_hosts(State(state): State<AppState>) -> Json<Vec<Host>> {
    Json(state.monitor.read().await.hosts().to_vec())
}

async fn add_host(
    State(state): State<AppState>,
    Json(req): Json<AddHostRequest>,
) -> Result<(StatusCode, Json<Host>), MonitorError> {
    let host = state.monitor.write().await.add_host(&req.address, &req.label).await?;
    Ok((StatusCode::CREATED, Json(host)))
}

async fn remove_host(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Host>, MonitorError> {
    let host = state.monitor.write().await.remove_host(id).await?;
    Ok(Json(host))
}

async fn toggle_host(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Host>, MonitorError> {
    let host = state.monitor.write().await.toggle_host(id).await?;
    Ok(Json(host))
}

#[derive(Deserialize)]
struct RefreshQuery {
    #[serde(default)]
    force: bool,
}

/// Rebuilds gateway hosts from the discovery cache while it is fresh;
/// `?force=true` re-reads the routing table.
async fn refresh_hosts(State(state): State<AppState>, Query(query): Query<RefreshQuery>) -> Json<Vec<Host>> {
    let mut monitor = state.monitor.write().await;
    monitor.refresh_hosts(query.force).await;
    Json(monitor.hosts().to_vec())
}

#[derive(Debug, Serialize)]
struct SettingsResponse {
    poll_interval_secs: u64,
    poll_interval_options: [u64; 5],
    #[serde(flatten)]
    notifications: NotificationSettings,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsUpdate {
    poll_interval_secs: Option<u64>,
    notify_on_poor: Option<bool>,
    notify_on_offline: Option<bool>,
    notify_on_recovery: Option<bool>,
    sound: Option<bool>,
}

async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    let monitor = state.monitor.read().await;
    Json(SettingsResponse {
        poll_interval_secs: monitor.poll_interval().secs(),
        poll_interval_options: POLL_INTERVAL_OPTIONS,
        notifications: monitor.notification_settings(),
    })
}

async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsResponse>, MonitorError> {
    let interval = update.poll_interval_secs.map(PollInterval::try_from).transpose()?;

    let mut monitor = state.monitor.write().await;

    let mut settings = monitor.notification_settings();
    settings.notify_on_poor = update.notify_on_poor.unwrap_or(settings.notify_on_poor);
    settings.notify_on_offline = update.notify_on_offline.unwrap_or(settings.notify_on_offline);
    settings.notify_on_recovery = update.notify_on_recovery.unwrap_or(settings.notify_on_recovery);
    settings.sound = update.sound.unwrap_or(settings.sound);
    monitor.set_notification_settings(settings);

    if let Some(interval) = interval {
        monitor.set_poll_interval(interval);
        state.scheduler.set_interval(interval);
    }

    Ok(Json(SettingsResponse {
        poll_interval_secs: monitor.poll_interval().secs(),
        poll_interval_options: POLL_INTERVAL_OPTIONS,
        notifications: monitor.notification_settings(),
    }))
}
