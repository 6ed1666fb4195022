use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use lib_station::{
    BrokerClient, DecodeError, DiscoveryEncoder, IngestOutcome, Pipeline, QoS, RawObservation, SchemaRegistry,
    TransportError, clear_discovery,
};

/// Removes every sensor of the station from the discovery consumer.
pub trait DeviceClearer: Send + Sync {
    fn clear_all(&self) -> Result<usize, TransportError>;
}

/// Clears discovery over the live broker connection.
pub struct BrokerClearer<C> {
    pub client: C,
    pub encoder: DiscoveryEncoder,
    pub registry: Arc<SchemaRegistry>,
    pub qos: QoS,
}

impl<C: BrokerClient> DeviceClearer for BrokerClearer<C> {
    fn clear_all(&self) -> Result<usize, TransportError> {
        clear_discovery(&self.client, &self.encoder, &self.registry, self.qos)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub station_password: Arc<str>,
    /// `None` when MQTT is disabled.
    pub clearer: Option<Arc<dyn DeviceClearer>>,
}

#[derive(Debug)]
pub enum AppError {
    BadPassword,
    InvalidAction,
    Decode(DecodeError),
    MqttDisabled,
    Clear(TransportError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadPassword => (StatusCode::UNAUTHORIZED, "Bad password".to_string()),
            AppError::InvalidAction => (StatusCode::BAD_REQUEST, "Invalid action".to_string()),
            AppError::Decode(e) => {
                warn!(error = %e, "Rejected observation");
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::MqttDisabled => (StatusCode::SERVICE_UNAVAILABLE, "MQTT is not enabled".to_string()),
            AppError::Clear(e) => {
                error!(error = %e, "Failed to delete devices");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, message).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/observe", get(observe_handler))
        .route("/api/v1/mqtt/homeassistant/delete-all-devices", post(delete_all_devices_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /api/v1/observe?PASSWORD=..&action=updateraw&<fields>`, as sent by the station.
/// A repeated parameter counts with its first value.
async fn observe_handler(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<&'static str, AppError> {
    let params = params.as_slice();
    if params.raw("PASSWORD") != Some(&*state.station_password) {
        return Err(AppError::BadPassword);
    }
    if params.raw("action") != Some("updateraw") {
        return Err(AppError::InvalidAction);
    }

    match state.pipeline.ingest(params).map_err(AppError::Decode)? {
        IngestOutcome::Published { delivered } => {
            info!(delivered, "Observation received");
        }
        IngestOutcome::Dropped(_) => {}
    }
    Ok("OK")
}

async fn delete_all_devices_handler(State(state): State<AppState>) -> Result<&'static str, AppError> {
    let clearer = state.clearer.as_ref().ok_or(AppError::MqttDisabled)?;
    let cleared = clearer.clear_all().map_err(AppError::Clear)?;
    info!(cleared, "Deleted all devices");
    Ok("OK")
}
