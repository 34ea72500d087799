use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lcrmeter_core::config::{ConfigUpdate, MeasurementConfig};
use lcrmeter_core::export::export_file_name;
use lcrmeter_core::measurement::Measurement;
use lcrmeter_core::meter::{CommandOutcome, ConnectOutcome, LcrMeter};
use lcrmeter_core::poller::PollState;
use lcrmeter_core::protocol::{list_ports as enumerate_ports, PortInfo};
use lcrmeter_core::simulator::SimulatedMeter;

use super::error::ApiError;
use super::DEFAULT_MEASUREMENT_LIMIT;
use crate::{AppState, SIMULATOR_PORT};

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub port: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeasurementQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connected: bool,
    pub port: Option<String>,
    pub polling: PollState,
    pub buffered: usize,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

// Run device I/O on the blocking pool
async fn with_meter<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&LcrMeter) -> T + Send + 'static,
    T: Send + 'static,
{
    let meter = state.meter.clone();
    Ok(tokio::task::spawn_blocking(move || f(&meter)).await?)
}

pub async fn connect(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<ConnectOutcome>, ApiError> {
    let port = match request.port.map(|p| p.trim().to_string()) {
        Some(port) if !port.is_empty() => port,
        _ => {
            return Ok(Json(ConnectOutcome {
                success: false,
                message: "No port selected".to_string(),
                device: None,
            }))
        }
    };

    let use_simulator = state.simulator && port == SIMULATOR_PORT;
    let outcome = with_meter(&state, move |meter| {
        if use_simulator {
            meter.connect_channel(SIMULATOR_PORT, Box::new(SimulatedMeter::new()))
        } else {
            meter.connect(&port)
        }
    })
    .await?;
    Ok(Json(outcome))
}

pub async fn disconnect(State(state): State<AppState>) -> Result<Json<CommandOutcome>, ApiError> {
    Ok(Json(with_meter(&state, |meter| meter.disconnect()).await?))
}

pub async fn list_ports(State(state): State<AppState>) -> Result<Json<Vec<PortInfo>>, ApiError> {
    let mut ports = tokio::task::spawn_blocking(enumerate_ports).await?;
    if state.simulator {
        ports.push(PortInfo::bare(SIMULATOR_PORT.to_string()));
    }
    Ok(Json(ports))
}

pub async fn get_config(State(state): State<AppState>) -> Json<MeasurementConfig> {
    Json(state.meter.get_config())
}

pub async fn set_config(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let Value::Object(fields) = body else {
        return Err(ApiError::BadRequest(
            "Configuration must be a JSON object".to_string(),
        ));
    };
    let update = ConfigUpdate::from_json(&fields);
    with_meter(&state, move |meter| meter.set_config(&update)).await?;
    Ok(Json(CommandOutcome::ok("Configuration updated")))
}

pub async fn start_measure(State(state): State<AppState>) -> Json<CommandOutcome> {
    state.meter.clear_measurements();
    state.meter.start_measurement();
    Json(CommandOutcome::ok("Measurement started"))
}

pub async fn stop_measure(State(state): State<AppState>) -> Json<CommandOutcome> {
    state.meter.stop_measurement();
    Json(CommandOutcome::ok("Measurement stopped"))
}

pub async fn get_measurements(
    State(state): State<AppState>,
    Query(query): Query<MeasurementQuery>,
) -> Json<Vec<Measurement>> {
    let limit = query.limit.unwrap_or(DEFAULT_MEASUREMENT_LIMIT);
    Json(state.meter.list_measurements(limit))
}

pub async fn export_csv(State(state): State<AppState>) -> Response {
    match state.meter.export_csv() {
        Some(csv) => {
            let file_name = export_file_name(chrono::Local::now());
            tracing::info!(file = %file_name, bytes = csv.len(), "exporting measurements");
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{file_name}\""),
                    ),
                ],
                csv,
            )
                .into_response()
        }
        None => Json(CommandOutcome::failed("No data to export")).into_response(),
    }
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    // Port status waits behind any exchange in flight
    let health = with_meter(&state, |meter| {
        let (tx_bytes, rx_bytes) = meter.transport().get_counters();
        HealthResponse {
            status: "ok",
            connected: meter.is_connected(),
            port: meter.transport().port_name(),
            polling: meter.poll_state(),
            buffered: meter.feed().len(),
            tx_bytes,
            rx_bytes,
        }
    })
    .await?;
    Ok(Json(health))
}
