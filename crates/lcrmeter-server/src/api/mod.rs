pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// Default number of readings returned by `/api/get_measurements`
pub const DEFAULT_MEASUREMENT_LIMIT: usize = 100;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // Connection
        .route("/connect", post(handlers::connect))
        .route("/disconnect", post(handlers::disconnect))
        .route("/ports", get(handlers::list_ports))
        // Configuration
        .route("/get_config", get(handlers::get_config))
        .route("/set_config", post(handlers::set_config))
        // Measurement feed
        .route("/start_measure", post(handlers::start_measure))
        .route("/stop_measure", post(handlers::stop_measure))
        .route("/get_measurements", get(handlers::get_measurements))
        .route("/export_csv", get(handlers::export_csv));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .with_state(state)
}
