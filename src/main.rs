//! Decision Compass: binary entrypoint
//! Boots the Axum HTTP server with a memory-backed store.

use decision_compass::{app, telemetry, AppConfig};
use shuttle_axum::ShuttleAxum;
use tracing::info;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    telemetry::init_tracing();

    let config = AppConfig::load()?;
    info!(
        frontend_url = ?config.frontend_url,
        metrics_routes = config.metrics_routes,
        rating_min = config.rating_scale.min,
        rating_max = config.rating_scale.max,
        "config loaded"
    );

    Ok(app(config).into())
}
