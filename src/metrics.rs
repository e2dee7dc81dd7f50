use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const SCORES_CALCULATED: &str = "decision_scores_calculated_total";
pub const RATINGS_UPSERTED: &str = "decision_ratings_upserted_total";
pub const RATINGS_PURGED: &str = "decision_ratings_purged_total";
pub const SCORE_CALCULATION_MS: &str = "decision_score_calculation_ms";

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder once per process and return its handle.
pub fn install() -> anyhow::Result<PrometheusHandle> {
    HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;
            describe();
            Ok::<_, anyhow::Error>(handle)
        })
        .cloned()
}

fn describe() {
    metrics::describe_counter!(SCORES_CALCULATED, "Score calculations persisted");
    metrics::describe_counter!(RATINGS_UPSERTED, "Ratings created or updated");
    metrics::describe_counter!(RATINGS_PURGED, "Ratings removed by cascades");
    metrics::describe_histogram!(SCORE_CALCULATION_MS, "Read-calculate-write latency");
}

/// Returns a router exposing `/metrics` with the Prometheus exposition format.
pub fn router<S>(handle: PrometheusHandle) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}
