// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod outcome;
pub mod scoring;
pub mod service;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::error::{Error, Result};
pub use crate::scoring::{calculate, ScoreReport, ScoredAlternative, ScoringError};

/// Build the full in-process app (memory-backed) from an already loaded config.
pub fn app(config: AppConfig) -> axum::Router {
    router(AppState::in_memory(config))
}
