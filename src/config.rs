// src/config.rs
//! Runtime configuration: optional TOML file + env overrides.
//!
//! Resolution order:
//! 1) $DECISION_CONFIG_PATH (must exist)
//! 2) config/decision.toml
//! 3) built-in defaults
//!
//! Then `FRONTEND_URL` and `METRICS_ROUTES` override whatever the file said.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/decision.toml";
pub const ENV_CONFIG_PATH: &str = "DECISION_CONFIG_PATH";
pub const ENV_FRONTEND_URL: &str = "FRONTEND_URL";
pub const ENV_METRICS_ROUTES: &str = "METRICS_ROUTES";

fn default_rating_min() -> f64 {
    0.0
}
fn default_rating_max() -> f64 {
    10.0
}

/// Inclusive bounds a rating value must fall into.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RatingScale {
    #[serde(default = "default_rating_min")]
    pub min: f64,
    #[serde(default = "default_rating_max")]
    pub max: f64,
}

impl Default for RatingScale {
    fn default() -> Self {
        Self {
            min: default_rating_min(),
            max: default_rating_max(),
        }
    }
}

impl RatingScale {
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    fn sanitize(&mut self) {
        if !self.min.is_finite() || self.min < 0.0 {
            self.min = default_rating_min();
        }
        if !self.max.is_finite() || self.max < 0.0 {
            self.max = default_rating_max();
        }
        if self.min > self.max {
            // swap to keep a valid interval
            std::mem::swap(&mut self.min, &mut self.max);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Single allowed CORS origin; permissive CORS when unset.
    pub frontend_url: Option<String>,
    /// Mount `/metrics`.
    pub metrics_routes: bool,
    pub rating_scale: RatingScale,
}

impl AppConfig {
    /// Load from an explicit TOML file, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.finish();
        Ok(cfg)
    }

    /// Load using env var + fallbacks (see module docs).
    pub fn load() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        let mut cfg = AppConfig::default();
        cfg.finish();
        Ok(cfg)
    }

    fn finish(&mut self) {
        if let Ok(url) = std::env::var(ENV_FRONTEND_URL) {
            let url = url.trim();
            if !url.is_empty() {
                self.frontend_url = Some(url.to_string());
            }
        }
        if let Some(on) = parse_flag(std::env::var(ENV_METRICS_ROUTES).ok()) {
            self.metrics_routes = on;
        }
        self.frontend_url = self
            .frontend_url
            .take()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        self.rating_scale.sanitize();
    }
}

fn parse_flag(raw: Option<String>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
