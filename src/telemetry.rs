//! Tracing setup and log hygiene helpers.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_JSON: &str = "DECISION_LOG_JSON";

/// Install a global subscriber. No-op if the hosting runtime already set one.
///
/// Filter comes from `RUST_LOG`, defaulting to `decision_compass=info,warn`.
/// `DECISION_LOG_JSON=1` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("decision_compass=info,warn"));

    let json = std::env::var(ENV_LOG_JSON).ok().is_some_and(|v| v == "1");

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Short, stable fingerprint of a user id. Never log the raw id.
pub fn anon_user(user: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(user.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_user_is_stable_and_short() {
        let a = anon_user("user-42");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_user("user-42"));
        assert_ne!(a, anon_user("user-43"));
    }
}
