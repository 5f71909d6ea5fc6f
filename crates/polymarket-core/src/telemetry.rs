//! Logging setup and the liveness file shared by both binaries.

use chrono::Utc;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Written with the current unix time while a service is healthy.
pub const HEALTH_FILE: &str = "/tmp/healthy";

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `default_filter`. `LOG_FORMAT=json` switches to JSON
/// lines.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

pub fn touch_health_file() {
    touch_health_file_at(Path::new(HEALTH_FILE));
}

/// Best effort: a failed write is only logged.
pub fn touch_health_file_at(path: &Path) {
    if let Err(e) = std::fs::write(path, Utc::now().timestamp().to_string()) {
        debug!(path = %path.display(), error = %e, "Failed to write health file");
    }
}
