use crate::registry::ResourceRegistry;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Instant;

static START_TIME: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Liveness report consumed by health-check collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime: u64,
    /// Whether the store answered the liveness probe.
    pub store: bool,
}

/// Probes the registry's store resource and assembles a liveness report.
///
/// A store that was never initialized (or is already closed) reports as
/// down without booting it mid-probe.
pub async fn check(registry: &ResourceRegistry) -> Health {
    let store_up = match registry.state(crate::registry::STORE) {
        Some(crate::registry::ResourceState::Ready) => match registry.store().await {
            Ok(database) => database.ping().await.is_ok(),
            Err(_) => false,
        },
        _ => false,
    };

    Health {
        status: if store_up { "up" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime: START_TIME.elapsed().as_secs(),
        store: store_up,
    }
}
