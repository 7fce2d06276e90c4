//! Facade crate for the `keel` substrate.
//! Re-exports the domain/kernel primitives and composes service bootstrap.
//! Keep this crate thin: it should compose other crates, not implement
//! lifecycle logic.
//!
//! ## Usage
//! - Generated services depend on `keel` and call [`bootstrap`] before
//!   accepting traffic.
//! - On shutdown, call `registry.close_all().await`.

pub use keel_domain as domain;
pub use keel_http as http;
pub use keel_kernel as kernel;
pub use keel_logger as logger;
pub use keel_store as store;
pub use keel_trace as trace;

use keel_kernel::config::{ConfigError, SettingsLoader};
use keel_kernel::registry::{LifecycleError, ResourceRegistry};
use tracing::info;

/// Errors that abort service startup.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Malformed or missing settings; nothing was initialized.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A resource failed to initialize.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Resolves settings and brings every resource up in startup order.
///
/// The returned registry owns the process singletons; pass it (or an `Arc`
/// around it) into the layers that need resources.
///
/// # Errors
/// [`BootstrapError::Config`] aborts before any resource initializes;
/// [`BootstrapError::Lifecycle`] aborts startup with the failing resource
/// named.
pub async fn bootstrap(loader: SettingsLoader) -> Result<ResourceRegistry, BootstrapError> {
    let settings = loader.load()?;
    let registry = ResourceRegistry::new(settings);
    registry.init_all().await?;

    info!(
        service = %registry.settings().service.name,
        resources = ?registry.initialized(),
        "Bootstrap complete"
    );

    Ok(registry)
}
