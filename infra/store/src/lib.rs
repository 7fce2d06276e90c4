//! # Store Infrastructure
//!
//! This crate provides a unified interface for initializing and managing the
//! pooled store connection of a generated service.
//!
//! ## Key Features
//! - **Kind Agnostic**: one connection URL selects `sqlite`, `postgres`, or
//!   `mysql` via the runtime `Any` driver.
//! - **Resilient Connectivity**: built-in retry logic for health checks
//!   during engine startup.
//! - **Unit of Work**: bounded-lifetime transaction handles released —
//!   committed or rolled back — on every exit path.
//!
//! ## Example
//!
//! ```rust,no_run
//! use keel_store::{Database, StoreError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StoreError> {
//!     let db = Database::builder()
//!         .url("sqlite::memory:")
//!         .max_connections(1)
//!         .init()
//!         .await?;
//!
//!     let mut uow = db.begin().await?;
//!     sqlx::query("CREATE TABLE item (id TEXT PRIMARY KEY)").execute(&mut *uow).await?;
//!     uow.commit().await?;
//!
//!     db.close().await;
//!     Ok(())
//! }
//! ```

mod error;

pub use error::{StoreError, StoreErrorExt};

use sqlx::any::AnyPoolOptions;
use sqlx::pool::Pool;
use sqlx::{Any, AnyConnection, Connection, Transaction};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// First retry delay for the startup health check; doubles per attempt.
const HEALTH_RETRY_DELAY: Duration = Duration::from_millis(500);

static INSTALL_DRIVERS: Once = Once::new();

/// Inner state of the [`Database`] wrapper.
#[derive(Debug)]
pub struct DatabaseInner {
    pool: Pool<Any>,
    url: String,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        info!(url = %redact_url(&self.url), "Store handle dropped");
    }
}

/// Pooled store connection wrapper providing thread-safe sharing and
/// contextual error handling.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Creates a new [`DatabaseBuilder`].
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Lightweight liveness probe for health-check collaborators.
    ///
    /// # Errors
    /// Returns [`StoreError::Connection`] when no healthy connection can be
    /// obtained from the pool.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.inner.pool.acquire().await.map_err(|e| StoreError::Connection {
            message: e.to_string().into(),
            context: Some("Acquiring connection for ping".into()),
        })?;
        conn.ping().await.map_err(|e| StoreError::Connection {
            message: e.to_string().into(),
            context: Some("Ping".into()),
        })
    }

    /// Opens a scoped unit of work over one pooled connection.
    ///
    /// The handle is exclusive to one logical operation; dropping it without
    /// [`UnitOfWork::commit`] rolls the transaction back before the
    /// connection returns to the pool.
    ///
    /// # Errors
    /// Returns the underlying driver error if no transaction can be started.
    pub async fn begin(&self) -> Result<UnitOfWork, StoreError> {
        let tx = self.inner.pool.begin().await.context("Starting unit of work")?;
        Ok(UnitOfWork { tx })
    }

    /// Closes the pool, waiting for checked-out connections to be returned.
    /// Safe to call multiple times; subsequent calls are no-ops.
    pub async fn close(&self) {
        if !self.inner.pool.is_closed() {
            info!(url = %redact_url(&self.inner.url), "Closing store connection pool");
        }
        self.inner.pool.close().await;
    }

    /// Whether the pool has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }
}

impl Deref for Database {
    type Target = Pool<Any>;

    fn deref(&self) -> &Self::Target {
        &self.inner.pool
    }
}

/// A bounded-lifetime transaction handle scoped to one logical operation.
///
/// Not `Clone`: the handle must never be shared across concurrently
/// executing operations. Every exit path releases it — explicitly via
/// [`commit`]/[`rollback`], or implicitly by rollback-on-drop.
///
/// [`commit`]: UnitOfWork::commit
/// [`rollback`]: UnitOfWork::rollback
pub struct UnitOfWork {
    tx: Transaction<'static, Any>,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork").finish_non_exhaustive()
    }
}

impl UnitOfWork {
    /// Commits the unit of work.
    ///
    /// # Errors
    /// Returns the underlying driver error; the transaction is rolled back.
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.context("Committing unit of work")
    }

    /// Rolls the unit of work back explicitly.
    ///
    /// # Errors
    /// Returns the underlying driver error.
    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.context("Rolling back unit of work")
    }
}

impl Deref for UnitOfWork {
    type Target = AnyConnection;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

impl DerefMut for UnitOfWork {
    fn deref_mut(&mut self) -> &mut AnyConnection {
        &mut self.tx
    }
}

/// A fluent builder for configuring and establishing the store connection.
#[must_use = "builders do nothing unless you call .init()"]
#[derive(Debug)]
pub struct DatabaseBuilder {
    url: Option<String>,
    max_connections: u32,
    acquire_timeout: Duration,
    health_retries: u32,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            health_retries: 3,
        }
    }
}

impl DatabaseBuilder {
    /// Creates a new [`DatabaseBuilder`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connection URL (e.g. `postgres://svc@db:5432/orders`).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Caps the number of pooled connections.
    pub const fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Bounds how long an operation waits for a pooled connection.
    pub const fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Number of startup health-check attempts before giving up.
    pub const fn health_retries(mut self, retries: u32) -> Self {
        self.health_retries = retries;
        self
    }

    /// Consumes the builder and attempts to establish the connection pool.
    ///
    /// # Process
    /// 1. **Validation**: ensures a connection URL is provided.
    /// 2. **Pool Construction**: builds the pool with the configured bounds.
    /// 3. **Resilience**: pings the store up to the configured number of
    ///    attempts, retrying with exponential backoff (starting at 500ms).
    ///
    /// # Errors
    /// * [`StoreError::Validation`] if required parameters are missing.
    /// * [`StoreError::Connection`] if the pool fails to connect or remains
    ///   unhealthy after retries.
    #[instrument(skip(self), fields(url = self.url.as_deref().map(redact_url)))]
    pub async fn init(self) -> Result<Database, StoreError> {
        let url = self.url.filter(|u| !u.trim().is_empty()).ok_or(StoreError::Validation {
            message: "Connection URL is required".into(),
            context: None,
        })?;

        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let pool = AnyPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&url)
            .await
            .map_err(|e| StoreError::Connection {
                message: e.to_string().into(),
                context: Some("Initializing pool".into()),
            })?;

        // Connectivity & health check with retries
        let mut delay = HEALTH_RETRY_DELAY;
        let attempts = self.health_retries.max(1);
        for attempt in 1..=attempts {
            let healthy = match pool.acquire().await {
                Ok(mut conn) => conn.ping().await.is_ok(),
                Err(_) => false,
            };
            if healthy {
                break;
            }
            if attempt == attempts {
                return Err(StoreError::Connection {
                    message: "Unhealthy after retries".into(),
                    context: Some(redact_url(&url).into()),
                });
            }
            warn!(attempt, ?delay, "Store not ready, retrying...");
            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        info!(url = %redact_url(&url), max_connections = self.max_connections, "Store connection established");

        Ok(Database { inner: Arc::new(DatabaseInner { pool, url }) })
    }
}

/// Masks the password portion of a connection URL for log output.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_owned();
    };
    let Some((credentials, host)) = rest.split_once('@') else {
        return url.to_owned();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_masks_password_only() {
        assert_eq!(
            redact_url("postgres://svc:secret@db:5432/orders"),
            "postgres://svc:***@db:5432/orders"
        );
        assert_eq!(redact_url("postgres://svc@db:5432/orders"), "postgres://svc@db:5432/orders");
        assert_eq!(redact_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn builder_defaults() {
        let builder = Database::builder();
        assert_eq!(builder.max_connections, 10);
        assert_eq!(builder.health_retries, 3);
        assert!(builder.url.is_none());
    }
}
