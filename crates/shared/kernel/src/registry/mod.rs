//! Resource registry: named process singletons with coordinated lifecycle.
//!
//! Resources initialize lazily, exactly once, in a fixed dependency order —
//! the emission path (logger, tracer) comes up before the resources that
//! emit through it (store, HTTP client) — and tear down in the exact
//! reverse of the order they actually initialized in.

mod slot;

pub use slot::ResourceState;

use keel_domain::config::Settings;
use keel_http::HttpClient;
use keel_logger::{Logger, LoggerError, OtlpTracer, init_otlp_tracer, parse_level};
use keel_store::Database;
use parking_lot::Mutex;
use slot::Slot;
use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Resource name: the logging subscriber.
pub const LOGGER: &str = "logger";
/// Resource name: the span exporter.
pub const TRACER: &str = "tracer";
/// Resource name: the store connection pool.
pub const STORE: &str = "store";
/// Resource name: the outbound HTTP client.
pub const HTTP: &str = "http";

/// Errors raised by resource initialization and shutdown.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// A resource failed to construct or initialize. Fatal at startup.
    #[error("Resource '{resource}' failed to initialize{}: {message}", format_context(.context))]
    Init {
        resource: &'static str,
        message: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// The registry has been shut down; no further acquisition is possible.
    #[error("Resource '{resource}' is closed")]
    Closed { resource: &'static str },
}

impl LifecycleError {
    fn init(resource: &'static str, err: impl Display) -> Self {
        Self::Init { resource, message: err.to_string().into(), context: None }
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

/// The span-exporter resource. Disabled configurations still participate in
/// lifecycle ordering so the startup/shutdown contract stays uniform.
#[derive(Debug)]
pub enum Tracer {
    Disabled,
    Otlp(OtlpTracer),
}

impl Tracer {
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Otlp(_))
    }

    fn close(&self) -> Result<(), LoggerError> {
        match self {
            Self::Disabled => Ok(()),
            Self::Otlp(tracer) => tracer.shutdown(),
        }
    }
}

/// Owns the process singletons and their lifecycle.
///
/// Other components hold the registry by reference (or behind an `Arc`) and
/// borrow resources from it; ownership never leaves the registry. Accessors
/// construct and initialize on first call with an at-most-once guarantee
/// per resource; steady-state access after readiness takes no lock.
#[derive(Debug)]
pub struct ResourceRegistry {
    settings: Settings,
    logger: Slot<Logger>,
    tracer: Slot<Tracer>,
    store: Slot<Database>,
    http: Slot<HttpClient>,
    init_order: Mutex<Vec<&'static str>>,
}

impl ResourceRegistry {
    /// Creates a registry over resolved settings. No resource is touched
    /// until first access or [`ResourceRegistry::init_all`].
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            logger: Slot::new(LOGGER),
            tracer: Slot::new(TRACER),
            store: Slot::new(STORE),
            http: Slot::new(HTTP),
            init_order: Mutex::new(Vec::new()),
        }
    }

    /// The settings this registry was built from.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The logging subscriber singleton.
    ///
    /// If the embedding application (or a test harness) already installed a
    /// global subscriber, the resource attaches to it instead of failing.
    ///
    /// # Errors
    /// [`LifecycleError::Init`] on invalid logging configuration,
    /// [`LifecycleError::Closed`] after shutdown.
    pub async fn logger(&self) -> Result<Arc<Logger>, LifecycleError> {
        self.logger
            .get_or_init(|| async {
                let logger = build_logger(&self.settings)?;
                self.init_order.lock().push(LOGGER);
                info!(resource = LOGGER, "Resource initialized");
                Ok(logger)
            })
            .await
    }

    /// The span-exporter singleton. Initializes the logger first so the
    /// exporter's own diagnostics have somewhere to go.
    ///
    /// # Errors
    /// [`LifecycleError::Init`] if the OTLP pipeline fails to come up,
    /// [`LifecycleError::Closed`] after shutdown.
    pub async fn tracer(&self) -> Result<Arc<Tracer>, LifecycleError> {
        self.logger().await?;
        self.tracer
            .get_or_init(|| async {
                let tracer = if self.settings.tracing.enabled {
                    init_otlp_tracer(
                        &self.settings.service.name,
                        self.settings.tracing.endpoint.as_deref(),
                    )
                    .map(Tracer::Otlp)
                    .map_err(|e| LifecycleError::init(TRACER, e))?
                } else {
                    Tracer::Disabled
                };
                self.init_order.lock().push(TRACER);
                info!(resource = TRACER, enabled = tracer.is_enabled(), "Resource initialized");
                Ok(tracer)
            })
            .await
    }

    /// The store connection pool singleton. The emission path (logger,
    /// tracer) initializes first.
    ///
    /// # Errors
    /// [`LifecycleError::Init`] when the pool cannot be established,
    /// [`LifecycleError::Closed`] after shutdown.
    pub async fn store(&self) -> Result<Arc<Database>, LifecycleError> {
        self.logger().await?;
        self.tracer().await?;
        self.store
            .get_or_init(|| async {
                let store = &self.settings.store;
                let database = Database::builder()
                    .url(store.connection_url())
                    .max_connections(store.max_connections)
                    .acquire_timeout(store.acquire_timeout())
                    .health_retries(store.health_retries)
                    .init()
                    .await
                    .map_err(|e| LifecycleError::init(STORE, e))?;
                self.init_order.lock().push(STORE);
                info!(resource = STORE, "Resource initialized");
                Ok(database)
            })
            .await
    }

    /// The outbound HTTP client singleton. The emission path initializes
    /// first.
    ///
    /// # Errors
    /// [`LifecycleError::Init`] on invalid client configuration,
    /// [`LifecycleError::Closed`] after shutdown.
    pub async fn http(&self) -> Result<Arc<HttpClient>, LifecycleError> {
        self.logger().await?;
        self.tracer().await?;
        self.http
            .get_or_init(|| async {
                let cfg = &self.settings.http;
                let mut builder = HttpClient::builder().timeout(cfg.timeout());
                if let Some(base_url) = &cfg.base_url {
                    builder = builder.base_url(base_url);
                }
                if let Some(api_key) = &cfg.api_key {
                    builder = builder.api_key(api_key);
                }
                if let Some(user_agent) = &cfg.user_agent {
                    builder = builder.user_agent(user_agent);
                }
                let client = builder.init().map_err(|e| LifecycleError::init(HTTP, e))?;
                self.init_order.lock().push(HTTP);
                info!(resource = HTTP, "Resource initialized");
                Ok(client)
            })
            .await
    }

    /// Lifecycle state of a resource by name; `None` for unknown names.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<ResourceState> {
        match name {
            LOGGER => Some(self.logger.state()),
            TRACER => Some(self.tracer.state()),
            STORE => Some(self.store.state()),
            HTTP => Some(self.http.state()),
            _ => None,
        }
    }

    /// Names of the resources that completed initialization, in order.
    #[must_use]
    pub fn initialized(&self) -> Vec<&'static str> {
        self.init_order.lock().clone()
    }

    /// Initializes every resource in the fixed startup order, for bootstrap
    /// code that wants everything up before accepting traffic.
    ///
    /// # Errors
    /// The first [`LifecycleError::Init`] encountered; startup aborts.
    pub async fn init_all(&self) -> Result<(), LifecycleError> {
        self.logger().await?;
        self.tracer().await?;
        self.store().await?;
        self.http().await?;
        Ok(())
    }

    /// Tears down every initialized resource in the exact reverse of the
    /// order it initialized in.
    ///
    /// Each close is bounded by the configured shutdown grace so a stuck
    /// resource cannot hang the process; a failed close is logged and
    /// teardown continues with the remaining resources. Subsequent calls
    /// are no-ops, and no resource can be acquired afterwards.
    pub async fn close_all(&self) {
        let order = std::mem::take(&mut *self.init_order.lock());
        for name in order.into_iter().rev() {
            self.close_resource(name).await;
        }

        // Never-initialized slots still transition to Closed so late
        // acquisition fails instead of booting resources mid-shutdown.
        for slot_name in [HTTP, STORE, TRACER, LOGGER] {
            self.mark_closed(slot_name);
        }
        info!("Resource registry closed");
    }

    async fn close_resource(&self, name: &'static str) {
        let grace = self.settings.shutdown.grace();
        match name {
            HTTP => {
                // The client has no wire-level teardown; dropping the last
                // handle releases its pooled connections.
                if self.http.mark_closed() {
                    debug!(resource = HTTP, "Resource closed");
                }
            }
            STORE => {
                if self.store.mark_closed()
                    && let Some(database) = self.store.ready()
                {
                    match timeout(grace, database.close()).await {
                        Ok(()) => debug!(resource = STORE, "Resource closed"),
                        Err(_) => {
                            error!(resource = STORE, ?grace, "Close timed out, continuing teardown");
                        }
                    }
                }
            }
            TRACER => {
                if self.tracer.mark_closed()
                    && let Some(tracer) = self.tracer.ready()
                {
                    // Provider shutdown flushes synchronously; bound it off
                    // the async worker.
                    let tracer = Arc::clone(tracer);
                    let flush = tokio::task::spawn_blocking(move || tracer.close());
                    match timeout(grace, flush).await {
                        Ok(Ok(Ok(()))) => debug!(resource = TRACER, "Resource closed"),
                        Ok(Ok(Err(e))) => {
                            warn!(resource = TRACER, error = %e, "Close failed, continuing teardown");
                        }
                        Ok(Err(e)) => {
                            warn!(resource = TRACER, error = %e, "Close task failed, continuing teardown");
                        }
                        Err(_) => {
                            error!(resource = TRACER, ?grace, "Close timed out, continuing teardown");
                        }
                    }
                }
            }
            LOGGER => {
                if self.logger.mark_closed()
                    && let Some(logger) = self.logger.ready()
                {
                    logger.flush();
                    logger.close();
                    debug!(resource = LOGGER, "Resource closed");
                }
            }
            _ => {}
        }
    }

    fn mark_closed(&self, name: &'static str) {
        match name {
            LOGGER => self.logger.mark_closed(),
            TRACER => self.tracer.mark_closed(),
            STORE => self.store.mark_closed(),
            HTTP => self.http.mark_closed(),
            _ => false,
        };
    }
}

/// Builds the logging resource from settings, attaching to an externally
/// installed subscriber when one exists.
fn build_logger(settings: &Settings) -> Result<Logger, LifecycleError> {
    let logging = &settings.logging;
    let level = parse_level(&logging.level).map_err(|e| LifecycleError::init(LOGGER, e))?;

    let mut builder = Logger::builder()
        .name(&settings.service.name)
        .console(logging.console)
        .json(logging.json)
        .level(level);
    if let Some(dir) = &logging.dir {
        builder = builder.path(dir).max_files(logging.max_files);
    }

    match builder.init() {
        Ok(logger) => Ok(logger),
        Err(LoggerError::Subscriber { .. }) => {
            debug!("Global subscriber already installed, attaching to it");
            Ok(Logger::external())
        }
        Err(e) => Err(LifecycleError::init(LOGGER, e)),
    }
}
