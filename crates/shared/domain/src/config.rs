use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Top-level resolved settings shared across a generated service.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettingsInner {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub tracing: TracingConfig,
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub shutdown: ShutdownConfig,
}

/// Thin Arc-wrapped settings for inexpensive cloning into subsystems.
///
/// Resolved once per process; re-resolving produces a new instance, the
/// existing one is never mutated in place.
#[derive(Default, Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(flatten, default)]
    inner: Arc<SettingsInner>,
}

impl Settings {
    #[must_use]
    pub fn new(inner: SettingsInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

impl Deref for Settings {
    type Target = SettingsInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Settings {
    fn deref_mut(&mut self) -> &mut SettingsInner {
        Arc::make_mut(&mut self.inner)
    }
}

/// Service identity and listen address.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub host: IpAddr,
    pub port: u16,
}

/// Logging output configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace`, `debug`, `info`, `warn`/`warning`, `error`, `off`.
    pub level: String,
    pub console: bool,
    pub json: bool,
    /// When set, a rolling file appender writes under this directory.
    pub dir: Option<PathBuf>,
    pub max_files: usize,
}

/// Span-export configuration. The exporter honors the standard OTEL
/// environment variables when `endpoint` is unset.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
}

/// Store backend selector, matching the drivers the pool can dispatch to.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

impl StoreKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Sqlite => 0,
            Self::Postgres => 5432,
            Self::Mysql => 3306,
        }
    }
}

/// Store connection configuration.
///
/// Either a full connection `url` or the field group (kind, credentials,
/// host, port, database). A set `url` always wins over the group.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub health_retries: u32,
}

impl StoreConfig {
    /// Builds the effective connection URL from the group, unless an
    /// explicit `url` override is present.
    #[must_use]
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        match self.kind {
            StoreKind::Sqlite => self
                .database
                .as_ref()
                .map_or_else(|| "sqlite::memory:".to_owned(), |db| format!("sqlite://{db}")),
            kind => {
                let credentials = match (&self.username, &self.password) {
                    (Some(user), Some(pass)) => format!("{user}:{pass}@"),
                    (Some(user), None) => format!("{user}@"),
                    _ => String::new(),
                };
                format!(
                    "{}://{}{}:{}/{}",
                    kind.as_str(),
                    credentials,
                    self.host.as_deref().unwrap_or("localhost"),
                    self.port.unwrap_or_else(|| kind.default_port()),
                    self.database.as_deref().unwrap_or_default(),
                )
            }
        }
    }

    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
    /// Sent as `X-Api-Key` on every request when set.
    pub api_key: Option<String>,
    pub user_agent: Option<String>,
}

impl HttpConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Shutdown behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Bounded wait applied to each resource close so a stuck teardown
    /// cannot hang the process.
    pub grace_seconds: u64,
}

impl ShutdownConfig {
    #[must_use]
    pub const fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_seconds)
    }
}

// --- Default ---

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "keel-service".to_owned(),
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), console: true, json: false, dir: None, max_files: 10 }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Sqlite,
            username: None,
            password: None,
            host: None,
            port: None,
            database: None,
            url: None,
            max_connections: 10,
            acquire_timeout_seconds: 30,
            health_retries: 3,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { base_url: None, timeout_seconds: 30, api_key: None, user_agent: None }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_seconds: 5 }
    }
}
