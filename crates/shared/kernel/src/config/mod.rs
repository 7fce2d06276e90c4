use config::{Config, Environment, File, FileFormat};
use keel_domain::config::{Settings, StoreKind};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

/// Custom error type for settings resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Errors surfaced by the underlying source machinery (unreadable or
    /// malformed file, bad override value, deserialization mismatch).
    #[error("Config error{}: {source}", format_context(.context))]
    Source {
        #[source]
        source: config::ConfigError,
        context: Option<Cow<'static, str>>,
    },

    /// A dotenv file that exists but cannot be parsed.
    #[error("Dotenv error{}: {message}", format_context(.context))]
    Dotenv { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Post-merge validation failed; lists every offending field, not just
    /// the first.
    #[error("Invalid configuration: {}", .issues.join("; "))]
    Invalid { issues: Vec<String> },
}

impl From<config::ConfigError> for ConfigError {
    fn from(source: config::ConfigError) -> Self {
        Self::Source { source, context: None }
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

/// Attaches call-site context to resolution results.
trait ConfigErrorExt<T> {
    fn context(self, ctx: impl Into<Cow<'static, str>>) -> Result<T, ConfigError>;
}

impl<T> ConfigErrorExt<T> for Result<T, config::ConfigError> {
    fn context(self, ctx: impl Into<Cow<'static, str>>) -> Result<T, ConfigError> {
        self.map_err(|source| ConfigError::Source { source, context: Some(ctx.into()) })
    }
}

const DEFAULT_PREFIX: &str = "KEEL";
const DEFAULT_SEPARATOR: &str = "__";

/// Declared key table used for unknown-field detection.
const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("service", &["name", "host", "port"]),
    ("logging", &["level", "console", "json", "dir", "max_files"]),
    ("tracing", &["enabled", "endpoint"]),
    (
        "store",
        &[
            "kind",
            "username",
            "password",
            "host",
            "port",
            "database",
            "url",
            "max_connections",
            "acquire_timeout_seconds",
            "health_retries",
        ],
    ),
    ("http", &["base_url", "timeout_seconds", "api_key", "user_agent"]),
    ("shutdown", &["grace_seconds"]),
];

/// A layered settings resolver combining file-based sources with
/// environment overrides.
///
/// Sources merge with a fixed total precedence, highest first:
///
/// 1. explicit overrides set via [`SettingsLoader::set`]
/// 2. process environment variables (`KEEL__GROUP__FIELD`)
/// 3. a dotenv file (same variable spelling; never mutates the process env)
/// 4. YAML file
/// 5. JSON file
/// 6. TOML file
/// 7. built-in defaults
///
/// Missing files are silently skipped. Resolution is deterministic and
/// side-effect free: identical sources always produce identical
/// [`Settings`].
#[must_use = "loaders do nothing unless you call .load()"]
#[derive(Debug, Default)]
pub struct SettingsLoader {
    prefix: Option<String>,
    separator: Option<String>,
    toml: Option<PathBuf>,
    json: Option<PathBuf>,
    yaml: Option<PathBuf>,
    dotenv: Option<PathBuf>,
    env_source: Option<config::Map<String, String>>,
    overrides: Vec<(String, config::Value)>,
    deny_unknown: bool,
}

impl SettingsLoader {
    /// Creates a loader with the default `KEEL` prefix and `__` separator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the environment variable prefix (default `KEEL`).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Overrides the nested-key separator (default `__`).
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    /// Adds a TOML file source (lowest-priority file layer).
    pub fn toml(mut self, path: impl AsRef<Path>) -> Self {
        self.toml = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds a JSON file source.
    pub fn json(mut self, path: impl AsRef<Path>) -> Self {
        self.json = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds a YAML file source (highest-priority file layer).
    pub fn yaml(mut self, path: impl AsRef<Path>) -> Self {
        self.yaml = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds a dotenv file source, layered between the files and the process
    /// environment. The file is parsed in place; the process environment is
    /// never mutated.
    pub fn dotenv(mut self, path: impl AsRef<Path>) -> Self {
        self.dotenv = Some(path.as_ref().to_path_buf());
        self
    }

    /// Replaces the process environment with an explicit variable map.
    /// Intended for hermetic tests.
    pub fn env_source(mut self, vars: config::Map<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Sets an explicit override (highest priority), e.g.
    /// `.set("service.port", 9090)`.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<config::Value>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Rejects keys outside the declared settings surface instead of
    /// ignoring them.
    pub const fn deny_unknown(mut self, deny: bool) -> Self {
        self.deny_unknown = deny;
        self
    }

    /// Consumes the loader and resolves one immutable [`Settings`] value.
    ///
    /// Validation runs after the merge and reports **every** invalid or
    /// missing field in one [`ConfigError::Invalid`].
    ///
    /// # Errors
    /// * [`ConfigError::Source`] if a present file is malformed or the
    ///   merged tree does not deserialize.
    /// * [`ConfigError::Dotenv`] if a present dotenv file cannot be parsed.
    /// * [`ConfigError::Invalid`] listing every validation issue.
    pub fn load(self) -> Result<Settings, ConfigError> {
        let prefix = self.prefix.as_deref().unwrap_or(DEFAULT_PREFIX);
        let separator = self.separator.as_deref().unwrap_or(DEFAULT_SEPARATOR);

        let environment = || {
            Environment::with_prefix(prefix)
                .separator(separator)
                .convert_case(config::Case::Snake)
        };

        let mut builder = Config::builder();

        // File layers, lowest priority first.
        if let Some(path) = &self.toml {
            builder =
                builder.add_source(File::from(path.as_path()).format(FileFormat::Toml).required(false));
        }
        if let Some(path) = &self.json {
            builder =
                builder.add_source(File::from(path.as_path()).format(FileFormat::Json).required(false));
        }
        if let Some(path) = &self.yaml {
            builder =
                builder.add_source(File::from(path.as_path()).format(FileFormat::Yaml).required(false));
        }

        // Dotenv sits above the files but below the real environment.
        if let Some(path) = &self.dotenv
            && path.exists()
        {
            builder = builder.add_source(environment().source(Some(parse_dotenv(path)?)));
        }

        // Process environment (or the injected map).
        builder = builder.add_source(environment().source(self.env_source));

        // Explicit overrides always win.
        for (key, value) in self.overrides {
            builder = builder.set_override(key, value).context("Applying override")?;
        }

        let merged = builder.build().context("Failed to build config")?;

        let mut issues = if self.deny_unknown { unknown_key_issues(&merged)? } else { Vec::new() };

        let settings = merged
            .try_deserialize::<Settings>()
            .context("Failed to deserialize config")?;

        issues.extend(validate(&settings));
        if !issues.is_empty() {
            return Err(ConfigError::Invalid { issues });
        }

        info!(service = %settings.service.name, "Settings resolved");

        Ok(settings)
    }
}

/// Parses a dotenv file into an environment-shaped variable map.
fn parse_dotenv(path: &Path) -> Result<config::Map<String, String>, ConfigError> {
    let iter = dotenv::from_path_iter(path).map_err(|e| ConfigError::Dotenv {
        message: e.to_string().into(),
        context: Some(path.display().to_string().into()),
    })?;

    let mut vars = config::Map::new();
    for item in iter {
        let (key, value) = item.map_err(|e| ConfigError::Dotenv {
            message: e.to_string().into(),
            context: Some(path.display().to_string().into()),
        })?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Checks the two top nesting levels of the merged tree against the
/// declared key table.
fn unknown_key_issues(merged: &Config) -> Result<Vec<String>, ConfigError> {
    let tree = merged
        .clone()
        .try_deserialize::<config::Map<String, config::Value>>()
        .context("Inspecting merged config")?;

    let mut issues = Vec::new();
    for (key, value) in tree {
        let Some((_, known)) = KNOWN_KEYS.iter().find(|(group, _)| *group == key) else {
            issues.push(format!("unknown field '{key}'"));
            continue;
        };
        if let Ok(table) = value.into_table() {
            for sub in table.keys() {
                if !known.contains(&sub.as_str()) {
                    issues.push(format!("unknown field '{key}.{sub}'"));
                }
            }
        }
    }
    issues.sort();
    Ok(issues)
}

/// Collects every validation issue instead of failing on the first.
fn validate(settings: &Settings) -> Vec<String> {
    let mut issues = Vec::new();

    if settings.service.name.trim().is_empty() {
        issues.push("service.name must not be empty".to_owned());
    }
    if settings.service.port == 0 {
        issues.push("service.port must be non-zero".to_owned());
    }

    if let Err(e) = keel_logger::parse_level(&settings.logging.level) {
        issues.push(format!("logging.level: {e}"));
    }
    if settings.logging.max_files == 0 {
        issues.push("logging.max_files must be greater than zero".to_owned());
    }

    if settings.store.url.is_none() && settings.store.kind != StoreKind::Sqlite {
        for (field, value) in [
            ("store.host", &settings.store.host),
            ("store.database", &settings.store.database),
            ("store.username", &settings.store.username),
        ] {
            if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                issues.push(format!(
                    "{field} is required for kind '{}' when store.url is unset",
                    settings.store.kind.as_str()
                ));
            }
        }
    }
    if settings.store.max_connections == 0 {
        issues.push("store.max_connections must be greater than zero".to_owned());
    }

    if settings.http.timeout_seconds == 0 {
        issues.push("http.timeout_seconds must be non-zero".to_owned());
    }
    if settings.shutdown.grace_seconds == 0 {
        issues.push("shutdown.grace_seconds must be non-zero".to_owned());
    }

    issues
}
