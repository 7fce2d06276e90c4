//! Kernel of the substrate: configuration resolution and resource lifecycle.
//!
//! [`config`] merges layered configuration sources into one immutable
//! [`keel_domain::config::Settings`] value; [`registry`] owns the process
//! singletons (logger, tracer, store, HTTP client), initializing them
//! exactly once in dependency order and tearing them down in reverse.
//!
//! ## Bootstrap (non-wasm)
//! ```rust,no_run
//! use keel_kernel::config::SettingsLoader;
//! use keel_kernel::registry::ResourceRegistry;
//!
//! # async fn bootstrap() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SettingsLoader::new().yaml("config/server.yaml").load()?;
//! let registry = ResourceRegistry::new(settings);
//! registry.init_all().await?;
//! // ... serve traffic ...
//! registry.close_all().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod health;
pub mod registry;
