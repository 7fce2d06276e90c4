//! Registry lifecycle tests share one process; the first logger
//! initialization installs the global subscriber and later registries
//! attach to it.

use keel_domain::config::Settings;
use keel_kernel::health;
use keel_kernel::registry::{LOGGER, LifecycleError, ResourceRegistry, ResourceState, STORE, TRACER};
use std::sync::Arc;

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    // Single connection keeps the in-memory store coherent across
    // operations; tracing stays disabled so no exporter is wired up.
    settings.store.max_connections = 1;
    settings
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_yields_one_instance_in_startup_order() {
    let registry = Arc::new(ResourceRegistry::new(test_settings()));

    assert_eq!(registry.state(STORE), Some(ResourceState::Uninitialized));
    assert_eq!(registry.state(LOGGER), Some(ResourceState::Uninitialized));

    // Two contexts race on first access: one straight for the store, one
    // acquiring the logger first.
    let a = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.store().await.expect("store (task a)") })
    };
    let b = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            registry.logger().await.expect("logger (task b)");
            registry.store().await.expect("store (task b)")
        })
    };

    let (a, b) = (a.await.expect("join a"), b.await.expect("join b"));
    assert!(Arc::ptr_eq(&a, &b), "both contexts must observe the same store instance");

    let order = registry.initialized();
    let position = |name| order.iter().position(|n| *n == name).expect(name);
    assert!(position(LOGGER) < position(STORE), "logger initializes before store: {order:?}");
    assert!(position(TRACER) < position(STORE), "tracer initializes before store: {order:?}");

    assert_eq!(registry.state(STORE), Some(ResourceState::Ready));
    assert_eq!(registry.state(LOGGER), Some(ResourceState::Ready));

    registry.close_all().await;
}

#[tokio::test]
async fn init_all_brings_every_resource_up_in_order() {
    let registry = ResourceRegistry::new(test_settings());
    registry.init_all().await.expect("init_all");

    assert_eq!(registry.initialized(), vec!["logger", "tracer", "store", "http"]);
    for name in ["logger", "tracer", "store", "http"] {
        assert_eq!(registry.state(name), Some(ResourceState::Ready), "{name}");
    }

    let tracer = registry.tracer().await.expect("tracer");
    assert!(!tracer.is_enabled(), "tracing disabled by default");

    registry.close_all().await;
    for name in ["logger", "tracer", "store", "http"] {
        assert_eq!(registry.state(name), Some(ResourceState::Closed), "{name}");
    }
}

#[tokio::test]
async fn close_all_is_idempotent_and_blocks_late_acquisition() {
    let registry = ResourceRegistry::new(test_settings());
    let store = registry.store().await.expect("store");
    assert!(!store.is_closed());

    registry.close_all().await;
    assert!(store.is_closed(), "pool closed during teardown");

    // Second teardown: no error, no duplicate side effects.
    registry.close_all().await;

    let err = registry.store().await.expect_err("acquire after close must fail");
    assert!(matches!(err, LifecycleError::Closed { resource: "store" }));
    let err = registry.http().await.expect_err("http never initialized, still closed");
    assert!(matches!(err, LifecycleError::Closed { .. }));
}

#[tokio::test]
async fn health_probe_reports_without_booting_the_store() {
    let registry = ResourceRegistry::new(test_settings());

    let report = health::check(&registry).await;
    assert!(!report.store, "uninitialized store reports down");
    assert_eq!(report.status, "degraded");
    assert_eq!(
        registry.state(STORE),
        Some(ResourceState::Uninitialized),
        "probe must not initialize the store"
    );

    registry.store().await.expect("store");
    let report = health::check(&registry).await;
    assert!(report.store, "live store answers the probe");
    assert_eq!(report.status, "up");

    registry.close_all().await;
}
