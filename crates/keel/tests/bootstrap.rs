use keel::BootstrapError;
use keel::kernel::config::SettingsLoader;
use keel::kernel::registry::ResourceState;

#[tokio::test]
async fn bootstrap_brings_the_substrate_up_and_down() {
    let loader = SettingsLoader::new()
        .env_source(Default::default())
        .set("service.name", "bootstrap-test")
        .set("store.max_connections", 1);

    let registry = keel::bootstrap(loader).await.expect("bootstrap");
    assert_eq!(registry.settings().service.name, "bootstrap-test");
    assert_eq!(registry.initialized(), vec!["logger", "tracer", "store", "http"]);

    registry.store().await.expect("store ready").ping().await.expect("liveness");

    registry.close_all().await;
    assert_eq!(registry.state("store"), Some(ResourceState::Closed));
}

#[tokio::test]
async fn configuration_errors_abort_before_any_resource_initializes() {
    let loader = SettingsLoader::new()
        .env_source(Default::default())
        .set("store.kind", "postgres")
        .set("service.name", "");

    let err = keel::bootstrap(loader).await.expect_err("invalid settings must abort");
    assert!(matches!(err, BootstrapError::Config(_)));
}
