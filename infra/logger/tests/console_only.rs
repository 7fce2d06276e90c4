use keel_logger::{LevelFilter, Logger};

#[test]
fn init_console_only_holds_no_worker() {
    let logger = Logger::builder()
        .name("integration-console-only")
        .console(true)
        .level(LevelFilter::INFO)
        .init()
        .expect("logger should initialize");

    assert!(!logger.is_active(), "console-only logger should not hold a file worker guard");

    // Close must stay idempotent with or without a worker attached.
    logger.close();
    logger.close();
}
