use keel_domain::config::StoreKind;
use keel_kernel::config::{ConfigError, SettingsLoader};
use std::fs;
use tempfile::tempdir;

fn env(vars: &[(&str, &str)]) -> config::Map<String, String> {
    vars.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
}

#[test]
fn defaults_resolve_without_any_source() {
    let settings = SettingsLoader::new().env_source(env(&[])).load().expect("defaults");
    assert_eq!(settings.service.name, "keel-service");
    assert_eq!(settings.store.kind, StoreKind::Sqlite);
    assert_eq!(settings.store.connection_url(), "sqlite::memory:");
}

#[test]
fn environment_overrides_files_which_override_defaults() {
    let dir = tempdir().expect("tempdir");
    let yaml = dir.path().join("server.yaml");
    fs::write(&yaml, "store:\n  host: localhost\n  port: 5433\nservice:\n  port: 9000\n")
        .expect("write yaml");

    let settings = SettingsLoader::new()
        .yaml(&yaml)
        .env_source(env(&[("KEEL__STORE__HOST", "test")]))
        .load()
        .expect("resolve");

    // Env wins over the file; untouched file values survive; everything
    // else falls back to defaults.
    assert_eq!(settings.store.host.as_deref(), Some("test"));
    assert_eq!(settings.store.port, Some(5433));
    assert_eq!(settings.service.port, 9000);
    assert_eq!(settings.logging.level, "info");
}

#[test]
fn file_layers_stack_yaml_over_json_over_toml() {
    let dir = tempdir().expect("tempdir");
    let toml = dir.path().join("base.toml");
    let json = dir.path().join("mid.json");
    let yaml = dir.path().join("top.yaml");
    fs::write(&toml, "[service]\nname = \"from-toml\"\nport = 1000\n\n[logging]\nlevel = \"debug\"\n")
        .expect("write toml");
    fs::write(&json, "{ \"service\": { \"name\": \"from-json\" } }").expect("write json");
    fs::write(&yaml, "service:\n  port: 3000\n").expect("write yaml");

    let settings = SettingsLoader::new()
        .toml(&toml)
        .json(&json)
        .yaml(&yaml)
        .env_source(env(&[]))
        .load()
        .expect("resolve");

    assert_eq!(settings.service.name, "from-json", "json overrides toml");
    assert_eq!(settings.service.port, 3000, "yaml overrides both");
    assert_eq!(settings.logging.level, "debug", "unshadowed toml value survives");
}

#[test]
fn dotenv_sits_between_files_and_real_environment() {
    let dir = tempdir().expect("tempdir");
    let yaml = dir.path().join("server.yaml");
    let dotenv = dir.path().join(".env");
    fs::write(&yaml, "store:\n  host: from-file\n  database: from-file\n").expect("write yaml");
    fs::write(&dotenv, "KEEL__STORE__HOST=from-dotenv\nKEEL__STORE__DATABASE=from-dotenv\n")
        .expect("write dotenv");

    let settings = SettingsLoader::new()
        .yaml(&yaml)
        .dotenv(&dotenv)
        .env_source(env(&[("KEEL__STORE__HOST", "from-env")]))
        .load()
        .expect("resolve");

    assert_eq!(settings.store.host.as_deref(), Some("from-env"), "env beats dotenv");
    assert_eq!(settings.store.database.as_deref(), Some("from-dotenv"), "dotenv beats files");
}

#[test]
fn explicit_overrides_beat_everything() {
    let settings = SettingsLoader::new()
        .env_source(env(&[("KEEL__SERVICE__PORT", "7000")]))
        .set("service.port", 4583)
        .load()
        .expect("resolve");

    assert_eq!(settings.service.port, 4583);
}

#[test]
fn missing_sources_are_silently_skipped() {
    let settings = SettingsLoader::new()
        .toml("does/not/exist.toml")
        .json("does/not/exist.json")
        .yaml("does/not/exist.yaml")
        .dotenv("does/not/exist.env")
        .env_source(env(&[]))
        .load()
        .expect("missing files skipped");
    assert_eq!(settings.service.name, "keel-service");
}

#[test]
fn resolution_is_deterministic() {
    let dir = tempdir().expect("tempdir");
    let yaml = dir.path().join("server.yaml");
    fs::write(&yaml, "service:\n  name: orders\n").expect("write yaml");

    let load = || {
        SettingsLoader::new()
            .yaml(&yaml)
            .env_source(env(&[("KEEL__STORE__KIND", "sqlite")]))
            .set("service.port", 4000)
            .load()
            .expect("resolve")
    };

    let first = load();
    let second = load();
    assert_eq!(first.service.name, second.service.name);
    assert_eq!(first.service.port, second.service.port);
    assert_eq!(first.store.connection_url(), second.store.connection_url());
}

#[test]
fn validation_lists_every_missing_field_at_once() {
    let err = SettingsLoader::new()
        .env_source(env(&[("KEEL__STORE__KIND", "postgres")]))
        .set("service.name", "")
        .load()
        .expect_err("postgres without connection details must fail");

    let ConfigError::Invalid { issues } = err else {
        panic!("expected Invalid, got {err}");
    };
    let joined = issues.join("\n");
    assert!(joined.contains("service.name"), "{joined}");
    assert!(joined.contains("store.host"), "{joined}");
    assert!(joined.contains("store.database"), "{joined}");
    assert!(joined.contains("store.username"), "{joined}");
    assert!(issues.len() >= 4, "all issues reported together: {joined}");
}

#[test]
fn invalid_level_is_reported_by_field() {
    let err = SettingsLoader::new()
        .env_source(env(&[("KEEL__LOGGING__LEVEL", "verbose")]))
        .load()
        .expect_err("bad level must fail validation");

    let ConfigError::Invalid { issues } = err else {
        panic!("expected Invalid, got {err}");
    };
    assert!(issues.iter().any(|i| i.starts_with("logging.level")), "{issues:?}");
}

#[test]
fn unknown_keys_are_ignored_unless_denied() {
    let dir = tempdir().expect("tempdir");
    let yaml = dir.path().join("server.yaml");
    fs::write(&yaml, "service:\n  name: orders\n  nickname: oops\nfeature_flags:\n  x: true\n")
        .expect("write yaml");

    // Default: superset configs are tolerated.
    let settings =
        SettingsLoader::new().yaml(&yaml).env_source(env(&[])).load().expect("lenient resolve");
    assert_eq!(settings.service.name, "orders");

    // Strict: every unknown key is reported.
    let err = SettingsLoader::new()
        .yaml(&yaml)
        .env_source(env(&[]))
        .deny_unknown(true)
        .load()
        .expect_err("strict resolve must fail");
    let ConfigError::Invalid { issues } = err else {
        panic!("expected Invalid, got {err}");
    };
    let joined = issues.join("\n");
    assert!(joined.contains("unknown field 'feature_flags'"), "{joined}");
    assert!(joined.contains("unknown field 'service.nickname'"), "{joined}");
}

#[test]
fn store_url_override_beats_field_group() {
    let settings = SettingsLoader::new()
        .env_source(env(&[
            ("KEEL__STORE__KIND", "postgres"),
            ("KEEL__STORE__URL", "postgres://svc:pw@db:5432/orders"),
        ]))
        .load()
        .expect("url override satisfies the group requirement");
    assert_eq!(settings.store.connection_url(), "postgres://svc:pw@db:5432/orders");
}
