//! File + environment loading tests
//!
//! These mutate process environment variables, so they run serially.

use assay_config::{
    AssayConfig, ConfigError, LogFormat, StorageBackend, ENV_LOG_FORMAT, ENV_STORAGE_BACKEND,
    ENV_WORKERS,
};
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

fn clear_env() {
    for var in [ENV_LOG_FORMAT, ENV_STORAGE_BACKEND, ENV_WORKERS] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_load_without_file_uses_defaults() {
    clear_env();
    let config = AssayConfig::load(None).unwrap();
    assert_eq!(config, AssayConfig::default());
}

#[test]
#[serial]
fn test_env_wins_over_file() {
    clear_env();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[storage]
backend = "sqlite"
sqlite_path = "/var/lib/assay/assay.db"

[consumer]
workers = 16
"#
    )
    .unwrap();

    std::env::set_var(ENV_WORKERS, "3");
    std::env::set_var(ENV_LOG_FORMAT, "json");
    let config = AssayConfig::load(Some(file.path()));
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert_eq!(config.consumer.workers, 3);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
#[serial]
fn test_missing_file_is_io_error() {
    clear_env();
    let err = AssayConfig::load(Some(std::path::Path::new("/nonexistent/assay.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
#[serial]
fn test_malformed_file_is_parse_error() {
    clear_env();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[consumer]\nworkers = \"lots\"").unwrap();

    let err = AssayConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
#[serial]
fn test_env_values_are_validated() {
    clear_env();
    std::env::set_var(ENV_WORKERS, "0");
    let result = AssayConfig::load(None);
    clear_env();

    assert!(matches!(
        result,
        Err(ConfigError::Invalid { field: "consumer.workers", .. })
    ));
}
