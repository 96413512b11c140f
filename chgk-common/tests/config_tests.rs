//! Unit tests for configuration loading and graceful degradation
//!
//! Note: uses serial_test to prevent ENV variable race conditions. Tests that
//! touch CHGK_ROOT_FOLDER or CHGK_CONFIG are marked #[serial].

use chgk_common::config::{
    resolve_config_path, resolve_root_folder, ImportSettings, RootLayout, TomlConfig,
    CONFIG_PATH_ENV, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = TomlConfig::load(&temp_dir.path().join("absent.toml")).unwrap();

    assert!(config.root_folder.is_none());
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.http.bind_address, "127.0.0.1:5780");
    assert_eq!(config.import.max_concurrency, 2);
    assert_eq!(config.import.max_retry_attempts, 3);
    assert_eq!(config.import.job_timeout_secs, 300);
}

#[test]
fn test_partial_config_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("chgk-import.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/chgk"

[import]
max_concurrency = 4
allowed_extensions = ["zip"]
"#,
    )
    .unwrap();

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/chgk")));
    assert_eq!(config.import.max_concurrency, 4);
    assert_eq!(config.import.allowed_extensions, vec!["zip".to_string()]);
    // Unspecified fields keep their defaults
    assert_eq!(config.import.max_retry_attempts, 3);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_invalid_settings_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(&path, "[import]\nmax_concurrency = 0\n").unwrap();

    let err = TomlConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("max_concurrency"));
}

#[test]
fn test_malformed_toml_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "root_folder = [unclosed").unwrap();

    assert!(TomlConfig::load(&path).is_err());
}

#[test]
fn test_allowed_extension_is_case_insensitive() {
    let settings = ImportSettings::default();
    assert!(settings.is_allowed_extension("package.ZIP"));
    assert!(settings.is_allowed_extension("feed.json"));
    assert!(!settings.is_allowed_extension("notes.txt"));
    assert!(!settings.is_allowed_extension("no_extension"));
}

#[test]
#[serial]
fn test_root_folder_priority() {
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    // CLI argument wins over everything
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    assert_eq!(
        resolve_root_folder(Some(Path::new("/from/cli")), &config),
        PathBuf::from("/from/cli")
    );

    // Environment wins over TOML
    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/env"));

    // TOML wins over compiled default
    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/toml"));

    // Compiled default as last resort
    let empty = TomlConfig::default();
    assert!(!resolve_root_folder(None, &empty).as_os_str().is_empty());
}

#[test]
#[serial]
fn test_config_path_from_env() {
    env::set_var(CONFIG_PATH_ENV, "/etc/chgk/custom.toml");
    assert_eq!(resolve_config_path(None), PathBuf::from("/etc/chgk/custom.toml"));
    env::remove_var(CONFIG_PATH_ENV);

    assert_eq!(
        resolve_config_path(Some(Path::new("explicit.toml"))),
        PathBuf::from("explicit.toml")
    );
}

#[test]
fn test_root_layout_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let layout = RootLayout::new(temp_dir.path().join("root"));
    layout.ensure_directories().unwrap();

    assert!(layout.work_dir().is_dir());
    assert!(layout.media_dir().is_dir());
    assert_eq!(layout.database_path(), temp_dir.path().join("root").join("chgk.db"));
}
