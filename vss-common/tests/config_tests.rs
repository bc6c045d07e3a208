//! Configuration loading and root folder resolution
//!
//! Tests that manipulate VSS_ROOT_FOLDER or VSS_ROOT are marked #[serial]
//! so environment changes do not race.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use vss_common::config::{
    config_file_candidates, CompiledDefaults, RootFolderInitializer,
    RootFolderResolver, TomlConfig, DATABASE_FILE_NAME, ROOT_ENV, ROOT_FOLDER_ENV,
};

fn clear_root_env() {
    env::remove_var(ROOT_FOLDER_ENV);
    env::remove_var(ROOT_ENV);
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert!(defaults.root_folder.ends_with("vss") || defaults.root_folder.ends_with("vss_data"));
    assert_eq!(defaults.log_level, "info");
    assert!(defaults.log_file.is_none());
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    clear_root_env();

    let root_folder = RootFolderResolver::new("vss-ingest").resolve();

    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_root_folder() {
    clear_root_env();
    env::set_var(ROOT_FOLDER_ENV, "/tmp/vss-test-env-folder");

    let root_folder = RootFolderResolver::new("vss-ingest").resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/vss-test-env-folder"));

    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_root_folder_env_beats_root_env() {
    clear_root_env();
    env::set_var(ROOT_FOLDER_ENV, "/tmp/vss-priority-1");
    env::set_var(ROOT_ENV, "/tmp/vss-priority-2");

    let root_folder = RootFolderResolver::new("vss-ingest").resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/vss-priority-1"));

    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_cli_beats_env_and_toml() {
    clear_root_env();
    env::set_var(ROOT_ENV, "/tmp/vss-from-env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/vss-from-toml")),
        ..Default::default()
    };

    let root_folder = RootFolderResolver::new("vss-ingest")
        .with_cli_arg(Some(PathBuf::from("/tmp/vss-from-cli")))
        .with_toml(&toml)
        .resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/vss-from-cli"));

    // Without the CLI argument, the environment wins over TOML
    let root_folder = RootFolderResolver::new("vss-ingest").with_toml(&toml).resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/vss-from-env"));

    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_toml_used_when_env_empty() {
    clear_root_env();
    env::set_var(ROOT_FOLDER_ENV, "   ");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/vss-from-toml")),
        ..Default::default()
    };

    let root_folder = RootFolderResolver::new("vss-ingest").with_toml(&toml).resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/vss-from-toml"));

    clear_root_env();
}

#[test]
fn test_initializer_creates_directory_idempotently() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path().join("vss-root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join(DATABASE_FILE_NAME));
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = TomlConfig::from_toml_str(
        r#"
        base_url = "https://variants.example.org"

        [ingest]
        genome_build = "b38"
        dry_run = true

        [mailer]
        api_key = "SG.test"
        "#,
    )
    .unwrap();

    assert_eq!(config.base_url.as_deref(), Some("https://variants.example.org"));
    assert_eq!(config.ingest.genome_build, "b38");
    assert!(config.ingest.dry_run);
    assert_eq!(config.ingest.write_concurrency, 4);
    assert_eq!(config.mailer.api_key.as_deref(), Some("SG.test"));
    assert_eq!(config.mailer.from_name, "Variant Facts");
    assert_eq!(config.database.max_lock_wait_ms, 5000);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = TomlConfig::from_toml_str("[ingest\ngenome_build = ").unwrap_err();
    assert!(matches!(err, vss_common::Error::Config(_)));
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = TomlConfig::from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, vss_common::Error::Config(_)));
}

#[test]
fn test_load_without_config_file_returns_defaults() {
    let config = TomlConfig::load("nonexistent-test-module-12345");
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_serialized_config_reads_back() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("vss-ingest.toml");

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/srv/vss"));
    config.ingest.delivery_concurrency = 16;
    std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

    assert_eq!(TomlConfig::from_path(&path).unwrap(), config);
}

#[test]
fn test_config_candidates_named_after_module() {
    let candidates = config_file_candidates("vss-ingest");
    assert!(!candidates.is_empty());
    assert!(candidates
        .iter()
        .all(|p| p.file_name().is_some_and(|n| n == "vss-ingest.toml")));
}
