//! Layered configuration: workspace files, environment overrides and validation.

use canopy::config::{CanopyConfig, ConfigLoader, RepositoryConfig, ValidationError};
use canopy::reconcile::UpdatePolicy;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Serializes tests that touch process environment variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn write_workspace_file(root: &Path, name: &str, contents: &str) {
    let dir = root.join("config");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn environment_file_overrides_base_file() {
    let _env = ENV_LOCK.lock();
    let dir = TempDir::new().unwrap();
    write_workspace_file(
        dir.path(),
        "config.toml",
        r#"
policy = "update-only"

[storage]
state_path = "/var/lib/canopy/state"
max_history = 5

[[repositories]]
id = "local"
location = "/srv/artifacts"
"#,
    );
    write_workspace_file(
        dir.path(),
        "development.toml",
        r#"
[storage]
max_history = 7

[resolver]
offline = true
"#,
    );

    let config = ConfigLoader::load(dir.path()).unwrap();
    assert_eq!(config.policy, UpdatePolicy::UpdateOnly);
    assert_eq!(
        config.storage.state_path,
        PathBuf::from("/var/lib/canopy/state")
    );
    assert_eq!(config.storage.max_history, 7);
    assert!(config.resolver.offline);
    assert_eq!(
        config.repositories,
        vec![RepositoryConfig {
            id: "local".to_string(),
            location: "/srv/artifacts".to_string(),
        }]
    );
}

#[test]
fn environment_variables_override_files() {
    let _env = ENV_LOCK.lock();
    let dir = TempDir::new().unwrap();
    write_workspace_file(
        dir.path(),
        "config.toml",
        "[orchestrator]\nparallelism = 2\n",
    );

    std::env::set_var("CANOPY__ORCHESTRATOR__PARALLELISM", "6");
    std::env::set_var("CANOPY__LOGGING__LEVEL", "debug");
    let loaded = ConfigLoader::load(dir.path());
    std::env::remove_var("CANOPY__ORCHESTRATOR__PARALLELISM");
    std::env::remove_var("CANOPY__LOGGING__LEVEL");

    let config = loaded.unwrap();
    assert_eq!(config.orchestrator.parallelism, Some(6));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn empty_workspace_uses_defaults() {
    let _env = ENV_LOCK.lock();
    let dir = TempDir::new().unwrap();
    let config = ConfigLoader::load(dir.path()).unwrap();
    let defaults = ConfigLoader::defaults().unwrap();

    assert_eq!(config.policy, defaults.policy);
    assert_eq!(config.storage.max_history, defaults.storage.max_history);
    assert!(config.application_id.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn application_id_is_read_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("canopy.toml");
    std::fs::write(
        &path,
        "application_id = \"6f1c1f2e-4a5b-4c3d-9e8f-0a1b2c3d4e5f\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    assert_eq!(
        config.application_id.map(|id| id.to_string()).as_deref(),
        Some("6f1c1f2e-4a5b-4c3d-9e8f-0a1b2c3d4e5f")
    );
}

#[test]
fn invalid_config_reports_every_problem() {
    let mut config = CanopyConfig::default();
    config.storage.cache_path = PathBuf::new();
    config.repositories.push(RepositoryConfig {
        id: String::new(),
        location: "s3://bucket".to_string(),
    });

    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 3);
    assert!(matches!(errors[0], ValidationError::Storage(_)));

    let message = config.ensure_valid().unwrap_err().to_string();
    assert!(message.contains("Cache path cannot be empty"));
    assert!(message.contains("Malformed location 's3://bucket'"));
}
