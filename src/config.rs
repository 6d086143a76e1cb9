//! Configuration System
//!
//! Layered configuration for the runtime: built-in defaults, the global XDG file, the workspace
//! files and `CANOPY__SECTION__KEY` environment overrides, in increasing precedence. Validation
//! collects every problem instead of stopping at the first.

use crate::artifact::SymbolDecl;
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::reconcile::UpdatePolicy;
use crate::types::ApplicationId;
use config::{Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanopyConfig {
    /// Application (root extension) operated on when the CLI is not given one
    #[serde(default)]
    pub application_id: Option<ApplicationId>,

    /// Update policy used by `start` unless overridden
    #[serde(default)]
    pub policy: UpdatePolicy,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Artifact repositories, searched in order
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database holding extension trees and run history
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Local artifact cache
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Finished runs kept in the history
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            cache_path: default_cache_path(),
            max_history: default_max_history(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Let unpinned coordinates pick snapshot versions
    #[serde(default)]
    pub allow_snapshots: bool,

    /// Never contact remote repositories
    #[serde(default)]
    pub offline: bool,
}

/// One artifact repository: a directory path or an `http(s)://` base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub id: String,
    pub location: String,
}

impl RepositoryConfig {
    pub fn is_remote(&self) -> bool {
        is_http(&self.location)
    }
}

/// Where expected trees come from: a directory of documents or an `http(s)://` base URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Worker pool size; unset means one worker per available CPU
    #[serde(default)]
    pub parallelism: Option<usize>,
}

/// Symbols the host provides to every application's root context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub symbols: Vec<SymbolDecl>,
}

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "canopy")
}

pub(crate) fn default_state_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("state"))
        .unwrap_or_else(|| PathBuf::from(".canopy/state"))
}

pub(crate) fn default_cache_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().join("artifacts"))
        .unwrap_or_else(|| PathBuf::from(".canopy/artifacts"))
}

fn default_max_history() -> usize {
    50
}

fn is_http(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn is_malformed(location: &str) -> bool {
    location.trim().is_empty() || (location.contains("://") && !is_http(location))
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Storage(String),
    Repository(String, String),
    Registry(String),
    Orchestrator(String),
    Bootstrap(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Repository(id, msg) => write!(f, "Repository '{}': {}", id, msg),
            ValidationError::Registry(msg) => write!(f, "Registry: {}", msg),
            ValidationError::Orchestrator(msg) => write!(f, "Orchestrator: {}", msg),
            ValidationError::Bootstrap(msg) => write!(f, "Bootstrap: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl CanopyConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.storage.state_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "State path cannot be empty".to_string(),
            ));
        }
        if self.storage.cache_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Cache path cannot be empty".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for repository in &self.repositories {
            if repository.id.trim().is_empty() {
                errors.push(ValidationError::Repository(
                    repository.id.clone(),
                    "Repository id cannot be empty".to_string(),
                ));
            }
            if !ids.insert(repository.id.as_str()) {
                errors.push(ValidationError::Repository(
                    repository.id.clone(),
                    "Duplicate repository id".to_string(),
                ));
            }
            if is_malformed(&repository.location) {
                errors.push(ValidationError::Repository(
                    repository.id.clone(),
                    format!("Malformed location '{}'", repository.location),
                ));
            }
        }

        if let Some(location) = &self.registry.location {
            if is_malformed(location) {
                errors.push(ValidationError::Registry(format!(
                    "Malformed location '{}'",
                    location
                )));
            }
        }

        if self.orchestrator.parallelism == Some(0) {
            errors.push(ValidationError::Orchestrator(
                "Parallelism must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for symbol in &self.bootstrap.symbols {
            if symbol.name.trim().is_empty() {
                errors.push(ValidationError::Bootstrap(
                    "Symbol name cannot be empty".to_string(),
                ));
            } else if !names.insert(symbol.name.as_str()) {
                errors.push(ValidationError::Bootstrap(format!(
                    "Duplicate symbol '{}'",
                    symbol.name
                )));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Like [`CanopyConfig::validate`], folded into a single [`ApiError`].
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }
}

/// Builds a [`CanopyConfig`] from every configured source.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads defaults, the global file, the workspace files and environment overrides.
    pub fn load(workspace_root: &Path) -> Result<CanopyConfig, config::ConfigError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        builder
            .add_source(Environment::with_prefix("CANOPY").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Loads defaults plus one explicit file; the file must exist.
    pub fn load_from_file(path: &Path) -> Result<CanopyConfig, config::ConfigError> {
        merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(Environment::with_prefix("CANOPY").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only.
    pub fn defaults() -> Result<CanopyConfig, config::ConfigError> {
        merge::merge_policy::builder_with_defaults()?
            .build()?
            .try_deserialize()
    }
}
