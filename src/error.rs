//! Error types for the Canopy extension runtime.

use crate::orchestrator::BootReport;
use crate::types::{ApplicationId, ExtensionId};
use std::path::PathBuf;
use thiserror::Error;

/// State store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Extension not found in store: {0}")]
    ExtensionNotFound(ExtensionId),

    #[error("Corrupt state record: {0}")]
    CorruptRecord(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Artifact resolution errors. Always recorded per node, never fatal for a run.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("No version of {artifact} matches {range}")]
    NoMatchingVersion { artifact: String, range: String },

    #[error("Invalid version range: {0}")]
    InvalidRange(String),

    #[error("Repository '{repository}' unreachable: {reason}")]
    Unreachable { repository: String, reason: String },

    #[error("Digest mismatch for {artifact}: expected {expected}, got {actual}")]
    DigestMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid descriptor for {artifact}: {reason}")]
    InvalidDescriptor { artifact: String, reason: String },

    #[error("{0} is not available in the local cache")]
    NotCached(String),

    #[error("Artifact cache I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Registry client errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid registry document: {0}")]
    InvalidDocument(String),

    #[error("Registry I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Boundary lifecycle errors
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("Boundary already exists for extension {0}")]
    AlreadyExists(ExtensionId),

    #[error("Parent boundary {parent} of extension {id} does not exist")]
    ParentMissing { id: ExtensionId, parent: ExtensionId },

    #[error("Binary {0:?} does not exist")]
    MissingBinary(PathBuf),

    #[error("Cannot close boundary {0}: its runtime context is still live")]
    ContextStillLive(ExtensionId),

    #[error("Cannot close boundary {id}: child boundary {child} is still open")]
    ChildStillOpen { id: ExtensionId, child: ExtensionId },

    #[error("Artifact resolution failed: {0}")]
    Resolve(#[from] ResolveError),
}

/// Runtime context errors
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("No boundary loaded for extension {0}")]
    BoundaryNotLoaded(ExtensionId),

    #[error("Parent context of extension {0} is not running")]
    ParentNotRunning(ExtensionId),

    #[error("Context already running for extension {0}")]
    AlreadyRunning(ExtensionId),

    #[error("Cannot stop context {id}: child context {child} is still running")]
    ChildStillRunning { id: ExtensionId, child: ExtensionId },

    #[error("Context creation failed for extension {id}: {reason}")]
    CreationFailed { id: ExtensionId, reason: String },
}

/// Reconciliation errors. All of these abort the whole orchestration run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Identity mismatch: saved extension {saved} reconciled against expected {expected}")]
    IdentityMismatch {
        saved: ExtensionId,
        expected: ExtensionId,
    },

    #[error("Invalid extension tree: {0}")]
    InvalidTree(String),

    #[error("Unknown update policy: {0}")]
    UnknownPolicy(String),

    #[error("Nothing to reconcile: neither saved nor expected state exists")]
    NothingToReconcile,
}

/// Boot failures carry the structured per-node report of the phase that failed.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("Load phase failed:\n{0}")]
    Load(BootReport),

    #[error("Launch phase failed:\n{0}")]
    Launch(BootReport),
}

impl BootError {
    pub fn report(&self) -> &BootReport {
        match self {
            BootError::Load(report) | BootError::Launch(report) => report,
        }
    }
}

/// Facade-level errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Application not found: {0}")]
    ApplicationNotFound(ApplicationId),

    #[error("Extension {extension} not found in application {application}")]
    ExtensionNotFound {
        application: ApplicationId,
        extension: ExtensionId,
    },

    #[error("Application {0} is already running")]
    AlreadyRunning(ApplicationId),

    #[error("Application {0} is not running")]
    NotRunning(ApplicationId),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Resolution error: {0}")]
    ResolveError(#[from] ResolveError),

    #[error("Registry error: {0}")]
    RegistryError(#[from] RegistryError),

    #[error("Boundary error: {0}")]
    BoundaryError(#[from] BoundaryError),

    #[error("Context error: {0}")]
    ContextError(#[from] ContextError),

    #[error("Reconciliation error: {0}")]
    ReconcileError(#[from] ReconcileError),

    #[error("{0}")]
    BootError(#[from] BootError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
