//! Canopy: extension-tree orchestration
//!
//! Reconciles the persisted extension tree of an application with the tree its registry expects,
//! resolves every extension's versioned artifacts, and boots the result as a hierarchy of
//! isolated boundaries and runtime contexts, tolerating failure of any subtree.

pub mod artifact;
pub mod boundary;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod platform;
pub mod progress;
pub mod reconcile;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod types;
