//! CLI parse: clap types for Canopy. No behavior; definitions only.

use crate::reconcile::UpdatePolicy;
use crate::types::{ApplicationId, ExtensionId};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Canopy CLI - reconcile, resolve and boot extension trees
#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Reconcile, resolve and boot a tree of versioned extensions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (holds config/config.toml)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Application id (defaults to `application_id` from the config)
    #[arg(long)]
    pub application: Option<ApplicationId>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile, load and launch the application, then stop it again
    Start {
        /// Update policy (last-successful, update-only, full-update, local-update-only,
        /// local-full-update)
        #[arg(long)]
        policy: Option<UpdatePolicy>,
        /// Stop right after booting instead of waiting for Enter
        #[arg(long)]
        once: bool,
    },
    /// Show the persisted extension tree
    Status,
    /// List stored applications
    Applications,
    /// List known versions of an artifact (group:name)
    Versions {
        artifact: String,
        /// Only release versions
        #[arg(long)]
        releases: bool,
    },
    /// Resolve a coordinate (group:name[:version]) and its runtime dependencies
    Resolve { coordinate: String },
    /// Disable an extension
    Disable { extension: ExtensionId },
    /// Re-enable a disabled or deleted extension
    Enable { extension: ExtensionId },
    /// Mark an extension deleted
    Delete { extension: ExtensionId },
    /// Show recorded runs
    History {
        /// Show the events of one run
        #[arg(long)]
        run: Option<String>,
        /// Include runs of every application
        #[arg(long)]
        all: bool,
    },
}
