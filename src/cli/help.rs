//! CLI command-name contract for logging and run records.

use crate::cli::parse::Commands;

/// Command name string (e.g. "start", "versions").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Start { .. } => "start",
        Commands::Status => "status",
        Commands::Applications => "applications",
        Commands::Versions { .. } => "versions",
        Commands::Resolve { .. } => "resolve",
        Commands::Disable { .. } => "disable",
        Commands::Enable { .. } => "enable",
        Commands::Delete { .. } => "delete",
        Commands::History { .. } => "history",
    }
}
