//! CLI route: one table dispatching each command to the platform facade.

use crate::artifact::Artifact;
use crate::cli::help::command_name;
use crate::cli::parse::{Commands, OutputFormat};
use crate::cli::presentation::{
    format_applications, format_events, format_resolved, format_runs, format_start, format_tree,
    format_versions,
};
use crate::config::{CanopyConfig, ConfigLoader};
use crate::error::ApiError;
use crate::platform::Platform;
use crate::reconcile::UpdatePolicy;
use crate::types::{ApplicationId, Coordinate};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Everything a command needs: the loaded configuration and an open platform.
pub struct RunContext {
    config: CanopyConfig,
    platform: Platform,
    application: Option<ApplicationId>,
    format: OutputFormat,
}

impl RunContext {
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        application: Option<ApplicationId>,
        format: OutputFormat,
    ) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(&path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        let platform = Platform::open(&config)?;
        Ok(Self {
            application: application.or(config.application_id),
            config,
            platform,
            format,
        })
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    fn application(&self) -> Result<ApplicationId, ApiError> {
        self.application.ok_or_else(|| {
            ApiError::InvalidArgument(
                "no application id: pass --application or set application_id in the config"
                    .to_string(),
            )
        })
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        debug!(command = command_name(command), "Executing command");
        match command {
            Commands::Start { policy, once } => {
                self.start(policy.unwrap_or(self.config.policy), *once)
            }
            Commands::Status => {
                let tree = self.platform.status(&self.application()?)?;
                format_tree(&tree, self.format)
            }
            Commands::Applications => {
                format_applications(&self.platform.applications()?, self.format)
            }
            Commands::Versions { artifact, releases } => {
                let artifact = parse_artifact(artifact)?;
                let mut versions = self.platform.versions(&artifact)?;
                if *releases {
                    versions.retain(|unique| unique.version.is_release());
                }
                format_versions(&versions, self.format)
            }
            Commands::Resolve { coordinate } => {
                let coordinate: Coordinate =
                    coordinate.parse().map_err(ApiError::InvalidArgument)?;
                format_resolved(&self.platform.resolve(&coordinate)?, self.format)
            }
            Commands::Disable { extension } => {
                let tree = self.platform.disable(&self.application()?, extension)?;
                format_tree(&tree, self.format)
            }
            Commands::Enable { extension } => {
                let tree = self.platform.enable(&self.application()?, extension)?;
                format_tree(&tree, self.format)
            }
            Commands::Delete { extension } => {
                let tree = self
                    .platform
                    .delete_extension(&self.application()?, extension)?;
                format_tree(&tree, self.format)
            }
            Commands::History { run, all } => match run {
                Some(run_id) => format_events(&self.platform.run_events(run_id)?, self.format),
                None => {
                    let application = if *all { None } else { self.application };
                    format_runs(&self.platform.history(application.as_ref())?, self.format)
                }
            },
        }
    }

    /// Boots, reports, then waits for Enter (unless `once`) and stops again.
    fn start(&self, policy: UpdatePolicy, once: bool) -> Result<String, ApiError> {
        let application = self.application()?;
        let report = match self.platform.start(application, policy) {
            Ok(report) => report,
            Err(err) => {
                if self.platform.is_running(&application) {
                    if let Err(stop_err) = self.platform.stop(application) {
                        warn!(application = %application, error = %stop_err, "Teardown after failed start failed");
                    }
                }
                return Err(err);
            }
        };
        println!("{}", format_start(&report, self.format)?);

        if !once {
            println!("Press Enter to stop.");
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|e| ApiError::InvalidArgument(format!("Failed to read stdin: {}", e)))?;
        }

        let tree = self.platform.stop(application)?;
        format_tree(&tree, self.format)
    }
}

fn parse_artifact(raw: &str) -> Result<Artifact, ApiError> {
    match raw.split_once(':') {
        Some((group, name)) if !group.is_empty() && !name.is_empty() && !name.contains(':') => {
            Ok(Artifact::new(group, name))
        }
        _ => Err(ApiError::InvalidArgument(format!(
            "Invalid artifact '{}' (expected group:name)",
            raw
        ))),
    }
}
