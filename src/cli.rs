//! CLI domain: parse, route, help, output, and presentation only.
//! No orchestration logic; the route table dispatches to the platform facade.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands, OutputFormat};
pub use route::RunContext;
