//! CLI domain: parse, route, output, and presentation only.
//! No pipeline logic lives here; the route table dispatches to the orchestrator.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, OutputFormat};
pub use route::RunContext;
