//! Command implementations for the CLI.

mod config;
mod snapshot;
mod watch;

pub use config::cmd_config;
pub use snapshot::cmd_snapshot;
pub use watch::{WatchArgs, cmd_watch};
