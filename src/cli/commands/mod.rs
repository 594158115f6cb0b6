//! CLI command implementations.

mod config;
mod exec;
mod nodes;
mod slot;

pub use config::{run_config, ConfigArgs};
pub use exec::{format_reply, run_exec, ExecArgs};
pub use nodes::{run_nodes, NodesArgs};
pub use slot::{run_route, run_slot, RouteArgs, SlotArgs};

use crate::core::config::Config;
use crate::core::runtime::Runtime;
use anyhow::Result;

/// Start a runtime for a one-shot command.
async fn start_runtime(config: Config) -> Result<Runtime> {
    let mut runtime = Runtime::new(config)?;
    runtime.start().await?;
    Ok(runtime)
}
