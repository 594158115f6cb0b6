//! Slot and route command implementations.

use super::start_runtime;
use crate::cluster::slot::{hash_tag, slot};
use crate::core::config::Config;
use anyhow::Result;
use clap::Args;

/// Print the hash slot of a key.
#[derive(Args, Debug)]
pub struct SlotArgs {
    /// Key to hash.
    #[arg(required = true)]
    pub key: String,
}

/// Print the slot and owning node of a key.
#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Key to route.
    #[arg(required = true)]
    pub key: String,
}

/// Run the slot command.
pub fn run_slot(args: SlotArgs) -> Result<()> {
    let key = args.key.as_bytes();
    println!("{}", slot(key));

    let tag = hash_tag(key);
    if tag.len() != key.len() {
        println!("hash tag: {}", String::from_utf8_lossy(tag));
    }
    Ok(())
}

/// Run the route command.
pub async fn run_route(config: Config, args: RouteArgs) -> Result<()> {
    let mut runtime = start_runtime(config).await?;
    let connection = runtime.connection()?;

    let key = args.key.as_bytes();
    let result = connection.node_for_key(key);
    runtime.stop().await?;

    println!("slot: {}", connection.slot_for_key(key));
    println!("node: {}", result?);
    Ok(())
}
