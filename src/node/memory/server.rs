//! Server commands: PING, INFO, TIME, CONFIG, CLIENT, CLUSTER and the
//! persistence no-ops.

use super::store::{glob_match, unix_time, CommandResult, Keyspace, MemoryNode};
use crate::cluster::slot;
use crate::protocol::{RedisCommand, RedisError, RedisValue};
use std::fmt::Write;
use std::sync::atomic::Ordering;

/// Server commands need the node itself, not just the keyspace.
pub(super) fn dispatch(
    node: &MemoryNode,
    ks: &mut Keyspace,
    cmd: &RedisCommand,
) -> Option<CommandResult> {
    let result = match cmd.name.as_str() {
        "PING" => ping(cmd),
        "ECHO" => cmd
            .require_argc(1)
            .map(|_| RedisValue::BulkString(cmd.args[0].clone())),
        "DBSIZE" => cmd
            .require_argc(0)
            .map(|_| RedisValue::integer(ks.len() as i64)),
        "FLUSHDB" | "FLUSHALL" => flush(ks, cmd),
        "INFO" => info(node, ks, cmd),
        "TIME" => time(cmd),
        "LASTSAVE" => cmd
            .require_argc(0)
            .map(|_| RedisValue::integer(node.last_save.load(Ordering::Relaxed) as i64)),
        "SAVE" => save(node, cmd, RedisValue::ok()),
        "BGSAVE" => save(
            node,
            cmd,
            RedisValue::simple_string("Background saving started"),
        ),
        "BGREWRITEAOF" => cmd.require_argc(0).map(|_| {
            RedisValue::simple_string("Background append only file rewriting started")
        }),
        "CLIENT" => client(node, cmd),
        "CONFIG" => config(node, cmd),
        "CLUSTER" => cluster(node, cmd),
        _ => return None,
    };
    Some(result)
}

fn ping(cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc_range(0, 1)?;
    Ok(match cmd.arg_bytes(0) {
        Some(message) => RedisValue::BulkString(message.clone()),
        None => RedisValue::pong(),
    })
}

fn flush(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    // ASYNC / SYNC are accepted and ignored
    cmd.require_argc_range(0, 1)?;
    ks.clear();
    Ok(RedisValue::ok())
}

fn time(cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(0)?;
    let now = unix_time();
    Ok(RedisValue::array(vec![
        RedisValue::bulk_string(now.as_secs().to_string()),
        RedisValue::bulk_string(now.subsec_micros().to_string()),
    ]))
}

fn save(node: &MemoryNode, cmd: &RedisCommand, reply: RedisValue) -> CommandResult {
    cmd.require_argc(0)?;
    node.last_save
        .store(unix_time().as_secs(), Ordering::Relaxed);
    Ok(reply)
}

fn info(node: &MemoryNode, ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc_range(0, 1)?;
    let section = cmd
        .arg_str(0)
        .map(str::to_lowercase)
        .unwrap_or_else(|| "default".to_string());
    let everything = matches!(section.as_str(), "default" | "all" | "everything");
    let wanted = |name: &str| everything || section == name;

    let mut info = String::new();
    if wanted("server") {
        info.push_str("# Server\r\n");
        let _ = write!(info, "trellis_version:{}\r\n", env!("CARGO_PKG_VERSION"));
        let _ = write!(info, "tcp_port:{}\r\n", node.node().port());
        let uptime = node.started_at.elapsed().as_secs();
        let _ = write!(info, "uptime_in_seconds:{}\r\n", uptime);
        info.push_str("\r\n");
    }
    if wanted("clients") {
        info.push_str("# Clients\r\n");
        let _ = write!(info, "connected_clients:{}\r\n", node.clients.lock().len());
        info.push_str("\r\n");
    }
    if wanted("stats") {
        info.push_str("# Stats\r\n");
        let _ = write!(
            info,
            "total_commands_processed:{}\r\n",
            node.commands_processed.load(Ordering::Relaxed)
        );
        info.push_str("\r\n");
    }
    if wanted("cluster") {
        info.push_str("# Cluster\r\ncluster_enabled:1\r\n\r\n");
    }
    if wanted("keyspace") {
        info.push_str("# Keyspace\r\n");
        let keys = ks.len();
        if keys > 0 {
            let _ = write!(info, "db0:keys={},expires=0,avg_ttl=0\r\n", keys);
        }
    }
    Ok(RedisValue::bulk_string(info))
}

fn client(node: &MemoryNode, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(1)?;
    match cmd.subcommand().as_deref() {
        Some("LIST") => {
            let mut list = String::new();
            for id in node.clients.lock().iter() {
                let _ = writeln!(list, "id={} addr={} db=0 cmd=client", id, node.node());
            }
            Ok(RedisValue::bulk_string(list))
        }
        _ => Err(RedisError::generic(format!(
            "unknown subcommand '{}'",
            cmd.arg_str(0).unwrap_or_default()
        ))),
    }
}

fn config(node: &MemoryNode, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(1)?;
    match cmd.subcommand().as_deref() {
        Some("GET") => {
            cmd.require_argc(2)?;
            let pattern = cmd.args[1].to_ascii_lowercase();
            let pairs = node
                .config
                .lock()
                .iter()
                .filter(|(name, _)| glob_match(&pattern, name.as_bytes()))
                .flat_map(|(name, value)| {
                    [RedisValue::bulk_string(name), RedisValue::bulk_string(value)]
                })
                .collect();
            Ok(RedisValue::array(pairs))
        }
        Some("SET") => {
            cmd.require_argc(3)?;
            let name = cmd
                .arg_str(1)
                .ok_or_else(RedisError::syntax)?
                .to_ascii_lowercase();
            let value = cmd.arg_str(2).ok_or_else(RedisError::syntax)?.to_string();
            let mut config = node.config.lock();
            match config.get_mut(&name) {
                Some(entry) => {
                    *entry = value;
                    Ok(RedisValue::ok())
                }
                None => Err(RedisError::generic(format!(
                    "Unsupported CONFIG parameter: {}",
                    name
                ))),
            }
        }
        Some("RESETSTAT") => {
            cmd.require_argc(1)?;
            node.commands_processed.store(0, Ordering::Relaxed);
            Ok(RedisValue::ok())
        }
        _ => Err(RedisError::generic(format!(
            "unknown subcommand '{}'",
            cmd.arg_str(0).unwrap_or_default()
        ))),
    }
}

fn cluster(node: &MemoryNode, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(1)?;
    match cmd.subcommand().as_deref() {
        Some("SLOTS") => {
            let entries = node
                .cluster_slots
                .read()
                .iter()
                .map(|range| {
                    RedisValue::array(vec![
                        RedisValue::integer(range.start as i64),
                        RedisValue::integer(range.end as i64),
                        RedisValue::array(vec![
                            RedisValue::bulk_string(range.node.host()),
                            RedisValue::integer(range.node.port() as i64),
                        ]),
                    ])
                })
                .collect();
            Ok(RedisValue::array(entries))
        }
        Some("KEYSLOT") => {
            cmd.require_argc(2)?;
            Ok(RedisValue::integer(slot(&cmd.args[1]) as i64))
        }
        _ => Err(RedisError::generic(format!(
            "unknown subcommand '{}'",
            cmd.arg_str(0).unwrap_or_default()
        ))),
    }
}
