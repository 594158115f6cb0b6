//! Exec command implementation.

use super::start_runtime;
use crate::cluster::node::Node;
use crate::core::config::Config;
use crate::protocol::{RedisCommand, RedisValue};
use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Args;

/// Run a command through the router.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Send a cluster-wide command to this node only (host:port).
    #[arg(long)]
    pub node: Option<String>,

    /// Command name followed by its arguments.
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub command: Vec<String>,
}

/// Run the exec command.
pub async fn run_exec(config: Config, args: ExecArgs) -> Result<()> {
    let node = args
        .node
        .as_deref()
        .map(str::parse::<Node>)
        .transpose()
        .context("invalid --node")?;
    let cmd = build_command(&args.command)?;

    let mut runtime = start_runtime(config).await?;
    let router = runtime.router().context("runtime has no router")?.clone();
    let reply = match node {
        Some(node) => router.execute_on_node(&node, &cmd).await,
        None => router.execute(&cmd).await,
    };
    runtime.stop().await?;

    print!("{}", format_reply(&reply?));
    Ok(())
}

fn build_command(parts: &[String]) -> Result<RedisCommand> {
    let (name, args) = parts.split_first().context("missing command name")?;
    let args = args.iter().map(|a| Bytes::from(a.clone())).collect();
    Ok(RedisCommand::new(name.to_uppercase(), args))
}

/// Render a reply the way an interactive client prints it.
pub fn format_reply(value: &RedisValue) -> String {
    let mut out = String::new();
    render(value, 0, &mut out);
    out
}

fn render(value: &RedisValue, indent: usize, out: &mut String) {
    match value {
        RedisValue::SimpleString(s) => out.push_str(&format!("{}\n", s)),
        RedisValue::Error(e) => out.push_str(&format!("(error) {}\n", e)),
        RedisValue::Integer(n) => out.push_str(&format!("(integer) {}\n", n)),
        RedisValue::BulkString(b) => {
            out.push_str(&format!("{:?}\n", String::from_utf8_lossy(b)));
        }
        RedisValue::Null => out.push_str("(nil)\n"),
        RedisValue::Array(items) if items.is_empty() => out.push_str("(empty array)\n"),
        RedisValue::Array(items) => {
            let width = items.len().to_string().len();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(&" ".repeat(indent));
                }
                let label = format!("{:>width$}) ", i + 1, width = width);
                out.push_str(&label);
                render(item, indent + label.len(), out);
            }
        }
        RedisValue::Map(pairs) if pairs.is_empty() => out.push_str("(empty map)\n"),
        RedisValue::Map(pairs) => {
            for (i, (key, item)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push_str(&" ".repeat(indent));
                }
                let label = format!("{}: ", key.as_str().unwrap_or("?"));
                out.push_str(&label);
                render(item, indent + label.len(), out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RedisError;

    #[test]
    fn test_build_command_uppercases_name() {
        let cmd = build_command(&["get".into(), "Key".into()]).unwrap();
        assert_eq!(cmd.name, "GET");
        assert_eq!(cmd.arg_str(0), Some("Key"));
    }

    #[test]
    fn test_format_scalars() {
        assert_eq!(format_reply(&RedisValue::ok()), "OK\n");
        assert_eq!(format_reply(&RedisValue::integer(3)), "(integer) 3\n");
        assert_eq!(format_reply(&RedisValue::bulk_string("v")), "\"v\"\n");
        assert_eq!(format_reply(&RedisValue::Null), "(nil)\n");
        assert_eq!(
            format_reply(&RedisValue::Error(RedisError::wrong_type())),
            format!("(error) {}\n", RedisError::wrong_type())
        );
    }

    #[test]
    fn test_format_nested() {
        let value = RedisValue::map(vec![(
            RedisValue::bulk_string("127.0.0.1:7000"),
            RedisValue::array(vec![RedisValue::bulk_string("a"), RedisValue::bulk_string("b")]),
        )]);
        assert_eq!(
            format_reply(&value),
            "127.0.0.1:7000: 1) \"a\"\n                2) \"b\"\n"
        );
        assert_eq!(format_reply(&RedisValue::empty_array()), "(empty array)\n");
    }
}
