//! Command tagging table.
//!
//! Every command the router accepts is tagged with how it is routed:
//!
//! | Route | Dispatch |
//! |-------|----------|
//! | single-key | the node owning argument 0 |
//! | multi-key | the node owning every key, which must share one slot |
//! | fan-out | every node, results merged by an [`Aggregation`] |
//! | unsupported | rejected without touching topology or nodes |
//!
//! Commands absent from the table are rejected as invalid requests.

use crate::core::error::{RouterError, RouterResult};
use crate::protocol::RedisCommand;
use std::collections::HashMap;
use std::sync::OnceLock;

/// How per-node results of a fan-out are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    /// Union of key lists, duplicates removed.
    Union,
    /// First non-null reply in node order.
    FirstNonEmpty,
    /// Sum of integer replies.
    Sum,
    /// Every node's reply (or failure), keyed by node.
    PerNode,
    /// Succeeds only if every node succeeded.
    AllSucceed,
}

impl Aggregation {
    /// Whether an answer is still produced when some node misses the
    /// fan-out deadline. Only the per-node rule reports timeouts in place.
    pub fn tolerates_timeouts(&self) -> bool {
        matches!(self, Self::PerNode)
    }
}

/// Argument positions holding keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    /// Exactly these argument indexes.
    Fixed(&'static [usize]),
    /// Every `step`th argument starting at `first`, leaving the last
    /// `trailing` arguments out.
    Range {
        first: usize,
        step: usize,
        trailing: usize,
    },
}

impl KeySpec {
    const ALL: Self = Self::Range {
        first: 0,
        step: 1,
        trailing: 0,
    };

    /// Extract the keys of a command.
    ///
    /// Fails when the command has too few arguments for its key positions
    /// or, for stepped ranges, a dangling argument.
    pub fn keys<'a>(&self, cmd: &'a RedisCommand) -> RouterResult<Vec<&'a [u8]>> {
        let wrong_arity = || {
            RouterError::invalid(format!(
                "wrong number of arguments for '{}' command",
                cmd.name.to_lowercase()
            ))
        };

        match *self {
            Self::Fixed(positions) => positions
                .iter()
                .map(|&i| cmd.args.get(i).map(|k| &k[..]).ok_or_else(wrong_arity))
                .collect(),
            Self::Range {
                first,
                step,
                trailing,
            } => {
                let end = cmd
                    .argc()
                    .checked_sub(trailing)
                    .filter(|end| *end > first)
                    .ok_or_else(wrong_arity)?;
                if (end - first) % step != 0 {
                    return Err(wrong_arity());
                }
                Ok(cmd.args[first..end]
                    .iter()
                    .step_by(step)
                    .map(|k| &k[..])
                    .collect())
            }
        }
    }
}

/// Routing tag of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Routed by argument 0.
    SingleKey,
    /// Routed by the common slot of the keys.
    MultiKey(KeySpec),
    /// Sent to every node.
    FanOut(Aggregation),
    /// Never dispatched.
    Unsupported(&'static str),
}

const NO_DATABASES: &str = "cluster mode has a single database";
const NO_TRANSACTIONS: &str = "transactions cannot span shards";
const NO_CONNECTION_STATE: &str = "router connections are pooled and shared";

/// The tagging table, keyed by command name (`CLIENT LIST` style for
/// container commands).
pub struct CommandTable {
    routes: HashMap<&'static str, Route>,
}

impl CommandTable {
    fn new() -> Self {
        let mut table = Self {
            routes: HashMap::new(),
        };
        table.register_all();
        table
    }

    fn register_all(&mut self) {
        // Strings
        self.register_each(
            &[
                "GET", "SET", "SETNX", "SETEX", "PSETEX", "GETSET", "INCR", "INCRBY",
                "INCRBYFLOAT", "DECR", "DECRBY", "APPEND", "GETRANGE", "SETRANGE", "STRLEN",
                "GETBIT", "SETBIT", "BITCOUNT",
            ],
            Route::SingleKey,
        );
        self.register("MGET", Route::MultiKey(KeySpec::ALL));
        let pairs = KeySpec::Range {
            first: 0,
            step: 2,
            trailing: 0,
        };
        self.register_each(&["MSET", "MSETNX"], Route::MultiKey(pairs));
        let bitop = KeySpec::Range {
            first: 1,
            step: 1,
            trailing: 0,
        };
        self.register("BITOP", Route::MultiKey(bitop));

        // Lists
        self.register_each(
            &[
                "LPUSH", "RPUSH", "LPUSHX", "RPUSHX", "LLEN", "LRANGE", "LTRIM", "LINDEX",
                "LINSERT", "LSET", "LREM", "LPOP", "RPOP",
            ],
            Route::SingleKey,
        );
        self.register_each(
            &["RPOPLPUSH", "BRPOPLPUSH"],
            Route::MultiKey(KeySpec::Fixed(&[0, 1])),
        );
        let blocking = KeySpec::Range {
            first: 0,
            step: 1,
            trailing: 1,
        };
        self.register_each(&["BLPOP", "BRPOP"], Route::MultiKey(blocking));

        // Sets
        self.register_each(
            &[
                "SADD", "SREM", "SPOP", "SCARD", "SISMEMBER", "SMEMBERS", "SRANDMEMBER", "SSCAN",
            ],
            Route::SingleKey,
        );
        self.register("SMOVE", Route::MultiKey(KeySpec::Fixed(&[0, 1])));
        self.register_each(
            &[
                "SINTER", "SUNION", "SDIFF", "SINTERSTORE", "SUNIONSTORE", "SDIFFSTORE",
            ],
            Route::MultiKey(KeySpec::ALL),
        );

        // Hashes
        self.register_each(
            &[
                "HSET", "HSETNX", "HGET", "HMSET", "HMGET", "HDEL", "HEXISTS", "HLEN", "HSTRLEN",
                "HKEYS", "HVALS", "HGETALL", "HINCRBY", "HINCRBYFLOAT", "HSCAN",
            ],
            Route::SingleKey,
        );

        // Sorted sets
        self.register_each(
            &[
                "ZADD", "ZREM", "ZSCORE", "ZCARD", "ZCOUNT", "ZINCRBY", "ZRANK", "ZREVRANK",
                "ZRANGE", "ZREVRANGE", "ZRANGEBYSCORE", "ZREMRANGEBYRANK", "ZREMRANGEBYSCORE",
                "ZSCAN",
            ],
            Route::SingleKey,
        );

        // Key administration
        self.register_each(
            &[
                "TYPE", "EXPIRE", "PEXPIRE", "EXPIREAT", "PEXPIREAT", "PERSIST", "TTL", "PTTL",
                "DUMP", "RESTORE", "SORT",
            ],
            Route::SingleKey,
        );
        self.register_each(&["DEL", "EXISTS"], Route::MultiKey(KeySpec::ALL));
        self.register_each(
            &["RENAME", "RENAMENX"],
            Route::MultiKey(KeySpec::Fixed(&[0, 1])),
        );
        self.register("KEYS", Route::FanOut(Aggregation::Union));
        self.register("RANDOMKEY", Route::FanOut(Aggregation::FirstNonEmpty));
        self.register("MOVE", Route::Unsupported(NO_DATABASES));

        // Server administration
        self.register_each(&["SELECT", "SWAPDB"], Route::Unsupported(NO_DATABASES));
        self.register_each(
            &["MULTI", "EXEC", "DISCARD", "WATCH", "UNWATCH"],
            Route::Unsupported(NO_TRANSACTIONS),
        );
        self.register("DBSIZE", Route::FanOut(Aggregation::Sum));
        self.register_each(
            &[
                "FLUSHDB",
                "FLUSHALL",
                "PING",
                "SAVE",
                "BGSAVE",
                "BGREWRITEAOF",
                "CONFIG SET",
                "CONFIG RESETSTAT",
            ],
            Route::FanOut(Aggregation::AllSucceed),
        );
        self.register_each(
            &["INFO", "TIME", "LASTSAVE", "CLIENT LIST", "CONFIG GET"],
            Route::FanOut(Aggregation::PerNode),
        );
        self.register_each(
            &["CLIENT SETNAME", "CLIENT GETNAME", "CLIENT KILL"],
            Route::Unsupported(NO_CONNECTION_STATE),
        );
    }

    fn register(&mut self, name: &'static str, route: Route) {
        self.routes.insert(name, route);
    }

    fn register_each(&mut self, names: &[&'static str], route: Route) {
        for name in names {
            self.register(name, route);
        }
    }

    /// Look up a route by table name.
    pub fn get(&self, name: &str) -> Option<Route> {
        self.routes.get(name).copied()
    }

    /// Number of tagged commands.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Tag a command.
    ///
    /// Container commands (CLIENT, CONFIG) are looked up with their
    /// subcommand. Single-key commands without arguments are rejected here
    /// so routing never indexes a missing key.
    pub fn classify(&self, cmd: &RedisCommand) -> RouterResult<Route> {
        let route = match cmd.name.as_str() {
            "CLIENT" | "CONFIG" => {
                let sub = cmd.subcommand().ok_or_else(|| {
                    RouterError::invalid(format!(
                        "wrong number of arguments for '{}' command",
                        cmd.name.to_lowercase()
                    ))
                })?;
                self.get(&format!("{} {}", cmd.name, sub))
            }
            name => self.get(name),
        };

        let route = route.ok_or_else(|| match cmd.subcommand() {
            Some(sub) if matches!(cmd.name.as_str(), "CLIENT" | "CONFIG") => {
                RouterError::invalid(format!("unknown subcommand '{} {}'", cmd.name, sub))
            }
            _ => RouterError::invalid(format!("unknown command '{}'", cmd.name)),
        })?;

        if route == Route::SingleKey && cmd.argc() == 0 {
            return Err(RouterError::invalid(format!(
                "wrong number of arguments for '{}' command",
                cmd.name.to_lowercase()
            )));
        }
        Ok(route)
    }
}

/// The process-wide tagging table.
pub fn command_table() -> &'static CommandTable {
    static TABLE: OnceLock<CommandTable> = OnceLock::new();
    TABLE.get_or_init(CommandTable::new)
}

/// Tag a command with the process-wide table.
pub fn classify(cmd: &RedisCommand) -> RouterResult<Route> {
    command_table().classify(cmd)
}
