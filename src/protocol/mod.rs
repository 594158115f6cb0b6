//! Redis request and reply model.
//!
//! Every node in the cluster speaks the Redis Serialization Protocol. The
//! router never interprets replies beyond what aggregation needs, so the value
//! model here mirrors RESP2 plus a [`RedisValue::Map`] form that the router
//! uses to report per-node results.
//!
//! - [`resp`] - RESP2 reply parser and command encoder

pub mod resp;

use bytes::Bytes;

pub use resp::{ParseResult, RespEncoder, RespParser};

/// Redis reply value.
#[derive(Debug, Clone, PartialEq)]
pub enum RedisValue {
    /// Simple string (+OK\r\n)
    SimpleString(String),

    /// Error (-ERR message\r\n)
    Error(RedisError),

    /// Integer (:1000\r\n)
    Integer(i64),

    /// Bulk string ($6\r\nfoobar\r\n)
    BulkString(Bytes),

    /// Array (*2\r\n...)
    Array(Vec<RedisValue>),

    /// Null ($-1\r\n or *-1\r\n)
    Null,

    /// Ordered pairs. Produced by per-node aggregation, encoded as a flat
    /// array on the wire.
    Map(Vec<(RedisValue, RedisValue)>),
}

impl RedisValue {
    /// Create a simple string.
    pub fn simple_string(s: impl Into<String>) -> Self {
        Self::SimpleString(s.into())
    }

    /// Create an OK response.
    pub fn ok() -> Self {
        Self::SimpleString("OK".to_string())
    }

    /// Create a PONG response.
    pub fn pong() -> Self {
        Self::SimpleString("PONG".to_string())
    }

    /// Create an error.
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(RedisError::new(kind, message))
    }

    /// Create a generic error.
    pub fn err(message: impl Into<String>) -> Self {
        Self::error("ERR", message)
    }

    /// Create an integer.
    pub fn integer(n: i64) -> Self {
        Self::Integer(n)
    }

    /// Create a bulk string.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::BulkString(data.into())
    }

    /// Create a bulk string from a string.
    pub fn bulk_string(s: impl AsRef<str>) -> Self {
        Self::BulkString(Bytes::copy_from_slice(s.as_ref().as_bytes()))
    }

    /// Create a bulk string, or null when absent.
    pub fn optional_bulk(data: Option<Bytes>) -> Self {
        data.map(Self::BulkString).unwrap_or(Self::Null)
    }

    /// Create an array.
    pub fn array(items: Vec<RedisValue>) -> Self {
        Self::Array(items)
    }

    /// Create an empty array.
    pub fn empty_array() -> Self {
        Self::Array(vec![])
    }

    /// Create a map.
    pub fn map(pairs: Vec<(RedisValue, RedisValue)>) -> Self {
        Self::Map(pairs)
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(s) => Some(s),
            Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to get as bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::SimpleString(s) => Some(s.as_bytes()),
            Self::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get as integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::SimpleString(s) => s.parse().ok(),
            Self::BulkString(b) => std::str::from_utf8(b).ok().and_then(|s| s.parse().ok()),
            _ => None,
        }
    }

    /// Try to get as array.
    pub fn as_array(&self) -> Option<&[RedisValue]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Convert to array, consuming self.
    pub fn into_array(self) -> Option<Vec<RedisValue>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Convert to owned bytes, consuming self.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Self::BulkString(b) => Some(b),
            Self::SimpleString(s) => Some(Bytes::from(s)),
            _ => None,
        }
    }
}

/// Redis error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisError {
    /// Error kind (ERR, WRONGTYPE, CROSSSLOT, etc.)
    pub kind: String,
    /// Error message.
    pub message: String,
}

impl RedisError {
    /// Create a new error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new("ERR", message)
    }

    /// Create a syntax error.
    pub fn syntax() -> Self {
        Self::new("ERR", "syntax error")
    }

    /// Create a wrong number of arguments error.
    pub fn wrong_arity(command: &str) -> Self {
        Self::new(
            "ERR",
            format!(
                "wrong number of arguments for '{}' command",
                command.to_lowercase()
            ),
        )
    }

    /// Create a WRONGTYPE error.
    pub fn wrong_type() -> Self {
        Self::new(
            "WRONGTYPE",
            "Operation against a key holding the wrong kind of value",
        )
    }

    /// Create a not-an-integer error.
    pub fn not_integer() -> Self {
        Self::new("ERR", "value is not an integer or out of range")
    }

    /// Create a not-a-float error.
    pub fn not_float() -> Self {
        Self::new("ERR", "value is not a valid float")
    }

    /// Create a no-such-key error.
    pub fn no_such_key() -> Self {
        Self::new("ERR", "no such key")
    }

    /// Create an unknown command error.
    pub fn unknown_command(command: &str) -> Self {
        Self::new("ERR", format!("unknown command '{}'", command))
    }

    /// Create a CROSSSLOT error.
    pub fn crossslot() -> Self {
        Self::new("CROSSSLOT", "Keys in request don't hash to the same slot")
    }

    /// Create a CLUSTERDOWN error.
    pub fn clusterdown(message: impl Into<String>) -> Self {
        Self::new("CLUSTERDOWN", message)
    }
}

impl std::fmt::Display for RedisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.message)
    }
}

impl std::error::Error for RedisError {}

/// Redis command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisCommand {
    /// Command name (uppercase).
    pub name: String,

    /// Command arguments.
    pub args: Vec<Bytes>,
}

impl RedisCommand {
    /// Create a new command.
    pub fn new(name: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            args,
        }
    }

    /// Start building a command with no arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<Bytes>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a byte-slice argument.
    pub fn arg_slice(mut self, arg: &[u8]) -> Self {
        self.args.push(Bytes::copy_from_slice(arg));
        self
    }

    /// Append a displayable argument (integers, floats).
    pub fn arg_display(mut self, arg: impl std::fmt::Display) -> Self {
        self.args.push(Bytes::from(arg.to_string()));
        self
    }

    /// Parse from a RESP array.
    pub fn from_array(values: Vec<RedisValue>) -> Result<Self, RedisError> {
        if values.is_empty() {
            return Err(RedisError::syntax());
        }

        let name = match &values[0] {
            RedisValue::BulkString(b) => {
                String::from_utf8(b.to_vec()).map_err(|_| RedisError::syntax())?
            }
            RedisValue::SimpleString(s) => s.clone(),
            _ => return Err(RedisError::syntax()),
        };

        let args = values
            .into_iter()
            .skip(1)
            .map(|v| match v {
                RedisValue::BulkString(b) => Ok(b),
                RedisValue::SimpleString(s) => Ok(Bytes::from(s)),
                RedisValue::Integer(n) => Ok(Bytes::from(n.to_string())),
                _ => Err(RedisError::syntax()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(name, args))
    }

    /// Get argument as bytes.
    pub fn arg_bytes(&self, index: usize) -> Option<&Bytes> {
        self.args.get(index)
    }

    /// Get argument as string.
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Get argument as integer.
    pub fn arg_int(&self, index: usize) -> Option<i64> {
        self.arg_str(index).and_then(|s| s.parse().ok())
    }

    /// Uppercased first argument, for container commands like CLIENT/CONFIG.
    pub fn subcommand(&self) -> Option<String> {
        self.arg_str(0).map(str::to_uppercase)
    }

    /// Get number of arguments.
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    /// Validate argument count (exact).
    pub fn require_argc(&self, n: usize) -> Result<(), RedisError> {
        if self.args.len() != n {
            return Err(RedisError::wrong_arity(&self.name));
        }
        Ok(())
    }

    /// Validate argument count (at least).
    pub fn require_min_argc(&self, n: usize) -> Result<(), RedisError> {
        if self.args.len() < n {
            return Err(RedisError::wrong_arity(&self.name));
        }
        Ok(())
    }

    /// Validate argument count (range).
    pub fn require_argc_range(&self, min: usize, max: usize) -> Result<(), RedisError> {
        if self.args.len() < min || self.args.len() > max {
            return Err(RedisError::wrong_arity(&self.name));
        }
        Ok(())
    }
}

impl std::fmt::Display for RedisCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}
