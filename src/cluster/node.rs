//! Node identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A cluster node, identified by its address.
///
/// Ordering is by (host, port) and defines the node iteration order of every
/// fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    host: String,
    port: u16,
}

impl Node {
    /// Create a node.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form suitable for connecting.
    pub fn address(&self) -> String {
        self.to_string()
    }

    /// Check whether this node has the given address.
    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.port == port && self.host == host
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Error parsing a `host:port` address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node address '{0}', expected host:port")]
pub struct ParseNodeError(String);

impl FromStr for Node {
    type Err = ParseNodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseNodeError(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ParseNodeError(s.to_string()));
        }
        let port = port.parse().map_err(|_| ParseNodeError(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        assert_eq!(Node::new("127.0.0.1", 7000), Node::new("127.0.0.1", 7000));
        assert_ne!(Node::new("127.0.0.1", 7000), Node::new("127.0.0.1", 7001));
    }

    #[test]
    fn test_parse_and_display() {
        let node: Node = "127.0.0.1:6380".parse().unwrap();
        assert!(node.matches("127.0.0.1", 6380));
        assert_eq!(node.to_string(), "127.0.0.1:6380");

        let v6: Node = "[::1]:7000".parse().unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.to_string(), "[::1]:7000");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("localhost".parse::<Node>().is_err());
        assert!(":7000".parse::<Node>().is_err());
        assert!("host:notaport".parse::<Node>().is_err());
        assert!("host:70000".parse::<Node>().is_err());
    }

    #[test]
    fn test_ordering_by_host_then_port() {
        let mut nodes = vec![
            Node::new("10.0.0.2", 7000),
            Node::new("10.0.0.1", 7001),
            Node::new("10.0.0.1", 7000),
        ];
        nodes.sort();
        assert_eq!(nodes[0], Node::new("10.0.0.1", 7000));
        assert_eq!(nodes[2], Node::new("10.0.0.2", 7000));
    }
}
