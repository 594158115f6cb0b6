//! RESP2 client over TCP.

use crate::cluster::node::Node;
use crate::core::error::NodeError;
use crate::node::{NodeConnection, NodeConnector, NodeFuture};
use crate::protocol::{ParseResult, RedisCommand, RedisValue, RespEncoder, RespParser};
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Read buffer starting size.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Opens TCP connections to nodes.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    io_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector whose connections fail any single read or write
    /// that takes longer than `io_timeout`.
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl NodeConnector for TcpConnector {
    fn connect<'a>(&'a self, node: &'a Node) -> NodeFuture<'a, Box<dyn NodeConnection>> {
        Box::pin(async move {
            let stream = TcpStream::connect((node.host(), node.port())).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(TcpConnection::new(stream, self.io_timeout)) as Box<dyn NodeConnection>)
        })
    }
}

/// One TCP connection to a node.
pub struct TcpConnection {
    stream: TcpStream,
    read_buffer: BytesMut,
    parser: RespParser,
    io_timeout: Duration,
    healthy: bool,
}

impl TcpConnection {
    /// Wrap a connected stream.
    pub fn new(stream: TcpStream, io_timeout: Duration) -> Self {
        Self {
            stream,
            read_buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            parser: RespParser::new(),
            io_timeout,
            healthy: true,
        }
    }

    async fn round_trip(&mut self, cmd: &RedisCommand) -> Result<RedisValue, NodeError> {
        let request = RespEncoder::encode_command(cmd);
        tokio::time::timeout(self.io_timeout, self.stream.write_all(&request))
            .await
            .map_err(|_| NodeError::transport("write timed out"))??;

        loop {
            match self.parser.parse(&self.read_buffer) {
                ParseResult::Complete(value, used) => {
                    self.read_buffer.advance(used);
                    return match value {
                        RedisValue::Error(err) => Err(NodeError::Server(err)),
                        value => Ok(value),
                    };
                }
                ParseResult::Incomplete => {}
                ParseResult::Error(message) => return Err(NodeError::protocol(message)),
            }

            self.read_buffer.reserve(READ_BUFFER_SIZE);
            let read = self.stream.read_buf(&mut self.read_buffer);
            let n = tokio::time::timeout(self.io_timeout, read)
                .await
                .map_err(|_| NodeError::transport("read timed out"))??;
            if n == 0 {
                return Err(NodeError::Closed);
            }
        }
    }
}

impl NodeConnection for TcpConnection {
    fn execute<'a>(&'a mut self, cmd: &'a RedisCommand) -> NodeFuture<'a, RedisValue> {
        Box::pin(async move {
            if !self.healthy {
                return Err(NodeError::Closed);
            }
            let result = self.round_trip(cmd).await;
            if let Err(e) = &result {
                if !e.connection_reusable() {
                    self.healthy = false;
                }
            }
            result
        })
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }

    fn close(&mut self) -> NodeFuture<'_, ()> {
        Box::pin(async move {
            self.healthy = false;
            self.stream.shutdown().await?;
            Ok(())
        })
    }
}
