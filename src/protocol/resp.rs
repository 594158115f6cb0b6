//! RESP2 reply parser and encoder.
//!
//! The router is a client: it encodes commands as arrays of bulk strings and
//! parses whatever reply a node sends back.
//! - Simple Strings (+)
//! - Errors (-)
//! - Integers (:)
//! - Bulk Strings ($)
//! - Arrays (*)
//! - Null (represented as $-1 or *-1)

use super::{RedisCommand, RedisError, RedisValue};
use bytes::Bytes;

/// Maximum nesting depth for arrays.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum bulk string size (512MB).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array elements.
pub const MAX_ELEMENTS: usize = 1_000_000;

/// Parse result.
#[derive(Debug)]
pub enum ParseResult {
    /// Parsed a value that occupied the given number of bytes.
    Complete(RedisValue, usize),
    /// Need more data.
    Incomplete,
    /// Parse error; the stream cannot be resynchronized.
    Error(String),
}

/// RESP2 parser.
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one value from the front of the buffer.
    pub fn parse(&mut self, data: &[u8]) -> ParseResult {
        self.depth = 0;
        self.parse_value(data)
    }

    fn parse_value(&mut self, data: &[u8]) -> ParseResult {
        if data.is_empty() {
            return ParseResult::Incomplete;
        }

        if self.depth > MAX_NESTING_DEPTH {
            return ParseResult::Error("maximum nesting depth exceeded".to_string());
        }

        let body = &data[1..];
        let parsed = match data[0] {
            b'+' => Self::parse_line(body).map(|(line, used)| {
                (
                    RedisValue::SimpleString(String::from_utf8_lossy(line).into_owned()),
                    used,
                )
            }),
            b'-' => Self::parse_line(body).map(|(line, used)| {
                let (kind, message) = parse_error_string(&String::from_utf8_lossy(line));
                (RedisValue::Error(RedisError { kind, message }), used)
            }),
            b':' => match Self::parse_line(body) {
                Some((line, used)) => match parse_i64(line) {
                    Some(n) => Some((RedisValue::Integer(n), used)),
                    None => return ParseResult::Error("invalid integer".to_string()),
                },
                None => None,
            },
            b'$' => return Self::parse_bulk_string(body),
            b'*' => return self.parse_array(body),
            other => {
                return ParseResult::Error(format!("unexpected type byte 0x{:02x}", other));
            }
        };

        match parsed {
            // +1 for the type prefix
            Some((value, used)) => ParseResult::Complete(value, used + 1),
            None => ParseResult::Incomplete,
        }
    }

    /// Returns the line before CRLF and the bytes consumed including CRLF.
    fn parse_line(data: &[u8]) -> Option<(&[u8], usize)> {
        find_crlf(data).map(|pos| (&data[..pos], pos + 2))
    }

    fn parse_bulk_string(data: &[u8]) -> ParseResult {
        let Some((len_line, header)) = Self::parse_line(data) else {
            return ParseResult::Incomplete;
        };

        let len = match parse_i64(len_line) {
            Some(-1) => return ParseResult::Complete(RedisValue::Null, header + 1),
            Some(len) if len >= 0 => len as usize,
            _ => return ParseResult::Error("invalid bulk string length".to_string()),
        };

        if len > MAX_BULK_SIZE {
            return ParseResult::Error(format!(
                "bulk string too large: {} > {}",
                len, MAX_BULK_SIZE
            ));
        }

        let data_end = header + len;
        if data.len() < data_end + 2 {
            return ParseResult::Incomplete;
        }

        if &data[data_end..data_end + 2] != b"\r\n" {
            return ParseResult::Error("missing CRLF after bulk string".to_string());
        }

        let bytes = Bytes::copy_from_slice(&data[header..data_end]);
        ParseResult::Complete(RedisValue::BulkString(bytes), data_end + 3)
    }

    fn parse_array(&mut self, data: &[u8]) -> ParseResult {
        let Some((len_line, header)) = Self::parse_line(data) else {
            return ParseResult::Incomplete;
        };

        let len = match parse_i64(len_line) {
            Some(-1) => return ParseResult::Complete(RedisValue::Null, header + 1),
            Some(len) if len >= 0 => len as usize,
            _ => return ParseResult::Error("invalid array length".to_string()),
        };

        if len > MAX_ELEMENTS {
            return ParseResult::Error(format!("array too large: {} > {}", len, MAX_ELEMENTS));
        }

        self.depth += 1;
        let mut elements = Vec::with_capacity(len.min(1024));
        let mut offset = header;

        for _ in 0..len {
            match self.parse_value(&data[offset..]) {
                ParseResult::Complete(value, used) => {
                    elements.push(value);
                    offset += used;
                }
                other => {
                    self.depth -= 1;
                    return other;
                }
            }
        }

        self.depth -= 1;
        ParseResult::Complete(RedisValue::Array(elements), offset + 1)
    }
}

/// RESP2 encoder.
#[derive(Debug, Default)]
pub struct RespEncoder;

impl RespEncoder {
    /// Encode a value to bytes.
    pub fn encode(value: &RedisValue) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        Self::encode_into(value, &mut buf);
        buf
    }

    /// Encode a command as an array of bulk strings.
    pub fn encode_command(cmd: &RedisCommand) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + cmd.args.iter().map(|a| a.len() + 16).sum::<usize>());
        write_header(&mut buf, b'*', cmd.args.len() + 1);
        write_bulk(&mut buf, cmd.name.as_bytes());
        for arg in &cmd.args {
            write_bulk(&mut buf, arg);
        }
        buf
    }

    /// Encode a value into a buffer.
    pub fn encode_into(value: &RedisValue, buf: &mut Vec<u8>) {
        match value {
            RedisValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::Error(e) => {
                buf.push(b'-');
                buf.extend_from_slice(e.kind.as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(e.message.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RedisValue::BulkString(data) => write_bulk(buf, data),
            RedisValue::Array(elements) => {
                write_header(buf, b'*', elements.len());
                for elem in elements {
                    Self::encode_into(elem, buf);
                }
            }
            RedisValue::Null => buf.extend_from_slice(b"$-1\r\n"),
            RedisValue::Map(pairs) => {
                write_header(buf, b'*', pairs.len() * 2);
                for (k, v) in pairs {
                    Self::encode_into(k, buf);
                    Self::encode_into(v, buf);
                }
            }
        }
    }
}

fn write_header(buf: &mut Vec<u8>, prefix: u8, len: usize) {
    buf.push(prefix);
    buf.extend_from_slice(len.to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
}

fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    write_header(buf, b'$', data.len());
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

fn parse_i64(line: &[u8]) -> Option<i64> {
    std::str::from_utf8(line).ok()?.parse().ok()
}

/// Find CRLF in buffer.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

/// Split "KIND message" into its parts.
fn parse_error_string(s: &str) -> (String, String) {
    match s.split_once(' ') {
        Some((kind, message)) if kind.chars().all(|c| c.is_ascii_uppercase()) => {
            (kind.to_string(), message.to_string())
        }
        _ => ("ERR".to_string(), s.to_string()),
    }
}
