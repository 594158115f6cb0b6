//! String commands.

use super::store::{float_arg, int_arg, key_arg, CommandResult, Entry, Keyspace, Value};
use crate::protocol::{RedisCommand, RedisError, RedisValue};
use bytes::{Bytes, BytesMut};
use std::time::{Duration, Instant};

/// Maximum string length reachable through SETRANGE/SETBIT (512MB).
const MAX_STRING_LEN: usize = 512 * 1024 * 1024;

pub(super) fn dispatch(ks: &mut Keyspace, cmd: &RedisCommand) -> Option<CommandResult> {
    let result = match cmd.name.as_str() {
        "GET" => get(ks, cmd),
        "SET" => set(ks, cmd),
        "SETNX" => setnx(ks, cmd),
        "SETEX" => setex(ks, cmd, Duration::from_secs),
        "PSETEX" => setex(ks, cmd, Duration::from_millis),
        "GETSET" => getset(ks, cmd),
        "MGET" => mget(ks, cmd),
        "MSET" => mset(ks, cmd, false),
        "MSETNX" => mset(ks, cmd, true),
        "INCR" => incr_by(ks, cmd, 1, 1),
        "DECR" => incr_by(ks, cmd, -1, 1),
        "INCRBY" => int_arg(cmd, 1).and_then(|n| incr_by(ks, cmd, n, 2)),
        "DECRBY" => int_arg(cmd, 1).and_then(|n| {
            let n = n.checked_neg().ok_or_else(RedisError::not_integer)?;
            incr_by(ks, cmd, n, 2)
        }),
        "INCRBYFLOAT" => incr_by_float(ks, cmd),
        "APPEND" => append(ks, cmd),
        "STRLEN" => strlen(ks, cmd),
        "GETRANGE" => getrange(ks, cmd),
        "SETRANGE" => setrange(ks, cmd),
        "GETBIT" => getbit(ks, cmd),
        "SETBIT" => setbit(ks, cmd),
        "BITCOUNT" => bitcount(ks, cmd),
        "BITOP" => bitop(ks, cmd),
        _ => return None,
    };
    Some(result)
}

fn read_string(ks: &mut Keyspace, key: &[u8]) -> Result<Option<Bytes>, RedisError> {
    match ks.get(key) {
        Some(entry) => Ok(Some(entry.value.as_str()?.clone())),
        None => Ok(None),
    }
}

/// Replace a string value keeping the key's expiry.
fn overwrite(ks: &mut Keyspace, key: &Bytes, value: Bytes) {
    let expires_at = ks.get(key).and_then(|e| e.expires_at);
    ks.insert(
        key.clone(),
        Entry {
            value: Value::Str(value),
            expires_at,
        },
    );
}

fn get(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    Ok(RedisValue::optional_bulk(read_string(ks, &cmd.args[0])?))
}

fn set(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(2)?;
    let key = &cmd.args[0];

    let mut nx = false;
    let mut xx = false;
    let mut ttl = None;
    let mut i = 2;
    while i < cmd.argc() {
        let option = cmd.arg_str(i).map(str::to_uppercase).unwrap_or_default();
        match option.as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            "EX" | "PX" => {
                let n = int_arg(cmd, i + 1)?;
                if n <= 0 {
                    return Err(RedisError::generic("invalid expire time in 'set' command"));
                }
                ttl = Some(if option == "EX" {
                    Duration::from_secs(n as u64)
                } else {
                    Duration::from_millis(n as u64)
                });
                i += 1;
            }
            _ => return Err(RedisError::syntax()),
        }
        i += 1;
    }
    if nx && xx {
        return Err(RedisError::syntax());
    }

    let exists = ks.contains(key);
    if (nx && exists) || (xx && !exists) {
        return Ok(RedisValue::Null);
    }

    ks.insert(
        key.clone(),
        Entry {
            value: Value::Str(cmd.args[1].clone()),
            expires_at: ttl.map(|d| Instant::now() + d),
        },
    );
    Ok(RedisValue::ok())
}

fn setnx(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    if ks.contains(&cmd.args[0]) {
        return Ok(RedisValue::integer(0));
    }
    ks.set(cmd.args[0].clone(), Value::Str(cmd.args[1].clone()));
    Ok(RedisValue::integer(1))
}

fn setex(ks: &mut Keyspace, cmd: &RedisCommand, unit: fn(u64) -> Duration) -> CommandResult {
    cmd.require_argc(3)?;
    let ttl = int_arg(cmd, 1)?;
    if ttl <= 0 {
        return Err(RedisError::generic(format!(
            "invalid expire time in '{}' command",
            cmd.name.to_lowercase()
        )));
    }
    ks.insert(
        cmd.args[0].clone(),
        Entry {
            value: Value::Str(cmd.args[2].clone()),
            expires_at: Some(Instant::now() + unit(ttl as u64)),
        },
    );
    Ok(RedisValue::ok())
}

fn getset(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    let previous = read_string(ks, &cmd.args[0])?;
    ks.set(cmd.args[0].clone(), Value::Str(cmd.args[1].clone()));
    Ok(RedisValue::optional_bulk(previous))
}

fn mget(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(1)?;
    let values = cmd
        .args
        .iter()
        .map(|key| match ks.get(key).map(|e| &e.value) {
            Some(Value::Str(s)) => RedisValue::BulkString(s.clone()),
            _ => RedisValue::Null,
        })
        .collect();
    Ok(RedisValue::array(values))
}

fn mset(ks: &mut Keyspace, cmd: &RedisCommand, only_new: bool) -> CommandResult {
    if cmd.argc() == 0 || cmd.argc() % 2 != 0 {
        return Err(RedisError::wrong_arity(&cmd.name));
    }
    let pairs = cmd.args.chunks_exact(2);
    if only_new && pairs.clone().any(|pair| ks.contains(&pair[0])) {
        return Ok(RedisValue::integer(0));
    }
    for pair in pairs {
        ks.set(pair[0].clone(), Value::Str(pair[1].clone()));
    }
    Ok(if only_new {
        RedisValue::integer(1)
    } else {
        RedisValue::ok()
    })
}

fn incr_by(ks: &mut Keyspace, cmd: &RedisCommand, delta: i64, argc: usize) -> CommandResult {
    cmd.require_argc(argc)?;
    let key = &cmd.args[0];
    let current = match read_string(ks, key)? {
        Some(s) => std::str::from_utf8(&s)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(RedisError::not_integer)?,
        None => 0,
    };
    let next = current
        .checked_add(delta)
        .ok_or_else(|| RedisError::generic("increment or decrement would overflow"))?;
    overwrite(ks, key, Bytes::from(next.to_string()));
    Ok(RedisValue::integer(next))
}

fn incr_by_float(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    let delta = float_arg(cmd, 1)?;
    let key = &cmd.args[0];
    let current = match read_string(ks, key)? {
        Some(s) => std::str::from_utf8(&s)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(RedisError::not_float)?,
        None => 0.0,
    };
    let next = current + delta;
    if !next.is_finite() {
        return Err(RedisError::generic("increment would produce NaN or Infinity"));
    }
    let formatted = Bytes::from(format_float(next));
    overwrite(ks, key, formatted.clone());
    Ok(RedisValue::BulkString(formatted))
}

/// Format a float the way Redis replies with it: no trailing zeros.
pub(super) fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e17 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn append(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    let key = &cmd.args[0];
    let mut value = BytesMut::from(read_string(ks, key)?.unwrap_or_default().as_ref());
    value.extend_from_slice(&cmd.args[1]);
    let len = value.len();
    overwrite(ks, key, value.freeze());
    Ok(RedisValue::integer(len as i64))
}

fn strlen(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    let len = read_string(ks, &cmd.args[0])?.map_or(0, |s| s.len());
    Ok(RedisValue::integer(len as i64))
}

fn getrange(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let start = int_arg(cmd, 1)?;
    let end = int_arg(cmd, 2)?;
    let value = read_string(ks, &cmd.args[0])?.unwrap_or_default();
    match super::store::index_range(start, end, value.len()) {
        Some((from, to)) => Ok(RedisValue::BulkString(value.slice(from..=to))),
        None => Ok(RedisValue::bulk(Bytes::new())),
    }
}

fn setrange(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let key = key_arg(cmd, 0)?;
    let offset = int_arg(cmd, 1)?;
    if offset < 0 {
        return Err(RedisError::generic("offset is out of range"));
    }
    let offset = offset as usize;
    let patch = &cmd.args[2];
    if offset + patch.len() > MAX_STRING_LEN {
        return Err(RedisError::generic("string exceeds maximum allowed size"));
    }

    let current = read_string(ks, key)?;
    if patch.is_empty() {
        return Ok(RedisValue::integer(current.map_or(0, |s| s.len()) as i64));
    }

    let mut value = BytesMut::from(current.unwrap_or_default().as_ref());
    if value.len() < offset + patch.len() {
        value.resize(offset + patch.len(), 0);
    }
    value[offset..offset + patch.len()].copy_from_slice(patch);
    let len = value.len();
    overwrite(ks, key, value.freeze());
    Ok(RedisValue::integer(len as i64))
}

fn bit_offset(cmd: &RedisCommand) -> Result<usize, RedisError> {
    cmd.arg_int(1)
        .filter(|n| *n >= 0 && (*n as usize) < MAX_STRING_LEN * 8)
        .map(|n| n as usize)
        .ok_or_else(|| RedisError::generic("bit offset is not an integer or out of range"))
}

fn getbit(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    let offset = bit_offset(cmd)?;
    let value = read_string(ks, &cmd.args[0])?.unwrap_or_default();
    let bit = value
        .get(offset / 8)
        .map_or(0, |byte| (byte >> (7 - offset % 8)) & 1);
    Ok(RedisValue::integer(bit as i64))
}

fn setbit(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let offset = bit_offset(cmd)?;
    let on = match cmd.arg_str(2) {
        Some("1") => true,
        Some("0") => false,
        _ => return Err(RedisError::generic("bit is not an integer or out of range")),
    };
    let key = &cmd.args[0];
    let mut value = BytesMut::from(read_string(ks, key)?.unwrap_or_default().as_ref());
    if value.len() <= offset / 8 {
        value.resize(offset / 8 + 1, 0);
    }
    let mask = 1u8 << (7 - offset % 8);
    let previous = (value[offset / 8] & mask != 0) as i64;
    if on {
        value[offset / 8] |= mask;
    } else {
        value[offset / 8] &= !mask;
    }
    overwrite(ks, key, value.freeze());
    Ok(RedisValue::integer(previous))
}

fn bitcount(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    if cmd.argc() != 1 && cmd.argc() != 3 {
        return Err(RedisError::syntax());
    }
    let value = read_string(ks, &cmd.args[0])?.unwrap_or_default();
    let bytes = if cmd.argc() == 3 {
        match super::store::index_range(int_arg(cmd, 1)?, int_arg(cmd, 2)?, value.len()) {
            Some((from, to)) => value.slice(from..=to),
            None => Bytes::new(),
        }
    } else {
        value
    };
    let count: u32 = bytes.iter().map(|b| b.count_ones()).sum();
    Ok(RedisValue::integer(count as i64))
}

/// BITOP AND|OR|XOR|NOT destkey srckey [srckey ...]
fn bitop(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(3)?;
    let op = cmd.arg_str(0).map(str::to_uppercase).unwrap_or_default();
    let sources = cmd.args[2..]
        .iter()
        .map(|key| Ok(read_string(ks, key)?.unwrap_or_default()))
        .collect::<Result<Vec<_>, RedisError>>()?;

    let len = sources.iter().map(|s| s.len()).max().unwrap_or(0);
    let byte = |source: &Bytes, i: usize| source.get(i).copied().unwrap_or(0);
    let result: Vec<u8> = match op.as_str() {
        "NOT" => {
            if sources.len() != 1 {
                return Err(RedisError::generic(
                    "BITOP NOT must be called with a single source key.",
                ));
            }
            sources[0].iter().map(|b| !b).collect()
        }
        "AND" | "OR" | "XOR" => (0..len)
            .map(|i| {
                let mut bytes = sources.iter().map(|s| byte(s, i));
                let first = bytes.next().unwrap_or(0);
                bytes.fold(first, |acc, b| match op.as_str() {
                    "AND" => acc & b,
                    "OR" => acc | b,
                    _ => acc ^ b,
                })
            })
            .collect(),
        _ => return Err(RedisError::syntax()),
    };

    let destination = cmd.args[1].clone();
    let written = result.len();
    if result.is_empty() {
        ks.remove(&destination);
    } else {
        ks.set(destination, Value::Str(Bytes::from(result)));
    }
    Ok(RedisValue::integer(written as i64))
}
