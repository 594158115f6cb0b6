//! Hash commands.

use super::store::{
    float_arg, glob_match, int_arg, scan_args, scan_page, CommandResult, Keyspace, Value,
};
use super::strings::format_float;
use crate::protocol::{RedisCommand, RedisError, RedisValue};
use bytes::Bytes;
use std::collections::BTreeMap;

pub(super) fn dispatch(ks: &mut Keyspace, cmd: &RedisCommand) -> Option<CommandResult> {
    let result = match cmd.name.as_str() {
        "HSET" => hset(ks, cmd, false),
        "HMSET" => hset(ks, cmd, true),
        "HSETNX" => hsetnx(ks, cmd),
        "HGET" => hget(ks, cmd),
        "HMGET" => hmget(ks, cmd),
        "HDEL" => hdel(ks, cmd),
        "HEXISTS" => hexists(ks, cmd),
        "HLEN" => hlen(ks, cmd),
        "HSTRLEN" => hstrlen(ks, cmd),
        "HKEYS" => listing(ks, cmd, |field, _| vec![field]),
        "HVALS" => listing(ks, cmd, |_, value| vec![value]),
        "HGETALL" => listing(ks, cmd, |field, value| vec![field, value]),
        "HINCRBY" => hincrby(ks, cmd),
        "HINCRBYFLOAT" => hincrbyfloat(ks, cmd),
        "HSCAN" => hscan(ks, cmd),
        _ => return None,
    };
    Some(result)
}

fn hash<'a>(
    ks: &'a mut Keyspace,
    key: &[u8],
) -> Result<Option<&'a mut BTreeMap<Bytes, Bytes>>, RedisError> {
    match ks.get(key) {
        Some(entry) => Ok(Some(entry.value.as_hash_mut()?)),
        None => Ok(None),
    }
}

fn hash_or_create<'a>(
    ks: &'a mut Keyspace,
    key: &Bytes,
) -> Result<&'a mut BTreeMap<Bytes, Bytes>, RedisError> {
    ks.get_or_insert(key, || Value::Hash(BTreeMap::new()))
        .value
        .as_hash_mut()
}

/// HSET replies with the number of new fields, HMSET with OK.
fn hset(ks: &mut Keyspace, cmd: &RedisCommand, legacy: bool) -> CommandResult {
    if cmd.argc() < 3 || cmd.argc() % 2 == 0 {
        return Err(RedisError::wrong_arity(&cmd.name));
    }
    let fields = hash_or_create(ks, &cmd.args[0])?;
    let added = cmd.args[1..]
        .chunks_exact(2)
        .filter(|pair| fields.insert(pair[0].clone(), pair[1].clone()).is_none())
        .count();
    Ok(if legacy {
        RedisValue::ok()
    } else {
        RedisValue::integer(added as i64)
    })
}

fn hsetnx(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let fields = hash_or_create(ks, &cmd.args[0])?;
    if fields.contains_key(&cmd.args[1]) {
        return Ok(RedisValue::integer(0));
    }
    fields.insert(cmd.args[1].clone(), cmd.args[2].clone());
    Ok(RedisValue::integer(1))
}

fn hget(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    let value = hash(ks, &cmd.args[0])?.and_then(|h| h.get(&cmd.args[1]).cloned());
    Ok(RedisValue::optional_bulk(value))
}

fn hmget(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(2)?;
    let fields = hash(ks, &cmd.args[0])?;
    let values = cmd.args[1..]
        .iter()
        .map(|field| {
            let value = fields.as_ref().and_then(|h| h.get(field).cloned());
            RedisValue::optional_bulk(value)
        })
        .collect();
    Ok(RedisValue::array(values))
}

fn hdel(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(2)?;
    let key = &cmd.args[0];
    let removed = match hash(ks, key)? {
        Some(fields) => cmd.args[1..]
            .iter()
            .filter(|f| fields.remove(*f).is_some())
            .count(),
        None => 0,
    };
    ks.remove_if_empty(key);
    Ok(RedisValue::integer(removed as i64))
}

fn hexists(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    let found = hash(ks, &cmd.args[0])?.is_some_and(|h| h.contains_key(&cmd.args[1]));
    Ok(RedisValue::integer(found as i64))
}

fn hlen(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    let len = hash(ks, &cmd.args[0])?.map_or(0, |h| h.len());
    Ok(RedisValue::integer(len as i64))
}

fn hstrlen(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    let len = hash(ks, &cmd.args[0])?
        .and_then(|h| h.get(&cmd.args[1]).map(|v| v.len()))
        .unwrap_or(0);
    Ok(RedisValue::integer(len as i64))
}

fn listing(
    ks: &mut Keyspace,
    cmd: &RedisCommand,
    emit: fn(Bytes, Bytes) -> Vec<Bytes>,
) -> CommandResult {
    cmd.require_argc(1)?;
    let items = match hash(ks, &cmd.args[0])? {
        Some(fields) => fields
            .iter()
            .flat_map(|(f, v)| emit(f.clone(), v.clone()))
            .map(RedisValue::BulkString)
            .collect(),
        None => Vec::new(),
    };
    Ok(RedisValue::array(items))
}

fn hincrby(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let delta = int_arg(cmd, 2)?;
    let fields = hash_or_create(ks, &cmd.args[0])?;
    let current = match fields.get(&cmd.args[1]) {
        Some(v) => std::str::from_utf8(v)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| RedisError::generic("hash value is not an integer"))?,
        None => 0,
    };
    let next = current
        .checked_add(delta)
        .ok_or_else(|| RedisError::generic("increment or decrement would overflow"))?;
    fields.insert(cmd.args[1].clone(), Bytes::from(next.to_string()));
    Ok(RedisValue::integer(next))
}

fn hincrbyfloat(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let delta = float_arg(cmd, 2)?;
    let fields = hash_or_create(ks, &cmd.args[0])?;
    let current = match fields.get(&cmd.args[1]) {
        Some(v) => std::str::from_utf8(v)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| RedisError::generic("hash value is not a float"))?,
        None => 0.0,
    };
    let next = current + delta;
    if !next.is_finite() {
        return Err(RedisError::generic("increment would produce NaN or Infinity"));
    }
    let formatted = Bytes::from(format_float(next));
    fields.insert(cmd.args[1].clone(), formatted.clone());
    Ok(RedisValue::BulkString(formatted))
}

fn hscan(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    let pattern = scan_args(cmd)?;
    let mut items = Vec::new();
    if let Some(fields) = hash(ks, &cmd.args[0])? {
        for (field, value) in fields.iter() {
            if pattern.as_ref().map_or(true, |p| glob_match(p, field)) {
                items.push(RedisValue::BulkString(field.clone()));
                items.push(RedisValue::BulkString(value.clone()));
            }
        }
    }
    Ok(scan_page(items))
}
