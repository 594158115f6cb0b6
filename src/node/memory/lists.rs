//! List commands.
//!
//! Blocking variants never block here: they behave like their non-blocking
//! forms and reply null when every list is empty.

use super::store::{index_range, int_arg, CommandResult, Keyspace, Value};
use crate::protocol::{RedisCommand, RedisError, RedisValue};
use bytes::Bytes;
use std::collections::VecDeque;

#[derive(Clone, Copy, PartialEq, Eq)]
enum End {
    Left,
    Right,
}

pub(super) fn dispatch(ks: &mut Keyspace, cmd: &RedisCommand) -> Option<CommandResult> {
    let result = match cmd.name.as_str() {
        "LPUSH" => push(ks, cmd, End::Left, false),
        "RPUSH" => push(ks, cmd, End::Right, false),
        "LPUSHX" => push(ks, cmd, End::Left, true),
        "RPUSHX" => push(ks, cmd, End::Right, true),
        "LPOP" => pop(ks, cmd, End::Left),
        "RPOP" => pop(ks, cmd, End::Right),
        "LLEN" => llen(ks, cmd),
        "LRANGE" => lrange(ks, cmd),
        "LTRIM" => ltrim(ks, cmd),
        "LINDEX" => lindex(ks, cmd),
        "LINSERT" => linsert(ks, cmd),
        "LSET" => lset(ks, cmd),
        "LREM" => lrem(ks, cmd),
        "RPOPLPUSH" => cmd.require_argc(2).and_then(|_| rpoplpush(ks, cmd)),
        "BRPOPLPUSH" => cmd.require_argc(3).and_then(|_| rpoplpush(ks, cmd)),
        "BLPOP" => blocking_pop(ks, cmd, End::Left),
        "BRPOP" => blocking_pop(ks, cmd, End::Right),
        _ => return None,
    };
    Some(result)
}

/// Existing list for a key, or `None` when the key is absent.
fn list<'a>(
    ks: &'a mut Keyspace,
    key: &[u8],
) -> Result<Option<&'a mut VecDeque<Bytes>>, RedisError> {
    match ks.get(key) {
        Some(entry) => Ok(Some(entry.value.as_list_mut()?)),
        None => Ok(None),
    }
}

fn push(ks: &mut Keyspace, cmd: &RedisCommand, end: End, only_existing: bool) -> CommandResult {
    cmd.require_min_argc(2)?;
    let key = &cmd.args[0];
    if only_existing && list(ks, key)?.is_none() {
        return Ok(RedisValue::integer(0));
    }

    let items = ks
        .get_or_insert(key, || Value::List(VecDeque::new()))
        .value
        .as_list_mut()?;
    for value in &cmd.args[1..] {
        match end {
            End::Left => items.push_front(value.clone()),
            End::Right => items.push_back(value.clone()),
        }
    }
    Ok(RedisValue::integer(items.len() as i64))
}

fn pop_one(ks: &mut Keyspace, key: &[u8], end: End) -> Result<Option<Bytes>, RedisError> {
    let popped = match list(ks, key)? {
        Some(items) => match end {
            End::Left => items.pop_front(),
            End::Right => items.pop_back(),
        },
        None => None,
    };
    ks.remove_if_empty(key);
    Ok(popped)
}

fn pop(ks: &mut Keyspace, cmd: &RedisCommand, end: End) -> CommandResult {
    cmd.require_argc(1)?;
    Ok(RedisValue::optional_bulk(pop_one(ks, &cmd.args[0], end)?))
}

fn llen(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    let len = list(ks, &cmd.args[0])?.map_or(0, |l| l.len());
    Ok(RedisValue::integer(len as i64))
}

fn lrange(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let (start, stop) = (int_arg(cmd, 1)?, int_arg(cmd, 2)?);
    let items = match list(ks, &cmd.args[0])? {
        Some(items) => match index_range(start, stop, items.len()) {
            Some((from, to)) => items
                .range(from..=to)
                .cloned()
                .map(RedisValue::BulkString)
                .collect(),
            None => Vec::new(),
        },
        None => Vec::new(),
    };
    Ok(RedisValue::array(items))
}

fn ltrim(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let (start, stop) = (int_arg(cmd, 1)?, int_arg(cmd, 2)?);
    let key = &cmd.args[0];
    if let Some(items) = list(ks, key)? {
        match index_range(start, stop, items.len()) {
            Some((from, to)) => {
                items.truncate(to + 1);
                items.drain(..from);
            }
            None => items.clear(),
        }
    }
    ks.remove_if_empty(key);
    Ok(RedisValue::ok())
}

/// Resolve a possibly negative single index.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let index = if index < 0 { len as i64 + index } else { index };
    (0..len as i64).contains(&index).then_some(index as usize)
}

fn lindex(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    let index = int_arg(cmd, 1)?;
    let value = list(ks, &cmd.args[0])?
        .and_then(|items| resolve_index(index, items.len()).map(|i| items[i].clone()));
    Ok(RedisValue::optional_bulk(value))
}

fn linsert(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(4)?;
    let after = match cmd.arg_str(1).map(str::to_uppercase).as_deref() {
        Some("BEFORE") => false,
        Some("AFTER") => true,
        _ => return Err(RedisError::syntax()),
    };
    let (pivot, value) = (&cmd.args[2], &cmd.args[3]);

    let Some(items) = list(ks, &cmd.args[0])? else {
        return Ok(RedisValue::integer(0));
    };
    match items.iter().position(|item| item == pivot) {
        Some(at) => {
            items.insert(if after { at + 1 } else { at }, value.clone());
            Ok(RedisValue::integer(items.len() as i64))
        }
        None => Ok(RedisValue::integer(-1)),
    }
}

fn lset(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let index = int_arg(cmd, 1)?;
    let items = list(ks, &cmd.args[0])?.ok_or_else(RedisError::no_such_key)?;
    let at = resolve_index(index, items.len())
        .ok_or_else(|| RedisError::generic("index out of range"))?;
    items[at] = cmd.args[2].clone();
    Ok(RedisValue::ok())
}

fn lrem(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let count = int_arg(cmd, 1)?;
    let key = &cmd.args[0];
    let target = &cmd.args[2];

    let removed = match list(ks, key)? {
        Some(items) => {
            let limit = if count == 0 {
                usize::MAX
            } else {
                count.unsigned_abs() as usize
            };
            let mut removed = 0;
            if count >= 0 {
                let mut i = 0;
                while i < items.len() && removed < limit {
                    if &items[i] == target {
                        items.remove(i);
                        removed += 1;
                    } else {
                        i += 1;
                    }
                }
            } else {
                let mut i = items.len();
                while i > 0 && removed < limit {
                    i -= 1;
                    if &items[i] == target {
                        items.remove(i);
                        removed += 1;
                    }
                }
            }
            removed
        }
        None => 0,
    };
    ks.remove_if_empty(key);
    Ok(RedisValue::integer(removed as i64))
}

fn rpoplpush(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    let (source, destination) = (&cmd.args[0], &cmd.args[1]);
    // type-check the destination before mutating the source
    list(ks, destination)?;

    let Some(value) = pop_one(ks, source, End::Right)? else {
        return Ok(RedisValue::Null);
    };
    ks.get_or_insert(destination, || Value::List(VecDeque::new()))
        .value
        .as_list_mut()?
        .push_front(value.clone());
    Ok(RedisValue::BulkString(value))
}

fn blocking_pop(ks: &mut Keyspace, cmd: &RedisCommand, end: End) -> CommandResult {
    cmd.require_min_argc(2)?;
    let keys = &cmd.args[..cmd.argc() - 1];
    for key in keys {
        if let Some(value) = pop_one(ks, key, end)? {
            return Ok(RedisValue::array(vec![
                RedisValue::BulkString(key.clone()),
                RedisValue::BulkString(value),
            ]));
        }
    }
    Ok(RedisValue::Null)
}
