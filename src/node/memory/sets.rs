//! Set commands.

use super::store::{
    glob_match, int_arg, random_u64, scan_args, scan_page, CommandResult, Keyspace, Value,
};
use crate::protocol::{RedisCommand, RedisError, RedisValue};
use bytes::Bytes;
use std::collections::BTreeSet;

#[derive(Clone, Copy)]
enum Combine {
    Inter,
    Union,
    Diff,
}

pub(super) fn dispatch(ks: &mut Keyspace, cmd: &RedisCommand) -> Option<CommandResult> {
    let result = match cmd.name.as_str() {
        "SADD" => sadd(ks, cmd),
        "SREM" => srem(ks, cmd),
        "SCARD" => scard(ks, cmd),
        "SISMEMBER" => sismember(ks, cmd),
        "SMEMBERS" => smembers(ks, cmd),
        "SPOP" => spop(ks, cmd),
        "SRANDMEMBER" => srandmember(ks, cmd),
        "SMOVE" => smove(ks, cmd),
        "SINTER" => combine(ks, cmd, Combine::Inter, false),
        "SUNION" => combine(ks, cmd, Combine::Union, false),
        "SDIFF" => combine(ks, cmd, Combine::Diff, false),
        "SINTERSTORE" => combine(ks, cmd, Combine::Inter, true),
        "SUNIONSTORE" => combine(ks, cmd, Combine::Union, true),
        "SDIFFSTORE" => combine(ks, cmd, Combine::Diff, true),
        "SSCAN" => sscan(ks, cmd),
        _ => return None,
    };
    Some(result)
}

fn set<'a>(
    ks: &'a mut Keyspace,
    key: &[u8],
) -> Result<Option<&'a mut BTreeSet<Bytes>>, RedisError> {
    match ks.get(key) {
        Some(entry) => Ok(Some(entry.value.as_set_mut()?)),
        None => Ok(None),
    }
}

/// Owned copy of a set, empty when the key is absent.
fn members(ks: &mut Keyspace, key: &[u8]) -> Result<BTreeSet<Bytes>, RedisError> {
    Ok(set(ks, key)?.cloned().unwrap_or_default())
}

fn bulk_array(items: impl IntoIterator<Item = Bytes>) -> RedisValue {
    RedisValue::array(items.into_iter().map(RedisValue::BulkString).collect())
}

fn sadd(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(2)?;
    let items = ks
        .get_or_insert(&cmd.args[0], || Value::Set(BTreeSet::new()))
        .value
        .as_set_mut()?;
    let added = cmd.args[1..]
        .iter()
        .filter(|m| items.insert((*m).clone()))
        .count();
    Ok(RedisValue::integer(added as i64))
}

fn srem(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(2)?;
    let key = &cmd.args[0];
    let removed = match set(ks, key)? {
        Some(items) => cmd.args[1..].iter().filter(|m| items.remove(*m)).count(),
        None => 0,
    };
    ks.remove_if_empty(key);
    Ok(RedisValue::integer(removed as i64))
}

fn scard(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    let len = set(ks, &cmd.args[0])?.map_or(0, |s| s.len());
    Ok(RedisValue::integer(len as i64))
}

fn sismember(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    let found = set(ks, &cmd.args[0])?.is_some_and(|s| s.contains(&cmd.args[1]));
    Ok(RedisValue::integer(found as i64))
}

fn smembers(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    Ok(bulk_array(members(ks, &cmd.args[0])?))
}

fn pick(items: &BTreeSet<Bytes>) -> Option<Bytes> {
    if items.is_empty() {
        return None;
    }
    let index = (random_u64() % items.len() as u64) as usize;
    items.iter().nth(index).cloned()
}

fn spop(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc_range(1, 2)?;
    let key = &cmd.args[0];
    let count = if cmd.argc() == 2 {
        Some(int_arg(cmd, 1)?.max(0) as usize)
    } else {
        None
    };

    let mut popped = Vec::new();
    if let Some(items) = set(ks, key)? {
        for _ in 0..count.unwrap_or(1) {
            let Some(member) = pick(items) else { break };
            items.remove(&member);
            popped.push(member);
        }
    }
    ks.remove_if_empty(key);

    Ok(match count {
        Some(_) => bulk_array(popped),
        None => RedisValue::optional_bulk(popped.pop()),
    })
}

fn srandmember(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc_range(1, 2)?;
    let items = members(ks, &cmd.args[0])?;
    if cmd.argc() == 1 {
        return Ok(RedisValue::optional_bulk(pick(&items)));
    }

    let count = int_arg(cmd, 1)?;
    if count >= 0 {
        // distinct members
        let mut pool = items;
        let mut chosen = Vec::new();
        while chosen.len() < count as usize {
            let Some(member) = pick(&pool) else { break };
            pool.remove(&member);
            chosen.push(member);
        }
        Ok(bulk_array(chosen))
    } else {
        let chosen = (0..count.unsigned_abs()).filter_map(|_| pick(&items));
        Ok(bulk_array(chosen.collect::<Vec<_>>()))
    }
}

fn smove(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let (source, destination, member) = (&cmd.args[0], &cmd.args[1], &cmd.args[2]);
    set(ks, destination)?;

    let moved = set(ks, source)?.is_some_and(|s| s.remove(member));
    if !moved {
        return Ok(RedisValue::integer(0));
    }
    ks.remove_if_empty(source);
    ks.get_or_insert(destination, || Value::Set(BTreeSet::new()))
        .value
        .as_set_mut()?
        .insert(member.clone());
    Ok(RedisValue::integer(1))
}

fn sscan(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    let pattern = scan_args(cmd)?;
    let items = members(ks, &cmd.args[0])?
        .into_iter()
        .filter(|m| pattern.as_ref().map_or(true, |p| glob_match(p, m)))
        .map(RedisValue::BulkString)
        .collect();
    Ok(scan_page(items))
}

fn combine(ks: &mut Keyspace, cmd: &RedisCommand, op: Combine, store: bool) -> CommandResult {
    let first = usize::from(store);
    cmd.require_min_argc(first + 1)?;

    let mut sets = cmd.args[first..].iter().map(|key| members(ks, key));
    let mut result = match sets.next() {
        Some(first) => first?,
        None => BTreeSet::new(),
    };
    for other in sets {
        let other = other?;
        match op {
            Combine::Inter => result.retain(|m| other.contains(m)),
            Combine::Union => result.extend(other),
            Combine::Diff => result.retain(|m| !other.contains(m)),
        }
    }

    if !store {
        return Ok(bulk_array(result));
    }
    let destination = cmd.args[0].clone();
    let len = result.len();
    if result.is_empty() {
        ks.remove(&destination);
    } else {
        ks.set(destination, Value::Set(result));
    }
    Ok(RedisValue::integer(len as i64))
}
