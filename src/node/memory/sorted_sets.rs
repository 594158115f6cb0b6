//! Sorted set commands.
//!
//! Members are stored by name; ordering by (score, member) is computed per
//! command.

use super::store::{
    float_arg, glob_match, index_range, int_arg, scan_args, scan_page, CommandResult, Keyspace,
    Value,
};
use super::strings::format_float;
use crate::protocol::{RedisCommand, RedisError, RedisValue};
use bytes::Bytes;
use std::collections::BTreeMap;

pub(super) fn dispatch(ks: &mut Keyspace, cmd: &RedisCommand) -> Option<CommandResult> {
    let result = match cmd.name.as_str() {
        "ZADD" => zadd(ks, cmd),
        "ZINCRBY" => zincrby(ks, cmd),
        "ZSCORE" => zscore(ks, cmd),
        "ZCARD" => zcard(ks, cmd),
        "ZREM" => zrem(ks, cmd),
        "ZRANK" => zrank(ks, cmd, false),
        "ZREVRANK" => zrank(ks, cmd, true),
        "ZRANGE" => zrange(ks, cmd, false),
        "ZREVRANGE" => zrange(ks, cmd, true),
        "ZRANGEBYSCORE" => zrangebyscore(ks, cmd),
        "ZCOUNT" => zcount(ks, cmd),
        "ZREMRANGEBYRANK" => zremrangebyrank(ks, cmd),
        "ZREMRANGEBYSCORE" => zremrangebyscore(ks, cmd),
        "ZSCAN" => zscan(ks, cmd),
        _ => return None,
    };
    Some(result)
}

/// One end of a score interval.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bound {
    value: f64,
    exclusive: bool,
}

impl Bound {
    fn parse(cmd: &RedisCommand, index: usize) -> Result<Self, RedisError> {
        let raw = cmd.arg_str(index).ok_or_else(RedisError::not_float)?;
        let (exclusive, number) = match raw.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let value = match number.to_ascii_lowercase().as_str() {
            "-inf" => f64::NEG_INFINITY,
            "+inf" | "inf" => f64::INFINITY,
            other => other
                .parse::<f64>()
                .ok()
                .filter(|v| !v.is_nan())
                .ok_or_else(|| RedisError::generic("min or max is not a float"))?,
        };
        Ok(Self { value, exclusive })
    }

    fn below(&self, score: f64) -> bool {
        if self.exclusive {
            self.value < score
        } else {
            self.value <= score
        }
    }

    fn above(&self, score: f64) -> bool {
        if self.exclusive {
            score < self.value
        } else {
            score <= self.value
        }
    }
}

fn zset<'a>(
    ks: &'a mut Keyspace,
    key: &[u8],
) -> Result<Option<&'a mut BTreeMap<Bytes, f64>>, RedisError> {
    match ks.get(key) {
        Some(entry) => Ok(Some(entry.value.as_zset_mut()?)),
        None => Ok(None),
    }
}

/// Members in ascending (score, member) order.
fn ordered(members: &BTreeMap<Bytes, f64>) -> Vec<(Bytes, f64)> {
    let mut items: Vec<_> = members.iter().map(|(m, s)| (m.clone(), *s)).collect();
    items.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    items
}

fn reply(items: Vec<(Bytes, f64)>, with_scores: bool) -> RedisValue {
    let mut out = Vec::with_capacity(items.len() * if with_scores { 2 } else { 1 });
    for (member, score) in items {
        out.push(RedisValue::BulkString(member));
        if with_scores {
            out.push(RedisValue::bulk_string(format_float(score)));
        }
    }
    RedisValue::array(out)
}

#[derive(Default)]
struct AddFlags {
    nx: bool,
    xx: bool,
    ch: bool,
    incr: bool,
}

fn zadd(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(3)?;
    let mut flags = AddFlags::default();
    let mut i = 1;
    while let Some(flag) = cmd.arg_str(i).map(str::to_uppercase) {
        match flag.as_str() {
            "NX" => flags.nx = true,
            "XX" => flags.xx = true,
            "CH" => flags.ch = true,
            "INCR" => flags.incr = true,
            _ => break,
        }
        i += 1;
    }

    let pairs = &cmd.args[i..];
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Err(RedisError::syntax());
    }
    if flags.nx && flags.xx {
        return Err(RedisError::generic(
            "XX and NX options at the same time are not compatible",
        ));
    }
    if flags.incr && pairs.len() != 2 {
        return Err(RedisError::generic(
            "INCR option supports a single increment-element pair",
        ));
    }
    let scores = (i..cmd.argc())
        .step_by(2)
        .map(|at| float_arg(cmd, at))
        .collect::<Result<Vec<_>, _>>()?;

    let key = &cmd.args[0];
    if zset(ks, key)?.is_none() && flags.xx {
        return Ok(if flags.incr {
            RedisValue::Null
        } else {
            RedisValue::integer(0)
        });
    }
    let members = ks
        .get_or_insert(key, || Value::ZSet(BTreeMap::new()))
        .value
        .as_zset_mut()?;

    let mut added = 0;
    let mut changed = 0;
    let mut last_score = None;
    for (pair, score) in pairs.chunks_exact(2).zip(scores) {
        let member = &pair[1];
        let existing = members.get(member).copied();
        if (flags.nx && existing.is_some()) || (flags.xx && existing.is_none()) {
            continue;
        }
        let score = if flags.incr {
            existing.unwrap_or(0.0) + score
        } else {
            score
        };
        if score.is_nan() {
            return Err(RedisError::generic("resulting score is not a number (NaN)"));
        }
        match existing {
            None => added += 1,
            Some(old) if old != score => changed += 1,
            Some(_) => {}
        }
        members.insert(member.clone(), score);
        last_score = Some(score);
    }
    ks.remove_if_empty(key);

    if flags.incr {
        return Ok(last_score
            .map(|s| RedisValue::bulk_string(format_float(s)))
            .unwrap_or(RedisValue::Null));
    }
    Ok(RedisValue::integer(if flags.ch {
        added + changed
    } else {
        added
    }))
}

fn zincrby(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let delta = float_arg(cmd, 1)?;
    let members = ks
        .get_or_insert(&cmd.args[0], || Value::ZSet(BTreeMap::new()))
        .value
        .as_zset_mut()?;
    let score = members.get(&cmd.args[2]).copied().unwrap_or(0.0) + delta;
    if score.is_nan() {
        return Err(RedisError::generic("resulting score is not a number (NaN)"));
    }
    members.insert(cmd.args[2].clone(), score);
    Ok(RedisValue::bulk_string(format_float(score)))
}

fn zscore(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(2)?;
    let score = zset(ks, &cmd.args[0])?.and_then(|z| z.get(&cmd.args[1]).copied());
    Ok(score
        .map(|s| RedisValue::bulk_string(format_float(s)))
        .unwrap_or(RedisValue::Null))
}

fn zcard(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    let len = zset(ks, &cmd.args[0])?.map_or(0, |z| z.len());
    Ok(RedisValue::integer(len as i64))
}

fn zrem(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(2)?;
    let key = &cmd.args[0];
    let removed = match zset(ks, key)? {
        Some(members) => cmd.args[1..]
            .iter()
            .filter(|m| members.remove(*m).is_some())
            .count(),
        None => 0,
    };
    ks.remove_if_empty(key);
    Ok(RedisValue::integer(removed as i64))
}

fn zrank(ks: &mut Keyspace, cmd: &RedisCommand, reverse: bool) -> CommandResult {
    cmd.require_argc(2)?;
    let Some(members) = zset(ks, &cmd.args[0])? else {
        return Ok(RedisValue::Null);
    };
    let items = ordered(members);
    let rank = items.iter().position(|(m, _)| m == &cmd.args[1]);
    Ok(match rank {
        Some(r) if reverse => RedisValue::integer((items.len() - 1 - r) as i64),
        Some(r) => RedisValue::integer(r as i64),
        None => RedisValue::Null,
    })
}

fn with_scores_flag(cmd: &RedisCommand, index: usize) -> Result<bool, RedisError> {
    match cmd.arg_str(index).map(str::to_uppercase).as_deref() {
        None => Ok(false),
        Some("WITHSCORES") => Ok(true),
        Some(_) => Err(RedisError::syntax()),
    }
}

fn zrange(ks: &mut Keyspace, cmd: &RedisCommand, reverse: bool) -> CommandResult {
    cmd.require_argc_range(3, 4)?;
    let (start, stop) = (int_arg(cmd, 1)?, int_arg(cmd, 2)?);
    let with_scores = with_scores_flag(cmd, 3)?;

    let mut items = zset(ks, &cmd.args[0])?.map(|z| ordered(z)).unwrap_or_default();
    if reverse {
        items.reverse();
    }
    let items = match index_range(start, stop, items.len()) {
        Some((from, to)) => items[from..=to].to_vec(),
        None => Vec::new(),
    };
    Ok(reply(items, with_scores))
}

fn in_range(
    cmd: &RedisCommand,
    items: Vec<(Bytes, f64)>,
) -> Result<Vec<(Bytes, f64)>, RedisError> {
    let (min, max) = (Bound::parse(cmd, 1)?, Bound::parse(cmd, 2)?);
    Ok(items
        .into_iter()
        .filter(|(_, score)| min.below(*score) && max.above(*score))
        .collect())
}

fn zrangebyscore(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(3)?;
    let mut with_scores = false;
    let mut limit: Option<(usize, Option<usize>)> = None;
    let mut i = 3;
    while let Some(option) = cmd.arg_str(i).map(str::to_uppercase) {
        match option.as_str() {
            "WITHSCORES" => {
                with_scores = true;
                i += 1;
            }
            "LIMIT" => {
                let offset = int_arg(cmd, i + 1)?;
                let count = int_arg(cmd, i + 2)?;
                if offset < 0 {
                    limit = Some((0, Some(0)));
                } else {
                    limit = Some((offset as usize, (count >= 0).then_some(count as usize)));
                }
                i += 3;
            }
            _ => return Err(RedisError::syntax()),
        }
    }

    let items = zset(ks, &cmd.args[0])?.map(|z| ordered(z)).unwrap_or_default();
    let mut items = in_range(cmd, items)?;
    if let Some((offset, count)) = limit {
        items = items
            .into_iter()
            .skip(offset)
            .take(count.unwrap_or(usize::MAX))
            .collect();
    }
    Ok(reply(items, with_scores))
}

fn zcount(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let items = zset(ks, &cmd.args[0])?.map(|z| ordered(z)).unwrap_or_default();
    Ok(RedisValue::integer(in_range(cmd, items)?.len() as i64))
}

fn remove_members(ks: &mut Keyspace, key: &Bytes, doomed: Vec<(Bytes, f64)>) -> CommandResult {
    if let Some(members) = zset(ks, key)? {
        for (member, _) in &doomed {
            members.remove(member);
        }
    }
    ks.remove_if_empty(key);
    Ok(RedisValue::integer(doomed.len() as i64))
}

fn zremrangebyrank(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let (start, stop) = (int_arg(cmd, 1)?, int_arg(cmd, 2)?);
    let items = zset(ks, &cmd.args[0])?.map(|z| ordered(z)).unwrap_or_default();
    let doomed = match index_range(start, stop, items.len()) {
        Some((from, to)) => items[from..=to].to_vec(),
        None => Vec::new(),
    };
    remove_members(ks, &cmd.args[0], doomed)
}

fn zremrangebyscore(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(3)?;
    let items = zset(ks, &cmd.args[0])?.map(|z| ordered(z)).unwrap_or_default();
    let doomed = in_range(cmd, items)?;
    remove_members(ks, &cmd.args[0], doomed)
}

fn zscan(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    let pattern = scan_args(cmd)?;
    let items = zset(ks, &cmd.args[0])?
        .map(|z| ordered(z))
        .unwrap_or_default()
        .into_iter()
        .filter(|(m, _)| pattern.as_ref().map_or(true, |p| glob_match(p, m)))
        .collect();
    let RedisValue::Array(flat) = reply(items, true) else {
        return Ok(scan_page(Vec::new()));
    };
    Ok(scan_page(flat))
}
