//! Key commands: existence, expiry, renaming, DUMP/RESTORE and SORT.

use super::store::{
    glob_match, int_arg, random_u64, unix_time, CommandResult, Entry, Keyspace, Value,
};
use crate::protocol::{RedisCommand, RedisError, RedisValue};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};

/// DUMP payload header.
const DUMP_MAGIC: &[u8; 4] = b"TRL1";

pub(super) fn dispatch(ks: &mut Keyspace, cmd: &RedisCommand) -> Option<CommandResult> {
    let result = match cmd.name.as_str() {
        "DEL" => del(ks, cmd),
        "EXISTS" => exists(ks, cmd),
        "TYPE" => type_of(ks, cmd),
        "EXPIRE" => expire(ks, cmd, Duration::from_secs),
        "PEXPIRE" => expire(ks, cmd, Duration::from_millis),
        "EXPIREAT" => expire_at(ks, cmd, Duration::from_secs),
        "PEXPIREAT" => expire_at(ks, cmd, Duration::from_millis),
        "PERSIST" => persist(ks, cmd),
        "TTL" => ttl(ks, cmd, |d| ((d.as_millis() + 500) / 1000) as i64),
        "PTTL" => ttl(ks, cmd, |d| d.as_millis() as i64),
        "RENAME" => rename(ks, cmd, false),
        "RENAMENX" => rename(ks, cmd, true),
        "KEYS" => keys(ks, cmd),
        "RANDOMKEY" => random_key(ks, cmd),
        "DUMP" => dump(ks, cmd),
        "RESTORE" => restore(ks, cmd),
        "SORT" => sort(ks, cmd),
        _ => return None,
    };
    Some(result)
}

fn del(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(1)?;
    let removed = cmd
        .args
        .iter()
        .filter(|key| ks.remove(key).is_some())
        .count();
    Ok(RedisValue::integer(removed as i64))
}

fn exists(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(1)?;
    let found = cmd.args.iter().filter(|key| ks.contains(key)).count();
    Ok(RedisValue::integer(found as i64))
}

fn type_of(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    let name = ks.get(&cmd.args[0]).map_or("none", |e| e.value.type_name());
    Ok(RedisValue::simple_string(name))
}

fn set_expiry(ks: &mut Keyspace, key: &[u8], after: Option<Duration>) -> RedisValue {
    match after {
        // a deadline in the past deletes the key
        None => RedisValue::integer(ks.remove(key).is_some() as i64),
        Some(after) => match ks.get(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + after);
                RedisValue::integer(1)
            }
            None => RedisValue::integer(0),
        },
    }
}

fn expire(ks: &mut Keyspace, cmd: &RedisCommand, unit: fn(u64) -> Duration) -> CommandResult {
    cmd.require_argc(2)?;
    let n = int_arg(cmd, 1)?;
    let after = (n > 0).then(|| unit(n as u64));
    Ok(set_expiry(ks, &cmd.args[0], after))
}

fn expire_at(ks: &mut Keyspace, cmd: &RedisCommand, unit: fn(u64) -> Duration) -> CommandResult {
    cmd.require_argc(2)?;
    let at = int_arg(cmd, 1)?;
    let at = unit(at.max(0) as u64);
    let now = unix_time();
    let after = (at > now).then(|| at - now);
    Ok(set_expiry(ks, &cmd.args[0], after))
}

fn persist(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    let cleared = match ks.get(&cmd.args[0]) {
        Some(entry) => entry.expires_at.take().is_some(),
        None => false,
    };
    Ok(RedisValue::integer(cleared as i64))
}

fn ttl(ks: &mut Keyspace, cmd: &RedisCommand, unit: fn(Duration) -> i64) -> CommandResult {
    cmd.require_argc(1)?;
    let reply = match ks.get(&cmd.args[0]) {
        None => -2,
        Some(entry) => match entry.ttl() {
            None => -1,
            Some(left) => unit(left),
        },
    };
    Ok(RedisValue::integer(reply))
}

fn rename(ks: &mut Keyspace, cmd: &RedisCommand, only_new: bool) -> CommandResult {
    cmd.require_argc(2)?;
    let (from, to) = (&cmd.args[0], &cmd.args[1]);
    if !ks.contains(from) {
        return Err(RedisError::no_such_key());
    }
    if only_new && ks.contains(to) {
        return Ok(RedisValue::integer(0));
    }
    if let Some(entry) = ks.remove(from) {
        ks.insert(to.clone(), entry);
    }
    Ok(if only_new {
        RedisValue::integer(1)
    } else {
        RedisValue::ok()
    })
}

fn keys(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    let pattern = &cmd.args[0];
    let mut matched: Vec<Bytes> = ks
        .keys()
        .into_iter()
        .filter(|k| glob_match(pattern, k))
        .collect();
    matched.sort();
    Ok(RedisValue::array(
        matched.into_iter().map(RedisValue::BulkString).collect(),
    ))
}

fn random_key(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(0)?;
    let keys = ks.keys();
    if keys.is_empty() {
        return Ok(RedisValue::Null);
    }
    let pick = (random_u64() % keys.len() as u64) as usize;
    Ok(RedisValue::BulkString(keys[pick].clone()))
}

fn dump(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_argc(1)?;
    Ok(match ks.get(&cmd.args[0]) {
        Some(entry) => RedisValue::BulkString(encode_value(&entry.value)),
        None => RedisValue::Null,
    })
}

fn restore(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(3)?;
    let key = &cmd.args[0];
    let ttl_ms = int_arg(cmd, 1)?;
    if ttl_ms < 0 {
        return Err(RedisError::generic("Invalid TTL value, must be >= 0"));
    }

    let mut replace = false;
    for i in 3..cmd.argc() {
        match cmd.arg_str(i).map(str::to_uppercase).as_deref() {
            Some("REPLACE") => replace = true,
            _ => return Err(RedisError::syntax()),
        }
    }

    if !replace && ks.contains(key) {
        return Err(RedisError::new("BUSYKEY", "Target key name already exists."));
    }

    let value = decode_value(cmd.args[2].clone())
        .ok_or_else(|| RedisError::generic("DUMP payload version or checksum are wrong"))?;
    let expires_at = (ttl_ms > 0).then(|| Instant::now() + Duration::from_millis(ttl_ms as u64));
    ks.insert(key.clone(), Entry { value, expires_at });
    Ok(RedisValue::ok())
}

fn put_item(buf: &mut BytesMut, item: &[u8]) {
    buf.put_u32(item.len() as u32);
    buf.put_slice(item);
}

fn encode_value(value: &Value) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_slice(DUMP_MAGIC);
    match value {
        Value::Str(s) => {
            buf.put_u8(0);
            put_item(&mut buf, s);
        }
        Value::List(items) => {
            buf.put_u8(1);
            buf.put_u32(items.len() as u32);
            items.iter().for_each(|i| put_item(&mut buf, i));
        }
        Value::Set(members) => {
            buf.put_u8(2);
            buf.put_u32(members.len() as u32);
            members.iter().for_each(|m| put_item(&mut buf, m));
        }
        Value::Hash(fields) => {
            buf.put_u8(3);
            buf.put_u32(fields.len() as u32);
            for (field, value) in fields {
                put_item(&mut buf, field);
                put_item(&mut buf, value);
            }
        }
        Value::ZSet(members) => {
            buf.put_u8(4);
            buf.put_u32(members.len() as u32);
            for (member, score) in members {
                put_item(&mut buf, member);
                buf.put_f64(*score);
            }
        }
    }
    buf.freeze()
}

fn take_item(buf: &mut Bytes) -> Option<Bytes> {
    if buf.remaining() < 4 {
        return None;
    }
    let len = buf.get_u32() as usize;
    (buf.remaining() >= len).then(|| buf.split_to(len))
}

fn take_count(buf: &mut Bytes) -> Option<usize> {
    (buf.remaining() >= 4).then(|| buf.get_u32() as usize)
}

fn decode_value(mut buf: Bytes) -> Option<Value> {
    if buf.remaining() < 5 || &buf[..4] != DUMP_MAGIC {
        return None;
    }
    buf.advance(4);

    let value = match buf.get_u8() {
        0 => Value::Str(take_item(&mut buf)?),
        1 => {
            let n = take_count(&mut buf)?;
            let items = (0..n)
                .map(|_| take_item(&mut buf))
                .collect::<Option<VecDeque<_>>>()?;
            Value::List(items)
        }
        2 => {
            let n = take_count(&mut buf)?;
            let members = (0..n)
                .map(|_| take_item(&mut buf))
                .collect::<Option<BTreeSet<_>>>()?;
            Value::Set(members)
        }
        3 => {
            let n = take_count(&mut buf)?;
            let mut fields = BTreeMap::new();
            for _ in 0..n {
                let field = take_item(&mut buf)?;
                let value = take_item(&mut buf)?;
                fields.insert(field, value);
            }
            Value::Hash(fields)
        }
        4 => {
            let n = take_count(&mut buf)?;
            let mut members = BTreeMap::new();
            for _ in 0..n {
                let member = take_item(&mut buf)?;
                if buf.remaining() < 8 {
                    return None;
                }
                members.insert(member, buf.get_f64());
            }
            Value::ZSet(members)
        }
        _ => return None,
    };

    buf.is_empty().then_some(value)
}

fn sort(ks: &mut Keyspace, cmd: &RedisCommand) -> CommandResult {
    cmd.require_min_argc(1)?;

    let mut descending = false;
    let mut alpha = false;
    let mut limit: Option<(i64, i64)> = None;
    let mut i = 1;
    while i < cmd.argc() {
        match cmd.arg_str(i).map(str::to_uppercase).as_deref() {
            Some("ASC") => descending = false,
            Some("DESC") => descending = true,
            Some("ALPHA") => alpha = true,
            Some("LIMIT") => {
                limit = Some((int_arg(cmd, i + 1)?, int_arg(cmd, i + 2)?));
                i += 2;
            }
            _ => return Err(RedisError::syntax()),
        }
        i += 1;
    }

    let mut items: Vec<Bytes> = match ks.get(&cmd.args[0]).map(|e| &e.value) {
        None => Vec::new(),
        Some(Value::List(l)) => l.iter().cloned().collect(),
        Some(Value::Set(s)) => s.iter().cloned().collect(),
        Some(Value::ZSet(z)) => z.keys().cloned().collect(),
        Some(_) => return Err(RedisError::wrong_type()),
    };

    if alpha {
        items.sort();
    } else {
        let mut scored = items
            .into_iter()
            .map(|item| {
                std::str::from_utf8(&item)
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .map(|score| (score, item))
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                RedisError::generic("One or more scores can't be converted into double")
            })?;
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        items = scored.into_iter().map(|(_, item)| item).collect();
    }
    if descending {
        items.reverse();
    }

    let items: Vec<Bytes> = match limit {
        Some((offset, count)) => {
            let offset = offset.max(0) as usize;
            let count = if count < 0 { usize::MAX } else { count as usize };
            items.into_iter().skip(offset).take(count).collect()
        }
        None => items,
    };

    Ok(RedisValue::array(
        items.into_iter().map(RedisValue::BulkString).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use crate::cluster::node::Node;
    use crate::node::memory::MemoryNode;
    use crate::protocol::{RedisCommand, RedisValue};

    fn run(node: &MemoryNode, parts: &[&str]) -> RedisValue {
        let mut cmd = RedisCommand::named(parts[0]);
        for part in &parts[1..] {
            cmd = cmd.arg_slice(part.as_bytes());
        }
        node.execute(&cmd).unwrap_or_else(RedisValue::Error)
    }

    fn node() -> MemoryNode {
        MemoryNode::new(Node::new("127.0.0.1", 7000))
    }

    #[test]
    fn test_ttl_states() {
        let n = node();
        assert_eq!(run(&n, &["TTL", "missing"]).as_int(), Some(-2));
        run(&n, &["SET", "k", "v"]);
        assert_eq!(run(&n, &["TTL", "k"]).as_int(), Some(-1));
        assert_eq!(run(&n, &["EXPIRE", "k", "5"]).as_int(), Some(1));
        assert_eq!(run(&n, &["TTL", "k"]).as_int(), Some(5));
        assert!(run(&n, &["PTTL", "k"]).as_int().unwrap() > 4000);
        assert_eq!(run(&n, &["PERSIST", "k"]).as_int(), Some(1));
        assert_eq!(run(&n, &["TTL", "k"]).as_int(), Some(-1));
    }

    #[test]
    fn test_expire_in_past_deletes() {
        let n = node();
        run(&n, &["SET", "k", "v"]);
        assert_eq!(run(&n, &["EXPIREAT", "k", "1"]).as_int(), Some(1));
        assert_eq!(run(&n, &["EXISTS", "k"]).as_int(), Some(0));
    }

    #[test]
    fn test_expire_at_future() {
        let n = node();
        run(&n, &["SET", "k", "v"]);
        let at = (super::unix_time().as_secs() + 100).to_string();
        assert_eq!(run(&n, &["EXPIREAT", "k", &at]).as_int(), Some(1));
        let ttl = run(&n, &["TTL", "k"]).as_int().unwrap();
        assert!((98..=101).contains(&ttl), "ttl {}", ttl);
    }

    #[test]
    fn test_del_exists_type() {
        let n = node();
        run(&n, &["SET", "a", "1"]);
        run(&n, &["RPUSH", "b", "1"]);
        assert_eq!(run(&n, &["EXISTS", "a", "b", "c"]).as_int(), Some(2));
        assert_eq!(run(&n, &["TYPE", "b"]).as_str(), Some("list"));
        assert_eq!(run(&n, &["TYPE", "c"]).as_str(), Some("none"));
        assert_eq!(run(&n, &["DEL", "a", "b", "c"]).as_int(), Some(2));
    }

    #[test]
    fn test_rename() {
        let n = node();
        assert!(run(&n, &["RENAME", "a", "b"]).is_error());
        run(&n, &["SET", "a", "1"]);
        run(&n, &["SET", "c", "3"]);
        assert_eq!(run(&n, &["RENAMENX", "a", "c"]).as_int(), Some(0));
        assert_eq!(run(&n, &["RENAME", "a", "b"]), RedisValue::ok());
        assert_eq!(run(&n, &["GET", "b"]).as_str(), Some("1"));
    }

    #[test]
    fn test_keys_pattern() {
        let n = node();
        for k in ["key1", "key2", "other"] {
            run(&n, &["SET", k, "v"]);
        }
        let keys = run(&n, &["KEYS", "key*"]).into_array().unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].as_str(), Some("key1"));
    }

    #[test]
    fn test_dump_restore_all_types() {
        let n = node();
        run(&n, &["SET", "s", "value"]);
        run(&n, &["RPUSH", "l", "a", "b"]);
        run(&n, &["SADD", "set", "x", "y"]);
        run(&n, &["HSET", "h", "f", "v"]);
        run(&n, &["ZADD", "z", "1.5", "m"]);

        for key in ["s", "l", "set", "h", "z"] {
            let payload = run(&n, &["DUMP", key]).into_bytes().unwrap();
            let target = format!("{}-copy", key);
            let restore = RedisCommand::named("RESTORE")
                .arg(target.clone())
                .arg("0")
                .arg(payload);
            assert_eq!(n.execute(&restore).unwrap(), RedisValue::ok());
            assert_eq!(
                run(&n, &["TYPE", &target]),
                run(&n, &["TYPE", key]),
                "{}",
                key
            );
        }
        assert_eq!(
            run(&n, &["LRANGE", "l-copy", "0", "-1"]),
            run(&n, &["LRANGE", "l", "0", "-1"])
        );
        assert!(run(&n, &["DUMP", "missing"]).is_null());
    }

    #[test]
    fn test_restore_busy_and_bad_payload() {
        let n = node();
        run(&n, &["SET", "s", "value"]);
        let payload = run(&n, &["DUMP", "s"]).into_bytes().unwrap();

        let busy = RedisCommand::named("RESTORE").arg("s").arg("0").arg(payload.clone());
        assert!(matches!(n.execute(&busy), Err(ref e) if e.kind == "BUSYKEY"));

        let replace = busy.clone().arg("REPLACE");
        assert!(n.execute(&replace).is_ok());

        let garbage = RedisCommand::named("RESTORE").arg("t").arg("0").arg("junk");
        assert!(n.execute(&garbage).is_err());
    }

    #[test]
    fn test_sort() {
        let n = node();
        run(&n, &["RPUSH", "l", "3", "1", "2"]);
        let sorted = run(&n, &["SORT", "l"]).into_array().unwrap();
        let values: Vec<_> = sorted.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(values, vec!["1", "2", "3"]);

        let desc = run(&n, &["SORT", "l", "DESC", "LIMIT", "0", "2"])
            .into_array()
            .unwrap();
        let values: Vec<_> = desc.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(values, vec!["3", "2"]);

        run(&n, &["RPUSH", "words", "b", "a"]);
        assert!(run(&n, &["SORT", "words"]).is_error());
        assert_eq!(run(&n, &["SORT", "words", "ALPHA"]).into_array().unwrap().len(), 2);
    }
}
