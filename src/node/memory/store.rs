//! Keyspace and command dispatch for an in-process node.

use super::{hashes, keys, lists, server, sets, sorted_sets, strings};
use crate::cluster::node::Node;
use crate::cluster::topology::SlotRange;
use crate::protocol::{RedisCommand, RedisError, RedisValue};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::RandomState;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Result of one command.
pub type CommandResult = Result<RedisValue, RedisError>;

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(Bytes),
    List(VecDeque<Bytes>),
    Set(BTreeSet<Bytes>),
    Hash(BTreeMap<Bytes, Bytes>),
    ZSet(BTreeMap<Bytes, f64>),
}

impl Value {
    /// Name reported by TYPE.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Hash(_) => "hash",
            Self::ZSet(_) => "zset",
        }
    }

    fn is_empty_container(&self) -> bool {
        match self {
            Self::Str(_) => false,
            Self::List(l) => l.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::Hash(h) => h.is_empty(),
            Self::ZSet(z) => z.is_empty(),
        }
    }

    pub fn as_str(&self) -> Result<&Bytes, RedisError> {
        match self {
            Self::Str(s) => Ok(s),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, RedisError> {
        match self {
            Self::List(l) => Ok(l),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut BTreeSet<Bytes>, RedisError> {
        match self {
            Self::Set(s) => Ok(s),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut BTreeMap<Bytes, Bytes>, RedisError> {
        match self {
            Self::Hash(h) => Ok(h),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_zset_mut(&mut self) -> Result<&mut BTreeMap<Bytes, f64>, RedisError> {
        match self {
            Self::ZSet(z) => Ok(z),
            _ => Err(RedisError::wrong_type()),
        }
    }
}

/// A key's value and expiry.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Remaining time to live, `None` when the key is persistent.
    pub fn ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// Key → entry map with lazy expiry.
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: HashMap<Bytes, Entry>,
}

impl Keyspace {
    fn purge_if_expired(&mut self, key: &[u8]) {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
    }

    fn purge_all_expired(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, e| !e.is_expired(now));
    }

    /// Live entry for a key.
    pub fn get(&mut self, key: &[u8]) -> Option<&mut Entry> {
        self.purge_if_expired(key);
        self.entries.get_mut(key)
    }

    /// Live entry for a key, created with `make` when absent.
    pub fn get_or_insert(&mut self, key: &Bytes, make: impl FnOnce() -> Value) -> &mut Entry {
        self.purge_if_expired(key);
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(make()))
    }

    /// Store a value, clearing any expiry.
    pub fn set(&mut self, key: Bytes, value: Value) {
        self.entries.insert(key, Entry::new(value));
    }

    /// Insert a complete entry.
    pub fn insert(&mut self, key: Bytes, entry: Entry) {
        self.entries.insert(key, entry);
    }

    /// Remove a key, returning its live entry.
    pub fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        self.purge_if_expired(key);
        self.entries.remove(key)
    }

    /// Drop a container key once it holds no elements.
    pub fn remove_if_empty(&mut self, key: &[u8]) {
        if self
            .entries
            .get(key)
            .is_some_and(|e| e.value.is_empty_container())
        {
            self.entries.remove(key);
        }
    }

    pub fn contains(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Live keys in unspecified order.
    pub fn keys(&mut self) -> Vec<Bytes> {
        self.purge_all_expired();
        self.entries.keys().cloned().collect()
    }

    pub fn len(&mut self) -> usize {
        self.purge_all_expired();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A random number from the process's hash seed source.
pub(super) fn random_u64() -> u64 {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default(),
    );
    hasher.finish()
}

/// Seconds since the Unix epoch.
pub(super) fn unix_time() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// An in-process single node.
///
/// Holds one keyspace and answers the string, list, set, hash, sorted set,
/// key and server commands the router forwards. `CLUSTER SLOTS` reports the
/// ranges installed with [`set_cluster_slots`](Self::set_cluster_slots).
pub struct MemoryNode {
    node: Node,
    keyspace: Mutex<Keyspace>,
    pub(super) config: Mutex<BTreeMap<String, String>>,
    pub(super) clients: Mutex<BTreeSet<u64>>,
    next_client_id: AtomicU64,
    pub(super) commands_processed: AtomicU64,
    pub(super) last_save: AtomicU64,
    pub(super) started_at: Instant,
    pub(super) cluster_slots: RwLock<Vec<SlotRange>>,
}

impl MemoryNode {
    /// Create an empty node.
    pub fn new(node: Node) -> Self {
        let mut config = BTreeMap::new();
        config.insert("maxmemory".to_string(), "0".to_string());
        config.insert("maxmemory-policy".to_string(), "noeviction".to_string());
        config.insert("timeout".to_string(), "0".to_string());
        config.insert("port".to_string(), node.port().to_string());

        Self {
            node,
            keyspace: Mutex::new(Keyspace::default()),
            config: Mutex::new(config),
            clients: Mutex::new(BTreeSet::new()),
            next_client_id: AtomicU64::new(1),
            commands_processed: AtomicU64::new(0),
            last_save: AtomicU64::new(unix_time().as_secs()),
            started_at: Instant::now(),
            cluster_slots: RwLock::new(Vec::new()),
        }
    }

    /// This node's address.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Ranges reported by `CLUSTER SLOTS`.
    pub fn set_cluster_slots(&self, ranges: Vec<SlotRange>) {
        *self.cluster_slots.write() = ranges;
    }

    /// Number of live keys.
    pub fn dbsize(&self) -> usize {
        self.keyspace.lock().len()
    }

    /// Whether a key is live on this node.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.keyspace.lock().contains(key)
    }

    /// String value of a key, bypassing the router.
    pub fn get_string(&self, key: &[u8]) -> Option<Bytes> {
        match self.keyspace.lock().get(key).map(|e| &e.value) {
            Some(Value::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Store a string directly, bypassing the router.
    pub fn set_string(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.keyspace
            .lock()
            .set(key.into(), Value::Str(value.into()));
    }

    pub(super) fn register_client(&self) -> u64 {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().insert(id);
        id
    }

    pub(super) fn unregister_client(&self, id: u64) {
        self.clients.lock().remove(&id);
    }

    /// Execute one command.
    pub fn execute(&self, cmd: &RedisCommand) -> CommandResult {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        let mut ks = self.keyspace.lock();

        if let Some(result) = server::dispatch(self, &mut ks, cmd) {
            return result;
        }

        let handlers: [fn(&mut Keyspace, &RedisCommand) -> Option<CommandResult>; 6] = [
            strings::dispatch,
            keys::dispatch,
            lists::dispatch,
            sets::dispatch,
            hashes::dispatch,
            sorted_sets::dispatch,
        ];
        handlers
            .iter()
            .find_map(|handler| handler(&mut ks, cmd))
            .unwrap_or_else(|| Err(RedisError::unknown_command(&cmd.name)))
    }
}

impl std::fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNode")
            .field("node", &self.node)
            .field("keys", &self.dbsize())
            .finish_non_exhaustive()
    }
}

// Argument helpers shared by the command modules.

pub(super) fn key_arg(cmd: &RedisCommand, index: usize) -> Result<&Bytes, RedisError> {
    cmd.arg_bytes(index)
        .ok_or_else(|| RedisError::wrong_arity(&cmd.name))
}

pub(super) fn int_arg(cmd: &RedisCommand, index: usize) -> Result<i64, RedisError> {
    cmd.arg_int(index).ok_or_else(RedisError::not_integer)
}

pub(super) fn float_arg(cmd: &RedisCommand, index: usize) -> Result<f64, RedisError> {
    cmd.arg_str(index)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or_else(RedisError::not_float)
}

/// Parse `key cursor [MATCH pattern] [COUNT n]` for the collection scans.
///
/// Collections are returned in a single page, so the cursor is validated and
/// COUNT only checked for syntax. Returns the MATCH pattern.
pub(super) fn scan_args(cmd: &RedisCommand) -> Result<Option<Bytes>, RedisError> {
    cmd.require_min_argc(2)?;
    cmd.arg_int(1)
        .filter(|cursor| *cursor >= 0)
        .ok_or_else(|| RedisError::generic("invalid cursor"))?;

    let mut pattern = None;
    let mut i = 2;
    while i < cmd.argc() {
        match cmd.arg_str(i).map(str::to_uppercase).as_deref() {
            Some("MATCH") => pattern = Some(key_arg(cmd, i + 1)?.clone()),
            Some("COUNT") => {
                int_arg(cmd, i + 1)?;
            }
            _ => return Err(RedisError::syntax()),
        }
        i += 2;
    }
    Ok(pattern)
}

/// Final scan page: cursor `0` and the items.
pub(super) fn scan_page(items: Vec<RedisValue>) -> RedisValue {
    RedisValue::array(vec![RedisValue::bulk_string("0"), RedisValue::array(items)])
}

/// Resolve a Redis-style inclusive index range against a length.
///
/// Negative indexes count from the end. Returns `None` when the range is
/// empty.
pub(super) fn index_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Glob-style match over bytes: `*`, `?`, `[...]` (with `^` and ranges)
/// and `\` escapes.
pub(super) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    backtrack = Some((p, t));
                    p += 1;
                    continue;
                }
                b'?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                b'[' => {
                    if let Some((matched, next)) = match_class(pattern, p, text[t]) {
                        if matched {
                            p = next;
                            t += 1;
                            continue;
                        }
                    }
                }
                b'\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c if c == text[t] => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }
        }

        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Match one byte against the class starting at `pattern[open]`.
/// Returns the result and the index after the closing `]`.
fn match_class(pattern: &[u8], open: usize, c: u8) -> Option<(bool, usize)> {
    let mut i = open + 1;
    let negated = pattern.get(i) == Some(&b'^');
    if negated {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            matched |= pattern[i + 1] == c;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = if pattern[i] <= pattern[i + 2] {
                (pattern[i], pattern[i + 2])
            } else {
                (pattern[i + 2], pattern[i])
            };
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= pattern[i] == c;
            i += 1;
        }
    }

    if i >= pattern.len() {
        return None;
    }
    Some((matched != negated, i + 1))
}
