use crate::{
    backend::{BackendError, Reply, ScriptBackend, ScriptHandle},
    key::model_of_key,
    script::{PointerShape, ResolveTable, ScriptOp, ScriptProgram, Slot, Span},
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Mutex,
    time::Duration,
};
use tracing::trace;

///
/// MemoryBackend
///
/// In-process backend that interprets script programs directly. The whole
/// store lives behind one mutex and each invocation runs start to finish
/// under it, which gives the same indivisibility a remote scripted store
/// provides.
///
/// Time is a logical clock: it only moves when `advance` is called, so
/// expiry behaviour is deterministic under test. Expired entries are
/// reaped lazily on access.
///

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    now_ms: u64,
    hashes: HashMap<String, HashEntry>,
    indexes: HashMap<String, IndexEntry>,
    counters: HashMap<String, u64>,
    scripts: HashMap<u64, ScriptProgram>,
    next_handle: u64,
    loads: u64,
}

#[derive(Debug, Default)]
struct HashEntry {
    fields: BTreeMap<String, String>,
    expires_at: Option<u64>,
}

/// Rank-ordered index. Scores are strictly increasing counter values, so
/// insertion order is rank order; re-adding a member moves it to the end.
#[derive(Debug, Default)]
struct IndexEntry {
    members: Vec<(String, u64)>,
    expires_at: Option<u64>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the logical clock forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().expect("backend state poisoned");
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        state.now_ms = state.now_ms.saturating_add(by);
    }

    /// How many programs have been loaded, cache hits excluded.
    #[must_use]
    pub fn load_count(&self) -> u64 {
        self.state.lock().expect("backend state poisoned").loads
    }

    /// Whether a live (unexpired) hash or index exists under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let mut state = self.state.lock().expect("backend state poisoned");
        let now = state.now_ms;
        state.live_hash(key, now).is_some() || state.live_index(key, now).is_some()
    }

    /// The live members of the index at `key`, in rank order.
    #[must_use]
    pub fn index_members(&self, key: &str) -> Vec<String> {
        let mut state = self.state.lock().expect("backend state poisoned");
        let now = state.now_ms;
        state
            .live_index(key, now)
            .map(|index| index.members.iter().map(|(m, _)| m.clone()).collect())
            .unwrap_or_default()
    }
}

impl ScriptBackend for MemoryBackend {
    fn load(&self, program: &ScriptProgram) -> Result<ScriptHandle, BackendError> {
        let mut state = self.state.lock().expect("backend state poisoned");
        let handle = state.next_handle;
        state.next_handle += 1;
        state.loads += 1;
        state.scripts.insert(handle, program.clone());
        trace!(handle, ops = program.ops.len(), "script loaded");

        Ok(ScriptHandle(handle))
    }

    fn invoke(
        &self,
        handle: ScriptHandle,
        keys: &[String],
        args: &[String],
    ) -> Result<Reply, BackendError> {
        let mut state = self.state.lock().expect("backend state poisoned");
        let program = state
            .scripts
            .get(&handle.0)
            .ok_or(BackendError::UnknownHandle(handle.0))?
            .clone();
        trace!(handle = handle.0, keys = keys.len(), args = args.len(), "invoke");

        state.execute(&program, keys, args)
    }
}

impl State {
    fn execute(
        &mut self,
        program: &ScriptProgram,
        keys: &[String],
        args: &[String],
    ) -> Result<Reply, BackendError> {
        let mut applied = 0i64;

        for op in &program.ops {
            match op {
                ScriptOp::HashWrite { key, pairs } => {
                    let key = key_at(keys, *key)?.to_string();
                    let pairs = arg_span(args, *pairs)?;
                    if pairs.len() % 2 != 0 {
                        return Err(BackendError::BadArgument(
                            "hash write pairs span has odd length".to_string(),
                        ));
                    }
                    let now = self.now_ms;
                    self.purge_hash_if_expired(&key, now);
                    let entry = self.hashes.entry(key).or_default();
                    for pair in pairs.chunks_exact(2) {
                        entry.fields.insert(pair[0].clone(), pair[1].clone());
                    }
                    applied += 1;
                }

                ScriptOp::Expire { key, ttl_ms } => {
                    let key = key_at(keys, *key)?;
                    let ttl: u64 = arg_at(args, *ttl_ms)?.parse().map_err(|_| {
                        BackendError::BadArgument(format!(
                            "ttl must be milliseconds, got {:?}",
                            arg_at(args, *ttl_ms).unwrap_or_default()
                        ))
                    })?;
                    // Huge ttls pin the deadline at u64::MAX instead of wrapping.
                    let deadline = self.now_ms.saturating_add(ttl);
                    if let Some(entry) = self.hashes.get_mut(key) {
                        entry.expires_at = Some(deadline);
                    }
                    if let Some(entry) = self.indexes.get_mut(key) {
                        entry.expires_at = Some(deadline);
                    }
                    applied += 1;
                }

                ScriptOp::IndexAdd {
                    index,
                    counter,
                    member,
                } => {
                    let index_key = key_at(keys, *index)?.to_string();
                    let counter_key = key_at(keys, *counter)?.to_string();
                    let member = key_at(keys, *member)?.to_string();

                    let score = {
                        let counter = self.counters.entry(counter_key).or_insert(0);
                        *counter += 1;
                        *counter
                    };
                    let now = self.now_ms;
                    self.purge_index_if_expired(&index_key, now);
                    let entry = self.indexes.entry(index_key).or_default();
                    entry.members.retain(|(m, _)| *m != member);
                    entry.members.push((member, score));
                    applied += 1;
                }

                ScriptOp::IndexRemove { index, member } => {
                    let index_key = key_at(keys, *index)?;
                    let member = key_at(keys, *member)?;
                    if let Some(entry) = self.indexes.get_mut(index_key) {
                        entry.members.retain(|(m, _)| m != member);
                    }
                    applied += 1;
                }

                ScriptOp::HashDelete { key } => {
                    let key = key_at(keys, *key)?;
                    if self.hashes.remove(key).is_some() {
                        applied += 1;
                    }
                }

                ScriptOp::FetchKeys {
                    members,
                    columns,
                    depth,
                } => {
                    let members = key_span(keys, *members)?.to_vec();
                    let columns = arg_span(args, *columns)?.to_vec();
                    let depth = parse_depth(args, *depth)?;
                    let rows =
                        self.fetch_rows(program.resolve.as_ref(), &members, &columns, depth);
                    return Ok(Reply::Array(rows));
                }

                ScriptOp::FetchWindow {
                    index,
                    skip,
                    limit,
                    columns,
                    depth,
                } => {
                    let index_key = key_at(keys, *index)?.to_string();
                    let skip: usize = arg_at(args, *skip)?
                        .parse()
                        .map_err(|_| BackendError::BadArgument("skip must be a count".to_string()))?;
                    let limit: i64 = arg_at(args, *limit)?
                        .parse()
                        .map_err(|_| BackendError::BadArgument("limit must be a count".to_string()))?;
                    let columns = arg_span(args, *columns)?.to_vec();
                    let depth = parse_depth(args, *depth)?;

                    let now = self.now_ms;
                    let members: Vec<String> = self
                        .live_index(&index_key, now)
                        .map(|entry| {
                            let window = entry.members.iter().map(|(m, _)| m.clone()).skip(skip);
                            if limit < 0 {
                                window.collect()
                            } else {
                                window.take(limit as usize).collect()
                            }
                        })
                        .unwrap_or_default();

                    let rows =
                        self.fetch_rows(program.resolve.as_ref(), &members, &columns, depth);
                    return Ok(Reply::Array(rows));
                }
            }
        }

        Ok(Reply::Int(applied))
    }

    /// One reply row per live member key, in member order. Each row is
    /// `[key, flat field/value pairs, pointer bundle]`, the bundle being
    /// alternating nested key / pair-array entries.
    fn fetch_rows(
        &mut self,
        resolve: Option<&ResolveTable>,
        members: &[String],
        columns: &[String],
        depth: usize,
    ) -> Vec<Reply> {
        let now = self.now_ms;
        let mut rows = Vec::with_capacity(members.len());

        for member in members {
            let Some(entry) = self.live_hash(member, now) else {
                continue;
            };

            let selected: Vec<(String, String)> = if columns.is_empty() {
                entry
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            } else {
                columns
                    .iter()
                    .filter_map(|col| entry.fields.get(col).map(|v| (col.clone(), v.clone())))
                    .collect()
            };

            let mut bundle = Vec::new();
            if let Some(table) = resolve {
                let mut visited = BTreeSet::new();
                visited.insert(member.clone());
                self.chase(table, member, &selected, depth, &mut visited, &mut bundle);
            }

            rows.push(Reply::Array(vec![
                Reply::Text(member.clone()),
                Reply::Array(flatten_pairs(&selected)),
                Reply::Array(bundle),
            ]));
        }

        rows
    }

    /// Follow every pointer in `pairs` up to `remaining` hops, appending
    /// each newly seen live nested hash to the bundle. Dangling pointers
    /// and unparseable pointer fields are skipped; the caller decodes
    /// absence as null.
    fn chase(
        &mut self,
        table: &ResolveTable,
        owner_key: &str,
        pairs: &[(String, String)],
        remaining: usize,
        visited: &mut BTreeSet<String>,
        bundle: &mut Vec<Reply>,
    ) {
        if remaining == 0 {
            return;
        }
        let Some(model) = model_of_key(owner_key) else {
            return;
        };

        for pointer in table.pointer_fields(model) {
            let Some((_, value)) = pairs.iter().find(|(name, _)| *name == pointer.wire_name)
            else {
                continue;
            };

            for target in pointer_keys(&pointer.shape, value) {
                if !visited.insert(target.clone()) {
                    continue;
                }
                let now = self.now_ms;
                let Some(entry) = self.live_hash(&target, now) else {
                    continue;
                };
                let fields: Vec<(String, String)> = entry
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();

                bundle.push(Reply::Text(target.clone()));
                bundle.push(Reply::Array(flatten_pairs(&fields)));
                self.chase(table, &target, &fields, remaining - 1, visited, bundle);
            }
        }
    }

    fn live_hash(&mut self, key: &str, now: u64) -> Option<&HashEntry> {
        self.purge_hash_if_expired(key, now);
        self.hashes.get(key)
    }

    fn live_index(&mut self, key: &str, now: u64) -> Option<&IndexEntry> {
        self.purge_index_if_expired(key, now);
        self.indexes.get(key)
    }

    fn purge_hash_if_expired(&mut self, key: &str, now: u64) {
        if self
            .hashes
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|deadline| deadline <= now)
        {
            self.hashes.remove(key);
        }
    }

    fn purge_index_if_expired(&mut self, key: &str, now: u64) {
        if self
            .indexes
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|deadline| deadline <= now)
        {
            self.indexes.remove(key);
        }
    }
}

fn flatten_pairs(pairs: &[(String, String)]) -> Vec<Reply> {
    pairs
        .iter()
        .flat_map(|(k, v)| [Reply::Text(k.clone()), Reply::Text(v.clone())])
        .collect()
}

/// Extract the storage keys a stored pointer value names, per shape.
/// Lenient on malformed data: anything unparseable yields no keys.
fn pointer_keys(shape: &PointerShape, value: &str) -> Vec<String> {
    match shape {
        PointerShape::Single => vec![value.to_string()],
        PointerShape::List => serde_json::from_str::<Vec<serde_json::Value>>(value)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        PointerShape::Map => {
            serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(value)
                .map(|entries| {
                    entries
                        .values()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        }
        PointerShape::Tuple(mask) => serde_json::from_str::<Vec<serde_json::Value>>(value)
            .map(|items| {
                items
                    .iter()
                    .zip(mask)
                    .filter(|(_, is_pointer)| **is_pointer)
                    .filter_map(|(v, _)| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn key_at(keys: &[String], slot: Slot) -> Result<&str, BackendError> {
    keys.get(slot)
        .map(String::as_str)
        .ok_or(BackendError::SlotOutOfRange {
            what: "key",
            index: slot,
            len: keys.len(),
        })
}

fn arg_at(args: &[String], slot: Slot) -> Result<&str, BackendError> {
    args.get(slot)
        .map(String::as_str)
        .ok_or(BackendError::SlotOutOfRange {
            what: "argument",
            index: slot,
            len: args.len(),
        })
}

fn key_span(keys: &[String], span: Span) -> Result<&[String], BackendError> {
    keys.get(span.range()).ok_or(BackendError::SlotOutOfRange {
        what: "key",
        index: span.start + span.len,
        len: keys.len(),
    })
}

fn arg_span(args: &[String], span: Span) -> Result<&[String], BackendError> {
    args.get(span.range()).ok_or(BackendError::SlotOutOfRange {
        what: "argument",
        index: span.start + span.len,
        len: args.len(),
    })
}

fn parse_depth(args: &[String], slot: Slot) -> Result<usize, BackendError> {
    arg_at(args, slot)?
        .parse()
        .map_err(|_| BackendError::BadArgument("depth must be a hop count".to_string()))
}
