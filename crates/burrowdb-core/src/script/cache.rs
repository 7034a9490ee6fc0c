use crate::{
    backend::{ScriptBackend, ScriptHandle},
    error::DbError,
    script::ScriptProgram,
};
use std::collections::HashMap;

///
/// ScriptCache
///
/// Bounded program-handle cache keyed by topology fingerprint. A hit skips
/// the backend load entirely; a miss loads and evicts the least recently
/// used entry once capacity is reached. Capacity zero disables caching and
/// loads every call.
///

#[derive(Debug)]
pub struct ScriptCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<u64, Entry>,
}

#[derive(Debug)]
struct Entry {
    handle: ScriptHandle,
    last_used: u64,
}

impl ScriptCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// The cached handle for `program`, loading through `backend` on a miss.
    pub fn get_or_load(
        &mut self,
        backend: &dyn ScriptBackend,
        program: &ScriptProgram,
    ) -> Result<ScriptHandle, DbError> {
        let fingerprint = program.fingerprint();
        self.tick += 1;

        if let Some(entry) = self.entries.get_mut(&fingerprint) {
            entry.last_used = self.tick;
            return Ok(entry.handle);
        }

        let handle = backend.load(program)?;
        if self.capacity == 0 {
            return Ok(handle);
        }

        if self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(
            fingerprint,
            Entry {
                handle,
                last_used: self.tick,
            },
        );

        Ok(handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_lru(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(fingerprint, _)| *fingerprint)
        {
            self.entries.remove(&oldest);
        }
    }
}
