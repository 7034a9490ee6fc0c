use crate::{
    config::StoreConfig,
    engine::{self, EngineCtx, Select},
};
use burrowdb_core::{
    backend::ScriptBackend,
    error::DbError,
    record::Record,
    schema::{ModelSchema, SchemaError, SchemaRegistry},
    script::ScriptCache,
    value::Value,
};
use std::{sync::Mutex, time::Duration};

///
/// Store
///
/// The public surface: owns the schema registry, the backend, the script
/// cache, and the config. Holds no per-record state; all data lives behind
/// the backend. Operations take `&self` and may run from multiple threads;
/// atomicity comes from the backend's indivisible invoke.
///

pub struct Store<B: ScriptBackend> {
    registry: SchemaRegistry,
    backend: B,
    cache: Mutex<ScriptCache>,
    config: StoreConfig,
}

impl<B: ScriptBackend> Store<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    #[must_use]
    pub fn with_config(backend: B, config: StoreConfig) -> Self {
        Self {
            registry: SchemaRegistry::new(),
            backend,
            cache: Mutex::new(ScriptCache::new(config.script_cache_capacity)),
            config,
        }
    }

    /// Register a batch of schemas and resolve their references in one
    /// step. Order within the batch does not matter; forward and self
    /// references are fine.
    pub fn register_schemas(
        &mut self,
        schemas: impl IntoIterator<Item = ModelSchema>,
    ) -> Result<(), DbError> {
        for schema in schemas {
            self.registry.register(schema)?;
        }
        self.registry.resolve()?;

        Ok(())
    }

    /// Register one schema without resolving. Useful while assembling a
    /// mutually referential batch; call `resolve_schemas` when done.
    pub fn register_schema(&mut self, schema: ModelSchema) -> Result<(), DbError> {
        self.registry.register(schema).map_err(DbError::from)
    }

    pub fn resolve_schemas(&mut self) -> Result<(), DbError> {
        self.registry.resolve().map_err(DbError::from)
    }

    #[must_use]
    pub const fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The backend, for backend-specific control such as the memory
    /// backend's logical clock.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Insert records of `model`, nested records fanned out to their own
    /// keys, all in one atomic invocation. `ttl` falls back to the store
    /// default; `None` on both means no expiry.
    pub fn insert(
        &self,
        model: &str,
        records: &[Record],
        ttl: Option<Duration>,
    ) -> Result<(), DbError> {
        engine::insert(&self.ctx()?, model, records, ttl)
    }

    /// Read records of `model` per the request, nested pointers resolved.
    pub fn select(&self, model: &str, request: &Select) -> Result<Vec<Record>, DbError> {
        engine::select(&self.ctx()?, model, request)
    }

    /// Merge a partial record onto the stored record identified by `id`.
    pub fn update(
        &self,
        model: &str,
        id: &Value,
        partial: &Record,
        ttl: Option<Duration>,
    ) -> Result<(), DbError> {
        engine::update(&self.ctx()?, model, id, partial, ttl)
    }

    /// Delete the named records and their index entries. Never cascades.
    pub fn delete(&self, model: &str, ids: &[Value]) -> Result<(), DbError> {
        engine::delete(&self.ctx()?, model, ids)
    }

    fn ctx(&self) -> Result<EngineCtx<'_>, DbError> {
        if !self.registry.is_resolved() {
            return Err(SchemaError::RegistryUnresolved.into());
        }

        Ok(EngineCtx {
            registry: &self.registry,
            config: &self.config,
            backend: &self.backend,
            cache: &self.cache,
        })
    }
}
