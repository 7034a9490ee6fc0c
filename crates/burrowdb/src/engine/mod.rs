//! Engine: turns each API call into one script program, invokes it through
//! the cache, and decodes the reply. All schema knowledge stays on this
//! side of the backend boundary; the backend only ever sees op sequences,
//! keys, and strings.

mod delete;
mod insert;
mod select;
mod update;

pub(crate) use delete::delete;
pub(crate) use insert::insert;
pub(crate) use select::select;
pub use select::Select;
pub(crate) use update::update;

use crate::config::StoreConfig;
use burrowdb_core::{
    backend::{BackendError, Reply, ScriptBackend},
    codec::{FlatMap, Resolver, encode_scalar, wire_field_name},
    error::DbError,
    schema::{FieldKind, ModelSchema, SchemaRegistry},
    script::{Invocation, ScriptCache, ScriptProgram},
    value::Value,
};
use std::{collections::BTreeMap, sync::Mutex};

///
/// EngineCtx
///
/// Borrowed view of one store's guts, handed to each operation.
///

pub(crate) struct EngineCtx<'a> {
    pub registry: &'a SchemaRegistry,
    pub config: &'a StoreConfig,
    pub backend: &'a dyn ScriptBackend,
    pub cache: &'a Mutex<ScriptCache>,
}

impl EngineCtx<'_> {
    /// Invoke `program` over `invocation`, loading through the cache.
    pub(crate) fn invoke(
        &self,
        program: &ScriptProgram,
        invocation: &Invocation,
    ) -> Result<Reply, DbError> {
        let handle = self
            .cache
            .lock()
            .expect("script cache poisoned")
            .get_or_load(self.backend, program)?;

        self.backend
            .invoke(handle, &invocation.keys, &invocation.args)
            .map_err(DbError::from)
    }
}

/// Canonical string form of a caller-supplied primary-key value, checked
/// against the schema's declared key kind.
pub(crate) fn encode_id(schema: &ModelSchema, id: &Value) -> Result<String, DbError> {
    let field = schema.primary_key();
    let Some(FieldKind::Scalar(kind)) = schema.descriptor(field).map(|d| &d.kind) else {
        return Err(DbError::PrimaryKeyMissing {
            model: schema.name().to_string(),
            field: field.to_string(),
        });
    };

    encode_scalar(field, *kind, id).map_err(DbError::from)
}

/// Rewrite requested column names to their wire forms. Names the schema
/// does not declare pass through unchanged; they simply match nothing.
pub(crate) fn wire_columns(schema: &ModelSchema, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|name| {
            schema
                .descriptor(name)
                .map_or_else(|| name.clone(), wire_field_name)
        })
        .collect()
}

///
/// Row
///
/// One decoded fetch-reply row: the record's storage key, its (possibly
/// column-restricted) flat map, and the nested bundle the backend chased.
///

#[derive(Debug)]
pub(crate) struct Row {
    pub key: String,
    pub fields: FlatMap,
    pub bundle: BTreeMap<String, FlatMap>,
}

/// Decode a fetch reply into rows. Shape violations are backend bugs and
/// surface as `BadReply`.
pub(crate) fn parse_rows(reply: Reply) -> Result<Vec<Row>, DbError> {
    let rows = reply.into_array()?;
    rows.into_iter().map(parse_row).collect()
}

fn parse_row(row: Reply) -> Result<Row, DbError> {
    let mut parts = row.into_array()?.into_iter();
    let (Some(key), Some(fields), Some(bundle)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(bad_reply("row must have key, fields, and bundle"));
    };
    let Reply::Text(key) = key else {
        return Err(bad_reply("row key must be text"));
    };

    let fields = parse_pairs(fields)?;

    let mut nested = BTreeMap::new();
    let mut entries = bundle.into_array()?.into_iter();
    while let Some(entry_key) = entries.next() {
        let Reply::Text(entry_key) = entry_key else {
            return Err(bad_reply("bundle entry key must be text"));
        };
        let Some(entry_fields) = entries.next() else {
            return Err(bad_reply("bundle entry is missing its field array"));
        };
        nested.insert(entry_key, parse_pairs(entry_fields)?);
    }

    Ok(Row {
        key,
        fields,
        bundle: nested,
    })
}

fn parse_pairs(reply: Reply) -> Result<FlatMap, DbError> {
    let items = reply.into_array()?;
    if items.len() % 2 != 0 {
        return Err(bad_reply("field array has odd length"));
    }

    let mut flat = FlatMap::new();
    for pair in items.chunks_exact(2) {
        let (Reply::Text(name), Reply::Text(value)) = (&pair[0], &pair[1]) else {
            return Err(bad_reply("field array must hold text pairs"));
        };
        flat.insert(name.clone(), value.clone());
    }

    Ok(flat)
}

fn bad_reply(message: &str) -> DbError {
    BackendError::BadReply(message.to_string()).into()
}

///
/// BundleResolver
///
/// Resolver over one row's nested bundle. Everything a fetch could resolve
/// arrived in the same invocation, so a miss here is a dangling pointer (or
/// a reference past the resolve depth) and decodes to null.
///

pub(crate) struct BundleResolver<'a> {
    pub bundle: &'a BTreeMap<String, FlatMap>,
}

impl Resolver for BundleResolver<'_> {
    fn resolve(&self, _model: &str, key: &str) -> Result<Option<FlatMap>, DbError> {
        Ok(self.bundle.get(key).cloned())
    }
}
