use crate::engine::{EngineCtx, encode_id, insert::write_hash};
use burrowdb_core::{
    codec::flatten,
    error::DbError,
    key::record_key,
    record::Record,
    script::{ProgramBuilder, ScriptOp},
    ttl::TtlPolicy,
    value::Value,
};
use std::time::Duration;
use tracing::debug;

/// Merge a partial record onto the stored hash identified by `id`.
///
/// Only supplied fields are re-flattened; everything else keeps its stored
/// value, old nested pointers included. Nested records in the partial set
/// are written to their own keys, so every parent sharing them observes the
/// new value. The index is untouched: insertion order is fixed at insert.
pub(crate) fn update(
    ctx: &EngineCtx<'_>,
    model: &str,
    id: &Value,
    partial: &Record,
    ttl: Option<Duration>,
) -> Result<(), DbError> {
    let schema = ctx.registry.lookup(model)?;
    let pk = encode_id(schema, id)?;
    let (flat, nested) = flatten(ctx.registry, schema, partial)?;

    let mut builder = ProgramBuilder::new();
    let policy = TtlPolicy::resolve(&mut builder, ttl, ctx.config.default_ttl);

    for write in nested {
        write_hash(&mut builder, &policy, write);
    }

    let key = builder.key(record_key(model, &pk));
    let pairs = builder.args(flat.into_iter().flat_map(|(k, v)| [k, v]));
    builder.op(ScriptOp::HashWrite { key, pairs });
    policy.apply(&mut builder, key);

    let (program, invocation) = builder.finish();
    debug!(model, ttl = policy.is_active(), "update");
    ctx.invoke(&program, &invocation)?;

    Ok(())
}
