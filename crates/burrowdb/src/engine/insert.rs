use crate::engine::EngineCtx;
use burrowdb_core::{
    codec::{NestedWrite, flatten, primary_key_string},
    error::DbError,
    index::IndexSlots,
    key::record_key,
    record::Record,
    script::{ProgramBuilder, ScriptOp},
    ttl::TtlPolicy,
};
use std::time::Duration;
use tracing::debug;

/// Insert a batch of records in one atomic invocation.
///
/// Every record's transitive nested writes land first (depth order), then
/// the record itself; only top-level records gain an index entry. The
/// resolved TTL policy expires every written key plus the index key.
pub(crate) fn insert(
    ctx: &EngineCtx<'_>,
    model: &str,
    records: &[Record],
    ttl: Option<Duration>,
) -> Result<(), DbError> {
    let schema = ctx.registry.lookup(model)?;
    if records.is_empty() {
        return Ok(());
    }

    let mut builder = ProgramBuilder::new();
    let policy = TtlPolicy::resolve(&mut builder, ttl, ctx.config.default_ttl);
    let index = IndexSlots::for_model(&mut builder, model);

    for record in records {
        let pk = primary_key_string(schema, record)?;
        let (flat, nested) = flatten(ctx.registry, schema, record)?;

        for write in nested {
            write_hash(&mut builder, &policy, write);
        }

        let key = builder.key(record_key(model, &pk));
        let pairs = builder.args(flat.into_iter().flat_map(|(k, v)| [k, v]));
        builder.op(ScriptOp::HashWrite { key, pairs });
        index.add(&mut builder, key);
        policy.apply(&mut builder, key);
    }

    policy.apply(&mut builder, index.index);

    let (program, invocation) = builder.finish();
    debug!(model, records = records.len(), ttl = policy.is_active(), "insert");
    ctx.invoke(&program, &invocation)?;

    Ok(())
}

/// Stage one nested hash write under the call's TTL policy.
pub(crate) fn write_hash(builder: &mut ProgramBuilder, policy: &TtlPolicy, write: NestedWrite) {
    let key = builder.key(write.key);
    let pairs = builder.args(write.fields.into_iter().flat_map(|(k, v)| [k, v]));
    builder.op(ScriptOp::HashWrite { key, pairs });
    policy.apply(builder, key);
}
