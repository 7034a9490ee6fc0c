use crate::engine::{EngineCtx, encode_id};
use burrowdb_core::{
    error::DbError, index::IndexSlots, key::record_key, script::ProgramBuilder,
    script::ScriptOp, value::Value,
};
use tracing::debug;

/// Remove records and their index entries in one atomic invocation.
///
/// Never cascades: nested records the deleted hashes point at keep their
/// own keys and lifecycles. Unknown ids delete nothing and are not errors.
pub(crate) fn delete(ctx: &EngineCtx<'_>, model: &str, ids: &[Value]) -> Result<(), DbError> {
    let schema = ctx.registry.lookup(model)?;
    if ids.is_empty() {
        return Ok(());
    }

    let mut builder = ProgramBuilder::new();
    let index = IndexSlots::for_model(&mut builder, model);

    for id in ids {
        let key = builder.key(record_key(model, &encode_id(schema, id)?));
        builder.op(ScriptOp::HashDelete { key });
        index.remove(&mut builder, key);
    }

    let (program, invocation) = builder.finish();
    debug!(model, ids = ids.len(), "delete");
    ctx.invoke(&program, &invocation)?;

    Ok(())
}
