use crate::engine::{BundleResolver, EngineCtx, encode_id, parse_rows, wire_columns};
use burrowdb_core::{
    codec::unflatten,
    error::DbError,
    index::Window,
    key::{index_key, record_key},
    record::Record,
    script::{ProgramBuilder, ResolveTable, ScriptOp},
    value::Value,
};
use tracing::debug;

///
/// Select
///
/// One read request. Explicit ids bypass pagination entirely and come back
/// in request order; otherwise the index window `[skip, skip+limit)` drives
/// the fetch in insertion order. Unknown ids are silently omitted either
/// way. Column restriction never weakens nested resolution: a requested
/// nested field always decodes to a full record, not a pointer string.
///

#[derive(Clone, Debug, Default)]
pub struct Select {
    ids: Option<Vec<Value>>,
    skip: u64,
    limit: Option<u64>,
    columns: Option<Vec<String>>,
}

impl Select {
    /// Every record of the model, in insertion order.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Exactly the named records, in the order given. Skip and limit do
    /// not apply to explicit ids.
    #[must_use]
    pub fn by_ids(ids: impl IntoIterator<Item = Value>) -> Self {
        Self {
            ids: Some(ids.into_iter().collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn skip(mut self, n: u64) -> Self {
        self.skip = n;
        self
    }

    #[must_use]
    pub const fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Restrict the returned fields. Declared names are rewritten to their
    /// wire forms; unknown names match nothing.
    #[must_use]
    pub fn columns(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

/// Run one read in a single invocation: window (or key) lookup, hash
/// fetches, and all nested resolution happen inside the backend; decoding
/// happens here against the returned bundle.
pub(crate) fn select(
    ctx: &EngineCtx<'_>,
    model: &str,
    request: &Select,
) -> Result<Vec<Record>, DbError> {
    let schema = ctx.registry.lookup(model)?;

    let mut builder = ProgramBuilder::new();
    builder.resolve_with(ResolveTable::from_registry(ctx.registry, model)?);

    let wire_cols = request
        .columns
        .as_deref()
        .map(|cols| wire_columns(schema, cols))
        .unwrap_or_default();
    let depth_arg = ctx.config.max_resolve_depth.to_string();

    match request.ids.as_deref() {
        Some(ids) => {
            let member_keys = ids
                .iter()
                .map(|id| Ok(record_key(model, &encode_id(schema, id)?)))
                .collect::<Result<Vec<_>, DbError>>()?;
            let members = builder.keys(member_keys);
            let columns = builder.args(wire_cols);
            let depth = builder.arg(depth_arg);
            builder.op(ScriptOp::FetchKeys {
                members,
                columns,
                depth,
            });
        }
        None => {
            let window = Window::new(request.skip, request.limit);
            let index = builder.key(index_key(model));
            let skip = builder.arg(window.skip_arg());
            let limit = builder.arg(window.limit_arg());
            let columns = builder.args(wire_cols);
            let depth = builder.arg(depth_arg);
            builder.op(ScriptOp::FetchWindow {
                index,
                skip,
                limit,
                columns,
                depth,
            });
        }
    }

    let (program, invocation) = builder.finish();
    debug!(
        model,
        by_ids = request.ids.is_some(),
        columns = request.columns.is_some(),
        "select"
    );
    let reply = ctx.invoke(&program, &invocation)?;

    parse_rows(reply)?
        .into_iter()
        .map(|row| {
            let resolver = BundleResolver {
                bundle: &row.bundle,
            };
            unflatten(ctx.registry, schema, &row.key, &row.fields, &resolver)
        })
        .collect()
}
