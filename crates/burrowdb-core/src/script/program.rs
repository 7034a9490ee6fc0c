use crate::{
    codec::wire_field_name,
    error::DbError,
    schema::{FieldKind, SchemaRegistry, TupleSlot},
};
use std::collections::BTreeMap;
use xxhash_rust::xxh3::Xxh3;

/// Seed for program fingerprints; bump when the op encoding changes shape.
const FINGERPRINT_SEED: u64 = 0x6275_7272_6f77_0001;

/// Index into an invocation's key vector.
pub type Slot = usize;

///
/// Span
///
/// A contiguous run of invocation argument slots.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    #[must_use]
    pub const fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

///
/// ScriptOp
///
/// One step of a program. Ops name keys and arguments purely by position,
/// so the op sequence is data-free and cacheable.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptOp {
    /// Merge field/value pairs (`pairs` holds alternating name, value) into
    /// the hash at `key`, creating it if absent.
    HashWrite { key: Slot, pairs: Span },

    /// Set the time-to-live of `key` to `ttl_ms` milliseconds.
    Expire { key: Slot, ttl_ms: Slot },

    /// Append `member` to the sorted index at `index`, scored by the next
    /// value of the monotonic counter at `counter`. Re-adding an existing
    /// member moves it to the end.
    IndexAdd {
        index: Slot,
        counter: Slot,
        member: Slot,
    },

    /// Remove `member` from the sorted index at `index`.
    IndexRemove { index: Slot, member: Slot },

    /// Delete the hash at `key` outright.
    HashDelete { key: Slot },

    /// Fetch the hashes named by the `members` key span, in span order,
    /// restricted to the `columns` argument span (empty means all fields),
    /// chasing nested pointers up to `depth` hops via the resolve table.
    FetchKeys {
        members: Span,
        columns: Span,
        depth: Slot,
    },

    /// Fetch a rank window of the sorted index at `index`: skip the first
    /// `skip` members, take `limit` (a negative limit takes the rest), then
    /// fetch each member hash as `FetchKeys` would.
    FetchWindow {
        index: Slot,
        skip: Slot,
        limit: Slot,
        columns: Span,
        depth: Slot,
    },
}

///
/// PointerShape
///
/// How a stored field value encodes nested-record pointers. The tuple shape
/// carries one flag per slot; `true` marks a pointer position.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PointerShape {
    Single,
    List,
    Map,
    Tuple(Vec<bool>),
}

///
/// PointerField
///
/// One pointer-bearing field of a model, named by its wire form.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PointerField {
    pub wire_name: String,
    pub shape: PointerShape,
}

///
/// ResolveTable
///
/// Per-model pointer descriptors for every schema reachable from a fetch
/// root. Shipped inside fetch programs so the backend can chase pointers
/// without knowing the schemas themselves.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolveTable {
    models: BTreeMap<String, Vec<PointerField>>,
}

impl ResolveTable {
    /// Build the table for everything reachable from `root`.
    pub fn from_registry(registry: &SchemaRegistry, root: &str) -> Result<Self, DbError> {
        let mut models = BTreeMap::new();

        for schema in registry.reachable_from(root)? {
            let mut pointers = Vec::new();

            for desc in schema.fields() {
                let (kind, _) = desc.kind.unwrapped();
                let shape = match kind {
                    FieldKind::Nested(_) => PointerShape::Single,
                    FieldKind::ListOfNested(_) => PointerShape::List,
                    FieldKind::MapOfNested(_) => PointerShape::Map,
                    FieldKind::TupleOf(slots) => {
                        let mask: Vec<bool> = slots
                            .iter()
                            .map(|s| matches!(s, TupleSlot::Nested(_)))
                            .collect();
                        if !mask.contains(&true) {
                            continue;
                        }
                        PointerShape::Tuple(mask)
                    }
                    _ => continue,
                };
                pointers.push(PointerField {
                    wire_name: wire_field_name(desc),
                    shape,
                });
            }

            models.insert(schema.name().to_string(), pointers);
        }

        Ok(Self { models })
    }

    #[must_use]
    pub fn pointer_fields(&self, model: &str) -> &[PointerField] {
        self.models.get(model).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn contains_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }
}

///
/// ScriptProgram
///
/// A complete loadable program: the op sequence plus the resolve table
/// fetches need. Two calls of the same shape produce equal programs and
/// therefore equal fingerprints, which is what makes the cache work.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptProgram {
    pub ops: Vec<ScriptOp>,
    pub resolve: Option<ResolveTable>,
}

impl ScriptProgram {
    /// Topology fingerprint: hashes the op sequence, every slot and span
    /// position, and the resolve table, never invocation data.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::with_seed(FINGERPRINT_SEED);

        feed_usize(&mut hasher, self.ops.len());
        for op in &self.ops {
            feed_op(&mut hasher, op);
        }

        match &self.resolve {
            None => hasher.update(&[0]),
            Some(table) => {
                hasher.update(&[1]);
                feed_usize(&mut hasher, table.models.len());
                for (model, pointers) in &table.models {
                    feed_str(&mut hasher, model);
                    feed_usize(&mut hasher, pointers.len());
                    for pointer in pointers {
                        feed_str(&mut hasher, &pointer.wire_name);
                        feed_shape(&mut hasher, &pointer.shape);
                    }
                }
            }
        }

        hasher.digest()
    }
}

fn feed_op(hasher: &mut Xxh3, op: &ScriptOp) {
    match op {
        ScriptOp::HashWrite { key, pairs } => {
            hasher.update(&[1]);
            feed_usize(hasher, *key);
            feed_span(hasher, *pairs);
        }
        ScriptOp::Expire { key, ttl_ms } => {
            hasher.update(&[2]);
            feed_usize(hasher, *key);
            feed_usize(hasher, *ttl_ms);
        }
        ScriptOp::IndexAdd {
            index,
            counter,
            member,
        } => {
            hasher.update(&[3]);
            feed_usize(hasher, *index);
            feed_usize(hasher, *counter);
            feed_usize(hasher, *member);
        }
        ScriptOp::IndexRemove { index, member } => {
            hasher.update(&[4]);
            feed_usize(hasher, *index);
            feed_usize(hasher, *member);
        }
        ScriptOp::HashDelete { key } => {
            hasher.update(&[5]);
            feed_usize(hasher, *key);
        }
        ScriptOp::FetchKeys {
            members,
            columns,
            depth,
        } => {
            hasher.update(&[6]);
            feed_span(hasher, *members);
            feed_span(hasher, *columns);
            feed_usize(hasher, *depth);
        }
        ScriptOp::FetchWindow {
            index,
            skip,
            limit,
            columns,
            depth,
        } => {
            hasher.update(&[7]);
            feed_usize(hasher, *index);
            feed_usize(hasher, *skip);
            feed_usize(hasher, *limit);
            feed_span(hasher, *columns);
            feed_usize(hasher, *depth);
        }
    }
}

fn feed_shape(hasher: &mut Xxh3, shape: &PointerShape) {
    match shape {
        PointerShape::Single => hasher.update(&[1]),
        PointerShape::List => hasher.update(&[2]),
        PointerShape::Map => hasher.update(&[3]),
        PointerShape::Tuple(mask) => {
            hasher.update(&[4]);
            feed_usize(hasher, mask.len());
            for flag in mask {
                hasher.update(&[u8::from(*flag)]);
            }
        }
    }
}

fn feed_span(hasher: &mut Xxh3, span: Span) {
    feed_usize(hasher, span.start);
    feed_usize(hasher, span.len);
}

fn feed_usize(hasher: &mut Xxh3, n: usize) {
    hasher.update(&(n as u64).to_le_bytes());
}

fn feed_str(hasher: &mut Xxh3, s: &str) {
    feed_usize(hasher, s.len());
    hasher.update(s.as_bytes());
}

///
/// Invocation
///
/// The per-call data a program runs over: the key vector its slots index
/// and the argument vector its spans cover.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Invocation {
    pub keys: Vec<String>,
    pub args: Vec<String>,
}

///
/// ProgramBuilder
///
/// Assembles a program and its invocation together, handing back the slot
/// or span for each pushed key and argument so ops can reference them.
///

#[derive(Debug, Default)]
pub struct ProgramBuilder {
    keys: Vec<String>,
    args: Vec<String>,
    ops: Vec<ScriptOp>,
    resolve: Option<ResolveTable>,
}

impl ProgramBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&mut self, key: impl Into<String>) -> Slot {
        self.keys.push(key.into());
        self.keys.len() - 1
    }

    pub fn keys(&mut self, keys: impl IntoIterator<Item = String>) -> Span {
        let start = self.keys.len();
        self.keys.extend(keys);
        Span {
            start,
            len: self.keys.len() - start,
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> Slot {
        self.args.push(arg.into());
        self.args.len() - 1
    }

    pub fn args(&mut self, args: impl IntoIterator<Item = String>) -> Span {
        let start = self.args.len();
        self.args.extend(args);
        Span {
            start,
            len: self.args.len() - start,
        }
    }

    pub fn op(&mut self, op: ScriptOp) {
        self.ops.push(op);
    }

    pub fn resolve_with(&mut self, table: ResolveTable) {
        self.resolve = Some(table);
    }

    #[must_use]
    pub fn finish(self) -> (ScriptProgram, Invocation) {
        (
            ScriptProgram {
                ops: self.ops,
                resolve: self.resolve,
            },
            Invocation {
                keys: self.keys,
                args: self.args,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, ModelSchema, ScalarKind, SchemaRegistry, TupleSlot};

    fn insert_program(record_key: &str, fields: &[(&str, &str)]) -> (ScriptProgram, Invocation) {
        let mut b = ProgramBuilder::new();
        let key = b.key(record_key);
        let index = b.key("book:__index");
        let counter = b.key("book:__seq");
        let pairs = b.args(
            fields
                .iter()
                .flat_map(|(k, v)| [(*k).to_string(), (*v).to_string()]),
        );
        b.op(ScriptOp::HashWrite { key, pairs });
        b.op(ScriptOp::IndexAdd {
            index,
            counter,
            member: key,
        });
        b.finish()
    }

    #[test]
    fn same_shape_same_fingerprint() {
        let (a, _) = insert_program("book:Emma", &[("title", "Emma"), ("rating", "4.0")]);
        let (b, _) = insert_program("book:Persuasion", &[("title", "Persuasion"), ("rating", "5")]);
        assert_eq!(
            a.fingerprint(),
            b.fingerprint(),
            "data must not affect the fingerprint"
        );
    }

    #[test]
    fn different_shape_different_fingerprint() {
        let (two_fields, _) = insert_program("book:Emma", &[("title", "Emma"), ("rating", "4.0")]);
        let (one_field, _) = insert_program("book:Emma", &[("title", "Emma")]);
        assert_ne!(two_fields.fingerprint(), one_field.fingerprint());
    }

    #[test]
    fn builder_assigns_positions_in_order() {
        let mut b = ProgramBuilder::new();
        assert_eq!(b.key("a"), 0);
        assert_eq!(b.key("b"), 1);
        let span = b.args(["x".to_string(), "y".to_string(), "z".to_string()]);
        assert_eq!(span, Span { start: 0, len: 3 });
        assert_eq!(b.arg("w"), 3);

        let (_, invocation) = b.finish();
        assert_eq!(invocation.keys, vec!["a", "b"]);
        assert_eq!(invocation.args, vec!["x", "y", "z", "w"]);
    }

    #[test]
    fn resolve_table_covers_reachable_pointer_fields() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                ModelSchema::new("author", "name")
                    .field("name", FieldKind::Scalar(ScalarKind::Text)),
            )
            .expect("register author");
        registry
            .register(
                ModelSchema::new("book", "title")
                    .field("title", FieldKind::Scalar(ScalarKind::Text))
                    .field("author", FieldKind::Nested("author".to_string()))
                    .field("editions", FieldKind::ListOfNested("book".to_string()))
                    .field(
                        "highlight",
                        FieldKind::TupleOf(vec![
                            TupleSlot::Scalar(ScalarKind::Int),
                            TupleSlot::Nested("author".to_string()),
                        ]),
                    ),
            )
            .expect("register book");
        registry.resolve().expect("resolve");

        let table = ResolveTable::from_registry(&registry, "book").expect("table");

        assert!(table.contains_model("author"));
        let pointers = table.pointer_fields("book");
        assert_eq!(pointers.len(), 3, "three pointer-bearing fields");
        assert!(
            pointers
                .iter()
                .any(|p| p.wire_name == "author" && p.shape == PointerShape::Single),
            "single nested field keeps its plain wire name"
        );
        assert!(
            pointers
                .iter()
                .any(|p| p.wire_name == "__%&l_editions" && p.shape == PointerShape::List),
            "list field carries the list marker"
        );
        assert!(pointers.iter().any(|p| matches!(
            &p.shape,
            PointerShape::Tuple(mask) if mask == &[false, true]
        )));
        assert!(
            table.pointer_fields("author").is_empty(),
            "scalar-only model has no pointers"
        );
    }
}
