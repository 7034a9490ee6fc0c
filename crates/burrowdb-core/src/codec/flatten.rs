use crate::{
    codec::{FlatMap, SerializeError, scalar, wire_field_name},
    error::DbError,
    key::record_key,
    record::Record,
    schema::{FieldKind, ModelSchema, SchemaRegistry, TupleSlot},
    value::Value,
};
use std::collections::BTreeMap;

///
/// NestedWrite
///
/// One queued hash write for a nested record encountered during flattening:
/// its storage key and its own flat map. The worklist is transitive — a
/// nested record's nested records appear before it.
///

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NestedWrite {
    pub key: String,
    pub fields: FlatMap,
}

/// Flatten one record of `schema` into its flat map plus the transitive
/// worklist of nested writes.
///
/// Purely computational. Fields the schema does not declare are ignored;
/// declared fields that are absent or `Null` are omitted from the flat map
/// entirely (never a null sentinel). Nested records sharing a storage key
/// within one call collapse to a single write, last value wins.
///
/// Flattening cannot loop: records own their children by value, so a cyclic
/// record graph is unconstructible. The cycle guard lives on the decode
/// side, where stored pointers are data.
pub fn flatten(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    record: &Record,
) -> Result<(FlatMap, Vec<NestedWrite>), DbError> {
    let mut worklist = NestedWrites::default();
    let flat = flatten_into(registry, schema, record, &mut worklist)?;
    Ok((flat, worklist.into_vec()))
}

/// The canonical string form of a record's primary key, used to build its
/// storage key. Absent, `Null`, or non-scalar values are a
/// `PrimaryKeyMissing` error; a declared scalar that fails to encode is a
/// serialization error.
pub fn primary_key_string(schema: &ModelSchema, record: &Record) -> Result<String, DbError> {
    let field = schema.primary_key();
    let missing = || DbError::PrimaryKeyMissing {
        model: schema.name().to_string(),
        field: field.to_string(),
    };

    let value = record.get(field).ok_or_else(missing)?;
    if value.is_null() {
        return Err(missing());
    }
    let Some(FieldKind::Scalar(kind)) = schema.descriptor(field).map(|d| &d.kind) else {
        return Err(missing());
    };

    scalar::encode_scalar(field, *kind, value).map_err(DbError::from)
}

fn flatten_into(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    record: &Record,
    worklist: &mut NestedWrites,
) -> Result<FlatMap, DbError> {
    let mut flat = FlatMap::new();

    for desc in schema.fields() {
        let Some(value) = record.get(&desc.name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        let (kind, _) = desc.kind.unwrapped();
        let wire_name = wire_field_name(desc);

        let encoded = match kind {
            FieldKind::Scalar(scalar_kind) => {
                scalar::encode_scalar(&desc.name, *scalar_kind, value)?
            }
            FieldKind::Nested(target) => {
                let nested = expect_record(&desc.name, value)?;
                enqueue_nested(registry, target, nested, worklist)?
            }
            FieldKind::ListOfNested(target) => {
                let items = value.as_list().ok_or_else(|| {
                    kind_mismatch(&desc.name, "list of nested records", value)
                })?;
                let mut keys = Vec::with_capacity(items.len());
                for item in items {
                    let nested = expect_record(&desc.name, item)?;
                    keys.push(enqueue_nested(registry, target, nested, worklist)?);
                }
                serde_json::Value::from(keys).to_string()
            }
            FieldKind::TupleOf(slots) => {
                encode_tuple(registry, &desc.name, slots, value, worklist)?
            }
            FieldKind::MapOfNested(target) => {
                let entries = value
                    .as_map()
                    .ok_or_else(|| kind_mismatch(&desc.name, "map of nested records", value))?;
                let mut out = serde_json::Map::with_capacity(entries.len());
                for (entry_key, item) in entries {
                    let nested = expect_record(&desc.name, item)?;
                    let pointer = enqueue_nested(registry, target, nested, worklist)?;
                    out.insert(entry_key.clone(), serde_json::Value::String(pointer));
                }
                serde_json::Value::Object(out).to_string()
            }
            // `unwrapped` never returns an Optional.
            FieldKind::Optional(_) => continue,
        };

        flat.insert(wire_name, encoded);
    }

    Ok(flat)
}

/// Flatten a nested record, queue its write, and return its storage key.
fn enqueue_nested(
    registry: &SchemaRegistry,
    target: &str,
    nested: &Record,
    worklist: &mut NestedWrites,
) -> Result<String, DbError> {
    let target_schema = registry.lookup(target)?;
    let pk = primary_key_string(target_schema, nested)?;
    let key = record_key(target_schema.name(), &pk);

    let flat = flatten_into(registry, target_schema, nested, worklist)?;
    worklist.push(key.clone(), flat);

    Ok(key)
}

fn encode_tuple(
    registry: &SchemaRegistry,
    field: &str,
    slots: &[TupleSlot],
    value: &Value,
    worklist: &mut NestedWrites,
) -> Result<String, DbError> {
    let items = value
        .as_tuple()
        .ok_or_else(|| kind_mismatch(field, "tuple", value))?;
    if items.len() != slots.len() {
        return Err(SerializeError::TupleArity {
            field: field.to_string(),
            expected: slots.len(),
            found: items.len(),
        }
        .into());
    }

    let mut out = Vec::with_capacity(slots.len());
    for (slot, item) in slots.iter().zip(items) {
        let element = match slot {
            TupleSlot::Scalar(kind) => scalar::tuple_scalar_to_json(field, *kind, item)?,
            TupleSlot::Nested(target) => {
                let nested = expect_record(field, item)?;
                serde_json::Value::String(enqueue_nested(registry, target, nested, worklist)?)
            }
        };
        out.push(element);
    }

    Ok(serde_json::Value::Array(out).to_string())
}

fn expect_record<'a>(field: &str, value: &'a Value) -> Result<&'a Record, DbError> {
    value
        .as_record()
        .ok_or_else(|| kind_mismatch(field, "nested record", value))
}

fn kind_mismatch(field: &str, expected: &'static str, value: &Value) -> DbError {
    SerializeError::KindMismatch {
        field: field.to_string(),
        expected,
        found: value.tag(),
    }
    .into()
}

///
/// NestedWrites
///
/// Insertion-ordered, key-deduplicated write collector. A repeated key keeps
/// its original position but takes the latest flat map.
///

#[derive(Default)]
struct NestedWrites {
    order: Vec<String>,
    by_key: BTreeMap<String, FlatMap>,
}

impl NestedWrites {
    fn push(&mut self, key: String, fields: FlatMap) {
        if self.by_key.insert(key.clone(), fields).is_none() {
            self.order.push(key);
        }
    }

    fn into_vec(mut self) -> Vec<NestedWrite> {
        self.order
            .drain(..)
            .map(|key| {
                let fields = self
                    .by_key
                    .remove(&key)
                    .unwrap_or_default();
                NestedWrite { key, fields }
            })
            .collect()
    }
}
