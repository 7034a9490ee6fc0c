use crate::{
    codec::{FlatMap, SerializeError, scalar, wire_field_name},
    error::DbError,
    record::Record,
    schema::{FieldKind, ModelSchema, SchemaRegistry, TupleSlot},
    value::Value,
};
use std::collections::BTreeSet;

///
/// Resolver
///
/// The fetch capability unflattening needs to chase nested pointers:
/// given a model name and a storage key, produce the stored flat map, or
/// `None` when the key does not exist (expired, deleted, or dangling).
///
/// The engine backs this with the nested bundle a select script already
/// fetched, so resolution never costs another round trip.
///

pub trait Resolver {
    fn resolve(&self, model: &str, key: &str) -> Result<Option<FlatMap>, DbError>;
}

/// Rebuild the record stored under `key` from its flat map, recursing into
/// nested pointers through `resolver`.
///
/// Omitted fields decode to the kind's absent value (`Null`); a pointer
/// whose target the resolver cannot produce decodes to `Null` as well,
/// extending the silent-unknown-id select policy to dangling references.
/// Dangling entries inside lists and maps are skipped.
///
/// Cycle safety: the set of (model, key) pairs currently being resolved is
/// tracked per top-level call, seeded with the root record itself; a
/// pointer that revisits an in-progress pair fails with `CyclicReference`,
/// and a pointer straight back to `key` is the shortest such revisit.
/// Acyclic trees are the expected shape, but stored pointers are data and
/// data can lie.
pub fn unflatten(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    key: &str,
    flat: &FlatMap,
    resolver: &dyn Resolver,
) -> Result<Record, DbError> {
    let mut in_progress = BTreeSet::new();
    in_progress.insert((schema.name().to_string(), key.to_string()));
    unflatten_inner(registry, schema, flat, resolver, &mut in_progress)
}

fn unflatten_inner(
    registry: &SchemaRegistry,
    schema: &ModelSchema,
    flat: &FlatMap,
    resolver: &dyn Resolver,
    in_progress: &mut BTreeSet<(String, String)>,
) -> Result<Record, DbError> {
    let mut record = Record::new();

    for desc in schema.fields() {
        let wire_name = wire_field_name(desc);
        let Some(text) = flat.get(&wire_name) else {
            continue;
        };

        let (kind, _) = desc.kind.unwrapped();
        let value = match kind {
            FieldKind::Scalar(scalar_kind) => {
                scalar::decode_scalar(&desc.name, *scalar_kind, text)?
            }
            FieldKind::Nested(target) => {
                follow_pointer(registry, target, text, resolver, in_progress)?
            }
            FieldKind::ListOfNested(target) => {
                let keys = decode_key_array(&desc.name, text)?;
                let mut items = Vec::with_capacity(keys.len());
                for key in keys {
                    match follow_pointer(registry, target, &key, resolver, in_progress)? {
                        Value::Null => {}
                        item => items.push(item),
                    }
                }
                Value::List(items)
            }
            FieldKind::TupleOf(slots) => {
                decode_tuple(registry, &desc.name, slots, text, resolver, in_progress)?
            }
            FieldKind::MapOfNested(target) => {
                let entries = decode_key_object(&desc.name, text)?;
                let mut out = std::collections::BTreeMap::new();
                for (entry_key, key) in entries {
                    match follow_pointer(registry, target, &key, resolver, in_progress)? {
                        Value::Null => {}
                        item => {
                            out.insert(entry_key, item);
                        }
                    }
                }
                Value::Map(out)
            }
            // `unwrapped` never returns an Optional.
            FieldKind::Optional(_) => continue,
        };

        record.set(desc.name.clone(), value);
    }

    Ok(record)
}

/// Resolve one stored pointer into a fully reconstructed nested record.
/// A requested nested field is never returned partially decoded: either the
/// whole record comes back, or `Null` does.
fn follow_pointer(
    registry: &SchemaRegistry,
    target: &str,
    key: &str,
    resolver: &dyn Resolver,
    in_progress: &mut BTreeSet<(String, String)>,
) -> Result<Value, DbError> {
    let pair = (target.to_string(), key.to_string());
    if in_progress.contains(&pair) {
        return Err(DbError::CyclicReference {
            model: target.to_string(),
            key: key.to_string(),
        });
    }

    let Some(flat) = resolver.resolve(target, key)? else {
        return Ok(Value::Null);
    };

    let target_schema = registry.lookup(target)?;
    in_progress.insert(pair.clone());
    let nested = unflatten_inner(registry, target_schema, &flat, resolver, in_progress);
    in_progress.remove(&pair);

    nested.map(Value::Record)
}

fn decode_tuple(
    registry: &SchemaRegistry,
    field: &str,
    slots: &[TupleSlot],
    text: &str,
    resolver: &dyn Resolver,
    in_progress: &mut BTreeSet<(String, String)>,
) -> Result<Value, DbError> {
    let elements: Vec<serde_json::Value> = serde_json::from_str(text).map_err(|err| {
        SerializeError::Decode {
            field: field.to_string(),
            expected: "tuple",
            message: err.to_string(),
        }
    })?;
    if elements.len() != slots.len() {
        return Err(SerializeError::TupleArity {
            field: field.to_string(),
            expected: slots.len(),
            found: elements.len(),
        }
        .into());
    }

    let mut items = Vec::with_capacity(slots.len());
    for (slot, element) in slots.iter().zip(&elements) {
        let value = match slot {
            TupleSlot::Scalar(kind) => scalar::tuple_scalar_from_json(field, *kind, element)?,
            TupleSlot::Nested(target) => {
                let key = element.as_str().ok_or_else(|| SerializeError::Decode {
                    field: field.to_string(),
                    expected: "nested pointer",
                    message: format!("unexpected inline element {element}"),
                })?;
                follow_pointer(registry, target, key, resolver, in_progress)?
            }
        };
        items.push(value);
    }

    Ok(Value::Tuple(items))
}

fn decode_key_array(field: &str, text: &str) -> Result<Vec<String>, SerializeError> {
    serde_json::from_str(text).map_err(|err| SerializeError::Decode {
        field: field.to_string(),
        expected: "pointer list",
        message: err.to_string(),
    })
}

fn decode_key_object(
    field: &str,
    text: &str,
) -> Result<std::collections::BTreeMap<String, String>, SerializeError> {
    serde_json::from_str(text).map_err(|err| SerializeError::Decode {
        field: field.to_string(),
        expected: "pointer map",
        message: err.to_string(),
    })
}
