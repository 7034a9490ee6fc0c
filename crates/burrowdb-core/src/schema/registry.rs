use crate::{
    codec::collides_with_marker,
    error::DbError,
    schema::{FieldKind, ModelSchema, SchemaError},
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

///
/// SchemaRegistry
///
/// Explicit registry of resolved model schemas, owned by one `Store` and
/// passed by reference to every operation. No hidden process-wide state.
///
/// Registration is two-phase: `register` validates everything local to one
/// schema and records nested references by name; `resolve` runs after a
/// batch and fails if any referenced name is still unregistered. The split
/// is what allows forward and self references.
///

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, ModelSchema>,
    resolved: bool,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First phase: validate and record one schema.
    ///
    /// Checks performed here are local: duplicate registration, a declared
    /// primary-key field that exists and is a non-optional scalar, unique
    /// field names, and no collision with the reserved marker prefixes.
    pub fn register(&mut self, schema: ModelSchema) -> Result<(), SchemaError> {
        let model = schema.name().to_string();

        // Storage keys are `{model}:{pk}` and pointer chasing splits on the
        // first ':', so a colon in the model name would corrupt every key.
        if model.contains(':') {
            return Err(SchemaError::InvalidModelName(model));
        }
        if self.schemas.contains_key(&model) {
            return Err(SchemaError::DuplicateSchema(model));
        }
        if schema.fields().is_empty() {
            return Err(SchemaError::EmptySchema(model));
        }

        let mut seen = BTreeSet::new();
        for desc in schema.fields() {
            if !seen.insert(desc.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    model,
                    field: desc.name.clone(),
                });
            }
            if collides_with_marker(&desc.name) {
                return Err(SchemaError::ReservedFieldName {
                    model,
                    field: desc.name.clone(),
                });
            }
        }

        let Some(pk) = schema.descriptor(schema.primary_key()) else {
            return Err(SchemaError::MissingPrimaryKey {
                model,
                field: schema.primary_key().to_string(),
            });
        };
        if !matches!(pk.kind, FieldKind::Scalar(_)) {
            return Err(SchemaError::PrimaryKeyNotScalar {
                model,
                field: pk.name.clone(),
            });
        }

        self.schemas.insert(model, schema);
        self.resolved = false;
        Ok(())
    }

    /// Second phase: check that every nested reference in every registered
    /// schema points at a registered schema. Idempotent; call again after
    /// registering more schemas.
    pub fn resolve(&mut self) -> Result<(), SchemaError> {
        if self.resolved {
            return Ok(());
        }

        for schema in self.schemas.values() {
            for desc in schema.fields() {
                for target in desc.kind.referenced_schemas() {
                    if !self.schemas.contains_key(target) {
                        return Err(SchemaError::UnresolvedReference {
                            model: schema.name().to_string(),
                            field: desc.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }

        self.resolved = true;
        Ok(())
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Look up a resolved schema by model name.
    pub fn lookup(&self, model: &str) -> Result<&ModelSchema, DbError> {
        self.schemas
            .get(model)
            .ok_or_else(|| DbError::NotRegistered(model.to_string()))
    }

    /// All schemas reachable from `model` through nested references,
    /// including `model` itself, in breadth-first order. Cycle-safe, so
    /// self-referential schemas terminate.
    pub fn reachable_from(&self, model: &str) -> Result<Vec<&ModelSchema>, DbError> {
        let root = self.lookup(model)?;

        let mut out = Vec::new();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([root.name()]);

        while let Some(name) = queue.pop_front() {
            if !visited.insert(name) {
                continue;
            }
            let schema = self.lookup(name)?;
            out.push(schema);
            for target in schema.referenced_schemas() {
                if !visited.contains(target) {
                    queue.push_back(target);
                }
            }
        }

        Ok(out)
    }
}
