mod registry;

pub use registry::SchemaRegistry;

use thiserror::Error as ThisError;

///
/// SchemaError
///
/// Registration-time failures. These are caller errors, raised synchronously
/// before any network round trip, and never recoverable by retry.
///

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("schema '{0}' is already registered")]
    DuplicateSchema(String),

    #[error("schema name '{0}' contains the reserved key separator ':'")]
    InvalidModelName(String),

    #[error("schema '{model}' does not declare a field for its primary key '{field}'")]
    MissingPrimaryKey { model: String, field: String },

    #[error("primary key '{field}' of schema '{model}' must be a non-optional scalar")]
    PrimaryKeyNotScalar { model: String, field: String },

    #[error("schema '{model}' declares field '{field}' more than once")]
    DuplicateField { model: String, field: String },

    #[error("field '{field}' of schema '{model}' collides with a reserved marker prefix")]
    ReservedFieldName { model: String, field: String },

    #[error("field '{field}' of schema '{model}' references unregistered schema '{target}'")]
    UnresolvedReference {
        model: String,
        field: String,
        target: String,
    },

    #[error("schema '{0}' declares no fields")]
    EmptySchema(String),

    #[error("schema registry has unresolved registrations; resolve before running operations")]
    RegistryUnresolved,
}

///
/// ScalarKind
///
/// Closed set of scalar wire forms. Decoding is driven by the declared kind,
/// never by inspecting the stored text, so `Text` can hold strings like
/// "true" or "42" without ambiguity.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Text,
    Date,
    /// Free-form JSON structure of plain values (lists, maps, mixes).
    /// Used for things like tag lists that carry no nested records.
    Json,
}

impl ScalarKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Date => "date",
            Self::Json => "json",
        }
    }
}

///
/// TupleSlot
///
/// One positional slot of a tuple field. Tuples are fixed-arity; decoding is
/// positional against these declared slots, not runtime inspection.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TupleSlot {
    Scalar(ScalarKind),
    /// Nested record slot, referencing a schema by name.
    Nested(String),
}

///
/// FieldKind
///
/// The explicit, closed classification of a declared field. Nested schema
/// references are held by name and resolved in a second registration pass,
/// which is what makes forward and self references possible.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Nested(String),
    ListOfNested(String),
    TupleOf(Vec<TupleSlot>),
    MapOfNested(String),
    Optional(Box<FieldKind>),
}

impl FieldKind {
    /// Strip optional wrapping down to the underlying kind. Nothing stops
    /// a caller nesting `Optional` twice; it means the same thing as once.
    #[must_use]
    pub fn unwrapped(&self) -> (&Self, bool) {
        let mut kind = self;
        let mut optional = false;
        while let Self::Optional(inner) = kind {
            kind = inner.as_ref();
            optional = true;
        }
        (kind, optional)
    }

    /// Schema names this kind references, in declaration order.
    #[must_use]
    pub fn referenced_schemas(&self) -> Vec<&str> {
        match self {
            Self::Scalar(_) => Vec::new(),
            Self::Nested(name) | Self::ListOfNested(name) | Self::MapOfNested(name) => {
                vec![name.as_str()]
            }
            Self::TupleOf(slots) => slots
                .iter()
                .filter_map(|slot| match slot {
                    TupleSlot::Nested(name) => Some(name.as_str()),
                    TupleSlot::Scalar(_) => None,
                })
                .collect(),
            Self::Optional(inner) => inner.referenced_schemas(),
        }
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self.unwrapped().0, Self::Scalar(_))
    }
}

///
/// FieldDescriptor
///

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

///
/// ModelSchema
///
/// Per-model description: unique name, primary-key field name, and the
/// ordered field descriptors. Constructed by the schema front end (out of
/// scope here) as plain values, then registered into a `SchemaRegistry`.
///

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSchema {
    name: String,
    primary_key: String,
    fields: Vec<FieldDescriptor>,
}

impl ModelSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field descriptor, builder-style. Duplicates are caught at
    /// registration, not here.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[must_use]
    pub fn descriptor(&self, field: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|d| d.name == field)
    }

    /// All schema names referenced by any field of this schema.
    #[must_use]
    pub fn referenced_schemas(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for desc in &self.fields {
            out.extend(desc.kind.referenced_schemas());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_unwraps_one_level() {
        let kind = FieldKind::Optional(Box::new(FieldKind::Scalar(ScalarKind::Int)));
        let (inner, optional) = kind.unwrapped();
        assert!(optional, "optional wrapper should be reported");
        assert_eq!(inner, &FieldKind::Scalar(ScalarKind::Int));
    }

    #[test]
    fn tuple_reports_only_nested_slot_references() {
        let kind = FieldKind::TupleOf(vec![
            TupleSlot::Scalar(ScalarKind::Int),
            TupleSlot::Nested("author".to_string()),
            TupleSlot::Scalar(ScalarKind::Text),
            TupleSlot::Nested("book".to_string()),
        ]);
        assert_eq!(
            kind.referenced_schemas(),
            vec!["author", "book"],
            "only nested slots should surface as references"
        );
    }

    #[test]
    fn descriptor_lookup_finds_declared_fields() {
        let schema = ModelSchema::new("book", "title")
            .field("title", FieldKind::Scalar(ScalarKind::Text))
            .field("author", FieldKind::Nested("author".to_string()));
        assert!(schema.descriptor("author").is_some());
        assert!(schema.descriptor("publisher").is_none());
    }
}
