//! The flatten/unflatten codec: everything that turns structured records
//! into hash-field string maps and back. Purely computational; no I/O.

mod flatten;
mod scalar;
mod unflatten;

pub use flatten::{NestedWrite, flatten, primary_key_string};
pub use scalar::{decode_scalar, encode_scalar};
pub use unflatten::{Resolver, unflatten};

use crate::schema::{FieldDescriptor, FieldKind};
use derive_more::{Deref, DerefMut, IntoIterator};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

/// Reserved field-name marker for "list of nested records".
pub const LIST_MARKER: &str = "__%&l_";
/// Reserved field-name marker for "tuple of nested records".
pub const TUPLE_MARKER: &str = "__%&t_";
/// Reserved field-name marker for "mapping of nested records".
pub const MAP_MARKER: &str = "__%&m_";

/// All reserved markers, for registration-time collision checks.
pub const MARKERS: [&str; 3] = [LIST_MARKER, TUPLE_MARKER, MAP_MARKER];

/// Whether a user-declared field name collides with the reserved marker
/// space. Enforced at schema registration so stored field names stay
/// three-way distinguishable.
#[must_use]
pub fn collides_with_marker(field: &str) -> bool {
    MARKERS.iter().any(|m| field.starts_with(m))
}

/// The on-wire hash-field name for a declared field: unmodified for scalars
/// and single nested records, marker-prefixed for the three collection
/// kinds. Optional wrapping never changes the wire name.
#[must_use]
pub fn wire_field_name(desc: &FieldDescriptor) -> String {
    let (kind, _) = desc.kind.unwrapped();
    match kind {
        FieldKind::Scalar(_) | FieldKind::Nested(_) => desc.name.clone(),
        FieldKind::ListOfNested(_) => format!("{LIST_MARKER}{}", desc.name),
        FieldKind::TupleOf(_) => format!("{TUPLE_MARKER}{}", desc.name),
        FieldKind::MapOfNested(_) => format!("{MAP_MARKER}{}", desc.name),
        FieldKind::Optional(_) => desc.name.clone(),
    }
}

///
/// SerializeError
///
/// Canonical-encoding failures on the way in, and corrupt-data decode
/// failures on the way out. Both are surfaced unmodified; neither is
/// retried.
///

#[derive(Debug, ThisError)]
pub enum SerializeError {
    #[error("cannot encode {found} value as {expected} for field '{field}'")]
    KindMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("stored value for field '{field}' is not valid {expected}: {message}")]
    Decode {
        field: String,
        expected: &'static str,
        message: String,
    },

    #[error("tuple field '{field}' has arity {found}, schema declares {expected}")]
    TupleArity {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("float value for field '{field}' is not finite")]
    NonFiniteFloat { field: String },
}

///
/// FlatMap
///
/// The storage-side representation of one record: wire field name → encoded
/// string value. Ordered so op construction and fingerprints are stable.
///

#[derive(Clone, Debug, Default, Deref, DerefMut, IntoIterator, PartialEq, Eq)]
pub struct FlatMap(BTreeMap<String, String>);

impl FlatMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FromIterator<(String, String)> for FlatMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
