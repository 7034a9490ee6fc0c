//! Core runtime for BurrowDB: schemas, the value model, the flat-map codec,
//! script programs, and the backend boundary. The public `Store` surface
//! lives one crate up in `burrowdb`.
#![warn(unreachable_pub)]

pub mod backend;
pub mod codec;
pub mod error;
pub mod index;
pub mod key;
pub mod record;
pub mod schema;
pub mod script;
pub mod ttl;
pub mod value;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, backends, codecs, or script plumbing are re-exported here.
///

pub mod prelude {
    pub use crate::{
        record::Record,
        schema::{FieldKind, ModelSchema, ScalarKind, TupleSlot},
        value::Value,
    };
}
