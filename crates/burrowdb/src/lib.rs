//! BurrowDB: a schema-driven record mapper over an atomic scripted
//! key-value hash store. Structured records flatten into hash-field maps,
//! nested records fan out to shared keys, and every API call runs as one
//! server-evaluated script invocation. See `burrowdb-core` for the codec,
//! schema, and backend layers.
#![warn(unreachable_pub)]

mod config;
mod engine;
mod store;

pub use config::StoreConfig;
pub use engine::Select;
pub use store::Store;

pub use burrowdb_core::{
    backend::{self, MemoryBackend, ScriptBackend},
    error::{DbError, DbErrorKind},
    record::Record,
    schema::{FieldKind, ModelSchema, ScalarKind, SchemaError, SchemaRegistry, TupleSlot},
    value::Value,
};

///
/// Prelude
///
/// Everything a typical caller touches: the store, the request types, and
/// the schema/record vocabulary.
///

pub mod prelude {
    pub use crate::{
        FieldKind, MemoryBackend, ModelSchema, Record, ScalarKind, Select, Store, StoreConfig,
        TupleSlot, Value,
    };
}
