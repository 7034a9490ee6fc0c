//! Script programs: the server-evaluated form of one API call.
//!
//! A program is a short op sequence over positional key/argument slots plus,
//! for fetches, a resolve table that lets the backend chase nested pointers
//! without schema knowledge. Programs carry no data — record values, ids,
//! ttls, and window bounds all travel in the invocation — so one loaded
//! program serves arbitrarily many calls of the same shape.

mod cache;
mod program;

pub use cache::ScriptCache;
pub use program::{
    Invocation, PointerField, PointerShape, ProgramBuilder, ResolveTable, ScriptOp, ScriptProgram,
    Slot, Span,
};
