//! The storage boundary: a backend loads script programs once and invokes
//! them by handle. An invocation is indivisible — either every op in the
//! program takes effect or none does — which is the only atomicity the
//! engine relies on.

mod memory;

pub use memory::MemoryBackend;

use crate::script::ScriptProgram;
use thiserror::Error as ThisError;

///
/// ScriptHandle
///
/// Opaque ticket for a loaded program, valid only against the backend that
/// issued it.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ScriptHandle(pub u64);

///
/// Reply
///
/// The backend's answer to an invocation. Write programs answer with a
/// count; fetch programs answer with an array of rows.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    Nil,
    Int(i64),
    Text(String),
    Array(Vec<Reply>),
}

impl Reply {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_array(self) -> Result<Vec<Reply>, BackendError> {
        match self {
            Self::Array(items) => Ok(items),
            other => Err(BackendError::BadReply(format!(
                "expected array reply, got {other:?}"
            ))),
        }
    }
}

///
/// BackendError
///

#[derive(Debug, ThisError)]
pub enum BackendError {
    #[error("script handle {0} is not loaded")]
    UnknownHandle(u64),

    #[error("program references {what} slot {index} but the invocation supplied {len}")]
    SlotOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("malformed invocation argument: {0}")]
    BadArgument(String),

    #[error("unexpected reply shape: {0}")]
    BadReply(String),

    #[error("transport: {0}")]
    Transport(String),
}

///
/// ScriptBackend
///
/// `load` registers a program and returns its handle; `invoke` runs a loaded
/// program over per-call keys and arguments, atomically.
///

pub trait ScriptBackend: Send + Sync {
    fn load(&self, program: &ScriptProgram) -> Result<ScriptHandle, BackendError>;

    fn invoke(
        &self,
        handle: ScriptHandle,
        keys: &[String],
        args: &[String],
    ) -> Result<Reply, BackendError>;
}
