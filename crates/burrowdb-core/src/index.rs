//! Per-model insertion-order index. One ordered set per model, member =
//! record storage key, score = a strictly increasing sequence drawn from
//! the model's counter key inside the same script call as the write. The
//! ops themselves live in [`crate::script`]; this module owns the window
//! arithmetic and the op emission the engine shares.

use crate::{
    key::{counter_key, index_key},
    script::{ProgramBuilder, ScriptOp, Slot},
};

///
/// Window
///
/// A rank window over a model index: skip the first `skip` members, take
/// `limit` (unbounded when `None`). The wire form of an unbounded limit is
/// `-1`, matching range conventions of ordered-set stores.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Window {
    pub skip: u64,
    pub limit: Option<u64>,
}

impl Window {
    #[must_use]
    pub const fn new(skip: u64, limit: Option<u64>) -> Self {
        Self { skip, limit }
    }

    #[must_use]
    pub fn skip_arg(&self) -> String {
        self.skip.to_string()
    }

    #[must_use]
    pub fn limit_arg(&self) -> String {
        self.limit.map_or_else(|| "-1".to_string(), |n| n.to_string())
    }
}

///
/// IndexSlots
///
/// The index and counter key slots of one model within a program, pushed
/// once and shared by every op that touches the index.
///

#[derive(Clone, Copy, Debug)]
pub struct IndexSlots {
    pub index: Slot,
    pub counter: Slot,
}

impl IndexSlots {
    /// Push the model's index and counter keys into the builder.
    pub fn for_model(builder: &mut ProgramBuilder, model: &str) -> Self {
        Self {
            index: builder.key(index_key(model)),
            counter: builder.key(counter_key(model)),
        }
    }

    /// Append `member` to the index, scored by the counter.
    pub fn add(&self, builder: &mut ProgramBuilder, member: Slot) {
        builder.op(ScriptOp::IndexAdd {
            index: self.index,
            counter: self.counter,
            member,
        });
    }

    /// Remove `member` from the index.
    pub fn remove(&self, builder: &mut ProgramBuilder, member: Slot) {
        builder.op(ScriptOp::IndexRemove {
            index: self.index,
            member,
        });
    }
}
