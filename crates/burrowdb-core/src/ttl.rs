//! Call-scoped expiry. Each write call resolves exactly one policy — the
//! caller's ttl, else the store default, else no expiry — and applies it
//! uniformly to every key the call touches, the index key included.

use crate::script::{ProgramBuilder, ScriptOp, Slot};
use std::time::Duration;

///
/// TtlPolicy
///
/// The resolved policy for one call. Holds the ttl argument slot so every
/// expire op in the program shares a single invocation argument.
///

#[derive(Clone, Copy, Debug)]
pub struct TtlPolicy {
    ttl_ms: Option<Slot>,
}

impl TtlPolicy {
    /// Resolve the policy for one call and stage its argument.
    pub fn resolve(
        builder: &mut ProgramBuilder,
        call: Option<Duration>,
        store_default: Option<Duration>,
    ) -> Self {
        let ttl_ms = call.or(store_default).map(|ttl| {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            builder.arg(millis.to_string())
        });
        Self { ttl_ms }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.ttl_ms.is_some()
    }

    /// Expire `key` under this policy; a no-op when no ttl is in force.
    pub fn apply(&self, builder: &mut ProgramBuilder, key: Slot) {
        if let Some(ttl_ms) = self.ttl_ms {
            builder.op(ScriptOp::Expire { key, ttl_ms });
        }
    }
}
