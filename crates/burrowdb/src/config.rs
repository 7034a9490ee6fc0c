use std::time::Duration;

///
/// StoreConfig
///
/// Per-store tuning. Every knob has a usable default; builder methods
/// override individually.
///

#[derive(Clone, Copy, Debug)]
pub struct StoreConfig {
    /// Expiry applied when a write call passes no TTL of its own.
    /// `None` means such writes never expire.
    pub default_ttl: Option<Duration>,

    /// How many pointer hops a select resolves before leaving deeper
    /// references as absent. Bounds work on self-referential schemas.
    pub max_resolve_depth: usize,

    /// Loaded-script handles kept per store; zero disables caching.
    pub script_cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: None,
            max_resolve_depth: 8,
            script_cache_capacity: 128,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn with_max_resolve_depth(mut self, depth: usize) -> Self {
        self.max_resolve_depth = depth;
        self
    }

    #[must_use]
    pub const fn with_script_cache_capacity(mut self, capacity: usize) -> Self {
        self.script_cache_capacity = capacity;
        self
    }
}
