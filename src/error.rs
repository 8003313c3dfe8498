//! Error types for the refcache library.
//!
//! Almost nothing in this crate fails: a rejected insert, a miss or a refused
//! reuse are ordinary outcomes reported through `Option`/`bool`. The two error
//! types below cover what is left.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned by strict configuration checks such as
//!   [`AdaptiveConfig::validate`](crate::config::AdaptiveConfig::validate) and
//!   the builder's `try_build_*` methods.
//! - [`InvariantError`]: Returned by `check_invariants` on the caches when
//!   internal bookkeeping disagrees with itself.
//!
//! ## Example Usage
//!
//! ```
//! use refcache::config::AdaptiveConfig;
//! use refcache::error::ConfigError;
//!
//! let config = AdaptiveConfig {
//!     lfu_fraction_promil: 950,
//!     ..AdaptiveConfig::default()
//! };
//! let err: ConfigError = config.validate().unwrap_err();
//! assert!(err.to_string().contains("lfu_fraction_promil"));
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache bookkeeping is inconsistent.
///
/// Produced by `check_invariants` on
/// [`CountingMemoryCache`](crate::policy::counting::CountingMemoryCache).
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invariant violated: {}", self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration is out of range.
///
/// The lenient constructors never produce this; they substitute defaults and
/// report through an [`IllegalConfigHook`](crate::config::IllegalConfigHook)
/// instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
