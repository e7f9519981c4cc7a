//! Unique identifiers for longrun entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque identifier of one scheduled continuation.
///
/// Handed out by a deferred scheduler when a continuation is created and
/// stored in the execution record until the continuation is consumed or
/// cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContinuationId(Ulid);

impl ContinuationId {
    /// Generate a new ContinuationId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ContinuationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContinuationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ContinuationId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
