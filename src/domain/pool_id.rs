//! Type-safe pool identifier.
//!
//! [`PoolId`] is a validated slug (e.g. `kz-01`) naming one monitored
//! observer endpoint. The same identifier is the join key in the local store
//! and in the remote data store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ObserverError;

/// Maximum length of a pool identifier.
pub const MAX_POOL_ID_LEN: usize = 64;

/// Unique identifier for a monitored pool.
///
/// 1–64 characters from `[A-Za-z0-9_-]`. Chosen by the operator when the pool
/// is provisioned and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PoolId(String);

impl PoolId {
    /// Validates and wraps a pool identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::InvalidRequest`] when the identifier is empty,
    /// too long, or contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(raw: impl Into<String>) -> Result<Self, ObserverError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_POOL_ID_LEN {
            return Err(ObserverError::InvalidRequest(format!(
                "pool id must be 1-{MAX_POOL_ID_LEN} characters, got {}",
                raw.len()
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ObserverError::InvalidRequest(format!(
                "pool id {raw:?} may only contain letters, digits, '-' and '_'"
            )));
        }
        Ok(Self(raw))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PoolId {
    type Error = ObserverError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PoolId> for String {
    fn from(id: PoolId) -> Self {
        id.0
    }
}
