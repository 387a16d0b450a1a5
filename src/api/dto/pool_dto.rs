//! Pool administration DTOs.

use serde::{Deserialize, Serialize};

use super::common_dto::PaginationMeta;
use crate::domain::PoolIdentity;

/// Filter for `GET /pools`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolFilter {
    /// Only list pools that are scraped.
    #[serde(default)]
    pub active_only: bool,
}

/// Paginated list response for `GET /pools`.
#[derive(Debug, Serialize)]
pub struct PoolListResponse {
    /// Pool identities, ordered by id.
    pub data: Vec<PoolIdentity>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
