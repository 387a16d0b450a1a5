//! Data Transfer Objects for REST request/response serialization.
//!
//! Monetary amounts are serialized as JSON strings so that satoshi-level
//! precision survives the round trip.

pub mod common_dto;
pub mod observation_dto;
pub mod pool_dto;

pub use common_dto::*;
pub use observation_dto::*;
pub use pool_dto::*;
