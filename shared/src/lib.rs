//! Shared types and domain logic for the Craftworks manufacturing platform
//!
//! Pure, I/O-free code: status enums, the production stage catalog and
//! progression engine, BOM requirement planning, and report aggregation.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
