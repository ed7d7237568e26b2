//! Domain models for the Craftworks manufacturing platform

mod inventory;
mod order;
mod production;
mod report;
mod user;

pub use inventory::*;
pub use order::*;
pub use production::*;
pub use report::*;
pub use user::*;
