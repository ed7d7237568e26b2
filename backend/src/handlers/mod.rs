//! HTTP handlers

pub mod auth;
pub mod health;
pub mod inventory;
pub mod order;
pub mod product;
pub mod production;
pub mod reporting;
pub mod webhook;

pub use auth::*;
pub use health::*;
pub use inventory::*;
pub use order::*;
pub use product::*;
pub use production::*;
pub use reporting::*;
pub use webhook::*;
