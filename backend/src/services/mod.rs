//! Business logic services for the Craftworks platform

pub mod auth;
pub mod inventory;
pub mod order;
pub mod payment;
pub mod product;
pub mod production;
pub mod reporting;
pub mod tracking;

pub use production::ProductionService;
pub use reporting::ReportingService;
