//! stobot domain crate
//!
//! Core logic of the news delivery service, following a hexagonal layout:
//! - `model`: domain entities and value objects
//! - `ports`: trait definitions for external dependencies (adapters)
//! - `usecases`: the delivery engine, catch-up, duplicate suppression,
//!   registration, and embed rendering

pub mod model;
pub mod ports;
pub mod usecases;

pub use model::*;
pub use ports::*;
