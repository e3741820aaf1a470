//! Configuration Module
//!
//! Handles configuration loading, validation, and conversion into
//! connection specifications.

pub mod manager;
pub mod schema;
pub mod types;

pub use manager::ConfigManager;
pub use schema::SpecSchema;
pub use types::*;
