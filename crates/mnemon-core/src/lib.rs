//! # mnemon-core
//!
//! Shared foundation for the Mnemon memory engine: domain models,
//! configuration, the error taxonomy, and the provider/parser traits
//! every other crate builds against.

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::MnemonConfig;
pub use errors::{EngineError, EngineResult};
