// packages/sim-server/src/utils/mod.rs
//! Shared configuration and error types

pub mod config;
pub mod errors;

pub use config::ServerConfig;
pub use errors::{EngineError, RequestError, Result, ServerError, SimulationError};
