// packages/sim-server/src/lib.rs
//! Pooled simulation server
//!
//! Accepts simulation requests over TCP and runs each one on a reusable
//! engine instance, so the cost of loading a model is paid once per engine
//! rather than once per request.
//!
//! # Architecture
//!
//! - **server**: listener, per-connection workers, wire protocol, client
//! - **runtime**: engine boundary, engine pool, simulation runner, subprocess backend
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and errors
//!
//! ```text
//! Listener ─→ ConnectionWorker ─→ SimulationRunner ─→ EnginePool / Engine
//!                   ▲                                        │
//!                   └──────────────── result ────────────────┘
//! ```

pub mod observability;
pub mod runtime;
pub mod server;
pub mod utils;

// Re-export commonly used types
pub use runtime::{Engine, EngineFactory, EnginePool, ProcessEngineFactory, SimulationRunner};
pub use server::{Listener, SimulationRequest, SimulationResponse};
pub use utils::config::ServerConfig;
pub use utils::errors::{ClientError, Result, ServerError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
