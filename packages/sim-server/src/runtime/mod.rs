// packages/sim-server/src/runtime/mod.rs
//! Engine pooling and simulation execution
//!
//! - **Engine**: capability boundary every simulation backend implements
//! - **Engine Pool**: idle engine instances shared by all connections
//! - **Simulation Runner**: drives one request on a pooled engine
//! - **Process Engine**: backend running each engine as a child process
//!
//! # Architecture
//!
//! ```text
//!   connection    connection    connection
//!       │             │             │
//!       ▼             ▼             ▼
//! ┌──────────────────────────────────────────┐
//! │            SimulationRunner              │
//! │   acquire ── or ── open (outside lock)   │
//! └──────────────────────────────────────────┘
//!       │ release on success   ▲ acquire
//!       ▼                      │
//! ┌──────────────────────────────────────────┐
//! │  EnginePool: [Engine#3, Engine#1, ...]   │
//! └──────────────────────────────────────────┘
//! ```
//!
//! The pool starts empty and grows only when every existing engine is busy,
//! so its size tracks peak concurrency.

pub mod engine;
pub mod engine_pool;
pub mod process_engine;
pub mod simulation_runner;

// Re-export commonly used types
pub use engine::{Engine, EngineFactory, EngineHandle};
pub use engine_pool::{EnginePool, PoolStats};
pub use process_engine::{ProcessEngine, ProcessEngineFactory};
pub use simulation_runner::SimulationRunner;
