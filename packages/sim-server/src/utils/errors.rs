// packages/sim-server/src/utils/errors.rs
//! Error types for the simulation server
//!
//! Errors are split by where they surface:
//!
//! - [`RequestError`]: the request line could not be turned into a runnable request
//! - [`EngineError`]: the engine instance failed while opening or evaluating
//! - [`SimulationError`]: everything a single simulation run can fail with
//! - [`ServerError`]: listener, transport and configuration failures
//! - [`ClientError`]: a client request did not produce a simulation result
//!
//! Request-path errors never leave a connection worker; they are rendered into
//! an error response through their `Display` text.

use std::time::Duration;
use thiserror::Error;

/// Result alias for server-level operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// The request line could not be turned into a runnable request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Peer closed the connection (or sent a blank line) without a payload
    #[error("Empty request")]
    Empty,

    /// Payload is not JSON, or not a JSON object of the request shape
    #[error("Can't parse request")]
    Malformed,

    /// Payload decoded but one or more required fields are absent or null
    #[error("Invalid request, some of the required fields are missing: {}", .missing.join(", "))]
    Invalid { missing: Vec<&'static str> },
}

/// Failures raised by an engine instance
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to start engine: {0}")]
    Spawn(String),

    #[error("Failed to open model {path}: {message}")]
    Open { path: String, message: String },

    #[error("{0}")]
    Command(String),

    #[error("{0}")]
    Report(String),

    #[error("Report '{report}' returned {found}, expected {expected}")]
    UnexpectedValue {
        report: String,
        expected: &'static str,
        found: String,
    },

    #[error("Engine did not answer '{op}' within {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("Engine protocol error: {0}")]
    Protocol(String),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything a single simulation run can fail with
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Simulation result is not a finite number: {0}")]
    NonFiniteResult(f64),

    #[error("Simulation task failed: {0}")]
    Aborted(String),
}

impl SimulationError {
    /// Outcome label used for request metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            SimulationError::InvalidRequest(_) => "invalid",
            SimulationError::Engine(_) => "engine_error",
            SimulationError::NonFiniteResult(_) => "non_finite",
            SimulationError::Aborted(_) => "aborted",
        }
    }
}

/// Listener, transport and configuration failures
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Listener is not running")]
    NotRunning,

    #[error("Listener task failed: {0}")]
    Join(String),
}

/// Failures seen by a client sending a request to the server
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server closed the connection without a response")]
    NoResponse,

    #[error("Invalid response: {0}")]
    Protocol(String),

    /// The server answered with an error response
    #[error("{0}")]
    Simulation(String),

    #[error("Response carries no simulation result")]
    MissingResult,
}

impl From<config::ConfigError> for ServerError {
    fn from(e: config::ConfigError) -> Self {
        ServerError::Config(e.to_string())
    }
}
