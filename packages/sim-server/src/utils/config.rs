// packages/sim-server/src/utils/config.rs
//! Layered server configuration
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. An optional config file (TOML, YAML or JSON, picked by extension)
//! 3. Environment variables prefixed with `SIM_SERVER__`, using `__` as the
//!    nesting separator (e.g. `SIM_SERVER__SERVER__PORT=4000`)
//!
//! Command-line overrides are applied by the binary on top of the loaded value.

use crate::server::connection::DEFAULT_MAX_REQUEST_BYTES;
use crate::utils::errors::{Result, ServerError};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "SIM_SERVER";
const ENV_SEPARATOR: &str = "__";

/// Top-level server configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ListenConfig,
    pub model: ModelConfig,
    pub engine: ProcessEngineConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Listening socket settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
    /// Pending-connection backlog passed to `listen(2)`
    pub backlog: u32,
    /// Longest request line accepted, newline excluded
    pub max_request_bytes: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1234,
            backlog: 100,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl ListenConfig {
    /// Resolve host and port into a socket address
    ///
    /// Accepts IP literals (v4 or v6) and host names; a name resolving to
    /// several addresses binds the first one.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let invalid = |reason: String| {
            ServerError::Config(format!(
                "Invalid listen address {}:{}: {}",
                self.host, self.port, reason
            ))
        };

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("host resolved to no addresses".into()))
    }
}

/// The model every engine instance is opened with
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
}

/// How the subprocess engine backend is launched
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessEngineConfig {
    /// Executable speaking the JSON-lines engine protocol
    pub program: String,

    /// Extra arguments passed before any protocol traffic
    pub args: Vec<String>,

    /// How long to wait for the engine to acknowledge the model open
    pub ready_timeout_secs: u64,

    /// Grace period between SIGTERM and SIGKILL on shutdown
    pub shutdown_grace_ms: u64,
}

impl Default for ProcessEngineConfig {
    fn default() -> Self {
        Self {
            program: "sim-engine".to_string(),
            args: vec![],
            ready_timeout_secs: 120,
            shutdown_grace_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus scrape endpoint; metrics are not exported when unset
    pub listen_addr: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: ServerConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .list_separator(" ")
                    .with_list_parse_key("engine.args")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Reject configurations the server cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.model.path.as_os_str().is_empty() {
            return Err(ServerError::Config("model.path must be set".into()));
        }
        if self.server.backlog == 0 {
            return Err(ServerError::Config("server.backlog must be positive".into()));
        }
        if self.server.max_request_bytes == 0 {
            return Err(ServerError::Config(
                "server.max_request_bytes must be positive".into(),
            ));
        }
        if self.engine.program.trim().is_empty() {
            return Err(ServerError::Config("engine.program must be set".into()));
        }
        self.server.socket_addr()?;
        Ok(())
    }
}
