// packages/sim-server/src/server/connection.rs
//! Per-connection worker
//!
//! Reads exactly one request line, runs it, writes exactly one response line,
//! and closes the connection. Every request-path failure becomes an error
//! response; socket failures are logged and end the connection quietly.
//!
//! Each simulation runs on a dedicated OS thread. Engines block for as long
//! as a simulation takes, so long runs must not be able to starve other
//! connections of a shared thread pool.

use crate::runtime::engine::EngineFactory;
use crate::runtime::simulation_runner::SimulationRunner;
use crate::server::protocol::{SimulationRequest, SimulationResponse};
use crate::utils::errors::{RequestError, SimulationError};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

/// Default upper bound on a request line, newline excluded
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Serves a single accepted connection
pub struct ConnectionWorker<F: EngineFactory> {
    stream: TcpStream,
    peer: SocketAddr,
    runner: Arc<SimulationRunner<F>>,
    max_request_bytes: usize,
}

impl<F: EngineFactory> ConnectionWorker<F> {
    pub fn new(stream: TcpStream, peer: SocketAddr, runner: Arc<SimulationRunner<F>>) -> Self {
        Self {
            stream,
            peer,
            runner,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }

    pub fn with_max_request_bytes(mut self, max_request_bytes: usize) -> Self {
        self.max_request_bytes = max_request_bytes;
        self
    }

    /// Handle the request and close the connection
    pub async fn run(self) {
        debug!("Worker started for {}", self.peer);

        let (read_half, write_half) = self.stream.into_split();
        let mut lines = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(self.max_request_bytes),
        );

        let response = match lines.next().await {
            Some(Ok(line)) => respond(line.as_bytes(), &self.runner).await,
            // EOF before any data
            None => reject(RequestError::Empty),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                debug!(
                    "Request from {} exceeds {} bytes",
                    self.peer, self.max_request_bytes
                );
                reject(RequestError::Malformed)
            }
            // LinesCodec reports invalid UTF-8 as InvalidData
            Some(Err(LinesCodecError::Io(e))) if e.kind() == std::io::ErrorKind::InvalidData => {
                reject(RequestError::Malformed)
            }
            Some(Err(LinesCodecError::Io(e))) => {
                warn!("Can't read from socket: {}", e);
                metrics::counter!("sim_server_requests_total", "outcome" => "transport_error")
                    .increment(1);
                return;
            }
        };

        send_response(write_half, &response).await;
    }
}

fn reject(e: RequestError) -> SimulationResponse {
    debug!("Rejecting request: {}", e);
    metrics::counter!("sim_server_requests_total", "outcome" => "rejected").increment(1);
    SimulationResponse::from(&e)
}

/// Turn one raw request line into the response for it
pub(crate) async fn respond<F: EngineFactory>(
    line: &[u8],
    runner: &Arc<SimulationRunner<F>>,
) -> SimulationResponse {
    let request = match SimulationRequest::decode(line) {
        Ok(request) => request,
        Err(e) => return reject(e),
    };

    match run_on_thread(runner, request).await {
        Ok(value) => {
            metrics::counter!("sim_server_requests_total", "outcome" => "ok").increment(1);
            SimulationResponse::success(value)
        }
        Err(e) => {
            debug!("Simulation failed: {}", e);
            metrics::counter!("sim_server_requests_total", "outcome" => e.outcome()).increment(1);
            SimulationResponse::failure(e.to_string())
        }
    }
}

/// Run the simulation on its own thread and wait for the result
async fn run_on_thread<F: EngineFactory>(
    runner: &Arc<SimulationRunner<F>>,
    request: SimulationRequest,
) -> Result<f64, SimulationError> {
    let (tx, rx) = oneshot::channel();
    let runner = Arc::clone(runner);

    std::thread::Builder::new()
        .name("simulation".into())
        .spawn(move || {
            let _ = tx.send(runner.run(request));
        })
        .map_err(|e| SimulationError::Aborted(format!("can't start simulation thread: {}", e)))?;

    // The sender is dropped without a value only if the run panicked
    rx.await
        .unwrap_or_else(|_| Err(SimulationError::Aborted("simulation thread panicked".into())))
}

/// Write the response line and shut the connection down
async fn send_response(mut writer: OwnedWriteHalf, response: &SimulationResponse) {
    let line = match response.to_line() {
        Ok(line) => line,
        Err(e) => {
            warn!("Failed to encode response: {}", e);
            return;
        }
    };

    if let Err(e) = writer.write_all(&line).await {
        warn!("Exception during response: {}", e);
        return;
    }
    if let Err(e) = writer.shutdown().await {
        debug!("Failed to shut down connection: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::engine::Engine;
    use crate::utils::errors::EngineError;
    use std::path::Path;

    /// Every report is false and evaluates to 7, except `nan`
    struct Constant;

    impl Engine for Constant {
        fn command(&mut self, command: &str) -> Result<(), EngineError> {
            if command == "explode" {
                return Err(EngineError::Command("boom".into()));
            }
            Ok(())
        }

        fn report_bool(&mut self, _report: &str) -> Result<bool, EngineError> {
            Ok(false)
        }

        fn report_number(&mut self, report: &str) -> Result<f64, EngineError> {
            match report {
                "nan" => Ok(f64::NAN),
                _ => Ok(7.0),
            }
        }
    }

    struct ConstantFactory;

    impl EngineFactory for ConstantFactory {
        type Engine = Constant;

        fn open(&self, _model_path: &Path) -> Result<Constant, EngineError> {
            Ok(Constant)
        }
    }

    fn runner() -> Arc<SimulationRunner<ConstantFactory>> {
        Arc::new(SimulationRunner::new(ConstantFactory, "constant.model"))
    }

    #[tokio::test]
    async fn test_respond_success() {
        let line = br#"{"setupCommands":[],"goCommmand":"go","stopConditionReport":"s","endReport":"e"}"#;
        let response = respond(line, &runner()).await;
        assert_eq!(response, SimulationResponse::success(7.0));
    }

    #[tokio::test]
    async fn test_respond_empty_and_malformed() {
        let runner = runner();
        assert_eq!(
            respond(b"", &runner).await,
            SimulationResponse::failure("Empty request")
        );
        assert_eq!(
            respond(b"{not json\n", &runner).await,
            SimulationResponse::failure("Can't parse request")
        );
    }

    #[tokio::test]
    async fn test_respond_engine_failure() {
        let runner = runner();
        let line = br#"{"setupCommands":["explode"],"goCommmand":"go","stopConditionReport":"s","endReport":"e"}"#;
        let response = respond(line, &runner).await;

        assert!(response.is_error());
        assert_eq!(response.response_message.as_deref(), Some("boom"));
        assert_eq!(runner.pool().stats().discarded, 1);
    }

    #[tokio::test]
    async fn test_respond_non_finite_result() {
        let runner = runner();
        let line = br#"{"setupCommands":[],"goCommmand":"go","stopConditionReport":"s","endReport":"nan"}"#;
        let response = respond(line, &runner).await;

        assert!(response.is_error());
        assert!(response.simulation_result.is_none());
        assert!(response
            .response_message
            .as_deref()
            .unwrap()
            .starts_with("Simulation result is not a finite number"));

        let encoded = String::from_utf8(response.to_line().unwrap()).unwrap();
        assert!(!encoded.contains("null"), "{}", encoded);
    }
}
