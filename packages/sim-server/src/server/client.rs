// packages/sim-server/src/server/client.rs
//! Client side of the wire protocol
//!
//! Every request uses its own connection: write the request line, read the
//! response line, and let the server close.
//!
//! ```no_run
//! # async fn example() -> Result<(), sim_server::utils::errors::ClientError> {
//! use sim_server::server::{client, SimulationPlan};
//!
//! let plan = SimulationPlan {
//!     setup_commands: vec!["setup".into()],
//!     go_command: "go".into(),
//!     stop_condition_report: "any? fires".into(),
//!     end_report: "count burned-patches".into(),
//! };
//! let burned = client::simulate("127.0.0.1:1234".parse().unwrap(), &plan).await?;
//! # Ok(())
//! # }
//! ```

use crate::server::protocol::{SimulationPlan, SimulationRequest, SimulationResponse};
use crate::utils::errors::ClientError;
use futures::StreamExt;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::debug;

/// Longest response line accepted
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Send one request and return the server's response as-is
pub async fn send(
    addr: SocketAddr,
    request: &SimulationRequest,
) -> Result<SimulationResponse, ClientError> {
    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = stream.into_split();

    let mut line = serde_json::to_vec(request).map_err(|e| ClientError::Protocol(e.to_string()))?;
    line.push(b'\n');
    write_half.write_all(&line).await?;
    debug!("Sent request to {}", addr);

    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_RESPONSE_BYTES));
    match lines.next().await {
        Some(Ok(line)) => {
            serde_json::from_str(&line).map_err(|e| ClientError::Protocol(e.to_string()))
        }
        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => Err(ClientError::Protocol(format!(
            "response longer than {} bytes",
            MAX_RESPONSE_BYTES
        ))),
        Some(Err(LinesCodecError::Io(e))) => Err(ClientError::Io(e)),
        None => Err(ClientError::NoResponse),
    }
}

/// Run a simulation on the server and return its end report
///
/// An error response becomes [`ClientError::Simulation`] carrying the
/// server's message.
pub async fn simulate(addr: SocketAddr, plan: &SimulationPlan) -> Result<f64, ClientError> {
    let response = send(addr, &SimulationRequest::from(plan)).await?;

    if response.is_error() {
        return Err(ClientError::Simulation(
            response
                .response_message
                .unwrap_or_else(|| "Unknown error".to_string()),
        ));
    }
    response.simulation_result.ok_or(ClientError::MissingResult)
}
