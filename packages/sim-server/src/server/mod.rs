// packages/sim-server/src/server/mod.rs
//! Network front end
//!
//! - **Listener**: binds the socket and spawns one worker per connection
//! - **Connection**: one request line in, one response line out
//! - **Protocol**: JSON request/response wire types
//! - **Client**: sends a request and reads back the result

pub mod client;
pub mod connection;
pub mod listener;
pub mod protocol;

pub use connection::ConnectionWorker;
pub use listener::Listener;
pub use protocol::{SimulationPlan, SimulationRequest, SimulationResponse};
