// packages/sim-server/src/server/listener.rs
//! TCP listener and accept loop
//!
//! `start` binds the socket, spawns the accept loop and waits until the loop
//! reports that it is listening, so callers can connect as soon as it returns.
//! Every accepted connection is served by its own [`ConnectionWorker`] task.
//! `stop` ends the accept loop and closes the socket; workers already running
//! are left to finish on their own.

use crate::runtime::engine::EngineFactory;
use crate::runtime::simulation_runner::SimulationRunner;
use crate::server::connection::{ConnectionWorker, DEFAULT_MAX_REQUEST_BYTES};
use crate::utils::config::ServerConfig;
use crate::utils::errors::{Result, ServerError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};
use ulid::Ulid;

/// Default pending-connection backlog
pub const DEFAULT_BACKLOG: u32 = 100;

/// A started accept loop
struct RunningLoop {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Simulation server listener
///
/// Dropping a started listener without calling `stop` also ends the accept
/// loop, but does not wait for it.
pub struct Listener<F: EngineFactory> {
    addr: SocketAddr,
    backlog: u32,
    max_request_bytes: usize,
    runner: Arc<SimulationRunner<F>>,
    running: Option<RunningLoop>,
}

impl<F: EngineFactory> Listener<F> {
    /// Create a listener for `addr`; nothing is bound until `start`
    pub fn new(addr: SocketAddr, runner: SimulationRunner<F>) -> Self {
        Self {
            addr,
            backlog: DEFAULT_BACKLOG,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            runner: Arc::new(runner),
            running: None,
        }
    }

    /// Create a listener from the server config with an empty engine pool
    pub fn from_config(config: &ServerConfig, factory: F) -> Result<Self> {
        let runner = SimulationRunner::new(factory, config.model.path.clone());
        Ok(Self::new(config.server.socket_addr()?, runner)
            .with_backlog(config.server.backlog)
            .with_max_request_bytes(config.server.max_request_bytes))
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Longer request lines are answered with a parse error
    pub fn with_max_request_bytes(mut self, max_request_bytes: usize) -> Self {
        self.max_request_bytes = max_request_bytes;
        self
    }

    pub fn runner(&self) -> &Arc<SimulationRunner<F>> {
        &self.runner
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bind and start accepting; returns once the socket is listening
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested. Calling `start` on a running listener is a no-op.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(running) = &self.running {
            return Ok(running.local_addr);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(accept_loop(
            self.addr,
            self.backlog,
            self.max_request_bytes,
            Arc::clone(&self.runner),
            ready_tx,
            shutdown_rx,
        ));

        match ready_rx.await {
            Ok(Ok(local_addr)) => {
                self.running = Some(RunningLoop {
                    local_addr,
                    shutdown: shutdown_tx,
                    task,
                });
                Ok(local_addr)
            }
            Ok(Err(e)) => {
                let _ = task.await;
                Err(e)
            }
            Err(_) => Err(ServerError::Join(
                "accept loop exited before listening".into(),
            )),
        }
    }

    /// Close the socket and wait for the accept loop to exit
    pub async fn stop(&mut self) -> Result<()> {
        let running = self.running.take().ok_or(ServerError::NotRunning)?;

        // The loop may already have ended on an accept error
        let _ = running.shutdown.send(());
        running
            .task
            .await
            .map_err(|e| ServerError::Join(e.to_string()))?;

        info!("Listener on {} stopped", running.local_addr);
        Ok(())
    }
}

/// Bind a listening socket with an explicit backlog
fn bind(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let bind_err = |source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;
    socket.listen(backlog).map_err(bind_err)
}

async fn accept_loop<F: EngineFactory>(
    addr: SocketAddr,
    backlog: u32,
    max_request_bytes: usize,
    runner: Arc<SimulationRunner<F>>,
    ready: oneshot::Sender<Result<SocketAddr>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let listener = match bind(addr, backlog) {
        Ok(listener) => listener,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let local_addr = match listener.local_addr() {
        Ok(local_addr) => local_addr,
        Err(e) => {
            let _ = ready.send(Err(ServerError::Transport(e)));
            return;
        }
    };

    info!("Listening on {}", local_addr);
    if ready.send(Ok(local_addr)).is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Closing listener on {}", local_addr);
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    metrics::counter!("sim_server_connections_total").increment(1);

                    let span = info_span!("connection", id = %Ulid::new(), peer = %peer);
                    let worker = ConnectionWorker::new(stream, peer, Arc::clone(&runner))
                        .with_max_request_bytes(max_request_bytes);
                    tokio::spawn(worker.run().instrument(span));
                }
                Err(e) => {
                    error!("{}", ServerError::Accept(e));
                    break;
                }
            }
        }
    }
}
