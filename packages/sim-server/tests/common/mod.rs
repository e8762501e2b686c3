// packages/sim-server/tests/common/mod.rs
//! Shared helpers for server integration tests

#![allow(dead_code)]

use sim_server::runtime::{Engine, EngineFactory, SimulationRunner};
use sim_server::server::{Listener, SimulationPlan, SimulationRequest};
use sim_server::utils::errors::EngineError;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Counters shared by every engine a factory opens
#[derive(Default)]
pub struct EngineStats {
    pub opened: AtomicUsize,
    pub steps: AtomicUsize,
    /// A run started on an engine that was already mid-run
    pub overlaps: AtomicUsize,
    /// Engines currently blocked in `hold`
    pub held: AtomicUsize,
    /// Lets every `hold` return
    pub release_held: AtomicBool,
}

/// Deterministic model with one variable `x`
///
/// - `set x <n>` starts a run and assigns `x`
/// - `go` increments `x`, optionally sleeping first
/// - `hold` blocks until [`EngineStats::release_held`] is set
/// - `x < <n>` reports a boolean, `x` reports a number and ends the run
pub struct CounterEngine {
    x: f64,
    step_delay: Duration,
    in_run: AtomicBool,
    stats: Arc<EngineStats>,
}

impl Engine for CounterEngine {
    fn command(&mut self, command: &str) -> Result<(), EngineError> {
        match command.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["set", "x", value] => {
                if self.in_run.swap(true, Ordering::SeqCst) {
                    self.stats.overlaps.fetch_add(1, Ordering::SeqCst);
                }
                self.x = value
                    .parse()
                    .map_err(|_| EngineError::Command(format!("Expected a number, got {}", value)))?;
            }
            ["hold"] => {
                self.stats.held.fetch_add(1, Ordering::SeqCst);
                while !self.stats.release_held.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                self.stats.held.fetch_sub(1, Ordering::SeqCst);
            }
            ["go"] => {
                if !self.step_delay.is_zero() {
                    std::thread::sleep(self.step_delay);
                }
                self.x += 1.0;
                self.stats.steps.fetch_add(1, Ordering::SeqCst);
            }
            _ => {
                return Err(EngineError::Command(format!(
                    "Nothing named {} has been defined",
                    command
                )))
            }
        }
        Ok(())
    }

    fn report_bool(&mut self, report: &str) -> Result<bool, EngineError> {
        match report.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["x", "<", limit] => limit
                .parse::<f64>()
                .map(|limit| self.x < limit)
                .map_err(|_| EngineError::Report(format!("Expected a number, got {}", limit))),
            ["false"] => Ok(false),
            _ => Err(EngineError::Report(format!("Cannot report {}", report))),
        }
    }

    fn report_number(&mut self, report: &str) -> Result<f64, EngineError> {
        self.in_run.store(false, Ordering::SeqCst);
        match report {
            "x" => Ok(self.x),
            _ => Err(EngineError::Report(format!("Cannot report {}", report))),
        }
    }
}

pub struct CounterFactory {
    pub stats: Arc<EngineStats>,
    pub step_delay: Duration,
}

impl CounterFactory {
    pub fn new(step_delay: Duration) -> (Self, Arc<EngineStats>) {
        let stats = Arc::new(EngineStats::default());
        (
            Self {
                stats: Arc::clone(&stats),
                step_delay,
            },
            stats,
        )
    }
}

impl EngineFactory for CounterFactory {
    type Engine = CounterEngine;

    fn open(&self, _model_path: &Path) -> Result<CounterEngine, EngineError> {
        // Model loading is the expensive part
        std::thread::sleep(Duration::from_millis(20));
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(CounterEngine {
            x: 0.0,
            step_delay: self.step_delay,
            in_run: AtomicBool::new(false),
            stats: Arc::clone(&self.stats),
        })
    }
}

/// Start a listener on an ephemeral port
pub async fn start_server(
    step_delay: Duration,
) -> (Listener<CounterFactory>, SocketAddr, Arc<EngineStats>) {
    start_server_with(step_delay, |listener| listener).await
}

/// Start a listener on an ephemeral port after adjusting it with `configure`
pub async fn start_server_with(
    step_delay: Duration,
    configure: impl FnOnce(Listener<CounterFactory>) -> Listener<CounterFactory>,
) -> (Listener<CounterFactory>, SocketAddr, Arc<EngineStats>) {
    let (factory, stats) = CounterFactory::new(step_delay);
    let runner = SimulationRunner::new(factory, "counter.model");
    let mut listener = configure(Listener::new("127.0.0.1:0".parse().unwrap(), runner));
    let addr = listener.start().await.unwrap();
    (listener, addr, stats)
}

pub fn plan(setup: &[&str], stop: &str, end: &str) -> SimulationPlan {
    SimulationPlan {
        setup_commands: setup.iter().map(|s| s.to_string()).collect(),
        go_command: "go".to_string(),
        stop_condition_report: stop.to_string(),
        end_report: end.to_string(),
    }
}

/// Count `x` from `start` up to `limit`
pub fn counter_plan(start: u32, limit: u32) -> SimulationPlan {
    plan(&[&format!("set x {}", start)], &format!("x < {}", limit), "x")
}

pub fn counter_request(start: u32, limit: u32) -> String {
    serde_json::to_string(&SimulationRequest::from(&counter_plan(start, limit))).unwrap()
}

/// Send raw bytes, return the response line, and check the server closed the connection
pub async fn send_raw(addr: SocketAddr, payload: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    read_response(stream).await
}

pub async fn read_response(stream: TcpStream) -> String {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();

    let mut rest = Vec::new();
    let trailing = reader.read_to_end(&mut rest).await.unwrap();
    assert_eq!(trailing, 0, "server kept the connection open or sent extra data");

    line
}

/// Send one request line
pub async fn send_line(addr: SocketAddr, line: &str) -> String {
    send_raw(addr, format!("{}\n", line).as_bytes()).await
}
