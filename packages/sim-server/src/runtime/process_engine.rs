// packages/sim-server/src/runtime/process_engine.rs
//! Subprocess engine backend
//!
//! Each engine instance is a child process (typically a headless simulator
//! launcher) driven over stdin/stdout with one JSON object per line:
//!
//! ```text
//! server → engine   {"op":"open","arg":"/models/fire.model"}
//! engine → server   {"ok":true}
//! server → engine   {"op":"report","arg":"count fires > 0"}
//! engine → server   {"ok":true,"value":true}
//! server → engine   {"op":"command","arg":"go"}
//! engine → server   {"ok":false,"message":"Nothing named GO has been defined"}
//! ```
//!
//! Stdout is drained by a reader thread so the model open can be bounded by a
//! timeout; stderr is forwarded to the log. Dropping the engine closes stdin,
//! sends SIGTERM, and escalates to SIGKILL after the grace period.

use crate::runtime::engine::{Engine, EngineFactory};
use crate::utils::config::ProcessEngineConfig;
use crate::utils::errors::EngineError;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct EngineRequest<'a> {
    op: &'static str,
    arg: &'a str,
}

#[derive(Debug, Deserialize)]
struct EngineReply {
    ok: bool,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl EngineReply {
    fn message(self) -> String {
        self.message
            .unwrap_or_else(|| "engine reported failure without a message".to_string())
    }
}

/// Opens [`ProcessEngine`]s according to the engine config
#[derive(Debug, Clone)]
pub struct ProcessEngineFactory {
    config: ProcessEngineConfig,
}

impl ProcessEngineFactory {
    pub fn new(config: ProcessEngineConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for ProcessEngineFactory {
    type Engine = ProcessEngine;

    fn open(&self, model_path: &Path) -> Result<ProcessEngine, EngineError> {
        let mut engine = ProcessEngine::spawn(&self.config)?;

        let path = model_path.to_string_lossy();
        let timeout = Duration::from_secs(self.config.ready_timeout_secs);
        let reply = engine.call_with_timeout("open", &path, Some(timeout))?;
        if !reply.ok {
            return Err(EngineError::Open {
                path: path.into_owned(),
                message: reply.message(),
            });
        }

        debug!("Engine process {} opened {}", engine.pid, path);
        Ok(engine)
    }
}

/// One engine child process
pub struct ProcessEngine {
    child: Child,
    pid: u32,
    stdin: Option<ChildStdin>,
    replies: Receiver<std::io::Result<String>>,
    shutdown_grace: Duration,
}

impl ProcessEngine {
    fn spawn(config: &ProcessEngineConfig) -> Result<Self, EngineError> {
        debug!("Spawning engine process: {} {:?}", config.program, config.args);

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {}", config.program, e)))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Spawn("Failed to capture engine stdio".into()));
        };

        // From here on `Drop` reaps the child if a reader thread fails to start
        let (tx, replies) = crossbeam_channel::unbounded();
        let engine = Self {
            child,
            pid,
            stdin: Some(stdin),
            replies,
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
        };

        std::thread::Builder::new()
            .name(format!("engine-{}-stdout", pid))
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let failed = line.is_err();
                    if tx.send(line).is_err() || failed {
                        break;
                    }
                }
            })?;

        if let Some(stderr) = stderr {
            std::thread::Builder::new()
                .name(format!("engine-{}-stderr", pid))
                .spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                        debug!(engine_pid = pid, "{}", line);
                    }
                })?;
        }

        debug!("Engine process spawned with PID: {}", pid);
        Ok(engine)
    }

    /// Process ID of the engine child
    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn call(&mut self, op: &'static str, arg: &str) -> Result<EngineReply, EngineError> {
        self.call_with_timeout(op, arg, None)
    }

    /// Send one request and wait for its reply line
    fn call_with_timeout(
        &mut self,
        op: &'static str,
        arg: &str,
        timeout: Option<Duration>,
    ) -> Result<EngineReply, EngineError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EngineError::Protocol("engine stdin closed".into()))?;

        let mut line = serde_json::to_vec(&EngineRequest { op, arg })
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        line.push(b'\n');
        stdin.write_all(&line)?;
        stdin.flush()?;

        let received = match timeout {
            Some(timeout) => self.replies.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => EngineError::Timeout { op, after: timeout },
                RecvTimeoutError::Disconnected => EngineError::Protocol("engine exited".into()),
            })?,
            None => self
                .replies
                .recv()
                .map_err(|_| EngineError::Protocol("engine exited".into()))?,
        };

        let reply = received?;
        serde_json::from_str(&reply)
            .map_err(|e| EngineError::Protocol(format!("bad reply {:?}: {}", reply, e)))
    }

    /// Evaluate a report, returning its raw JSON value
    fn report(&mut self, report: &str) -> Result<serde_json::Value, EngineError> {
        let reply = self.call("report", report)?;
        if !reply.ok {
            return Err(EngineError::Report(reply.message()));
        }
        Ok(reply.value.unwrap_or(serde_json::Value::Null))
    }

    /// Close stdin, SIGTERM, then SIGKILL after the grace period
    fn terminate(&mut self) {
        drop(self.stdin.take());

        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("Engine process {} already exited: {}", self.pid, status);
            return;
        }

        let pid = Pid::from_raw(self.pid as i32);
        if let Err(e) = kill(pid, Signal::SIGTERM) {
            debug!("Failed to send SIGTERM to engine {}: {}", self.pid, e);
        }

        let deadline = Instant::now() + self.shutdown_grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("Engine process {} exited with status: {}", self.pid, status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Error waiting for engine process {}: {}", self.pid, e);
                    break;
                }
            }
        }

        warn!("Engine process {} did not exit in time, sending SIGKILL", self.pid);
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Engine for ProcessEngine {
    fn command(&mut self, command: &str) -> Result<(), EngineError> {
        let reply = self.call("command", command)?;
        if reply.ok {
            Ok(())
        } else {
            Err(EngineError::Command(reply.message()))
        }
    }

    fn report_bool(&mut self, report: &str) -> Result<bool, EngineError> {
        match self.report(report)? {
            serde_json::Value::Bool(value) => Ok(value),
            other => Err(EngineError::UnexpectedValue {
                report: report.to_string(),
                expected: "a boolean",
                found: other.to_string(),
            }),
        }
    }

    fn report_number(&mut self, report: &str) -> Result<f64, EngineError> {
        let value = self.report(report)?;
        value.as_f64().ok_or_else(|| EngineError::UnexpectedValue {
            report: report.to_string(),
            expected: "a number",
            found: value.to_string(),
        })
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        self.terminate();
    }
}
