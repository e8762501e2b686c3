// packages/sim-server/src/runtime/simulation_runner.rs
//! Drives one simulation request on a pooled engine
//!
//! ```text
//! validate ─→ acquire (or open) ─→ setup* ─→ while report: step ─→ end report ─→ release
//!                                     └──────── engine error ───────┴──→ discard
//! ```
//!
//! The runner owns the create-if-empty policy: when no idle engine exists it
//! opens a new one outside the pool lock, so a slow model load only delays the
//! request that needed it.

use crate::runtime::engine::{Engine, EngineFactory, EngineHandle};
use crate::runtime::engine_pool::EnginePool;
use crate::server::protocol::{SimulationPlan, SimulationRequest};
use crate::utils::errors::{EngineError, SimulationError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runs requests against engines bound to a single model
pub struct SimulationRunner<F: EngineFactory> {
    factory: F,
    pool: Arc<EnginePool<F::Engine>>,
    model_path: PathBuf,
}

impl<F: EngineFactory> SimulationRunner<F> {
    /// Create a runner with its own empty pool
    pub fn new(factory: F, model_path: impl Into<PathBuf>) -> Self {
        Self::with_pool(factory, Arc::new(EnginePool::new()), model_path)
    }

    /// Create a runner sharing an existing pool
    pub fn with_pool(
        factory: F,
        pool: Arc<EnginePool<F::Engine>>,
        model_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            factory,
            pool,
            model_path: model_path.into(),
        }
    }

    pub fn pool(&self) -> &Arc<EnginePool<F::Engine>> {
        &self.pool
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Run a request to completion and return its end report
    ///
    /// Blocks for as long as the engine takes; there is no step limit. On
    /// success the engine goes back to the pool. On an engine failure it is
    /// discarded, since its model state is unknown. A NaN or infinite end
    /// report is an error, but the engine is still returned to the pool.
    pub fn run(&self, request: SimulationRequest) -> Result<f64, SimulationError> {
        let plan = request.validate()?;

        let started = Instant::now();
        let mut handle = self.checkout()?;

        match simulate(&mut handle, &plan) {
            Ok((value, steps)) => {
                handle.record_run();
                debug!(
                    "Engine #{} finished in {} steps ({:?}), result {}",
                    handle.id(),
                    steps,
                    started.elapsed(),
                    value
                );
                self.pool.release(handle);

                metrics::histogram!("sim_server_simulation_seconds")
                    .record(started.elapsed().as_secs_f64());

                // The engine is healthy, but JSON has no encoding for the value
                if !value.is_finite() {
                    return Err(SimulationError::NonFiniteResult(value));
                }
                Ok(value)
            }
            Err(e) => {
                self.pool.discard(handle, &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Take an idle engine, opening a new one if the pool is empty
    fn checkout(&self) -> Result<EngineHandle<F::Engine>, EngineError> {
        if let Some(handle) = self.pool.acquire() {
            return Ok(handle);
        }

        info!("No idle engine, opening model {}", self.model_path.display());
        let started = Instant::now();
        let engine = self.factory.open(&self.model_path)?;
        let handle = self.pool.register(engine);
        info!("Engine #{} ready in {:?}", handle.id(), started.elapsed());

        Ok(handle)
    }
}

/// Setup, step loop and end report; returns the report value and step count
fn simulate<E: Engine>(
    handle: &mut EngineHandle<E>,
    plan: &SimulationPlan,
) -> Result<(f64, u64), EngineError> {
    for command in &plan.setup_commands {
        handle.run_setup(command)?;
    }

    // Keep stepping while the report holds
    let mut steps = 0u64;
    while handle.eval_bool(&plan.stop_condition_report)? {
        handle.run_step(&plan.go_command)?;
        steps += 1;
    }

    let value = handle.eval_number(&plan.end_report)?;
    Ok((value, steps))
}
