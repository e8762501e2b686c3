// packages/sim-server/src/runtime/engine.rs
//! Engine capability boundary
//!
//! The server never looks inside a simulation engine. It only needs to open a
//! model once per instance, run instructions, and evaluate reports. Any backend
//! satisfying [`Engine`] can be pooled, which is how tests substitute a
//! deterministic in-process engine for the real subprocess one.

use crate::utils::errors::EngineError;
use std::path::Path;

/// One live engine instance with a model already loaded
///
/// Calls are blocking and may take arbitrarily long.
pub trait Engine: Send + 'static {
    /// Run a setup or step instruction
    fn command(&mut self, command: &str) -> Result<(), EngineError>;

    /// Evaluate a boolean-valued report
    fn report_bool(&mut self, report: &str) -> Result<bool, EngineError>;

    /// Evaluate a numeric-valued report
    fn report_number(&mut self, report: &str) -> Result<f64, EngineError>;
}

/// Creates engine instances bound to a model file
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: Engine;

    /// Start an engine and load `model_path` into it (expensive)
    fn open(&self, model_path: &Path) -> Result<Self::Engine, EngineError>;
}

/// A pooled engine instance
///
/// The model binding is fixed at creation; a handle is never reopened on a
/// different model.
pub struct EngineHandle<E> {
    /// Pool-unique ID, assigned at creation
    id: u64,

    engine: E,

    /// Number of simulations that completed on this handle
    runs: u64,
}

impl<E: Engine> EngineHandle<E> {
    pub fn new(id: u64, engine: E) -> Self {
        Self { id, engine, runs: 0 }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub(crate) fn record_run(&mut self) {
        self.runs += 1;
    }

    pub fn run_setup(&mut self, command: &str) -> Result<(), EngineError> {
        self.engine.command(command)
    }

    pub fn run_step(&mut self, command: &str) -> Result<(), EngineError> {
        self.engine.command(command)
    }

    pub fn eval_bool(&mut self, report: &str) -> Result<bool, EngineError> {
        self.engine.report_bool(report)
    }

    pub fn eval_number(&mut self, report: &str) -> Result<f64, EngineError> {
        self.engine.report_number(report)
    }

    /// Borrow the underlying engine
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E> std::fmt::Debug for EngineHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("id", &self.id)
            .field("runs", &self.runs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every call it receives
    #[derive(Default)]
    struct Journal {
        calls: Vec<String>,
    }

    impl Engine for Journal {
        fn command(&mut self, command: &str) -> Result<(), EngineError> {
            self.calls.push(format!("cmd:{}", command));
            Ok(())
        }

        fn report_bool(&mut self, report: &str) -> Result<bool, EngineError> {
            self.calls.push(format!("bool:{}", report));
            Ok(false)
        }

        fn report_number(&mut self, report: &str) -> Result<f64, EngineError> {
            self.calls.push(format!("num:{}", report));
            Ok(42.0)
        }
    }

    #[test]
    fn test_handle_delegates_to_engine() {
        let mut handle = EngineHandle::new(7, Journal::default());
        handle.run_setup("setup").unwrap();
        handle.run_step("go").unwrap();
        assert!(!handle.eval_bool("done?").unwrap());
        assert_eq!(handle.eval_number("score").unwrap(), 42.0);

        assert_eq!(handle.id(), 7);
        assert_eq!(
            handle.engine().calls,
            vec!["cmd:setup", "cmd:go", "bool:done?", "num:score"]
        );
    }

    #[test]
    fn test_run_counter() {
        let mut handle = EngineHandle::new(1, Journal::default());
        assert_eq!(handle.runs(), 0);
        handle.record_run();
        handle.record_run();
        assert_eq!(handle.runs(), 2);
        assert_eq!(format!("{:?}", handle), "EngineHandle { id: 1, runs: 2 }");
    }
}
