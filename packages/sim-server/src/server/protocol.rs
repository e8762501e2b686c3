// packages/sim-server/src/server/protocol.rs
//! Line-delimited JSON wire format
//!
//! One request line in, one response line out:
//!
//! ```text
//! → {"setupCommands":["set x 0"],"goCommmand":"go","stopConditionReport":"x < 3","endReport":"x"}
//! ← {"error":false,"simulationResult":3.0}
//! ```
//!
//! `goCommmand` keeps its historical spelling so existing clients keep
//! working; `goCommand` is accepted on input as well. Absent response fields
//! are omitted rather than sent as `null`.

use crate::utils::errors::RequestError;
use serde::{Deserialize, Serialize};

/// Wire name of the step command field
pub const GO_COMMAND_FIELD: &str = "goCommmand";

/// A request as decoded from the wire; every field may still be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub setup_commands: Option<Vec<String>>,

    #[serde(rename = "goCommmand", alias = "goCommand")]
    pub go_command: Option<String>,

    pub stop_condition_report: Option<String>,

    pub end_report: Option<String>,
}

impl SimulationRequest {
    /// Decode one request line (trailing newline optional)
    pub fn decode(line: &[u8]) -> Result<Self, RequestError> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return Err(RequestError::Empty);
        }

        serde_json::from_slice(line).map_err(|_| RequestError::Malformed)
    }

    /// Check that every required field is present
    pub fn validate(self) -> Result<SimulationPlan, RequestError> {
        match self {
            SimulationRequest {
                setup_commands: Some(setup_commands),
                go_command: Some(go_command),
                stop_condition_report: Some(stop_condition_report),
                end_report: Some(end_report),
            } => Ok(SimulationPlan {
                setup_commands,
                go_command,
                stop_condition_report,
                end_report,
            }),
            request => Err(RequestError::Invalid {
                missing: request.missing_fields(),
            }),
        }
    }

    /// Wire names of the required fields that are absent
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.setup_commands.is_none() {
            missing.push("setupCommands");
        }
        if self.go_command.is_none() {
            missing.push(GO_COMMAND_FIELD);
        }
        if self.stop_condition_report.is_none() {
            missing.push("stopConditionReport");
        }
        if self.end_report.is_none() {
            missing.push("endReport");
        }
        missing
    }
}

/// A request with every required field present
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlan {
    /// Run once each, in order, before the loop
    pub setup_commands: Vec<String>,

    /// Run once per loop iteration
    pub go_command: String,

    /// The loop continues while this evaluates to true
    pub stop_condition_report: String,

    /// Evaluated once after the loop to produce the result
    pub end_report: String,
}

impl From<&SimulationPlan> for SimulationRequest {
    fn from(plan: &SimulationPlan) -> Self {
        Self {
            setup_commands: Some(plan.setup_commands.clone()),
            go_command: Some(plan.go_command.clone()),
            stop_condition_report: Some(plan.stop_condition_report.clone()),
            end_report: Some(plan.end_report.clone()),
        }
    }
}

/// Response line sent back to the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_result: Option<f64>,
}

impl SimulationResponse {
    pub fn success(value: f64) -> Self {
        Self {
            error: Some(false),
            response_message: None,
            simulation_result: Some(value),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(true),
            response_message: Some(message.into()),
            simulation_result: None,
        }
    }

    /// Absent `error` counts as success
    pub fn is_error(&self) -> bool {
        self.error.unwrap_or(false)
    }

    /// Serialize to a newline-terminated line
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

impl From<&RequestError> for SimulationResponse {
    fn from(e: &RequestError) -> Self {
        SimulationResponse::failure(e.to_string())
    }
}
