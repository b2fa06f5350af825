//! Centralized error types for the Gatewarden workspace.
//!
//! A failed access match is not an error: denial is a normal outcome carried
//! by [`AccessDecision`](crate::AccessDecision). Recognition misses and
//! low-confidence reads are likewise filtered, never raised.

use crate::types::GateState;
use thiserror::Error;

/// Top-level error enum. Variants map to subsystems.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GateError {
    /// Distance sensor read failure. Non-fatal: the reading counts as "absent".
    #[error("Sensor fault: {0}")]
    SensorFault(String),

    /// Actuator command still failing after the retry budget was spent.
    #[error("Actuator fault while {commanded} after {attempts} attempts: {reason}")]
    Actuator {
        commanded: GateState,
        attempts: u32,
        reason: String,
    },

    /// A single collaborator call (camera, servo, sensor bus) failed.
    #[error("Device error: {0}")]
    Device(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Invalid scenario: {0}")]
    Scenario(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type GateResult<T> = Result<T, GateError>;
