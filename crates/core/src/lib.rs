//! Domain models, plate normalization, configuration, and error definitions.
//!
//! Foundation crate -- no async dependencies.

pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use config::GateConfig;
pub use error::{GateError, GateResult};
pub use normalize::PlateNormalizer;
pub use types::{
    AccessDecision, ActuatorAck, ActuatorCommand, Category, DecisionReason, DetectionEvent, Frame,
    GatePhase, GateState, Motion, Plate, Recognition, Verdict,
};
