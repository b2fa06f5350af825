//! Decision pipeline for Gatewarden.
//!
//! Leaves first:
//! - [`registry`]: homeowner/guest allow-lists with atomic reload
//! - [`aggregator`]: consecutive-match consensus over detections
//! - [`cooldown`]: lockout window between scan cycles
//! - [`presence`]: debounced vehicle presence
//! - [`orchestrator`]: the gate state machine tying them together
//! - [`runtime`]: tokio tasks feeding the orchestrator from real devices
//!
//! Records leave through [`sink`] and [`reporter`].

pub mod aggregator;
pub mod cooldown;
pub mod orchestrator;
pub mod presence;
pub mod registry;
pub mod reporter;
pub mod runtime;
pub mod sink;

pub use aggregator::{Observation, VerificationAggregator};
pub use cooldown::{CooldownScheduler, CooldownWindow, ScanPermit};
pub use orchestrator::{ActuatorFailure, GateEvent, GateOrchestrator};
pub use presence::PresenceFilter;
pub use registry::{AccessLists, AccessRegistry};
pub use reporter::SessionReport;
pub use runtime::{GateDevices, GateRuntime, SessionStats};
