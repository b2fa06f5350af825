//! Hardware and recognizer abstractions for Gatewarden.
//!
//! The decision pipeline only ever talks to these traits. [`sim`] implements
//! all of them from a recorded [`scenario::Scenario`] so sessions can be
//! replayed without a camera, sensor, or servo attached.

pub mod scenario;
pub mod sim;

use async_trait::async_trait;
use gatewarden_core::error::GateResult;
use gatewarden_core::{ActuatorAck, Frame, Recognition};

pub use scenario::Scenario;

/// Lazy, possibly infinite sequence of captured images.
#[async_trait]
pub trait FrameSource: Send {
    /// `None` marks end-of-stream (finite sources only).
    async fn next_frame(&mut self) -> Option<Frame>;
}

/// Turns a frame into a candidate plate string with a confidence score.
#[async_trait]
pub trait PlateReader: Send + Sync {
    /// `None` when no plate-like region was found. A miss is not an error.
    async fn read(&self, frame: &Frame) -> Option<Recognition>;
}

/// Range finder polled by the presence task.
#[async_trait]
pub trait DistanceSensor: Send {
    /// Distance in centimetres; `f32::INFINITY` when no echo came back.
    async fn read_distance_cm(&mut self) -> GateResult<f32>;
}

/// Angular actuator driving the gate arm.
#[async_trait]
pub trait Actuator: Send {
    async fn set_angle(&mut self, degrees: f32) -> GateResult<ActuatorAck>;
}
