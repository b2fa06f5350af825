//! Scripted devices that replay a [`Scenario`] against the tokio clock.
//!
//! Every device measures time from a shared origin taken when the rig is
//! built, so under `tokio::time::pause` a whole session replays
//! deterministically.
//!
//! ```ignore
//! let rig = SimulatedRig::new(Arc::new(scenario));
//! let servo_log = rig.servo_log.clone();
//! let runtime = GateRuntime::new(config, registry, rig.into_devices());
//! ```

use crate::scenario::Scenario;
use crate::{Actuator, DistanceSensor, FrameSource, PlateReader};
use async_trait::async_trait;
use gatewarden_core::error::{GateError, GateResult};
use gatewarden_core::{ActuatorAck, Frame, Recognition};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Seconds since the rig origin.
fn elapsed_s(origin: Instant) -> f64 {
    origin.elapsed().as_secs_f64()
}

// ---------------------------------------------------------------------------
// Distance sensor
// ---------------------------------------------------------------------------

pub struct ScriptedDistanceSensor {
    scenario: Arc<Scenario>,
    origin: Instant,
}

#[async_trait]
impl DistanceSensor for ScriptedDistanceSensor {
    async fn read_distance_cm(&mut self) -> GateResult<f32> {
        let t = elapsed_s(self.origin);
        if self.scenario.sensor_fault_at(t) {
            return Err(GateError::SensorFault("echo line stuck".into()));
        }
        Ok(self.scenario.distance_at(t).unwrap_or(f32::INFINITY))
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

/// Finite frame source running at the scenario's frame rate.
///
/// Frames are stamped with wall time, so a consumer that stops pulling for
/// a while resumes at the live position rather than replaying a backlog.
pub struct ScriptedCamera {
    scenario: Arc<Scenario>,
    origin: Instant,
    next_seq: u64,
}

impl ScriptedCamera {
    fn frame_time(&self, seq: u64) -> f64 {
        seq as f64 / self.scenario.fps
    }
}

#[async_trait]
impl FrameSource for ScriptedCamera {
    async fn next_frame(&mut self) -> Option<Frame> {
        let live_seq = (elapsed_s(self.origin) * self.scenario.fps).ceil() as u64;
        let seq = self.next_seq.max(live_seq);
        let t = self.frame_time(seq);
        if t >= self.scenario.duration_s {
            return None;
        }

        let due = self.origin + Duration::from_secs_f64(t);
        tokio::time::sleep_until(due).await;
        self.next_seq = seq + 1;

        let data = match self.scenario.plate_at(t) {
            Some(p) => encode_annotation(&p.text, p.confidence),
            None => Vec::new(),
        };
        Some(Frame {
            seq,
            captured_at: due.into_std(),
            data: data.into(),
        })
    }
}

fn encode_annotation(text: &str, confidence: f32) -> Vec<u8> {
    format!("{text}\t{confidence}").into_bytes()
}

// ---------------------------------------------------------------------------
// Recognizer
// ---------------------------------------------------------------------------

/// Reads the plate annotation the scripted camera embeds in each frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnnotationReader;

#[async_trait]
impl PlateReader for AnnotationReader {
    async fn read(&self, frame: &Frame) -> Option<Recognition> {
        let text = std::str::from_utf8(&frame.data).ok()?;
        let (plate, confidence) = text.rsplit_once('\t')?;
        let confidence: f32 = confidence.parse().ok()?;
        if plate.trim().is_empty() {
            return None;
        }
        Some(Recognition {
            text: plate.to_string(),
            confidence,
            captured_at: frame.captured_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Servo
// ---------------------------------------------------------------------------

/// Every angle the servo was asked for, including failed attempts.
pub type ServoLog = Arc<Mutex<Vec<f32>>>;

pub struct SimulatedServo {
    acknowledged: bool,
    fail_first: u32,
    fail_from: Option<u32>,
    calls: u32,
    log: ServoLog,
}

impl SimulatedServo {
    pub fn new(acknowledged: bool) -> Self {
        Self {
            acknowledged,
            fail_first: 0,
            fail_from: None,
            calls: 0,
            log: ServoLog::default(),
        }
    }

    /// The first `n` calls fail.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    /// Calls from the `n`-th (1-based) onward fail.
    pub fn failing_from(mut self, n: u32) -> Self {
        self.fail_from = Some(n);
        self
    }

    pub fn log(&self) -> ServoLog {
        self.log.clone()
    }
}

#[async_trait]
impl Actuator for SimulatedServo {
    async fn set_angle(&mut self, degrees: f32) -> GateResult<ActuatorAck> {
        self.calls += 1;
        if let Ok(mut log) = self.log.lock() {
            log.push(degrees);
        }

        let failing = self.calls <= self.fail_first
            || self.fail_from.is_some_and(|from| self.calls >= from);
        if failing {
            return Err(GateError::Device(format!(
                "servo did not respond to {degrees} deg (call {})",
                self.calls
            )));
        }

        Ok(if self.acknowledged {
            ActuatorAck::Confirmed
        } else {
            ActuatorAck::Unconfirmed
        })
    }
}

// ---------------------------------------------------------------------------
// Rig
// ---------------------------------------------------------------------------

/// All four scripted devices sharing one clock origin.
pub struct SimulatedRig {
    pub sensor: ScriptedDistanceSensor,
    pub camera: ScriptedCamera,
    pub reader: AnnotationReader,
    pub servo: SimulatedServo,
    pub servo_log: ServoLog,
}

impl SimulatedRig {
    pub fn new(scenario: Arc<Scenario>) -> Self {
        let origin = Instant::now();
        let mut servo = SimulatedServo::new(scenario.actuator.acknowledged)
            .failing_first(scenario.actuator.fail_first);
        if let Some(from) = scenario.actuator.fail_from {
            servo = servo.failing_from(from);
        }
        let servo_log = servo.log();

        Self {
            sensor: ScriptedDistanceSensor {
                scenario: scenario.clone(),
                origin,
            },
            camera: ScriptedCamera {
                scenario,
                origin,
                next_seq: 0,
            },
            reader: AnnotationReader,
            servo,
            servo_log,
        }
    }
}
