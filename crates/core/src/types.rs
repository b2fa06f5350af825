//! Domain types for the Gatewarden decision pipeline.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

// ---------------------------------------------------------------------------
// Plate
// ---------------------------------------------------------------------------

/// Regional plate layout: 1-2 letters, 1-4 digits, 1-3 letters.
static PLATE_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{1,2}[0-9]{1,4}[A-Z]{1,3}$").expect("plate format regex is valid")
});

/// A normalized plate key.
///
/// Only [`PlateNormalizer`](crate::PlateNormalizer) produces plates, so
/// equality on the inner string is equality of normalized forms. The empty
/// plate stands for malformed input and never matches an allow-list entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Plate(String);

impl Plate {
    pub(crate) fn from_canonical(key: String) -> Self {
        Self(key)
    }

    /// The canonical "no plate" value.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Normalizes `raw` with the default (exact) rules.
    pub fn exact(raw: &str) -> Self {
        crate::PlateNormalizer::default().normalize(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the plate matches the regional layout. Informational only;
    /// access never depends on it.
    pub fn is_well_formed(&self) -> bool {
        PLATE_FORMAT.is_match(&self.0)
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Detections
// ---------------------------------------------------------------------------

/// An opaque captured image. Pixel layout is the recognizer's business.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub captured_at: Instant,
    /// Ref-counted so frames can be handed to a recognizer without copying.
    pub data: Arc<[u8]>,
}

/// Raw recognizer output for one frame, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
    pub captured_at: Instant,
}

/// One normalized per-frame candidate. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub plate: Plate,
    /// Clamped to `[0, 1]`; NaN becomes `0`.
    pub confidence: f32,
    pub timestamp: Instant,
}

impl DetectionEvent {
    pub fn new(plate: Plate, confidence: f32, timestamp: Instant) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            plate,
            confidence,
            timestamp,
        }
    }
}

/// A consensus-confirmed plate.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub plate: Plate,
    pub matches: usize,
    pub mean_confidence: f32,
    pub first_seen: Instant,
    pub last_seen: Instant,
}

// ---------------------------------------------------------------------------
// Access decisions
// ---------------------------------------------------------------------------

/// Allow-list category. Homeowner is the more privileged of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Homeowner,
    Guest,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Homeowner => f.write_str("Homeowner"),
            Category::Guest => f.write_str("Guest"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Homeowner,
    Guest,
    NotListed,
}

/// Immutable result of resolving a verdict against the allow-lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessDecision {
    pub plate: Plate,
    pub granted: bool,
    pub category: Option<Category>,
    pub reason: DecisionReason,
    pub matches: usize,
    pub mean_confidence: f32,
}

impl AccessDecision {
    /// Builds the decision for `verdict` given the registry's answer.
    pub fn resolve(verdict: &Verdict, category: Option<Category>) -> Self {
        let reason = match category {
            Some(Category::Homeowner) => DecisionReason::Homeowner,
            Some(Category::Guest) => DecisionReason::Guest,
            None => DecisionReason::NotListed,
        };
        Self {
            plate: verdict.plate.clone(),
            granted: category.is_some(),
            category,
            reason,
            matches: verdict.matches,
            mean_confidence: verdict.mean_confidence,
        }
    }

    /// Operator-facing message, e.g. `ACCESS GRANTED - Homeowner: R3944FG`.
    pub fn message(&self) -> String {
        match self.category {
            Some(category) => format!("ACCESS GRANTED - {category}: {}", self.plate),
            None => format!("ACCESS DENIED - Unknown: {}", self.plate),
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Physical gate state. Exactly one instance, owned by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    Closed,
    Opening,
    Open,
    Closing,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateState::Closed => "closed",
            GateState::Opening => "opening",
            GateState::Open => "open",
            GateState::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Orchestrator phase. `Idle` and `Scanning` both hold the gate closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatePhase {
    Idle,
    Scanning,
    Opening,
    Open,
    Closing,
}

impl GatePhase {
    pub fn gate_state(self) -> GateState {
        match self {
            GatePhase::Idle | GatePhase::Scanning => GateState::Closed,
            GatePhase::Opening => GateState::Opening,
            GatePhase::Open => GateState::Open,
            GatePhase::Closing => GateState::Closing,
        }
    }
}

impl fmt::Display for GatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatePhase::Idle => "idle",
            GatePhase::Scanning => "scanning",
            GatePhase::Opening => "opening",
            GatePhase::Open => "open",
            GatePhase::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Direction of actuator travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Motion {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActuatorCommand {
    pub motion: Motion,
    pub degrees: f32,
}

/// What the actuator reported after accepting a `set_angle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorAck {
    /// Closed-loop: travel finished.
    Confirmed,
    /// Open-loop: command accepted, position unknown until the settle delay.
    Unconfirmed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_plates() {
        assert!(Plate::exact("R3944FG").is_well_formed());
        assert!(Plate::exact("AB1234CD").is_well_formed());
        assert!(!Plate::exact("3944FG").is_well_formed());
        assert!(!Plate::exact("").is_well_formed());
    }

    #[test]
    fn confidence_is_clamped() {
        let now = Instant::now();
        assert_eq!(DetectionEvent::new(Plate::empty(), 1.7, now).confidence, 1.0);
        assert_eq!(DetectionEvent::new(Plate::empty(), -0.2, now).confidence, 0.0);
        assert_eq!(DetectionEvent::new(Plate::empty(), f32::NAN, now).confidence, 0.0);
    }

    #[test]
    fn decision_messages() {
        let now = Instant::now();
        let verdict = Verdict {
            plate: Plate::exact("R3944FG"),
            matches: 3,
            mean_confidence: 0.9,
            first_seen: now,
            last_seen: now,
        };
        let granted = AccessDecision::resolve(&verdict, Some(Category::Homeowner));
        assert!(granted.granted);
        assert_eq!(granted.reason, DecisionReason::Homeowner);
        assert_eq!(granted.message(), "ACCESS GRANTED - Homeowner: R3944FG");

        let denied = AccessDecision::resolve(&verdict, None);
        assert!(!denied.granted);
        assert_eq!(denied.category, None);
        assert_eq!(denied.message(), "ACCESS DENIED - Unknown: R3944FG");
    }

    #[test]
    fn phase_maps_to_gate_state() {
        assert_eq!(GatePhase::Idle.gate_state(), GateState::Closed);
        assert_eq!(GatePhase::Scanning.gate_state(), GateState::Closed);
        assert_eq!(GatePhase::Open.gate_state(), GateState::Open);
    }
}
