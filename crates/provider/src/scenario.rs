//! Replay scenarios: a JSON timeline of what the camera, range finder and
//! servo would have reported during a session.
//!
//! ```json
//! {
//!   "duration_s": 20,
//!   "fps": 10,
//!   "presence": [{ "from_s": 1, "to_s": 12, "distance_cm": 8 }],
//!   "plates": [{ "from_s": 1.5, "to_s": 12, "text": "R 3944 FG", "confidence": 0.9 }]
//! }
//! ```
//!
//! All segments are half-open `[from_s, to_s)`. Outside every presence
//! segment the sensor reports no echo.

use gatewarden_core::error::{GateError, GateResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_FPS: f64 = 10.0;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub duration_s: f64,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub presence: Vec<PresenceSegment>,
    #[serde(default)]
    pub sensor_faults: Vec<Span>,
    #[serde(default)]
    pub plates: Vec<PlateSegment>,
    #[serde(default)]
    pub actuator: ActuatorScript,
    #[serde(default)]
    pub reloads: Vec<Reload>,
}

fn default_fps() -> f64 {
    DEFAULT_FPS
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Span {
    pub from_s: f64,
    pub to_s: f64,
}

impl Span {
    fn contains(&self, t: f64) -> bool {
        self.from_s <= t && t < self.to_s
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSegment {
    pub from_s: f64,
    pub to_s: f64,
    pub distance_cm: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlateSegment {
    pub from_s: f64,
    pub to_s: f64,
    pub text: String,
    pub confidence: f32,
}

/// Servo behaviour: closed-loop acknowledgment and injected failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActuatorScript {
    pub acknowledged: bool,
    /// The first N `set_angle` calls fail.
    pub fail_first: u32,
    /// Every call from the N-th onward fails (1-based).
    pub fail_from: Option<u32>,
}

impl Default for ActuatorScript {
    fn default() -> Self {
        Self {
            acknowledged: true,
            fail_first: 0,
            fail_from: None,
        }
    }
}

/// Allow-list replacement applied mid-session.
#[derive(Debug, Clone, Deserialize)]
pub struct Reload {
    pub at_s: f64,
    #[serde(default)]
    pub homeowner: Vec<String>,
    #[serde(default)]
    pub guest: Vec<String>,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> GateResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let scenario = Self::from_json(&contents)
            .map_err(|e| GateError::Scenario(format!("{}: {e}", path.display())))?;
        tracing::info!(
            path = %path.display(),
            duration_s = scenario.duration_s,
            plates = scenario.plates.len(),
            "scenario loaded"
        );
        Ok(scenario)
    }

    pub fn from_json(json: &str) -> GateResult<Self> {
        let scenario: Scenario =
            serde_json::from_str(json).map_err(|e| GateError::Scenario(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> GateResult<()> {
        if !(self.duration_s.is_finite() && self.duration_s > 0.0) {
            return Err(GateError::Scenario("duration_s must be positive".into()));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(GateError::Scenario("fps must be positive".into()));
        }
        let spans = self
            .presence
            .iter()
            .map(|p| (p.from_s, p.to_s))
            .chain(self.plates.iter().map(|p| (p.from_s, p.to_s)))
            .chain(self.sensor_faults.iter().map(|s| (s.from_s, s.to_s)));
        for (from, to) in spans {
            if !(from.is_finite() && to.is_finite() && from <= to) {
                return Err(GateError::Scenario(format!(
                    "segment [{from}, {to}) is not a valid range"
                )));
            }
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_s)
    }

    /// Distance at `t` seconds, `None` when nothing is in range.
    pub fn distance_at(&self, t: f64) -> Option<f32> {
        self.presence
            .iter()
            .find(|p| p.from_s <= t && t < p.to_s)
            .map(|p| p.distance_cm)
    }

    pub fn sensor_fault_at(&self, t: f64) -> bool {
        self.sensor_faults.iter().any(|s| s.contains(t))
    }

    /// Plate text visible to the camera at `t` seconds.
    pub fn plate_at(&self, t: f64) -> Option<&PlateSegment> {
        self.plates.iter().find(|p| p.from_s <= t && t < p.to_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "duration_s": 20,
        "presence": [{ "from_s": 1, "to_s": 12, "distance_cm": 8 }],
        "sensor_faults": [{ "from_s": 3, "to_s": 3.5 }],
        "plates": [{ "from_s": 1.5, "to_s": 12, "text": "R 3944 FG", "confidence": 0.9 }],
        "reloads": [{ "at_s": 5, "guest": ["G1234AB"] }]
    }"#;

    #[test]
    fn parses_with_defaults() {
        let s = Scenario::from_json(SAMPLE).unwrap();
        assert_eq!(s.fps, DEFAULT_FPS);
        assert!(s.actuator.acknowledged);
        assert_eq!(s.actuator.fail_first, 0);
        assert_eq!(s.reloads[0].guest, vec!["G1234AB".to_string()]);
        assert!(s.reloads[0].homeowner.is_empty());
    }

    #[test]
    fn segments_are_half_open() {
        let s = Scenario::from_json(SAMPLE).unwrap();
        assert_eq!(s.distance_at(0.5), None);
        assert_eq!(s.distance_at(1.0), Some(8.0));
        assert_eq!(s.distance_at(12.0), None);
        assert!(s.sensor_fault_at(3.2));
        assert!(!s.sensor_fault_at(3.5));
        assert_eq!(s.plate_at(2.0).map(|p| p.text.as_str()), Some("R 3944 FG"));
        assert!(s.plate_at(1.0).is_none());
    }

    #[test]
    fn rejects_inverted_segment() {
        let json = r#"{ "duration_s": 5, "plates": [{ "from_s": 4, "to_s": 2, "text": "X", "confidence": 1 }] }"#;
        assert!(matches!(
            Scenario::from_json(json),
            Err(GateError::Scenario(_))
        ));
    }

    #[test]
    fn rejects_zero_duration() {
        assert!(Scenario::from_json(r#"{ "duration_s": 0 }"#).is_err());
    }

    #[test]
    fn shipped_scenarios_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios");
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.extension().is_some_and(|e| e == "json") {
                Scenario::load(&path).unwrap();
                loaded += 1;
            }
        }
        assert!(loaded >= 3);
    }
}
