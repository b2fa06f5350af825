//! Gate configuration: JSON file with defaults for every key.
//!
//! The pipeline assumes a validated configuration; everything that can be
//! wrong with one is caught here and reported as
//! [`GateError::ConfigInvalid`].

use crate::error::{GateError, GateResult};
use crate::normalize::confusable_digit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Floor for the derived consensus window span.
const MIN_WINDOW_SPAN_S: f64 = 1.0;

/// Upper bound for every duration setting (one day).
const MAX_DURATION_S: f64 = 86_400.0;

/// Upper bound for `actuator_retries`.
pub const MAX_ACTUATOR_RETRIES: u32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Consecutive matching detections required for a verdict.
    pub verification_count: usize,
    /// Detections below this confidence are treated as noise.
    pub min_confidence: f32,
    /// Max wall-clock span of one consensus window. `None` derives it from
    /// `scan_cooldown * verification_count`.
    pub max_window_span_s: Option<f64>,
    /// Seconds after a decision before another scan may start.
    pub scan_cooldown: f64,
    pub scan_timeout_s: f64,

    /// Presence when the measured distance is at or below this (cm).
    pub ultrasonic_threshold: f32,
    /// Consecutive agreeing readings needed to flip presence.
    pub presence_debounce: u32,
    pub sensor_poll_interval_ms: u64,

    /// Seconds the gate is held open before the fail-safe close.
    pub gate_open_time: f64,
    pub early_close_grace_s: f64,
    pub actuator_settle_s: f64,
    pub actuator_retries: u32,
    pub open_angle: f32,
    pub close_angle: f32,

    pub fold_confusables: bool,
    pub strip_separators: bool,
    /// Prefix-less plate -> missing region prefix, e.g. `"3944FG": "R"`.
    pub known_prefixes: BTreeMap<String, String>,

    pub homeowner_plates: Vec<String>,
    pub guest_plates: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            verification_count: 3,
            min_confidence: 0.5,
            max_window_span_s: None,
            scan_cooldown: 2.0,
            scan_timeout_s: 15.0,
            ultrasonic_threshold: 15.0,
            presence_debounce: 3,
            sensor_poll_interval_ms: 100,
            gate_open_time: 5.0,
            early_close_grace_s: 2.0,
            actuator_settle_s: 1.0,
            actuator_retries: 3,
            open_angle: 90.0,
            close_angle: 0.0,
            fold_confusables: false,
            strip_separators: false,
            known_prefixes: BTreeMap::new(),
            homeowner_plates: vec!["R3944FG".into(), "R5477DP".into()],
            guest_plates: Vec::new(),
        }
    }
}

impl GateConfig {
    /// Loads and validates a config file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> GateResult<Self> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: GateConfig = serde_json::from_str(&contents).map_err(|e| {
            GateError::ConfigInvalid(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;

        tracing::info!(
            path = %path.display(),
            homeowners = config.homeowner_plates.len(),
            guests = config.guest_plates.len(),
            "config loaded"
        );
        Ok(config)
    }

    /// Writes the config back as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> GateResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| GateError::Internal(format!("config serialization failed: {e}")))?;
        std::fs::write(path, json + "\n")?;
        Ok(())
    }

    /// Rejects settings the pipeline cannot run with, including durations
    /// large enough to overflow timer arithmetic.
    pub fn validate(&self) -> GateResult<()> {
        if self.verification_count == 0 {
            return Err(invalid("verification_count must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid("min_confidence must be within [0, 1]"));
        }
        if let Some(span) = self.max_window_span_s {
            positive("max_window_span_s", span)?;
        } else {
            let derived = self.scan_cooldown * self.verification_count as f64;
            if derived > MAX_DURATION_S {
                return Err(invalid(&format!(
                    "scan_cooldown * verification_count must not exceed {MAX_DURATION_S} s, got {derived}"
                )));
            }
        }
        non_negative("scan_cooldown", self.scan_cooldown)?;
        positive("scan_timeout_s", self.scan_timeout_s)?;
        positive("ultrasonic_threshold", f64::from(self.ultrasonic_threshold))?;
        if self.presence_debounce == 0 {
            return Err(invalid("presence_debounce must be at least 1"));
        }
        if self.sensor_poll_interval_ms == 0 {
            return Err(invalid("sensor_poll_interval_ms must be positive"));
        }
        positive(
            "sensor_poll_interval_ms",
            self.sensor_poll_interval_ms as f64 / 1_000.0,
        )?;
        positive("gate_open_time", self.gate_open_time)?;
        non_negative("early_close_grace_s", self.early_close_grace_s)?;
        non_negative("actuator_settle_s", self.actuator_settle_s)?;
        if self.actuator_retries > MAX_ACTUATOR_RETRIES {
            return Err(invalid(&format!(
                "actuator_retries must be at most {MAX_ACTUATOR_RETRIES}, got {}",
                self.actuator_retries
            )));
        }
        if !self.open_angle.is_finite() || !self.close_angle.is_finite() {
            return Err(invalid("actuator angles must be finite"));
        }

        for (key, prefix) in &self.known_prefixes {
            let prefix_chars: Vec<char> = prefix.chars().filter(|c| !c.is_whitespace()).collect();
            let usable = match prefix_chars.first() {
                Some(c) if c.is_ascii_alphabetic() => {
                    !(self.fold_confusables && confusable_digit(c.to_ascii_uppercase()).is_some())
                }
                _ => false,
            };
            if !usable || !prefix_chars.iter().all(char::is_ascii_alphanumeric) {
                return Err(invalid(&format!(
                    "known prefix {prefix:?} for {key:?} must be alphanumeric and start with a non-confusable letter"
                )));
            }
        }
        Ok(())
    }

    pub fn scan_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.scan_cooldown)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.scan_timeout_s)
    }

    /// Consensus window span, explicit or derived from cooldown timing.
    pub fn max_window_span(&self) -> Duration {
        let secs = self.max_window_span_s.unwrap_or_else(|| {
            (self.scan_cooldown * self.verification_count as f64).max(MIN_WINDOW_SPAN_S)
        });
        Duration::from_secs_f64(secs)
    }

    pub fn gate_open_time(&self) -> Duration {
        Duration::from_secs_f64(self.gate_open_time)
    }

    pub fn early_close_grace(&self) -> Duration {
        Duration::from_secs_f64(self.early_close_grace_s)
    }

    pub fn actuator_settle(&self) -> Duration {
        Duration::from_secs_f64(self.actuator_settle_s)
    }

    pub fn sensor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_poll_interval_ms)
    }
}

fn invalid(msg: &str) -> GateError {
    GateError::ConfigInvalid(msg.to_string())
}

fn positive(name: &str, value: f64) -> GateResult<()> {
    if value.is_finite() && value > 0.0 && value <= MAX_DURATION_S {
        Ok(())
    } else {
        Err(invalid(&format!(
            "{name} must be a positive number of at most {MAX_DURATION_S}, got {value}"
        )))
    }
}

fn non_negative(name: &str, value: f64) -> GateResult<()> {
    if value.is_finite() && value >= 0.0 && value <= MAX_DURATION_S {
        Ok(())
    } else {
        Err(invalid(&format!(
            "{name} must be a non-negative number of at most {MAX_DURATION_S} s, got {value}"
        )))
    }
}
