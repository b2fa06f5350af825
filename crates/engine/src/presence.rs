//! Debounced vehicle presence from a jittery range finder.

use gatewarden_core::error::GateResult;
use gatewarden_core::GateConfig;

/// Flips only after `required` consecutive readings disagree with the
/// current state. Starts absent.
#[derive(Debug, Clone)]
pub struct PresenceFilter {
    threshold_cm: f32,
    required: u32,
    present: bool,
    /// Consecutive readings contradicting `present`.
    contrary: u32,
}

impl PresenceFilter {
    /// Present at or below `threshold_cm` after `required` agreeing readings.
    pub fn new(threshold_cm: f32, required: u32) -> Self {
        Self {
            threshold_cm,
            required: required.max(1),
            present: false,
            contrary: 0,
        }
    }

    /// Built from the sensor settings of a validated config.
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.ultrasonic_threshold, config.presence_debounce)
    }

    /// Feeds one raw reading; returns the new state when it flips.
    ///
    /// A failed read counts as an "absent" reading.
    pub fn observe(&mut self, reading: GateResult<f32>) -> Option<bool> {
        let in_range = match reading {
            Ok(cm) => cm.is_finite() && cm <= self.threshold_cm,
            Err(e) => {
                tracing::warn!(error = %e, "distance read failed, treating as absent");
                false
            }
        };

        if in_range == self.present {
            self.contrary = 0;
            return None;
        }

        self.contrary += 1;
        if self.contrary < self.required {
            return None;
        }

        self.present = in_range;
        self.contrary = 0;
        Some(self.present)
    }

    /// Current debounced state.
    pub fn is_present(&self) -> bool {
        self.present
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatewarden_core::GateError;

    fn feed(filter: &mut PresenceFilter, readings: &[f32]) -> Vec<Option<bool>> {
        readings.iter().map(|&r| filter.observe(Ok(r))).collect()
    }

    #[test]
    fn needs_consecutive_readings_to_flip() {
        let mut f = PresenceFilter::new(15.0, 3);
        assert_eq!(feed(&mut f, &[10.0, 10.0]), vec![None, None]);
        assert!(!f.is_present());
        assert_eq!(f.observe(Ok(10.0)), Some(true));
        assert!(f.is_present());
    }

    #[test]
    fn jitter_is_rejected() {
        let mut f = PresenceFilter::new(15.0, 3);
        feed(&mut f, &[10.0, 10.0, 40.0, 10.0, 10.0, 40.0]);
        assert!(!f.is_present());
    }

    #[test]
    fn threshold_is_inclusive_and_infinity_is_absent() {
        let mut f = PresenceFilter::new(15.0, 1);
        assert_eq!(f.observe(Ok(15.0)), Some(true));
        assert_eq!(f.observe(Ok(f32::INFINITY)), Some(false));
        assert_eq!(f.observe(Ok(f32::NAN)), None);
    }

    #[test]
    fn sensor_fault_counts_as_absent() {
        let mut f = PresenceFilter::new(15.0, 2);
        feed(&mut f, &[5.0, 5.0]);
        assert!(f.is_present());

        assert_eq!(f.observe(Err(GateError::SensorFault("timeout".into()))), None);
        assert_eq!(
            f.observe(Err(GateError::SensorFault("timeout".into()))),
            Some(false)
        );
    }

    #[test]
    fn flip_back_needs_fresh_streak() {
        let mut f = PresenceFilter::new(15.0, 2);
        feed(&mut f, &[5.0, 5.0]);
        assert_eq!(feed(&mut f, &[50.0, 5.0, 50.0]), vec![None, None, None]);
        assert_eq!(f.observe(Ok(50.0)), Some(false));
    }
}
