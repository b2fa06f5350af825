//! Consecutive-match consensus over per-frame plate detections.
//!
//! A verdict needs `verification_count` detections of the same plate in an
//! unbroken run. One disagreeing frame restarts the run from that frame:
//! a granted verdict moves a physical barrier, so precision wins over
//! recall. Low-confidence frames are invisible to the run.

use gatewarden_core::{DetectionEvent, GateConfig, Plate, Verdict};
use smallvec::SmallVec;
use std::time::Duration;

/// Outcome of feeding one detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// The run reached `verification_count`; the window has been reset.
    Verdict(Verdict),
    /// Counted (or restarted the run) without completing it.
    Pending,
    /// Below the confidence floor. The run is neither extended nor broken.
    Ignored,
}

/// Sliding consensus window for one scan cycle.
///
/// `SmallVec<[DetectionEvent; 8]>` keeps typical windows off the heap.
#[derive(Debug)]
pub struct VerificationAggregator {
    verification_count: usize,
    min_confidence: f32,
    max_span: Duration,
    window: SmallVec<[DetectionEvent; 8]>,
}

impl VerificationAggregator {
    /// Consensus over `verification_count` reads within `max_span`.
    pub fn new(verification_count: usize, min_confidence: f32, max_span: Duration) -> Self {
        Self {
            verification_count: verification_count.max(1),
            min_confidence,
            max_span,
            window: SmallVec::new(),
        }
    }

    /// Built from the consensus settings of a validated config.
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            config.verification_count,
            config.min_confidence,
            config.max_window_span(),
        )
    }

    /// Detections must arrive in capture order.
    pub fn observe(&mut self, detection: DetectionEvent) -> Observation {
        if detection.confidence < self.min_confidence {
            tracing::debug!(
                plate = %detection.plate,
                confidence = detection.confidence,
                "below confidence floor, ignored"
            );
            return Observation::Ignored;
        }

        if let Some(first) = self.window.first() {
            let span = detection
                .timestamp
                .saturating_duration_since(first.timestamp);
            if span > self.max_span {
                tracing::debug!(
                    anchor = %first.plate,
                    span_ms = span.as_millis() as u64,
                    "window span exceeded, restarting"
                );
                self.window.clear();
            }
        }

        if self.anchor().is_some_and(|a| *a != detection.plate) {
            tracing::debug!(
                plate = %detection.plate,
                streak = self.window.len(),
                "streak broken"
            );
            self.window.clear();
        }

        self.window.push(detection);
        if self.window.len() < self.verification_count {
            return Observation::Pending;
        }

        let verdict = self.summarize();
        self.window.clear();
        Observation::Verdict(verdict)
    }

    fn summarize(&self) -> Verdict {
        let matches = self.window.len();
        let total: f32 = self.window.iter().map(|d| d.confidence).sum();
        // `observe` only calls this with a full, non-empty window.
        let first = &self.window[0];
        let last = &self.window[matches - 1];
        Verdict {
            plate: first.plate.clone(),
            matches,
            mean_confidence: total / matches as f32,
            first_seen: first.timestamp,
            last_seen: last.timestamp,
        }
    }

    /// Plate the current run is anchored on.
    pub fn anchor(&self) -> Option<&Plate> {
        self.window.first().map(|d| &d.plate)
    }

    /// Length of the current streak.
    pub fn streak(&self) -> usize {
        self.window.len()
    }

    /// Drops the current run (scan cycle ended).
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct Feed {
        agg: VerificationAggregator,
        origin: Instant,
    }

    impl Feed {
        fn new(count: usize) -> Self {
            Self {
                agg: VerificationAggregator::new(count, 0.5, Duration::from_secs(6)),
                origin: Instant::now(),
            }
        }

        fn at(&mut self, ms: u64, plate: &str, confidence: f32) -> Observation {
            let ts = self.origin + Duration::from_millis(ms);
            self.agg
                .observe(DetectionEvent::new(Plate::exact(plate), confidence, ts))
        }
    }

    fn is_verdict(o: &Observation, plate: &str) -> bool {
        matches!(o, Observation::Verdict(v) if v.plate.as_str() == plate)
    }

    #[test]
    fn three_matching_detections_emit_one_verdict() {
        let mut f = Feed::new(3);
        assert_eq!(f.at(0, "R3944FG", 0.9), Observation::Pending);
        assert_eq!(f.at(100, "R3944FG", 0.9), Observation::Pending);
        let third = f.at(200, "R3944FG", 0.6);
        assert!(is_verdict(&third, "R3944FG"));
        if let Observation::Verdict(v) = third {
            assert_eq!(v.matches, 3);
            assert!((v.mean_confidence - 0.8).abs() < 1e-6);
            assert_eq!(v.last_seen - v.first_seen, Duration::from_millis(200));
        }

        // Window reset: the next identical detection starts a fresh run.
        assert_eq!(f.agg.streak(), 0);
        assert_eq!(f.at(300, "R3944FG", 0.9), Observation::Pending);
        assert_eq!(f.agg.streak(), 1);
    }

    #[test]
    fn no_verdict_without_full_streak() {
        for count in 1..=6usize {
            let mut f = Feed::new(count);
            for i in 0..count.saturating_sub(1) {
                assert_eq!(f.at(i as u64 * 10, "R3944FG", 0.9), Observation::Pending);
            }
            let breaker = f.at(1_000, "X0000XX", 0.9);
            if count == 1 {
                assert!(is_verdict(&breaker, "X0000XX"));
            } else {
                assert!(!matches!(breaker, Observation::Verdict(_)));
                assert_eq!(f.agg.anchor().map(Plate::as_str), Some("X0000XX"));
                assert_eq!(f.agg.streak(), 1);
            }
        }
    }

    #[test]
    fn disagreement_restarts_from_new_plate() {
        let mut f = Feed::new(3);
        f.at(0, "R3944FG", 0.9);
        f.at(100, "R3944FG", 0.9);
        f.at(200, "R3944F6", 0.9);
        assert_eq!(f.at(300, "R3944F6", 0.9), Observation::Pending);
        assert!(is_verdict(&f.at(400, "R3944F6", 0.9), "R3944F6"));
    }

    #[test]
    fn low_confidence_neither_extends_nor_resets() {
        let mut f = Feed::new(3);
        f.at(0, "R3944FG", 0.9);
        f.at(100, "R3944FG", 0.9);

        assert_eq!(f.at(150, "X0000XX", 0.1), Observation::Ignored);
        assert_eq!(f.at(160, "R3944FG", 0.49), Observation::Ignored);
        assert_eq!(f.agg.streak(), 2);
        assert_eq!(f.agg.anchor().map(Plate::as_str), Some("R3944FG"));

        assert!(is_verdict(&f.at(200, "R3944FG", 0.9), "R3944FG"));
    }

    #[test]
    fn equality_is_on_normalized_form() {
        let mut f = Feed::new(2);
        f.at(0, "r 3944 fg", 0.9);
        assert!(is_verdict(&f.at(100, "R3944FG", 0.9), "R3944FG"));
    }

    #[test]
    fn stale_anchor_is_dropped() {
        let mut f = Feed::new(3);
        f.at(0, "R3944FG", 0.9);
        f.at(100, "R3944FG", 0.9);
        // 7 s after the anchor: window restarts with this detection alone.
        assert_eq!(f.at(7_000, "R3944FG", 0.9), Observation::Pending);
        assert_eq!(f.agg.streak(), 1);
        assert_eq!(f.at(7_100, "R3944FG", 0.9), Observation::Pending);
        assert!(is_verdict(&f.at(7_200, "R3944FG", 0.9), "R3944FG"));
    }

    #[test]
    fn reset_clears_run() {
        let mut f = Feed::new(2);
        f.at(0, "R3944FG", 0.9);
        f.agg.reset();
        assert_eq!(f.at(100, "R3944FG", 0.9), Observation::Pending);
    }
}
