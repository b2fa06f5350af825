//! Session report.
//!
//! Folds the events of one gate session into counts and a boxed,
//! human-readable summary.

use crate::orchestrator::GateEvent;
use gatewarden_core::{AccessDecision, Category, GatePhase, GateState};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub origin: Instant,
    pub duration: Duration,
    /// `(offset from origin, decision)` in the order they were made.
    pub decisions: Vec<(Duration, AccessDecision)>,
    pub granted_homeowner: u32,
    pub granted_guest: u32,
    pub denied: u32,
    /// Times the gate reached `Open`.
    pub gate_cycles: u32,
    pub transitions: u32,
    pub alerts: Vec<(Duration, String)>,
    pub final_state: GateState,
    /// Set when the session ended on an actuator fault.
    pub fault: Option<String>,
}

impl SessionReport {
    /// Empty report; event offsets are measured from `origin`.
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            duration: Duration::ZERO,
            decisions: Vec::new(),
            granted_homeowner: 0,
            granted_guest: 0,
            denied: 0,
            gate_cycles: 0,
            transitions: 0,
            alerts: Vec::new(),
            final_state: GateState::Closed,
            fault: None,
        }
    }

    /// Folds a whole event log into a report.
    pub fn build(events: &[GateEvent], origin: Instant, duration: Duration) -> Self {
        let mut report = Self::new(origin);
        for event in events {
            report.record(event);
        }
        report.duration = duration;
        report
    }

    /// Folds one event.
    pub fn record(&mut self, event: &GateEvent) {
        match event {
            GateEvent::Decision { decision, at } => {
                match decision.category {
                    Some(Category::Homeowner) => self.granted_homeowner += 1,
                    Some(Category::Guest) => self.granted_guest += 1,
                    None => self.denied += 1,
                }
                self.decisions.push((self.offset(*at), decision.clone()));
            }
            GateEvent::Transition { to, .. } => {
                self.transitions += 1;
                if *to == GatePhase::Open {
                    self.gate_cycles += 1;
                }
                self.final_state = to.gate_state();
            }
            GateEvent::Alert { message, at } => {
                self.alerts.push((self.offset(*at), message.clone()));
            }
            GateEvent::Command { .. } => {}
        }
    }

    pub fn with_fault(mut self, fault: Option<String>) -> Self {
        self.fault = fault;
        self
    }

    fn offset(&self, at: Instant) -> Duration {
        at.saturating_duration_since(self.origin)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push('\n');
        out.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        out.push_str("║                  GATEWARDEN SESSION REPORT                   ║\n");
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        out.push_str(&format!(
            "║  Duration:           {:>37.1?} ║\n",
            self.duration
        ));
        out.push_str(&format!(
            "║  Decisions:          {:>38} ║\n",
            self.decisions.len()
        ));
        out.push_str(&format!(
            "║  Granted homeowner:  {:>38} ║\n",
            self.granted_homeowner
        ));
        out.push_str(&format!(
            "║  Granted guest:      {:>38} ║\n",
            self.granted_guest
        ));
        out.push_str(&format!("║  Denied:             {:>38} ║\n", self.denied));
        out.push_str(&format!(
            "║  Gate cycles:        {:>38} ║\n",
            self.gate_cycles
        ));
        out.push_str(&format!(
            "║  Transitions:        {:>38} ║\n",
            self.transitions
        ));
        out.push_str(&format!(
            "║  Final state:        {:>38} ║\n",
            self.final_state
        ));
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        if self.decisions.is_empty() {
            out.push_str("║  No verdicts reached.                                        ║\n");
        } else {
            out.push_str("║  DECISIONS                                                   ║\n");
            for (i, (at, d)) in self.decisions.iter().enumerate() {
                out.push_str(&format!(
                    "║  {}. [{:>7.2}s] {}\n",
                    i + 1,
                    at.as_secs_f64(),
                    d.message()
                ));
                out.push_str(&format!(
                    "║     Matches: {}  |  Mean confidence: {:.2}\n",
                    d.matches, d.mean_confidence
                ));
            }
        }

        if !self.alerts.is_empty() {
            out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
            out.push_str("║  ALERTS                                                      ║\n");
            for (at, message) in &self.alerts {
                out.push_str(&format!("║  [{:>7.2}s] {}\n", at.as_secs_f64(), message));
            }
        }

        if let Some(fault) = &self.fault {
            out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
            out.push_str(&format!("║  FAULT: {}\n", fault));
        }

        out.push_str("╚══════════════════════════════════════════════════════════════╝\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatewarden_core::{Plate, Verdict};

    fn decision(plate: &str, category: Option<Category>) -> AccessDecision {
        let now = Instant::now();
        AccessDecision::resolve(
            &Verdict {
                plate: Plate::exact(plate),
                matches: 3,
                mean_confidence: 0.9,
                first_seen: now,
                last_seen: now,
            },
            category,
        )
    }

    #[test]
    fn counts_decisions_and_cycles() {
        let origin = Instant::now();
        let at = |ms| origin + Duration::from_millis(ms);
        let events = vec![
            GateEvent::Decision {
                decision: decision("X0000XX", None),
                at: at(300),
            },
            GateEvent::Decision {
                decision: decision("R3944FG", Some(Category::Homeowner)),
                at: at(900),
            },
            GateEvent::Transition {
                from: GatePhase::Opening,
                to: GatePhase::Open,
                at: at(1_000),
            },
            GateEvent::Transition {
                from: GatePhase::Open,
                to: GatePhase::Closing,
                at: at(6_000),
            },
            GateEvent::Alert {
                message: "close command failed".into(),
                at: at(7_000),
            },
        ];

        let report = SessionReport::build(&events, origin, Duration::from_secs(10))
            .with_fault(Some("actuator".into()));
        assert_eq!(report.denied, 1);
        assert_eq!(report.granted_homeowner, 1);
        assert_eq!(report.gate_cycles, 1);
        assert_eq!(report.transitions, 2);
        assert_eq!(report.final_state, GateState::Closing);
        assert_eq!(report.decisions[1].0, Duration::from_millis(900));

        let text = report.render();
        assert!(text.contains("ACCESS DENIED - Unknown: X0000XX"));
        assert!(text.contains("ACCESS GRANTED - Homeowner: R3944FG"));
        assert!(text.contains("ALERTS"));
        assert!(text.contains("FAULT: actuator"));

        let rows = report.to_rows(&events);
        assert_eq!(rows.len(), events.len() + 1);
    }

    #[test]
    fn empty_session_renders() {
        let report = SessionReport::build(&[], Instant::now(), Duration::from_secs(1));
        assert!(report.render().contains("No verdicts reached."));
        assert_eq!(report.final_state, GateState::Closed);
    }
}
