//! Flat, append-only records of a gate session.
//!
//! Row schemas, each tagged with `kind` and stamped with `at_ms`
//! (milliseconds since session start):
//! - [`DecisionRow`]: one per verdict resolved against the allow-lists
//! - [`TransitionRow`]: one per phase change
//! - [`AlertRow`]: one per actuator alert
//! - [`SessionSummaryRow`]: one per session, written last
//!
//! Backend: [`json_stream::JsonStreamSink`] writes newline-delimited JSON to
//! any `Write` impl.

pub mod json_stream;

use crate::orchestrator::GateEvent;
use crate::reporter::SessionReport;
use gatewarden_core::{Category, DecisionReason, GatePhase, GateState};
use serde::Serialize;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Serializable row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkRow {
    Decision(DecisionRow),
    Transition(TransitionRow),
    Alert(AlertRow),
    SessionSummary(SessionSummaryRow),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRow {
    pub at_ms: u64,
    pub plate: String,
    pub granted: bool,
    pub category: Option<Category>,
    pub reason: DecisionReason,
    pub matches: usize,
    pub mean_confidence: f32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRow {
    pub at_ms: u64,
    pub from: GatePhase,
    pub to: GatePhase,
    /// Physical gate state after the transition.
    pub gate: GateState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRow {
    pub at_ms: u64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummaryRow {
    pub at_ms: u64,
    pub decisions: u32,
    pub granted_homeowner: u32,
    pub granted_guest: u32,
    pub denied: u32,
    pub gate_cycles: u32,
    pub transitions: u32,
    pub alerts: u32,
    pub final_state: GateState,
    pub fault: Option<String>,
}

fn millis_since(origin: Instant, at: Instant) -> u64 {
    at.saturating_duration_since(origin).as_millis() as u64
}

impl SinkRow {
    /// `None` for events that are not archived (actuator commands).
    pub fn from_event(event: &GateEvent, origin: Instant) -> Option<Self> {
        match event {
            GateEvent::Decision { decision, at } => Some(SinkRow::Decision(DecisionRow {
                at_ms: millis_since(origin, *at),
                plate: decision.plate.to_string(),
                granted: decision.granted,
                category: decision.category,
                reason: decision.reason,
                matches: decision.matches,
                mean_confidence: decision.mean_confidence,
                message: decision.message(),
            })),
            GateEvent::Transition { from, to, at } => Some(SinkRow::Transition(TransitionRow {
                at_ms: millis_since(origin, *at),
                from: *from,
                to: *to,
                gate: to.gate_state(),
            })),
            GateEvent::Alert { message, at } => Some(SinkRow::Alert(AlertRow {
                at_ms: millis_since(origin, *at),
                message: message.clone(),
            })),
            GateEvent::Command { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder: SessionReport -> rows
// ---------------------------------------------------------------------------

impl SessionReport {
    /// Every archived event of the session followed by the summary row.
    pub fn to_rows(&self, events: &[GateEvent]) -> Vec<SinkRow> {
        let mut rows: Vec<SinkRow> = events
            .iter()
            .filter_map(|e| SinkRow::from_event(e, self.origin))
            .collect();
        rows.push(SinkRow::SessionSummary(self.to_summary_row()));
        rows
    }

    pub fn to_summary_row(&self) -> SessionSummaryRow {
        SessionSummaryRow {
            at_ms: self.duration.as_millis() as u64,
            decisions: self.decisions.len() as u32,
            granted_homeowner: self.granted_homeowner,
            granted_guest: self.granted_guest,
            denied: self.denied,
            gate_cycles: self.gate_cycles,
            transitions: self.transitions,
            alerts: self.alerts.len() as u32,
            final_state: self.final_state,
            fault: self.fault.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatewarden_core::{AccessDecision, Plate, Verdict};
    use std::time::Duration;

    #[test]
    fn rows_carry_kind_tag_and_offset() {
        let origin = Instant::now();
        let at = origin + Duration::from_millis(1_250);
        let verdict = Verdict {
            plate: Plate::exact("R3944FG"),
            matches: 3,
            mean_confidence: 0.5,
            first_seen: origin,
            last_seen: at,
        };
        let event = GateEvent::Decision {
            decision: AccessDecision::resolve(&verdict, Some(Category::Homeowner)),
            at,
        };

        let row = SinkRow::from_event(&event, origin).unwrap();
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["kind"], "decision");
        assert_eq!(json["at_ms"], 1_250);
        assert_eq!(json["plate"], "R3944FG");
        assert_eq!(json["category"], "homeowner");
        assert_eq!(json["reason"], "homeowner");
        assert_eq!(json["message"], "ACCESS GRANTED - Homeowner: R3944FG");
    }

    #[test]
    fn transition_row_reports_gate_state() {
        let origin = Instant::now();
        let event = GateEvent::Transition {
            from: GatePhase::Idle,
            to: GatePhase::Scanning,
            at: origin,
        };
        let json = serde_json::to_value(SinkRow::from_event(&event, origin).unwrap()).unwrap();
        assert_eq!(json["kind"], "transition");
        assert_eq!(json["to"], "scanning");
        assert_eq!(json["gate"], "closed");
    }

    #[test]
    fn commands_are_not_archived() {
        let origin = Instant::now();
        let event = GateEvent::Command {
            command: gatewarden_core::ActuatorCommand {
                motion: gatewarden_core::Motion::Open,
                degrees: 90.0,
            },
            at: origin,
        };
        assert!(SinkRow::from_event(&event, origin).is_none());
    }
}
