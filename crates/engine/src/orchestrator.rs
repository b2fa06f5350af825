//! Gate state machine.
//!
//! ```text
//!   Idle ──present & cooldown clear──▶ Scanning ──granted verdict──▶ Opening
//!    ▲                                   │  ▲                            │ ack / settle
//!    │◀──presence lost / scan timeout────┘  └── denied verdict          ▼
//!    │                                                                  Open
//!    └────────────── ack / settle ◀── Closing ◀── hold elapsed / early close
//! ```
//!
//! Every entrypoint returns the events it caused instead of buffering them,
//! so the caller decides how actuator commands are executed and where
//! records go. Once an actuator command has been issued the travel is never
//! interrupted; only `Open -> Closing` reacts to presence.

use crate::aggregator::{Observation, VerificationAggregator};
use crate::cooldown::{CooldownScheduler, ScanPermit};
use crate::registry::AccessRegistry;
use gatewarden_core::error::{GateError, GateResult};
use gatewarden_core::{
    AccessDecision, ActuatorAck, ActuatorCommand, DetectionEvent, GateConfig, GatePhase,
    GateState, Motion, Plate, PlateNormalizer, Recognition, Verdict,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Something the orchestrator did or wants done.
#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    Transition {
        from: GatePhase,
        to: GatePhase,
        at: Instant,
    },
    Decision {
        decision: AccessDecision,
        at: Instant,
    },
    /// Must be executed by the caller, which reports back through
    /// [`GateOrchestrator::on_actuator_result`].
    Command {
        command: ActuatorCommand,
        at: Instant,
    },
    Alert {
        message: String,
        at: Instant,
    },
}

/// An actuator command that kept failing after its retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorFailure {
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    scan_timeout: Duration,
    gate_open_time: Duration,
    early_close_grace: Duration,
    actuator_settle: Duration,
    open_angle: f32,
    close_angle: f32,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Scanning {
        since: Instant,
    },
    Opening {
        settle_until: Option<Instant>,
    },
    Open {
        since: Instant,
        absent_since: Option<Instant>,
    },
    Closing {
        settle_until: Option<Instant>,
    },
}

impl Phase {
    fn label(&self) -> GatePhase {
        match self {
            Phase::Idle => GatePhase::Idle,
            Phase::Scanning { .. } => GatePhase::Scanning,
            Phase::Opening { .. } => GatePhase::Opening,
            Phase::Open { .. } => GatePhase::Open,
            Phase::Closing { .. } => GatePhase::Closing,
        }
    }
}

#[derive(Debug, Clone)]
struct Fault {
    commanded: GateState,
    attempts: u32,
    reason: String,
}

/// Drives one physical gate.
pub struct GateOrchestrator {
    timing: Timing,
    normalizer: PlateNormalizer,
    registry: Arc<AccessRegistry>,
    cooldown: Arc<CooldownScheduler>,
    aggregator: VerificationAggregator,
    phase: Phase,
    present: bool,
    permit: Option<ScanPermit>,
    /// Plate let in while its vehicle is still in front of the gate.
    admitted: Option<Plate>,
    accepting_scans: bool,
    fault: Option<Fault>,
}

impl GateOrchestrator {
    /// Assumes `config` has passed [`GateConfig::validate`].
    pub fn new(
        config: &GateConfig,
        registry: Arc<AccessRegistry>,
        cooldown: Arc<CooldownScheduler>,
    ) -> Self {
        Self {
            timing: Timing {
                scan_timeout: config.scan_timeout(),
                gate_open_time: config.gate_open_time(),
                early_close_grace: config.early_close_grace(),
                actuator_settle: config.actuator_settle(),
                open_angle: config.open_angle,
                close_angle: config.close_angle,
            },
            normalizer: PlateNormalizer::from_config(config),
            registry,
            cooldown,
            aggregator: VerificationAggregator::from_config(config),
            phase: Phase::Idle,
            present: false,
            permit: None,
            admitted: None,
            accepting_scans: true,
            fault: None,
        }
    }

    /// Current phase of the state machine.
    pub fn phase(&self) -> GatePhase {
        self.phase.label()
    }

    /// Physical gate state implied by the phase.
    pub fn state(&self) -> GateState {
        self.phase.label().gate_state()
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.phase, Phase::Scanning { .. })
    }

    /// Idle with no travel pending: safe to stop the control loop.
    pub fn is_at_rest(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// Last debounced presence reported to the orchestrator.
    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn normalizer(&self) -> &PlateNormalizer {
        &self.normalizer
    }

    /// `Err` once an actuator command failed for good.
    pub fn check_fault(&self) -> GateResult<()> {
        match &self.fault {
            None => Ok(()),
            Some(f) => Err(GateError::Actuator {
                commanded: f.commanded,
                attempts: f.attempts,
                reason: f.reason.clone(),
            }),
        }
    }

    /// Drives the arm to the closed angle before the first scan.
    pub fn start(&mut self, now: Instant) -> Vec<GateEvent> {
        let mut events = Vec::new();
        if self.fault.is_none() {
            self.begin_close(now, &mut events);
        }
        events
    }

    /// Debounced presence edge. Departure also re-arms the admitted plate.
    pub fn on_presence(&mut self, present: bool, now: Instant) -> Vec<GateEvent> {
        let mut events = Vec::new();
        if self.fault.is_some() {
            return events;
        }
        self.present = present;
        if !present {
            self.admitted = None;
        }
        debug!(present, phase = %self.phase(), "presence changed");

        match self.phase {
            Phase::Idle => self.try_begin_scan(now, &mut events),
            Phase::Scanning { .. } if !present => {
                info!("presence lost, scan cycle cancelled");
                self.transition(Phase::Idle, now, &mut events);
            }
            Phase::Open {
                since,
                absent_since,
            } => {
                let absent_since = if present {
                    None
                } else {
                    Some(absent_since.unwrap_or(now))
                };
                self.phase = Phase::Open {
                    since,
                    absent_since,
                };
            }
            // Travel in progress is never interrupted.
            _ => {}
        }
        events
    }

    /// Feeds one recognizer read. Reads outside a scan cycle are dropped.
    pub fn on_recognition(&mut self, recognition: Recognition, now: Instant) -> Vec<GateEvent> {
        let mut events = Vec::new();
        if self.fault.is_some() || !self.is_scanning() {
            debug!(text = %recognition.text, "recognition outside scan cycle, dropped");
            return events;
        }

        let plate = self.normalizer.normalize(&recognition.text);
        if plate.is_empty() {
            debug!(text = %recognition.text, "unreadable plate text, dropped");
            return events;
        }
        debug!(%plate, confidence = recognition.confidence, "detection");

        let detection = DetectionEvent::new(plate, recognition.confidence, recognition.captured_at);
        if let Observation::Verdict(verdict) = self.aggregator.observe(detection) {
            self.decide(verdict, now, &mut events);
        }
        events
    }

    /// Outcome of a [`GateEvent::Command`] after the caller's retries.
    pub fn on_actuator_result(
        &mut self,
        motion: Motion,
        result: Result<ActuatorAck, ActuatorFailure>,
        now: Instant,
    ) -> Vec<GateEvent> {
        let mut events = Vec::new();
        if self.fault.is_some() {
            return events;
        }

        match (self.phase, motion, result) {
            (Phase::Opening { .. }, Motion::Open, Ok(ActuatorAck::Confirmed)) => {
                self.enter_open(now, &mut events);
            }
            (Phase::Closing { .. }, Motion::Close, Ok(ActuatorAck::Confirmed)) => {
                self.transition(Phase::Idle, now, &mut events);
                self.try_begin_scan(now, &mut events);
            }
            (Phase::Opening { .. }, Motion::Open, Ok(ActuatorAck::Unconfirmed)) => {
                self.phase = Phase::Opening {
                    settle_until: Some(now + self.timing.actuator_settle),
                };
            }
            (Phase::Closing { .. }, Motion::Close, Ok(ActuatorAck::Unconfirmed)) => {
                self.phase = Phase::Closing {
                    settle_until: Some(now + self.timing.actuator_settle),
                };
            }
            (Phase::Opening { .. }, Motion::Open, Err(failure)) => {
                error!(
                    attempts = failure.attempts,
                    reason = %failure.reason,
                    "open command failed, closing as fail-safe"
                );
                events.push(GateEvent::Alert {
                    message: format!(
                        "open command failed after {} attempts: {}; forcing close",
                        failure.attempts, failure.reason
                    ),
                    at: now,
                });
                self.begin_close(now, &mut events);
            }
            (Phase::Closing { .. }, Motion::Close, Err(failure)) => {
                error!(
                    attempts = failure.attempts,
                    reason = %failure.reason,
                    "close command failed, gate position unknown"
                );
                events.push(GateEvent::Alert {
                    message: format!(
                        "close command failed after {} attempts: {}; gate left in last commanded state (closing)",
                        failure.attempts, failure.reason
                    ),
                    at: now,
                });
                self.fault = Some(Fault {
                    commanded: GateState::Closing,
                    attempts: failure.attempts,
                    reason: failure.reason,
                });
            }
            (phase, motion, _) => {
                warn!(phase = %phase.label(), ?motion, "stale actuator result ignored");
            }
        }
        events
    }

    /// Advances timers: scan timeout, settle delays, open hold, early close,
    /// and cooldown expiry while a vehicle waits.
    pub fn tick(&mut self, now: Instant) -> Vec<GateEvent> {
        let mut events = Vec::new();
        if self.fault.is_some() {
            return events;
        }

        match self.phase {
            Phase::Idle => self.try_begin_scan(now, &mut events),
            Phase::Scanning { since } => {
                if now.saturating_duration_since(since) >= self.timing.scan_timeout {
                    warn!(
                        timeout_ms = self.timing.scan_timeout.as_millis() as u64,
                        "scan cycle timed out without a granted verdict"
                    );
                    // Lockout: a vehicle we cannot read must not keep the
                    // recognizer spinning.
                    self.cooldown.record_decision(now);
                    self.transition(Phase::Idle, now, &mut events);
                }
            }
            Phase::Opening {
                settle_until: Some(t),
            } if now >= t => self.enter_open(now, &mut events),
            Phase::Open {
                since,
                absent_since,
            } => {
                if now.saturating_duration_since(since) >= self.timing.gate_open_time {
                    info!("open hold elapsed, closing");
                    self.begin_close(now, &mut events);
                } else if absent_since.is_some_and(|a| {
                    now.saturating_duration_since(a) >= self.timing.early_close_grace
                }) {
                    info!("vehicle gone, closing early");
                    self.begin_close(now, &mut events);
                }
            }
            Phase::Closing {
                settle_until: Some(t),
            } if now >= t => {
                self.transition(Phase::Idle, now, &mut events);
                self.try_begin_scan(now, &mut events);
            }
            _ => {}
        }
        events
    }

    /// The frame source is exhausted: cancel any scan and start no more.
    pub fn end_of_stream(&mut self, now: Instant) -> Vec<GateEvent> {
        let mut events = Vec::new();
        self.accepting_scans = false;
        if self.is_scanning() {
            info!("frame stream ended, scan cycle cancelled");
            self.transition(Phase::Idle, now, &mut events);
        }
        events
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn try_begin_scan(&mut self, now: Instant, events: &mut Vec<GateEvent>) {
        if !self.present || !self.accepting_scans || !matches!(self.phase, Phase::Idle) {
            return;
        }
        match self.cooldown.try_begin_scan(now) {
            Some(permit) => {
                self.permit = Some(permit);
                self.transition(Phase::Scanning { since: now }, now, events);
            }
            None => debug!("scan deferred by cooldown"),
        }
    }

    fn decide(&mut self, verdict: Verdict, now: Instant, events: &mut Vec<GateEvent>) {
        if self.admitted.as_ref() == Some(&verdict.plate) {
            debug!(plate = %verdict.plate, "already admitted, waiting for departure");
            return;
        }
        let (granted, category) = self.registry.is_authorized(&verdict.plate);
        let decision = AccessDecision::resolve(&verdict, category);

        if granted {
            info!(
                plate = %decision.plate,
                category = ?category,
                matches = decision.matches,
                "{}",
                decision.message()
            );
        } else {
            warn!(
                plate = %decision.plate,
                matches = decision.matches,
                "{}",
                decision.message()
            );
        }
        events.push(GateEvent::Decision { decision, at: now });

        if granted {
            self.admitted = Some(verdict.plate);
            self.cooldown.record_decision(now);
            self.transition(Phase::Opening { settle_until: None }, now, events);
            events.push(GateEvent::Command {
                command: ActuatorCommand {
                    motion: Motion::Open,
                    degrees: self.timing.open_angle,
                },
                at: now,
            });
        }
    }

    fn enter_open(&mut self, now: Instant, events: &mut Vec<GateEvent>) {
        let absent_since = if self.present { None } else { Some(now) };
        self.transition(
            Phase::Open {
                since: now,
                absent_since,
            },
            now,
            events,
        );
    }

    fn begin_close(&mut self, now: Instant, events: &mut Vec<GateEvent>) {
        self.transition(Phase::Closing { settle_until: None }, now, events);
        events.push(GateEvent::Command {
            command: ActuatorCommand {
                motion: Motion::Close,
                degrees: self.timing.close_angle,
            },
            at: now,
        });
    }

    fn transition(&mut self, to: Phase, now: Instant, events: &mut Vec<GateEvent>) {
        let from = self.phase.label();
        let to_label = to.label();

        if from == GatePhase::Scanning && to_label != GatePhase::Scanning {
            self.aggregator.reset();
            self.permit = None;
        }
        self.phase = to;

        if from != to_label {
            info!(%from, to = %to_label, gate = %to_label.gate_state(), "transition");
            events.push(GateEvent::Transition {
                from,
                to: to_label,
                at: now,
            });
        }
    }
}
