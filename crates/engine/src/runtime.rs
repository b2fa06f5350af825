//! Async driver for one gate.
//!
//! Two device tasks run in a `JoinSet` and talk to the control loop only
//! through bounded channels:
//!
//! ```text
//!  presence task ──(bool flips)──────▶┐
//!                                     ├─▶ control loop ─▶ GateOrchestrator ─▶ actuator
//!  recognition task ──(Recognition)──▶┘          │
//!        ▲                                       │
//!        └────────────── watch: scanning ◀───────┘
//! ```
//!
//! The control loop is the only owner of the orchestrator and the actuator,
//! so no state is shared with the tasks beyond the registry and cooldown
//! handles.

use crate::cooldown::CooldownScheduler;
use crate::orchestrator::{ActuatorFailure, GateEvent, GateOrchestrator};
use crate::presence::PresenceFilter;
use crate::registry::AccessRegistry;
use gatewarden_core::error::GateResult;
use gatewarden_core::{ActuatorAck, ActuatorCommand, GateConfig, GateState, Recognition};
use gatewarden_provider::{Actuator, DistanceSensor, FrameSource, PlateReader};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Control loop tick driving the orchestrator's timers.
const TICK: Duration = Duration::from_millis(50);

/// First backoff between actuator attempts; doubles per retry.
const RETRY_BASE_MS: u64 = 200;

/// Ceiling for a single backoff sleep.
const RETRY_MAX_BACKOFF: Duration = Duration::from_secs(30);

const PRESENCE_CHANNEL: usize = 16;
const RECOGNITION_CHANNEL: usize = 64;

/// The four collaborators one gate needs.
pub struct GateDevices {
    pub sensor: Box<dyn DistanceSensor>,
    pub camera: Box<dyn FrameSource>,
    pub reader: Arc<dyn PlateReader>,
    pub actuator: Box<dyn Actuator>,
}

/// Counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub duration_ms: u64,
    pub frames: u64,
    /// Frames handed to the plate reader.
    pub frames_read: u64,
    pub recognitions: u64,
    pub presence_changes: u64,
    pub sensor_polls: u64,
    pub decisions: u64,
    pub granted: u64,
    pub denied: u64,
    pub gate_cycles: u64,
    pub actuator_commands: u64,
    pub actuator_retries: u64,
    pub alerts: u64,
}

/// What a device task reports when it exits.
enum TaskReport {
    Presence { polls: u64 },
    Recognition { frames: u64, frames_read: u64 },
}

pub struct GateRuntime {
    config: GateConfig,
    registry: Arc<AccessRegistry>,
    cooldown: Arc<CooldownScheduler>,
    events: Option<mpsc::Sender<GateEvent>>,
}

impl GateRuntime {
    pub fn new(config: GateConfig, registry: Arc<AccessRegistry>) -> Self {
        let cooldown = Arc::new(CooldownScheduler::new(config.scan_cooldown()));
        Self {
            config,
            registry,
            cooldown,
            events: None,
        }
    }

    /// Forwards every event to `tx`. Sends wait for capacity.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<GateEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn registry(&self) -> Arc<AccessRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn cooldown(&self) -> Arc<CooldownScheduler> {
        Arc::clone(&self.cooldown)
    }

    /// Runs until the frame stream ends and the gate is back at rest.
    ///
    /// Returns `Err(GateError::Actuator)` when a close command fails after
    /// all retries; the gate is then left in its last commanded state.
    pub async fn run(self, devices: GateDevices) -> GateResult<SessionStats> {
        let GateDevices {
            sensor,
            camera,
            reader,
            mut actuator,
        } = devices;

        let started = Instant::now();
        let mut orch = GateOrchestrator::new(
            &self.config,
            Arc::clone(&self.registry),
            Arc::clone(&self.cooldown),
        );

        let (presence_tx, mut presence_rx) = mpsc::channel(PRESENCE_CHANNEL);
        let (recognition_tx, mut recognition_rx) = mpsc::channel(RECOGNITION_CHANNEL);
        let (scanning_tx, scanning_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut tasks = JoinSet::new();
        tasks.spawn(presence_task(
            sensor,
            PresenceFilter::from_config(&self.config),
            self.config.sensor_poll_interval(),
            presence_tx,
            stop_rx,
        ));
        tasks.spawn(recognition_task(camera, reader, scanning_rx, recognition_tx));

        tracing::info!(
            verification_count = self.config.verification_count,
            scan_cooldown_s = self.config.scan_cooldown,
            gate_open_time_s = self.config.gate_open_time,
            "gate session started"
        );

        let mut stats = SessionStats::default();
        let mut ticker = time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stream_open = true;
        let mut pending = orch.start(now());

        let outcome = loop {
            if let Err(e) = self
                .dispatch(&mut orch, actuator.as_mut(), pending, &mut stats)
                .await
            {
                break Err(e);
            }
            scanning_tx.send_replace(orch.is_scanning());

            if !stream_open && orch.is_at_rest() {
                break Ok(());
            }

            pending = tokio::select! {
                Some(present) = presence_rx.recv() => {
                    stats.presence_changes += 1;
                    orch.on_presence(present, now())
                }
                recognition = recognition_rx.recv(), if stream_open => match recognition {
                    Some(r) => {
                        stats.recognitions += 1;
                        orch.on_recognition(r, now())
                    }
                    None => {
                        stream_open = false;
                        orch.end_of_stream(now())
                    }
                },
                _ = ticker.tick() => orch.tick(now()),
            };
        };

        // Wind down the device tasks and collect their counters.
        stop_tx.send_replace(true);
        drop(scanning_tx);
        drop(recognition_rx);
        drop(presence_rx);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskReport::Presence { polls }) => stats.sensor_polls = polls,
                Ok(TaskReport::Recognition {
                    frames,
                    frames_read,
                }) => {
                    stats.frames = frames;
                    stats.frames_read = frames_read;
                }
                Err(e) => tracing::warn!(error = %e, "device task panicked"),
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(()) => tracing::info!(
                duration_ms = stats.duration_ms,
                decisions = stats.decisions,
                granted = stats.granted,
                gate_cycles = stats.gate_cycles,
                "gate session finished"
            ),
            Err(e) => tracing::error!(error = %e, state = %orch.state(), "gate session aborted"),
        }
        outcome.map(|()| stats)
    }

    /// Publishes events in order, executing actuator commands as they come
    /// and queueing whatever the orchestrator answers with.
    async fn dispatch(
        &self,
        orch: &mut GateOrchestrator,
        actuator: &mut dyn Actuator,
        events: Vec<GateEvent>,
        stats: &mut SessionStats,
    ) -> GateResult<()> {
        let mut queue: VecDeque<GateEvent> = events.into();
        while let Some(event) = queue.pop_front() {
            match &event {
                GateEvent::Decision { decision, .. } => {
                    stats.decisions += 1;
                    if decision.granted {
                        stats.granted += 1;
                    } else {
                        stats.denied += 1;
                    }
                }
                GateEvent::Transition { to, .. } => {
                    if to.gate_state() == GateState::Open {
                        stats.gate_cycles += 1;
                    }
                }
                GateEvent::Alert { .. } => stats.alerts += 1,
                GateEvent::Command { .. } => stats.actuator_commands += 1,
            }

            let command = match &event {
                GateEvent::Command { command, .. } => Some(*command),
                _ => None,
            };
            self.publish(event).await;

            if let Some(command) = command {
                let result = drive_actuator(
                    actuator,
                    command,
                    self.config.actuator_retries,
                    stats,
                )
                .await;
                queue.extend(orch.on_actuator_result(command.motion, result, now()));
            }
        }
        orch.check_fault()
    }

    async fn publish(&self, event: GateEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).await.is_err() {
                tracing::debug!("event receiver dropped");
            }
        }
    }
}

/// Control-loop clock. Follows tokio's clock so paused-time tests work.
fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Sleep before retry `attempt` (1-based): 200 ms doubling, capped.
fn retry_backoff(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(RETRY_BASE_MS.saturating_mul(factor)).min(RETRY_MAX_BACKOFF)
}

/// One command with bounded retries and exponential backoff.
async fn drive_actuator(
    actuator: &mut dyn Actuator,
    command: ActuatorCommand,
    retries: u32,
    stats: &mut SessionStats,
) -> Result<ActuatorAck, ActuatorFailure> {
    let mut last_error = String::new();
    for attempt in 0..=retries {
        if attempt > 0 {
            stats.actuator_retries += 1;
            let delay = retry_backoff(attempt);
            time::sleep(delay).await;
        }

        match actuator.set_angle(command.degrees).await {
            Ok(ack) => {
                tracing::debug!(
                    motion = ?command.motion,
                    degrees = command.degrees,
                    ?ack,
                    attempt,
                    "actuator command accepted"
                );
                return Ok(ack);
            }
            Err(e) => {
                tracing::warn!(
                    motion = ?command.motion,
                    degrees = command.degrees,
                    attempt = attempt + 1,
                    max_attempts = retries + 1,
                    error = %e,
                    "actuator command failed"
                );
                last_error = e.to_string();
            }
        }
    }
    Err(ActuatorFailure {
        attempts: retries + 1,
        reason: last_error,
    })
}

// ---------------------------------------------------------------------------
// Device tasks
// ---------------------------------------------------------------------------

async fn presence_task(
    mut sensor: Box<dyn DistanceSensor>,
    mut filter: PresenceFilter,
    poll_interval: Duration,
    tx: mpsc::Sender<bool>,
    mut stop: watch::Receiver<bool>,
) -> TaskReport {
    let mut polls = 0u64;
    let mut interval = time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = interval.tick() => {}
        }
        polls += 1;
        let reading = sensor.read_distance_cm().await;
        if let Some(present) = filter.observe(reading) {
            tracing::debug!(present, "presence flipped");
            if tx.send(present).await.is_err() {
                break;
            }
        }
    }
    TaskReport::Presence { polls }
}

async fn recognition_task(
    mut camera: Box<dyn FrameSource>,
    reader: Arc<dyn PlateReader>,
    scanning: watch::Receiver<bool>,
    tx: mpsc::Sender<Recognition>,
) -> TaskReport {
    let mut frames = 0u64;
    let mut frames_read = 0u64;

    // Frames keep flowing while idle; they are dropped without touching the
    // reader. Dropping `tx` on exit is the end-of-stream signal.
    while let Some(frame) = camera.next_frame().await {
        frames += 1;
        if scanning.has_changed().is_err() {
            break;
        }
        if !*scanning.borrow() {
            continue;
        }

        frames_read += 1;
        let Some(recognition) = reader.read(&frame).await else {
            continue;
        };
        if tx.send(recognition).await.is_err() {
            break;
        }
    }
    tracing::debug!(frames, frames_read, "frame stream ended");
    TaskReport::Recognition {
        frames,
        frames_read,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatewarden_core::Motion;
    use gatewarden_provider::sim::SimulatedServo;

    fn open() -> ActuatorCommand {
        ActuatorCommand {
            motion: Motion::Open,
            degrees: 90.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_exponential_backoff() {
        let mut servo = SimulatedServo::new(true).failing_first(2);
        let mut stats = SessionStats::default();
        let t0 = Instant::now();

        let result = drive_actuator(&mut servo, open(), 3, &mut stats).await;
        assert_eq!(result, Ok(ActuatorAck::Confirmed));
        assert_eq!(stats.actuator_retries, 2);
        // 200 ms + 400 ms
        assert_eq!(t0.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_retry_budget() {
        let mut servo = SimulatedServo::new(true).failing_first(10);
        let log = servo.log();
        let mut stats = SessionStats::default();

        let failure = drive_actuator(&mut servo, open(), 2, &mut stats)
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert!(failure.reason.contains("servo did not respond"));
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        assert_eq!(retry_backoff(1), Duration::from_millis(200));
        assert_eq!(retry_backoff(3), Duration::from_millis(800));
        assert_eq!(retry_backoff(8), Duration::from_millis(25_600));
        assert_eq!(retry_backoff(9), RETRY_MAX_BACKOFF);
        assert_eq!(retry_backoff(64), RETRY_MAX_BACKOFF);
        assert_eq!(retry_backoff(u32::MAX), RETRY_MAX_BACKOFF);
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let mut servo = SimulatedServo::new(false).failing_first(1);
        let mut stats = SessionStats::default();
        let failure = drive_actuator(&mut servo, open(), 0, &mut stats)
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(stats.actuator_retries, 0);
    }
}
