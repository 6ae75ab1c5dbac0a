// Motion engine: one automaton at a time, switched at the handoff barrier
//
// Every tick:
// 1. handoff - if the active automaton is Completed and another motion is
//    desired, replace it with a fresh automaton for that motion
// 2. dispatch on the automaton's lifecycle state:
//    NotStarted -> setup (neutral pose, entry cue), becomes InProgress
//    InProgress -> one gait phase, or the motion's own logic
//    Completed  -> idempotent settle logic (default to Idle, drowsiness)
//
// The engine only produces a servo frame and an optional display cue; the
// runtime maps the frame through calibration and drives the hardware.

use tracing::{debug, info};

use crate::config::OBSTACLE_THRESHOLD;
use crate::messages::Expression;
use crate::sensor::DistanceSensor;
use crate::servo::ServoFrame;

use super::gait;
use super::{MotionKind, MotionPhaseState, MotionRequest};

/// Settled Idle ticks before the robot looks sleepy
pub const DROWSY_TICKS: u16 = 30;

/// InProgress ticks a song lasts
pub const SINGING_TICKS: u16 = 10;

/// Lifecycle and phase counter of one motion activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Automaton {
    pub kind: MotionKind,
    pub state: MotionPhaseState,
    /// Phase index / tick count, meaningful only for `kind`
    pub counter: u16,
}

impl Automaton {
    pub fn new(kind: MotionKind) -> Self {
        Self {
            kind,
            state: MotionPhaseState::NotStarted,
            counter: 0,
        }
    }
}

/// What one tick asks of the outside world
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutput {
    pub frame: ServoFrame,
    pub expression: Option<Expression>,
    /// (from, to) when the active motion changed this tick
    pub handoff: Option<(MotionKind, MotionKind)>,
    /// Distance polled this tick, if any
    pub distance: Option<u16>,
}

pub struct MotionEngine {
    automaton: Automaton,
    desired: MotionKind,
}

impl MotionEngine {
    /// Start idle
    pub fn new() -> Self {
        Self::with_motion(MotionKind::Idle)
    }

    /// Start with `kind` active (NotStarted) and desired
    pub fn with_motion(kind: MotionKind) -> Self {
        Self {
            automaton: Automaton::new(kind),
            desired: kind,
        }
    }

    pub fn current(&self) -> MotionKind {
        self.automaton.kind
    }

    pub fn desired(&self) -> MotionKind {
        self.desired
    }

    pub fn state(&self) -> MotionPhaseState {
        self.automaton.state
    }

    pub fn counter(&self) -> u16 {
        self.automaton.counter
    }

    pub fn motion_request(&self) -> MotionRequest {
        MotionRequest {
            current: self.automaton.kind,
            desired: self.desired,
        }
    }

    /// Ask for the next motion; it starts once the current one completes
    pub fn request(&mut self, kind: MotionKind) {
        info!("Requesting motion {:?} (current {:?})", kind, self.automaton.kind);
        self.desired = kind;
    }

    /// Re-run the active motion from its setup. Used after calibration
    /// changes, since in-flight phases were computed against the old values.
    pub fn restart(&mut self) {
        debug!("Restarting {:?}", self.automaton.kind);
        self.automaton.state = MotionPhaseState::NotStarted;
    }

    /// Stop the active motion where it is (diagnostic servo writes)
    pub fn hold(&mut self) {
        debug!("Holding {:?}", self.automaton.kind);
        self.automaton.state = MotionPhaseState::Completed;
    }

    pub fn tick(&mut self, sensor: &mut dyn DistanceSensor) -> TickOutput {
        let mut out = TickOutput::default();

        self.sync(&mut out);

        match self.automaton.state {
            MotionPhaseState::NotStarted => self.start(&mut out),
            MotionPhaseState::InProgress => self.step(sensor, &mut out),
            MotionPhaseState::Completed => self.settle(&mut out),
        }

        out
    }

    /// Handoff barrier: switch only once the active automaton is Completed
    fn sync(&mut self, out: &mut TickOutput) {
        let request = self.motion_request();
        if !request.switch_pending() {
            return;
        }

        if self.automaton.state == MotionPhaseState::Completed {
            info!("Switching motion {:?} -> {:?}", request.current, request.desired);
            self.automaton = Automaton::new(request.desired);
            out.handoff = Some((request.current, request.desired));
        } else {
            debug!(
                "Motion {:?} pending until {:?} completes",
                request.desired, request.current
            );
        }
    }

    fn start(&mut self, out: &mut TickOutput) {
        let kind = self.automaton.kind;
        info!("Starting {:?}", kind);

        match kind {
            MotionKind::Idle | MotionKind::AutoWalking => {
                out.expression = Some(Expression::Happy);
                out.frame = ServoFrame::neutral();
            }
            MotionKind::Walking
            | MotionKind::TurningLeft
            | MotionKind::TurningRight
            | MotionKind::Dancing => out.frame = ServoFrame::neutral(),
            MotionKind::Singing | MotionKind::DebugSensor => {}
        }

        self.automaton.counter = 0;
        self.automaton.state = MotionPhaseState::InProgress;
    }

    fn step(&mut self, sensor: &mut dyn DistanceSensor, out: &mut TickOutput) {
        let kind = self.automaton.kind;
        match kind {
            MotionKind::Idle => {
                debug!("Idle");
                self.automaton.state = MotionPhaseState::Completed;
            }
            MotionKind::Singing => {
                debug!("Singing ({}/{})", self.automaton.counter + 1, SINGING_TICKS);
                self.automaton.counter += 1;
                if self.automaton.counter >= SINGING_TICKS {
                    info!("Singing completed");
                    self.automaton.state = MotionPhaseState::Completed;
                }
            }
            MotionKind::DebugSensor => {
                let distance = sensor.read();
                out.distance = Some(distance);
                info!("Distance: {}", distance);
                // Diagnostic overlay: yield as soon as anything else is asked for
                if self.desired != kind {
                    self.automaton.state = MotionPhaseState::Completed;
                }
            }
            MotionKind::AutoWalking => {
                let distance = sensor.read();
                out.distance = Some(distance);
                debug!("Distance: {}", distance);
                if distance < OBSTACLE_THRESHOLD {
                    self.avoid_obstacle(distance, out);
                } else {
                    self.run_phase(out);
                }
            }
            MotionKind::Walking
            | MotionKind::TurningLeft
            | MotionKind::TurningRight
            | MotionKind::Dancing => self.run_phase(out),
        }
    }

    /// Execute the current phase and advance exactly one phase
    fn run_phase(&mut self, out: &mut TickOutput) {
        let Some(table) = gait::table(self.automaton.kind) else {
            return;
        };
        let index = self.automaton.counter as usize % table.phase_count();
        let phase = table.phase(self.automaton.counter);
        debug!("{:?} phase {}", self.automaton.kind, index);

        if phase.cue.is_some() {
            out.expression = phase.cue;
        }
        for directive in phase.directives {
            out.frame.set(directive.joint, directive.angle as i32);
        }

        // Wraps on gaits without completion; 65536 is a whole number of cycles
        self.automaton.counter = self.automaton.counter.wrapping_add(1);

        if let Some(ticks) = table.completion {
            if self.automaton.counter >= ticks {
                self.complete(out);
            }
        }
    }

    fn complete(&mut self, out: &mut TickOutput) {
        info!("{:?} completed", self.automaton.kind);
        self.automaton.state = MotionPhaseState::Completed;

        if self.automaton.kind == MotionKind::Walking {
            out.frame = ServoFrame::neutral();
            self.default_to_idle();
        }
    }

    /// Pre-empts the walking phase: turn away, then resume autonomous walking
    fn avoid_obstacle(&mut self, distance: u16, out: &mut TickOutput) {
        let (turn, expression) = if self.automaton.counter % 2 == 0 {
            (MotionKind::TurningLeft, Expression::Confused)
        } else {
            (MotionKind::TurningRight, Expression::Angry)
        };
        info!("Obstacle at {}, switching to {:?}", distance, turn);

        out.expression = Some(expression);
        out.handoff = Some((self.automaton.kind, turn));
        self.automaton = Automaton::new(turn);
        self.desired = MotionKind::AutoWalking;
    }

    fn settle(&mut self, out: &mut TickOutput) {
        match self.automaton.kind {
            MotionKind::Idle => {
                self.automaton.counter = self.automaton.counter.saturating_add(1);
                if self.automaton.counter == DROWSY_TICKS {
                    info!("Robot is now sleepy");
                    out.expression = Some(Expression::Sleepy);
                }
            }
            MotionKind::Walking | MotionKind::DebugSensor => {}
            MotionKind::AutoWalking | MotionKind::Dancing => {
                out.frame = ServoFrame::neutral();
                self.default_to_idle();
            }
            MotionKind::TurningLeft | MotionKind::TurningRight | MotionKind::Singing => {
                self.default_to_idle();
            }
        }
    }

    /// Queue Idle unless another motion is already waiting
    fn default_to_idle(&mut self) {
        if self.desired == self.automaton.kind && self.desired != MotionKind::Idle {
            self.request(MotionKind::Idle);
        }
    }
}

impl Default for MotionEngine {
    fn default() -> Self {
        Self::new()
    }
}
