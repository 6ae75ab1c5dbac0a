// Tick driver: commands in, one engine tick per loop, servo frame out
//
// Each loop iteration:
// 1. drain commands and distance readings (non-blocking)
// 2. tick the motion engine once
// 3. write the frame through calibration, then wait one settle delay
// 4. publish display cues and runtime status

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::{interval, sleep};
use tracing::{debug, info, warn};

use crate::config::{LOOP_HZ, SETTLE_DELAY, TOPIC_CMD, TOPIC_DISPLAY, TOPIC_DISTANCE, TOPIC_STATUS};
use crate::messages::{Expression, ParseCommandError, RobotCommand, RuntimeStatus};
use crate::motion::{MotionEngine, TickOutput};
use crate::sensor::{DistanceReading, LatestDistance};
use crate::servo::calibration::{CalibrationStore, FileRegion, PersistentRegion};
use crate::servo::{FeetechServos, Joint, ServoDriver, ServoFrame, ServoOutput, SimulatedServos};

/// Startup options, filled from the command line
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Feetech bus port; None drives simulated servos
    pub servo_port: Option<String>,
    pub calibration_path: PathBuf,
    pub loop_hz: u64,
    pub settle: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            servo_port: None,
            calibration_path: PathBuf::from(crate::config::CALIBRATION_PATH),
            loop_hz: LOOP_HZ,
            settle: SETTLE_DELAY,
        }
    }
}

pub struct Runtime<R: PersistentRegion, D: ServoDriver> {
    engine: MotionEngine,
    calibration: CalibrationStore<R>,
    sensor: LatestDistance,
    output: ServoOutput<D>,
    last_distance: Option<u16>,
}

impl<R: PersistentRegion, D: ServoDriver> Runtime<R, D> {
    pub fn new(calibration: CalibrationStore<R>, output: ServoOutput<D>) -> Self {
        Self {
            engine: MotionEngine::new(),
            calibration,
            sensor: LatestDistance::new(),
            output,
            last_distance: None,
        }
    }

    /// Apply one command. Returns a display cue when the command produces one.
    /// Servo writes requested here return their settle time in the second slot.
    pub fn on_command(&mut self, cmd: RobotCommand) -> (Option<Expression>, Duration) {
        info!("Received command: {:?}", &cmd);
        match cmd {
            RobotCommand::Motion { motion } => {
                self.engine.request(motion);
                (None, Duration::ZERO)
            }
            RobotCommand::SetTrim { channel, trim } => {
                let result = self.calibration.set_trim(channel, trim);
                self.after_calibration(result)
            }
            RobotCommand::SetReverse { channel, reversed } => {
                let result = self.calibration.set_reversed(channel, reversed);
                self.after_calibration(result)
            }
            RobotCommand::TestServo { channel, angle } => match Joint::try_from(channel) {
                Ok(joint) => {
                    let mut frame = ServoFrame::new();
                    frame.set(joint, angle);
                    let settle = self.output.apply(&frame, &self.calibration);
                    self.engine.hold();
                    (None, settle)
                }
                Err(e) => {
                    warn!("Ignoring servo test: {}", e);
                    (None, Duration::ZERO)
                }
            },
        }
    }

    /// Parse and apply one line of the text protocol
    pub fn on_text(&mut self, line: &str) -> (Option<Expression>, Duration) {
        match line.parse::<RobotCommand>() {
            Ok(cmd) => self.on_command(cmd),
            Err(ParseCommandError::UnknownMotion(e)) => {
                warn!("{}, keeping {:?}", e, self.engine.current());
                (Some(Expression::Confused), Duration::ZERO)
            }
            Err(e) => {
                warn!("Failed to parse command {:?}: {}", line, e);
                (None, Duration::ZERO)
            }
        }
    }

    pub fn on_distance(&mut self, reading: DistanceReading) {
        self.sensor.on_reading(reading);
    }

    /// One engine tick, written to the servos. Returns the engine output and
    /// how long to let the servos settle.
    pub fn tick(&mut self) -> (TickOutput, Duration) {
        let out = self.engine.tick(&mut self.sensor);
        if out.distance.is_some() {
            self.last_distance = out.distance;
        }
        if let Some((from, to)) = out.handoff {
            debug!("Handoff {:?} -> {:?}", from, to);
        }
        let settle = self.output.apply(&out.frame, &self.calibration);
        (out, settle)
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            motion: self.engine.current(),
            desired: self.engine.desired(),
            phase: self.engine.state(),
            counter: self.engine.counter(),
            distance: self.last_distance,
        }
    }

    pub fn engine(&self) -> &MotionEngine {
        &self.engine
    }

    pub fn calibration(&self) -> &CalibrationStore<R> {
        &self.calibration
    }

    pub fn output(&self) -> &ServoOutput<D> {
        &self.output
    }

    fn after_calibration<E: std::fmt::Display>(
        &mut self,
        result: Result<(), E>,
    ) -> (Option<Expression>, Duration) {
        match result {
            Ok(()) => self.engine.restart(),
            Err(e) => warn!("Ignoring calibration change: {}", e),
        }
        (None, Duration::ZERO)
    }
}

/// Interval between ticks, never zero
pub fn tick_period(loop_hz: u64) -> Duration {
    Duration::from_micros((1_000_000 / loop_hz.max(1)).max(1))
}

/// Outbound zenoh topic
trait Outlet {
    async fn send(&self, payload: String) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl Outlet for zenoh::pubsub::Publisher<'_> {
    async fn send(&self, payload: String) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.put(payload).await
    }
}

/// Publish one tick's display cues and status. Failures are logged and
/// counted; the control loop keeps running.
async fn publish_tick(
    display: &impl Outlet,
    status: &impl Outlet,
    cues: &[Expression],
    current: &RuntimeStatus,
) -> usize {
    let mut failures = 0;

    for cue in cues {
        if let Err(e) = display.send(cue.to_string()).await {
            warn!("Failed to publish display cue {}: {}", cue, e);
            failures += 1;
        }
    }

    match serde_json::to_string(current) {
        Ok(status_json) => {
            if let Err(e) = status.send(status_json).await {
                warn!("Failed to publish status: {}", e);
                failures += 1;
            }
        }
        Err(e) => {
            warn!("Failed to encode status: {}", e);
            failures += 1;
        }
    }

    failures
}

fn open_servos(
    options: &RuntimeOptions,
) -> Result<Box<dyn ServoDriver>, Box<dyn std::error::Error + Send + Sync>> {
    match &options.servo_port {
        Some(port) => {
            let mut servos = FeetechServos::new(port)?;
            servos.initialize()?;
            Ok(Box::new(servos))
        }
        None => {
            info!("Servo hardware disabled, simulating output");
            Ok(Box::new(SimulatedServos::new()))
        }
    }
}

pub async fn run(options: RuntimeOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Loading calibration from {:?}", options.calibration_path);
    let calibration = CalibrationStore::open(FileRegion::open(&options.calibration_path)?);
    let output = ServoOutput::new(open_servos(&options)?, options.settle);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD).await?;
    let sub_distance = session.declare_subscriber(TOPIC_DISTANCE).await?;
    let pub_display = session.declare_publisher(TOPIC_DISPLAY).await?;
    let pub_status = session.declare_publisher(TOPIC_STATUS).await?;

    let mut runtime = Runtime::new(calibration, output);
    let mut tick = interval(tick_period(options.loop_hz));

    info!(
        "Runtime started: {}Hz loop, {}ms settle",
        options.loop_hz,
        options.settle.as_millis()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD, TOPIC_DISTANCE);
    info!("Publishing to: {}, {}", TOPIC_DISPLAY, TOPIC_STATUS);

    loop {
        tick.tick().await;

        // 1. Drain distance readings, keep latest
        while let Ok(Some(sample)) = sub_distance.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DistanceReading>(&payload) {
                Ok(reading) => runtime.on_distance(reading),
                Err(e) => warn!("Failed to parse distance reading: {}", e),
            }
        }

        // 2. Drain commands: JSON first, text protocol otherwise
        let mut cues = Vec::new();
        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            let payload = sample.payload().to_bytes();
            let (cue, settle) = match serde_json::from_slice::<RobotCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(json_err) => match std::str::from_utf8(&payload) {
                    Ok(line) => runtime.on_text(line),
                    Err(_) => {
                        warn!("Failed to parse command: {}", json_err);
                        (None, Duration::ZERO)
                    }
                },
            };
            cues.extend(cue);
            if !settle.is_zero() {
                sleep(settle).await;
            }
        }

        // 3. Tick the engine and let the servos settle once
        let (out, settle) = runtime.tick();
        if !settle.is_zero() {
            sleep(settle).await;
        }
        cues.extend(out.expression);

        // 4. Publish display cues and status
        publish_tick(&pub_display, &pub_status, &cues, &runtime.status()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{MotionKind, MotionPhaseState};
    use crate::servo::calibration::MemoryRegion;

    fn runtime() -> Runtime<MemoryRegion, SimulatedServos> {
        Runtime::new(
            CalibrationStore::open(MemoryRegion::new()),
            ServoOutput::new(SimulatedServos::new(), SETTLE_DELAY),
        )
    }

    fn tick_n(runtime: &mut Runtime<MemoryRegion, SimulatedServos>, n: usize) {
        for _ in 0..n {
            runtime.tick();
        }
    }

    #[test]
    fn test_first_tick_writes_neutral_pose() {
        let mut rt = runtime();
        let (out, settle) = rt.tick();
        assert_eq!(out.expression, Some(Expression::Happy));
        assert_eq!(settle, SETTLE_DELAY);
        // Default trims: channel 0 is -20, channel 1 is +10
        assert_eq!(rt.output().driver().angle(Joint::FrontRightHip), Some(70));
        assert_eq!(rt.output().driver().angle(Joint::FrontLeftHip), Some(100));
        assert_eq!(rt.output().driver().angle(Joint::FrontRightLeg), Some(90));
    }

    #[test]
    fn test_idle_ticks_do_not_write() {
        let mut rt = runtime();
        tick_n(&mut rt, 2);
        let writes = rt.output().driver().writes();
        let (_, settle) = rt.tick();
        assert_eq!(settle, Duration::ZERO);
        assert_eq!(rt.output().driver().writes(), writes);
    }

    #[test]
    fn test_text_motion_request() {
        let mut rt = runtime();
        tick_n(&mut rt, 2);
        rt.on_text("W");
        assert_eq!(rt.engine().desired(), MotionKind::Walking);
        let (out, _) = rt.tick();
        assert_eq!(out.handoff, Some((MotionKind::Idle, MotionKind::Walking)));
    }

    #[test]
    fn test_unknown_motion_is_confused_and_ignored() {
        let mut rt = runtime();
        let (cue, _) = rt.on_text("M 99");
        assert_eq!(cue, Some(Expression::Confused));
        assert_eq!(rt.engine().desired(), MotionKind::Idle);

        let (cue, _) = rt.on_text("Z");
        assert_eq!(cue, None);
    }

    #[test]
    fn test_calibration_change_restarts_motion() {
        let mut rt = runtime();
        rt.on_command(RobotCommand::Motion { motion: MotionKind::Walking });
        tick_n(&mut rt, 3 + 5);
        assert_eq!(rt.engine().counter(), 5);

        rt.on_text("C 2 15");
        assert_eq!(rt.calibration().get(Joint::FrontRightLeg).trim, 15);
        assert_eq!(rt.engine().state(), MotionPhaseState::NotStarted);

        rt.tick();
        assert_eq!(rt.engine().counter(), 0);
        assert_eq!(rt.output().driver().angle(Joint::FrontRightLeg), Some(105));
    }

    #[test]
    fn test_invalid_calibration_is_ignored() {
        let mut rt = runtime();
        rt.on_command(RobotCommand::Motion { motion: MotionKind::Walking });
        tick_n(&mut rt, 3 + 5);

        rt.on_text("C 9 10");
        rt.on_command(RobotCommand::SetTrim { channel: 2, trim: 120 });
        rt.on_command(RobotCommand::SetReverse { channel: -1, reversed: true });
        assert_eq!(rt.engine().state(), MotionPhaseState::InProgress);
        assert_eq!(rt.engine().counter(), 5);
        assert_eq!(rt.calibration().get(Joint::FrontRightLeg).trim, 0);
    }

    #[test]
    fn test_servo_test_writes_and_holds() {
        let mut rt = runtime();
        rt.on_command(RobotCommand::Motion { motion: MotionKind::Walking });
        tick_n(&mut rt, 3 + 2);

        rt.on_command(RobotCommand::SetReverse { channel: 4, reversed: true });
        tick_n(&mut rt, 1);
        let (_, settle) = rt.on_text("T 4 30");
        assert_eq!(settle, SETTLE_DELAY);
        assert_eq!(rt.output().driver().angle(Joint::BackRightHip), Some(150));
        assert_eq!(rt.engine().state(), MotionPhaseState::Completed);

        let (out, _) = rt.tick();
        assert!(out.frame.is_empty());
        assert_eq!(rt.output().driver().angle(Joint::BackRightHip), Some(150));
    }

    #[test]
    fn test_obstacle_from_published_distance() {
        let mut rt = runtime();
        rt.on_command(RobotCommand::Motion { motion: MotionKind::AutoWalking });
        tick_n(&mut rt, 3);

        rt.on_distance(DistanceReading { distance: 120 });
        let (out, _) = rt.tick();
        assert_eq!(out.distance, Some(120));
        assert_eq!(rt.engine().current(), MotionKind::TurningLeft);
        assert_eq!(rt.status().distance, Some(120));
        assert_eq!(rt.status().desired, MotionKind::AutoWalking);
    }

    /// Records payloads, or fails every send
    #[derive(Default)]
    struct FakeOutlet {
        fail: bool,
        sent: std::cell::RefCell<Vec<String>>,
    }

    impl Outlet for FakeOutlet {
        async fn send(
            &self,
            payload: String,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if self.fail {
                return Err("router unreachable".into());
            }
            self.sent.borrow_mut().push(payload);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_tick_sends_cues_and_status() {
        let display = FakeOutlet::default();
        let status = FakeOutlet::default();
        let rt = runtime();

        let failures = publish_tick(
            &display,
            &status,
            &[Expression::Happy, Expression::Sleepy],
            &rt.status(),
        )
        .await;
        assert_eq!(failures, 0);
        assert_eq!(*display.sent.borrow(), vec!["happy", "sleepy"]);
        assert_eq!(status.sent.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failures_keep_the_loop_running() {
        let display = FakeOutlet { fail: true, ..Default::default() };
        let status = FakeOutlet { fail: true, ..Default::default() };
        let mut rt = runtime();
        rt.on_command(RobotCommand::Motion { motion: MotionKind::Walking });

        for _ in 0..5 {
            let (out, _) = rt.tick();
            let cues: Vec<Expression> = out.expression.into_iter().collect();
            let failures = publish_tick(&display, &status, &cues, &rt.status()).await;
            assert_eq!(failures, cues.len() + 1);
        }
        // Ticking carried on through every failed publish
        assert_eq!(rt.engine().current(), MotionKind::Walking);
        assert_eq!(rt.engine().counter(), 2);
    }

    #[test]
    fn test_tick_period_is_never_zero() {
        assert_eq!(tick_period(20), Duration::from_millis(50));
        assert_eq!(tick_period(0), Duration::from_secs(1));
        assert_eq!(tick_period(u64::MAX), Duration::from_micros(1));
    }

    #[test]
    fn test_status_json() {
        let rt = runtime();
        let json = serde_json::to_string(&rt.status()).unwrap();
        assert_eq!(
            json,
            r#"{"motion":"idle","desired":"idle","phase":"not_started","counter":0,"distance":null}"#
        );
    }
}
