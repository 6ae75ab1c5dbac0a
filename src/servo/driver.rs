// Servo output stage
//
// The engine produces one frame of target angles per tick. ServoOutput maps
// the frame through calibration, writes it to the driver in one go and then
// waits a single settle delay (instead of one delay per servo).

use std::time::Duration;

use tracing::{debug, info, warn};

use super::calibration::{CalibrationStore, PersistentRegion};
use super::feetech::{FeetechBus, FeetechError};
use super::joint::{JOINT_COUNT, Joint, NEUTRAL_ANGLE};

/// Servo IDs on the bus, in channel order
pub const SERVO_IDS: [u8; JOINT_COUNT] = [1, 2, 3, 4, 5, 6, 7, 8];

/// Target angles for one tick; channels left as None are not written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServoFrame {
    targets: [Option<i32>; JOINT_COUNT],
}

impl ServoFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every joint at the neutral angle
    pub fn neutral() -> Self {
        Self {
            targets: [Some(NEUTRAL_ANGLE as i32); JOINT_COUNT],
        }
    }

    /// Later writes to the same joint win
    pub fn set(&mut self, joint: Joint, angle: i32) {
        self.targets[joint.index()] = Some(angle);
    }

    pub fn get(&self, joint: Joint) -> Option<i32> {
        self.targets[joint.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.targets.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, i32)> + '_ {
        Joint::ALL
            .iter()
            .filter_map(|&joint| self.get(joint).map(|angle| (joint, angle)))
    }
}

/// Physical actuator: hardware angles only (already calibrated and clamped)
pub trait ServoDriver {
    fn write(&mut self, angles: &[(Joint, u8)]) -> Result<(), FeetechError>;
}

impl<D: ServoDriver + ?Sized> ServoDriver for Box<D> {
    fn write(&mut self, angles: &[(Joint, u8)]) -> Result<(), FeetechError> {
        (**self).write(angles)
    }
}

/// Feetech bus servos, IDs from SERVO_IDS
pub struct FeetechServos {
    bus: FeetechBus,
}

impl FeetechServos {
    pub fn new(port: &str) -> Result<Self, FeetechError> {
        info!("Opening servo bus on {}", port);
        let bus = FeetechBus::open(port)?;
        Ok(Self { bus })
    }

    /// Check every servo answers, then switch them to position control
    pub fn initialize(&mut self) -> Result<(), FeetechError> {
        info!("Initializing servos {:?} for position control", SERVO_IDS);

        for id in SERVO_IDS {
            if !self.bus.ping(id)? {
                warn!("Servo {} not responding to ping", id);
                return Err(FeetechError::Timeout { id });
            }
            debug!("Servo {} responding", id);
        }

        for id in SERVO_IDS {
            self.bus.enable_position_control(id)?;
        }

        info!("Servos initialized successfully");
        Ok(())
    }
}

impl ServoDriver for FeetechServos {
    fn write(&mut self, angles: &[(Joint, u8)]) -> Result<(), FeetechError> {
        let data: Vec<(u8, u8)> = angles
            .iter()
            .map(|&(joint, angle)| (SERVO_IDS[joint.index()], angle))
            .collect();
        self.bus.sync_write_angles(&data)
    }
}

impl Drop for FeetechServos {
    fn drop(&mut self) {
        // Let the legs go limp rather than hold a half-finished pose
        for id in SERVO_IDS {
            if let Err(e) = self.bus.disable_torque(id) {
                warn!("Failed to release servo {} on drop: {}", id, e);
            }
        }
    }
}

/// Records the last hardware angle of every channel
#[derive(Debug, Clone, Default)]
pub struct SimulatedServos {
    angles: [Option<u8>; JOINT_COUNT],
    writes: usize,
}

impl SimulatedServos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn angle(&self, joint: Joint) -> Option<u8> {
        self.angles[joint.index()]
    }

    /// Number of individual servo writes so far
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl ServoDriver for SimulatedServos {
    fn write(&mut self, angles: &[(Joint, u8)]) -> Result<(), FeetechError> {
        for &(joint, angle) in angles {
            debug!("Sim servo {:?} -> {}", joint, angle);
            self.angles[joint.index()] = Some(angle);
            self.writes += 1;
        }
        Ok(())
    }
}

/// Calibrated servo output
pub struct ServoOutput<D: ServoDriver> {
    driver: D,
    settle: Duration,
}

impl<D: ServoDriver> ServoOutput<D> {
    pub fn new(driver: D, settle: Duration) -> Self {
        Self { driver, settle }
    }

    /// Map and write a frame. Returns how long the caller should let the
    /// servos settle (zero when nothing was written).
    pub fn apply<R: PersistentRegion>(
        &mut self,
        frame: &ServoFrame,
        calibration: &CalibrationStore<R>,
    ) -> Duration {
        if frame.is_empty() {
            return Duration::ZERO;
        }

        let angles: Vec<(Joint, u8)> = frame
            .iter()
            .map(|(joint, target)| (joint, calibration.map(joint, target)))
            .collect();
        debug!("Servo frame: {:?}", angles);

        // Driver failures are logged; the next frame retries
        if let Err(e) = self.driver.write(&angles) {
            warn!("Servo write failed: {}", e);
        }
        self.settle
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::calibration::MemoryRegion;

    #[test]
    fn test_frame_later_write_wins() {
        let mut frame = ServoFrame::new();
        assert!(frame.is_empty());
        frame.set(Joint::BackLeftLeg, 80);
        frame.set(Joint::BackLeftLeg, 95);
        assert_eq!(frame.get(Joint::BackLeftLeg), Some(95));
        assert_eq!(frame.iter().count(), 1);
    }

    #[test]
    fn test_apply_maps_through_calibration() {
        let mut calibration = CalibrationStore::open(MemoryRegion::new());
        calibration.set_trim(4, 5).unwrap();
        calibration.set_reversed(4, true).unwrap();

        let mut output = ServoOutput::new(SimulatedServos::new(), Duration::from_millis(20));
        let mut frame = ServoFrame::new();
        frame.set(Joint::BackRightHip, 100);
        frame.set(Joint::FrontRightHip, 90);

        let settle = output.apply(&frame, &calibration);
        assert_eq!(settle, Duration::from_millis(20));
        // 180 - (100 + 5)
        assert_eq!(output.driver().angle(Joint::BackRightHip), Some(75));
        // default trim -20
        assert_eq!(output.driver().angle(Joint::FrontRightHip), Some(70));
        assert_eq!(output.driver().angle(Joint::BackLeftLeg), None);
        assert_eq!(output.driver().writes(), 2);
    }

    #[test]
    fn test_empty_frame_needs_no_settle() {
        let calibration = CalibrationStore::open(MemoryRegion::new());
        let mut output = ServoOutput::new(SimulatedServos::new(), Duration::from_millis(20));
        assert_eq!(output.apply(&ServoFrame::new(), &calibration), Duration::ZERO);
        assert_eq!(output.driver().writes(), 0);
    }
}
