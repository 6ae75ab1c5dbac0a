// Servo control for the eight leg joints
//
// Provides:
// - Joint/channel identities
// - Persisted per-channel calibration (trim and reversal)
// - Calibrated angle mapping
// - Feetech STS serial protocol and the servo output stage

pub mod calibration;
mod driver;
pub mod feetech;
mod joint;
mod mapping;

pub use calibration::{CalibrationEntry, CalibrationError, CalibrationStore};
pub use driver::{FeetechServos, ServoDriver, ServoFrame, ServoOutput, SimulatedServos, SERVO_IDS};
pub use feetech::{FeetechBus, FeetechError};
pub use joint::{InvalidChannel, Joint, JOINT_COUNT, NEUTRAL_ANGLE};
pub use mapping::map_angle;
