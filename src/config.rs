// Timeouts, topics, servo and calibration configuration
use std::time::Duration;

// Control loop frequency (one engine tick per loop iteration)
pub const LOOP_HZ: u64 = 20;

// Wait after each servo frame so the joints can reach their targets
pub const SETTLE_DELAY: Duration = Duration::from_millis(20);

// Zenoh topics
pub const TOPIC_CMD: &str = "quadbot/cmd"; // commands
pub const TOPIC_DISTANCE: &str = "quadbot/sensor/distance"; // distance readings
pub const TOPIC_DISPLAY: &str = "quadbot/display/face"; // expression tags
pub const TOPIC_STATUS: &str = "quadbot/state/status"; // runtime status

// Distance sensor
// Readings below this are obstacles during autonomous walking
pub const OBSTACLE_THRESHOLD: u16 = 400;
// Reported when the sensor times out or no fresh reading is available
pub const DISTANCE_SENTINEL: u16 = 999;
// A published reading older than this is treated as a timeout
pub const DISTANCE_TIMEOUT: Duration = Duration::from_millis(200);

// Servo configuration
// Serial port for the Feetech servo bus
pub const SERVO_PORT: &str = "/dev/ttyUSB0";

// Enable hardware servo control (set to false for simulation/testing)
pub const SERVO_ENABLED: bool = true;

// Calibration image (trim and reversal flags)
pub const CALIBRATION_PATH: &str = "quadbot-calibration.bin";
