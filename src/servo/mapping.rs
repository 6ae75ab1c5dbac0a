// Actuator output mapping: commanded angle -> hardware angle
//
// Applies trim and reversal, and guarantees the result is a valid
// servo angle whatever the gait or command asked for.

use tracing::warn;

use super::calibration::{CalibrationEntry, CalibrationStore, PersistentRegion};
use super::joint::Joint;

pub const MIN_ANGLE: i32 = 0;
pub const MAX_ANGLE: i32 = 180;

/// Map a target angle through one channel's calibration
///
/// 1. clamp the target to 0..=180
/// 2. add trim (mirrored around 180 for reversed channels)
/// 3. clamp again
pub fn map_angle(entry: CalibrationEntry, target: i32) -> u8 {
    let target = clamp_angle(target);
    let trimmed = target + entry.trim as i32;
    let angle = if entry.reversed { MAX_ANGLE - trimmed } else { trimmed };

    angle.clamp(MIN_ANGLE, MAX_ANGLE) as u8
}

fn clamp_angle(target: i32) -> i32 {
    if !(MIN_ANGLE..=MAX_ANGLE).contains(&target) {
        warn!("Servo angle {} out of range, clamping", target);
    }
    target.clamp(MIN_ANGLE, MAX_ANGLE)
}

impl<R: PersistentRegion> CalibrationStore<R> {
    /// Hardware angle for `joint` at `target` degrees
    pub fn map(&self, joint: Joint, target: i32) -> u8 {
        map_angle(self.get(joint), target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::calibration::MemoryRegion;

    #[test]
    fn test_output_always_in_range() {
        for trim in -90..=90i8 {
            for reversed in [false, true] {
                let entry = CalibrationEntry { trim, reversed };
                for target in (-50..=230).step_by(5) {
                    let angle = map_angle(entry, target) as i32;
                    assert!(
                        (MIN_ANGLE..=MAX_ANGLE).contains(&angle),
                        "trim={} reversed={} target={} -> {}",
                        trim,
                        reversed,
                        target,
                        angle
                    );
                }
            }
        }
    }

    #[test]
    fn test_reversal_without_trim() {
        let normal = CalibrationEntry { trim: 0, reversed: false };
        let reversed = CalibrationEntry { trim: 0, reversed: true };
        for target in 0..=180 {
            assert_eq!(map_angle(normal, target) as i32, target);
            assert_eq!(map_angle(reversed, target) as i32, 180 - target);
        }
    }

    #[test]
    fn test_trim_applied_before_reversal() {
        let entry = CalibrationEntry { trim: 10, reversed: true };
        // 180 - (90 + 10)
        assert_eq!(map_angle(entry, 90), 80);

        let entry = CalibrationEntry { trim: -20, reversed: false };
        assert_eq!(map_angle(entry, 90), 70);
        assert_eq!(map_angle(entry, 10), 0);
    }

    #[test]
    fn test_target_clamped_before_trim() {
        let entry = CalibrationEntry { trim: -30, reversed: false };
        // 250 clamps to 180 first, then trim applies
        assert_eq!(map_angle(entry, 250), 150);
    }

    #[test]
    fn test_store_map_uses_channel_calibration() {
        let mut store = CalibrationStore::open(MemoryRegion::new());
        store.set_trim(3, 15).unwrap();
        store.set_reversed(3, true).unwrap();
        assert_eq!(store.map(Joint::FrontLeftLeg, 90), 75);
        // Default trim on channel 0 is -20
        assert_eq!(store.map(Joint::FrontRightHip, 90), 70);
    }
}
