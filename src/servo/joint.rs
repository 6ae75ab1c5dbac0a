// The eight servo channels of the quadruped
//
// Hips swing the leg forward/back (+ = counter-clockwise),
// legs lift/lower the foot (- = lift, + = lower).

use serde::{Deserialize, Serialize};

/// Number of servo channels
pub const JOINT_COUNT: usize = 8;

/// Neutral angle every gait starts and ends on
pub const NEUTRAL_ANGLE: u8 = 90;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    FrontRightHip = 0,
    FrontLeftHip = 1,
    FrontRightLeg = 2,
    FrontLeftLeg = 3,
    BackRightHip = 4,
    BackLeftHip = 5,
    BackRightLeg = 6,
    BackLeftLeg = 7,
}

impl Joint {
    /// All joints in channel order
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::FrontRightHip,
        Joint::FrontLeftHip,
        Joint::FrontRightLeg,
        Joint::FrontLeftLeg,
        Joint::BackRightHip,
        Joint::BackLeftHip,
        Joint::BackRightLeg,
        Joint::BackLeftLeg,
    ];

    pub fn channel(self) -> u8 {
        self as u8
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid servo channel: {0} (expected 0..=7)")]
pub struct InvalidChannel(pub i32);

impl TryFrom<i32> for Joint {
    type Error = InvalidChannel;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Joint::ALL.get(i).copied())
            .ok_or(InvalidChannel(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_order() {
        for (i, joint) in Joint::ALL.iter().enumerate() {
            assert_eq!(joint.index(), i);
            assert_eq!(Joint::try_from(i as i32), Ok(*joint));
        }
    }

    #[test]
    fn test_out_of_range_channel() {
        assert_eq!(Joint::try_from(8), Err(InvalidChannel(8)));
        assert_eq!(Joint::try_from(-1), Err(InvalidChannel(-1)));
    }
}
