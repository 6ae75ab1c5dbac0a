// Motion coordination for the quadruped
//
// Provides:
// - Motion kinds and the per-automaton lifecycle
// - Phase-indexed gait tables
// - The motion engine: automata, handoff barrier, obstacle avoidance

mod engine;
pub mod gait;

pub use engine::{Automaton, MotionEngine, TickOutput, DROWSY_TICKS, SINGING_TICKS};
pub use gait::{Directive, GaitTable, Phase};

use serde::{Deserialize, Serialize};

/// Which behaviour (automaton + gait table) is running
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionKind {
    Idle = 0,
    Walking = 1,
    AutoWalking = 2,
    TurningLeft = 3,
    TurningRight = 4,
    Dancing = 5,
    Singing = 6,
    DebugSensor = 7,
}

impl MotionKind {
    pub const ALL: [MotionKind; 8] = [
        MotionKind::Idle,
        MotionKind::Walking,
        MotionKind::AutoWalking,
        MotionKind::TurningLeft,
        MotionKind::TurningRight,
        MotionKind::Dancing,
        MotionKind::Singing,
        MotionKind::DebugSensor,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown motion id: {0}")]
pub struct UnknownMotion(pub i32);

impl TryFrom<u8> for MotionKind {
    type Error = UnknownMotion;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        MotionKind::ALL
            .get(id as usize)
            .copied()
            .ok_or(UnknownMotion(id as i32))
    }
}

/// Lifecycle of the active automaton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionPhaseState {
    NotStarted,
    InProgress,
    Completed,
}

/// The running motion and the one asked for next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionRequest {
    pub current: MotionKind,
    pub desired: MotionKind,
}

impl MotionRequest {
    /// A different motion has been asked for
    pub fn switch_pending(&self) -> bool {
        self.current != self.desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_ids_round_trip() {
        for kind in MotionKind::ALL {
            assert_eq!(MotionKind::try_from(kind as u8), Ok(kind));
        }
        assert_eq!(MotionKind::try_from(8), Err(UnknownMotion(8)));
    }
}
