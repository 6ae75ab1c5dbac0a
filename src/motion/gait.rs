// Gait tables: static, phase-indexed choreography per motion
//
// Each phase lists absolute target angles for the joints it moves; joints
// not listed keep their previous target. A cue, when present, is shown on
// the display as the phase starts.

use crate::messages::Expression;
use crate::servo::{Joint, NEUTRAL_ANGLE};

use super::MotionKind;

/// Hip swing for walking and turning (degrees)
pub const STEP_AMPLITUDE: u8 = 20;
/// Foot lift for walking and turning (degrees)
pub const LEG_LIFT: u8 = 10;
/// Hip swing while dancing (degrees)
pub const DANCE_SWING: u8 = 30;
/// Foot lift while dancing (degrees)
pub const DANCE_LIFT: u8 = 20;

const CENTER: u8 = NEUTRAL_ANGLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    pub joint: Joint,
    pub angle: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct Phase {
    pub cue: Option<Expression>,
    pub directives: &'static [Directive],
}

#[derive(Debug)]
pub struct GaitTable {
    pub phases: &'static [Phase],
    /// Ticks until the motion completes, a multiple of the phase count.
    /// None runs until something else ends it.
    pub completion: Option<u16>,
}

impl GaitTable {
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Phase for a tick counter (wraps around the cycle)
    pub fn phase(&self, counter: u16) -> &Phase {
        &self.phases[counter as usize % self.phases.len()]
    }
}

/// Gait table for `kind`, if it has choreography
pub fn table(kind: MotionKind) -> Option<&'static GaitTable> {
    match kind {
        MotionKind::Walking => Some(&WALKING),
        MotionKind::AutoWalking => Some(&AUTO_WALKING),
        MotionKind::TurningLeft => Some(&TURNING_LEFT),
        MotionKind::TurningRight => Some(&TURNING_RIGHT),
        MotionKind::Dancing => Some(&DANCING),
        MotionKind::Idle | MotionKind::Singing | MotionKind::DebugSensor => None,
    }
}

// Builds a phase literal: `phase!(cue: Thinking, FrontRightLeg => 80)`
macro_rules! phase {
    (cue: $cue:ident $(, $joint:ident => $angle:expr)* $(,)?) => {
        Phase {
            cue: Some(Expression::$cue),
            directives: &[$(Directive { joint: Joint::$joint, angle: $angle }),*],
        }
    };
    ($($joint:ident => $angle:expr),* $(,)?) => {
        Phase {
            cue: None,
            directives: &[$(Directive { joint: Joint::$joint, angle: $angle }),*],
        }
    };
}

const fn shared(directives: &'static [Directive]) -> Phase {
    Phase {
        cue: None,
        directives,
    }
}

const fn all_hips(angle: u8) -> [Directive; 4] {
    [
        Directive { joint: Joint::FrontRightHip, angle },
        Directive { joint: Joint::FrontLeftHip, angle },
        Directive { joint: Joint::BackRightHip, angle },
        Directive { joint: Joint::BackLeftHip, angle },
    ]
}

const fn all_legs(angle: u8) -> [Directive; 4] {
    [
        Directive { joint: Joint::FrontRightLeg, angle },
        Directive { joint: Joint::FrontLeftLeg, angle },
        Directive { joint: Joint::BackRightLeg, angle },
        Directive { joint: Joint::BackLeftLeg, angle },
    ]
}

const ALL_HIPS_CENTER: &[Directive] = &all_hips(CENTER);
const ALL_LEGS_DOWN: &[Directive] = &all_legs(CENTER);
const ALL_LEGS_UP: &[Directive] = &all_legs(CENTER - LEG_LIFT);

// Trot: diagonal pairs (front-right + back-left, then front-left +
// back-right) lift, swing forward and land.
const WALK_CYCLE: &[Phase] = &[
    phase!(cue: Thinking, FrontRightLeg => CENTER - LEG_LIFT, BackLeftLeg => CENTER - LEG_LIFT),
    phase!(FrontRightHip => CENTER + STEP_AMPLITUDE, BackLeftHip => CENTER - STEP_AMPLITUDE),
    phase!(FrontRightLeg => CENTER, BackLeftLeg => CENTER),
    phase!(cue: Surprised),
    phase!(FrontLeftLeg => CENTER - LEG_LIFT, BackRightLeg => CENTER - LEG_LIFT),
    phase!(FrontLeftHip => CENTER - STEP_AMPLITUDE, BackRightHip => CENTER + STEP_AMPLITUDE),
    phase!(FrontLeftLeg => CENTER, BackRightLeg => CENTER),
    shared(ALL_HIPS_CENTER),
];

pub static WALKING: GaitTable = GaitTable {
    phases: WALK_CYCLE,
    completion: Some(8 * 8),
};

/// Same trot, stopped only by an obstacle or another motion
pub static AUTO_WALKING: GaitTable = GaitTable {
    phases: WALK_CYCLE,
    completion: None,
};

// Turn in place: lift all feet, rotate all hips, land, lift again,
// recentre hips, land.
const TURN_LEFT_CYCLE: &[Phase] = &[
    shared(ALL_LEGS_UP),
    Phase {
        cue: None,
        directives: &all_hips(CENTER - STEP_AMPLITUDE),
    },
    shared(ALL_LEGS_DOWN),
    shared(ALL_LEGS_UP),
    shared(ALL_HIPS_CENTER),
    shared(ALL_LEGS_DOWN),
];

const TURN_RIGHT_CYCLE: &[Phase] = &[
    shared(ALL_LEGS_UP),
    Phase {
        cue: None,
        directives: &all_hips(CENTER + STEP_AMPLITUDE),
    },
    shared(ALL_LEGS_DOWN),
    shared(ALL_LEGS_UP),
    shared(ALL_HIPS_CENTER),
    shared(ALL_LEGS_DOWN),
];

pub static TURNING_LEFT: GaitTable = GaitTable {
    phases: TURN_LEFT_CYCLE,
    completion: Some(6 * 2),
};

pub static TURNING_RIGHT: GaitTable = GaitTable {
    phases: TURN_RIGHT_CYCLE,
    completion: Some(6 * 2),
};

const HIPS_SHAKE_LEFT: &[Directive] = &all_hips(CENTER - DANCE_SWING / 2);
const HIPS_SHAKE_RIGHT: &[Directive] = &all_hips(CENTER + DANCE_SWING / 2);

const DANCE_CYCLE: &[Phase] = &[
    Phase {
        cue: Some(Expression::Excited),
        directives: &all_legs(CENTER - DANCE_LIFT / 2),
    },
    // bow: front down, back up
    phase!(
        FrontRightLeg => CENTER,
        FrontLeftLeg => CENTER,
        BackRightLeg => CENTER - DANCE_LIFT,
        BackLeftLeg => CENTER - DANCE_LIFT,
    ),
    phase!(
        FrontRightHip => CENTER + DANCE_SWING,
        FrontLeftHip => CENTER - DANCE_SWING,
        BackRightHip => CENTER + DANCE_SWING,
        BackLeftHip => CENTER - DANCE_SWING,
    ),
    phase!(
        FrontRightHip => CENTER - DANCE_SWING,
        FrontLeftHip => CENTER + DANCE_SWING,
        BackRightHip => CENTER - DANCE_SWING,
        BackLeftHip => CENTER + DANCE_SWING,
    ),
    // rear up: front up, back down
    phase!(
        FrontRightLeg => CENTER - DANCE_LIFT,
        FrontLeftLeg => CENTER - DANCE_LIFT,
        BackRightLeg => CENTER,
        BackLeftLeg => CENTER,
    ),
    phase!(
        FrontRightLeg => CENTER - DANCE_LIFT,
        BackLeftLeg => CENTER - DANCE_LIFT,
        FrontLeftLeg => CENTER,
        BackRightLeg => CENTER,
    ),
    phase!(
        cue: Love,
        FrontLeftLeg => CENTER - DANCE_LIFT,
        BackRightLeg => CENTER - DANCE_LIFT,
        FrontRightLeg => CENTER,
        BackLeftLeg => CENTER,
    ),
    shared(HIPS_SHAKE_LEFT),
    shared(HIPS_SHAKE_RIGHT),
    shared(HIPS_SHAKE_LEFT),
    shared(ALL_HIPS_CENTER),
    shared(ALL_LEGS_DOWN),
];

pub static DANCING: GaitTable = GaitTable {
    phases: DANCE_CYCLE,
    completion: Some(12 * 3),
};
