// Message types exchanged with teleop, the display and the sensor

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::motion::{MotionKind, MotionPhaseState, UnknownMotion};

/// Command from teleop/scripts -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobotCommand {
    /// Request the next motion (takes effect at the handoff barrier)
    Motion { motion: MotionKind },
    /// Set a channel's trim in degrees
    SetTrim { channel: i32, trim: i32 },
    /// Set a channel's reversal flag
    SetReverse { channel: i32, reversed: bool },
    /// Drive one servo directly and hold the current motion
    TestServo { channel: i32, angle: i32 },
}

/// Angle used by `T <channel>` when no angle is given
pub const DEFAULT_TEST_ANGLE: i32 = 90;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0:?}")]
    UnknownCommand(char),

    #[error("Command {0} needs a channel and a value")]
    MissingArgument(char),

    #[error("Invalid number: {0:?}")]
    InvalidNumber(String),

    #[error(transparent)]
    UnknownMotion(#[from] UnknownMotion),
}

/// Parse one line of the serial text protocol
///
/// `W` walk, `A` auto-walk, `L`/`R` turn, `D` dance, `S` sing, `U` sensor
/// debug, `M <id>` motion by number, `C <ch> <trim>`, `V <ch> <0|1>`,
/// `T <ch> [angle]`.
impl FromStr for RobotCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let mut chars = line.chars();
        let code = chars.next().ok_or(ParseCommandError::Empty)?;
        let mut args = chars.as_str().split_whitespace();

        let motion = |motion: MotionKind| -> Result<Self, ParseCommandError> {
            Ok(RobotCommand::Motion { motion })
        };
        match code {
            'W' => motion(MotionKind::Walking),
            'A' => motion(MotionKind::AutoWalking),
            'L' => motion(MotionKind::TurningLeft),
            'R' => motion(MotionKind::TurningRight),
            'D' => motion(MotionKind::Dancing),
            'S' => motion(MotionKind::Singing),
            'U' => motion(MotionKind::DebugSensor),
            'M' => {
                let id = required(&mut args, code)?;
                let id = u8::try_from(id).map_err(|_| UnknownMotion(id))?;
                motion(MotionKind::try_from(id)?)
            }
            'C' => Ok(RobotCommand::SetTrim {
                channel: required(&mut args, code)?,
                trim: required(&mut args, code)?,
            }),
            'V' => Ok(RobotCommand::SetReverse {
                channel: required(&mut args, code)?,
                reversed: required(&mut args, code)? != 0,
            }),
            'T' => Ok(RobotCommand::TestServo {
                channel: required(&mut args, code)?,
                angle: args
                    .next()
                    .map(parse_number)
                    .transpose()?
                    .unwrap_or(DEFAULT_TEST_ANGLE),
            }),
            other => Err(ParseCommandError::UnknownCommand(other)),
        }
    }
}

fn required<'a>(
    args: &mut impl Iterator<Item = &'a str>,
    code: char,
) -> Result<i32, ParseCommandError> {
    args.next()
        .ok_or(ParseCommandError::MissingArgument(code))
        .and_then(parse_number)
}

fn parse_number(token: &str) -> Result<i32, ParseCommandError> {
    token
        .parse()
        .map_err(|_| ParseCommandError::InvalidNumber(token.to_string()))
}

/// Face shown on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Happy,
    Confused,
    Thinking,
    Excited,
    Love,
    Angry,
    Sleepy,
    Surprised,
}

impl Expression {
    pub fn as_str(self) -> &'static str {
        match self {
            Expression::Happy => "happy",
            Expression::Confused => "confused",
            Expression::Thinking => "thinking",
            Expression::Excited => "excited",
            Expression::Love => "love",
            Expression::Angry => "angry",
            Expression::Sleepy => "sleepy",
            Expression::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status published by the runtime every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub motion: MotionKind,
    pub desired: MotionKind,
    pub phase: MotionPhaseState,
    pub counter: u16,
    pub distance: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_motion_commands() {
        assert_eq!(
            "W".parse::<RobotCommand>(),
            Ok(RobotCommand::Motion { motion: MotionKind::Walking })
        );
        assert_eq!(
            " A\r".parse::<RobotCommand>(),
            Ok(RobotCommand::Motion { motion: MotionKind::AutoWalking })
        );
        assert_eq!(
            "M 5".parse::<RobotCommand>(),
            Ok(RobotCommand::Motion { motion: MotionKind::Dancing })
        );
    }

    #[test]
    fn test_parse_unknown_motion_id() {
        assert_eq!(
            "M 42".parse::<RobotCommand>(),
            Err(ParseCommandError::UnknownMotion(UnknownMotion(42)))
        );
        assert_eq!(
            "M -1".parse::<RobotCommand>(),
            Err(ParseCommandError::UnknownMotion(UnknownMotion(-1)))
        );
    }

    #[test]
    fn test_parse_calibration_commands() {
        assert_eq!(
            "C 3 -15".parse::<RobotCommand>(),
            Ok(RobotCommand::SetTrim { channel: 3, trim: -15 })
        );
        assert_eq!(
            "C3   20".parse::<RobotCommand>(),
            Ok(RobotCommand::SetTrim { channel: 3, trim: 20 })
        );
        assert_eq!(
            "V 7 1".parse::<RobotCommand>(),
            Ok(RobotCommand::SetReverse { channel: 7, reversed: true })
        );
        assert_eq!(
            "C 3".parse::<RobotCommand>(),
            Err(ParseCommandError::MissingArgument('C'))
        );
        assert_eq!(
            "V x 1".parse::<RobotCommand>(),
            Err(ParseCommandError::InvalidNumber("x".to_string()))
        );
    }

    #[test]
    fn test_parse_test_servo_default_angle() {
        assert_eq!(
            "T 2".parse::<RobotCommand>(),
            Ok(RobotCommand::TestServo { channel: 2, angle: DEFAULT_TEST_ANGLE })
        );
        assert_eq!(
            "T 2 45".parse::<RobotCommand>(),
            Ok(RobotCommand::TestServo { channel: 2, angle: 45 })
        );
    }

    #[test]
    fn test_parse_unknown_and_empty() {
        assert_eq!("".parse::<RobotCommand>(), Err(ParseCommandError::Empty));
        assert_eq!(
            "Q".parse::<RobotCommand>(),
            Err(ParseCommandError::UnknownCommand('Q'))
        );
    }

    #[test]
    fn test_command_json() {
        let cmd: RobotCommand =
            serde_json::from_str(r#"{"type":"set_trim","channel":1,"trim":-5}"#).unwrap();
        assert_eq!(cmd, RobotCommand::SetTrim { channel: 1, trim: -5 });

        let json = serde_json::to_string(&RobotCommand::Motion {
            motion: MotionKind::TurningLeft,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"motion","motion":"turning_left"}"#);
    }
}
