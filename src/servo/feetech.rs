// Feetech STS serial bus servo protocol (position mode)
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Joint angles 0..=180 degrees are mapped onto the half turn of the
// 12-bit position range centred at 2048.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

const HEADER: [u8; 2] = [0xFF, 0xFF];
const BROADCAST_ID: u8 = 0xFE;

/// Position steps per full revolution
const STEPS_PER_REVOLUTION: u32 = 4096;
/// Position of the 0 degree joint angle (90 degrees sits at 2048)
const ZERO_ANGLE_POSITION: u16 = 1024;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register addresses used by the runtime
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    OperatingMode = 33,   // 1 byte: 0=position
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalPosition = 42,    // 2 bytes
    Lock = 55,            // 1 byte: 0=unlocked, 1=locked
}

const POSITION_MODE: u8 = 0;

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Convert a joint angle (0..=180 degrees) to a goal position
pub fn angle_to_position(angle: u8) -> u16 {
    let angle = angle.min(180) as u32;
    ZERO_ANGLE_POSITION + (angle * STEPS_PER_REVOLUTION / 360) as u16
}

/// Feetech servo bus - handles serial communication with the servos
pub struct FeetechBus {
    port: Box<dyn SerialPort>,
}

impl FeetechBus {
    pub fn open(port_name: &str) -> Result<Self> {
        let port = serialport::new(port_name, DEFAULT_BAUDRATE)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Checksum over everything after the header
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FeetechError::Timeout { id: expected_id }
            } else {
                FeetechError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let [id, length] = id_length;

        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }

        // error + params + checksum
        let mut remaining = vec![0u8; length as usize];
        self.port.read_exact(&mut remaining)?;

        let (body, checksum) = remaining.split_at(remaining.len() - 1);
        let mut checksum_data = vec![id, length];
        checksum_data.extend_from_slice(body);
        if Self::checksum(&checksum_data) != checksum[0] {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        if body[0] != 0 {
            return Err(FeetechError::ServoError { id, status: body[0] });
        }

        Ok(body[1..].to_vec())
    }

    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let packet = Self::build_packet(id, Instruction::Write, &[register as u8, value]);
        debug!("Write u8 to servo {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;
        self.read_response(id).map(|_| ())
    }

    /// Write the same 2-byte register on several servos in one packet
    /// data: [(id, value), ...]
    pub fn sync_write_u16(&mut self, register: Register, data: &[(u8, u16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        // [start_addr, data_length, id1, lo1, hi1, id2, lo2, hi2, ...]
        let mut params = vec![register as u8, 2];
        for &(id, value) in data {
            params.push(id);
            params.extend_from_slice(&value.to_le_bytes());
        }

        let packet = Self::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        debug!("Sync write to {} servos: reg={:?}", data.len(), register);
        // Broadcast packets get no status reply
        self.send_packet(&packet)
    }

    /// Put a servo in position mode and hold torque
    pub fn enable_position_control(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)?;
        self.write_u8(id, Register::OperatingMode, POSITION_MODE)?;
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Send goal angles (degrees) to several servos at once
    pub fn sync_write_angles(&mut self, data: &[(u8, u8)]) -> Result<()> {
        let positions: Vec<(u8, u16)> = data
            .iter()
            .map(|&(id, angle)| (id, angle_to_position(angle)))
            .collect();
        self.sync_write_u16(Register::GoalPosition, &positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(FeetechBus::checksum(&data), 215);
    }

    #[test]
    fn test_angle_to_position() {
        assert_eq!(angle_to_position(0), 1024);
        assert_eq!(angle_to_position(90), 2048);
        assert_eq!(angle_to_position(180), 3072);
        // Out of range angles saturate
        assert_eq!(angle_to_position(255), 3072);
    }

    #[test]
    fn test_build_sync_write_packet() {
        let packet = FeetechBus::build_packet(
            BROADCAST_ID,
            Instruction::SyncWrite,
            &[Register::GoalPosition as u8, 2, 1, 0x00, 0x08],
        );
        assert_eq!(&packet[..5], &[0xFF, 0xFF, 0xFE, 7, 0x83]);
        assert_eq!(packet.len(), 11);
        assert_eq!(packet[10], FeetechBus::checksum(&packet[2..10]));
    }
}
