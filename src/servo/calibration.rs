// Per-servo calibration: trim offset and direction reversal
//
// The store owns a fixed 16-byte record in a byte-addressable persistent
// region. The record holds two independently validated sections:
//
//   [0..2]   trim marker (0xABC1, big-endian)
//   [2]      trim schema version
//   [3..11]  trims, one signed byte per channel
//   [11..13] reversal marker (0xABCD, big-endian)
//   [13]     reversal schema version
//   [14]     reversal flags, bit n = channel n
//   [15]     reserved
//
// A section whose marker or version does not match is reset to defaults and
// written back, so trims and reversal flags recover independently.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::joint::{InvalidChannel, JOINT_COUNT, Joint};

/// Size of the record owned by the store
pub const RECORD_LEN: usize = 16;

pub const SCHEMA_VERSION: u8 = 1;

const TRIM_MAGIC: u16 = 0xABC1;
const TRIM_MAGIC_ADDR: usize = 0;
const TRIM_VERSION_ADDR: usize = 2;
const TRIM_OFFSET: usize = 3;

const REVERSE_MAGIC: u16 = 0xABCD;
const REVERSE_MAGIC_ADDR: usize = 11;
const REVERSE_VERSION_ADDR: usize = 13;
const REVERSE_OFFSET: usize = 14;

/// Valid trim range in degrees
pub const TRIM_MIN: i32 = -90;
pub const TRIM_MAX: i32 = 90;

/// Factory trims, measured on the reference chassis
pub const DEFAULT_TRIMS: [i8; JOINT_COUNT] = [-20, 10, 0, 0, 0, 0, 10, 0];

/// Value of an erased (never written) persistent cell
const ERASED: u8 = 0xFF;

/// Error types for calibration persistence
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Calibration file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Rejected calibration mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CalibrationError {
    #[error(transparent)]
    Channel(#[from] InvalidChannel),

    #[error("Trim {0} out of range (-90..=90)")]
    TrimOutOfRange(i32),
}

/// Byte-addressable non-volatile storage (EEPROM-like)
pub trait PersistentRegion {
    fn read(&self, address: usize) -> u8;
    fn write(&mut self, address: usize, value: u8);

    /// Make previous writes durable
    fn commit(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Volatile region, starts erased
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    bytes: [u8; RECORD_LEN],
}

impl MemoryRegion {
    pub fn new() -> Self {
        Self {
            bytes: [ERASED; RECORD_LEN],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for MemoryRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentRegion for MemoryRegion {
    fn read(&self, address: usize) -> u8 {
        self.bytes.get(address).copied().unwrap_or(ERASED)
    }

    fn write(&mut self, address: usize, value: u8) {
        if let Some(cell) = self.bytes.get_mut(address) {
            *cell = value;
        }
    }
}

/// Region backed by a small binary file, rewritten whole on commit
#[derive(Debug)]
pub struct FileRegion {
    path: PathBuf,
    bytes: [u8; RECORD_LEN],
}

impl FileRegion {
    /// Open the image at `path`. A missing file reads as erased.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut bytes = [ERASED; RECORD_LEN];

        match fs::read(&path) {
            Ok(data) => {
                let n = data.len().min(RECORD_LEN);
                bytes[..n].copy_from_slice(&data[..n]);
                debug!("Read {} calibration bytes from {}", data.len(), path.display());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No calibration file at {}, starting erased", path.display());
            }
            Err(source) => return Err(StorageError::Io { path, source }),
        }

        Ok(Self { path, bytes })
    }
}

impl PersistentRegion for FileRegion {
    fn read(&self, address: usize) -> u8 {
        self.bytes.get(address).copied().unwrap_or(ERASED)
    }

    fn write(&mut self, address: usize, value: u8) {
        if let Some(cell) = self.bytes.get_mut(address) {
            *cell = value;
        }
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        // Write-then-rename so a reader never sees a half-written record
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, self.bytes)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|source| StorageError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

/// Calibration of a single channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    pub trim: i8,
    pub reversed: bool,
}

/// Persisted trim and reversal table for all channels
pub struct CalibrationStore<R: PersistentRegion> {
    region: R,
    trims: [i8; JOINT_COUNT],
    reversed: [bool; JOINT_COUNT],
}

impl<R: PersistentRegion> CalibrationStore<R> {
    /// Create a store over `region` and load it, repairing invalid sections
    pub fn open(region: R) -> Self {
        let mut store = Self {
            region,
            trims: DEFAULT_TRIMS,
            reversed: [false; JOINT_COUNT],
        };
        store.load();
        store
    }

    /// Read both sections. A section with a bad marker is reset to defaults
    /// and persisted immediately.
    pub fn load(&mut self) {
        let mut repaired = false;

        if self.section_valid(TRIM_MAGIC_ADDR, TRIM_MAGIC, TRIM_VERSION_ADDR) {
            for joint in Joint::ALL {
                let raw = self.region.read(TRIM_OFFSET + joint.index()) as i8;
                if (TRIM_MIN..=TRIM_MAX).contains(&(raw as i32)) {
                    self.trims[joint.index()] = raw;
                } else {
                    warn!("Invalid trim {} for {:?}, resetting to 0", raw, joint);
                    self.trims[joint.index()] = 0;
                }
            }
        } else {
            warn!("Trim table missing or corrupt, restoring defaults");
            self.trims = DEFAULT_TRIMS;
            self.write_trims();
            repaired = true;
        }

        if self.section_valid(REVERSE_MAGIC_ADDR, REVERSE_MAGIC, REVERSE_VERSION_ADDR) {
            let flags = self.region.read(REVERSE_OFFSET);
            for joint in Joint::ALL {
                self.reversed[joint.index()] = flags & (1 << joint.channel()) != 0;
            }
        } else {
            warn!("Reversal table missing or corrupt, restoring defaults");
            self.reversed = [false; JOINT_COUNT];
            self.write_reversal();
            repaired = true;
        }

        if repaired {
            self.commit();
        }
        debug!("Calibration loaded: {:?}", self.entries());
    }

    /// Write marker and entries of both sections
    pub fn store(&mut self) {
        self.write_trims();
        self.write_reversal();
        self.commit();
    }

    pub fn get(&self, joint: Joint) -> CalibrationEntry {
        CalibrationEntry {
            trim: self.trims[joint.index()],
            reversed: self.reversed[joint.index()],
        }
    }

    pub fn entries(&self) -> [CalibrationEntry; JOINT_COUNT] {
        Joint::ALL.map(|joint| self.get(joint))
    }

    /// Set the trim of `channel` and persist it
    pub fn set_trim(&mut self, channel: i32, trim: i32) -> Result<(), CalibrationError> {
        let joint = Joint::try_from(channel)?;
        if !(TRIM_MIN..=TRIM_MAX).contains(&trim) {
            return Err(CalibrationError::TrimOutOfRange(trim));
        }

        info!("Setting trim for {:?} to {}", joint, trim);
        self.trims[joint.index()] = trim as i8;
        self.store();
        Ok(())
    }

    /// Set the reversal flag of `channel` and persist it
    pub fn set_reversed(&mut self, channel: i32, reversed: bool) -> Result<(), CalibrationError> {
        let joint = Joint::try_from(channel)?;

        info!("Setting reversal for {:?} to {}", joint, reversed);
        self.reversed[joint.index()] = reversed;
        self.store();
        Ok(())
    }

    /// Give back the underlying region (e.g. to reopen it)
    pub fn into_region(self) -> R {
        self.region
    }

    fn section_valid(&self, magic_addr: usize, magic: u16, version_addr: usize) -> bool {
        let stored = u16::from_be_bytes([
            self.region.read(magic_addr),
            self.region.read(magic_addr + 1),
        ]);
        stored == magic && self.region.read(version_addr) == SCHEMA_VERSION
    }

    fn write_trims(&mut self) {
        let [hi, lo] = TRIM_MAGIC.to_be_bytes();
        self.region.write(TRIM_MAGIC_ADDR, hi);
        self.region.write(TRIM_MAGIC_ADDR + 1, lo);
        self.region.write(TRIM_VERSION_ADDR, SCHEMA_VERSION);
        for (i, &trim) in self.trims.iter().enumerate() {
            self.region.write(TRIM_OFFSET + i, trim as u8);
        }
    }

    fn write_reversal(&mut self) {
        let [hi, lo] = REVERSE_MAGIC.to_be_bytes();
        self.region.write(REVERSE_MAGIC_ADDR, hi);
        self.region.write(REVERSE_MAGIC_ADDR + 1, lo);
        self.region.write(REVERSE_VERSION_ADDR, SCHEMA_VERSION);
        let flags = self
            .reversed
            .iter()
            .enumerate()
            .filter(|&(_, &r)| r)
            .fold(0u8, |acc, (i, _)| acc | (1 << i));
        self.region.write(REVERSE_OFFSET, flags);
    }

    fn commit(&mut self) {
        // Never fatal: keep running on the in-memory values
        if let Err(e) = self.region.commit() {
            warn!("Failed to persist calibration: {}", e);
        }
    }
}
