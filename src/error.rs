// agb-savemem/src/error.rs

//! Error taxonomy and the 16-bit status codes callers check.

use crate::chips::WritePhase;

/// Errors reported by save-memory operations.
///
/// Every error maps to a fixed 16-bit status code (see [`FlashError::code`]);
/// `0` is success. The driver never retries internally: a timed-out write
/// leaves the chip reset to read mode and the error in the caller's hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// Requested offset lies outside the sector (code 8000h).
    OffsetOutOfRange,
    /// Requested sector lies outside the chip geometry (code 80FFh).
    SectorOutOfRange,
    /// The chip's own busy signal flagged a write overrun (code phase|A000h).
    HardwareTimeout(WritePhase),
    /// The wall-clock budget elapsed with no hardware signal (code phase|C000h).
    SoftTimeout(WritePhase),
}

pub type FlashResult = Result<(), FlashError>;

impl FlashError {
    /// The wire-format status code for this error.
    pub fn code(self) -> u16 {
        match self {
            FlashError::OffsetOutOfRange => 0x8000,
            FlashError::SectorOutOfRange => 0x80FF,
            FlashError::HardwareTimeout(phase) => phase as u16 | 0xA000,
            FlashError::SoftTimeout(phase) => phase as u16 | 0xC000,
        }
    }
}

/// Collapse a result into the 16-bit status code (0 = success).
pub fn status_code(result: FlashResult) -> u16 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

impl std::fmt::Display for FlashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlashError::OffsetOutOfRange => write!(f, "offset out of sector range"),
            FlashError::SectorOutOfRange => write!(f, "sector out of chip range"),
            FlashError::HardwareTimeout(phase) => {
                write!(f, "hardware timeout during {:?}", phase)
            }
            FlashError::SoftTimeout(phase) => {
                write!(f, "software timeout during {:?}", phase)
            }
        }
    }
}

impl std::error::Error for FlashError {}
