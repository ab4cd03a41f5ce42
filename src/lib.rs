// agb-savemem/src/lib.rs

//! Save-memory driver for Game Boy Advance cartridges.
//!
//! Cartridge save storage is memory-mapped non-volatile memory behind one of
//! several mutually incompatible command protocols: genuine flash parts
//! answering the JEDEC autodetect handshake, or bootleg cartridges whose
//! "flash" is plain battery RAM mimicking a non-standard protocol. This
//! crate identifies the part non-destructively, binds one concrete driver
//! behind five generic operation slots (program byte, program sector, erase
//! sector, erase chip, wait for write), and paces multi-byte writes against
//! the chip's busy signal under a wall-clock backstop.
//!
//! The save-data manager above decides what to persist and when; this crate
//! only moves bytes and reports 16-bit status codes.

pub mod bus;
pub mod chips;
pub mod detect;
pub mod driver;
pub mod error;
mod wait;

#[cfg(test)]
pub(crate) mod testutil;

pub use bus::{CartridgeBus, FlashTimer, InterruptController, InterruptGuard, IrqLines};
pub use chips::{ChipDescriptor, SectorGeometry, WritePhase, CHIP_BINDINGS};
pub use detect::BootlegKind;
pub use driver::{Binding, SaveMemory};
pub use error::{status_code, FlashError, FlashResult};
