// agb-savemem/src/bus.rs

//! Hardware collaborator traits.
//!
//! All protocol traffic is ordinary reads and writes into two memory-mapped
//! windows of the cartridge bus: the save window (the 64 KiB bank view at
//! 0E000000h where the flash chip or SRAM answers) and the ROM window
//! (08000000h, where bootleg cartridges accept halfword command writes).
//! Keeping the raw address space behind one narrow trait lets every driver
//! run unchanged against real hardware or a simulated cartridge.

use bitflags::bitflags;

/// Size of the directly addressable save window (one flash bank).
pub const BANK_WINDOW: u32 = 0x10000;

/// Size of the battery RAM mirror serialized by bootleg persistence.
pub const MIRROR_SIZE: u32 = 0x10000;

/// Command latch addresses within the save window.
pub const CMD_LATCH: u32 = 0x5555;
pub const CMD_LATCH2: u32 = 0x2AAA;

/// Memory-mapped cartridge bus.
///
/// Reads take `&mut self`: a flash chip in identify or status mode answers
/// reads from internal state, so even loads are protocol interactions.
pub trait CartridgeBus {
    /// Read one byte from the save window (current bank).
    fn save_read(&mut self, offset: u32) -> u8;

    /// Write one byte into the save window (command latches and data).
    fn save_write(&mut self, offset: u32, data: u8);

    /// Read one byte from the ROM window.
    fn rom_read(&mut self, offset: u32) -> u8;

    /// Read one halfword from the ROM window (completion polls).
    fn rom_read_half(&mut self, offset: u32) -> u16;

    /// Write one halfword into the ROM window (bootleg command writes).
    fn rom_write_half(&mut self, offset: u32, data: u16);

    /// Configure the save-region waitstates (read/write bus cycles).
    fn set_save_timing(&mut self, read: u8, write: u8);
}

bitflags! {
    /// Interrupt request lines relevant to the save-memory driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqLines: u16 {
        const VBLANK   = 1 << 0;
        const TIMER3   = 1 << 6;
        const GAME_PAK = 1 << 13;
    }
}

/// Interrupt controller: global enable flag plus a per-line enable mask.
pub trait InterruptController {
    fn master_enabled(&self) -> bool;
    fn set_master_enabled(&mut self, on: bool);
    fn enabled_lines(&self) -> IrqLines;
    fn set_enabled_lines(&mut self, lines: IrqLines);
}

/// Scoped critical section: masks the master flag and the given lines on
/// construction, restores the saved state when dropped. Probing and
/// persistence hold one of these for their full duration.
pub struct InterruptGuard<'a, I: InterruptController + ?Sized> {
    irq: &'a mut I,
    saved_master: bool,
    saved_lines: IrqLines,
}

impl<'a, I: InterruptController + ?Sized> InterruptGuard<'a, I> {
    pub fn mask(irq: &'a mut I, lines: IrqLines) -> Self {
        let saved_master = irq.master_enabled();
        let saved_lines = irq.enabled_lines();
        irq.set_master_enabled(false);
        irq.set_enabled_lines(saved_lines & !lines);
        Self {
            irq,
            saved_master,
            saved_lines,
        }
    }
}

impl<I: InterruptController + ?Sized> Drop for InterruptGuard<'_, I> {
    fn drop(&mut self) {
        self.irq.set_enabled_lines(self.saved_lines);
        self.irq.set_master_enabled(self.saved_master);
    }
}

/// Periodic timer service bounding timed flash operations.
///
/// `start` arms the timer with a millisecond budget and `expired` reports
/// the shared elapsed flag the timer interrupt asserts. Only one wait may
/// be outstanding at a time; every wait brackets the timer with
/// `start`/`stop`.
pub trait FlashTimer {
    fn start(&mut self, limit_ms: u16);
    fn stop(&mut self);
    fn expired(&self) -> bool;
}
