// agb-savemem/src/driver/flash_mx.rs

//! Genuine-chip driver speaking the JEDEC command set shared by the
//! Macronix and Sanyo 1 Mbit parts. Every command is prefixed by the
//! AAh/55h unlock handshake at the two fixed latch addresses; completion
//! is paced by the write-completion state machine.

use crate::bus::{CartridgeBus, FlashTimer, CMD_LATCH, CMD_LATCH2};
use crate::chips::{locate, ChipBinding, WritePhase};
use crate::error::{FlashError, FlashResult};
use crate::wait::wait_for_write;

const CMD_ERASE_SETUP: u8 = 0x80;
const CMD_ERASE_CHIP: u8 = 0x10;
const CMD_ERASE_SECTOR: u8 = 0x30;
const CMD_PROGRAM: u8 = 0xA0;
const CMD_SWITCH_BANK: u8 = 0xB0;

const ERASED: u8 = 0xFF;

/// JEDEC command-set driver for one bound chip.
pub struct MxFlash {
    pub(crate) binding: &'static ChipBinding,
}

impl MxFlash {
    pub(crate) fn new(binding: &'static ChipBinding) -> Self {
        Self { binding }
    }

    fn unlock<B: CartridgeBus>(&self, bus: &mut B) {
        bus.save_write(CMD_LATCH, 0xAA);
        bus.save_write(CMD_LATCH2, 0x55);
    }

    fn command<B: CartridgeBus>(&self, bus: &mut B, command: u8) {
        self.unlock(bus);
        bus.save_write(CMD_LATCH, command);
    }

    /// Issue the bank-select command. Multi-bank parts require this before
    /// any access; no bank state is trusted across calls.
    pub(crate) fn switch_bank<B: CartridgeBus>(&self, bus: &mut B, bank: u8) {
        self.command(bus, CMD_SWITCH_BANK);
        bus.save_write(0, bank);
    }

    fn select<B: CartridgeBus>(&self, bus: &mut B, bank: u8) {
        if self.binding.desc.banked() {
            self.switch_bank(bus, bank);
        }
    }

    pub(crate) fn program_byte<B, T>(
        &self,
        bus: &mut B,
        timer: &mut T,
        sector: u16,
        offset: u32,
        data: u8,
    ) -> FlashResult
    where
        B: CartridgeBus,
        T: FlashTimer,
    {
        let loc = locate(&self.binding.desc, sector, offset)?;
        self.select(bus, loc.bank);
        self.command(bus, CMD_PROGRAM);
        bus.save_write(loc.offset, data);
        wait_for_write(
            bus,
            timer,
            self.binding.max_time,
            WritePhase::ProgramByte,
            loc.offset,
            data,
        )
    }

    /// Erase the sector, then program it byte by byte from `src`, tracking
    /// the countdown in the caller's remaining-bytes counter.
    pub(crate) fn program_sector<B, T>(
        &self,
        bus: &mut B,
        timer: &mut T,
        remaining: &mut u16,
        sector: u16,
        src: &[u8],
    ) -> FlashResult
    where
        B: CartridgeBus,
        T: FlashTimer,
    {
        let size = self.binding.desc.sector.size;
        if src.len() as u32 != size {
            return Err(FlashError::OffsetOutOfRange);
        }
        self.erase_sector(bus, timer, sector)?;

        *remaining = size as u16;
        let mut offset = 0;
        while *remaining > 0 {
            self.program_byte(bus, timer, sector, offset, src[offset as usize])?;
            *remaining -= 1;
            offset += 1;
        }
        Ok(())
    }

    pub(crate) fn erase_sector<B, T>(&self, bus: &mut B, timer: &mut T, sector: u16) -> FlashResult
    where
        B: CartridgeBus,
        T: FlashTimer,
    {
        let loc = locate(&self.binding.desc, sector, 0)?;
        self.select(bus, loc.bank);
        self.command(bus, CMD_ERASE_SETUP);
        self.unlock(bus);
        bus.save_write(loc.offset, CMD_ERASE_SECTOR);
        wait_for_write(
            bus,
            timer,
            self.binding.max_time,
            WritePhase::EraseSector,
            loc.offset,
            ERASED,
        )
    }

    pub(crate) fn erase_chip<B, T>(&self, bus: &mut B, timer: &mut T) -> FlashResult
    where
        B: CartridgeBus,
        T: FlashTimer,
    {
        self.command(bus, CMD_ERASE_SETUP);
        self.command(bus, CMD_ERASE_CHIP);
        wait_for_write(
            bus,
            timer,
            self.binding.max_time,
            WritePhase::EraseChip,
            0,
            ERASED,
        )
    }

    /// Copy `dest.len()` bytes starting at (sector, offset), re-selecting
    /// the bank only when the read crosses a bank boundary.
    pub(crate) fn read<B: CartridgeBus>(
        &self,
        bus: &mut B,
        sector: u16,
        offset: u32,
        dest: &mut [u8],
    ) -> FlashResult {
        let start = crate::chips::locate_span(&self.binding.desc, sector, offset, dest.len() as u32)?;
        let mut bank = start.bank;
        self.select(bus, bank);
        let mut linear = start.linear();
        for slot in dest.iter_mut() {
            let current = (linear / crate::bus::BANK_WINDOW) as u8;
            if current != bank {
                bank = current;
                self.select(bus, bank);
            }
            *slot = bus.save_read(linear % crate::bus::BANK_WINDOW);
            linear += 1;
        }
        Ok(())
    }
}
