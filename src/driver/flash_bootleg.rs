// agb-savemem/src/driver/flash_bootleg.rs

//! Bootleg / plain-SRAM backend.
//!
//! On these cartridges the save window is ordinary writable memory, so the
//! five operation slots reduce to direct stores and fills with no busy
//! interval. Persistence is the real work: the RAM mirror is serialized
//! into the flash-mapped ROM window using whichever non-standard protocol
//! the detector classified, inside one interrupt-masked critical section.
//! On real hardware the serializer must execute from work RAM, since the
//! window being written is unreadable mid-operation. An interruption
//! mid-write has no resumption protocol; retry policy belongs to the
//! save-data manager above.

use crate::bus::{
    CartridgeBus, InterruptController, InterruptGuard, IrqLines, MIRROR_SIZE,
};
use crate::chips::{locate, locate_span, ChipBinding};
use crate::detect::BootlegKind;
use crate::error::{FlashError, FlashResult};
use log::info;

const ERASED: u8 = 0xFF;

/// Intel-family status: operation-complete signature.
const INTEL_READY: u16 = 0x80;

/// Emulation driver over the battery-RAM mirror.
pub struct BootlegSram {
    pub(crate) binding: &'static ChipBinding,
    pub(crate) kind: BootlegKind,
    /// Byte offset of the persistence window within the ROM-mapped flash.
    /// Computed once at detection; never recomputed.
    pub(crate) window: u32,
}

impl BootlegSram {
    pub(crate) fn new(binding: &'static ChipBinding, kind: BootlegKind, window: u32) -> Self {
        Self {
            binding,
            kind,
            window,
        }
    }

    pub(crate) fn program_byte<B: CartridgeBus>(
        &self,
        bus: &mut B,
        sector: u16,
        offset: u32,
        data: u8,
    ) -> FlashResult {
        let loc = locate(&self.binding.desc, sector, offset)?;
        bus.save_write(loc.linear(), data);
        Ok(())
    }

    pub(crate) fn program_sector<B: CartridgeBus>(
        &self,
        bus: &mut B,
        remaining: &mut u16,
        sector: u16,
        src: &[u8],
    ) -> FlashResult {
        let size = self.binding.desc.sector.size;
        if src.len() as u32 != size {
            return Err(FlashError::OffsetOutOfRange);
        }
        self.erase_sector(bus, sector)?;

        *remaining = size as u16;
        let base = locate(&self.binding.desc, sector, 0)?.linear();
        let mut offset = 0;
        while *remaining > 0 {
            bus.save_write(base + offset, src[offset as usize]);
            *remaining -= 1;
            offset += 1;
        }
        Ok(())
    }

    pub(crate) fn erase_sector<B: CartridgeBus>(&self, bus: &mut B, sector: u16) -> FlashResult {
        let loc = locate(&self.binding.desc, sector, 0)?;
        let base = loc.linear();
        for i in 0..self.binding.desc.sector.size {
            bus.save_write(base + i, ERASED);
        }
        Ok(())
    }

    pub(crate) fn erase_chip<B: CartridgeBus>(&self, bus: &mut B) -> FlashResult {
        for i in 0..self.binding.desc.capacity {
            bus.save_write(i, ERASED);
        }
        Ok(())
    }

    pub(crate) fn read<B: CartridgeBus>(
        &self,
        bus: &mut B,
        sector: u16,
        offset: u32,
        dest: &mut [u8],
    ) -> FlashResult {
        let start = locate_span(&self.binding.desc, sector, offset, dest.len() as u32)?;
        let mut linear = start.linear();
        for slot in dest.iter_mut() {
            *slot = bus.save_read(linear);
            linear += 1;
        }
        Ok(())
    }

    /// Copy the persistence window back into the RAM mirror (power-on
    /// restore).
    pub(crate) fn restore<B: CartridgeBus>(&self, bus: &mut B) {
        for i in 0..MIRROR_SIZE {
            let byte = bus.rom_read(self.window + i);
            bus.save_write(i, byte);
        }
    }

    /// Serialize the full RAM mirror into the persistence window using the
    /// detected protocol. No-op on genuine flash (`BootlegKind::None`).
    pub(crate) fn persist<B, I>(&self, bus: &mut B, irq: &mut I)
    where
        B: CartridgeBus,
        I: InterruptController,
    {
        if self.kind == BootlegKind::None {
            return;
        }
        info!(
            "persisting save mirror via {:?} protocol at {:#x}",
            self.kind, self.window
        );

        let _guard = InterruptGuard::mask(irq, IrqLines::GAME_PAK);
        let sa = self.window;
        match self.kind {
            BootlegKind::Intel => self.persist_intel(bus, sa),
            BootlegKind::AmdScrambled => self.persist_amd(bus, sa, 0xA9, 0x56),
            BootlegKind::Amd => self.persist_amd(bus, sa, 0xAA, 0x55),
            BootlegKind::IntelBuffered => self.persist_intel_buffered(bus, sa),
            BootlegKind::None => unreachable!(),
        }
    }

    fn mirror_half<B: CartridgeBus>(&self, bus: &mut B, offset: u32) -> u16 {
        u16::from(bus.save_read(offset)) | u16::from(bus.save_read(offset + 1)) << 8
    }

    fn persist_intel<B: CartridgeBus>(&self, bus: &mut B, sa: u32) {
        // Sector erase, then word programming, polling the ready signature
        // at the sector base.
        bus.rom_write_half(sa, 0xFF);
        bus.rom_write_half(sa, 0x60);
        bus.rom_write_half(sa, 0xD0);
        bus.rom_write_half(sa, 0x20);
        bus.rom_write_half(sa, 0xD0);
        while bus.rom_read_half(sa) != INTEL_READY {}
        bus.rom_write_half(sa, 0xFF);

        for i in (0..MIRROR_SIZE).step_by(2) {
            bus.rom_write_half(sa + i, 0x40);
            let half = self.mirror_half(bus, i);
            bus.rom_write_half(sa + i, half);
            while bus.rom_read_half(sa) != INTEL_READY {}
        }
        bus.rom_write_half(sa, 0xFF);
    }

    fn persist_amd<B: CartridgeBus>(&self, bus: &mut B, sa: u32, magic0: u16, magic1: u16) {
        bus.rom_write_half(sa, 0xF0);
        bus.rom_write_half(0xAAA, magic0);
        bus.rom_write_half(0x555, magic1);
        bus.rom_write_half(0xAAA, 0x80);
        bus.rom_write_half(0xAAA, magic0);
        bus.rom_write_half(0x555, magic1);
        bus.rom_write_half(sa, 0x30);
        while bus.rom_read_half(sa) != 0xFFFF {}
        bus.rom_write_half(sa, 0xF0);

        for i in (0..MIRROR_SIZE).step_by(2) {
            bus.rom_write_half(0xAAA, magic0);
            bus.rom_write_half(0x555, magic1);
            bus.rom_write_half(0xAAA, 0xA0);
            let half = self.mirror_half(bus, i);
            bus.rom_write_half(sa + i, half);
            while bus.rom_read_half(sa + i) != half {}
        }
        bus.rom_write_half(sa, 0xF0);
    }

    fn persist_intel_buffered<B: CartridgeBus>(&self, bus: &mut B, sa: u32) {
        bus.rom_write_half(sa, 0xFF);
        bus.rom_write_half(sa, 0x60);
        bus.rom_write_half(sa, 0xD0);
        bus.rom_write_half(sa, 0x20);
        bus.rom_write_half(sa, 0xD0);
        while bus.rom_read_half(sa) & INTEL_READY != INTEL_READY {}
        bus.rom_write_half(sa, 0xFF);

        // 1 KiB buffered blocks: load command, stage 512 halfwords,
        // confirm, poll the busy bit, advance.
        let mut block = 0;
        while block < MIRROR_SIZE {
            bus.rom_write_half(sa + block, 0xEA);
            while bus.rom_read_half(sa + block) & INTEL_READY != INTEL_READY {}
            bus.rom_write_half(sa + block, 0x1FF);
            for i in (0..1024).step_by(2) {
                let half = self.mirror_half(bus, block + i);
                bus.rom_write_half(sa + block + i, half);
            }
            bus.rom_write_half(sa + block, 0xD0);
            while bus.rom_read_half(sa + block) & INTEL_READY != INTEL_READY {}
            bus.rom_write_half(sa + block, 0xFF);
            block += 1024;
        }
    }
}
