// agb-savemem/src/driver/mod.rs

//! Driver binding and the save-memory context.
//!
//! Detection selects exactly one concrete driver and the selection never
//! changes for the life of the context; higher layers reach storage only
//! through the generic operation slots dispatched here.

pub mod flash_bootleg;
pub mod flash_mx;

pub use flash_bootleg::BootlegSram;
pub use flash_mx::MxFlash;

use crate::bus::{CartridgeBus, FlashTimer, InterruptController};
use crate::chips::{sentinel_binding, BindingKind, ChipDescriptor, WritePhase, CHIP_BINDINGS};
use crate::detect::{detect_bootleg, locate_save_window, read_flash_id, BootlegKind};
use crate::error::FlashResult;
use crate::wait::wait_for_write;
use log::{info, warn};

/// The one active driver, chosen at detection time. Both genuine vendors
/// share the JEDEC command engine and differ only by descriptor; the real
/// behavioral split is flash versus SRAM emulation.
pub enum Binding {
    Flash(MxFlash),
    Sram(BootlegSram),
}

/// Save-memory service context: the bound driver plus the hardware
/// collaborators it drives. Built once by [`SaveMemory::detect`]; there is
/// no rebinding and no teardown.
pub struct SaveMemory<B, T, I> {
    bus: B,
    timer: T,
    irq: I,
    binding: Binding,
    /// Bytes left in an in-progress multi-byte sector program.
    remaining: u16,
}

impl<B, T, I> SaveMemory<B, T, I>
where
    B: CartridgeBus,
    T: FlashTimer,
    I: InterruptController,
{
    /// Identify the cartridge and bind a driver.
    ///
    /// Bootleg probing runs first; a hit binds the emulation backend,
    /// resolves the persistence window and restores its contents into the
    /// RAM mirror. Otherwise the JEDEC identity is read and matched against
    /// the static binding table. The returned code is 0 on a positive
    /// identification and 1 when the sentinel fallback was bound; either
    /// way every operation slot is usable.
    pub fn detect(mut bus: B, mut timer: T, mut irq: I) -> (u16, Self) {
        let kind = detect_bootleg(&mut bus, &mut irq);
        if kind != BootlegKind::None {
            let binding = &CHIP_BINDINGS[2];
            debug_assert_eq!(binding.kind, BindingKind::Sram);
            let window = locate_save_window(&mut bus);
            info!(
                "bootleg cartridge ({:?}), persistence window at {:#x}",
                kind, window
            );
            let driver = BootlegSram::new(binding, kind, window);
            driver.restore(&mut bus);
            return (
                0,
                Self {
                    bus,
                    timer,
                    irq,
                    binding: Binding::Sram(driver),
                    remaining: 0,
                },
            );
        }

        // Conservative bus timing while the identity of the part is still
        // unknown.
        bus.set_save_timing(8, 8);
        let id = read_flash_id(&mut bus, &mut timer);

        let mut matched = sentinel_binding();
        let mut code = 1;
        for binding in &CHIP_BINDINGS {
            if binding.desc.maker_id == 0 {
                break;
            }
            if binding.desc.id() == id {
                matched = binding;
                code = 0;
                break;
            }
        }

        if code == 0 {
            info!("flash identity {:04X} matched {}", id, matched.name);
        } else {
            warn!(
                "flash identity {:04X} unrecognized, binding {} fallback",
                id, matched.name
            );
        }
        bus.set_save_timing(matched.desc.wait[0], matched.desc.wait[1]);

        let binding = match matched.kind {
            BindingKind::Flash => Binding::Flash(MxFlash::new(matched)),
            BindingKind::Sram => Binding::Sram(BootlegSram::new(matched, BootlegKind::None, 0)),
        };
        (
            code,
            Self {
                bus,
                timer,
                irq,
                binding,
                remaining: 0,
            },
        )
    }

    /// The active chip descriptor.
    pub fn descriptor(&self) -> &'static ChipDescriptor {
        match &self.binding {
            Binding::Flash(d) => &d.binding.desc,
            Binding::Sram(d) => &d.binding.desc,
        }
    }

    /// The detected bootleg protocol family (`None` on genuine flash and on
    /// plain-SRAM carts).
    pub fn bootleg_kind(&self) -> BootlegKind {
        match &self.binding {
            Binding::Flash(_) => BootlegKind::None,
            Binding::Sram(d) => d.kind,
        }
    }

    /// Program a single byte at (sector, offset).
    pub fn program_byte(&mut self, sector: u16, offset: u32, data: u8) -> FlashResult {
        match &self.binding {
            Binding::Flash(d) => d.program_byte(&mut self.bus, &mut self.timer, sector, offset, data),
            Binding::Sram(d) => d.program_byte(&mut self.bus, sector, offset, data),
        }
    }

    /// Erase a sector and program it from `src`, which must be exactly one
    /// sector long.
    pub fn program_sector(&mut self, sector: u16, src: &[u8]) -> FlashResult {
        match &self.binding {
            Binding::Flash(d) => {
                d.program_sector(&mut self.bus, &mut self.timer, &mut self.remaining, sector, src)
            }
            Binding::Sram(d) => d.program_sector(&mut self.bus, &mut self.remaining, sector, src),
        }
    }

    /// Erase one sector back to FFh.
    pub fn erase_sector(&mut self, sector: u16) -> FlashResult {
        match &self.binding {
            Binding::Flash(d) => d.erase_sector(&mut self.bus, &mut self.timer, sector),
            Binding::Sram(d) => d.erase_sector(&mut self.bus, sector),
        }
    }

    /// Erase the whole chip back to FFh.
    pub fn erase_chip(&mut self) -> FlashResult {
        match &self.binding {
            Binding::Flash(d) => d.erase_chip(&mut self.bus, &mut self.timer),
            Binding::Sram(d) => d.erase_chip(&mut self.bus),
        }
    }

    /// Wait for an in-flight write to land: poll `addr` until it reads back
    /// `expected` under the phase's time budget. Immediate success on the
    /// emulation backend, whose stores are synchronous.
    pub fn wait_for_write(&mut self, phase: WritePhase, addr: u32, expected: u8) -> FlashResult {
        match &self.binding {
            Binding::Flash(d) => wait_for_write(
                &mut self.bus,
                &mut self.timer,
                d.binding.max_time,
                phase,
                addr,
                expected,
            ),
            Binding::Sram(_) => Ok(()),
        }
    }

    /// Whole-buffer read starting at (sector, offset).
    pub fn read(&mut self, sector: u16, offset: u32, dest: &mut [u8]) -> FlashResult {
        match &self.binding {
            Binding::Flash(d) => d.read(&mut self.bus, sector, offset, dest),
            Binding::Sram(d) => d.read(&mut self.bus, sector, offset, dest),
        }
    }

    /// Manually issue a bank-select command (no-op on the emulation
    /// backend, which has no banks).
    pub fn switch_bank(&mut self, bank: u8) {
        if let Binding::Flash(d) = &self.binding {
            d.switch_bank(&mut self.bus, bank);
        }
    }

    /// Serialize the RAM mirror into the bootleg persistence window.
    /// No effect on genuine flash or plain-SRAM bindings, where ordinary
    /// programs are already durable.
    pub fn persist(&mut self) {
        if let Binding::Sram(d) = &self.binding {
            d.persist(&mut self.bus, &mut self.irq);
        }
    }

    #[cfg(test)]
    pub(crate) fn bus(&mut self) -> &mut B {
        &mut self.bus
    }
}
