// agb-savemem/src/detect.rs

//! Cartridge identification: bootleg protocol probing and genuine flash
//! identity readout.
//!
//! Bootleg detection runs first because reproduction cartridges answer the
//! JEDEC autodetect sequence with garbage. The probes toggle unlock
//! sequences against the ROM window and classify the cartridge by which
//! family, if any, transiently replaces the visible ROM contents. On real
//! hardware this code must execute from work RAM: the probed region is
//! unreadable while a probe is in flight, so running from it corrupts
//! execution, not just data.

use crate::bus::{
    CartridgeBus, FlashTimer, InterruptController, InterruptGuard, IrqLines, CMD_LATCH, CMD_LATCH2,
};
use crate::chips::MX_MAX_TIME;
use log::debug;

/// Bootleg unlock-protocol families. The discriminant is the detector's
/// classification code (0 = genuine flash).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootlegKind {
    /// Genuine flash chip; no bootleg protocol answered.
    None = 0,
    /// Intel-style word programming (FFh/90h identify, 40h program).
    Intel = 1,
    /// AMD-style with the scrambled A9h/56h unlock pair.
    AmdScrambled = 2,
    /// Standard AMD AAh/55h unlock pair.
    Amd = 3,
    /// Intel-style with 1 KiB buffered programming (EAh/1FFh/D0h).
    IntelBuffered = 4,
}

impl BootlegKind {
    pub fn code(self) -> u16 {
        self as u16
    }
}

fn rom_snapshot<B: CartridgeBus>(bus: &mut B) -> [u8; 4] {
    [
        bus.rom_read(0),
        bus.rom_read(1),
        bus.rom_read(2),
        bus.rom_read(3),
    ]
}

/// Probe the cartridge for the known bootleg unlock-protocol families.
///
/// Runs entirely inside an interrupt-masked critical section (master flag
/// plus the Game Pak line) and leaves the chip back in read mode on every
/// return path. Each family is tried in a fixed order against a 4-byte
/// snapshot of the ROM base; the first protocol whose identify command
/// changes the snapshot wins.
pub fn detect_bootleg<B, I>(bus: &mut B, irq: &mut I) -> BootlegKind
where
    B: CartridgeBus,
    I: InterruptController,
{
    let _guard = InterruptGuard::mask(irq, IrqLines::GAME_PAK);

    let baseline = rom_snapshot(bus);

    // Intel family: FFh read-array reset, 90h identify.
    bus.rom_write_half(0, 0xFF);
    bus.rom_write_half(0, 0x90);
    let probed = rom_snapshot(bus);
    bus.rom_write_half(0, 0xFF);
    if probed != baseline {
        // Secondary probe disambiguates the buffered-programming variant,
        // which ignores this command pair.
        bus.rom_write_half(0x59, 0x42);
        let echo = bus.rom_read(0xB2);
        bus.rom_write_half(0x59, 0x96);
        bus.rom_write_half(0, 0xFF);
        if echo != 0x96 {
            return BootlegKind::IntelBuffered;
        }
        return BootlegKind::Intel;
    }

    // AMD family, scrambled unlock pair.
    bus.rom_write_half(0, 0xF0);
    bus.rom_write_half(0xAAA, 0xA9);
    bus.rom_write_half(0x555, 0x56);
    bus.rom_write_half(0xAAA, 0x90);
    let probed = rom_snapshot(bus);
    bus.rom_write_half(0, 0xF0);
    if probed != baseline {
        return BootlegKind::AmdScrambled;
    }

    // AMD family, standard unlock pair.
    bus.rom_write_half(0, 0xF0);
    bus.rom_write_half(0xAAA, 0xAA);
    bus.rom_write_half(0x555, 0x55);
    bus.rom_write_half(0xAAA, 0x90);
    let probed = rom_snapshot(bus);
    bus.rom_write_half(0, 0xF0);
    if probed != baseline {
        return BootlegKind::Amd;
    }

    BootlegKind::None
}

/// Locate the flash-emulation persistence window on a bootleg cartridge.
///
/// The flash size is found by checking where the ROM starts mirroring
/// (64 bytes at +4 compared against the same bytes 4/8/16 MiB up); the
/// save window sits 256 KiB before the end, which clears the largest
/// sector size found on these parts.
pub fn locate_save_window<B: CartridgeBus>(bus: &mut B) -> u32 {
    let mut flash_size = 0x2000000;
    for candidate in [0x400000u32, 0x800000, 0x1000000] {
        if (0..0x40).all(|i| bus.rom_read(4 + i) == bus.rom_read(4 + candidate + i)) {
            flash_size = candidate;
            break;
        }
    }
    debug!("bootleg flash size {:#x}", flash_size);
    flash_size - 0x40000
}

/// Issue the JEDEC autodetect unlock and read the joined 16-bit identity
/// (maker byte low, device byte high). The identify-mode settle pauses run
/// through the timer collaborator so no raw spin loops are needed.
pub fn read_flash_id<B, T>(bus: &mut B, timer: &mut T) -> u16
where
    B: CartridgeBus,
    T: FlashTimer,
{
    bus.save_write(CMD_LATCH, 0xAA);
    bus.save_write(CMD_LATCH2, 0x55);
    bus.save_write(CMD_LATCH, 0x90);
    settle(timer);

    let maker = bus.save_read(0);
    let device = bus.save_read(1);

    bus.save_write(CMD_LATCH, 0xAA);
    bus.save_write(CMD_LATCH2, 0x55);
    bus.save_write(CMD_LATCH, 0xF0);
    settle(timer);

    u16::from(maker) | u16::from(device) << 8
}

fn settle<T: FlashTimer>(timer: &mut T) {
    timer.start(MX_MAX_TIME[0]);
    while !timer.expired() {}
    timer.stop();
}
