// agb-savemem/src/chips.rs

//! Chip descriptors, the static binding table, and bank/sector addressing.

use crate::bus::BANK_WINDOW;
use crate::error::FlashError;

/// Erase geometry of one chip: sector size, the shift mapping a sector
/// number to its byte address, the sector count, and the top-sector marker
/// (boot-block position; 0 on every supported part).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorGeometry {
    pub size: u32,
    pub shift: u8,
    pub count: u16,
    pub top: u16,
}

/// Immutable description of one supported save-memory part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipDescriptor {
    /// Total capacity in bytes.
    pub capacity: u32,
    pub sector: SectorGeometry,
    /// Game Pak bus read/write waitstates expected by the part.
    pub wait: [u8; 2],
    pub maker_id: u8,
    pub device_id: u8,
}

impl ChipDescriptor {
    /// The joined 16-bit identity word as it reads off the bus
    /// (maker byte low, device byte high).
    pub fn id(&self) -> u16 {
        u16::from(self.maker_id) | u16::from(self.device_id) << 8
    }

    /// Sectors per 64 KiB bank window.
    pub fn sectors_per_bank(&self) -> u16 {
        (BANK_WINDOW >> self.sector.shift) as u16
    }

    /// True for parts larger than the directly addressable window.
    pub fn banked(&self) -> bool {
        self.capacity > BANK_WINDOW
    }
}

/// Timed-operation phase; doubles as the index into a chip's max-time table
/// and as the low bits of timeout status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    ProgramByte = 1,
    EraseSector = 2,
    EraseChip = 3,
}

/// Per-phase wall-clock budgets in milliseconds, indexed by [`WritePhase`].
/// Entry 0 bounds the identify-mode settle pause issued around the
/// autodetect command.
pub type MaxTimeTable = [u16; 4];

pub static MX_MAX_TIME: MaxTimeTable = [20, 10, 2000, 2000];

/// How a matched chip is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Genuine flash part speaking the JEDEC command set.
    Flash,
    /// Directly writable RAM emulating the flash interface.
    Sram,
}

/// One row of the static binding table.
pub struct ChipBinding {
    pub name: &'static str,
    pub desc: ChipDescriptor,
    pub max_time: &'static MaxTimeTable,
    pub kind: BindingKind,
}

const GEOM_1M: SectorGeometry = SectorGeometry {
    size: 4096,
    shift: 12,
    count: 32,
    top: 0,
};

/// Supported parts, scanned in order at detection time. The final entry is
/// the sentinel (zero maker byte) and doubles as the fallback binding for
/// unrecognized identities, so the operation slots are never left unset.
///
/// A floating data bus reads FFFFh, which is why the plain-SRAM entry sits
/// in the table like any other part: carts with battery RAM and no flash
/// controller bind the emulation backend through the normal scan.
pub static CHIP_BINDINGS: [ChipBinding; 4] = [
    ChipBinding {
        name: "MX29L010",
        desc: ChipDescriptor {
            capacity: 0x20000,
            sector: GEOM_1M,
            wait: [2, 1],
            maker_id: 0xC2,
            device_id: 0x09,
        },
        max_time: &MX_MAX_TIME,
        kind: BindingKind::Flash,
    },
    ChipBinding {
        name: "LE26FV10N1TS",
        desc: ChipDescriptor {
            capacity: 0x20000,
            sector: GEOM_1M,
            wait: [2, 1],
            maker_id: 0x62,
            device_id: 0x13,
        },
        max_time: &MX_MAX_TIME,
        kind: BindingKind::Flash,
    },
    ChipBinding {
        name: "BOOTLEG_SRAM",
        desc: ChipDescriptor {
            capacity: 0x10000,
            sector: SectorGeometry {
                size: 4096,
                shift: 12,
                count: 16,
                top: 0,
            },
            wait: [2, 1],
            maker_id: 0xFF,
            device_id: 0xFF,
        },
        max_time: &MX_MAX_TIME,
        kind: BindingKind::Sram,
    },
    ChipBinding {
        name: "DEFAULT_FLASH",
        desc: ChipDescriptor {
            capacity: 0x20000,
            sector: GEOM_1M,
            wait: [2, 1],
            maker_id: 0x00,
            device_id: 0x00,
        },
        max_time: &MX_MAX_TIME,
        kind: BindingKind::Flash,
    },
];

/// A validated physical location: bank number plus offset within the bank
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub bank: u8,
    pub offset: u32,
}

impl Location {
    /// Linear byte address within the chip.
    pub fn linear(&self) -> u32 {
        u32::from(self.bank) * BANK_WINDOW + self.offset
    }
}

/// Map (sector, offset) to a physical location, validating against the
/// declared geometry before any storage access.
pub fn locate(desc: &ChipDescriptor, sector: u16, offset: u32) -> Result<Location, FlashError> {
    if sector >= desc.sector.count {
        return Err(FlashError::SectorOutOfRange);
    }
    if offset >= desc.sector.size {
        return Err(FlashError::OffsetOutOfRange);
    }
    let linear = (u32::from(sector) << desc.sector.shift) + offset;
    Ok(Location {
        bank: (linear / BANK_WINDOW) as u8,
        offset: linear % BANK_WINDOW,
    })
}

/// Bounds-check a whole-buffer read starting at (sector, offset).
pub fn locate_span(
    desc: &ChipDescriptor,
    sector: u16,
    offset: u32,
    len: u32,
) -> Result<Location, FlashError> {
    let start = locate(desc, sector, offset)?;
    if start.linear() + len > desc.capacity {
        return Err(FlashError::OffsetOutOfRange);
    }
    Ok(start)
}

pub(crate) fn sentinel_binding() -> &'static ChipBinding {
    &CHIP_BINDINGS[CHIP_BINDINGS.len() - 1]
}
