// agb-savemem/src/testutil.rs

//! Simulated cartridge hardware for deterministic tests.
//!
//! `SimCartridge` models both sides of the bus the driver talks to: a
//! genuine flash part interpreting the JEDEC command set in the save
//! window (unlock tracking, identify mode, erase/program with injectable
//! busy behavior), and the four bootleg protocol families answering in the
//! ROM window. `SimTimer` and `SimIrq` stand in for the periodic timer and
//! the interrupt controller.

use crate::bus::{CartridgeBus, FlashTimer, InterruptController, IrqLines, CMD_LATCH, CMD_LATCH2};
use crate::detect::BootlegKind;
use std::cell::Cell;

const BANK: usize = 0x10000;
const ROM_LEN: usize = 0x20000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmdMode {
    Ready,
    EraseSetup,
    Program,
    BankSelect,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    addr: usize,
    expected: u8,
    polls: u32,
}

pub struct SimCartridge {
    pub mem: Vec<u8>,
    pub rom: Vec<u8>,
    pub bank: u8,
    pub bank_selects: u32,
    pub timing_log: Vec<(u8, u8)>,
    pub resets: u32,
    /// Status never reaches the expected byte and never raises the busy
    /// bit; only the wall clock gets the driver out.
    pub never_complete: bool,
    /// Status reports the chip's own overrun bit forever.
    pub fail_busy: bool,
    pub word_programs: u32,
    pub block_programs: u32,

    maker: u8,
    device: u8,
    kind: BootlegKind,
    sram_mode: bool,

    // JEDEC save-window interpreter.
    unlock: u8,
    mode: CmdMode,
    id_mode: bool,
    pending: Option<Pending>,

    // Bootleg ROM-window interpreter.
    rom_id_mode: bool,
    intel_status: bool,
    erase_stage: u8,
    erase_addr: u32,
    program_armed: Option<u32>,
    buffer_load: Option<(u32, u32)>,
    amd_stage: u8,
    amd_erase_armed: bool,
    amd_program_next: bool,
    echo_b2: Option<u8>,
}

impl SimCartridge {
    fn base(kind: BootlegKind, mem_len: usize, maker: u8, device: u8) -> Self {
        Self {
            mem: vec![0xFF; mem_len],
            rom: (0..ROM_LEN)
                .map(|i| (i as u32).wrapping_mul(31).wrapping_add(7) as u8)
                .collect(),
            bank: 0,
            bank_selects: 0,
            timing_log: Vec::new(),
            resets: 0,
            never_complete: false,
            fail_busy: false,
            word_programs: 0,
            block_programs: 0,
            maker,
            device,
            kind,
            sram_mode: kind != BootlegKind::None,
            unlock: 0,
            mode: CmdMode::Ready,
            id_mode: false,
            pending: None,
            rom_id_mode: false,
            intel_status: false,
            erase_stage: 0,
            erase_addr: 0,
            program_armed: None,
            buffer_load: None,
            amd_stage: 0,
            amd_erase_armed: false,
            amd_program_next: false,
            echo_b2: None,
        }
    }

    /// Genuine flash part answering identify mode with the given bytes.
    pub fn flash(maker: u8, device: u8) -> Self {
        Self::base(BootlegKind::None, 2 * BANK, maker, device)
    }

    /// Bootleg cartridge: plain RAM in the save window, the given protocol
    /// family in the ROM window.
    pub fn bootleg(kind: BootlegKind) -> Self {
        assert_ne!(kind, BootlegKind::None);
        Self::base(kind, BANK, 0, 0)
    }

    fn abs(&self, offset: u32) -> usize {
        self.bank as usize * BANK + offset as usize
    }

    fn rom_mask(&self, offset: u32) -> usize {
        offset as usize & (ROM_LEN - 1)
    }

    fn reset_chip(&mut self) {
        self.pending = None;
        self.id_mode = false;
        self.mode = CmdMode::Ready;
        self.unlock = 0;
    }

    fn begin_pending(&mut self, addr: usize, expected: u8) {
        self.pending = Some(Pending {
            addr,
            expected,
            polls: 2,
        });
    }

    fn rom_store_half(&mut self, offset: u32, data: u16) {
        let i = self.rom_mask(offset) & !1;
        self.rom[i] = data as u8;
        self.rom[i + 1] = (data >> 8) as u8;
    }

    fn rom_erase_64k(&mut self, offset: u32) {
        let base = self.rom_mask(offset) & !(BANK - 1);
        for b in &mut self.rom[base..base + BANK] {
            *b = 0xFF;
        }
    }

    fn intel_write(&mut self, offset: u32, data: u16) {
        // Staged data consumes writes before any command decoding.
        if let Some(addr) = self.program_armed.take() {
            self.rom_store_half(addr, data);
            self.word_programs += 1;
            self.intel_status = true;
            return;
        }
        if let Some((base, remaining)) = self.buffer_load {
            if remaining > 0 {
                self.rom_store_half(offset, data);
                self.buffer_load = Some((base, remaining - 1));
                return;
            }
            if data == 0xD0 {
                self.block_programs += 1;
                self.intel_status = true;
            }
            self.buffer_load = None;
            return;
        }
        match data {
            0xFF => {
                self.rom_id_mode = false;
                self.intel_status = false;
                self.erase_stage = 0;
            }
            0x90 if offset == 0 => self.rom_id_mode = true,
            0x42 if offset == 0x59 => {
                self.echo_b2 = Some(if self.kind == BootlegKind::Intel {
                    0x96
                } else {
                    0x00
                });
            }
            0x96 if offset == 0x59 => self.echo_b2 = None,
            0x60 => {
                self.erase_stage = 1;
                self.erase_addr = offset;
            }
            0xD0 if self.erase_stage == 1 => self.erase_stage = 2,
            0x20 if self.erase_stage == 2 => self.erase_stage = 3,
            0xD0 if self.erase_stage == 3 => {
                self.rom_erase_64k(self.erase_addr);
                self.erase_stage = 0;
                self.intel_status = true;
            }
            0x40 if self.kind == BootlegKind::Intel => self.program_armed = Some(offset),
            0xEA if self.kind == BootlegKind::IntelBuffered => self.intel_status = true,
            0x1FF if self.kind == BootlegKind::IntelBuffered => {
                self.buffer_load = Some((offset, 512));
            }
            _ => {}
        }
    }

    fn amd_write(&mut self, offset: u32, data: u16) {
        if self.amd_program_next {
            self.rom_store_half(offset, data);
            self.word_programs += 1;
            self.amd_program_next = false;
            return;
        }
        let (m0, m1) = if self.kind == BootlegKind::AmdScrambled {
            (0xA9, 0x56)
        } else {
            (0xAA, 0x55)
        };
        match self.amd_stage {
            0 => {
                if offset == 0xAAA && data == m0 {
                    self.amd_stage = 1;
                } else if data == 0xF0 {
                    self.rom_id_mode = false;
                }
            }
            1 => {
                self.amd_stage = 0;
                if offset == 0x555 && data == m1 {
                    self.amd_stage = 2;
                }
            }
            _ => {
                self.amd_stage = 0;
                match data {
                    0x90 if offset == 0xAAA => self.rom_id_mode = true,
                    0x80 if offset == 0xAAA => self.amd_erase_armed = true,
                    0xA0 if offset == 0xAAA => self.amd_program_next = true,
                    0x30 if self.amd_erase_armed => {
                        self.rom_erase_64k(offset);
                        self.amd_erase_armed = false;
                    }
                    0xF0 => self.rom_id_mode = false,
                    _ => {}
                }
            }
        }
    }
}

impl Default for SimCartridge {
    fn default() -> Self {
        Self::flash(0, 0)
    }
}

impl CartridgeBus for SimCartridge {
    fn save_read(&mut self, offset: u32) -> u8 {
        if self.sram_mode {
            return self.mem[offset as usize];
        }
        let abs = self.abs(offset);
        if let Some(p) = &mut self.pending {
            if p.addr == abs {
                if self.fail_busy {
                    return (p.expected ^ 0x80) | 0x20;
                }
                if self.never_complete {
                    return (p.expected ^ 0x80) & 0xDF;
                }
                if p.polls > 0 {
                    p.polls -= 1;
                    return (p.expected ^ 0x80) & 0xDF;
                }
                self.pending = None;
            }
        }
        if self.id_mode {
            match offset {
                0 => return self.maker,
                1 => return self.device,
                _ => {}
            }
        }
        self.mem[abs]
    }

    fn save_write(&mut self, offset: u32, data: u8) {
        if self.sram_mode {
            self.mem[offset as usize] = data;
            return;
        }
        match self.mode {
            CmdMode::Program => {
                let abs = self.abs(offset);
                self.mem[abs] = data;
                self.mode = CmdMode::Ready;
                self.begin_pending(abs, data);
                return;
            }
            CmdMode::BankSelect => {
                if offset == 0 {
                    self.bank = data;
                    self.bank_selects += 1;
                }
                self.mode = CmdMode::Ready;
                return;
            }
            _ => {}
        }
        match self.unlock {
            0 => match (offset, data) {
                (CMD_LATCH, 0xAA) => self.unlock = 1,
                (CMD_LATCH, 0xF0) => {
                    // Bare reset, as issued by a timed-out wait.
                    self.resets += 1;
                    self.reset_chip();
                }
                _ => {}
            },
            1 => {
                self.unlock = if offset == CMD_LATCH2 && data == 0x55 { 2 } else { 0 };
            }
            _ => {
                self.unlock = 0;
                match data {
                    0x90 if offset == CMD_LATCH => self.id_mode = true,
                    0xF0 if offset == CMD_LATCH => {
                        self.id_mode = false;
                        self.mode = CmdMode::Ready;
                    }
                    0xA0 if offset == CMD_LATCH => self.mode = CmdMode::Program,
                    0xB0 if offset == CMD_LATCH => self.mode = CmdMode::BankSelect,
                    0x80 if offset == CMD_LATCH => self.mode = CmdMode::EraseSetup,
                    0x10 if offset == CMD_LATCH && self.mode == CmdMode::EraseSetup => {
                        self.mem.fill(0xFF);
                        self.mode = CmdMode::Ready;
                        self.begin_pending(self.bank as usize * BANK, 0xFF);
                    }
                    0x30 if self.mode == CmdMode::EraseSetup => {
                        let abs = self.abs(offset);
                        for b in &mut self.mem[abs..abs + 0x1000] {
                            *b = 0xFF;
                        }
                        self.mode = CmdMode::Ready;
                        self.begin_pending(abs, 0xFF);
                    }
                    _ => self.mode = CmdMode::Ready,
                }
            }
        }
    }

    fn rom_read(&mut self, offset: u32) -> u8 {
        if let Some(b) = self.echo_b2 {
            if offset == 0xB2 {
                return b;
            }
        }
        if self.rom_id_mode {
            return !self.rom[self.rom_mask(offset)];
        }
        if self.intel_status {
            return 0x80;
        }
        self.rom[self.rom_mask(offset)]
    }

    fn rom_read_half(&mut self, offset: u32) -> u16 {
        if self.intel_status {
            return 0x0080;
        }
        let i = self.rom_mask(offset) & !1;
        let half = u16::from(self.rom[i]) | u16::from(self.rom[i + 1]) << 8;
        if self.rom_id_mode {
            !half
        } else {
            half
        }
    }

    fn rom_write_half(&mut self, offset: u32, data: u16) {
        match self.kind {
            // Genuine cartridge: the ROM window ignores writes.
            BootlegKind::None => {}
            BootlegKind::Intel | BootlegKind::IntelBuffered => self.intel_write(offset, data),
            BootlegKind::Amd | BootlegKind::AmdScrambled => self.amd_write(offset, data),
        }
    }

    fn set_save_timing(&mut self, read: u8, write: u8) {
        self.timing_log.push((read, write));
    }
}

/// Scripted status source for exercising the wait state machine in
/// isolation: `save_read` replays the script (last entry repeats) and any
/// reset command is counted.
pub struct StatusScript {
    script: Vec<u8>,
    pos: usize,
    pub resets: u32,
}

impl StatusScript {
    fn new(script: Vec<u8>) -> Self {
        Self {
            script,
            pos: 0,
            resets: 0,
        }
    }

    fn pending_status(value: u8) -> u8 {
        (value ^ 0x80) & 0xDF
    }

    fn busy_status(value: u8) -> u8 {
        (value ^ 0x80) | 0x20
    }

    /// In-progress status for `busy_polls` samples, then the final byte.
    pub fn completing(value: u8, busy_polls: usize) -> Self {
        let mut script = vec![Self::pending_status(value); busy_polls];
        script.push(value);
        Self::new(script)
    }

    /// Overrun bit raised forever.
    pub fn stuck_busy(value: u8) -> Self {
        Self::new(vec![Self::busy_status(value)])
    }

    /// Overrun bit on the first sample, completion on the re-sample.
    pub fn busy_then_complete(value: u8) -> Self {
        Self::new(vec![Self::busy_status(value), value])
    }

    /// Never matches, never raises the busy bit.
    pub fn never_completing(value: u8) -> Self {
        Self::new(vec![Self::pending_status(value)])
    }
}

impl CartridgeBus for StatusScript {
    fn save_read(&mut self, _offset: u32) -> u8 {
        let status = self.script[self.pos.min(self.script.len() - 1)];
        self.pos += 1;
        status
    }

    fn save_write(&mut self, offset: u32, data: u8) {
        if offset == CMD_LATCH && data == 0xF0 {
            self.resets += 1;
        }
    }

    fn rom_read(&mut self, _offset: u32) -> u8 {
        0
    }

    fn rom_read_half(&mut self, _offset: u32) -> u16 {
        0
    }

    fn rom_write_half(&mut self, _offset: u32, _data: u16) {}

    fn set_save_timing(&mut self, _read: u8, _write: u8) {}
}

/// Poll-counted timer: `expired` reports the elapsed flag after the
/// configured number of polls since the last `start`.
pub struct SimTimer {
    limit: Option<u32>,
    remaining: Cell<u32>,
    pub started: bool,
    pub stopped: bool,
    pub starts: u32,
}

impl SimTimer {
    /// Never expires.
    pub fn new() -> Self {
        Self {
            limit: None,
            remaining: Cell::new(u32::MAX),
            started: false,
            stopped: false,
            starts: 0,
        }
    }

    /// Expires after `polls` calls to `expired` following each `start`.
    pub fn expiring_after(polls: u32) -> Self {
        Self {
            limit: Some(polls),
            ..Self::new()
        }
    }
}

impl FlashTimer for SimTimer {
    fn start(&mut self, _limit_ms: u16) {
        self.started = true;
        self.stopped = false;
        self.starts += 1;
        self.remaining.set(self.limit.unwrap_or(u32::MAX));
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn expired(&self) -> bool {
        if self.limit.is_none() {
            return false;
        }
        let remaining = self.remaining.get();
        if remaining == 0 {
            true
        } else {
            self.remaining.set(remaining - 1);
            false
        }
    }
}

/// Interrupt controller double. `saw_full_mask` records whether, at any
/// point, the master flag and the Game Pak line were both masked at once.
pub struct SimIrq {
    master: bool,
    lines: IrqLines,
    pub mask_count: u32,
    pub saw_full_mask: bool,
}

impl SimIrq {
    pub fn new(master: bool, lines: IrqLines) -> Self {
        Self {
            master,
            lines,
            mask_count: 0,
            saw_full_mask: false,
        }
    }

    fn note(&mut self) {
        if !self.master && !self.lines.contains(IrqLines::GAME_PAK) {
            self.saw_full_mask = true;
        }
    }
}

impl Default for SimIrq {
    fn default() -> Self {
        Self::new(true, IrqLines::VBLANK)
    }
}

impl InterruptController for SimIrq {
    fn master_enabled(&self) -> bool {
        self.master
    }

    fn set_master_enabled(&mut self, on: bool) {
        if !on && self.master {
            self.mask_count += 1;
        }
        self.master = on;
        self.note();
    }

    fn enabled_lines(&self) -> IrqLines {
        self.lines
    }

    fn set_enabled_lines(&mut self, lines: IrqLines) {
        self.lines = lines;
        self.note();
    }
}
