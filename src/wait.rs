// agb-savemem/src/wait.rs

//! Write-completion state machine.
//!
//! Flash programs and erases finish asynchronously: the chip serves a
//! status byte at the written address until the operation completes and
//! the real data reads back. Completion is bounded by two independent
//! sources, because the hardware busy signal is not reliable across all
//! vendors: the chip's own overrun bit (DQ5, 20h) and the external
//! wall-clock timer as the universal backstop against a wedged chip.

use crate::bus::{CartridgeBus, FlashTimer, CMD_LATCH};
use crate::chips::{MaxTimeTable, WritePhase};
use crate::error::{FlashError, FlashResult};

/// Chip status bit flagging an exceeded internal time limit.
const BUSY_BIT: u8 = 0x20;

/// JEDEC reset command, returning the chip to read mode after an abort.
const CMD_RESET: u8 = 0xF0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Running,
    Succeeded,
    HwTimeout,
    SoftTimeout,
}

/// Poll `addr` in the save window until it reads back `expected`, under the
/// phase's wall-clock budget. Both timeout branches re-sample once before
/// aborting, since the busy flag races with actual completion; an abort
/// writes the reset command so the chip is left idle, never wedged.
pub(crate) fn wait_for_write<B, T>(
    bus: &mut B,
    timer: &mut T,
    max_time: &MaxTimeTable,
    phase: WritePhase,
    addr: u32,
    expected: u8,
) -> FlashResult
where
    B: CartridgeBus,
    T: FlashTimer,
{
    timer.start(max_time[phase as usize]);

    let mut state = WaitState::Running;
    while state == WaitState::Running {
        let status = bus.save_read(addr);

        if status == expected {
            state = WaitState::Succeeded;
        } else if status & BUSY_BIT != 0 {
            // The chip reports its own time limit exceeded; one re-sample
            // covers the race where the write completed on this very poll.
            if bus.save_read(addr) == expected {
                state = WaitState::Succeeded;
            } else {
                bus.save_write(CMD_LATCH, CMD_RESET);
                state = WaitState::HwTimeout;
            }
        } else if timer.expired() {
            if bus.save_read(addr) == expected {
                state = WaitState::Succeeded;
            } else {
                bus.save_write(CMD_LATCH, CMD_RESET);
                state = WaitState::SoftTimeout;
            }
        }
    }

    timer.stop();

    match state {
        WaitState::Succeeded => Ok(()),
        WaitState::HwTimeout => Err(FlashError::HardwareTimeout(phase)),
        WaitState::SoftTimeout => Err(FlashError::SoftTimeout(phase)),
        WaitState::Running => unreachable!(),
    }
}
