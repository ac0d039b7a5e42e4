//! Command-sequenced chips (AM29F010, SST39SF010A).

use super::{
    CMD_CHIP_ERASE, CMD_ERASE_SETUP, CMD_PAGE_WRITE, CMD_SECTOR_ERASE, DQ7, FlashError, PollLimit,
    Result, UNLOCK_ADDR1, command, unlock,
};
use crate::hal::FlashBus;

/// Consecutive agreeing reads before an operation counts as complete.
const CONFIRM_READS: u32 = 3;

pub(super) fn erase_all<B: FlashBus + ?Sized>(bus: &mut B, limit: PollLimit) -> Result<()> {
    command(bus, CMD_ERASE_SETUP);
    unlock(bus);
    bus.write_word(UNLOCK_ADDR1, CMD_CHIP_ERASE);
    data_poll(bus, 0, DQ7, limit)
}

pub(super) fn erase_page<B: FlashBus + ?Sized>(
    bus: &mut B,
    base: u32,
    limit: PollLimit,
) -> Result<()> {
    command(bus, CMD_ERASE_SETUP);
    unlock(bus);
    bus.write_word(base, CMD_SECTOR_ERASE);
    data_poll(bus, base, DQ7, limit)
}

/// Every word needs its own unlock and program command.
pub(super) fn write_page<B, I>(bus: &mut B, base: u32, words: I, limit: PollLimit) -> Result<()>
where
    B: FlashBus + ?Sized,
    I: Iterator<Item = u16>,
{
    for (offset, word) in (base..).zip(words) {
        command(bus, CMD_PAGE_WRITE);
        bus.write_word(offset, word);
        data_poll(bus, offset, word, limit)?;
    }
    Ok(())
}

/// Read `offset` until DQ7 of both chips matches `expected` on
/// [`CONFIRM_READS`] reads in a row.
fn data_poll<B: FlashBus + ?Sized>(
    bus: &mut B,
    offset: u32,
    expected: u16,
    limit: PollLimit,
) -> Result<()> {
    let expected = expected & DQ7;
    let mut agreeing = 0;
    let mut polls = 0u32;

    while agreeing < CONFIRM_READS {
        if let Some(max) = limit.max_reads() {
            if polls >= max {
                return Err(FlashError::PollTimeout { offset, polls });
            }
        }
        polls += 1;

        if bus.read_word(offset) & DQ7 == expected {
            agreeing += 1;
        } else {
            agreeing = 0;
        }
    }

    Ok(())
}
