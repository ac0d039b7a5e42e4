//! Page-write chips (SST29EE010, AT29C010 and unknown parts).
//!
//! A page-write command opens the page buffer, the page is stored word by
//! word and the chip programs it on its own. There is no status to poll, so
//! every page is followed by the fixed settle delay.

use super::{CMD_PAGE_WRITE, ERASED_WORD, command, settle};
use crate::hal::{FlashBus, Vblank};

pub(super) fn erase_page<B>(bus: &mut B, base: u32, page_size: u32)
where
    B: FlashBus + Vblank + ?Sized,
{
    write_page(bus, base, (0..page_size).map(|_| ERASED_WORD));
}

pub(super) fn write_page<B, I>(bus: &mut B, base: u32, words: I)
where
    B: FlashBus + Vblank + ?Sized,
    I: Iterator<Item = u16>,
{
    command(bus, CMD_PAGE_WRITE);
    for (offset, word) in (base..).zip(words) {
        bus.write_word(offset, word);
    }
    settle(bus);
}
