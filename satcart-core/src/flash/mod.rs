//! Cartridge flash programming.
//!
//! The cartridge carries two 8-bit flash chips side by side on the 16-bit
//! bus, so every bus word holds one byte of each chip and every command is
//! written to both chips at once (0xAAAA, 0x8080 and so on). Sizes and
//! offsets in this module are counted in bus words.
//!
//! Chips come in two families. Page-write chips latch a whole page after a
//! single page-write command and give no usable completion signal, so the
//! driver waits a fixed two refresh intervals. Sequenced (JEDEC style) chips
//! take a command sequence per operation and report completion through data
//! polling on DQ7.

mod identify;
mod page_write;
mod programmer;
mod sequenced;
mod table;

pub use identify::{FlashId, identify};
pub use programmer::Programmer;
pub use table::resolve;

use crate::hal::{FlashBus, Vblank};
use thiserror::Error;

pub(crate) const UNLOCK_ADDR1: u32 = 0x5555;
pub(crate) const UNLOCK_ADDR2: u32 = 0x2AAA;
pub(crate) const UNLOCK_DATA1: u16 = 0xAAAA;
pub(crate) const UNLOCK_DATA2: u16 = 0x5555;

pub(crate) const CMD_PAGE_WRITE: u16 = 0xA0A0;
pub(crate) const CMD_ID_ENTRY: u16 = 0x9090;
pub(crate) const CMD_ID_EXIT: u16 = 0xF0F0;
pub(crate) const CMD_ERASE_SETUP: u16 = 0x8080;
pub(crate) const CMD_CHIP_ERASE: u16 = 0x1010;
pub(crate) const CMD_SECTOR_ERASE: u16 = 0x3030;

/// DQ7 of both chips.
pub(crate) const DQ7: u16 = 0x8080;

pub(crate) const ERASED_WORD: u16 = 0xFFFF;

/// Convenient result type for flash operations.
pub type Result<T> = core::result::Result<T, FlashError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    #[error("no flash device responded, check the cartridge connection")]
    NoDevice,

    #[error("page {page} is out of range, the device has {pages} pages")]
    PageOutOfRange { page: u32, pages: u32 },

    #[error("page data holds {actual} words, the page is {expected} words")]
    PageDataLength { expected: usize, actual: usize },

    #[error("image of {words} words does not fit a {capacity} word device")]
    ImageTooLarge { words: usize, capacity: u32 },

    #[error("data polling at word 0x{offset:05X} did not settle after {polls} reads")]
    PollTimeout { offset: u32, polls: u32 },
}

/// Programming algorithm of a chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashFamily {
    /// Page-write chips with a fixed settle delay.
    Default,
    /// Command-sequenced chips with DQ7 data polling.
    Sequenced,
    /// No device; nothing may be programmed.
    Unset,
}

/// What the capability table knows about one chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashDevice {
    vendor: &'static str,
    device: &'static str,
    rom_size: u32,
    page_size: u32,
    family: FlashFamily,
}

impl FlashDevice {
    pub(crate) const fn new(
        vendor: &'static str,
        device: &'static str,
        rom_size: u32,
        page_size: u32,
        family: FlashFamily,
    ) -> Self {
        Self {
            vendor,
            device,
            rom_size,
            page_size,
            family,
        }
    }

    pub fn vendor(&self) -> &'static str {
        self.vendor
    }

    pub fn device(&self) -> &'static str {
        self.device
    }

    /// Capacity in bus words.
    pub fn rom_size(&self) -> u32 {
        self.rom_size
    }

    /// Page size in bus words.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn family(&self) -> FlashFamily {
        self.family
    }

    /// False for the "no device" descriptor. Callers must not program an
    /// absent device.
    pub fn is_present(&self) -> bool {
        self.rom_size != 0 && self.page_size != 0 && self.family != FlashFamily::Unset
    }

    pub fn page_count(&self) -> u32 {
        if self.page_size == 0 {
            0
        } else {
            self.rom_size / self.page_size
        }
    }

    /// Word offset of the first word of `page`.
    pub fn page_base(&self, page: u32) -> Result<u32> {
        if !self.is_present() {
            return Err(FlashError::NoDevice);
        }
        let pages = self.page_count();
        if page >= pages {
            return Err(FlashError::PageOutOfRange { page, pages });
        }
        Ok(page * self.page_size)
    }
}

/// Upper bound on data polling reads.
///
/// Real chips are polled without a bound, a chip that never settles hangs
/// the caller. Tests inject a bound so a stuck chip becomes an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollLimit(Option<u32>);

impl PollLimit {
    pub const UNBOUNDED: Self = Self(None);

    pub const fn reads(max: u32) -> Self {
        Self(Some(max))
    }

    pub fn max_reads(&self) -> Option<u32> {
        self.0
    }
}

/// Operations on one identified chip.
pub struct Flash<'a, B: ?Sized> {
    bus: &'a mut B,
    device: FlashDevice,
    poll_limit: PollLimit,
}

impl<'a, B> Flash<'a, B>
where
    B: FlashBus + Vblank + ?Sized,
{
    pub fn new(bus: &'a mut B, device: FlashDevice) -> Self {
        Self {
            bus,
            device,
            poll_limit: PollLimit::UNBOUNDED,
        }
    }

    pub fn with_poll_limit(mut self, poll_limit: PollLimit) -> Self {
        self.poll_limit = poll_limit;
        self
    }

    pub fn device(&self) -> &FlashDevice {
        &self.device
    }

    pub fn erase_all(&mut self) -> Result<()> {
        tracing::debug!("erase all, {:?} family", self.device.family);
        match self.device.family {
            FlashFamily::Default => {
                for page in 0..self.device.page_count() {
                    let base = self.device.page_base(page)?;
                    page_write::erase_page(self.bus, base, self.device.page_size);
                }
                Ok(())
            }
            FlashFamily::Sequenced => sequenced::erase_all(self.bus, self.poll_limit),
            FlashFamily::Unset => Err(FlashError::NoDevice),
        }
    }

    pub fn erase_page(&mut self, page: u32) -> Result<()> {
        let base = self.device.page_base(page)?;
        tracing::trace!("erase page {} at word 0x{:05X}", page, base);
        match self.device.family {
            FlashFamily::Default => {
                page_write::erase_page(self.bus, base, self.device.page_size);
                Ok(())
            }
            FlashFamily::Sequenced => sequenced::erase_page(self.bus, base, self.poll_limit),
            FlashFamily::Unset => Err(FlashError::NoDevice),
        }
    }

    /// Program `page` with exactly one page of words.
    pub fn write_page(&mut self, page: u32, words: &[u16]) -> Result<()> {
        let expected = self.device.page_size as usize;
        if self.device.is_present() && words.len() != expected {
            return Err(FlashError::PageDataLength {
                expected,
                actual: words.len(),
            });
        }
        self.write_page_words(page, words.iter().copied())
    }

    /// Program `page` from an iterator that yields exactly one page of words.
    pub(crate) fn write_page_words<I>(&mut self, page: u32, words: I) -> Result<()>
    where
        I: Iterator<Item = u16>,
    {
        let base = self.device.page_base(page)?;
        tracing::trace!("write page {} at word 0x{:05X}", page, base);
        match self.device.family {
            FlashFamily::Default => {
                page_write::write_page(self.bus, base, words);
                Ok(())
            }
            FlashFamily::Sequenced => sequenced::write_page(self.bus, base, words, self.poll_limit),
            FlashFamily::Unset => Err(FlashError::NoDevice),
        }
    }
}

fn unlock<B: FlashBus + ?Sized>(bus: &mut B) {
    bus.write_word(UNLOCK_ADDR1, UNLOCK_DATA1);
    bus.write_word(UNLOCK_ADDR2, UNLOCK_DATA2);
}

/// Unlock, then write `command` to the first unlock address.
fn command<B: FlashBus + ?Sized>(bus: &mut B, command: u16) {
    unlock(bus);
    bus.write_word(UNLOCK_ADDR1, command);
}

/// Two full refresh intervals, enough for any chip to finish a command.
fn settle<B: Vblank + ?Sized>(bus: &mut B) {
    bus.wait_vblank();
    bus.wait_vblank();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ChipModel, SimFlash};

    fn sst29ee010() -> FlashDevice {
        resolve(0xBFBF, 0x0707)
    }

    fn am29f010() -> FlashDevice {
        resolve(0x0101, 0x2020)
    }

    #[test]
    fn last_page_is_in_bounds_and_next_is_not() {
        let device = sst29ee010();
        let pages = device.rom_size() / device.page_size();
        assert_eq!(device.page_base(pages - 1), Ok((pages - 1) * 128));
        assert_eq!(
            device.page_base(pages),
            Err(FlashError::PageOutOfRange { page: pages, pages })
        );
    }

    #[test]
    fn absent_device_refuses_every_operation() {
        let mut chip = SimFlash::absent();
        let mut flash = Flash::new(&mut chip, resolve(0xFFFF, 0x0000));
        assert_eq!(flash.erase_all(), Err(FlashError::NoDevice));
        assert_eq!(flash.erase_page(0), Err(FlashError::NoDevice));
        assert_eq!(flash.write_page(0, &[0; 4]), Err(FlashError::NoDevice));
        assert!(chip.writes().is_empty());
    }

    #[test]
    fn default_family_writes_last_page_and_settles() {
        let device = sst29ee010();
        let mut chip = SimFlash::new(ChipModel::PageWrite, 0xBFBF, 0x0707, device.rom_size());
        let last = device.page_count() - 1;
        let data: Vec<u16> = (0..128u16).map(|i| i.wrapping_mul(0x0101)).collect();

        let mut flash = Flash::new(&mut chip, device);
        flash.write_page(last, &data).unwrap();

        let base = last * 128;
        assert_eq!(chip.words(base, 128), data.as_slice());
        assert_eq!(chip.vblanks(), 2);
        // page-write command precedes the data
        assert_eq!(
            &chip.writes()[..3],
            &[(0x5555, 0xAAAA), (0x2AAA, 0x5555), (0x5555, 0xA0A0)]
        );
        assert_eq!(chip.writes()[3], (base, data[0]));
    }

    #[test]
    fn default_family_erase_all_visits_every_page() {
        let device = sst29ee010();
        let mut chip = SimFlash::new(ChipModel::PageWrite, 0xBFBF, 0x0707, device.rom_size());
        chip.fill(0x1234);

        Flash::new(&mut chip, device).erase_all().unwrap();

        assert!(chip.words(0, device.rom_size()).iter().all(|&w| w == 0xFFFF));
        assert_eq!(chip.vblanks(), device.page_count() as usize * 2);
    }

    #[test]
    fn default_family_rejects_short_page() {
        let device = sst29ee010();
        let mut chip = SimFlash::new(ChipModel::PageWrite, 0xBFBF, 0x0707, device.rom_size());
        let mut flash = Flash::new(&mut chip, device);
        assert_eq!(
            flash.write_page(0, &[0u16; 100]),
            Err(FlashError::PageDataLength {
                expected: 128,
                actual: 100
            })
        );
    }

    #[test]
    fn sequenced_erase_all_uses_chip_erase() {
        let device = am29f010();
        let mut chip = SimFlash::new(ChipModel::Sequenced, 0x0101, 0x2020, device.rom_size());
        chip.fill(0x0000);

        Flash::new(&mut chip, device).erase_all().unwrap();

        assert_eq!(
            chip.writes(),
            &[
                (0x5555, 0xAAAA),
                (0x2AAA, 0x5555),
                (0x5555, 0x8080),
                (0x5555, 0xAAAA),
                (0x2AAA, 0x5555),
                (0x5555, 0x1010),
            ]
        );
        assert!(chip.words(0, device.rom_size()).iter().all(|&w| w == 0xFFFF));
    }

    #[test]
    fn sequenced_erase_page_only_touches_its_sector() {
        let device = am29f010();
        let mut chip = SimFlash::new(ChipModel::Sequenced, 0x0101, 0x2020, device.rom_size())
            .with_sector_size(device.page_size());
        chip.fill(0x0000);

        Flash::new(&mut chip, device).erase_page(3).unwrap();

        let page = device.page_size();
        assert!(chip.words(3 * page, page).iter().all(|&w| w == 0xFFFF));
        assert!(chip.words(2 * page, page).iter().all(|&w| w == 0x0000));
        assert!(chip.words(4 * page, page).iter().all(|&w| w == 0x0000));
        assert_eq!(chip.writes().last(), Some(&(3 * page, 0x3030)));
    }

    #[test]
    fn sequenced_write_unlocks_every_word() {
        let device = resolve(0x0101, 0x9999);
        let mut chip = SimFlash::new(ChipModel::Sequenced, 0x0101, 0x9999, device.rom_size());
        let data: Vec<u16> = (0..128u16).map(|i| 0x8000 | i).collect();

        Flash::new(&mut chip, device).write_page(1, &data).unwrap();

        assert_eq!(chip.words(128, 128), data.as_slice());
        // unlock, unlock, program, data for every word
        assert_eq!(chip.writes().len(), 128 * 4);
        assert_eq!(chip.vblanks(), 0);
    }

    #[test]
    fn sequenced_polling_waits_out_a_busy_chip() {
        let device = am29f010();
        let mut chip = SimFlash::new(ChipModel::Sequenced, 0x0101, 0x2020, device.rom_size())
            .with_busy_reads(25);
        let data = vec![0x1234u16; device.page_size() as usize];

        Flash::new(&mut chip, device)
            .with_poll_limit(PollLimit::reads(40))
            .write_page(0, &data[..])
            .unwrap();
        assert_eq!(chip.words(0, 4), &[0x1234; 4]);
    }

    #[test]
    fn sequenced_polling_gives_up_at_the_limit() {
        let device = am29f010();
        let mut chip =
            SimFlash::new(ChipModel::Sequenced, 0x0101, 0x2020, device.rom_size()).stalled();

        let result = Flash::new(&mut chip, device)
            .with_poll_limit(PollLimit::reads(100))
            .erase_all();
        assert_eq!(result, Err(FlashError::PollTimeout { offset: 0, polls: 100 }));
    }
}
