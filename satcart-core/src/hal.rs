//! Hardware seams of the console and the cartridge.
//!
//! The firmware never touches a register directly; it goes through these
//! traits. A board support crate implements them with volatile accesses to
//! the fixed register addresses below, the simulator in [`crate::sim`]
//! implements them in memory.

use bitfield::bitfield;

/// Cartridge USB status register.
pub const USB_FLAGS_ADDRESS: u32 = 0x2220_0001;
/// Cartridge USB data register; also the DMA source address.
pub const USB_FIFO_ADDRESS: u32 = 0x2210_0001;
/// Start of the cartridge flash window.
pub const FLASH_WINDOW_ADDRESS: u32 = 0x2200_0000;

bitfield! {
    /// Cartridge USB status flags. The FT245 reports its FIFO flags active low.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct UsbFlags(u8);
    impl Debug;
    /// Set while the receive FIFO holds no data.
    pub rx_empty, set_rx_empty: 0;
    /// Set while the transmit FIFO cannot take another byte.
    pub tx_full, set_tx_full: 1;
    pub power_enable, set_power_enable: 7;
}

impl UsbFlags {
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

bitfield! {
    /// SH-2 DMA channel control register (CHCR0).
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct Chcr(u32);
    impl Debug;
    pub dm1, set_dm1: 15;
    /// Increment the destination address after each unit.
    pub dm0, set_dm0: 14;
    pub sm1, set_sm1: 13;
    pub sm0, set_sm0: 12;
    pub ts1, set_ts1: 11;
    pub ts0, set_ts0: 10;
    /// Auto-request: the DMAC starts on its own once enabled.
    pub ar, set_ar: 9;
    pub ie, set_ie: 2;
    /// Transfer end.
    pub te, set_te: 1;
    /// DMA enable.
    pub de, set_de: 0;
}

impl Chcr {
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Byte units from a fixed source into an incrementing destination,
    /// auto-requested and enabled.
    pub fn fifo_to_memory() -> Self {
        let mut chcr = Self::default();
        chcr.set_dm0(true);
        chcr.set_ar(true);
        chcr.set_de(true);
        chcr
    }
}

bitfield! {
    /// SH-2 DMA operation register.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct Dmaor(u32);
    impl Debug;
    pub pr, set_pr: 3;
    pub ae, set_ae: 2;
    pub nmif, set_nmif: 1;
    /// DMA master enable.
    pub dme, set_dme: 0;
}

impl Dmaor {
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn enabled() -> Self {
        let mut dmaor = Self::default();
        dmaor.set_dme(true);
        dmaor
    }
}

/// Back screen colours in VDP2 RGB555.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    Red,
    Green,
    Orange,
}

impl Color {
    pub const fn rgb555(self) -> u16 {
        const fn rgb(r: u16, g: u16, b: u16) -> u16 {
            ((b & 0x1f) << 10) | ((g & 0x1f) << 5) | (r & 0x1f)
        }
        match self {
            Color::Black => rgb(0, 0, 0),
            Color::Red => rgb(0x1f, 0, 0),
            Color::Green => rgb(0, 0x1f, 0),
            Color::Orange => rgb(0x1f, 0x13, 0),
        }
    }
}

/// One complete display refresh interval: wait for vertical blank to start,
/// then for it to end.
pub trait Vblank {
    fn wait_vblank(&mut self);
}

/// 16-bit access to the cartridge flash window, addressed in bus words.
pub trait FlashBus {
    fn read_word(&mut self, offset: u32) -> u16;
    fn write_word(&mut self, offset: u32, value: u16);
}

pub trait UsbFifo {
    fn flags(&mut self) -> UsbFlags;
    fn read_fifo(&mut self) -> u8;
    fn write_fifo(&mut self, byte: u8);
}

/// Byte access to the console address space.
pub trait SystemBus {
    fn read_u8(&mut self, address: u32) -> u8;
    fn write_u8(&mut self, address: u32, value: u8);
}

/// DMA channel 0 and the DMA operation register.
pub trait DmaChannel {
    fn read_chcr(&mut self) -> Chcr;
    fn write_chcr(&mut self, chcr: Chcr);
    fn write_sar(&mut self, address: u32);
    fn write_dar(&mut self, address: u32);
    fn write_tcr(&mut self, count: u32);
    fn read_dmaor(&mut self) -> Dmaor;
    fn write_dmaor(&mut self, dmaor: Dmaor);
}

pub trait CacheControl {
    /// Invalidate every cache line so later reads see DMA-written memory.
    fn purge_cache(&mut self);
}

pub trait Video: Vblank {
    /// Bring up a blank back screen with the display enabled.
    fn init_video(&mut self);
    fn set_back_color(&mut self, rgb555: u16);
}

pub trait Cpu {
    /// Call `entry` as a parameterless procedure.
    fn call(&mut self, entry: u32);
}

/// Everything the command dispatcher needs from the console.
pub trait Console: UsbFifo + SystemBus + DmaChannel + CacheControl + Video + Cpu {}

impl<T> Console for T where T: UsbFifo + SystemBus + DmaChannel + CacheControl + Video + Cpu {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usb_flags_bits() {
        let flags = UsbFlags::from_bits(0b1000_0001);
        assert!(flags.rx_empty());
        assert!(!flags.tx_full());
        assert!(flags.power_enable());
    }

    #[test]
    fn fifo_to_memory_control_word() {
        assert_eq!(Chcr::fifo_to_memory().bits(), (1 << 14) | (1 << 9) | 1);
    }

    #[test]
    fn colour_table() {
        assert_eq!(Color::Black.rgb555(), 0x0000);
        assert_eq!(Color::Red.rgb555(), 0x001F);
        assert_eq!(Color::Green.rgb555(), 0x03E0);
        assert_eq!(Color::Orange.rgb555(), 0x027F);
    }
}
