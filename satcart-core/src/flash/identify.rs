use super::{CMD_ID_ENTRY, CMD_ID_EXIT, FlashDevice, command, resolve, settle};
use crate::hal::{FlashBus, Vblank};

const VENDOR_ID_OFFSET: u32 = 0x0000;
const DEVICE_ID_OFFSET: u32 = 0x0001;

/// Vendor and device IDs as read from the chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashId {
    pub vendor: u16,
    pub device: u16,
}

impl FlashId {
    pub fn resolve(&self) -> FlashDevice {
        resolve(self.vendor, self.device)
    }
}

/// Read both IDs, one software ID entry/exit round each.
pub fn identify<B: FlashBus + Vblank + ?Sized>(bus: &mut B) -> FlashId {
    let vendor = read_id(bus, VENDOR_ID_OFFSET);
    let device = read_id(bus, DEVICE_ID_OFFSET);
    tracing::debug!("flash vendor 0x{:04X}, device 0x{:04X}", vendor, device);
    FlashId { vendor, device }
}

fn read_id<B: FlashBus + Vblank + ?Sized>(bus: &mut B, offset: u32) -> u16 {
    command(bus, CMD_ID_ENTRY);
    settle(bus);
    let id = bus.read_word(offset);
    command(bus, CMD_ID_EXIT);
    settle(bus);
    id
}
