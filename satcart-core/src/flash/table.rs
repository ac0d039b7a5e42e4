//! Vendor and device ID lookup.

use super::{FlashDevice, FlashFamily};

const VENDOR_SST: u16 = 0xBFBF;
const VENDOR_ATMEL: u16 = 0x1F1F;
const VENDOR_AMD: u16 = 0x0101;
/// An empty slot floats high.
const VENDOR_NONE: u16 = 0xFFFF;

const DEVICE_SST29EE010: u16 = 0x0707;
const DEVICE_SST39SF010A: u16 = 0xB5B5;
const DEVICE_AT29C010: u16 = 0xD5D5;
const DEVICE_AM29F010: u16 = 0x2020;

/// Geometry assumed for parts that are not in the table.
const FALLBACK_ROM_SIZE: u32 = 131072;
const FALLBACK_PAGE_SIZE: u32 = 128;

const NO_VENDOR: &str = "No Vendor ID - check cartridge connection.";
const UNKNOWN_VENDOR: &str = "Unknown Vendor ID - proceed with caution!";
const SST: &str = "Vendor: Silicon Storage Technology";
const ATMEL: &str = "Vendor: Atmel";
const AMD: &str = "Vendor: AMD";

const NO_DEVICE: &str = "No Device ID - check cartridge connection.";
const UNKNOWN_DEVICE: &str = "Unknown Device ID - proceed with caution!";

const ABSENT: FlashDevice = FlashDevice::new(NO_VENDOR, NO_DEVICE, 0, 0, FlashFamily::Unset);

/// Look up a chip by its IDs.
///
/// Never fails: an empty slot gives the absent descriptor, anything else that
/// is not tabulated gets the fallback geometry with the vendor's algorithm,
/// or the page-write algorithm for an unknown vendor.
pub fn resolve(vendor: u16, device: u16) -> FlashDevice {
    match vendor {
        VENDOR_SST => match device {
            DEVICE_SST29EE010 => {
                FlashDevice::new(SST, "Device: SST29EE010", 131072, 128, FlashFamily::Default)
            }
            DEVICE_SST39SF010A => FlashDevice::new(
                SST,
                "Device: SST39SF010A",
                131072,
                4096,
                FlashFamily::Sequenced,
            ),
            _ => unknown_device(SST, FlashFamily::Default),
        },
        VENDOR_ATMEL => match device {
            DEVICE_AT29C010 => {
                FlashDevice::new(ATMEL, "Device: AT29C010", 131072, 128, FlashFamily::Default)
            }
            _ => unknown_device(ATMEL, FlashFamily::Default),
        },
        VENDOR_AMD => match device {
            DEVICE_AM29F010 => FlashDevice::new(
                AMD,
                "Device: AM29F010",
                131072,
                16 * 1024,
                FlashFamily::Sequenced,
            ),
            _ => unknown_device(AMD, FlashFamily::Sequenced),
        },
        VENDOR_NONE => ABSENT,
        _ => unknown_device(UNKNOWN_VENDOR, FlashFamily::Default),
    }
}

fn unknown_device(vendor: &'static str, family: FlashFamily) -> FlashDevice {
    FlashDevice::new(
        vendor,
        UNKNOWN_DEVICE,
        FALLBACK_ROM_SIZE,
        FALLBACK_PAGE_SIZE,
        family,
    )
}
