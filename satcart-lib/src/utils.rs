use std::num::ParseIntError;

pub struct Utils;
impl Utils {
    /// Parse an address or size: `0x`-prefixed hexadecimal or plain decimal.
    pub fn str_to_u32(s: &str) -> Result<u32, ParseIntError> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16)
        } else {
            s.parse()
        }
    }

    /// Parse a USB vendor or product ID. Always hexadecimal, the `0x` prefix
    /// is optional.
    pub fn parse_usb_id(s: &str) -> Result<u16, ParseIntError> {
        let s = s.trim();
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u16::from_str_radix(hex, 16)
    }

    /// Bytes the console mode passes through: printable ASCII and tab.
    pub fn is_console_printable(byte: u8) -> bool {
        matches!(byte, 0x20..=0x7E | b'\t')
    }
}
