//! Wire format of the cartridge command channel.
//!
//! Every command starts with a one byte opcode followed by a big-endian
//! address. Download and upload also carry a big-endian length, then the
//! payload and a trailing checksum byte travel in the direction of the
//! transfer. Upload is answered with a single result byte.

/// Size of the USB OUT endpoint; bounds one DMA chunk on the cartridge.
pub const USB_OUT_EP_SIZE: usize = 64;

/// Opcode, address and length.
pub const HEADER_LEN: usize = 9;

/// Opcode and address.
pub const EXECUTE_HEADER_LEN: usize = 5;

/// Upload result: the cartridge's checksum matched.
pub const RESULT_OK: u8 = 0x00;
/// Upload result: the cartridge computed a different checksum.
pub const RESULT_CHECKSUM_MISMATCH: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Download = 1,
    Upload = 2,
    Execute = 3,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Opcode::Download),
            2 => Ok(Opcode::Upload),
            3 => Ok(Opcode::Execute),
            other => Err(other),
        }
    }
}

/// A command as sent by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Read `length` bytes at `address` back to the host.
    Download { address: u32, length: u32 },
    /// Store `length` bytes at `address`.
    Upload { address: u32, length: u32 },
    /// Jump to `address`.
    Execute { address: u32 },
}

/// Encoded request header, at most [`HEADER_LEN`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    bytes: [u8; HEADER_LEN],
    len: usize,
}

impl Header {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Download { .. } => Opcode::Download,
            Request::Upload { .. } => Opcode::Upload,
            Request::Execute { .. } => Opcode::Execute,
        }
    }

    pub fn address(&self) -> u32 {
        match *self {
            Request::Download { address, .. }
            | Request::Upload { address, .. }
            | Request::Execute { address } => address,
        }
    }

    pub fn encode(&self) -> Header {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = self.opcode() as u8;
        bytes[1..5].copy_from_slice(&self.address().to_be_bytes());
        let len = match *self {
            Request::Download { length, .. } | Request::Upload { length, .. } => {
                bytes[5..9].copy_from_slice(&length.to_be_bytes());
                HEADER_LEN
            }
            Request::Execute { .. } => EXECUTE_HEADER_LEN,
        };
        Header { bytes, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_header_layout() {
        let header = Request::Download {
            address: 0x0600_4000,
            length: 0x0001_0203,
        }
        .encode();
        assert_eq!(
            header.as_bytes(),
            &[0x01, 0x06, 0x00, 0x40, 0x00, 0x00, 0x01, 0x02, 0x03]
        );
    }

    #[test]
    fn upload_header_layout() {
        let header = Request::Upload {
            address: 0x2200_0000,
            length: 200,
        }
        .encode();
        assert_eq!(
            header.as_bytes(),
            &[0x02, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC8]
        );
    }

    #[test]
    fn execute_header_has_no_length() {
        let header = Request::Execute {
            address: 0x0600_4000,
        }
        .encode();
        assert_eq!(header.as_bytes(), &[0x03, 0x06, 0x00, 0x40, 0x00]);
        assert_eq!(header.as_bytes().len(), EXECUTE_HEADER_LEN);
    }

    #[test]
    fn opcode_from_byte() {
        assert_eq!(Opcode::try_from(2), Ok(Opcode::Upload));
        assert_eq!(Opcode::try_from(0), Err(0));
        assert_eq!(Opcode::try_from(0xFF), Err(0xFF));
    }
}
