use thiserror::Error;

/// Convenient result type for `satcart-lib`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serial(#[from] serialport::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("timeout while {0}")]
    Timeout(String),

    #[error("interrupted while {0}")]
    Interrupted(String),

    #[error("checksum mismatch: expected {expected:#04X}, got {actual:#04X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("upload to 0x{address:08X} rejected by the cartridge (result {result:#04X})")]
    UploadRejected { address: u32, result: u8 },

    #[error("no cartridge found with VID {vid:04X} and PID {pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::Interrupted(msg.into())
    }
}
