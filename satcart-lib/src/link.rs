//! Byte transport to the cartridge.
//!
//! The cartridge shows up as an FTDI FIFO bridge, which the OS exposes as a
//! serial port. [`SerialLink`] opens it through `serialport`;
//! [`StreamLink`] wraps any `Read + Write` pair so the client can be driven
//! against an in-process device.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort, SerialPortType};

use crate::{Error, Result};

/// A byte pipe that may return short reads.
///
/// `read` returning `Ok(0)` means nothing arrived yet, never end of stream.
pub trait Link {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Throw away anything buffered in either direction.
    fn purge(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<L: Link + ?Sized> Link for &mut L {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn purge(&mut self) -> Result<()> {
        (**self).purge()
    }
}

/// Where to find the cartridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub vid: u16,
    pub pid: u16,
    /// Explicit device path; skips the VID/PID lookup.
    pub port: Option<String>,
    pub baud: u32,
    pub read_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            vid: 0x0403,
            pid: 0x6001,
            port: None,
            baud: 1_000_000,
            read_timeout: Duration::from_millis(100),
        }
    }
}

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Name of the first serial port backed by a USB device with this
    /// VID/PID.
    pub fn find(vid: u16, pid: u16) -> Result<String> {
        let ports = serialport::available_ports()?;
        ports
            .into_iter()
            .find_map(|port| match port.port_type {
                SerialPortType::UsbPort(info) if info.vid == vid && info.pid == pid => {
                    Some(port.port_name)
                }
                _ => None,
            })
            .ok_or(Error::DeviceNotFound { vid, pid })
    }

    pub fn open(config: &LinkConfig) -> Result<Self> {
        let port_name = match &config.port {
            Some(port) => port.clone(),
            None => Self::find(config.vid, config.pid)?,
        };
        tracing::debug!("opening {} at {} baud", port_name, config.baud);

        let port = serialport::new(&port_name, config.baud)
            .timeout(config.read_timeout)
            .open()?;
        let mut link = Self { port };
        link.purge()?;
        Ok(link)
    }
}

impl Link for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self.port.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn purge(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        if let Err(e) = self.purge() {
            tracing::warn!("failed to purge serial buffers on close: {}", e);
        }
    }
}

/// Any `Read + Write` as a link. Timeouts read as zero bytes.
pub struct StreamLink<T> {
    inner: T,
}

impl<T: Read + Write> StreamLink<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Write> Link for StreamLink<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.inner.write(buf)?;
        self.inner.flush()?;
        Ok(n)
    }
}
