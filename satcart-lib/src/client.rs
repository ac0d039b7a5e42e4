use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use satcart_core::protocol::{RESULT_OK, Request};
use satcart_core::checksum;
use tempfile::NamedTempFile;

use crate::link::Link;
use crate::progress::{
    ProgressCallbackArc, ProgressHandler, ProgressHelper, ProgressOperation,
    no_op_progress_callback,
};
use crate::utils::Utils;
use crate::{Error, Result};

/// Bytes requested per console read.
pub const CONSOLE_CHUNK: usize = 62;

/// How long one transfer took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl TransferStats {
    pub fn kib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.bytes as f64 / 1024.0 / secs
        }
    }

    fn summary(&self) -> String {
        format!(
            "{} bytes in {:.3}s ({:.1} KiB/s)",
            self.bytes,
            self.elapsed.as_secs_f64(),
            self.kib_per_sec()
        )
    }
}

/// Host side of the cartridge command channel.
///
/// One command is in flight at a time. Reads and writes are retried until
/// complete; a link read that returns nothing is retried as well, forever
/// unless a response timeout is set or the interrupt flag is raised.
pub struct Client<L> {
    link: L,
    progress: ProgressHelper,
    response_timeout: Option<Duration>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<L: Link> Client<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            progress: ProgressHelper::new(no_op_progress_callback(), 0),
            response_timeout: None,
            interrupt: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallbackArc) -> Self {
        self.progress = ProgressHelper::new(callback, 0);
        self
    }

    /// Give up when the cartridge goes quiet for this long.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Abandon the current operation once `flag` is set, e.g. from a
    /// Ctrl-C handler. Returns `Error::Interrupted` so the caller can close
    /// the link cleanly.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Read `buf.len()` bytes of cartridge memory at `address` into `buf`.
    pub fn download(&mut self, address: u32, buf: &mut [u8]) -> Result<TransferStats> {
        let length = transfer_len(buf.len())?;
        let operation = ProgressOperation::Download { address, length };
        tracing::debug!("{}", operation);
        let bar = self.progress.create_bar(length as u64, operation);
        let started = Instant::now();

        if let Err(e) = self.download_exchange(address, buf, &bar) {
            bar.finish_with_message("Download failed");
            return Err(e);
        }

        let stats = TransferStats {
            bytes: length as u64,
            elapsed: started.elapsed(),
        };
        tracing::info!("downloaded {}", stats.summary());
        bar.finish_with_message(format!("Downloaded {}", stats.summary()));
        Ok(stats)
    }

    fn download_exchange(
        &mut self,
        address: u32,
        buf: &mut [u8],
        bar: &ProgressHandler,
    ) -> Result<()> {
        let length = transfer_len(buf.len())?;
        self.send(Request::Download { address, length }.encode().as_bytes(), None)?;
        self.recv(buf, "receiving download data", Some(bar))?;

        bar.set_message("Verifying checksum");
        let mut expected = [0u8; 1];
        self.recv(&mut expected, "receiving download checksum", None)?;
        let actual = checksum(buf);
        if actual != expected[0] {
            tracing::warn!(
                "download checksum mismatch: cartridge sent 0x{:02X}, computed 0x{:02X}",
                expected[0],
                actual
            );
            return Err(Error::ChecksumMismatch {
                expected: expected[0],
                actual,
            });
        }
        Ok(())
    }

    /// Download into `path`. The file is only replaced once the data
    /// verified.
    pub fn download_to_file(
        &mut self,
        path: impl AsRef<Path>,
        address: u32,
        size: u32,
    ) -> Result<TransferStats> {
        let path = path.as_ref();
        let mut buf = vec![0u8; size as usize];
        let stats = self.download(address, &mut buf)?;

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(&buf)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        tracing::debug!("wrote {} bytes to {}", buf.len(), path.display());
        Ok(stats)
    }

    /// Store `data` at `address` and check the cartridge's verdict.
    pub fn upload(&mut self, address: u32, data: &[u8]) -> Result<TransferStats> {
        let length = transfer_len(data.len())?;
        let operation = ProgressOperation::Upload { address, length };
        tracing::debug!("{}", operation);
        let bar = self.progress.create_bar(length as u64, operation);
        let started = Instant::now();

        if let Err(e) = self.upload_exchange(address, data, &bar) {
            bar.finish_with_message("Upload failed");
            return Err(e);
        }

        let stats = TransferStats {
            bytes: length as u64,
            elapsed: started.elapsed(),
        };
        tracing::info!("uploaded {}", stats.summary());
        bar.finish_with_message(format!("Uploaded {}", stats.summary()));
        Ok(stats)
    }

    fn upload_exchange(&mut self, address: u32, data: &[u8], bar: &ProgressHandler) -> Result<()> {
        let length = transfer_len(data.len())?;
        let sum = checksum(data);
        self.send(Request::Upload { address, length }.encode().as_bytes(), None)?;
        self.send(data, Some(bar))?;
        self.send(&[sum], None)?;

        bar.set_message("Waiting for the cartridge to verify");
        let mut result = [0u8; 1];
        self.recv(&mut result, "waiting for upload result", None)?;
        if result[0] != RESULT_OK {
            tracing::warn!(
                "cartridge rejected upload to 0x{:08X} with result 0x{:02X}",
                address,
                result[0]
            );
            return Err(Error::UploadRejected {
                address,
                result: result[0],
            });
        }
        Ok(())
    }

    pub fn upload_file(&mut self, path: impl AsRef<Path>, address: u32) -> Result<TransferStats> {
        let data = read_file(path.as_ref())?;
        self.upload(address, &data)
    }

    /// Upload `data` to `address` and jump to it. Nothing is executed if
    /// the upload fails.
    pub fn execute(&mut self, address: u32, data: &[u8]) -> Result<TransferStats> {
        let stats = self.upload(address, data)?;

        let spinner = self
            .progress
            .create_spinner(ProgressOperation::Execute { address });
        if let Err(e) = self.send(Request::Execute { address }.encode().as_bytes(), None) {
            spinner.finish_with_message("Execute failed");
            return Err(e);
        }
        tracing::info!("executing at 0x{:08X}", address);
        spinner.finish_with_message(format!("Started 0x{:08X}", address));
        Ok(stats)
    }

    pub fn execute_file(&mut self, path: impl AsRef<Path>, address: u32) -> Result<TransferStats> {
        let data = read_file(path.as_ref())?;
        self.execute(address, &data)
    }

    /// Echo whatever the cartridge sends to `out`, keeping printable ASCII
    /// and tabs. Runs until the link or `out` fails and returns that error.
    pub fn console<W: Write>(&mut self, mut out: W) -> Result<()> {
        let spinner = self.progress.create_spinner(ProgressOperation::Console);
        let mut buf = [0u8; CONSOLE_CHUNK];
        let error = loop {
            if let Err(e) = self.echo_chunk(&mut buf, &mut out) {
                break e;
            }
        };
        spinner.finish_with_message("Console closed");
        Err(error)
    }

    fn echo_chunk<W: Write>(&mut self, buf: &mut [u8], out: &mut W) -> Result<()> {
        self.check_interrupt("echoing the console")?;
        let n = self.link.read(buf)?;
        if n == 0 {
            return Ok(());
        }
        let mut shown = buf[..n]
            .iter()
            .copied()
            .filter(|&b| Utils::is_console_printable(b))
            .peekable();
        if shown.peek().is_some() {
            let text: Vec<u8> = shown.collect();
            out.write_all(&text)?;
            out.flush()?;
        }
        Ok(())
    }

    fn send(&mut self, mut data: &[u8], progress: Option<&ProgressHandler>) -> Result<()> {
        let mut last_activity = Instant::now();
        while !data.is_empty() {
            self.check_interrupt("sending")?;
            let n = self.link.write(data)?;
            if n == 0 {
                self.check_timeout(last_activity, "sending")?;
                continue;
            }
            last_activity = Instant::now();
            if let Some(progress) = progress {
                progress.inc(n as u64);
            }
            data = &data[n..];
        }
        Ok(())
    }

    fn recv(
        &mut self,
        buf: &mut [u8],
        context: &str,
        progress: Option<&ProgressHandler>,
    ) -> Result<()> {
        let mut filled = 0;
        let mut last_activity = Instant::now();
        while filled < buf.len() {
            self.check_interrupt(context)?;
            let n = self.link.read(&mut buf[filled..])?;
            if n == 0 {
                self.check_timeout(last_activity, context)?;
                continue;
            }
            last_activity = Instant::now();
            if let Some(progress) = progress {
                progress.inc(n as u64);
            }
            filled += n;
        }
        Ok(())
    }

    fn check_timeout(&self, last_activity: Instant, context: &str) -> Result<()> {
        match self.response_timeout {
            Some(timeout) if last_activity.elapsed() > timeout => Err(Error::timeout(context)),
            _ => Ok(()),
        }
    }

    fn check_interrupt(&self, context: &str) -> Result<()> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(Error::interrupted(context)),
            _ => Ok(()),
        }
    }
}

fn transfer_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::invalid_input(format!("{} bytes is too large for one transfer", len)))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    tracing::debug!("loaded {} bytes from {}", data.len(), path.display());
    Ok(data)
}
