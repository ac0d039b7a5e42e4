//! Command loop running on the console.
//!
//! The dispatcher waits for an opcode on the USB FIFO, performs the
//! download, upload or execute it names and goes back to waiting. Unknown
//! opcodes are dropped without an answer. Addresses and lengths come
//! straight from the host and are not checked.
//!
//! Execute ends the loop: [`Dispatcher::serve`] hands the entry point back
//! to the caller instead of returning to the idle state.

use crate::checksum::Checksum;
use crate::hal::{Chcr, Color, Console, Dmaor, USB_FIFO_ADDRESS};
use crate::protocol::{Opcode, RESULT_CHECKSUM_MISMATCH, RESULT_OK, USB_OUT_EP_SIZE};

/// How upload payloads leave the FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPath {
    /// DMA channel 0, one endpoint-sized chunk at a time.
    Dma,
    /// One polled byte at a time.
    Pio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub upload: UploadPath,
    /// Refresh intervals the red error screen is held after a failed upload.
    pub error_hold_frames: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            upload: UploadPath::Dma,
            // two seconds at 60 Hz
            error_hold_frames: 60 * 2,
        }
    }
}

/// Entry point requested by an execute command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handoff {
    entry: u32,
}

impl Handoff {
    pub fn entry(&self) -> u32 {
        self.entry
    }
}

/// Outcome of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Download { address: u32, length: u32 },
    Upload { address: u32, length: u32, verified: bool },
    Ignored { opcode: u8 },
    Execute(Handoff),
}

pub struct Dispatcher<C> {
    console: C,
    config: DispatcherConfig,
}

impl<C: Console> Dispatcher<C> {
    pub fn new(console: C) -> Self {
        Self::with_config(console, DispatcherConfig::default())
    }

    pub fn with_config(console: C, config: DispatcherConfig) -> Self {
        Self { console, config }
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    /// Firmware main loop. Serves commands, calls whatever they ask to run
    /// and starts over with fresh video should that code return.
    pub fn run(mut self) -> ! {
        self.console.init_video();
        loop {
            let handoff = self.serve();
            self.console.call(handoff.entry());
            self.console.init_video();
        }
    }

    /// Serve commands until one asks to execute.
    pub fn serve(&mut self) -> Handoff {
        loop {
            if let Event::Execute(handoff) = self.step() {
                return handoff;
            }
        }
    }

    /// Wait for one opcode and carry it out.
    pub fn step(&mut self) -> Event {
        self.set_color(Color::Green);
        let opcode = self.recv_byte();
        match Opcode::try_from(opcode) {
            Ok(Opcode::Download) => self.download(),
            Ok(Opcode::Upload) => {
                if self.config.upload == UploadPath::Dma {
                    self.init_dma();
                }
                let event = self.upload();
                if self.config.upload == UploadPath::Dma {
                    self.reset_dma();
                }
                event
            }
            Ok(Opcode::Execute) => {
                let entry = self.recv_dword();
                tracing::debug!("execute at 0x{:08X}", entry);
                Event::Execute(Handoff { entry })
            }
            Err(opcode) => {
                tracing::trace!("ignoring opcode 0x{:02X}", opcode);
                Event::Ignored { opcode }
            }
        }
    }

    fn download(&mut self) -> Event {
        self.set_color(Color::Orange);
        let address = self.recv_dword();
        let length = self.recv_dword();
        tracing::debug!("download 0x{:08X} bytes from 0x{:08X}", length, address);

        let mut checksum = Checksum::new();
        for i in 0..length {
            let byte = self.console.read_u8(address.wrapping_add(i));
            self.send_byte(byte);
            checksum.push(byte);
        }
        self.send_byte(checksum.finalize());

        Event::Download { address, length }
    }

    fn upload(&mut self) -> Event {
        self.set_color(Color::Orange);
        let address = self.recv_dword();
        let length = self.recv_dword();
        tracing::debug!("upload 0x{:08X} bytes to 0x{:08X}", length, address);

        match self.config.upload {
            UploadPath::Dma => self.receive_dma(address, length),
            UploadPath::Pio => {
                for i in 0..length {
                    let byte = self.recv_byte();
                    self.console.write_u8(address.wrapping_add(i), byte);
                }
            }
        }

        let expected = self.recv_byte();

        self.console.purge_cache();
        let mut checksum = Checksum::new();
        for i in 0..length {
            checksum.push(self.console.read_u8(address.wrapping_add(i)));
        }
        let actual = checksum.finalize();

        let verified = actual == expected;
        if verified {
            self.send_byte(RESULT_OK);
        } else {
            tracing::warn!(
                "upload checksum mismatch: computed 0x{:02X}, host sent 0x{:02X}",
                actual,
                expected
            );
            self.send_byte(RESULT_CHECKSUM_MISMATCH);
            self.signal_error();
        }

        Event::Upload {
            address,
            length,
            verified,
        }
    }

    fn receive_dma(&mut self, mut address: u32, mut length: u32) {
        const CHUNK: u32 = USB_OUT_EP_SIZE as u32;
        while length > CHUNK {
            self.dma_chunk(address, CHUNK);
            address = address.wrapping_add(CHUNK);
            length -= CHUNK;
        }
        if length > 0 {
            self.dma_chunk(address, length);
        }
    }

    /// One single-shot transfer: start once the FIFO has data, then wait
    /// for transfer end.
    fn dma_chunk(&mut self, address: u32, length: u32) {
        self.clear_chcr();
        self.console.write_dar(address);
        self.console.write_tcr(length);
        self.wait_rx();
        self.console.write_chcr(Chcr::fifo_to_memory());
        while !self.console.read_chcr().te() {}
    }

    fn init_dma(&mut self) {
        self.clear_chcr();
        self.console.write_sar(USB_FIFO_ADDRESS);
        let _ = self.console.read_dmaor();
        self.console.write_dmaor(Dmaor::enabled());
    }

    fn reset_dma(&mut self) {
        self.clear_chcr();
        let _ = self.console.read_dmaor();
        self.console.write_dmaor(Dmaor::default());
    }

    /// TE must be read before the channel can be cleared.
    fn clear_chcr(&mut self) {
        let _ = self.console.read_chcr();
        self.console.write_chcr(Chcr::default());
    }

    fn signal_error(&mut self) {
        self.set_color(Color::Red);
        for _ in 0..self.config.error_hold_frames {
            self.console.wait_vblank();
        }
    }

    fn set_color(&mut self, color: Color) {
        self.console.set_back_color(color.rgb555());
    }

    fn wait_rx(&mut self) {
        while self.console.flags().rx_empty() {}
    }

    fn recv_byte(&mut self) -> u8 {
        self.wait_rx();
        self.console.read_fifo()
    }

    fn recv_dword(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        for byte in bytes.iter_mut() {
            *byte = self.recv_byte();
        }
        u32::from_be_bytes(bytes)
    }

    fn send_byte(&mut self, byte: u8) {
        while self.console.flags().tx_full() {}
        self.console.write_fifo(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum;
    use crate::sim::SimConsole;

    const RAM: u32 = 0x0600_0000;

    fn frame(opcode: u8, address: u32, length: u32) -> Vec<u8> {
        let mut bytes = vec![opcode];
        bytes.extend_from_slice(&address.to_be_bytes());
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes
    }

    #[test]
    fn download_streams_memory_and_checksum() {
        let mut console = SimConsole::new(RAM, 0x1000);
        let data: Vec<u8> = (0..100u8).collect();
        console.load(RAM + 0x10, &data);
        console.push_rx(&frame(1, RAM + 0x10, 100));

        let mut dispatcher = Dispatcher::new(console);
        assert_eq!(
            dispatcher.step(),
            Event::Download {
                address: RAM + 0x10,
                length: 100
            }
        );

        let sent = dispatcher.console_mut().take_tx();
        assert_eq!(&sent[..100], data.as_slice());
        assert_eq!(sent[100], checksum(&data));
        assert_eq!(sent.len(), 101);
    }

    #[test]
    fn zero_length_download_sends_only_checksum() {
        let mut console = SimConsole::new(RAM, 0x100);
        console.push_rx(&frame(1, RAM, 0));
        let mut dispatcher = Dispatcher::new(console);
        dispatcher.step();
        assert_eq!(dispatcher.console_mut().take_tx(), vec![0x00]);
    }

    #[test]
    fn dma_upload_in_endpoint_chunks() {
        let mut console = SimConsole::new(RAM, 0x1000);
        let data: Vec<u8> = (0..200u32).map(|i| (i * 3) as u8).collect();
        console.push_rx(&frame(2, RAM + 0x100, 200));
        console.push_rx(&data);
        console.push_rx(&[checksum(&data)]);

        let mut dispatcher = Dispatcher::new(console);
        assert_eq!(
            dispatcher.step(),
            Event::Upload {
                address: RAM + 0x100,
                length: 200,
                verified: true
            }
        );

        let console = dispatcher.console_mut();
        assert_eq!(console.memory(RAM + 0x100, 200), data.as_slice());
        assert_eq!(console.take_tx(), vec![RESULT_OK]);
        assert_eq!(console.dma_chunks(), &[64, 64, 64, 8]);
        assert_eq!(console.cache_purges(), 1);
        assert!(!console.dma_enabled());
    }

    #[test]
    fn dma_upload_of_whole_endpoints_has_no_empty_tail() {
        let mut console = SimConsole::new(RAM, 0x1000);
        let data = [0xA5u8; 128];
        console.push_rx(&frame(2, RAM, 128));
        console.push_rx(&data);
        console.push_rx(&[checksum(&data)]);

        let mut dispatcher = Dispatcher::new(console);
        assert!(matches!(
            dispatcher.step(),
            Event::Upload { verified: true, .. }
        ));

        let console = dispatcher.console_mut();
        assert_eq!(console.memory(RAM, 128), &data[..]);
        assert_eq!(console.dma_chunks(), &[64, 64]);
        assert_eq!(console.take_tx(), vec![RESULT_OK]);
    }

    #[test]
    fn pio_upload_stores_bytes() {
        let mut console = SimConsole::new(RAM, 0x100);
        let data = [0xAA, 0x55, 0x01];
        console.push_rx(&frame(2, RAM, 3));
        console.push_rx(&data);
        console.push_rx(&[checksum(&data)]);

        let config = DispatcherConfig {
            upload: UploadPath::Pio,
            ..DispatcherConfig::default()
        };
        let mut dispatcher = Dispatcher::with_config(console, config);
        dispatcher.step();

        let console = dispatcher.console_mut();
        assert_eq!(console.memory(RAM, 3), &data);
        assert!(console.dma_chunks().is_empty());
        assert_eq!(console.take_tx(), vec![RESULT_OK]);
    }

    #[test]
    fn bad_checksum_is_reported_and_shown() {
        let mut console = SimConsole::new(RAM, 0x1000);
        let data = vec![0x42u8; 200];
        console.push_rx(&frame(2, RAM, 200));
        console.push_rx(&data);
        console.push_rx(&[checksum(&data) ^ 0xFF]);

        let mut dispatcher = Dispatcher::new(console);
        assert_eq!(
            dispatcher.step(),
            Event::Upload {
                address: RAM,
                length: 200,
                verified: false
            }
        );

        let console = dispatcher.console_mut();
        assert_eq!(console.take_tx(), vec![RESULT_CHECKSUM_MISMATCH]);
        assert_eq!(console.colors().last(), Some(&Color::Red.rgb555()));
        assert_eq!(console.vblanks(), 120);
    }

    #[test]
    fn unknown_opcode_is_dropped() {
        let mut console = SimConsole::new(RAM, 0x100);
        console.push_rx(&[0x7F]);
        let mut dispatcher = Dispatcher::new(console);
        assert_eq!(dispatcher.step(), Event::Ignored { opcode: 0x7F });
        assert!(dispatcher.console_mut().take_tx().is_empty());
    }

    #[test]
    fn serve_returns_on_execute_only() {
        let mut console = SimConsole::new(RAM, 0x100);
        console.push_rx(&[0x00, 0x09]);
        console.push_rx(&frame(1, RAM, 4));
        console.push_rx(&[3, 0x06, 0x00, 0x40, 0x00]);

        let mut dispatcher = Dispatcher::new(console);
        let handoff = dispatcher.serve();

        assert_eq!(handoff.entry(), 0x0600_4000);
        let console = dispatcher.console_mut();
        assert_eq!(console.take_tx().len(), 5);
        assert!(console.calls().is_empty());
        assert_eq!(console.colors().first(), Some(&Color::Green.rgb555()));
    }
}
