use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::hal::{
    CacheControl, Chcr, Color, Cpu, DmaChannel, Dmaor, SystemBus, USB_FIFO_ADDRESS, UsbFifo,
    UsbFlags, Vblank, Video,
};

type Queue = Arc<Mutex<VecDeque<u8>>>;

fn lock(queue: &Queue) -> MutexGuard<'_, VecDeque<u8>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Console work RAM plus the registers the dispatcher uses.
///
/// The USB FIFO is a pair of byte queues shared with any [`HostPort`]
/// taken from the console, so the dispatcher can run on its own thread
/// while a host client talks to it.
#[derive(Debug)]
pub struct SimConsole {
    base: u32,
    memory: Vec<u8>,
    rx: Queue,
    tx: Queue,
    chcr: Chcr,
    dmaor: Dmaor,
    sar: u32,
    dar: u32,
    tcr: u32,
    dma_chunks: Vec<u32>,
    cache_purges: usize,
    colors: Vec<u16>,
    vblanks: usize,
    calls: Vec<u32>,
}

impl SimConsole {
    /// `size` bytes of RAM starting at `base`, zeroed.
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            memory: vec![0; size],
            rx: Queue::default(),
            tx: Queue::default(),
            chcr: Chcr::default(),
            dmaor: Dmaor::default(),
            sar: 0,
            dar: 0,
            tcr: 0,
            dma_chunks: Vec::new(),
            cache_purges: 0,
            colors: Vec::new(),
            vblanks: 0,
            calls: Vec::new(),
        }
    }

    /// Host end of the USB FIFO.
    pub fn host_port(&self) -> HostPort {
        HostPort {
            to_device: Arc::clone(&self.rx),
            from_device: Arc::clone(&self.tx),
        }
    }

    pub fn load(&mut self, address: u32, data: &[u8]) {
        let start = self.index(address).unwrap_or(self.memory.len());
        let end = (start + data.len()).min(self.memory.len());
        self.memory[start..end].copy_from_slice(&data[..end - start]);
    }

    pub fn memory(&self, address: u32, len: usize) -> &[u8] {
        let start = self.index(address).unwrap_or(self.memory.len());
        &self.memory[start..(start + len).min(self.memory.len())]
    }

    /// Queue bytes as if the host had sent them.
    pub fn push_rx(&mut self, bytes: &[u8]) {
        lock(&self.rx).extend(bytes);
    }

    /// Drain everything the dispatcher has sent.
    pub fn take_tx(&mut self) -> Vec<u8> {
        lock(&self.tx).drain(..).collect()
    }

    /// Transfer counts of the DMA transfers run so far.
    pub fn dma_chunks(&self) -> &[u32] {
        &self.dma_chunks
    }

    pub fn dma_enabled(&self) -> bool {
        self.dmaor.dme()
    }

    pub fn cache_purges(&self) -> usize {
        self.cache_purges
    }

    /// Every back screen colour set, oldest first.
    pub fn colors(&self) -> &[u16] {
        &self.colors
    }

    pub fn vblanks(&self) -> usize {
        self.vblanks
    }

    /// Entry points called so far.
    pub fn calls(&self) -> &[u32] {
        &self.calls
    }

    fn index(&self, address: u32) -> Option<usize> {
        let offset = address.checked_sub(self.base)? as usize;
        (offset < self.memory.len()).then_some(offset)
    }

    /// Block until the host has sent a byte.
    fn pop_rx(&mut self) -> u8 {
        loop {
            if let Some(byte) = lock(&self.rx).pop_front() {
                return byte;
            }
            thread::yield_now();
        }
    }

    fn run_dma(&mut self) {
        for i in 0..self.tcr {
            let byte = if self.sar == USB_FIFO_ADDRESS {
                self.pop_rx()
            } else {
                self.read_u8(self.sar.wrapping_add(i))
            };
            self.write_u8(self.dar.wrapping_add(i), byte);
        }
        self.dma_chunks.push(self.tcr);
        self.chcr.set_de(false);
        self.chcr.set_te(true);
    }
}

impl UsbFifo for SimConsole {
    fn flags(&mut self) -> UsbFlags {
        let mut flags = UsbFlags::default();
        flags.set_power_enable(true);
        if lock(&self.rx).is_empty() {
            flags.set_rx_empty(true);
            thread::yield_now();
        }
        flags
    }

    fn read_fifo(&mut self) -> u8 {
        self.pop_rx()
    }

    fn write_fifo(&mut self, byte: u8) {
        lock(&self.tx).push_back(byte);
    }
}

impl SystemBus for SimConsole {
    fn read_u8(&mut self, address: u32) -> u8 {
        self.index(address).map_or(0, |i| self.memory[i])
    }

    fn write_u8(&mut self, address: u32, value: u8) {
        if let Some(i) = self.index(address) {
            self.memory[i] = value;
        }
    }
}

impl DmaChannel for SimConsole {
    fn read_chcr(&mut self) -> Chcr {
        self.chcr
    }

    fn write_chcr(&mut self, chcr: Chcr) {
        self.chcr = chcr;
        if chcr.de() && self.dmaor.dme() {
            self.run_dma();
        }
    }

    fn write_sar(&mut self, address: u32) {
        self.sar = address;
    }

    fn write_dar(&mut self, address: u32) {
        self.dar = address;
    }

    fn write_tcr(&mut self, count: u32) {
        self.tcr = count;
    }

    fn read_dmaor(&mut self) -> Dmaor {
        self.dmaor
    }

    fn write_dmaor(&mut self, dmaor: Dmaor) {
        self.dmaor = dmaor;
    }
}

impl CacheControl for SimConsole {
    fn purge_cache(&mut self) {
        self.cache_purges += 1;
    }
}

impl Vblank for SimConsole {
    fn wait_vblank(&mut self) {
        self.vblanks += 1;
    }
}

impl Video for SimConsole {
    fn init_video(&mut self) {
        self.colors.push(Color::Black.rgb555());
    }

    fn set_back_color(&mut self, rgb555: u16) {
        self.colors.push(rgb555);
    }
}

impl Cpu for SimConsole {
    fn call(&mut self, entry: u32) {
        self.calls.push(entry);
    }
}

/// Host side of the simulated USB FIFO.
///
/// Reads never block: with nothing to read they return `Ok(0)`, the way a
/// serial port read times out.
#[derive(Debug, Clone)]
pub struct HostPort {
    to_device: Queue,
    from_device: Queue,
}

impl io::Read for HostPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = lock(&self.from_device);
        if queue.is_empty() {
            drop(queue);
            thread::yield_now();
            return Ok(0);
        }
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl io::Write for HostPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.to_device).extend(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
