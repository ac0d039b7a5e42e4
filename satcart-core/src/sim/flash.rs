use crate::flash::{
    CMD_CHIP_ERASE, CMD_ERASE_SETUP, CMD_ID_ENTRY, CMD_ID_EXIT, CMD_PAGE_WRITE, CMD_SECTOR_ERASE,
    DQ7, ERASED_WORD, UNLOCK_ADDR1, UNLOCK_ADDR2, UNLOCK_DATA1, UNLOCK_DATA2,
};
use crate::hal::{FlashBus, Vblank};

/// How a simulated chip pair programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipModel {
    /// Buffers a page after the page-write command until the next refresh.
    PageWrite,
    /// One program command per word; completion through data polling.
    Sequenced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Unlock1,
    Unlocked,
    EraseSetup,
    EraseUnlock1,
    EraseUnlocked,
    Program,
    PageWrite,
}

/// A pair of flash chips on the 16-bit bus.
#[derive(Debug)]
pub struct SimFlash {
    model: ChipModel,
    vendor: u16,
    device: u16,
    memory: Vec<u16>,
    sector_size: u32,
    busy_reads: u32,
    stalled: bool,
    present: bool,
    state: State,
    id_mode: bool,
    busy: u32,
    writes: Vec<(u32, u16)>,
    vblanks: usize,
}

impl SimFlash {
    /// Erased chips of `rom_size` words answering with the given IDs.
    pub fn new(model: ChipModel, vendor: u16, device: u16, rom_size: u32) -> Self {
        Self {
            model,
            vendor,
            device,
            memory: vec![ERASED_WORD; rom_size as usize],
            sector_size: rom_size.max(1),
            busy_reads: 2,
            stalled: false,
            present: true,
            state: State::Idle,
            id_mode: false,
            busy: 0,
            writes: Vec::new(),
            vblanks: 0,
        }
    }

    /// An empty cartridge slot: the bus floats high and writes go nowhere.
    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::new(ChipModel::PageWrite, ERASED_WORD, ERASED_WORD, 0)
        }
    }

    pub fn with_sector_size(mut self, words: u32) -> Self {
        self.sector_size = words.max(1);
        self
    }

    /// Reads reporting "busy" after each program or erase.
    pub fn with_busy_reads(mut self, reads: u32) -> Self {
        self.busy_reads = reads;
        self
    }

    /// Never finishes a program or erase.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    pub fn fill(&mut self, word: u16) {
        self.memory.fill(word);
    }

    pub fn words(&self, offset: u32, len: u32) -> &[u16] {
        let start = offset as usize;
        &self.memory[start..start + len as usize]
    }

    /// Every bus write so far, as `(offset, value)`.
    pub fn writes(&self) -> &[(u32, u16)] {
        &self.writes
    }

    pub fn vblanks(&self) -> usize {
        self.vblanks
    }

    fn start_busy(&mut self) {
        self.busy = if self.stalled { u32::MAX } else { self.busy_reads };
    }

    fn store(&mut self, offset: u32, value: u16) {
        if let Some(word) = self.memory.get_mut(offset as usize) {
            *word = value;
        }
    }

    fn program(&mut self, offset: u32, value: u16) {
        if let Some(word) = self.memory.get_mut(offset as usize) {
            // programming only clears bits
            *word &= value;
        }
        self.start_busy();
    }

    fn erase_sector(&mut self, offset: u32) {
        let start = (offset / self.sector_size * self.sector_size) as usize;
        let end = (start + self.sector_size as usize).min(self.memory.len());
        if start < end {
            self.memory[start..end].fill(ERASED_WORD);
        }
        self.start_busy();
    }

    fn command(&mut self, offset: u32, value: u16) -> State {
        match (self.state, offset, value) {
            (_, _, CMD_ID_EXIT) => {
                self.id_mode = false;
                State::Idle
            }
            (State::Idle, UNLOCK_ADDR1, UNLOCK_DATA1) => State::Unlock1,
            (State::Unlock1, UNLOCK_ADDR2, UNLOCK_DATA2) => State::Unlocked,
            (State::Unlocked, UNLOCK_ADDR1, CMD_PAGE_WRITE) => match self.model {
                ChipModel::PageWrite => State::PageWrite,
                ChipModel::Sequenced => State::Program,
            },
            (State::Unlocked, UNLOCK_ADDR1, CMD_ID_ENTRY) => {
                self.id_mode = true;
                State::Idle
            }
            (State::Unlocked, UNLOCK_ADDR1, CMD_ERASE_SETUP) => State::EraseSetup,
            (State::EraseSetup, UNLOCK_ADDR1, UNLOCK_DATA1) => State::EraseUnlock1,
            (State::EraseUnlock1, UNLOCK_ADDR2, UNLOCK_DATA2) => State::EraseUnlocked,
            (State::EraseUnlocked, UNLOCK_ADDR1, CMD_CHIP_ERASE) => {
                self.memory.fill(ERASED_WORD);
                self.start_busy();
                State::Idle
            }
            (State::EraseUnlocked, _, CMD_SECTOR_ERASE) => {
                self.erase_sector(offset);
                State::Idle
            }
            _ => State::Idle,
        }
    }
}

impl FlashBus for SimFlash {
    fn read_word(&mut self, offset: u32) -> u16 {
        if !self.present {
            return ERASED_WORD;
        }
        if self.id_mode {
            match offset {
                0 => return self.vendor,
                1 => return self.device,
                _ => {}
            }
        }
        let word = self
            .memory
            .get(offset as usize)
            .copied()
            .unwrap_or(ERASED_WORD);
        if self.busy > 0 {
            if !self.stalled {
                self.busy -= 1;
            }
            // DQ7 reads inverted until the operation completes
            return word ^ DQ7;
        }
        word
    }

    fn write_word(&mut self, offset: u32, value: u16) {
        self.writes.push((offset, value));
        if !self.present {
            return;
        }
        self.state = match self.state {
            State::PageWrite => {
                self.store(offset, value);
                State::PageWrite
            }
            State::Program => {
                self.program(offset, value);
                State::Idle
            }
            _ => self.command(offset, value),
        };
    }
}

impl Vblank for SimFlash {
    fn wait_vblank(&mut self) {
        self.vblanks += 1;
        if self.state == State::PageWrite {
            self.state = State::Idle;
        }
    }
}
