//! Core of the Saturn USB flash cartridge tools.
//!
//! Everything in here is shared between the code that runs on the console
//! (the command dispatcher and the flash programmer) and the host tool
//! (checksums and command framing). Hardware is reached through the traits
//! in [`hal`], so the same logic runs against real registers or against the
//! simulated console in [`sim`].

#![cfg_attr(not(any(test, feature = "sim")), no_std)]

pub mod checksum;
pub mod dispatcher;
pub mod flash;
pub mod hal;
pub mod protocol;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use checksum::{Checksum, checksum};
pub use dispatcher::{Dispatcher, DispatcherConfig, Event, Handoff, UploadPath};
pub use flash::{Flash, FlashDevice, FlashError, FlashFamily, FlashId, PollLimit, Programmer};
pub use protocol::{Opcode, Request};
