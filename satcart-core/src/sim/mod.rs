//! In-memory stand-ins for the cartridge hardware.
//!
//! [`SimFlash`] models the flash chips at the command level, [`SimConsole`]
//! models the registers the dispatcher touches, and [`HostPort`] is the host
//! end of the simulated USB FIFO.

mod console;
mod flash;

pub use console::{HostPort, SimConsole};
pub use flash::{ChipModel, SimFlash};
