//! Host-side library for the Saturn USB flash cartridge.
//!
//! [`Client`] speaks the cartridge command protocol over any [`Link`];
//! [`SerialLink`] finds and opens the cartridge's USB FIFO bridge.

pub mod client;
pub mod error;
pub mod link;
pub mod progress;
pub mod utils;

pub use client::{Client, TransferStats};
pub use error::{Error, Result};
pub use link::{Link, LinkConfig, SerialLink, StreamLink};

pub use satcart_core::protocol;
pub use satcart_core::{Checksum, checksum};
