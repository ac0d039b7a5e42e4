//! Progress reporting hooks.
//!
//! The library never draws anything itself. Front ends implement
//! [`ProgressCallback`] to show transfers however suits them (terminal
//! bars, plain percentages, nothing at all).

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use strum::Display;

#[derive(Debug, Clone)]
pub enum ProgressType {
    /// No known length, e.g. console mode.
    Spinner,
    /// Byte count known up front.
    Bar { total: u64 },
}

/// What a progress bar is reporting on. Displays as the bar's initial
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ProgressOperation {
    #[strum(to_string = "Downloading 0x{length:X} bytes from 0x{address:08X}")]
    Download { address: u32, length: u32 },

    #[strum(to_string = "Uploading 0x{length:X} bytes to 0x{address:08X}")]
    Upload { address: u32, length: u32 },

    #[strum(to_string = "Executing at 0x{address:08X}")]
    Execute { address: u32 },

    #[strum(to_string = "Console")]
    Console,
}

#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub progress_type: ProgressType,
    pub operation: ProgressOperation,
    /// Step number, formatted as hex.
    pub prefix: String,
    pub message: String,
    /// Only set for bars.
    pub current: Option<u64>,
}

pub trait ProgressCallback: Send + Sync {
    /// Start a new progress display and return its handle.
    fn start(&self, info: ProgressInfo) -> ProgressId;

    fn update_message(&self, id: ProgressId, message: String);

    /// Advance a bar by `delta` bytes.
    fn increment(&self, id: ProgressId, delta: u64);

    fn finish(&self, id: ProgressId, final_message: String);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressId(pub u64);

/// Reports nothing.
#[derive(Debug, Default)]
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn start(&self, _info: ProgressInfo) -> ProgressId {
        ProgressId(0)
    }

    fn update_message(&self, _id: ProgressId, _message: String) {}

    fn increment(&self, _id: ProgressId, _delta: u64) {}

    fn finish(&self, _id: ProgressId, _final_message: String) {}
}

pub type ProgressCallbackArc = Arc<dyn ProgressCallback>;

pub fn no_op_progress_callback() -> ProgressCallbackArc {
    Arc::new(NoOpProgressCallback)
}

/// Numbers the steps of a session and hands out progress handles.
pub struct ProgressHelper {
    callback: ProgressCallbackArc,
    step_counter: Arc<AtomicI32>,
}

impl ProgressHelper {
    pub fn new(callback: ProgressCallbackArc, initial_step: i32) -> Self {
        Self {
            callback,
            step_counter: Arc::new(AtomicI32::new(initial_step)),
        }
    }

    fn next_step(&self) -> i32 {
        self.step_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn create_spinner(&self, operation: ProgressOperation) -> ProgressHandler {
        self.start(ProgressType::Spinner, operation, None)
    }

    pub fn create_bar(&self, total: u64, operation: ProgressOperation) -> ProgressHandler {
        self.start(ProgressType::Bar { total }, operation, Some(0))
    }

    fn start(
        &self,
        progress_type: ProgressType,
        operation: ProgressOperation,
        current: Option<u64>,
    ) -> ProgressHandler {
        let step = self.next_step();
        let info = ProgressInfo {
            progress_type,
            operation,
            prefix: format!("0x{:02X}", step),
            message: operation.to_string(),
            current,
        };
        let id = self.callback.start(info);
        ProgressHandler {
            callback: Arc::clone(&self.callback),
            id,
        }
    }
}

/// One running progress display.
pub struct ProgressHandler {
    callback: ProgressCallbackArc,
    id: ProgressId,
}

impl ProgressHandler {
    pub fn set_message(&self, message: impl Into<String>) {
        self.callback.update_message(self.id, message.into());
    }

    pub fn inc(&self, delta: u64) {
        self.callback.increment(self.id, delta);
    }

    pub fn finish_with_message(self, message: impl Into<String>) {
        self.callback.finish(self.id, message.into());
    }
}
