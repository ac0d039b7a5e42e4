//! Terminal progress output: indicatif bars on a terminal, plain percentage
//! lines when stdout is redirected.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use satcart_lib::progress::{ProgressCallback, ProgressId, ProgressInfo, ProgressType};
use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum PercentProgressState {
    Spinner,
    Bar {
        total: u64,
        current: u64,
        last_percent: u64,
    },
}

/// Prints one line per percent step.
pub struct PercentProgressCallback {
    progress_states: Mutex<HashMap<u64, PercentProgressState>>,
    next_id: AtomicU64,
}

impl PercentProgressCallback {
    pub fn new() -> Self {
        Self {
            progress_states: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn print_line(&self, line: &str) {
        let mut stdout = io::stdout();
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }

    fn calculate_percent(current: u64, total: u64) -> u64 {
        if total == 0 {
            return 100;
        }
        let percent = current.saturating_mul(100) / total;
        percent.min(100)
    }
}

impl ProgressCallback for PercentProgressCallback {
    fn start(&self, info: ProgressInfo) -> ProgressId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let state = match info.progress_type {
            ProgressType::Spinner => {
                self.print_line(&info.message);
                PercentProgressState::Spinner
            }
            ProgressType::Bar { total } => {
                let current = info.current.unwrap_or(0);
                let percent = Self::calculate_percent(current, total);
                self.print_line(&format!("{} {}%", info.message, percent));
                PercentProgressState::Bar {
                    total,
                    current,
                    last_percent: percent,
                }
            }
        };

        if let Ok(mut states) = self.progress_states.lock() {
            states.insert(id, state);
        }
        ProgressId(id)
    }

    fn update_message(&self, _id: ProgressId, _message: String) {}

    fn increment(&self, id: ProgressId, delta: u64) {
        let mut percent_to_print = None;
        if let Ok(mut states) = self.progress_states.lock()
            && let Some(PercentProgressState::Bar {
                total,
                current,
                last_percent,
            }) = states.get_mut(&id.0)
        {
            *current = current.saturating_add(delta);
            let percent = Self::calculate_percent(*current, *total);
            if percent != *last_percent {
                *last_percent = percent;
                percent_to_print = Some(percent);
            }
        }

        if let Some(percent) = percent_to_print {
            self.print_line(&format!("{}%", percent));
        }
    }

    fn finish(&self, id: ProgressId, final_message: String) {
        let removed = self
            .progress_states
            .lock()
            .ok()
            .and_then(|mut states| states.remove(&id.0));
        if removed.is_some() {
            self.print_line(&final_message);
        }
    }
}

pub struct IndicatifProgressCallback {
    multi_progress: MultiProgress,
    progress_bars: Mutex<HashMap<u64, ProgressBar>>,
    next_id: AtomicU64,
}

impl IndicatifProgressCallback {
    pub fn new() -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            progress_bars: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for IndicatifProgressCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for IndicatifProgressCallback {
    fn start(&self, info: ProgressInfo) -> ProgressId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let progress_bar = match info.progress_type {
            ProgressType::Spinner => {
                let spinner = self.multi_progress.add(ProgressBar::new_spinner());
                spinner.enable_steady_tick(Duration::from_millis(100));
                spinner.set_style(
                    ProgressStyle::with_template(&format!("[{}] {{spinner}} {{msg}}", info.prefix))
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.set_message(info.message);
                spinner
            }
            ProgressType::Bar { total } => {
                let bar = self.multi_progress.add(ProgressBar::new(total));
                bar.set_style(
                    ProgressStyle::with_template(&format!(
                        "[{}] {{msg}} {{wide_bar}} {{bytes_per_sec}} {{percent_precise}}%",
                        info.prefix
                    ))
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
                );
                bar.set_message(info.message);
                if let Some(current) = info.current {
                    bar.set_position(current);
                }
                bar
            }
        };

        if let Ok(mut bars) = self.progress_bars.lock() {
            bars.insert(id, progress_bar);
        }
        ProgressId(id)
    }

    fn update_message(&self, id: ProgressId, message: String) {
        if let Ok(bars) = self.progress_bars.lock()
            && let Some(bar) = bars.get(&id.0)
        {
            bar.set_message(message);
        }
    }

    fn increment(&self, id: ProgressId, delta: u64) {
        if let Ok(bars) = self.progress_bars.lock()
            && let Some(bar) = bars.get(&id.0)
        {
            bar.inc(delta);
        }
    }

    fn finish(&self, id: ProgressId, final_message: String) {
        if let Ok(mut bars) = self.progress_bars.lock()
            && let Some(bar) = bars.remove(&id.0)
        {
            bar.finish_with_message(final_message);
        }
    }
}

pub fn create_progress_callback() -> Arc<dyn ProgressCallback> {
    if io::stdout().is_terminal() {
        Arc::new(IndicatifProgressCallback::new())
    } else {
        Arc::new(PercentProgressCallback::new())
    }
}
