//! Progress tracking and reporting

use indicatif::{ProgressBar, ProgressStyle};

/// Byte-rate progress display for long copies
pub struct ProgressTracker {
    bar: ProgressBar,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}")
                .unwrap(),
        );
        Self { bar }
    }

    pub fn update(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
