//! Terminal progress display for a running transfer

use crate::upload::transfer::TransferProgress;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Redraw cadence while a transfer is running
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    pub fn new(total_bytes: u64, label: &str) -> Self {
        let bar = ProgressBar::new(total_bytes);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} {prefix}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(label.to_string());
        Self { bar }
    }

    /// Display that draws nothing, for non-interactive runs
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn update(&self, progress: &TransferProgress) {
        self.bar.set_length(progress.total_bytes);
        self.bar.set_position(progress.bytes_transferred);
        if progress.objects_total > 1 {
            self.bar.set_prefix(format!(
                "{}/{} files",
                progress.objects_done, progress.objects_total
            ));
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_display_tracks_position() {
        let display = ProgressDisplay::hidden();
        display.update(&TransferProgress {
            total_bytes: 100,
            bytes_transferred: 40,
            objects_done: 2,
            objects_total: 5,
        });
        assert_eq!(display.position(), 40);
        display.finish();
    }
}
