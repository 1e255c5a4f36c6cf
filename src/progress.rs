//! Progress reporting and transfer profiles
//!
//! A `TransferProfile` replaces the old boot/exit mode flag: it carries the
//! object fetch timeout and where progress goes.

use crate::config::Config;
use crate::types::{TransferDirection, TransferStats};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Receives per-item progress from the transfer pool
pub trait ProgressSink: Send + Sync {
    /// `done` of `total` items have completed
    fn progressed(&self, direction: TransferDirection, done: usize, total: usize);

    /// Every item of the batch has completed
    fn finished(&self, direction: TransferDirection, total: usize);
}

/// Discards all progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn progressed(&self, _: TransferDirection, _: usize, _: usize) {}

    fn finished(&self, _: TransferDirection, _: usize) {}
}

/// Reports progress through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn progressed(&self, direction: TransferDirection, done: usize, total: usize) {
        tracing::info!(done, total, "{} {}/{}", direction.verb(), done, total);
    }

    fn finished(&self, direction: TransferDirection, total: usize) {
        tracing::info!(total, "{} finished", direction.verb());
    }
}

/// Progress event forwarded over a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progressed {
        direction: TransferDirection,
        done: usize,
        total: usize,
    },
    Finished {
        direction: TransferDirection,
        total: usize,
    },
}

/// Forwards progress to a channel, e.g. a startup splash or a push-message bus
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver paired with it
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn progressed(&self, direction: TransferDirection, done: usize, total: usize) {
        // A dropped receiver only means nobody is watching
        let _ = self.tx.send(ProgressEvent::Progressed {
            direction,
            done,
            total,
        });
    }

    fn finished(&self, direction: TransferDirection, total: usize) {
        let _ = self.tx.send(ProgressEvent::Finished { direction, total });
    }
}

/// Terminal progress bar
pub struct ConsoleSink {
    bar: ProgressBar,
}

impl ConsoleSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {msg} [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%)")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleSink {
    fn progressed(&self, direction: TransferDirection, done: usize, total: usize) {
        self.bar.set_message(direction.verb());
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
    }

    fn finished(&self, _: TransferDirection, _: usize) {
        self.bar.finish_and_clear();
    }
}

/// Timeout and progress destination for one reconciliation pass
#[derive(Clone)]
pub struct TransferProfile {
    /// Timeout for each object fetch
    pub timeout: Duration,

    /// Where progress is reported
    pub progress: Arc<dyn ProgressSink>,
}

impl TransferProfile {
    /// Startup or shutdown path: short timeout
    pub fn boot(config: &Config, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            timeout: config.short_timeout(),
            progress,
        }
    }

    /// Regular, user-triggered pass: long timeout
    pub fn interactive(config: &Config, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            timeout: config.long_timeout(),
            progress,
        }
    }

    /// No progress reporting
    pub fn quiet(timeout: Duration) -> Self {
        Self {
            timeout,
            progress: Arc::new(NoopSink),
        }
    }
}

impl std::fmt::Debug for TransferProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferProfile")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Format a file size for display
pub fn format_size(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Format a duration for display
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

/// Print a final summary after a pass
pub fn print_summary(direction: TransferDirection, stats: &TransferStats, elapsed_secs: f64) {
    let (moved, removed) = match direction {
        TransferDirection::Upload => ("Files uploaded:   ", "Remote removed:   "),
        TransferDirection::Download => ("Files downloaded: ", "Local removed:    "),
    };

    println!("\n=== Sync Complete ===");
    println!("Duration:          {}", format_duration(elapsed_secs));
    println!("{}{}", moved, stats.files_transferred);
    println!("{}{}", removed, stats.files_removed);
    println!("Bytes transferred: {}", format_size(stats.bytes_transferred));
}
