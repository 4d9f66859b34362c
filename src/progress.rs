// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Progress reporting while tables load
//!
//! The client pool and the table builder publish events on a broadcast
//! channel; the CLI subscribes and drives a spinner from them.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

/// Create a spinner with consistent styling
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Progress update message
#[derive(Clone, Debug)]
pub enum ProgressUpdate {
    /// Creating a client for a context
    Connecting { context: String },
    /// Client for a context is ready
    Connected { context: String, elapsed_ms: u64 },
    /// A table started fetching from its contexts
    StartingTable { table: String, context_count: usize },
    /// One context of the current table delivered its rows
    ContextComplete {
        context: String,
        rows: usize,
        elapsed_ms: u64,
    },
    /// One context of the current table was skipped
    ContextFailed { context: String, error: String },
}

impl ProgressUpdate {
    /// One-line spinner message, `None` for events not worth showing
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Connecting { context } => Some(format!("Connecting to {}...", context)),
            Self::StartingTable {
                table,
                context_count,
            } if *context_count > 1 => {
                Some(format!("Loading {} from {} contexts...", table, context_count))
            }
            Self::StartingTable { table, .. } => Some(format!("Loading {}...", table)),
            Self::ContextComplete { context, rows, .. } => {
                Some(format!("{}: {} records", context, rows))
            }
            Self::ContextFailed { context, .. } => Some(format!("{}: skipped", context)),
            Self::Connected { .. } => None,
        }
    }
}

pub struct ProgressReporter {
    sender: broadcast::Sender<ProgressUpdate>,
    /// Contexts finished (or failed) for the current table
    contexts_done: AtomicUsize,
    /// Contexts in play for the current table
    contexts_total: AtomicUsize,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            sender,
            contexts_done: AtomicUsize::new(0),
            contexts_total: AtomicUsize::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }

    /// Report table start; resets the per-table counters
    pub fn start_table(&self, table: &str, context_count: usize) {
        self.contexts_done.store(0, Ordering::SeqCst);
        self.contexts_total.store(context_count, Ordering::SeqCst);
        let _ = self.sender.send(ProgressUpdate::StartingTable {
            table: table.to_string(),
            context_count,
        });
    }

    pub fn context_complete(&self, context: &str, rows: usize, elapsed_ms: u64) {
        self.contexts_done.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(ProgressUpdate::ContextComplete {
            context: context.to_string(),
            rows,
            elapsed_ms,
        });
    }

    pub fn context_failed(&self, context: &str, error: &str) {
        self.contexts_done.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(ProgressUpdate::ContextFailed {
            context: context.to_string(),
            error: error.to_string(),
        });
    }

    pub fn connecting(&self, context: &str) {
        let _ = self.sender.send(ProgressUpdate::Connecting {
            context: context.to_string(),
        });
    }

    pub fn connected(&self, context: &str, elapsed_ms: u64) {
        let _ = self.sender.send(ProgressUpdate::Connected {
            context: context.to_string(),
            elapsed_ms,
        });
    }

    /// Current progress (done/total) of the table being loaded
    pub fn progress(&self) -> (usize, usize) {
        (
            self.contexts_done.load(Ordering::SeqCst),
            self.contexts_total.load(Ordering::SeqCst),
        )
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to progress reporter
pub type ProgressHandle = Arc<ProgressReporter>;

pub fn create_progress_handle() -> ProgressHandle {
    Arc::new(ProgressReporter::new())
}
