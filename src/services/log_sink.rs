//! Structured success/error events and the sinks that receive them.
//!
//! The engine never owns log storage: every component is handed an `Arc<dyn LogSink>` and
//! only calls [`LogSink::append`]. Persistence cadence is the sink's business.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => f.write_str("ERROR"),
            LogLevel::Success => f.write_str("SUCCESS"),
        }
    }
}

/// What happened. The level is derived from the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Copied,
    SourceMissing,
    IoFailure,
    MissingFolderName,
    DuplicateFolderName,
    /// Folder name that is not a single plain path component (`..`, absolute paths).
    InvalidFolderName,
    DirectoryRemovedEmpty,
    ManifestSheetMissing,
    ManifestUnreadable,
    ScriptWritten,
}

impl EventKind {
    pub fn level(&self) -> LogLevel {
        match self {
            EventKind::Copied | EventKind::ScriptWritten => LogLevel::Success,
            _ => LogLevel::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub kind: EventKind,
    pub message: String,
}

impl LogEvent {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            level: kind.level(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Append-only receiver of [`LogEvent`]s. Must tolerate concurrent appends.
#[cfg_attr(test, mockall::automock)]
pub trait LogSink: Send + Sync {
    fn append(&self, event: LogEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn append(&self, event: LogEvent) {
        match event.level {
            LogLevel::Error => tracing::error!(kind = ?event.kind, "{}", event.message),
            LogLevel::Success => tracing::info!(kind = ?event.kind, "{}", event.message),
        }
    }
}

/// Keeps every event in memory. Handy for callers that render their own log view.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    pub fn messages(&self, kind: EventKind) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.message.clone())
            .collect()
    }
}

impl LogSink for MemorySink {
    fn append(&self, event: LogEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Appends to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl LogSink for FanoutSink {
    fn append(&self, event: LogEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.append(event.clone());
            }
            last.append(event);
        }
    }
}

/// Single-writer queue in front of a plain-text event log.
///
/// `append` only pushes onto an unbounded channel; a tokio task owns the file and writes
/// one `LEVEL<TAB>message` line per event. Drop every clone of the sink, then await the
/// [`QueuedFileSinkGuard`] to make sure the tail has been flushed.
#[derive(Clone)]
pub struct QueuedFileSink {
    tx: mpsc::UnboundedSender<LogEvent>,
}

pub struct QueuedFileSinkGuard {
    handle: JoinHandle<Result<usize>>,
    path: Utf8PathBuf,
}

impl QueuedFileSink {
    /// Open (append mode) `path` and spawn the writer task. Must be called inside a runtime.
    pub async fn spawn(path: &Utf8Path) -> Result<(Self, QueuedFileSinkGuard)> {
        if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create event log directory: {}", parent))?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open event log: {}", path))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<LogEvent>();
        let log_path = path.to_path_buf();

        let handle = tokio::spawn(async move {
            let mut writer = tokio::io::BufWriter::new(file);
            let mut written = 0usize;

            while let Some(event) = rx.recv().await {
                let line = format!("{}\t{}\n", event.level, event.message.replace('\n', " "));
                writer
                    .write_all(line.as_bytes())
                    .await
                    .with_context(|| format!("Failed to write event log: {}", log_path))?;
                written += 1;
            }

            writer
                .flush()
                .await
                .with_context(|| format!("Failed to flush event log: {}", log_path))?;
            Ok(written)
        });

        Ok((
            Self { tx },
            QueuedFileSinkGuard {
                handle,
                path: path.to_path_buf(),
            },
        ))
    }
}

impl LogSink for QueuedFileSink {
    fn append(&self, event: LogEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("Event log writer has stopped; dropping event");
        }
    }
}

impl QueuedFileSinkGuard {
    /// Wait for the writer to drain. Returns the number of lines written.
    pub async fn finish(self) -> Result<usize> {
        let written = self
            .handle
            .await
            .with_context(|| format!("Event log writer panicked: {}", self.path))??;
        tracing::debug!("Event log {} closed after {} lines", self.path, written);
        Ok(written)
    }
}
