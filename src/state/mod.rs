// Progress state module
//
// This module provides the ProgressReporter which tracks completed vs. total work items
// for a run and broadcasts progress events to any number of subscribers (GUI, CLI, ...).

use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Completed vs. total work items for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub completed: usize,
    pub total: usize,
}

impl ProgressState {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    /// `floor(100 * completed / total)`, or 0 when there is nothing to do.
    ///
    /// This is the only place a percentage is computed.
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let completed = self.completed.min(self.total) as u128;
        ((completed * 100) / self.total as u128) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

/// Events emitted while a run makes progress
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// A run has started with a fixed denominator
    Started { label: String, total: usize },

    /// One more work item finished (success or failure)
    Advanced(ProgressState),

    /// The run is over
    Finished { label: String, state: ProgressState },
}

struct Inner {
    label: String,
    state: ProgressState,
}

/// Thread-safe progress tracker with event emission
///
/// Copy tasks call [`advance()`](Self::advance) concurrently. The counter increment and the
/// broadcast happen under one lock, so subscribers always observe non-decreasing counts.
///
/// # Usage
///
/// - [`start()`](Self::start) resets the counter and fixes the total
/// - [`advance()`](Self::advance) after each finished work item
/// - [`subscribe()`](Self::subscribe) to render updates
pub struct ProgressReporter {
    inner: Mutex<Inner>,

    /// Broadcast channel for progress events
    events_tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressReporter {
    /// Create a new ProgressReporter with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(100);
        Self {
            inner: Mutex::new(Inner {
                label: String::new(),
                state: ProgressState::default(),
            }),
            events_tx,
        }
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events_tx.subscribe()
    }

    /// Begin a new run of `total` work items
    pub fn start(&self, label: impl Into<String>, total: usize) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.label = label.into();
        inner.state = ProgressState::new(0, total);

        // Ignore send errors - it's OK if no one is listening
        let _ = self.events_tx.send(ProgressEvent::Started {
            label: inner.label.clone(),
            total,
        });
    }

    /// Record one finished work item and return the new state
    pub fn advance(&self) -> ProgressState {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.state.completed += 1;
        let state = inner.state;
        let _ = self.events_tx.send(ProgressEvent::Advanced(state));
        state
    }

    /// Mark the current run as finished
    pub fn finish(&self) -> ProgressState {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self.events_tx.send(ProgressEvent::Finished {
            label: inner.label.clone(),
            state: inner.state,
        });
        inner.state
    }

    /// Current state without waiting for events
    pub fn snapshot(&self) -> ProgressState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn percentage(&self) -> u8 {
        self.snapshot().percentage()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
