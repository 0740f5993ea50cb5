//! Per-run collaborators handed to the engine by its caller.

use crate::services::log_sink::LogSink;
use crate::state::ProgressReporter;
use std::sync::Arc;
use tokio::sync::watch;

/// Coarse stop flag. Cloneable; every clone flips the same flag.
///
/// The engine polls it between records and between converter invocations. Work already in
/// flight always finishes.
#[derive(Clone, Debug)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn request_stop(&self) {
        self.tx.send_replace(true);
        tracing::info!("Stop requested");
    }

    /// Clear a previous stop request before starting a new run.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a run reports into.
#[derive(Clone)]
pub struct RunContext {
    pub sink: Arc<dyn LogSink>,
    pub progress: Arc<ProgressReporter>,
    stop: watch::Receiver<bool>,
}

impl RunContext {
    pub fn new(
        sink: Arc<dyn LogSink>,
        progress: Arc<ProgressReporter>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sink,
            progress,
            stop,
        }
    }

    /// A context with its own progress reporter and a stop flag nobody can raise.
    pub fn detached(sink: Arc<dyn LogSink>) -> Self {
        Self::new(
            sink,
            Arc::new(ProgressReporter::new()),
            StopHandle::new().subscribe(),
        )
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::log_sink::MemorySink;

    #[test]
    fn test_stop_handle_reaches_context() {
        let stop = StopHandle::new();
        let ctx = RunContext::new(
            Arc::new(MemorySink::new()),
            Arc::new(ProgressReporter::new()),
            stop.subscribe(),
        );

        assert!(!ctx.is_stopped());
        stop.clone().request_stop();
        assert!(ctx.is_stopped());
        assert!(stop.is_stop_requested());

        stop.reset();
        assert!(!ctx.is_stopped());
    }

    #[test]
    fn test_detached_context_never_stops() {
        let ctx = RunContext::detached(Arc::new(MemorySink::new()));
        assert!(!ctx.is_stopped());
    }
}
