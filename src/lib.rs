// Kathana Sorter - per-entity asset sorting and converter batch generation
//
// This is the library crate containing the sorting engine and data structures.
// The binary crate (main.rs) provides a command-line front-end.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::RunSummary;
pub use models::{EntityCategory, ManifestRecord, SorterConfig, SorterSettings};
pub use services::{LogSink, SortPipeline, StopHandle};
pub use state::{ProgressEvent, ProgressReporter, ProgressState};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
