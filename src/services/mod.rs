//! Services module - the asset sorting and converter batch engine.
//!
//! Nothing in here knows about a front-end. Callers hand in settings, a [`LogSink`] and a
//! version root; they get back summaries, progress events and files on disk.
//!
//! # Components
//!
//! - [`ManifestLoader`]: reads a workbook ([`ManifestWorkbook`] via calamine, or an in-memory
//!   [`MemoryWorkbook`]) into ordered [`ManifestRecord`](crate::models::ManifestRecord)s.
//!   Handles both the combined sheet and the split mesh/animation sheets.
//!
//! - [`CopyScheduler`]: copies every populated slot of every record into
//!   `<sorted>/<version>/<category>/<folder>/` under a run-wide concurrency cap, and removes
//!   folders that ended up with nothing in them. Filesystem access goes through [`AssetFs`].
//!
//! - [`OutputLayout`] / [`VersionSource`]: pure path policy for the sorted and FBX trees.
//!
//! - [`BatchCommandGenerator`]: pairs skeleton and pose files per directory into converter
//!   commands; [`write_script`] and [`ConverterRunner`] consume them.
//!
//! - [`SortPipeline`]: composes all of the above with a stop flag and a progress reporter.
//!
//! # Usage Example
//!
//! ```ignore
//! use kathana_sorter::services::{SortPipeline, TracingSink};
//!
//! let pipeline = SortPipeline::new(settings, Arc::new(TracingSink));
//! let summary = pipeline
//!     .sort_category(Utf8Path::new("D:/Games/Kathana3.2"), EntityCategory::Monster)
//!     .await?;
//! pipeline.write_category_script("Kathana3.2", EntityCategory::Monster)?;
//! ```

pub mod batch;
pub mod context;
pub mod copier;
pub mod layout;
pub mod log_sink;
pub mod manifest;
pub mod pipeline;

pub use batch::{
    BatchCommand, BatchCommandGenerator, BatchError, ConversionSummary, ConverterRunner,
    write_script,
};
pub use context::{RunContext, StopHandle};
pub use copier::{AssetFs, CopyScheduler, LocalFs, RecordPlan, copy_one};
pub use layout::{
    LayoutError, OutputLayout, VersionSource, fbx_output_for, is_entity_dir_of,
    is_plain_folder_name, source_path,
};
pub use log_sink::{
    EventKind, FanoutSink, LogEvent, LogLevel, LogSink, MemorySink, QueuedFileSink,
    QueuedFileSinkGuard, TracingSink,
};
pub use manifest::{Grid, ManifestError, ManifestLoader, ManifestWorkbook, MemoryWorkbook, SheetSource};
pub use pipeline::{CategoryOutcome, PipelineError, SortPipeline};
