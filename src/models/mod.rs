//! Data models for the sorter.
//!
//! - [`EntityCategory`], [`ManifestRecord`], [`CopyTask`], [`CopyOutcome`]: the values that flow
//!   from the manifest through the copy scheduler
//! - [`SorterConfig`]: paths, concurrency cap, manifest layout and converter profile loaded
//!   from `Sorter Config.yaml`
//! - [`DEFAULT_MAX_CONCURRENT_COPIES`]: run-wide cap on simultaneous file copies

pub mod config;
pub mod entity;

pub use config::{
    AnimationOrientation, ConverterSettings, CopySettings, DEFAULT_MAX_CONCURRENT_COPIES,
    DEFAULT_MESH_SLOTS, LoggingSettings, ManifestLayout, ManifestSettings, PathSettings,
    SorterConfig, SorterSettings, VersionEntry,
};
pub use entity::{AssetKind, CopyOutcome, CopyTask, EntityCategory, ManifestRecord};
