//! The caller-facing engine: sort categories, then generate, write or run converter commands.
//!
//! A front-end (the bundled CLI, a GUI, a service) builds one [`SortPipeline`] from the
//! loaded settings, subscribes to [`SortPipeline::progress`], and keeps a
//! [`StopHandle`] around for cancellation.

use crate::metrics::RunSummary;
use crate::models::{EntityCategory, SorterSettings};
use crate::services::batch::{
    BatchCommand, BatchCommandGenerator, BatchError, ConversionSummary, ConverterRunner,
    write_script,
};
use crate::services::context::{RunContext, StopHandle};
use crate::services::copier::{AssetFs, CopyScheduler, LocalFs};
use crate::services::layout::{LayoutError, OutputLayout, VersionSource};
use crate::services::log_sink::{EventKind, LogEvent, LogSink};
use crate::services::manifest::{ManifestError, ManifestLoader, ManifestWorkbook, SheetSource};
use crate::state::ProgressReporter;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// What happened to one category in a full pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    Sorted(RunSummary),
    /// The manifest has no sheet for this category; other categories still ran.
    SheetMissing,
    /// The stop flag was raised before this category started.
    Skipped,
}

pub struct SortPipeline<F: AssetFs = LocalFs> {
    settings: SorterSettings,
    layout: OutputLayout,
    loader: ManifestLoader,
    scheduler: CopyScheduler<F>,
    generator: BatchCommandGenerator,
    sink: Arc<dyn LogSink>,
    progress: Arc<ProgressReporter>,
    stop: StopHandle,
}

impl SortPipeline<LocalFs> {
    pub fn new(settings: SorterSettings, sink: Arc<dyn LogSink>) -> Self {
        Self::with_fs(settings, sink, Arc::new(LocalFs))
    }
}

impl<F: AssetFs> SortPipeline<F> {
    pub fn with_fs(settings: SorterSettings, sink: Arc<dyn LogSink>, fs: Arc<F>) -> Self {
        let layout = OutputLayout::new(
            settings.paths.sorted_root.clone(),
            settings.paths.fbx_root.clone(),
        );
        Self {
            loader: ManifestLoader::new(settings.manifest.clone()),
            scheduler: CopyScheduler::new(fs, layout.clone(), settings.copy.max_concurrent),
            generator: BatchCommandGenerator::new(settings.converter.clone()),
            layout,
            settings,
            sink,
            progress: Arc::new(ProgressReporter::new()),
            stop: StopHandle::new(),
        }
    }

    pub fn settings(&self) -> &SorterSettings {
        &self.settings
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn progress(&self) -> Arc<ProgressReporter> {
        self.progress.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    fn context(&self) -> RunContext {
        RunContext::new(
            self.sink.clone(),
            self.progress.clone(),
            self.stop.subscribe(),
        )
    }

    /// Open the configured manifest workbook. An unreadable file is logged and returned.
    pub fn open_manifest(&self) -> Result<ManifestWorkbook, PipelineError> {
        self.open_manifest_at(&self.settings.paths.manifest)
    }

    pub fn open_manifest_at(&self, path: &Utf8Path) -> Result<ManifestWorkbook, PipelineError> {
        ManifestWorkbook::open(path).map_err(|e| {
            self.sink
                .append(LogEvent::new(EventKind::ManifestUnreadable, e.to_string()));
            e.into()
        })
    }

    /// Sort one category from the configured manifest.
    pub async fn sort_category(
        &self,
        version_root: &Utf8Path,
        category: EntityCategory,
    ) -> Result<RunSummary, PipelineError> {
        let mut manifest = self.open_manifest()?;
        self.stop.reset();
        self.sort_category_from(&mut manifest, version_root, category)
            .await
    }

    /// Sort one category from any sheet source.
    pub async fn sort_category_from<S: SheetSource + ?Sized>(
        &self,
        manifest: &mut S,
        version_root: &Utf8Path,
        category: EntityCategory,
    ) -> Result<RunSummary, PipelineError> {
        let version = VersionSource::from_root(version_root)?;
        let records = match self.loader.load(manifest, category, self.sink.as_ref()) {
            Ok(records) => records,
            Err(e) => {
                self.report_manifest_error(&e);
                return Err(e.into());
            }
        };

        let summary = self
            .scheduler
            .run(&records, &version, category, &self.context())
            .await;
        summary.log_summary(&format!("{} {}", version.name(), category));
        Ok(summary)
    }

    /// Sort every category from the configured manifest.
    pub async fn sort_all(
        &self,
        version_root: &Utf8Path,
    ) -> Result<IndexMap<EntityCategory, CategoryOutcome>, PipelineError> {
        let mut manifest = self.open_manifest()?;
        self.stop.reset();
        self.sort_all_from(&mut manifest, version_root).await
    }

    /// Sort every category in order. A missing sheet only skips its own category.
    pub async fn sort_all_from<S: SheetSource + ?Sized>(
        &self,
        manifest: &mut S,
        version_root: &Utf8Path,
    ) -> Result<IndexMap<EntityCategory, CategoryOutcome>, PipelineError> {
        // Reject a bad root before touching any category.
        VersionSource::from_root(version_root)?;
        let mut outcomes = IndexMap::new();

        for category in EntityCategory::ALL {
            if self.stop.is_stop_requested() {
                outcomes.insert(category, CategoryOutcome::Skipped);
                continue;
            }

            let outcome = match self
                .sort_category_from(&mut *manifest, version_root, category)
                .await
            {
                Ok(summary) => CategoryOutcome::Sorted(summary),
                Err(PipelineError::Manifest(ManifestError::SheetMissing { .. })) => {
                    CategoryOutcome::SheetMissing
                }
                Err(e) => return Err(e),
            };
            outcomes.insert(category, outcome);
        }

        Ok(outcomes)
    }

    fn report_manifest_error(&self, error: &ManifestError) {
        let kind = match error {
            ManifestError::SheetMissing { .. } => EventKind::ManifestSheetMissing,
            ManifestError::Unreadable { .. } => EventKind::ManifestUnreadable,
        };
        self.sink.append(LogEvent::new(kind, error.to_string()));
    }

    /// Converter commands for one already-sorted category.
    pub fn generate_commands(
        &self,
        version: &str,
        category: EntityCategory,
    ) -> Result<Vec<BatchCommand>, PipelineError> {
        Ok(self.generator.generate(
            &self.layout.category_root(version, category),
            &self.layout.fbx_category_root(version, category),
        )?)
    }

    /// Write `generate_<category>_fbx.bat` for one category. Returns the script path.
    pub fn write_category_script(
        &self,
        version: &str,
        category: EntityCategory,
    ) -> Result<Utf8PathBuf, PipelineError> {
        let commands = self.generate_commands(version, category)?;
        let path = self.layout.category_script_path(version, category);
        write_script(&path, &commands)?;
        self.sink.append(LogEvent::new(
            EventKind::ScriptWritten,
            format!("Wrote {} commands to {}", commands.len(), path),
        ));
        Ok(path)
    }

    /// Write `generate_all_fbx.bat` with every category's commands, in category order.
    pub fn write_combined_script(&self, version: &str) -> Result<Utf8PathBuf, PipelineError> {
        let mut commands = Vec::new();
        for category in EntityCategory::ALL {
            commands.extend(self.generate_commands(version, category)?);
        }

        let path = self.layout.combined_script_path(version);
        write_script(&path, &commands)?;
        self.sink.append(LogEvent::new(
            EventKind::ScriptWritten,
            format!("Wrote {} commands to {}", commands.len(), path),
        ));
        Ok(path)
    }

    /// Run the converter for one category right away, one command at a time.
    pub async fn convert_category(
        &self,
        version: &str,
        category: EntityCategory,
    ) -> Result<ConversionSummary, PipelineError> {
        let commands = self
            .generator
            .generate_async(
                self.layout.category_root(version, category),
                self.layout.fbx_category_root(version, category),
            )
            .await?;
        self.stop.reset();
        let summary = ConverterRunner::new().run(&commands, &self.context()).await;
        tracing::info!(
            "{} {}: {} converter runs, {} non-zero exits, {} failed to start",
            version,
            category,
            summary.executed,
            summary.non_zero_exit,
            summary.failed_to_start
        );
        Ok(summary)
    }
}
