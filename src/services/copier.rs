//! Bounded-concurrency copy of manifest records into the sorted tree.
//!
//! One [`Semaphore`] caps in-flight file copies across the whole run. Each record runs as its
//! own group task holding a [`JoinSet`] of copies; up to `max_concurrent` groups are in flight
//! at once, so copies from neighbouring records interleave. A group decides whether its output
//! directory stays only after every one of its copies has been joined.

use crate::metrics::{OutcomeCounters, RunSummary};
use crate::models::{AssetKind, CopyOutcome, CopyTask, EntityCategory, ManifestRecord};
use crate::services::context::RunContext;
use crate::services::layout::{OutputLayout, VersionSource, is_entity_dir_of};
use crate::services::log_sink::{EventKind, LogEvent, LogSink};
use crate::state::ProgressReporter;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// The filesystem operations the scheduler needs.
#[async_trait]
pub trait AssetFs: Send + Sync + 'static {
    /// True only for an existing regular file.
    async fn is_file(&self, path: &Utf8Path) -> bool;

    async fn create_dir_all(&self, path: &Utf8Path) -> io::Result<()>;

    /// Copy every byte of `from` to `to` and leave `to` writable.
    async fn copy_file(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()>;

    async fn remove_dir_all(&self, path: &Utf8Path) -> io::Result<()>;
}

/// The real filesystem, through `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

#[async_trait]
impl AssetFs for LocalFs {
    async fn is_file(&self, path: &Utf8Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn create_dir_all(&self, path: &Utf8Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn copy_file(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
        tokio::fs::copy(from, to).await?;

        // Game files often ship read-only; the copy inherits that.
        let mut permissions = tokio::fs::metadata(to).await?.permissions();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            permissions.set_mode(permissions.mode() | 0o200);
        }
        #[cfg(not(unix))]
        {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
        }
        tokio::fs::set_permissions(to, permissions).await
    }

    async fn remove_dir_all(&self, path: &Utf8Path) -> io::Result<()> {
        tokio::fs::remove_dir_all(path).await
    }
}

/// Execute one task. Never fails; every problem becomes an outcome.
pub async fn copy_one<F: AssetFs + ?Sized>(fs: &F, task: &CopyTask) -> CopyOutcome {
    if !fs.is_file(task.source()).await {
        return CopyOutcome::SourceMissing;
    }
    match fs.copy_file(task.source(), task.destination()).await {
        Ok(()) => CopyOutcome::Copied,
        Err(e) => CopyOutcome::IoFailure(e.to_string()),
    }
}

/// Copy plan for one record: its output directory and its tasks in slot order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPlan {
    pub folder_name: String,
    /// The only directory `directory` may live directly under.
    pub category_root: Utf8PathBuf,
    pub directory: Utf8PathBuf,
    pub tasks: Vec<CopyTask>,
}

pub struct CopyScheduler<F: AssetFs> {
    fs: Arc<F>,
    layout: OutputLayout,
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

impl<F: AssetFs> CopyScheduler<F> {
    /// `max_concurrent` below one is treated as one.
    pub fn new(fs: Arc<F>, layout: OutputLayout, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            fs,
            layout,
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Number of populated slots across `records`, the progress denominator.
    pub fn total_tasks(records: &[ManifestRecord]) -> usize {
        records.iter().map(ManifestRecord::slot_count).sum()
    }

    pub fn plan_record(
        &self,
        record: &ManifestRecord,
        version: &VersionSource,
        category: EntityCategory,
    ) -> RecordPlan {
        let category_root = self.layout.category_root(version.name(), category);
        let directory = self
            .layout
            .entity_dir(version.name(), category, &record.folder_name);

        let meshes = record.meshes().map(|f| (AssetKind::Mesh, f));
        let animations = record.animations().map(|f| (AssetKind::Animation, f));
        let tasks = meshes
            .chain(animations)
            .map(|(kind, file)| {
                CopyTask::new(
                    version.source_path(category, kind, file),
                    directory.join(file),
                )
            })
            .collect();

        RecordPlan {
            folder_name: record.folder_name.clone(),
            category_root,
            directory,
            tasks,
        }
    }

    /// Copy every record of one category. Records are started in manifest order; the stop
    /// flag is checked before each one.
    pub async fn run(
        &self,
        records: &[ManifestRecord],
        version: &VersionSource,
        category: EntityCategory,
        ctx: &RunContext,
    ) -> RunSummary {
        let counters = Arc::new(OutcomeCounters::new());
        let total = Self::total_tasks(records);
        ctx.progress
            .start(format!("{} {}", version.name(), category), total);

        tracing::info!(
            "Sorting {} {} records ({} files) into {}",
            records.len(),
            category,
            total,
            self.layout.category_root(version.name(), category)
        );

        let mut groups: JoinSet<()> = JoinSet::new();

        for record in records {
            if ctx.is_stopped() {
                tracing::info!("Stop flag set; not starting remaining {} records", category);
                counters.mark_stopped();
                break;
            }

            while groups.len() >= self.max_concurrent {
                log_join_result(groups.join_next().await);
            }

            let plan = self.plan_record(record, version, category);
            groups.spawn(run_record(
                plan,
                self.fs.clone(),
                self.semaphore.clone(),
                ctx.sink.clone(),
                ctx.progress.clone(),
                counters.clone(),
            ));
        }

        while let Some(result) = groups.join_next().await {
            log_join_result(Some(result));
        }

        ctx.progress.finish();
        counters.summary()
    }
}

fn log_join_result(result: Option<Result<(), tokio::task::JoinError>>) {
    if let Some(Err(e)) = result {
        tracing::error!("Copy task panicked: {}", e);
    }
}

async fn run_record<F: AssetFs>(
    plan: RecordPlan,
    fs: Arc<F>,
    semaphore: Arc<Semaphore>,
    sink: Arc<dyn LogSink>,
    progress: Arc<ProgressReporter>,
    counters: Arc<OutcomeCounters>,
) {
    counters.record_record_processed();
    let RecordPlan {
        folder_name,
        category_root,
        directory,
        tasks,
    } = plan;

    // Nothing is created, written or removed outside `<category_root>/<folder>`.
    if !is_entity_dir_of(&category_root, &directory) {
        tracing::error!(
            "Folder name '{}' does not name a directory under {}; record skipped",
            folder_name,
            category_root
        );
        let reason = format!("invalid folder name '{}'", folder_name);
        for task in &tasks {
            report(
                task,
                &CopyOutcome::IoFailure(reason.clone()),
                sink.as_ref(),
                &progress,
                &counters,
            );
        }
        return;
    }

    if let Err(e) = fs.create_dir_all(&directory).await {
        tracing::error!("Failed to create {}: {}", directory, e);
        let reason = format!("failed to create directory {}: {}", directory, e);
        for task in &tasks {
            report(
                task,
                &CopyOutcome::IoFailure(reason.clone()),
                sink.as_ref(),
                &progress,
                &counters,
            );
        }
        return;
    }

    let mut copies: JoinSet<bool> = JoinSet::new();
    for task in tasks {
        if task.destination().parent() != Some(directory.as_path()) {
            report(
                &task,
                &CopyOutcome::IoFailure(format!(
                    "file name does not stay inside {}",
                    directory
                )),
                sink.as_ref(),
                &progress,
                &counters,
            );
            continue;
        }

        let fs = fs.clone();
        let semaphore = semaphore.clone();
        let sink = sink.clone();
        let progress = progress.clone();
        let counters = counters.clone();

        copies.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => copy_one(fs.as_ref(), &task).await,
                Err(e) => CopyOutcome::IoFailure(e.to_string()),
            };
            report(&task, &outcome, sink.as_ref(), &progress, &counters);
            outcome.is_copied()
        });
    }

    let mut copied = 0usize;
    while let Some(result) = copies.join_next().await {
        match result {
            Ok(true) => copied += 1,
            Ok(false) => {}
            Err(e) => tracing::error!("Copy task for {} panicked: {}", folder_name, e),
        }
    }

    if copied == 0 {
        match fs.remove_dir_all(&directory).await {
            Ok(()) => {
                counters.record_directory_removed();
                sink.append(LogEvent::new(
                    EventKind::DirectoryRemovedEmpty,
                    format!("Removed empty directory: {}", directory),
                ));
            }
            Err(e) => tracing::warn!("Failed to remove empty directory {}: {}", directory, e),
        }
    } else {
        tracing::debug!("{}: {} files copied", folder_name, copied);
    }
}

fn report(
    task: &CopyTask,
    outcome: &CopyOutcome,
    sink: &dyn LogSink,
    progress: &ProgressReporter,
    counters: &OutcomeCounters,
) {
    counters.record_outcome(outcome);

    let event = match outcome {
        CopyOutcome::Copied => LogEvent::new(
            EventKind::Copied,
            format!("Copied {} to {}", task.source(), task.destination()),
        ),
        CopyOutcome::SourceMissing => LogEvent::new(
            EventKind::SourceMissing,
            format!("File not found: {}", task.source()),
        ),
        CopyOutcome::IoFailure(reason) => LogEvent::new(
            EventKind::IoFailure,
            format!(
                "Error copying {} to {}: {}",
                task.source(),
                task.destination(),
                reason
            ),
        ),
    };
    sink.append(event);
    progress.advance();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::log_sink::MemorySink;
    use crate::state::ProgressState;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails every directory creation.
    struct NoDirFs;

    /// In-memory tree whose copies fail for source names starting with `locked`.
    #[derive(Default)]
    struct LockedFilesFs {
        dirs: Mutex<HashSet<Utf8PathBuf>>,
    }

    #[async_trait]
    impl AssetFs for LockedFilesFs {
        async fn is_file(&self, _path: &Utf8Path) -> bool {
            true
        }

        async fn create_dir_all(&self, path: &Utf8Path) -> io::Result<()> {
            self.dirs.lock().unwrap().insert(path.to_path_buf());
            Ok(())
        }

        async fn copy_file(&self, from: &Utf8Path, _to: &Utf8Path) -> io::Result<()> {
            if from.file_name().unwrap_or("").starts_with("locked") {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "sharing violation"));
            }
            Ok(())
        }

        async fn remove_dir_all(&self, path: &Utf8Path) -> io::Result<()> {
            self.dirs.lock().unwrap().remove(path);
            Ok(())
        }
    }

    #[async_trait]
    impl AssetFs for NoDirFs {
        async fn is_file(&self, _path: &Utf8Path) -> bool {
            true
        }

        async fn create_dir_all(&self, _path: &Utf8Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"))
        }

        async fn copy_file(&self, _from: &Utf8Path, _to: &Utf8Path) -> io::Result<()> {
            panic!("copy must not be attempted");
        }

        async fn remove_dir_all(&self, _path: &Utf8Path) -> io::Result<()> {
            Ok(())
        }
    }

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    fn version_tree(root: &Utf8Path, files: &[(&str, &str)]) -> VersionSource {
        let version_root = root.join("K3");
        for (subdir, file) in files {
            let dir = version_root.join("resource/object/PC").join(subdir);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(file), file.as_bytes()).unwrap();
        }
        VersionSource::from_root(version_root).unwrap()
    }

    #[test]
    fn test_plan_record_orders_meshes_first() {
        let scheduler = CopyScheduler::new(Arc::new(LocalFs), OutputLayout::new("/s", "/f"), 4);
        let version = VersionSource::from_root("/g/K3").unwrap();
        let record = ManifestRecord::new(None, "Warrior")
            .with_meshes(["warrior.mesh"])
            .with_animations(["idle.tab"]);

        let plan = scheduler.plan_record(&record, &version, EntityCategory::PlayerCharacter);

        assert_eq!(plan.directory, Utf8PathBuf::from("/s/K3/PC/Warrior"));
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(
            plan.tasks[0].source(),
            Utf8Path::new("/g/K3/resource/object/PC/Mesh/warrior.mesh")
        );
        assert_eq!(
            plan.tasks[1].destination(),
            Utf8Path::new("/s/K3/PC/Warrior/idle.tab")
        );
    }

    #[test]
    fn test_zero_cap_is_clamped() {
        let scheduler = CopyScheduler::new(Arc::new(LocalFs), OutputLayout::new("/s", "/f"), 0);
        assert_eq!(scheduler.max_concurrent(), 1);
    }

    #[test]
    fn test_copy_one_missing_source() {
        let temp = TempDir::new().unwrap();
        let root = utf8(&temp);
        let task = CopyTask::new(root.join("nope.mesh"), root.join("out.mesh"));

        let outcome = tokio_test::block_on(copy_one(&LocalFs, &task));
        assert_eq!(outcome, CopyOutcome::SourceMissing);
        assert!(!root.join("out.mesh").exists());
    }

    #[tokio::test]
    async fn test_copy_one_directory_is_not_a_file() {
        let temp = TempDir::new().unwrap();
        let root = utf8(&temp);
        std::fs::create_dir(root.join("dir.mesh")).unwrap();
        let task = CopyTask::new(root.join("dir.mesh"), root.join("out.mesh"));

        assert_eq!(copy_one(&LocalFs, &task).await, CopyOutcome::SourceMissing);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_forces_write_permission() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let root = utf8(&temp);
        let source = root.join("locked.mesh");
        std::fs::write(&source, b"mesh").unwrap();
        std::fs::set_permissions(&source, std::fs::Permissions::from_mode(0o444)).unwrap();

        let task = CopyTask::new(source, root.join("copy.mesh"));
        assert_eq!(copy_one(&LocalFs, &task).await, CopyOutcome::Copied);

        let mode = std::fs::metadata(root.join("copy.mesh")).unwrap().permissions().mode();
        assert_ne!(mode & 0o200, 0);
    }

    #[tokio::test]
    async fn test_run_copies_and_removes_empty_directories() {
        let temp = TempDir::new().unwrap();
        let root = utf8(&temp);
        let version = version_tree(&root, &[("Mesh", "warrior.mesh"), ("Ani", "idle.tab")]);
        let layout = OutputLayout::new(root.join("Sorted"), root.join("FBX"));
        let scheduler = CopyScheduler::new(Arc::new(LocalFs), layout.clone(), 2);

        let records = vec![
            ManifestRecord::new(Some("1".to_string()), "Warrior")
                .with_meshes(["warrior.mesh"])
                .with_animations(["idle.tab", "missing.tab"]),
            ManifestRecord::new(Some("2".to_string()), "Ghost").with_meshes(["ghost.mesh"]),
        ];

        let sink = Arc::new(MemorySink::new());
        let ctx = RunContext::detached(sink.clone());
        let summary = scheduler
            .run(&records, &version, EntityCategory::PlayerCharacter, &ctx)
            .await;

        assert_eq!(summary.copied, 2);
        assert_eq!(summary.source_missing, 2);
        assert_eq!(summary.directories_removed, 1);
        assert_eq!(summary.records_processed, 2);
        assert_eq!(ctx.progress.snapshot(), ProgressState::new(4, 4));

        let warrior = layout.entity_dir("K3", EntityCategory::PlayerCharacter, "Warrior");
        assert!(warrior.join("warrior.mesh").is_file());
        assert!(warrior.join("idle.tab").is_file());
        assert!(!layout.entity_dir("K3", EntityCategory::PlayerCharacter, "Ghost").exists());
        assert_eq!(sink.count(EventKind::DirectoryRemovedEmpty), 1);
        assert_eq!(sink.count(EventKind::Copied), 2);
    }

    #[tokio::test]
    async fn test_directory_creation_failure_fails_every_task() {
        let scheduler = CopyScheduler::new(Arc::new(NoDirFs), OutputLayout::new("/s", "/f"), 4);
        let version = VersionSource::from_root("/g/K3").unwrap();
        let records = vec![
            ManifestRecord::new(None, "Warrior")
                .with_meshes(["a.mesh"])
                .with_animations(["b.tab"]),
        ];

        let sink = Arc::new(MemorySink::new());
        let ctx = RunContext::detached(sink.clone());
        let summary = scheduler
            .run(&records, &version, EntityCategory::PlayerCharacter, &ctx)
            .await;

        assert_eq!(summary.io_failures, 2);
        assert_eq!(summary.copied, 0);
        assert_eq!(summary.directories_removed, 0);
        assert_eq!(ctx.progress.snapshot().completed, 2);
        assert!(sink.messages(EventKind::IoFailure)[0].contains("read-only volume"));
    }

    #[tokio::test]
    async fn test_stop_before_run_starts_nothing() {
        let scheduler = CopyScheduler::new(Arc::new(NoDirFs), OutputLayout::new("/s", "/f"), 4);
        let version = VersionSource::from_root("/g/K3").unwrap();
        let records = vec![ManifestRecord::new(None, "Warrior").with_meshes(["a.mesh"])];

        let stop = crate::services::context::StopHandle::new();
        stop.request_stop();
        let ctx = RunContext::new(
            Arc::new(MemorySink::new()),
            Arc::new(ProgressReporter::new()),
            stop.subscribe(),
        );

        let summary = scheduler
            .run(&records, &version, EntityCategory::PlayerCharacter, &ctx)
            .await;

        assert!(summary.stopped);
        assert_eq!(summary.records_processed, 0);
        assert_eq!(summary.total_tasks(), 0);
    }

    #[tokio::test]
    async fn test_copy_failures_are_per_task() {
        let fs = Arc::new(LockedFilesFs::default());
        let layout = OutputLayout::new("/s", "/f");
        let scheduler = CopyScheduler::new(fs.clone(), layout.clone(), 3);
        let version = VersionSource::from_root("/g/K3").unwrap();
        let records = vec![
            ManifestRecord::new(None, "Warrior")
                .with_meshes(["warrior.mesh", "locked_helm.mesh"])
                .with_animations(["idle.tab"]),
            ManifestRecord::new(None, "Ghost")
                .with_meshes(["locked_ghost.mesh"])
                .with_animations(["locked_float.tab"]),
        ];

        let sink = Arc::new(MemorySink::new());
        let ctx = RunContext::detached(sink.clone());
        let summary = scheduler
            .run(&records, &version, EntityCategory::PlayerCharacter, &ctx)
            .await;

        assert_eq!(summary.copied, 2);
        assert_eq!(summary.io_failures, 3);
        assert_eq!(summary.directories_removed, 1);
        assert_eq!(ctx.progress.snapshot(), ProgressState::new(5, 5));

        let failures = sink.messages(EventKind::IoFailure);
        assert_eq!(failures.len(), 3);
        assert!(failures.iter().all(|m| m.starts_with("Error copying")));
        assert!(failures.iter().all(|m| m.contains("sharing violation")));
        assert!(
            failures
                .iter()
                .any(|m| m.contains("/g/K3/resource/object/PC/Mesh/locked_helm.mesh"))
        );

        let dirs = fs.dirs.lock().unwrap();
        assert!(dirs.contains(&layout.entity_dir("K3", EntityCategory::PlayerCharacter, "Warrior")));
        assert!(!dirs.contains(&layout.entity_dir("K3", EntityCategory::PlayerCharacter, "Ghost")));
        assert_eq!(sink.count(EventKind::DirectoryRemovedEmpty), 1);
        assert!(sink.messages(EventKind::DirectoryRemovedEmpty)[0].contains("Ghost"));
    }

    #[tokio::test]
    async fn test_folder_names_outside_the_category_are_never_touched() {
        let temp = TempDir::new().unwrap();
        let root = utf8(&temp);
        let version = version_tree(&root, &[("Mesh", "warrior.mesh")]);
        let layout = OutputLayout::new(root.join("Sorted"), root.join("FBX"));
        let scheduler = CopyScheduler::new(Arc::new(LocalFs), layout.clone(), 4);

        let warrior = layout.entity_dir("K3", EntityCategory::PlayerCharacter, "Warrior");
        std::fs::create_dir_all(&warrior).unwrap();
        std::fs::write(warrior.join("warrior.mesh"), b"mesh").unwrap();
        let precious = root.join("precious");
        std::fs::create_dir_all(&precious).unwrap();
        std::fs::write(precious.join("keep.txt"), b"keep").unwrap();

        let records = vec![
            ManifestRecord::new(None, "..").with_meshes(["gone.mesh"]),
            ManifestRecord::new(None, ".").with_meshes(["gone.mesh"]),
            ManifestRecord::new(None, precious.as_str()).with_meshes(["gone.mesh"]),
            ManifestRecord::new(None, "Rogue").with_meshes(["../../escape.mesh"]),
        ];

        let sink = Arc::new(MemorySink::new());
        let ctx = RunContext::detached(sink.clone());
        let summary = scheduler
            .run(&records, &version, EntityCategory::PlayerCharacter, &ctx)
            .await;

        assert!(warrior.join("warrior.mesh").is_file());
        assert!(precious.join("keep.txt").is_file());
        assert!(!root.join("Sorted/K3/escape.mesh").exists());
        assert_eq!(summary.io_failures, 4);
        assert_eq!(summary.copied, 0);
        // Only Rogue's own folder is a legitimate cleanup target.
        assert_eq!(summary.directories_removed, 1);
        assert!(!layout.entity_dir("K3", EntityCategory::PlayerCharacter, "Rogue").exists());
        assert_eq!(ctx.progress.snapshot(), ProgressState::new(4, 4));
    }
}
