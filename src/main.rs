//! Kathana Sorter - command-line front-end.
//!
//! # Overview
//!
//! Drives the sorting engine from a terminal. It initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime for the copy scheduler and converter processes
//! - Configuration loading ([`ConfigManager`]) from `Sorter Data/Sorter Config.yaml`
//! - A [`SortPipeline`] with a Ctrl-C stop hook and a progress printer
//!
//! # Commands
//!
//! - `init`: write a default config file
//! - `versions`: list configured game versions
//! - `sort`: copy manifest assets into the sorted tree
//! - `script`: write converter batch scripts for a sorted version
//! - `convert`: run the converter directly for a sorted version

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use kathana_sorter::metrics::RunSummary;
use kathana_sorter::services::{
    CategoryOutcome, FanoutSink, LogSink, QueuedFileSink, TracingSink, VersionSource,
};
use kathana_sorter::{
    APP_NAME, ConfigManager, EntityCategory, ProgressEvent, SortPipeline, SorterConfig, VERSION,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "kathana-sorter", about = "Sort Kathana entity assets and build FBX conversion scripts")]
struct Cli {
    /// Directory holding `Sorter Config.yaml`
    #[arg(long, env = "KSORT_CONFIG_DIR", default_value = "Sorter Data")]
    config_dir: Utf8PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config file if none exists
    Init,

    /// List the configured game versions
    Versions,

    /// Copy manifest assets into the sorted tree
    Sort {
        /// Configured version name or a version root path
        #[arg(long = "version")]
        game_version: String,

        /// pc, npc, monster or all
        #[arg(long, default_value = "all")]
        category: String,

        /// Manifest workbook, overriding the configured one
        #[arg(long)]
        manifest: Option<Utf8PathBuf>,
    },

    /// Write converter batch scripts for an already sorted version
    Script {
        #[arg(long = "version")]
        game_version: String,

        /// A single category writes its own script; all writes the combined script
        #[arg(long, default_value = "all")]
        category: String,
    },

    /// Run the converter for an already sorted version
    Convert {
        #[arg(long = "version")]
        game_version: String,

        #[arg(long, default_value = "all")]
        category: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    if let Commands::Init = cli.command {
        if config_manager.write_default_config()? {
            println!("Wrote {}", config_manager.settings_path());
        } else {
            println!("{} already exists", config_manager.settings_path());
        }
        return Ok(());
    }

    let config = config_manager.load_config()?;
    let _log_guard = kathana_sorter::logging::setup_logging(
        &config.settings.logging,
        &config.settings.paths.log_dir,
        APP_NAME,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("ksort-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let result = runtime.block_on(run(cli.command, config));

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result.inspect_err(|e| tracing::error!("{:#}", e))
}

async fn run(command: Commands, config: SorterConfig) -> Result<()> {
    match command {
        Commands::Init => Ok(()),
        Commands::Versions => {
            if config.versions.is_empty() {
                println!("No versions configured");
            }
            for version in &config.versions {
                println!("{}\t{}", version.name, version.root);
            }
            Ok(())
        }
        Commands::Sort {
            game_version,
            category,
            manifest,
        } => sort(&config, &game_version, &category, manifest.as_deref()).await,
        Commands::Script {
            game_version,
            category,
        } => {
            let version = resolve_version(&config, &game_version)?;
            let pipeline = SortPipeline::new(config.settings.clone(), Arc::new(TracingSink));
            match parse_categories(&category)? {
                None => {
                    let path = pipeline.write_combined_script(version.name())?;
                    println!("Wrote {}", path);
                }
                Some(category) => {
                    let path = pipeline.write_category_script(version.name(), category)?;
                    println!("Wrote {}", path);
                }
            }
            Ok(())
        }
        Commands::Convert {
            game_version,
            category,
        } => {
            let version = resolve_version(&config, &game_version)?;
            let pipeline = SortPipeline::new(config.settings.clone(), Arc::new(TracingSink));
            spawn_stop_on_ctrl_c(&pipeline);

            let categories = match parse_categories(&category)? {
                None => EntityCategory::ALL.to_vec(),
                Some(category) => vec![category],
            };
            for category in categories {
                let summary = pipeline.convert_category(version.name(), category).await?;
                if summary.stopped {
                    break;
                }
            }
            Ok(())
        }
    }
}

async fn sort(
    config: &SorterConfig,
    game_version: &str,
    category: &str,
    manifest: Option<&Utf8Path>,
) -> Result<()> {
    let version = resolve_version(config, game_version)?;
    if !version.root().is_dir() {
        bail!("Version root does not exist: {}", version.root());
    }
    let categories = parse_categories(category)?;

    let event_log = config.settings.paths.log_dir.join("sort_events.log");
    let (file_sink, file_guard) = QueuedFileSink::spawn(&event_log).await?;
    let sink: Arc<dyn LogSink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(Arc::new(file_sink)),
    );

    let mut settings = config.settings.clone();
    if let Some(manifest) = manifest {
        settings.paths.manifest = manifest.to_path_buf();
    }
    let pipeline = SortPipeline::new(settings, sink);
    spawn_stop_on_ctrl_c(&pipeline);
    let printer = spawn_progress_printer(&pipeline);

    let result = sort_categories(&pipeline, &version, categories).await;

    // The file sink flushes once every sender is gone.
    drop(pipeline);
    printer.abort();
    let lines = file_guard.finish().await?;
    tracing::info!("Wrote {} events to {}", lines, event_log);

    let total = result?;
    println!("{}: {}", version.name(), total.summary());
    Ok(())
}

async fn sort_categories(
    pipeline: &SortPipeline,
    version: &VersionSource,
    categories: Option<EntityCategory>,
) -> Result<RunSummary> {
    let mut total = RunSummary::default();
    match categories {
        Some(category) => {
            let summary = pipeline.sort_category(version.root(), category).await?;
            total.merge(&summary);
        }
        None => {
            for (category, outcome) in pipeline.sort_all(version.root()).await? {
                match outcome {
                    CategoryOutcome::Sorted(summary) => total.merge(&summary),
                    CategoryOutcome::SheetMissing => {
                        tracing::warn!("{}: manifest sheet missing, skipped", category)
                    }
                    CategoryOutcome::Skipped => tracing::info!("{}: skipped after stop", category),
                }
            }
        }
    }
    Ok(total)
}

/// A configured version name, or else a path to a version root.
fn resolve_version(config: &SorterConfig, name_or_path: &str) -> Result<VersionSource> {
    let root = match config.find_version(name_or_path) {
        Some(entry) => entry.root.clone(),
        None => Utf8PathBuf::from(name_or_path),
    };
    VersionSource::from_root(root).context("Invalid version root")
}

/// `all` gives `None`.
fn parse_categories(value: &str) -> Result<Option<EntityCategory>> {
    if value.trim().eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    value
        .parse::<EntityCategory>()
        .map(Some)
        .map_err(anyhow::Error::msg)
}

fn spawn_stop_on_ctrl_c<F: kathana_sorter::services::AssetFs>(pipeline: &SortPipeline<F>) {
    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received; finishing in-flight copies");
            stop.request_stop();
        }
    });
}

fn spawn_progress_printer<F: kathana_sorter::services::AssetFs>(
    pipeline: &SortPipeline<F>,
) -> tokio::task::JoinHandle<()> {
    let mut events = pipeline.progress().subscribe();
    tokio::spawn(async move {
        let mut last_percentage = None;
        loop {
            match events.recv().await {
                Ok(ProgressEvent::Started { label, total }) => {
                    last_percentage = None;
                    tracing::info!("{}: {} files", label, total);
                }
                Ok(ProgressEvent::Advanced(state)) => {
                    let percentage = state.percentage();
                    if last_percentage != Some(percentage) {
                        last_percentage = Some(percentage);
                        tracing::info!("Progress: {}% ({}/{})", percentage, state.completed, state.total);
                    }
                }
                Ok(ProgressEvent::Finished { label, state }) => {
                    tracing::info!("{}: done ({}/{})", label, state.completed, state.total);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Progress printer skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
