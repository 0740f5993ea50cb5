//! Converter command generation.
//!
//! Walks a sorted category tree, pairs every skeleton file with every pose file in the same
//! directory, and renders one converter invocation per pair. Commands can be written to a
//! script or run directly through [`ConverterRunner`].

use crate::models::ConverterSettings;
use crate::services::context::RunContext;
use crate::services::layout::fbx_output_for;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tokio::process::Command;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write script {path}: {source}")]
    WriteScript {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Command generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One converter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCommand {
    pub converter: Utf8PathBuf,
    pub mode_flag: String,
    pub skeleton: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub pose: Utf8PathBuf,
    pub flags: Vec<String>,
}

impl BatchCommand {
    /// Arguments after the program, for direct execution.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.mode_flag.clone(),
            self.skeleton.to_string(),
            self.output.to_string(),
            "-loadanimsingle".to_string(),
            self.pose.to_string(),
        ];
        args.extend(self.flags.iter().cloned());
        args
    }

    /// Script line: `"<converter>" <mode> "<skeleton>" "<output>" -loadanimsingle "<pose>" <flags>`
    pub fn to_command_line(&self) -> String {
        let mut line = format!(
            "\"{}\" {} \"{}\" \"{}\" -loadanimsingle \"{}\"",
            self.converter, self.mode_flag, self.skeleton, self.output, self.pose
        );
        for flag in &self.flags {
            line.push(' ');
            line.push_str(flag);
        }
        line
    }
}

impl fmt::Display for BatchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_command_line())
    }
}

#[derive(Default)]
struct DirectoryFiles {
    skeletons: Vec<Utf8PathBuf>,
    poses: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchCommandGenerator {
    settings: ConverterSettings,
}

impl BatchCommandGenerator {
    pub fn new(settings: ConverterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ConverterSettings {
        &self.settings
    }

    /// Build the commands for one sorted category tree.
    ///
    /// Output directories under `fbx_category_root` are created here. A missing
    /// `sorted_category_root` gives an empty list.
    ///
    /// This blocks on directory walks and `std::fs` calls. From async code use
    /// [`BatchCommandGenerator::generate_async`].
    pub fn generate(
        &self,
        sorted_category_root: &Utf8Path,
        fbx_category_root: &Utf8Path,
    ) -> Result<Vec<BatchCommand>, BatchError> {
        if !sorted_category_root.is_dir() {
            tracing::warn!(
                "Sorted directory {} does not exist; nothing to convert",
                sorted_category_root
            );
            return Ok(Vec::new());
        }

        let directories = self.collect(sorted_category_root);
        let mut commands = Vec::new();

        for (directory, mut files) in directories {
            if files.skeletons.is_empty() || files.poses.is_empty() {
                continue;
            }
            files.skeletons.sort();
            files.poses.sort();
            tracing::debug!(
                "{}: {} skeleton x {} pose files",
                directory,
                files.skeletons.len(),
                files.poses.len()
            );

            for skeleton in &files.skeletons {
                for pose in &files.poses {
                    let output = fbx_output_for(
                        sorted_category_root,
                        fbx_category_root,
                        pose,
                        &self.settings.output_extension,
                    );
                    if let Some(parent) = output.parent() {
                        std::fs::create_dir_all(parent).map_err(|source| {
                            BatchError::CreateDir {
                                path: parent.to_path_buf(),
                                source,
                            }
                        })?;
                    }

                    commands.push(BatchCommand {
                        converter: self.settings.executable.clone(),
                        mode_flag: self.settings.mode_flag.clone(),
                        skeleton: skeleton.clone(),
                        output,
                        pose: pose.clone(),
                        flags: self.settings.flags.clone(),
                    });
                }
            }
        }

        tracing::info!(
            "Generated {} converter commands for {}",
            commands.len(),
            sorted_category_root
        );
        Ok(commands)
    }

    /// [`BatchCommandGenerator::generate`] on tokio's blocking pool.
    pub async fn generate_async(
        &self,
        sorted_category_root: Utf8PathBuf,
        fbx_category_root: Utf8PathBuf,
    ) -> Result<Vec<BatchCommand>, BatchError> {
        let generator = self.clone();
        tokio::task::spawn_blocking(move || {
            generator.generate(&sorted_category_root, &fbx_category_root)
        })
        .await?
    }

    /// Skeleton and pose files grouped by directory, in walk order.
    fn collect(&self, root: &Utf8Path) -> IndexMap<Utf8PathBuf, DirectoryFiles> {
        let mut directories: IndexMap<Utf8PathBuf, DirectoryFiles> = IndexMap::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", root, e);
                    continue;
                }
            };
            let is_dir = entry.file_type().is_dir();
            let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(path) => path,
                Err(path) => {
                    tracing::warn!("Skipping non UTF-8 path: {}", path.display());
                    continue;
                }
            };

            if is_dir {
                directories.entry(path).or_default();
                continue;
            }

            let Some(parent) = path.parent().map(Utf8Path::to_path_buf) else {
                continue;
            };
            let files = directories.entry(parent).or_default();
            if self.has_extension(&path, &self.settings.skeleton_extension) {
                files.skeletons.push(path);
            } else if self.has_extension(&path, &self.settings.pose_extension) {
                files.poses.push(path);
            }
        }

        directories
    }

    fn has_extension(&self, path: &Utf8Path, extension: &str) -> bool {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension.trim_start_matches('.')))
    }
}

/// Write `commands` one per line, each line newline-terminated.
pub fn write_script(path: &Utf8Path, commands: &[BatchCommand]) -> Result<(), BatchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| BatchError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let content: String = commands
        .iter()
        .map(|command| format!("{}\n", command.to_command_line()))
        .collect();

    std::fs::write(path, content).map_err(|source| BatchError::WriteScript {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!("Wrote {} commands to {}", commands.len(), path);
    Ok(())
}

/// Counts from a direct conversion run. Exit codes are informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub executed: usize,
    pub non_zero_exit: usize,
    pub failed_to_start: usize,
    pub stopped: bool,
}

/// Runs converter commands one at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConverterRunner;

impl ConverterRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run each command to completion before starting the next. The stop flag is checked
    /// between commands.
    pub async fn run(&self, commands: &[BatchCommand], ctx: &RunContext) -> ConversionSummary {
        let mut summary = ConversionSummary::default();
        ctx.progress.start("convert", commands.len());

        for command in commands {
            if ctx.is_stopped() {
                tracing::info!("Stop flag set; skipping remaining converter commands");
                summary.stopped = true;
                break;
            }

            tracing::info!("Executing: {}", command);
            let start = Instant::now();

            match Command::new(command.converter.as_std_path())
                .args(command.args())
                .status()
                .await
            {
                Ok(status) => {
                    summary.executed += 1;
                    let exit_code = status.code().unwrap_or(-1);
                    if !status.success() {
                        summary.non_zero_exit += 1;
                    }
                    tracing::info!(
                        "Converter finished in {:.2}s with exit code {}",
                        start.elapsed().as_secs_f32(),
                        exit_code
                    );
                }
                Err(e) => {
                    summary.failed_to_start += 1;
                    tracing::error!("Failed to start {}: {}", command.converter, e);
                }
            }
            ctx.progress.advance();
        }

        ctx.progress.finish();
        summary
    }
}
