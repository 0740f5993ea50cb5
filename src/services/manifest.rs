//! Manifest parsing: workbook sheets to [`ManifestRecord`]s.
//!
//! A manifest comes in one of two shapes (see [`ManifestLayout`]). Both go through the same
//! row rules: blank rows are padding, rows without a folder name are reported and dropped,
//! folder names that are not a single plain path component (`..`, `.`, absolute paths,
//! anything with a separator) are reported and dropped, and a folder name already seen in
//! the same sheet is reported and dropped.
//!
//! Folder names are case-insensitive. The game and its tools run on Windows, where `Wolf`
//! and `wolf` are the same directory, so duplicate detection and the split-layout merge both
//! compare lowercased names and keep the spelling of the first row seen.

use crate::models::{
    AnimationOrientation, EntityCategory, ManifestLayout, ManifestRecord, ManifestSettings,
};
use crate::services::layout::is_plain_folder_name;
use crate::services::log_sink::{EventKind, LogEvent, LogSink};
use calamine::{Data, Range, Reader, Sheets, open_workbook_auto};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use thiserror::Error;

/// Rows of optional cell text, addressed from A1.
pub type Grid = Vec<Vec<Option<String>>>;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest could not be read: {path}: {reason}")]
    Unreadable { path: Utf8PathBuf, reason: String },

    #[error("Manifest sheet '{sheet}' is missing for category {category}")]
    SheetMissing {
        sheet: String,
        category: EntityCategory,
    },
}

/// Anything that can hand out sheets by exact name.
pub trait SheetSource {
    fn has_sheet(&self, name: &str) -> bool;

    fn read_sheet(&mut self, name: &str) -> Result<Grid, ManifestError>;
}

/// Workbook on disk (`.xlsx`, `.xls`, `.xlsb`, `.ods`).
pub struct ManifestWorkbook {
    path: Utf8PathBuf,
    sheet_names: Vec<String>,
    workbook: Sheets<BufReader<File>>,
}

impl std::fmt::Debug for ManifestWorkbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestWorkbook")
            .field("path", &self.path)
            .field("sheet_names", &self.sheet_names)
            .finish_non_exhaustive()
    }
}

impl ManifestWorkbook {
    pub fn open(path: &Utf8Path) -> Result<Self, ManifestError> {
        let workbook = open_workbook_auto(path).map_err(|e| ManifestError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let sheet_names = workbook.sheet_names();
        tracing::debug!("Opened manifest {} with sheets {:?}", path, sheet_names);

        Ok(Self {
            path: path.to_path_buf(),
            sheet_names,
            workbook,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }
}

impl SheetSource for ManifestWorkbook {
    fn has_sheet(&self, name: &str) -> bool {
        self.sheet_names.iter().any(|n| n == name)
    }

    fn read_sheet(&mut self, name: &str) -> Result<Grid, ManifestError> {
        let range = self
            .workbook
            .worksheet_range(name)
            .map_err(|e| ManifestError::Unreadable {
                path: self.path.clone(),
                reason: format!("sheet '{}': {}", name, e),
            })?;
        Ok(range_to_grid(&range))
    }
}

/// calamine ranges start at the first used cell; pad so that indices line up with A1.
fn range_to_grid(range: &Range<Data>) -> Grid {
    let Some((start_row, start_col)) = range.start() else {
        return Grid::new();
    };

    let mut grid: Grid = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells = vec![None; start_col as usize];
        cells.extend(row.iter().map(cell_text));
        grid.push(cells);
    }
    grid
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    };
    normalize(&text)
}

fn normalize(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Sheets held in memory, for callers that assemble a manifest from another source.
#[derive(Debug, Default, Clone)]
pub struct MemoryWorkbook {
    sheets: IndexMap<String, Grid>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, name: impl Into<String>, grid: Grid) -> Self {
        self.sheets.insert(name.into(), grid);
        self
    }

    /// Build a sheet from string rows; empty strings become empty cells.
    pub fn with_rows(self, name: impl Into<String>, rows: &[&[&str]]) -> Self {
        let grid = rows.iter().map(|row| cells(row)).collect();
        self.with_sheet(name, grid)
    }
}

/// One grid row from plain strings.
pub fn cells(row: &[&str]) -> Vec<Option<String>> {
    row.iter().map(|c| normalize(c)).collect()
}

impl SheetSource for MemoryWorkbook {
    fn has_sheet(&self, name: &str) -> bool {
        self.sheets.contains_key(name)
    }

    fn read_sheet(&mut self, name: &str) -> Result<Grid, ManifestError> {
        Ok(self.sheets.get(name).cloned().unwrap_or_default())
    }
}

/// Turns workbook sheets into ordered records for one category at a time.
#[derive(Debug, Clone, Default)]
pub struct ManifestLoader {
    settings: ManifestSettings,
}

impl ManifestLoader {
    pub fn new(settings: ManifestSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ManifestSettings {
        &self.settings
    }

    pub fn load<S: SheetSource + ?Sized>(
        &self,
        source: &mut S,
        category: EntityCategory,
        sink: &dyn LogSink,
    ) -> Result<Vec<ManifestRecord>, ManifestError> {
        let records = match self.settings.layout {
            ManifestLayout::Combined => self.load_combined(source, category, sink)?,
            ManifestLayout::Split => self.load_split(source, category, sink)?,
        };
        tracing::info!(
            "Loaded {} {} records from manifest",
            records.len(),
            category
        );
        Ok(records)
    }

    fn load_combined<S: SheetSource + ?Sized>(
        &self,
        source: &mut S,
        category: EntityCategory,
        sink: &dyn LogSink,
    ) -> Result<Vec<ManifestRecord>, ManifestError> {
        let sheet = category.canonical_name();
        if !source.has_sheet(sheet) {
            return Err(ManifestError::SheetMissing {
                sheet: sheet.to_string(),
                category,
            });
        }

        let grid = source.read_sheet(sheet)?;
        let mesh_end = 2 + self.settings.mesh_slots;
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for (index, row) in grid.iter().enumerate().skip(1) {
            let Some((id, folder)) = keyed_row(row, sheet, index, &mut seen, sink) else {
                continue;
            };
            let mut record = ManifestRecord::new(id, folder);
            record.mesh_files = slice_cells(row, 2, Some(mesh_end));
            record.animation_files = slice_cells(row, mesh_end, None);
            records.push(record);
        }

        Ok(records)
    }

    fn load_split<S: SheetSource + ?Sized>(
        &self,
        source: &mut S,
        category: EntityCategory,
        sink: &dyn LogSink,
    ) -> Result<Vec<ManifestRecord>, ManifestError> {
        let mesh_sheet = category.mesh_sheet_name();
        let ani_sheet = category.animation_sheet_name();
        let has_mesh = source.has_sheet(&mesh_sheet);
        let has_ani = source.has_sheet(&ani_sheet);

        if !has_mesh && !has_ani {
            return Err(ManifestError::SheetMissing {
                sheet: format!("{} / {}", mesh_sheet, ani_sheet),
                category,
            });
        }

        // Keyed by lowercase folder name; insertion order is first-seen order.
        let mut merged: IndexMap<String, ManifestRecord> = IndexMap::new();

        if has_mesh {
            let grid = source.read_sheet(&mesh_sheet)?;
            let mut seen = HashSet::new();
            for (index, row) in grid.iter().enumerate().skip(1) {
                let Some((id, folder)) = keyed_row(row, &mesh_sheet, index, &mut seen, sink) else {
                    continue;
                };
                let record = merged
                    .entry(folder.to_lowercase())
                    .or_insert_with(|| ManifestRecord::new(id, folder));
                record.mesh_files.extend(slice_cells(row, 2, None));
            }
        } else {
            tracing::warn!("Sheet {} not found; {} has no meshes", mesh_sheet, category);
        }

        if has_ani {
            let grid = source.read_sheet(&ani_sheet)?;
            let entries = match self.settings.animation_orientation {
                AnimationOrientation::RowMajor => row_major_animations(&grid, &ani_sheet, sink),
                AnimationOrientation::ColumnMajor => {
                    column_major_animations(&grid, &ani_sheet, sink)
                }
            };
            for (id, folder, files) in entries {
                let record = merged
                    .entry(folder.to_lowercase())
                    .or_insert_with(|| ManifestRecord::new(id, folder));
                record.animation_files.extend(files);
            }
        } else {
            tracing::warn!("Sheet {} not found; {} has no animations", ani_sheet, category);
        }

        Ok(merged.into_values().collect())
    }
}

type AnimationEntry = (Option<String>, String, Vec<Option<String>>);

fn row_major_animations(grid: &Grid, sheet: &str, sink: &dyn LogSink) -> Vec<AnimationEntry> {
    let mut seen = HashSet::new();
    grid.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(index, row)| {
            let (id, folder) = keyed_row(row, sheet, index, &mut seen, sink)?;
            Some((id, folder, slice_cells(row, 2, None)))
        })
        .collect()
}

/// Header row holds the codes from column B onward; files sit beneath each code.
fn column_major_animations(grid: &Grid, sheet: &str, sink: &dyn LogSink) -> Vec<AnimationEntry> {
    let Some(header) = grid.first() else {
        return Vec::new();
    };
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for col in 1..width {
        let files: Vec<Option<String>> = grid
            .iter()
            .skip(1)
            .map(|row| cell(row, col).map(str::to_string))
            .collect();
        let code = cell(header, col);

        match code {
            None if files.iter().all(Option::is_none) => continue,
            None => {
                sink.append(LogEvent::new(
                    EventKind::MissingFolderName,
                    format!("Missing folder name in sheet {}, column {}", sheet, col + 1),
                ));
            }
            Some(code) if !is_plain_folder_name(code) => {
                sink.append(LogEvent::new(
                    EventKind::InvalidFolderName,
                    format!(
                        "Invalid folder name '{}' in sheet {}, column {}; column skipped",
                        code,
                        sheet,
                        col + 1
                    ),
                ));
            }
            Some(code) => {
                if !seen.insert(code.to_lowercase()) {
                    sink.append(LogEvent::new(
                        EventKind::DuplicateFolderName,
                        format!(
                            "Duplicate folder name '{}' in sheet {}, column {}; column skipped",
                            code,
                            sheet,
                            col + 1
                        ),
                    ));
                    continue;
                }
                entries.push((None, code.to_string(), files));
            }
        }
    }

    entries
}

/// Apply the shared row rules. Returns the id and folder name of a row that should be kept.
fn keyed_row(
    row: &[Option<String>],
    sheet: &str,
    index: usize,
    seen: &mut HashSet<String>,
    sink: &dyn LogSink,
) -> Option<(Option<String>, String)> {
    if row.iter().all(Option::is_none) {
        return None;
    }

    let Some(folder) = cell(row, 1) else {
        sink.append(LogEvent::new(
            EventKind::MissingFolderName,
            format!("Missing folder name in sheet {}, row {}", sheet, index + 1),
        ));
        return None;
    };

    if !is_plain_folder_name(folder) {
        sink.append(LogEvent::new(
            EventKind::InvalidFolderName,
            format!(
                "Invalid folder name '{}' in sheet {}, row {}; row skipped",
                folder,
                sheet,
                index + 1
            ),
        ));
        return None;
    }

    if !seen.insert(folder.to_lowercase()) {
        sink.append(LogEvent::new(
            EventKind::DuplicateFolderName,
            format!(
                "Duplicate folder name '{}' in sheet {}, row {}; row skipped",
                folder,
                sheet,
                index + 1
            ),
        ));
        return None;
    }

    Some((cell(row, 0).map(str::to_string), folder.to_string()))
}

fn cell(row: &[Option<String>], col: usize) -> Option<&str> {
    row.get(col)
        .and_then(|c| c.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
}

fn slice_cells(row: &[Option<String>], from: usize, to: Option<usize>) -> Vec<Option<String>> {
    let end = to.unwrap_or(row.len()).min(row.len());
    (from..end)
        .map(|col| cell(row, col).map(str::to_string))
        .collect()
}
