use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Default number of simultaneous in-flight file copies across a run.
pub const DEFAULT_MAX_CONCURRENT_COPIES: usize = 50;

/// Default number of mesh columns in the combined manifest layout.
pub const DEFAULT_MESH_SLOTS: usize = 4;

/// Top-level configuration from `Sorter Config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SorterConfig {
    #[serde(default)]
    pub settings: SorterSettings,

    /// Named game version roots, in display order.
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

impl SorterConfig {
    /// Find a configured version by display name (case-insensitive).
    pub fn find_version(&self, name: &str) -> Option<&VersionEntry> {
        self.versions
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub name: String,
    pub root: Utf8PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SorterSettings {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub copy: CopySettings,

    #[serde(default)]
    pub manifest: ManifestSettings,

    #[serde(default)]
    pub converter: ConverterSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Manifest workbook (.xlsx / .xls / .ods)
    #[serde(default = "default_manifest_path")]
    pub manifest: Utf8PathBuf,

    #[serde(default = "default_sorted_root")]
    pub sorted_root: Utf8PathBuf,

    #[serde(default = "default_fbx_root")]
    pub fbx_root: Utf8PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: Utf8PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            manifest: default_manifest_path(),
            sorted_root: default_sorted_root(),
            fbx_root: default_fbx_root(),
            log_dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_COPIES,
        }
    }
}

/// Which shape the manifest workbook has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestLayout {
    /// One sheet per category: id, folder, mesh slots, animation slots.
    #[default]
    Combined,
    /// `<cat>_Mesh` and `<cat>_Ani` sheets joined on the code column.
    Split,
}

/// How the animation sheet of the split layout is laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationOrientation {
    /// One entity per row: id, code, animation files...
    #[default]
    RowMajor,
    /// One entity per column: code in the header row, files beneath.
    ColumnMajor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSettings {
    #[serde(default)]
    pub layout: ManifestLayout,

    #[serde(default = "default_mesh_slots")]
    pub mesh_slots: usize,

    #[serde(default)]
    pub animation_orientation: AnimationOrientation,
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            layout: ManifestLayout::default(),
            mesh_slots: DEFAULT_MESH_SLOTS,
            animation_orientation: AnimationOrientation::default(),
        }
    }
}

/// External converter invocation profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterSettings {
    #[serde(default = "default_converter_exe")]
    pub executable: Utf8PathBuf,

    #[serde(default = "default_mode_flag")]
    pub mode_flag: String,

    /// Extension of skeleton/timing files (no leading dot)
    #[serde(default = "default_skeleton_extension")]
    pub skeleton_extension: String,

    /// Extension of pose/table files (no leading dot)
    #[serde(default = "default_pose_extension")]
    pub pose_extension: String,

    #[serde(default = "default_output_extension")]
    pub output_extension: String,

    #[serde(default = "default_converter_flags")]
    pub flags: Vec<String>,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            executable: default_converter_exe(),
            mode_flag: default_mode_flag(),
            skeleton_extension: default_skeleton_extension(),
            pose_extension: default_pose_extension(),
            output_extension: default_output_extension(),
            flags: default_converter_flags(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_true")]
    pub console: bool,

    /// Write the rolling log file as JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            debug: false,
            console: true,
            json: false,
        }
    }
}

fn default_manifest_path() -> Utf8PathBuf {
    Utf8PathBuf::from("Kathana_Entity_PS.xlsx")
}

fn default_sorted_root() -> Utf8PathBuf {
    Utf8PathBuf::from("Kathana-Out/Sorted")
}

fn default_fbx_root() -> Utf8PathBuf {
    Utf8PathBuf::from("Kathana-Out/FBX")
}

fn default_log_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("logs")
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_COPIES
}

fn default_mesh_slots() -> usize {
    DEFAULT_MESH_SLOTS
}

fn default_converter_exe() -> Utf8PathBuf {
    Utf8PathBuf::from("_Noesis/Noesis.exe")
}

fn default_mode_flag() -> String {
    "?cmode".to_string()
}

fn default_skeleton_extension() -> String {
    "tmb".to_string()
}

fn default_pose_extension() -> String {
    "tab".to_string()
}

fn default_output_extension() -> String {
    "fbx".to_string()
}

fn default_converter_flags() -> Vec<String> {
    [
        "-export",
        "-bakeanimscale",
        "-showstats",
        "-animbonenamematch",
        "-fbxnoextraframe",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_true() -> bool {
    true
}
