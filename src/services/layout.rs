//! Directory layout policy for the sorted and FBX trees.
//!
//! Everything here is pure path arithmetic: no filesystem access, same inputs give the same
//! paths every time.

use crate::models::{AssetKind, EntityCategory};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Script written into the version directory that converts every category at once.
pub const COMBINED_SCRIPT_NAME: &str = "generate_all_fbx.bat";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Version root has no final path component: {0}")]
    NoVersionName(Utf8PathBuf),
}

/// A game version's source tree. The version name is the last component of the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSource {
    root: Utf8PathBuf,
    name: String,
}

impl VersionSource {
    pub fn from_root(root: impl Into<Utf8PathBuf>) -> Result<Self, LayoutError> {
        let root = root.into();
        let name = root
            .file_name()
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| LayoutError::NoVersionName(root.clone()))?;
        Ok(Self { root, name })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<root>/resource/object/<category>/<Mesh|Ani>/<file>`
    pub fn source_path(&self, category: EntityCategory, kind: AssetKind, file: &str) -> Utf8PathBuf {
        source_path(&self.root, category, kind, file)
    }
}

/// Source file location inside a version root.
pub fn source_path(
    version_root: &Utf8Path,
    category: EntityCategory,
    kind: AssetKind,
    file: &str,
) -> Utf8PathBuf {
    version_root
        .join("resource")
        .join("object")
        .join(category.canonical_name())
        .join(kind.source_dir_name())
        .join(file)
}

/// True when `name` is exactly one ordinary path component.
///
/// `.`, `..`, absolute paths, drive prefixes and anything containing a separator of either
/// platform are rejected, so joining the name onto a category root always stays one level
/// below it.
pub fn is_plain_folder_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Utf8Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Utf8Component::Normal(_)), None)
    )
}

/// True when `dir` is a direct, ordinary child of `category_root`.
pub fn is_entity_dir_of(category_root: &Utf8Path, dir: &Utf8Path) -> bool {
    dir.strip_prefix(category_root)
        .is_ok_and(|rel| is_plain_folder_name(rel.as_str()))
}

/// Output roots of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    sorted_root: Utf8PathBuf,
    fbx_root: Utf8PathBuf,
}

impl OutputLayout {
    pub fn new(sorted_root: impl Into<Utf8PathBuf>, fbx_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            sorted_root: sorted_root.into(),
            fbx_root: fbx_root.into(),
        }
    }

    pub fn sorted_root(&self) -> &Utf8Path {
        &self.sorted_root
    }

    pub fn fbx_root(&self) -> &Utf8Path {
        &self.fbx_root
    }

    /// `<sorted>/<version>`
    pub fn version_root(&self, version: &str) -> Utf8PathBuf {
        self.sorted_root.join(version)
    }

    /// `<sorted>/<version>/<category>`
    pub fn category_root(&self, version: &str, category: EntityCategory) -> Utf8PathBuf {
        self.version_root(version).join(category.canonical_name())
    }

    /// `<sorted>/<version>/<category>/<folder>`
    pub fn entity_dir(&self, version: &str, category: EntityCategory, folder_name: &str) -> Utf8PathBuf {
        self.category_root(version, category).join(folder_name)
    }

    /// `<fbx>/<version>/<category>`
    pub fn fbx_category_root(&self, version: &str, category: EntityCategory) -> Utf8PathBuf {
        self.fbx_root
            .join(version)
            .join(category.canonical_name())
    }

    /// `<sorted>/<version>/<category>/generate_<category>_fbx.bat`, category in lowercase.
    pub fn category_script_path(&self, version: &str, category: EntityCategory) -> Utf8PathBuf {
        self.category_root(version, category).join(format!(
            "generate_{}_fbx.bat",
            category.canonical_name().to_lowercase()
        ))
    }

    /// `<sorted>/<version>/generate_all_fbx.bat`
    pub fn combined_script_path(&self, version: &str) -> Utf8PathBuf {
        self.version_root(version).join(COMBINED_SCRIPT_NAME)
    }
}

/// Mirror `pose` (which lives under `sorted_category_root`) into `fbx_category_root` and swap
/// its extension for `output_extension`.
///
/// Paths outside the sorted root keep only their file name.
pub fn fbx_output_for(
    sorted_category_root: &Utf8Path,
    fbx_category_root: &Utf8Path,
    pose: &Utf8Path,
    output_extension: &str,
) -> Utf8PathBuf {
    let relative = match pose.strip_prefix(sorted_category_root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => Utf8PathBuf::from(pose.file_name().unwrap_or(pose.as_str())),
    };
    let mut output = fbx_category_root.join(relative);
    output.set_extension(output_extension);
    output
}
