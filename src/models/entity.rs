use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity category partitioning both the manifest sheets and the output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityCategory {
    #[serde(rename = "PC")]
    PlayerCharacter,
    #[serde(rename = "NPC")]
    NonPlayerCharacter,
    #[serde(rename = "Monster")]
    Monster,
}

impl EntityCategory {
    /// All categories in the order a full pass processes them.
    pub const ALL: [EntityCategory; 3] = [
        EntityCategory::PlayerCharacter,
        EntityCategory::NonPlayerCharacter,
        EntityCategory::Monster,
    ];

    /// Canonical name, used both as the manifest sheet name and the output subdirectory.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            EntityCategory::PlayerCharacter => "PC",
            EntityCategory::NonPlayerCharacter => "NPC",
            EntityCategory::Monster => "Monster",
        }
    }

    /// Mesh sheet name in the split manifest layout (`PC_Mesh`).
    pub fn mesh_sheet_name(&self) -> String {
        format!("{}_Mesh", self.canonical_name())
    }

    /// Animation sheet name in the split manifest layout (`PC_Ani`).
    pub fn animation_sheet_name(&self) -> String {
        format!("{}_Ani", self.canonical_name())
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for EntityCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pc" | "playercharacter" | "player" => Ok(EntityCategory::PlayerCharacter),
            "npc" | "nonplayercharacter" => Ok(EntityCategory::NonPlayerCharacter),
            "monster" | "mob" => Ok(EntityCategory::Monster),
            other => Err(format!("Unknown entity category: {}", other)),
        }
    }
}

/// Kind of asset file, selecting the source subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Mesh,
    Animation,
}

impl AssetKind {
    pub fn source_dir_name(&self) -> &'static str {
        match self {
            AssetKind::Mesh => "Mesh",
            AssetKind::Animation => "Ani",
        }
    }
}

/// One entity row from the manifest.
///
/// `folder_name` is never empty; the loader drops such rows before they get here.
/// Slots are kept positionally, `None` meaning the cell was empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestRecord {
    pub id: Option<String>,
    pub folder_name: String,
    pub mesh_files: Vec<Option<String>>,
    pub animation_files: Vec<Option<String>>,
}

impl ManifestRecord {
    pub fn new(id: Option<String>, folder_name: impl Into<String>) -> Self {
        Self {
            id,
            folder_name: folder_name.into(),
            mesh_files: Vec::new(),
            animation_files: Vec::new(),
        }
    }

    pub fn with_meshes<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mesh_files
            .extend(files.into_iter().map(|f| Some(f.into())));
        self
    }

    pub fn with_animations<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.animation_files
            .extend(files.into_iter().map(|f| Some(f.into())));
        self
    }

    /// Populated mesh slots in manifest order.
    pub fn meshes(&self) -> impl Iterator<Item = &str> {
        self.mesh_files.iter().filter_map(|slot| slot.as_deref())
    }

    /// Populated animation slots in manifest order.
    pub fn animations(&self) -> impl Iterator<Item = &str> {
        self.animation_files.iter().filter_map(|slot| slot.as_deref())
    }

    /// Number of copy tasks this record will produce.
    pub fn slot_count(&self) -> usize {
        self.meshes().count() + self.animations().count()
    }
}

/// A single file copy. Carries no identity beyond its two paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CopyTask {
    source: Utf8PathBuf,
    destination: Utf8PathBuf,
}

impl CopyTask {
    pub fn new(source: Utf8PathBuf, destination: Utf8PathBuf) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn source(&self) -> &Utf8Path {
        &self.source
    }

    pub fn destination(&self) -> &Utf8Path {
        &self.destination
    }
}

/// Result of executing one [`CopyTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    SourceMissing,
    IoFailure(String),
}

impl CopyOutcome {
    pub fn is_copied(&self) -> bool {
        matches!(self, CopyOutcome::Copied)
    }
}
