//! Integration tests for ConfigManager and `Sorter Config.yaml` handling
//!
//! These tests verify:
//! - Configuration loading and saving
//! - Default configuration generation
//! - Partial files falling back to defaults
//! - Configuration validation
//! - Settings flowing into a SortPipeline

use kathana_sorter::models::{AnimationOrientation, ManifestLayout};
use kathana_sorter::services::{MemorySink, SortPipeline};
use kathana_sorter::{ConfigManager, SorterConfig};
use camino::Utf8PathBuf;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(
        manager.settings_path(),
        config_path.join("Sorter Config.yaml")
    );
}

#[test]
fn test_config_dir_is_created() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let nested = config_path.join("Sorter Data");

    ConfigManager::new(&nested).unwrap();
    assert!(nested.is_dir());
}

#[test]
fn test_init_writes_loadable_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert!(manager.write_default_config().unwrap());
    let content = fs::read_to_string(manager.settings_path()).unwrap();
    assert!(content.contains("max_concurrent: 50"));

    let loaded = manager.load_config().unwrap();
    assert_eq!(loaded, SorterConfig::default());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let yaml = r#"
settings:
  manifest:
    layout: split
    animation_orientation: column_major
  converter:
    executable: "Tools/Noesis/Noesis.exe"
versions:
  - name: "Kathana 2"
    root: "D:/Games/Kathana2"
  - name: "Kathana 3.2"
    root: "D:/Games/Kathana3.2"
"#;
    fs::write(manager.settings_path(), yaml).unwrap();

    let config = manager.load_config().unwrap();
    assert_eq!(config.settings.manifest.layout, ManifestLayout::Split);
    assert_eq!(
        config.settings.manifest.animation_orientation,
        AnimationOrientation::ColumnMajor
    );
    assert_eq!(config.settings.manifest.mesh_slots, 4);
    assert_eq!(
        config.settings.converter.executable,
        Utf8PathBuf::from("Tools/Noesis/Noesis.exe")
    );
    assert_eq!(config.settings.converter.mode_flag, "?cmode");
    assert_eq!(config.settings.copy.max_concurrent, 50);

    let names: Vec<_> = config.versions.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["Kathana 2", "Kathana 3.2"]);
    assert_eq!(
        config.find_version("kathana 3.2").unwrap().root,
        Utf8PathBuf::from("D:/Games/Kathana3.2")
    );
}

#[test]
fn test_invalid_values_are_rejected() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.settings_path(),
        "settings:\n  copy:\n    max_concurrent: 0\n",
    )
    .unwrap();

    let err = manager.load_config().unwrap_err();
    assert!(err.to_string().contains("max_concurrent"));
}

#[test]
fn test_malformed_yaml_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.settings_path(), "settings: [unclosed").unwrap();
    assert!(manager.load_config().is_err());
}

#[test]
fn test_loaded_settings_drive_pipeline_layout() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut config = SorterConfig::default();
    config.settings.paths.sorted_root = config_path.join("out/Sorted");
    config.settings.paths.fbx_root = config_path.join("out/FBX");
    manager.save_config(&config).unwrap();

    let loaded = manager.load_config().unwrap();
    let pipeline = SortPipeline::new(loaded.settings, Arc::new(MemorySink::new()));

    assert_eq!(
        pipeline.layout().sorted_root(),
        config_path.join("out/Sorted")
    );
    assert_eq!(pipeline.layout().fbx_root(), config_path.join("out/FBX"));
}
