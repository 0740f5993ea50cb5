//! Integration tests for converter script generation over a sorted tree

use camino::Utf8PathBuf;
use kathana_sorter::models::ConverterSettings;
use kathana_sorter::services::{
    BatchCommandGenerator, EventKind, MemorySink, MemoryWorkbook, SortPipeline,
};
use kathana_sorter::{EntityCategory, SorterSettings};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn setup() -> (TempDir, Utf8PathBuf, SortPipeline, Arc<MemorySink>) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let mut settings = SorterSettings::default();
    settings.paths.sorted_root = root.join("Sorted");
    settings.paths.fbx_root = root.join("FBX");
    let sink = Arc::new(MemorySink::new());
    let pipeline = SortPipeline::new(settings, sink.clone());
    (temp_dir, root, pipeline, sink)
}

fn touch(path: &Utf8PathBuf) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"data").unwrap();
}

#[test]
fn test_skeleton_and_pose_produce_one_command() {
    let (_temp_dir, root, pipeline, _sink) = setup();
    touch(&root.join("Sorted/K3/PC/Warrior/skel.tmb"));
    touch(&root.join("Sorted/K3/PC/Warrior/pose.tab"));

    let commands = pipeline
        .generate_commands("K3", EntityCategory::PlayerCharacter)
        .unwrap();

    assert_eq!(commands.len(), 1);
    let expected = format!(
        "\"_Noesis/Noesis.exe\" ?cmode \"{}\" \"{}\" -loadanimsingle \"{}\" -export -bakeanimscale -showstats -animbonenamematch -fbxnoextraframe",
        root.join("Sorted/K3/PC/Warrior/skel.tmb"),
        root.join("FBX/K3/PC/Warrior/pose.fbx"),
        root.join("Sorted/K3/PC/Warrior/pose.tab"),
    );
    assert_eq!(commands[0].to_command_line(), expected);
    assert!(root.join("FBX/K3/PC/Warrior").is_dir());
}

#[test]
fn test_category_script_is_byte_identical_across_runs() {
    let (_temp_dir, root, pipeline, sink) = setup();
    for entity in ["Zombie", "Bat", "Orc"] {
        touch(&root.join(format!("Sorted/K3/Monster/{}/{}.tmb", entity, entity)));
        touch(&root.join(format!("Sorted/K3/Monster/{}/run.tab", entity)));
        touch(&root.join(format!("Sorted/K3/Monster/{}/idle.tab", entity)));
    }

    let path = pipeline
        .write_category_script("K3", EntityCategory::Monster)
        .unwrap();
    let first = fs::read(&path).unwrap();
    pipeline
        .write_category_script("K3", EntityCategory::Monster)
        .unwrap();
    let second = fs::read(&path).unwrap();

    assert_eq!(path, root.join("Sorted/K3/Monster/generate_monster_fbx.bat"));
    assert_eq!(first, second);

    let text = String::from_utf8(first).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(text.ends_with('\n'));
    // Directory walk order, then pose name order
    assert!(lines[0].contains("Bat/idle.tab"));
    assert!(lines[1].contains("Bat/run.tab"));
    assert!(lines[5].contains("Zombie/run.tab"));
    assert_eq!(sink.count(EventKind::ScriptWritten), 2);
}

#[test]
fn test_combined_script_follows_category_order() {
    let (_temp_dir, root, pipeline, _sink) = setup();
    touch(&root.join("Sorted/K3/Monster/Rat/rat.tmb"));
    touch(&root.join("Sorted/K3/Monster/Rat/bite.tab"));
    touch(&root.join("Sorted/K3/PC/Mage/mage.tmb"));
    touch(&root.join("Sorted/K3/PC/Mage/cast.tab"));

    let path = pipeline.write_combined_script("K3").unwrap();
    assert_eq!(path, root.join("Sorted/K3/generate_all_fbx.bat"));

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("PC/Mage/cast.tab"));
    assert!(lines[1].contains("Monster/Rat/bite.tab"));
}

#[test]
fn test_nested_directories_mirror_into_fbx_tree() {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    touch(&root.join("Sorted/Knight/Extra/knight.TMB"));
    touch(&root.join("Sorted/Knight/Extra/charge.TAB"));

    let generator = BatchCommandGenerator::new(ConverterSettings {
        output_extension: "gltf".to_string(),
        ..Default::default()
    });
    let commands = generator
        .generate(&root.join("Sorted"), &root.join("Out"))
        .unwrap();

    assert_eq!(commands.len(), 1);
    assert_eq!(
        commands[0].output,
        root.join("Out/Knight/Extra/charge.gltf")
    );
}

#[tokio::test]
async fn test_sort_then_script_round_trip() {
    let (_temp_dir, root, pipeline, _sink) = setup();
    let version_root = root.join("games/K3");
    for (kind, file) in [("Mesh", "warrior.mesh"), ("Ani", "warrior.tmb"), ("Ani", "swing.tab")] {
        touch(&version_root.join("resource/object/PC").join(kind).join(file));
    }
    let mut manifest = MemoryWorkbook::new().with_rows(
        "PC",
        &[
            &["ID", "Folder", "M1", "M2", "M3", "M4", "A1", "A2"],
            &["1", "Warrior", "warrior.mesh", "", "", "", "warrior.tmb", "swing.tab"],
        ],
    );

    pipeline
        .sort_category_from(&mut manifest, &version_root, EntityCategory::PlayerCharacter)
        .await
        .unwrap();
    let commands = pipeline
        .generate_commands("K3", EntityCategory::PlayerCharacter)
        .unwrap();

    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].output, root.join("FBX/K3/PC/Warrior/swing.fbx"));
}
