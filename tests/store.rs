use std::fs;

use camino::Utf8PathBuf;

use visual_graph_datasets::domain::DatasetName;
use visual_graph_datasets::store::{Store, atomic_rename_dir, dir_size};

fn store_in(temp: &tempfile::TempDir) -> Store {
    Store::new(Utf8PathBuf::from_path_buf(temp.path().join("datasets")).unwrap())
}

#[test]
fn dataset_dir_layout() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    let name: DatasetName = "rb_dual_motifs".parse().unwrap();

    assert!(store.dataset_dir(&name).ends_with("datasets/rb_dual_motifs"));
    assert!(!store.exists(&name));
    fs::create_dir_all(store.dataset_dir(&name)).unwrap();
    assert!(store.exists(&name));
}

#[test]
fn list_local_on_missing_root_is_empty() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    assert!(store.list_local().unwrap().is_empty());
}

#[test]
fn remove_deletes_only_the_named_folder() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    let keep: DatasetName = "aqsoldb".parse().unwrap();
    let drop: DatasetName = "mock".parse().unwrap();
    for name in [&keep, &drop] {
        fs::create_dir_all(store.dataset_dir(name)).unwrap();
        fs::write(store.dataset_dir(name).join("0.json"), b"{}").unwrap();
    }

    assert!(store.remove(&drop).unwrap());
    assert_eq!(store.list_local().unwrap(), vec!["aqsoldb"]);
    assert!(store.exists(&keep));
}

#[test]
fn rename_replaces_destination() {
    let temp = tempfile::tempdir().unwrap();
    let from = temp.path().join("staged");
    let to = temp.path().join("final");
    fs::create_dir_all(&from).unwrap();
    fs::write(from.join("0.json"), b"0123").unwrap();
    fs::create_dir_all(&to).unwrap();
    fs::write(to.join("old.json"), b"old").unwrap();

    atomic_rename_dir(&from, &to).unwrap();
    assert!(!from.exists());
    assert!(!to.join("old.json").exists());
    assert_eq!(dir_size(&to).unwrap(), 4);
}
