//! Full load -> select -> save -> reload round trip for the per-snapshot
//! forward-linked `rockstar` dialect: two `out_<N>.list` files consolidated
//! into one tree, then re-saved through the canonical writer.

use arbor_core::Scope;
use std::io::Write;

fn write_snapshots(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let mut snap0 = std::fs::File::create(dir.path().join("out_0.list")).unwrap();
    writeln!(snap0, "#a = 0.5").unwrap();
    writeln!(snap0, "10 -1 1.0e12 100 1 2 3").unwrap();
    let mut snap1 = std::fs::File::create(dir.path().join("out_1.list")).unwrap();
    writeln!(snap1, "#a = 1.0").unwrap();
    writeln!(snap1, "20 10 2.0e12 120 1 2 3").unwrap();
    dir.path().join("out_0.list")
}

#[test]
fn load_select_save_reload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshots(&dir);

    let arbor = arbor_formats::open_snapshot_forward(&path).unwrap();
    arbor.plant_trees().unwrap();
    assert_eq!(arbor.size(), 1, "both snapshot rows are linked into a single tree");

    let matches = arbor.select("mvir > 1.5e12", Scope::Tree, None).unwrap();
    assert_eq!(matches.len(), 1, "only the descendant halo clears the mass bar");

    let stem = dir.path().join("out").to_string_lossy().into_owned();
    let header_path = arbor_writer::save_arbor(&arbor, &stem, None, None, 1_000).unwrap();

    let reloaded = arbor_formats::load(&header_path, None).unwrap();
    reloaded.plant_trees().unwrap();
    assert_eq!(reloaded.size(), 1);

    let root = &reloaded.iter_roots(None).unwrap()[0];
    assert_eq!(root.desc_uid().unwrap(), -1, "the root of a saved tree always carries desc_uid -1");
}
