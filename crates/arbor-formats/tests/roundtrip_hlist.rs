//! Full load -> select -> save -> reload round trip for the `hlist_*.list`
//! dialect: forward-linked per-snapshot catalogs like `rockstar`, but with
//! already globally unique ids (no `ID_STRIDE` synthesis needed).

use arbor_core::Scope;
use std::io::Write;

fn write_snapshots(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let mut snap0 = std::fs::File::create(dir.path().join("hlist_0.50000.list")).unwrap();
    writeln!(snap0, "#a = 0.5").unwrap();
    writeln!(snap0, "0.5 10 0 -1 0 0 0 0 0 0 1.0e12 100 0 0 0 0 0 1 2 3").unwrap();
    let mut snap1 = std::fs::File::create(dir.path().join("hlist_1.00000.list")).unwrap();
    writeln!(snap1, "#a = 1.0").unwrap();
    writeln!(snap1, "1.0 20 0 10 0 0 0 0 0 0 2.0e12 120 0 0 0 0 0 1 2 3").unwrap();
    dir.path().join("hlist_0.50000.list")
}

#[test]
fn load_select_save_reload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshots(&dir);

    let arbor = arbor_formats::open_hlist_style(&path).unwrap();
    arbor.plant_trees().unwrap();
    assert_eq!(arbor.size(), 1);

    let matches = arbor.select("mvir > 1.5e12", Scope::Tree, None).unwrap();
    assert_eq!(matches.len(), 1);

    let stem = dir.path().join("out").to_string_lossy().into_owned();
    let header_path = arbor_writer::save_arbor(&arbor, &stem, None, None, 1_000).unwrap();

    let reloaded = arbor_formats::load(&header_path, None).unwrap();
    reloaded.plant_trees().unwrap();
    assert_eq!(reloaded.size(), 1);
    assert_eq!(reloaded.iter_roots(None).unwrap()[0].uid().unwrap(), 20);
}
