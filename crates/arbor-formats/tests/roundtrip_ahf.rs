//! Full load -> select -> save -> reload round trip for the backward-linked
//! `ahf` dialect: two `.AHF_halos` snapshots plus their `.AHF_mtree`
//! companions, resolved via the weighted-overlap tie-break and consolidated
//! into one tree.

use arbor_core::Scope;
use std::io::Write;

fn write_snapshots(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let mut halos0 = std::fs::File::create(dir.path().join("snap_000.AHF_halos")).unwrap();
    writeln!(halos0, "#ID hostHalo numSubStruct Mvir npart x Xc Yc Zc").unwrap();
    writeln!(halos0, "100 0 0 1.0e12 500 1.0 2.0 3.0").unwrap();
    let mut mtree0 = std::fs::File::create(dir.path().join("snap_000.AHF_mtree")).unwrap();
    writeln!(mtree0, "200 520").unwrap();
    writeln!(mtree0, "480 100 500").unwrap();

    let mut halos1 = std::fs::File::create(dir.path().join("snap_001.AHF_halos")).unwrap();
    writeln!(halos1, "#ID hostHalo numSubStruct Mvir npart x Xc Yc Zc").unwrap();
    writeln!(halos1, "200 0 0 1.2e12 520 1.1 2.1 3.1").unwrap();

    dir.path().join("snap_000.AHF_halos")
}

#[test]
fn load_select_save_reload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_snapshots(&dir);

    let arbor = arbor_formats::open_snapshot_backward(&path).unwrap();
    arbor.plant_trees().unwrap();
    assert_eq!(arbor.size(), 1, "the single best-weight match links both snapshots into one tree");

    let matches = arbor.select("mvir > 1.1e12", Scope::Tree, None).unwrap();
    assert_eq!(matches.len(), 1);

    let stem = dir.path().join("out").to_string_lossy().into_owned();
    let header_path = arbor_writer::save_arbor(&arbor, &stem, None, None, 1_000).unwrap();

    let reloaded = arbor_formats::load(&header_path, None).unwrap();
    reloaded.plant_trees().unwrap();
    assert_eq!(reloaded.size(), 1);
    assert_eq!(reloaded.iter_roots(None).unwrap()[0].uid().unwrap(), 200);
}
