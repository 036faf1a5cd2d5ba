//! Per-snapshot backward-linked dialect (`ahf` / `treefarm`): halo catalogs
//! plus a companion merger-graph file per snapshot (AHF's `.AHF_mtree`)
//! that records every shared-particle match between this snapshot's halos
//! ("progenitors") and the next snapshot's ("descendants"). A progenitor
//! can match more than one candidate descendant, so each is resolved to a
//! single winner by the weight
//!
//! ```text
//! M_ij = shared_ij^2 / (particles_i * particles_j)
//! ```
//!
//! taking the first maximum on ties, exactly as AHF's own `_compute_links`
//! does with `np.argmax`.
//!
//! Grounded in `original_source/ytree/frontends/ahf/io.py`'s
//! `_compute_links`/`_read_mtree`, with the treefarm dialect sharing the
//! same catalog-plus-graph shape (`original_source/ytree/frontends/treefarm`).

use crate::columns::{column_index, parse_token, Column};
use crate::snapshot_common::{consolidate, InMemoryCatalogFile, PrecomputedPlanter, Row};
use arbor_core::{Arbor, DataFile, DataFileProbe, Dtype, FieldRegistry, FieldSourceKind};
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitRegistry};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DIALECT: &str = "ahf";

const COLUMNS: &[Column] = &[
    Column { name: "id", index: 0, unit: "" },
    Column { name: "mvir", index: 3, unit: "Msun/h" },
    Column { name: "x", index: 5, unit: "Mpc/h" },
    Column { name: "y", index: 6, unit: "Mpc/h" },
    Column { name: "z", index: 7, unit: "Mpc/h" },
];

pub struct Probe;

impl DataFileProbe for Probe {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn is_valid(&self, path: &Path) -> bool {
        path.to_string_lossy().ends_with(".AHF_halos")
    }
}

fn sibling_halo_files(path: &Path) -> Result<Vec<PathBuf>> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(Error::from)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.to_string_lossy().ends_with(".AHF_halos"))
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(Error::data_file_missing(path.to_string_lossy()));
    }
    Ok(files)
}

fn mtree_path_for(halos_path: &Path) -> PathBuf {
    PathBuf::from(halos_path.to_string_lossy().replace(".AHF_halos", ".AHF_mtree"))
}

/// Maps each progenitor id to the single descendant id with the highest
/// shared-particle weight, breaking ties in favor of whichever mtree row
/// came first (matching `np.argmax`'s first-maximum behavior).
fn read_best_descendants(mtree_path: &Path) -> Result<HashMap<i64, i64>> {
    if !mtree_path.exists() {
        return Ok(HashMap::new());
    }
    let reader = BufReader::new(File::open(mtree_path).map_err(Error::from)?);
    let mut current_desc: Option<(i64, i64)> = None;
    let mut best: HashMap<i64, (i64, f64)> = HashMap::new();

    for line in reader.lines() {
        let line = line.map_err(Error::from)?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let first: i64 = tokens
            .first()
            .ok_or_else(|| Error::header_malformed("AHF_mtree row missing first column"))?
            .parse()
            .map_err(|_| Error::header_malformed("AHF_mtree first column is not an integer"))?;

        // A descendant header gives "desc_id desc_npart"; a match row gives
        // "shared prog_id prog_npart" — the two are disambiguated by arity.
        if tokens.len() == 2 {
            let desc_part: i64 = tokens[1]
                .parse()
                .map_err(|_| Error::header_malformed("AHF_mtree desc_npart is not an integer"))?;
            current_desc = Some((first, desc_part));
            continue;
        }
        if tokens.len() < 3 {
            continue;
        }
        let (desc_id, desc_part) = current_desc
            .ok_or_else(|| Error::header_malformed("AHF_mtree match row precedes any descendant header"))?;
        let shared = first as f64;
        let prog_id: i64 = tokens[1]
            .parse()
            .map_err(|_| Error::header_malformed("AHF_mtree prog_id is not an integer"))?;
        let prog_part: f64 = tokens[2]
            .parse()
            .map_err(|_| Error::header_malformed("AHF_mtree prog_npart is not a number"))?;
        let weight = shared * shared / (prog_part * desc_part as f64);

        best.entry(prog_id)
            .and_modify(|(best_desc, best_weight)| {
                if weight > *best_weight {
                    *best_desc = desc_id;
                    *best_weight = weight;
                }
            })
            .or_insert((desc_id, weight));
    }

    Ok(best.into_iter().map(|(prog_id, (desc_id, _))| (prog_id, desc_id)).collect())
}

fn read_halo_rows(path: &Path, descendants: &HashMap<i64, i64>) -> Result<Vec<Row>> {
    let reader = BufReader::new(File::open(path).map_err(Error::from)?);
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(Error::from)?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let id = parse_token(&line, column_index(COLUMNS, "id")?)? as i64;
        let mut fields = HashMap::new();
        for column in COLUMNS {
            if column.name == "id" {
                continue;
            }
            fields.insert(column.name.to_string(), parse_token(&line, column.index)?);
        }
        let desc_uid = descendants.get(&id).copied().unwrap_or(-1);
        rows.push(Row { uid: id, desc_uid, fields });
    }
    Ok(rows)
}

/// Reads every `.AHF_halos` catalog alongside `path` plus each one's
/// `.AHF_mtree` companion, resolves the backward-linked ancestor graph,
/// and returns a fully-registered `Arbor`.
pub fn open(path: impl AsRef<Path>) -> Result<Arbor> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::data_file_missing(path.to_string_lossy()));
    }
    let halo_paths = sibling_halo_files(path)?;

    let mut all_rows = Vec::new();
    for halo_path in &halo_paths {
        let mtree_path = mtree_path_for(halo_path);
        let descendants = read_best_descendants(&mtree_path)?;
        all_rows.append(&mut read_halo_rows(halo_path, &descendants)?);
    }
    if all_rows.is_empty() {
        tracing::info!(path = %path.display(), "no halos found; returning an empty arbor");
    }

    let (descriptors, columns) = consolidate(all_rows);

    let mut units: HashMap<String, Unit> = HashMap::new();
    let mut registry = FieldRegistry::new(Dtype::F64);
    registry.register_on_disk("uid", Unit::dimensionless(), FieldSourceKind::File)?;
    registry.register_on_disk("desc_uid", Unit::dimensionless(), FieldSourceKind::File)?;
    units.insert("uid".to_string(), Unit::dimensionless());
    units.insert("desc_uid".to_string(), Unit::dimensionless());
    for column in COLUMNS {
        if column.name == "id" {
            continue;
        }
        let unit = Unit::parse(column.unit)?;
        registry.register_on_disk(column.name, unit.clone(), FieldSourceKind::File)?;
        units.insert(column.name.to_string(), unit);
    }

    let catalog_file = InMemoryCatalogFile::new(DIALECT, columns, units, HashMap::new());
    let files: Vec<Box<dyn DataFile>> = vec![Box::new(catalog_file)];
    let planter = Box::new(PrecomputedPlanter(descriptors));
    Ok(Arbor::new(files, planter, registry, Arc::new(UnitRegistry::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_snapshots(dir: &tempfile::TempDir) {
        let mut halos0 = File::create(dir.path().join("snap_000.AHF_halos")).unwrap();
        writeln!(halos0, "#ID hostHalo numSubStruct Mvir npart x Xc Yc Zc").unwrap();
        writeln!(halos0, "100 0 0 1.0e12 500 1.0 2.0 3.0").unwrap();
        let mut mtree0 = File::create(dir.path().join("snap_000.AHF_mtree")).unwrap();
        writeln!(mtree0, "200 520").unwrap();
        writeln!(mtree0, "480 100 500").unwrap();

        let mut halos1 = File::create(dir.path().join("snap_001.AHF_halos")).unwrap();
        writeln!(halos1, "#ID hostHalo numSubStruct Mvir npart x Xc Yc Zc").unwrap();
        writeln!(halos1, "200 0 0 1.2e12 520 1.1 2.1 3.1").unwrap();
    }

    #[test]
    fn sniffs_ahf_halos_file() {
        let dir = tempfile::tempdir().unwrap();
        sample_snapshots(&dir);
        assert!(Probe.is_valid(&dir.path().join("snap_000.AHF_halos")));
    }

    #[test]
    fn resolves_backward_links_into_one_tree() {
        let dir = tempfile::tempdir().unwrap();
        sample_snapshots(&dir);
        let arbor = open(dir.path().join("snap_000.AHF_halos")).unwrap();
        arbor.plant_trees().unwrap();
        assert_eq!(arbor.size(), 1);
    }
}
