//! `hlist_<scale>.list`-style dialect (`consistent_trees_hlist`): one file
//! per snapshot like the `rockstar` dialect, but columns laid out like
//! `consistent_trees`'s tree files and ids that are already globally
//! unique across snapshots (no `ID_STRIDE` synthesis needed, same as the
//! `ahf` dialect).
//!
//! Grounded in
//! `original_source/ytree/frontends/consistent_trees_hlist/{io.py,arbor.py}`:
//! `ConsistentTreesHlistDataFile` subclasses the rockstar data file but
//! parses its scale factor from the `hlist_<scale>.list` filename itself
//! rather than a header comment, and `ConsistentTreesHlistArbor` sets
//! `_has_uids = True`, meaning ids already carry cross-snapshot-unique
//! values the way `consistent_trees`' own `ID`/`DescID` columns do.

use crate::columns::{column_index, parse_token};
use crate::snapshot_common::{consolidate, InMemoryCatalogFile, PrecomputedPlanter, Row};
use crate::text_tree::COLUMNS;
use arbor_core::{Arbor, DataFile, DataFileProbe, Dtype, FieldRegistry, FieldSourceKind};
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitRegistry};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DIALECT: &str = "consistent_trees_hlist";

pub struct Probe;

impl DataFileProbe for Probe {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn is_valid(&self, path: &Path) -> bool {
        is_hlist_file(path)
    }
}

fn is_hlist_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    name.starts_with("hlist_") && name.ends_with(".list")
}

fn file_scale(path: &Path) -> Result<f64> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::header_malformed("hlist path has no file name"))?;
    name.strip_prefix("hlist_")
        .and_then(|rest| rest.strip_suffix(".list"))
        .ok_or_else(|| Error::header_malformed("expected hlist_<scale>.list"))?
        .parse::<f64>()
        .map_err(|e| Error::header_malformed(format!("malformed scale factor in {name}: {e}")))
}

fn sibling_hlist_files(path: &Path) -> Result<Vec<PathBuf>> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(Error::from)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| is_hlist_file(p))
        .collect();
    if files.is_empty() {
        return Err(Error::data_file_missing(path.to_string_lossy()));
    }
    files.sort_by(|a, b| file_scale(a).unwrap_or(0.0).partial_cmp(&file_scale(b).unwrap_or(0.0)).unwrap());
    Ok(files)
}

fn read_hlist_rows(path: &Path) -> Result<Vec<Row>> {
    let reader = BufReader::new(File::open(path).map_err(Error::from)?);
    let uid_col = column_index(COLUMNS, "uid")?;
    let desc_uid_col = column_index(COLUMNS, "desc_uid")?;

    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(Error::from)?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let uid = parse_token(&line, uid_col)? as i64;
        let desc_uid = parse_token(&line, desc_uid_col)? as i64;
        let mut fields = HashMap::new();
        for column in COLUMNS {
            if column.name == "uid" || column.name == "desc_uid" {
                continue;
            }
            fields.insert(column.name.to_string(), parse_token(&line, column.index)?);
        }
        rows.push(Row { uid, desc_uid, fields });
    }
    Ok(rows)
}

/// Reads every sibling `hlist_<scale>.list` file, trusts their ids as
/// already globally unique, consolidates the forward-linked ancestor
/// graph into one tree per component, and returns a fully-registered
/// `Arbor`.
pub fn open(path: impl AsRef<Path>) -> Result<Arbor> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::data_file_missing(path.to_string_lossy()));
    }
    let hlist_paths = sibling_hlist_files(path)?;

    let mut all_rows = Vec::new();
    for hlist_path in &hlist_paths {
        all_rows.append(&mut read_hlist_rows(hlist_path)?);
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
        if column.name == "uid" || column.name == "desc_uid" {
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
        let mut snap0 = File::create(dir.path().join("hlist_0.50000.list")).unwrap();
        writeln!(snap0, "#a = 0.5").unwrap();
        writeln!(snap0, "0.5 10 0 -1 0 0 0 0 0 0 1.0e12 100 0 0 0 0 0 1 2 3").unwrap();
        let mut snap1 = File::create(dir.path().join("hlist_1.00000.list")).unwrap();
        writeln!(snap1, "#a = 1.0").unwrap();
        writeln!(snap1, "1.0 20 0 10 0 0 0 0 0 0 2.0e12 120 0 0 0 0 0 1 2 3").unwrap();
    }

    #[test]
    fn sniffs_hlist_files_by_name() {
        let dir = tempfile::tempdir().unwrap();
        sample_snapshots(&dir);
        assert!(Probe.is_valid(&dir.path().join("hlist_0.50000.list")));
        assert!(!Probe.is_valid(&dir.path().join("out_0.list")));
    }

    #[test]
    fn consolidates_forward_links_across_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        sample_snapshots(&dir);
        let arbor = open(dir.path().join("hlist_0.50000.list")).unwrap();
        arbor.plant_trees().unwrap();
        assert_eq!(arbor.size(), 1);
    }
}
