//! Per-snapshot forward-linked dialect (`rockstar`): one `out_<N>.list`
//! file per snapshot, each halo carrying its own `DescID` that names a
//! halo in the *next* snapshot. Raw ids are only ever unique within a
//! single snapshot's file, so the tree-uid/desc-uid pair this backend
//! hands to `Arbor` is synthesized as `snapshot_index * ID_STRIDE + id`,
//! with `desc_uid` stamped against the next snapshot's stride — a
//! documented simplification of the original's looser "compare against
//! the previous iteration's raw ids" approach (see DESIGN.md).
//!
//! Grounded in
//! `original_source/ytree/frontends/rockstar/{io.py,arbor.py,fields.py}`
//! and the generic forward-linking loop in
//! `original_source/ytree/data_structures/arbor.py::CatalogArbor._plant_trees`.

use crate::columns::{column_index, parse_token, Column};
use crate::snapshot_common::{consolidate, InMemoryCatalogFile, PrecomputedPlanter, Row};
use arbor_core::{Arbor, DataFile, DataFileProbe, Dtype, FieldRegistry, FieldSourceKind, HeaderValue};
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitRegistry};
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DIALECT: &str = "rockstar";

/// Large enough that no real snapshot carries this many halos, so
/// `snapshot_index * ID_STRIDE + local_id` never collides across snapshots.
const ID_STRIDE: i64 = 1_000_000_000;

const COLUMNS: &[Column] = &[
    Column { name: "id", index: 0, unit: "" },
    Column { name: "desc_id", index: 1, unit: "" },
    Column { name: "mvir", index: 2, unit: "Msun" },
    Column { name: "rvir", index: 3, unit: "kpc" },
    Column { name: "x", index: 4, unit: "Mpc" },
    Column { name: "y", index: 5, unit: "Mpc" },
    Column { name: "z", index: 6, unit: "Mpc" },
];

pub struct Probe;

impl DataFileProbe for Probe {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn is_valid(&self, path: &Path) -> bool {
        is_rockstar_list(path)
    }
}

fn is_rockstar_list(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    if !name.starts_with("out") || !name.ends_with(".list") {
        return false;
    }
    snapshot_index_regex().is_match(name)
}

fn snapshot_index_regex() -> Regex {
    Regex::new(r"_(\d+)[_.]").expect("static regex is valid")
}

fn snapshot_index(path: &Path) -> Result<i64> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::invalid_argument("snapshot file has no name"))?;
    snapshot_index_regex()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .ok_or_else(|| Error::header_malformed(format!("could not find a snapshot index in {}", name)))
}

fn sibling_snapshot_files(path: &Path) -> Result<Vec<PathBuf>> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(Error::from)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| is_rockstar_list(p))
        .collect();
    files.sort_by_key(|p| snapshot_index(p).unwrap_or(0));
    if files.is_empty() {
        return Err(Error::data_file_missing(path.to_string_lossy()));
    }
    Ok(files)
}

fn read_header_scale(reader: &mut BufReader<File>) -> Option<f64> {
    let mut scale = None;
    loop {
        let mut line = String::new();
        let pos = reader.stream_position().ok();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if !line.starts_with('#') {
            if let Some(pos) = pos {
                let _ = reader.seek(std::io::SeekFrom::Start(pos));
            }
            break;
        }
        if let Some(rest) = line.strip_prefix("#a = ") {
            scale = rest.trim().parse().ok();
        }
    }
    scale
}

fn read_snapshot_rows(path: &Path, snapshot_index: i64) -> Result<(Vec<Row>, Option<f64>)> {
    let file = File::open(path).map_err(Error::from)?;
    let mut reader = BufReader::new(file);
    let scale = read_header_scale(&mut reader);

    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(Error::from)?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let local_id = parse_token(&line, column_index(COLUMNS, "id")?)? as i64;
        let local_desc_id = parse_token(&line, column_index(COLUMNS, "desc_id")?)? as i64;
        let mut fields = HashMap::new();
        for column in COLUMNS {
            if column.name == "id" || column.name == "desc_id" {
                continue;
            }
            fields.insert(column.name.to_string(), parse_token(&line, column.index)?);
        }
        let desc_uid = if local_desc_id < 0 {
            -1
        } else {
            (snapshot_index + 1) * ID_STRIDE + local_desc_id
        };
        rows.push(Row { uid: snapshot_index * ID_STRIDE + local_id, desc_uid, fields });
    }
    Ok((rows, scale))
}

/// Reads every snapshot file named alongside `path`, consolidates the full
/// forward-linked ancestor graph, and returns a fully-registered, already
/// internally-planted `Arbor`.
pub fn open(path: impl AsRef<Path>) -> Result<Arbor> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::data_file_missing(path.to_string_lossy()));
    }
    let snapshot_paths = sibling_snapshot_files(path)?;

    let mut all_rows = Vec::new();
    let mut latest_scale = None;
    for snapshot_path in &snapshot_paths {
        let index = snapshot_index(snapshot_path)?;
        let (mut rows, scale) = read_snapshot_rows(snapshot_path, index)?;
        if scale.is_some() {
            latest_scale = scale;
        }
        all_rows.append(&mut rows);
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
        if column.name == "id" || column.name == "desc_id" {
            continue;
        }
        let unit = Unit::parse(column.unit)?;
        registry.register_on_disk(column.name, unit.clone(), FieldSourceKind::File)?;
        units.insert(column.name.to_string(), unit);
    }

    let mut header_properties = HashMap::new();
    if let Some(scale) = latest_scale {
        header_properties.insert("scale_factor".to_string(), HeaderValue { value: scale, unit: "unitary" });
    }

    let catalog_file = InMemoryCatalogFile::new(DIALECT, columns, units, header_properties);
    let files: Vec<Box<dyn DataFile>> = vec![Box::new(catalog_file)];
    let planter = Box::new(PrecomputedPlanter(descriptors));
    Ok(Arbor::new(files, planter, registry, Arc::new(UnitRegistry::new())))
}
