//! Single-file text-tree dialect (`consistent_trees`): one text file,
//! `#tree <uid>` markers delimit each root's contiguous row range,
//! ancestors linked by `desc_uid` within the tree.
//!
//! Grounded in `original_source/ytree/frontends/consistent_trees/io.py`'s
//! byte-offset seek + whitespace-column field reading, and the `#tree`
//! marker scan from `original_source/ytree/frontends/consistent_trees/arbor.py`.

use crate::columns::{column_index, parse_token, Column};
use arbor_core::{
    Arbor, DataFile, DataFileProbe, Dtype, FieldRegistry, FieldSourceKind, HeaderValue, Locator,
    Planter, RootDescriptor, Selection,
};
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitArray, UnitRegistry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) const COLUMNS: &[Column] = &[
    Column { name: "scale", index: 0, unit: "unitary" },
    Column { name: "uid", index: 1, unit: "" },
    Column { name: "desc_uid", index: 3, unit: "" },
    Column { name: "num_prog", index: 4, unit: "" },
    Column { name: "mvir", index: 10, unit: "Msun/h" },
    Column { name: "rvir", index: 11, unit: "kpc/h" },
    Column { name: "x", index: 17, unit: "Mpc/h" },
    Column { name: "y", index: 18, unit: "Mpc/h" },
    Column { name: "z", index: 19, unit: "Mpc/h" },
];

pub const DIALECT: &str = "consistent_trees";

pub struct Probe;

impl DataFileProbe for Probe {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn is_valid(&self, path: &Path) -> bool {
        sniff(path).unwrap_or(false)
    }
}

fn sniff(path: &Path) -> std::io::Result<bool> {
    if path.extension().and_then(|e| e.to_str()) != Some("dat") {
        return Ok(false);
    }
    let mut reader = BufReader::new(File::open(path)?);
    let mut header = String::new();
    for _ in 0..20 {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if !line.starts_with('#') {
            break;
        }
        header.push_str(&line);
    }
    Ok(header.contains("Consistent Trees"))
}

fn parse_scale_factor(header: &str) -> Option<f64> {
    header.lines().find_map(|line| line.strip_prefix("#a = ")).and_then(|s| s.trim().parse().ok())
}

pub(crate) struct ConsistentTreesFile {
    path: PathBuf,
    handle: Option<File>,
    header_properties: HashMap<String, HeaderValue>,
}

impl ConsistentTreesFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        ConsistentTreesFile { path, handle: None, header_properties: HashMap::new() }
    }

    fn read_lines_at(&mut self, offset: u64, count: usize) -> Result<Vec<String>> {
        let handle = self.handle.as_mut().ok_or_else(|| Error::unexpected("file not open"))?;
        handle.seek(SeekFrom::Start(offset)).map_err(Error::from)?;
        let mut reader = BufReader::new(handle);
        let mut lines = Vec::new();
        for _ in 0..count {
            let mut line = String::new();
            if reader.read_line(&mut line).map_err(Error::from)? == 0 {
                break;
            }
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }
}

impl DataFile for ConsistentTreesFile {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let file = File::open(&self.path).map_err(Error::from)?;
        let mut reader = BufReader::new(&file);
        let mut header = String::new();
        for _ in 0..20 {
            let mut line = String::new();
            if reader.read_line(&mut line).map_err(Error::from)? == 0 || !line.starts_with('#') {
                break;
            }
            header.push_str(&line);
        }
        if let Some(scale) = parse_scale_factor(&header) {
            self.header_properties.insert("scale_factor".to_string(), HeaderValue { value: scale, unit: "unitary" });
        }
        self.handle = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.handle = None;
        Ok(())
    }

    fn header_properties(&self) -> HashMap<String, HeaderValue> {
        self.header_properties.clone()
    }

    fn read_fields(
        &mut self,
        field_names: &[String],
        selection: Selection<'_>,
        _dtypes: &HashMap<String, Dtype>,
    ) -> Result<HashMap<String, UnitArray>> {
        let columns: Vec<(String, usize)> = field_names
            .iter()
            .map(|name| Ok((name.clone(), column_index(COLUMNS, name)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut out: HashMap<String, Vec<f64>> =
            field_names.iter().map(|name| (name.clone(), Vec::new())).collect();

        let line_groups: Vec<Vec<String>> = match selection {
            Selection::AllInFile => vec![self.read_lines_at(0, usize::MAX)?],
            Selection::Run { start, count } => match start {
                Locator::ByteOffset(offset) => vec![self.read_lines_at(offset, count)?],
                Locator::Indexed { .. } => {
                    return Err(Error::unexpected("consistent_trees locator must be a byte offset"))
                }
            },
            Selection::Handles(handles) => handles
                .iter()
                .map(|handle| match handle {
                    Locator::ByteOffset(offset) => self.read_lines_at(*offset, 1),
                    Locator::Indexed { .. } => {
                        Err(Error::unexpected("consistent_trees locator must be a byte offset"))
                    }
                })
                .collect::<Result<Vec<_>>>()?,
        };

        for lines in line_groups {
            for line in lines {
                for (name, column) in &columns {
                    out.get_mut(name).unwrap().push(parse_token(&line, *column)?);
                }
            }
        }

        Ok(out
            .into_iter()
            .map(|(name, values)| {
                let unit = column_unit(&name);
                (name, UnitArray::new(values, unit))
            })
            .collect())
    }

    fn get_particle_positions(&mut self) -> Result<Vec<[f64; 3]>> {
        Err(Error::not_implemented("consistent_trees particle positions"))
    }
}

fn column_unit(name: &str) -> Unit {
    COLUMNS
        .iter()
        .find(|c| c.name == name)
        .map(|c| Unit::parse(c.unit).unwrap_or_else(|_| Unit::dimensionless()))
        .unwrap_or_else(Unit::dimensionless)
}

/// Scans the file for `#tree <uid>` markers to build the root-descriptor
/// table. Independent of the `DataFile` trait object (which exposes only
/// `read_fields`): tree-boundary discovery is a one-time structural scan,
/// not a per-field read, so the planter holds its own path and reads
/// directly rather than going through the handle passed to `plant`.
struct ConsistentTreesPlanter {
    path: PathBuf,
}

impl Planter for ConsistentTreesPlanter {
    fn plant(&self, _files: &[Mutex<Box<dyn DataFile>>]) -> Result<Vec<RootDescriptor>> {
        let reader = BufReader::new(File::open(&self.path).map_err(Error::from)?);
        let mut descriptors = Vec::new();
        let mut offset: u64 = 0;
        let mut pending: Option<(i64, u64)> = None;
        let mut halo_count = 0usize;
        let mut forest_id = 0usize;

        let mut lines = reader.lines();
        loop {
            let line = match lines.next() {
                Some(line) => line.map_err(Error::from)?,
                None => {
                    if let Some((uid, start)) = pending.take() {
                        descriptors.push(RootDescriptor {
                            uid,
                            forest_id,
                            file_index: 0,
                            locator: Locator::ByteOffset(start),
                            tree_size: halo_count,
                        });
                    }
                    break;
                }
            };
            let line_len = line.len() as u64 + 1;
            if let Some(rest) = line.strip_prefix("#tree ") {
                if let Some((uid, start)) = pending.take() {
                    descriptors.push(RootDescriptor {
                        uid,
                        forest_id,
                        file_index: 0,
                        locator: Locator::ByteOffset(start),
                        tree_size: halo_count,
                    });
                    forest_id += 1;
                }
                let uid: i64 = rest
                    .trim()
                    .parse()
                    .map_err(|_| Error::header_malformed("malformed #tree marker"))?;
                offset += line_len;
                pending = Some((uid, offset));
                halo_count = 0;
                continue;
            }
            offset += line_len;
            if !line.starts_with('#') && !line.trim().is_empty() {
                halo_count += 1;
            }
        }

        Ok(descriptors)
    }
}

/// Opens a `consistent_trees` tree file and returns a fully-registered
/// `Arbor` (field registry populated, no trees planted yet).
pub fn open(path: impl AsRef<Path>) -> Result<Arbor> {
    let path = path.as_ref().to_path_buf();
    if !path.exists() {
        return Err(Error::data_file_missing(path.to_string_lossy()));
    }

    let mut registry = FieldRegistry::new(Dtype::F64);
    registry.register_on_disk("uid", Unit::dimensionless(), FieldSourceKind::File)?;
    registry.register_on_disk("desc_uid", Unit::dimensionless(), FieldSourceKind::File)?;
    for column in COLUMNS {
        if column.name == "uid" || column.name == "desc_uid" {
            continue;
        }
        registry.register_on_disk(column.name, Unit::parse(column.unit)?, FieldSourceKind::File)?;
    }

    let files: Vec<Box<dyn DataFile>> = vec![Box::new(ConsistentTreesFile::new(path.clone()))];
    let planter = Box::new(ConsistentTreesPlanter { path });
    Ok(Arbor::new(files, planter, registry, Arc::new(UnitRegistry::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_tree(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("tree_0_0_0.dat");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "#Consistent Trees").unwrap();
        writeln!(file, "#a = 1.0").unwrap();
        writeln!(file, "#tree 1").unwrap();
        writeln!(file, "1.0 1 0 -1 0 0 0 0 0 0 1.0e12 10 0 0 0 0 0 1 2 3").unwrap();
        writeln!(file, "0.9 2 0 1 0 0 0 0 0 0 5.0e11 8 0 0 0 0 0 1 2 3").unwrap();
        writeln!(file, "#tree 2").unwrap();
        writeln!(file, "1.0 3 0 -1 0 0 0 0 0 0 2.0e12 11 0 0 0 0 0 4 5 6").unwrap();
        path
    }

    #[test]
    fn sniffs_consistent_trees_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_tree(&dir);
        assert!(Probe.is_valid(&path));
    }

    #[test]
    fn plants_one_root_per_tree_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_tree(&dir);
        let arbor = open(&path).unwrap();
        arbor.plant_trees().unwrap();
        assert_eq!(arbor.size(), 2);
    }
}
