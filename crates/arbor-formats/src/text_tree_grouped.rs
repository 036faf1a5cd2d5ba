//! Grouped text-tree dialect (`consistent_trees_hlist` / `locations.dat`):
//! a `locations.dat` index lists `(tree_uid, file_id, byte_offset,
//! filename)` rows; tree size isn't in the index and is inferred from the
//! next tree's offset in the same file, or the file's length for the last
//! tree in each shard.
//!
//! Grounded in
//! `original_source/ytree/frontends/consistent_trees/arbor.py::ConsistentTreesGroupArbor._plant_trees`.

use crate::text_tree::{ConsistentTreesFile, COLUMNS};
use arbor_core::{
    Arbor, DataFile, DataFileProbe, Dtype, FieldRegistry, FieldSourceKind, Locator, Planter,
    RootDescriptor,
};
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitRegistry};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DIALECT: &str = "consistent_trees_locations";

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
    if path.file_name().and_then(|n| n.to_str()) != Some("locations.dat") {
        return Ok(false);
    }
    let mut reader = BufReader::new(File::open(path)?);
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || !line.starts_with('#') {
            return Ok(false);
        }
        if line.contains("TreeRootID FileID Offset Filename") {
            return Ok(true);
        }
    }
}

struct LocationRow {
    uid: i64,
    file_id: usize,
    offset: u64,
}

struct GroupedPlanter {
    locations_path: PathBuf,
    shard_paths: Vec<PathBuf>,
}

impl Planter for GroupedPlanter {
    fn plant(&self, _files: &[Mutex<Box<dyn DataFile>>]) -> Result<Vec<RootDescriptor>> {
        let reader = BufReader::new(File::open(&self.locations_path).map_err(Error::from)?);
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(Error::from)?;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let uid: i64 = parts
                .next()
                .ok_or_else(|| Error::header_malformed("locations.dat row missing uid"))?
                .parse()
                .map_err(|_| Error::header_malformed("locations.dat uid is not an integer"))?;
            let file_id: usize = parts
                .next()
                .ok_or_else(|| Error::header_malformed("locations.dat row missing file id"))?
                .parse()
                .map_err(|_| Error::header_malformed("locations.dat file id is not an integer"))?;
            let offset: u64 = parts
                .next()
                .ok_or_else(|| Error::header_malformed("locations.dat row missing offset"))?
                .parse()
                .map_err(|_| Error::header_malformed("locations.dat offset is not an integer"))?;
            rows.push(LocationRow { uid, file_id, offset });
        }
        rows.sort_by_key(|row| (row.file_id, row.offset));

        let mut shard_lengths: Vec<u64> = Vec::with_capacity(self.shard_paths.len());
        for path in &self.shard_paths {
            let len = std::fs::metadata(path).map_err(Error::from)?.len();
            shard_lengths.push(len);
        }

        let mut descriptors = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let next_in_same_file =
                rows.get(i + 1).filter(|next| next.file_id == row.file_id).map(|next| next.offset);
            let end_offset = next_in_same_file.unwrap_or(shard_lengths[row.file_id]);
            let tree_size = count_halo_lines(&self.shard_paths[row.file_id], row.offset, end_offset)?;
            descriptors.push(RootDescriptor {
                uid: row.uid,
                forest_id: i,
                file_index: row.file_id,
                locator: Locator::ByteOffset(row.offset),
                tree_size,
            });
        }
        Ok(descriptors)
    }
}

fn count_halo_lines(path: &Path, start: u64, end: u64) -> Result<usize> {
    let mut file = File::open(path).map_err(Error::from)?;
    file.seek(SeekFrom::Start(start)).map_err(Error::from)?;
    let mut reader = BufReader::new(file.take(end.saturating_sub(start)));
    let mut count = 0usize;
    for line in reader.by_ref().lines() {
        let line = line.map_err(Error::from)?;
        if !line.starts_with('#') && !line.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

/// Opens a `locations.dat` index and every shard file it references,
/// returning a fully-registered `Arbor` (no trees planted yet).
pub fn open(path: impl AsRef<Path>) -> Result<Arbor> {
    let locations_path = path.as_ref().to_path_buf();
    if !locations_path.exists() {
        return Err(Error::data_file_missing(locations_path.to_string_lossy()));
    }
    let base_dir = locations_path.parent().unwrap_or_else(|| Path::new("."));

    let reader = BufReader::new(File::open(&locations_path).map_err(Error::from)?);
    let mut shard_names: Vec<(usize, String)> = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(Error::from)?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let _uid = parts.next();
        let file_id: usize = parts
            .next()
            .ok_or_else(|| Error::header_malformed("locations.dat row missing file id"))?
            .parse()
            .map_err(|_| Error::header_malformed("locations.dat file id is not an integer"))?;
        let filename = parts
            .last()
            .ok_or_else(|| Error::header_malformed("locations.dat row missing filename"))?
            .to_string();
        if !shard_names.iter().any(|(id, _)| *id == file_id) {
            shard_names.push((file_id, filename));
        }
    }
    shard_names.sort_by_key(|(id, _)| *id);
    if shard_names.iter().enumerate().any(|(i, (id, _))| i != *id) {
        return Err(Error::header_malformed("locations.dat file ids are not contiguous from zero"));
    }

    let shard_paths: Vec<PathBuf> = shard_names.iter().map(|(_, name)| base_dir.join(name)).collect();
    for shard_path in &shard_paths {
        if !shard_path.exists() {
            return Err(Error::data_file_missing(shard_path.to_string_lossy()));
        }
    }

    let mut registry = FieldRegistry::new(Dtype::F64);
    for column in COLUMNS {
        registry.register_on_disk(column.name, Unit::parse(column.unit)?, FieldSourceKind::File)?;
    }

    let files: Vec<Box<dyn DataFile>> =
        shard_paths.iter().map(|p| Box::new(ConsistentTreesFile::new(p.clone())) as Box<dyn DataFile>).collect();
    let planter = Box::new(GroupedPlanter { locations_path, shard_paths });
    Ok(Arbor::new(files, planter, registry, Arc::new(UnitRegistry::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample(dir: &tempfile::TempDir) -> PathBuf {
        let shard = dir.path().join("tree_0_0_0.dat");
        let mut shard_file = File::create(&shard).unwrap();
        writeln!(shard_file, "#Consistent Trees").unwrap();
        let halo_1 = "1.0 1 0 -1 0 0 0 0 0 0 1.0e12 10 0 0 0 0 0 1 2 3\n";
        let offset_1 = shard_file.metadata().unwrap().len();
        write!(shard_file, "{}", halo_1).unwrap();
        let offset_2 = shard_file.metadata().unwrap().len();
        let halo_2 = "1.0 2 0 -1 0 0 0 0 0 0 2.0e12 11 0 0 0 0 0 4 5 6\n";
        write!(shard_file, "{}", halo_2).unwrap();

        let locations = dir.path().join("locations.dat");
        let mut locations_file = File::create(&locations).unwrap();
        writeln!(locations_file, "#TreeRootID FileID Offset Filename").unwrap();
        writeln!(locations_file, "1 0 {} tree_0_0_0.dat", offset_1).unwrap();
        writeln!(locations_file, "2 0 {} tree_0_0_0.dat", offset_2).unwrap();
        locations
    }

    #[test]
    fn sniffs_locations_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(&dir);
        assert!(Probe.is_valid(&path));
    }

    #[test]
    fn plants_one_root_per_location_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(&dir);
        let arbor = open(&path).unwrap();
        arbor.plant_trees().unwrap();
        assert_eq!(arbor.size(), 2);
    }
}
