//! Canonical sharded dialect: reads back whatever `arbor_writer::save_arbor`
//! wrote. The JSON header alone carries enough (`tree_size`, per-shard tree
//! counts, and each saved field's per-tree `root_field_data`, including
//! `uid`) to build the whole root table without opening a single shard;
//! shard files are opened lazily, one per tree read, same as every other
//! dialect here.

use crate::snapshot_common::PrecomputedPlanter;
use arbor_core::{
    Arbor, DataFile, DataFileProbe, Dtype, FieldRegistry, FieldSourceKind, HeaderValue, Locator,
    RootDescriptor, Selection,
};
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitArray, UnitRegistry};
use arbor_writer::{HeaderFile, ShardRecord, ARBOR_TYPE};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DIALECT: &str = "arbor-canonical";

pub struct Probe;

impl DataFileProbe for Probe {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn is_valid(&self, path: &Path) -> bool {
        load_header(path).map(|header| header.arbor_type == ARBOR_TYPE).unwrap_or(false)
    }
}

fn load_header(path: &Path) -> Result<HeaderFile> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(Error::unsupported("canonical header must be a .json file"));
    }
    let file = File::open(path).map_err(Error::from)?;
    serde_json::from_reader(file).map_err(|e| Error::serialization_failed("decoding header file").set_source(e))
}

struct ShardFile {
    path: PathBuf,
    record: Option<ShardRecord>,
}

impl ShardFile {
    fn new(path: PathBuf) -> Self {
        ShardFile { path, record: None }
    }
}

impl DataFile for ShardFile {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn open(&mut self) -> Result<()> {
        if self.record.is_some() {
            return Ok(());
        }
        let file = File::open(&self.path).map_err(Error::from)?;
        let mut reader = BufReader::new(file);
        self.record = Some(ShardRecord::read_from(&mut reader)?);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.record = None;
        Ok(())
    }

    fn header_properties(&self) -> HashMap<String, HeaderValue> {
        HashMap::new()
    }

    fn read_fields(
        &mut self,
        field_names: &[String],
        selection: Selection<'_>,
        _dtypes: &HashMap<String, Dtype>,
    ) -> Result<HashMap<String, UnitArray>> {
        let record = self.record.as_ref().ok_or_else(|| Error::unexpected("shard file not open"))?;
        let (index, len) = match selection {
            Selection::AllInFile => {
                let len = record.fields.values().next().map(|v| v.len()).unwrap_or(0);
                (0, len)
            }
            Selection::Run { start, count } => match start {
                Locator::Indexed { index, .. } => (index, count),
                Locator::ByteOffset(_) => return Err(Error::unexpected("canonical locator must be indexed")),
            },
            Selection::Handles(handles) if handles.len() == 1 => match handles[0] {
                Locator::Indexed { index, len } => (index, len),
                Locator::ByteOffset(_) => return Err(Error::unexpected("canonical locator must be indexed")),
            },
            Selection::Handles(_) => return Err(Error::not_implemented("canonical scattered handle reads")),
        };

        let mut out = HashMap::with_capacity(field_names.len());
        for name in field_names {
            let column = record.fields.get(name).ok_or_else(|| Error::field_not_found(name))?;
            out.insert(name.clone(), UnitArray::new(column[index..index + len].to_vec(), Unit::dimensionless()));
        }
        Ok(out)
    }

    fn get_particle_positions(&mut self) -> Result<Vec<[f64; 3]>> {
        Err(Error::not_implemented("canonical particle positions"))
    }
}

fn build_descriptors(header: &HeaderFile) -> Result<Vec<RootDescriptor>> {
    let uids = header
        .root_field_data
        .get("uid")
        .ok_or_else(|| Error::field_not_found("uid"))?;
    if uids.len() != header.total_trees {
        return Err(Error::header_malformed("root_field_data[\"uid\"] length disagrees with total_trees"));
    }

    let mut descriptors = Vec::with_capacity(header.total_trees);
    let mut shard_index = 0usize;
    let mut consumed_in_shard = 0usize;
    let mut shard_cursor = 0usize;

    for i in 0..header.total_trees {
        while shard_index < header.shard_tree_counts.len() && consumed_in_shard == header.shard_tree_counts[shard_index]
        {
            shard_index += 1;
            consumed_in_shard = 0;
            shard_cursor = 0;
        }
        let size = header.tree_size[i] as usize;
        descriptors.push(RootDescriptor {
            uid: uids[i] as i64,
            forest_id: i,
            file_index: shard_index,
            locator: Locator::Indexed { index: shard_cursor, len: size },
            tree_size: size,
        });
        shard_cursor += size;
        consumed_in_shard += 1;
    }
    Ok(descriptors)
}

/// Opens a canonical header file (and plants immediately, since the header
/// already carries the full root table) and returns a fully-registered,
/// already-planted Arbor.
pub fn open(path: impl AsRef<Path>) -> Result<Arbor> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::data_file_missing(path.to_string_lossy()));
    }
    let header = load_header(path)?;
    if header.arbor_type != ARBOR_TYPE {
        return Err(Error::backend_unknown(header.arbor_type));
    }
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut registry = FieldRegistry::new(Dtype::F64);
    for field in &header.fields {
        let unit = Unit::parse(&field.units)?;
        registry.register_on_disk(&field.name, unit, FieldSourceKind::File)?;
    }

    let files: Vec<Box<dyn DataFile>> = header
        .shard_files
        .iter()
        .map(|name| Box::new(ShardFile::new(parent.join(name))) as Box<dyn DataFile>)
        .collect();
    let descriptors = build_descriptors(&header)?;
    let planter = Box::new(PrecomputedPlanter(descriptors));
    let unit_registry = Arc::new(UnitRegistry::from_json(&header.unit_registry));
    Ok(Arbor::new(files, planter, registry, unit_registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_writer::save_arbor;

    fn write_sample(dir: &tempfile::TempDir) -> PathBuf {
        let text = dir.path().join("tree_0_0_0.dat");
        std::fs::write(
            &text,
            "#Consistent Trees\n#a = 1.0\n#tree 1\n1.0 1 0 -1 0 0 0 0 0 0 1.0e12 10 0 0 0 0 0 1 2 3\n",
        )
        .unwrap();
        let arbor = crate::text_tree::open(&text).unwrap();
        arbor.plant_trees().unwrap();
        let stem = dir.path().join("canonical_out").to_string_lossy().into_owned();
        let header_path = save_arbor(&arbor, &stem, None, None, 1_000).unwrap();
        PathBuf::from(header_path)
    }

    #[test]
    fn sniffs_a_header_written_by_save_arbor() {
        let dir = tempfile::tempdir().unwrap();
        let header_path = write_sample(&dir);
        assert!(Probe.is_valid(&header_path));
    }

    #[test]
    fn reopens_and_plants_the_same_tree_count() {
        let dir = tempfile::tempdir().unwrap();
        let header_path = write_sample(&dir);
        let arbor = open(&header_path).unwrap();
        arbor.plant_trees().unwrap();
        assert_eq!(arbor.size(), 1);
    }
}
