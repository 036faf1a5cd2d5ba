//! Struct-of-arrays forest pack dialect (`consistent_trees_hdf5`): one HDF5
//! file holding a `/Forests/<field>` dataset per field (every halo across
//! every tree concatenated in file order) plus a `/TreeInfo` group giving,
//! per tree, its root uid and `(offset, size)` slice into those datasets.
//! Each tree's halos are already physically contiguous on disk, so this is
//! the one per-snapshot-shaped dialect that needs no eager consolidation:
//! `(offset, size)` maps directly onto `Locator::Indexed`.
//!
//! Grounded in
//! `original_source/ytree/frontends/consistent_trees_hdf5/{io.py,arbor.py}`.
//! Only the `access="tree"` mode is supported (the original's default); the
//! `access="forest"` variant reads the same shape from a `ForestInfo` group
//! and is not exposed here.

use arbor_core::{
    Arbor, DataFile, DataFileProbe, Dtype, FieldRegistry, FieldSourceKind, HeaderValue, Locator,
    Planter, RootDescriptor, Selection,
};
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitArray, UnitRegistry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DIALECT: &str = "consistent_trees_hdf5";

pub struct Probe;

impl DataFileProbe for Probe {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn is_valid(&self, path: &Path) -> bool {
        sniff(path).unwrap_or(false)
    }
}

fn sniff(path: &Path) -> hdf5::Result<bool> {
    if !hdf5::is_hdf5(path) {
        return Ok(false);
    }
    let file = hdf5::File::open(path)?;
    Ok(["Nforests", "Ntrees", "Nhalos"].iter().all(|attr| file.attr(attr).is_ok()))
}

struct ConsistentTreesHdf5File {
    path: PathBuf,
    handle: Option<hdf5::File>,
}

impl ConsistentTreesHdf5File {
    fn new(path: PathBuf) -> Self {
        ConsistentTreesHdf5File { path, handle: None }
    }

    fn forests_group(&self) -> Result<hdf5::Group> {
        let handle = self.handle.as_ref().ok_or_else(|| Error::unexpected("hdf5 file not open"))?;
        handle.group("Forests").map_err(|e| Error::unexpected(format!("missing /Forests group: {e}")))
    }
}

impl DataFile for ConsistentTreesHdf5File {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        self.handle = Some(
            hdf5::File::open(&self.path)
                .map_err(|e| Error::data_file_missing(format!("{}: {e}", self.path.display())))?,
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.handle = None;
        Ok(())
    }

    fn header_properties(&self) -> HashMap<String, HeaderValue> {
        let mut properties = HashMap::new();
        if let Some(handle) = &self.handle {
            if let Ok(scale) = handle.attr("scale_factor").and_then(|a| a.read_scalar::<f64>()) {
                properties.insert("scale_factor".to_string(), HeaderValue { value: scale, unit: "unitary" });
            }
        }
        properties
    }

    fn read_fields(
        &mut self,
        field_names: &[String],
        selection: Selection<'_>,
        _dtypes: &HashMap<String, Dtype>,
    ) -> Result<HashMap<String, UnitArray>> {
        let group = self.forests_group()?;
        let ranges: Vec<(usize, usize)> = match selection {
            Selection::AllInFile => vec![],
            Selection::Run { start, count } => match start {
                Locator::Indexed { index, .. } => vec![(index, count)],
                Locator::ByteOffset(_) => return Err(Error::unexpected("forest pack locator must be indexed")),
            },
            Selection::Handles(handles) => handles
                .iter()
                .map(|handle| match handle {
                    Locator::Indexed { index, len } => Ok((*index, *len)),
                    Locator::ByteOffset(_) => Err(Error::unexpected("forest pack locator must be indexed")),
                })
                .collect::<Result<Vec<_>>>()?,
        };

        let mut out = HashMap::with_capacity(field_names.len());
        for name in field_names {
            let dataset = group
                .dataset(name)
                .map_err(|_| Error::field_not_found(name))?;
            let full: Vec<f64> = dataset
                .read_raw::<f64>()
                .map_err(|e| Error::unexpected(format!("reading /Forests/{name}: {e}")))?;
            let values = if ranges.is_empty() {
                full
            } else {
                let mut values = Vec::new();
                for (index, len) in &ranges {
                    values.extend_from_slice(&full[*index..*index + *len]);
                }
                values
            };
            out.insert(name.clone(), UnitArray::new(values, Unit::dimensionless()));
        }
        Ok(out)
    }

    fn get_particle_positions(&mut self) -> Result<Vec<[f64; 3]>> {
        Err(Error::not_implemented("consistent_trees_hdf5 particle positions"))
    }
}

struct TreeInfoPlanter {
    path: PathBuf,
}

impl Planter for TreeInfoPlanter {
    fn plant(&self, _files: &[Mutex<Box<dyn DataFile>>]) -> Result<Vec<RootDescriptor>> {
        let file = hdf5::File::open(&self.path)
            .map_err(|e| Error::data_file_missing(format!("{}: {e}", self.path.display())))?;
        let tree_info = file
            .group("TreeInfo")
            .map_err(|e| Error::header_malformed(format!("missing /TreeInfo group: {e}")))?;
        let root_ids: Vec<i64> = tree_info
            .dataset("TreeRootID")
            .and_then(|d| d.read_raw::<i64>())
            .map_err(|e| Error::header_malformed(format!("reading TreeRootID: {e}")))?;
        let offsets: Vec<u64> = tree_info
            .dataset("TreeHalosOffset")
            .and_then(|d| d.read_raw::<u64>())
            .map_err(|e| Error::header_malformed(format!("reading TreeHalosOffset: {e}")))?;
        let sizes: Vec<u64> = tree_info
            .dataset("TreeNhalos")
            .and_then(|d| d.read_raw::<u64>())
            .map_err(|e| Error::header_malformed(format!("reading TreeNhalos: {e}")))?;

        if root_ids.len() != offsets.len() || offsets.len() != sizes.len() {
            return Err(Error::header_malformed("TreeInfo dataset lengths disagree"));
        }
        Ok((0..root_ids.len())
            .map(|i| RootDescriptor {
                uid: root_ids[i],
                forest_id: i,
                file_index: 0,
                locator: Locator::Indexed { index: offsets[i] as usize, len: sizes[i] as usize },
                tree_size: sizes[i] as usize,
            })
            .collect())
    }
}

/// Opens a `consistent_trees_hdf5` forest pack, discovering its field list
/// from `/Forests`'s member datasets, and returns a fully-registered Arbor.
pub fn open(path: impl AsRef<Path>) -> Result<Arbor> {
    let path = path.as_ref().to_path_buf();
    if !path.exists() {
        return Err(Error::data_file_missing(path.to_string_lossy()));
    }

    let file = hdf5::File::open(&path)
        .map_err(|e| Error::data_file_missing(format!("{}: {e}", path.display())))?;
    let forests = file
        .group("Forests")
        .map_err(|e| Error::header_malformed(format!("missing /Forests group: {e}")))?;
    let field_names = forests
        .member_names()
        .map_err(|e| Error::header_malformed(format!("listing /Forests members: {e}")))?;
    drop(forests);
    drop(file);

    let mut registry = FieldRegistry::new(Dtype::F64);
    for name in &field_names {
        registry.register_on_disk(name, Unit::dimensionless(), FieldSourceKind::File)?;
    }

    let files: Vec<Box<dyn DataFile>> = vec![Box::new(ConsistentTreesHdf5File::new(path.clone()))];
    let planter = Box::new(TreeInfoPlanter { path });
    Ok(Arbor::new(files, planter, registry, Arc::new(UnitRegistry::new())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_hdf5_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_hdf5.h5");
        std::fs::write(&path, b"not an hdf5 file").unwrap();
        assert!(!Probe.is_valid(&path));
    }

    fn sample_pack(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("forest.h5");
        let file = hdf5::File::create(&path).unwrap();
        file.new_attr::<i64>().create("Nforests").unwrap().write_scalar(&2i64).unwrap();
        file.new_attr::<i64>().create("Ntrees").unwrap().write_scalar(&2i64).unwrap();
        file.new_attr::<i64>().create("Nhalos").unwrap().write_scalar(&3i64).unwrap();

        let forests = file.create_group("Forests").unwrap();
        forests.new_dataset_builder().with_data(&[1.0e12, 5.0e11, 2.0e12]).create("mvir").unwrap();

        let tree_info = file.create_group("TreeInfo").unwrap();
        tree_info.new_dataset_builder().with_data(&[1i64, 2i64]).create("TreeRootID").unwrap();
        tree_info.new_dataset_builder().with_data(&[0u64, 2u64]).create("TreeHalosOffset").unwrap();
        tree_info.new_dataset_builder().with_data(&[2u64, 1u64]).create("TreeNhalos").unwrap();
        path
    }

    #[test]
    fn sniffs_forest_pack_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_pack(&dir);
        assert!(Probe.is_valid(&path));
    }

    #[test]
    fn plants_one_root_per_tree_info_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_pack(&dir);
        let arbor = open(&path).unwrap();
        arbor.plant_trees().unwrap();
        assert_eq!(arbor.size(), 2);
    }
}
