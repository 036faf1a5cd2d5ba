//! Inline simulation-output pack dialect (`gadget4`): the merger tree is
//! written inline with the simulation's own HDF5 snapshot output. A
//! `/TreeTable` group gives each tree's `(StartOffset, Length)` slice into
//! `/TreeHalos/<field>` struct-of-arrays datasets, already physically
//! contiguous per tree exactly like the `consistent_trees_hdf5` pack.
//!
//! Unlike that pack, `uid`/`desc_uid` are not literal datasets: `uid` is the
//! tree's own `StartOffset` plus the halo's position within the tree, and
//! `desc_uid` is `StartOffset + TreeDescendant` (where `TreeDescendant` is a
//! tree-local index, `-1` meaning "no descendant"). Grounded in
//! `original_source/ytree/frontends/gadget4/{io.py,arbor.py}`'s
//! `_get_arbor_fields`/`_plant_trees`, in particular `uid = offset` and
//! `desc_uids[desc_uids != -1] += root_node.uid`.
//!
//! Only the single-file case (`NumFiles == 1`) is supported; the original's
//! multi-file `_fi`/`_fei` bookkeeping is not reproduced.

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

pub const DIALECT: &str = "gadget4";

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
    let header = match file.group("Header") {
        Ok(header) => header,
        Err(_) => return Ok(false),
    };
    let attrs_ok = ["Ntrees_ThisFile", "Ntrees_Total", "NumFiles"].iter().all(|a| header.attr(a).is_ok());
    let groups_ok = ["TreeHalos", "TreeTable", "TreeTimes"].iter().all(|g| file.group(g).is_ok());
    Ok(attrs_ok && groups_ok)
}

struct Gadget4File {
    path: PathBuf,
    handle: Option<hdf5::File>,
}

impl Gadget4File {
    fn new(path: PathBuf) -> Self {
        Gadget4File { path, handle: None }
    }

    fn tree_halos(&self) -> Result<hdf5::Group> {
        let handle = self.handle.as_ref().ok_or_else(|| Error::unexpected("hdf5 file not open"))?;
        handle.group("TreeHalos").map_err(|e| Error::unexpected(format!("missing /TreeHalos group: {e}")))
    }
}

impl DataFile for Gadget4File {
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
            if let Ok(header) = handle.group("Header") {
                if let Ok(redshift) = header.attr("Redshift").and_then(|a| a.read_scalar::<f64>()) {
                    properties.insert("redshift".to_string(), HeaderValue { value: redshift, unit: "dimensionless" });
                }
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
        let group = self.tree_halos()?;
        let (index, len) = match selection {
            Selection::AllInFile => {
                return Err(Error::unexpected("gadget4 requires a tree-scoped selection"))
            }
            Selection::Run { start, count } => match start {
                Locator::Indexed { index, .. } => (index, count),
                Locator::ByteOffset(_) => return Err(Error::unexpected("gadget4 locator must be indexed")),
            },
            Selection::Handles(handles) if handles.len() == 1 => match handles[0] {
                Locator::Indexed { index, len } => (index, len),
                Locator::ByteOffset(_) => return Err(Error::unexpected("gadget4 locator must be indexed")),
            },
            Selection::Handles(_) => return Err(Error::not_implemented("gadget4 scattered handle reads")),
        };

        let mut out = HashMap::with_capacity(field_names.len());
        for name in field_names {
            let values = match name.as_str() {
                "uid" => (0..len).map(|i| (index + i) as f64).collect(),
                "desc_uid" => {
                    let dataset = group
                        .dataset("TreeDescendant")
                        .map_err(|_| Error::field_not_found("TreeDescendant"))?;
                    let full: Vec<i64> = dataset
                        .read_raw::<i64>()
                        .map_err(|e| Error::unexpected(format!("reading TreeDescendant: {e}")))?;
                    full[index..index + len]
                        .iter()
                        .map(|&local| if local == -1 { -1.0 } else { (index as i64 + local) as f64 })
                        .collect()
                }
                _ => {
                    let dataset = group.dataset(name).map_err(|_| Error::field_not_found(name))?;
                    let full: Vec<f64> = dataset
                        .read_raw::<f64>()
                        .map_err(|e| Error::unexpected(format!("reading TreeHalos/{name}: {e}")))?;
                    full[index..index + len].to_vec()
                }
            };
            out.insert(name.clone(), UnitArray::new(values, Unit::dimensionless()));
        }
        Ok(out)
    }

    fn get_particle_positions(&mut self) -> Result<Vec<[f64; 3]>> {
        Err(Error::not_implemented("gadget4 particle positions"))
    }
}

struct TreeTablePlanter {
    path: PathBuf,
}

impl Planter for TreeTablePlanter {
    fn plant(&self, _files: &[Mutex<Box<dyn DataFile>>]) -> Result<Vec<RootDescriptor>> {
        let file = hdf5::File::open(&self.path)
            .map_err(|e| Error::data_file_missing(format!("{}: {e}", self.path.display())))?;
        let tree_table = file
            .group("TreeTable")
            .map_err(|e| Error::header_malformed(format!("missing /TreeTable group: {e}")))?;
        let offsets: Vec<u64> = tree_table
            .dataset("StartOffset")
            .and_then(|d| d.read_raw::<u64>())
            .map_err(|e| Error::header_malformed(format!("reading StartOffset: {e}")))?;
        let lengths: Vec<u64> = tree_table
            .dataset("Length")
            .and_then(|d| d.read_raw::<u64>())
            .map_err(|e| Error::header_malformed(format!("reading Length: {e}")))?;

        if offsets.len() != lengths.len() {
            return Err(Error::header_malformed("TreeTable dataset lengths disagree"));
        }
        Ok((0..offsets.len())
            .map(|i| RootDescriptor {
                uid: offsets[i] as i64,
                forest_id: i,
                file_index: 0,
                locator: Locator::Indexed { index: offsets[i] as usize, len: lengths[i] as usize },
                tree_size: lengths[i] as usize,
            })
            .collect())
    }
}

/// Opens a single-file `gadget4` inline tree pack and returns a
/// fully-registered Arbor.
pub fn open(path: impl AsRef<Path>) -> Result<Arbor> {
    let path = path.as_ref().to_path_buf();
    if !path.exists() {
        return Err(Error::data_file_missing(path.to_string_lossy()));
    }

    let file = hdf5::File::open(&path)
        .map_err(|e| Error::data_file_missing(format!("{}: {e}", path.display())))?;
    let tree_halos = file
        .group("TreeHalos")
        .map_err(|e| Error::header_malformed(format!("missing /TreeHalos group: {e}")))?;
    let field_names: Vec<String> = tree_halos
        .member_names()
        .map_err(|e| Error::header_malformed(format!("listing /TreeHalos members: {e}")))?
        .into_iter()
        .filter(|name| name != "TreeDescendant")
        .collect();
    drop(tree_halos);
    drop(file);

    let mut registry = FieldRegistry::new(Dtype::F64);
    registry.register_on_disk("uid", Unit::dimensionless(), FieldSourceKind::ArborGenerated)?;
    registry.register_on_disk("desc_uid", Unit::dimensionless(), FieldSourceKind::ArborGenerated)?;
    for name in &field_names {
        registry.register_on_disk(name, Unit::dimensionless(), FieldSourceKind::File)?;
    }

    let files: Vec<Box<dyn DataFile>> = vec![Box::new(Gadget4File::new(path.clone()))];
    let planter = Box::new(TreeTablePlanter { path });
    Ok(Arbor::new(files, planter, registry, Arc::new(UnitRegistry::new())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pack(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("snapshot.hdf5");
        let file = hdf5::File::create(&path).unwrap();
        let header = file.create_group("Header").unwrap();
        header.new_attr::<i64>().create("Ntrees_ThisFile").unwrap().write_scalar(&1i64).unwrap();
        header.new_attr::<i64>().create("Ntrees_Total").unwrap().write_scalar(&1i64).unwrap();
        header.new_attr::<i64>().create("NumFiles").unwrap().write_scalar(&1i64).unwrap();
        file.create_group("TreeTimes").unwrap();

        let tree_halos = file.create_group("TreeHalos").unwrap();
        tree_halos.new_dataset_builder().with_data(&[1.0e12, 5.0e11]).create("Mvir").unwrap();
        tree_halos.new_dataset_builder().with_data(&[-1i64, 0i64]).create("TreeDescendant").unwrap();

        let tree_table = file.create_group("TreeTable").unwrap();
        tree_table.new_dataset_builder().with_data(&[0u64]).create("StartOffset").unwrap();
        tree_table.new_dataset_builder().with_data(&[2u64]).create("Length").unwrap();
        path
    }

    #[test]
    fn sniffs_gadget4_groups_and_attrs() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_pack(&dir);
        assert!(Probe.is_valid(&path));
    }

    #[test]
    fn plants_one_root_per_tree_table_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_pack(&dir);
        let arbor = open(&path).unwrap();
        arbor.plant_trees().unwrap();
        assert_eq!(arbor.size(), 1);
    }
}
