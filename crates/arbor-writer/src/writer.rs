//! Saves an in-memory arbor to the canonical sharded format: one JSON
//! header plus N bincode shard files, every field's rows in pre-order.
//!
//! Grounded in `original_source/ytree/data_structures/arbor.py::save_arbor`
//! (header-plus-data-files split, root-only fast table) re-expressed per
//! spec §4.7 as a JSON header and bincode shards instead of HDF5 groups.

use crate::header::{AnalysisHeaderFile, CosmologyRecord, FieldInfoRecord, HeaderFile, ARBOR_TYPE};
use crate::shard::ShardRecord;
use arbor_core::{node_io_loop, Arbor, Scope, TreeNode};
use arbor_error::{Error, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;

/// One root's pre-order field columns, gathered under `node_io_loop` so
/// roots sharing a data file are read with the file opened once.
struct TreeRecord {
    size: usize,
    arrays: HashMap<String, Vec<f64>>,
    root_scalars: HashMap<String, f64>,
}

fn header_scalar(properties: &HashMap<String, arbor_core::HeaderValue>, key: &str) -> f64 {
    properties.get(key).map(|value| value.value).unwrap_or(0.0)
}

/// Saves `arbor` as `<stem>.json` plus `<stem>_shard_<n>.bin` files next to
/// it, and returns the header file's path. `trees` restricts which roots
/// are saved (defaults to every root); `fields` restricts which fields are
/// saved (defaults to every on-disk field).
pub fn save_arbor(
    arbor: &Arbor,
    stem: &str,
    fields: Option<&[String]>,
    trees: Option<Vec<TreeNode<'_>>>,
    max_shard_nodes: usize,
) -> Result<String> {
    // An already-canonical arbor with nothing but new analysis fields to
    // persist writes only the sidecar, leaving the bulk shards untouched.
    if trees.is_none() && fields.is_none() && arbor.file_count() > 0 && arbor.dialect(0) == ARBOR_TYPE {
        let analysis_fields = arbor.field_registry().read().analysis_field_list().to_vec();
        if !analysis_fields.is_empty() {
            return save_analysis_sidecar(arbor, stem, &analysis_fields, max_shard_nodes);
        }
    }

    let roots = match trees {
        Some(nodes) => nodes,
        None => arbor.iter_roots(None)?,
    };

    let field_names: Vec<String> = match fields {
        Some(names) => names.to_vec(),
        None => arbor.field_registry().read().field_list().to_vec(),
    };

    let field_info = {
        let registry = arbor.field_registry().read();
        field_names
            .iter()
            .map(|name| {
                let descriptor = registry.get(name)?;
                Ok(FieldInfoRecord {
                    name: name.clone(),
                    units: descriptor.units.to_string(),
                    dtype: descriptor.dtype,
                })
            })
            .collect::<Result<Vec<_>>>()?
    };

    let records: Vec<TreeRecord> = node_io_loop(&roots, |root| {
        let mut arrays = HashMap::with_capacity(field_names.len());
        let mut root_scalars = HashMap::with_capacity(field_names.len());
        let mut size = 0;
        for field in &field_names {
            let column = root.field_along(Scope::Tree, field)?;
            size = column.values.len();
            root_scalars.insert(field.clone(), root.field_scalar(field)?);
            arrays.insert(field.clone(), column.values);
        }
        // Every saved tree becomes a root: the node passed in (index 0 of
        // its own pre-order) no longer has a descendent in the saved arbor,
        // whatever it was in the source one.
        if let Some(desc_uid) = arrays.get_mut("desc_uid") {
            desc_uid[0] = -1.0;
        }
        root_scalars.insert("desc_uid".to_string(), -1.0);
        Ok(TreeRecord { size, arrays, root_scalars })
    })?;

    let total_trees = records.len();
    let total_nodes: usize = records.iter().map(|record| record.size).sum();

    let mut tree_start_index = Vec::with_capacity(total_trees);
    let mut tree_end_index = Vec::with_capacity(total_trees);
    let mut tree_size = Vec::with_capacity(total_trees);
    let mut root_field_data: HashMap<String, Vec<f64>> =
        field_names.iter().map(|name| (name.clone(), Vec::with_capacity(total_trees))).collect();

    let mut cursor = 0u64;
    for record in &records {
        tree_start_index.push(cursor);
        cursor += record.size as u64;
        tree_end_index.push(cursor);
        tree_size.push(record.size as u64);
        for field in &field_names {
            root_field_data.get_mut(field).unwrap().push(record.root_scalars[field]);
        }
    }

    let stem_path = std::path::Path::new(stem);
    let file_stem = stem_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| stem.to_string());
    let parent = stem_path.parent().unwrap_or_else(|| std::path::Path::new(""));

    let mut shard_files = Vec::new();
    let mut shard_tree_counts = Vec::new();
    let mut shard_index = 0usize;
    let mut cursor = 0usize;
    while cursor < records.len() {
        let mut shard_rows = 0usize;
        let mut end = cursor;
        while end < records.len() && (shard_rows == 0 || shard_rows < max_shard_nodes) {
            shard_rows += records[end].size;
            end += 1;
        }

        let batch = &records[cursor..end];
        let mut shard_start = Vec::with_capacity(batch.len());
        let mut shard_end = Vec::with_capacity(batch.len());
        let mut shard_size = Vec::with_capacity(batch.len());
        let mut shard_fields: HashMap<String, Vec<f64>> =
            field_names.iter().map(|name| (name.clone(), Vec::new())).collect();

        let mut local_cursor = 0u64;
        for record in batch {
            shard_start.push(local_cursor);
            local_cursor += record.size as u64;
            shard_end.push(local_cursor);
            shard_size.push(record.size as u64);
            for field in &field_names {
                shard_fields.get_mut(field).unwrap().extend_from_slice(&record.arrays[field]);
            }
        }

        let shard = ShardRecord {
            tree_start_index: shard_start,
            tree_end_index: shard_end,
            tree_size: shard_size,
            fields: shard_fields,
        };

        let shard_name = format!("{}_shard_{}.bin", file_stem, shard_index);
        let shard_path = parent.join(&shard_name);
        let file = File::create(&shard_path).map_err(Error::from)?;
        let mut writer = BufWriter::new(file);
        shard.write_to(&mut writer)?;
        tracing::debug!(shard = %shard_name, trees = batch.len(), rows = shard_rows, "wrote shard");

        shard_files.push(shard_name);
        shard_tree_counts.push(batch.len());
        shard_index += 1;
        cursor = end;
    }

    let header_properties = arbor.header_properties(0);
    let header = HeaderFile {
        arbor_type: ARBOR_TYPE.to_string(),
        cosmology: CosmologyRecord {
            hubble_constant: header_scalar(&header_properties, "hubble_constant"),
            omega_matter: header_scalar(&header_properties, "omega_matter"),
            omega_lambda: header_scalar(&header_properties, "omega_lambda"),
        },
        box_size: header_scalar(&header_properties, "box_size"),
        box_size_unit: header_properties
            .get("box_size")
            .map(|value| value.unit.to_string())
            .unwrap_or_default(),
        total_files: arbor.file_count(),
        total_trees,
        total_nodes,
        unit_registry: arbor.unit_registry().to_json(),
        fields: field_info,
        tree_start_index,
        tree_end_index,
        tree_size,
        root_field_data,
        shard_files,
        shard_tree_counts,
    };

    let header_path = parent.join(format!("{}.json", file_stem));
    let header_file = File::create(&header_path).map_err(Error::from)?;
    serde_json::to_writer_pretty(header_file, &header)
        .map_err(|e| Error::serialization_failed("encoding header file").set_source(e))?;

    tracing::info!(
        header = %header_path.display(),
        trees = total_trees,
        nodes = total_nodes,
        shards = header.shard_files.len(),
        "saved arbor"
    );

    Ok(header_path.to_string_lossy().into_owned())
}

/// Writes only `<stem>-analysis.json` plus `<stem>_shard_<n>-analysis.bin`
/// files, covering just `analysis_fields`, and leaves the arbor's existing
/// bulk header/shards untouched.
fn save_analysis_sidecar(
    arbor: &Arbor,
    stem: &str,
    analysis_fields: &[String],
    max_shard_nodes: usize,
) -> Result<String> {
    let roots = arbor.iter_roots(None)?;

    let field_info = {
        let registry = arbor.field_registry().read();
        analysis_fields
            .iter()
            .map(|name| {
                let descriptor = registry.get(name)?;
                Ok(FieldInfoRecord { name: name.clone(), units: descriptor.units.to_string(), dtype: descriptor.dtype })
            })
            .collect::<Result<Vec<_>>>()?
    };

    let records: Vec<TreeRecord> = node_io_loop(&roots, |root| {
        let mut arrays = HashMap::with_capacity(analysis_fields.len());
        let mut root_scalars = HashMap::with_capacity(analysis_fields.len());
        let mut size = 0;
        for field in analysis_fields {
            let column = root.field_along(Scope::Tree, field)?;
            size = column.values.len();
            root_scalars.insert(field.clone(), root.field_scalar(field)?);
            arrays.insert(field.clone(), column.values);
        }
        Ok(TreeRecord { size, arrays, root_scalars })
    })?;

    let total_trees = records.len();
    let total_nodes: usize = records.iter().map(|record| record.size).sum();

    let mut tree_start_index = Vec::with_capacity(total_trees);
    let mut tree_end_index = Vec::with_capacity(total_trees);
    let mut tree_size = Vec::with_capacity(total_trees);
    let mut root_field_data: HashMap<String, Vec<f64>> =
        analysis_fields.iter().map(|name| (name.clone(), Vec::with_capacity(total_trees))).collect();

    let mut cursor = 0u64;
    for record in &records {
        tree_start_index.push(cursor);
        cursor += record.size as u64;
        tree_end_index.push(cursor);
        tree_size.push(record.size as u64);
        for field in analysis_fields {
            root_field_data.get_mut(field).unwrap().push(record.root_scalars[field]);
        }
    }

    let stem_path = std::path::Path::new(stem);
    let file_stem =
        stem_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| stem.to_string());
    let parent = stem_path.parent().unwrap_or_else(|| std::path::Path::new(""));

    let mut shard_files = Vec::new();
    let mut shard_tree_counts = Vec::new();
    let mut shard_index = 0usize;
    let mut cursor = 0usize;
    while cursor < records.len() {
        let mut shard_rows = 0usize;
        let mut end = cursor;
        while end < records.len() && (shard_rows == 0 || shard_rows < max_shard_nodes) {
            shard_rows += records[end].size;
            end += 1;
        }

        let batch = &records[cursor..end];
        let mut shard_start = Vec::with_capacity(batch.len());
        let mut shard_end = Vec::with_capacity(batch.len());
        let mut shard_size = Vec::with_capacity(batch.len());
        let mut shard_fields: HashMap<String, Vec<f64>> =
            analysis_fields.iter().map(|name| (name.clone(), Vec::new())).collect();

        let mut local_cursor = 0u64;
        for record in batch {
            shard_start.push(local_cursor);
            local_cursor += record.size as u64;
            shard_end.push(local_cursor);
            shard_size.push(record.size as u64);
            for field in analysis_fields {
                shard_fields.get_mut(field).unwrap().extend_from_slice(&record.arrays[field]);
            }
        }

        let shard = ShardRecord {
            tree_start_index: shard_start,
            tree_end_index: shard_end,
            tree_size: shard_size,
            fields: shard_fields,
        };

        let shard_name = format!("{}_shard_{}-analysis.bin", file_stem, shard_index);
        let shard_path = parent.join(&shard_name);
        let file = File::create(&shard_path).map_err(Error::from)?;
        let mut writer = BufWriter::new(file);
        shard.write_to(&mut writer)?;

        shard_files.push(shard_name);
        shard_tree_counts.push(batch.len());
        shard_index += 1;
        cursor = end;
    }

    let header = AnalysisHeaderFile {
        total_trees,
        total_nodes,
        fields: field_info,
        tree_start_index,
        tree_end_index,
        tree_size,
        root_field_data,
        shard_files,
        shard_tree_counts,
    };

    let header_path = parent.join(format!("{}-analysis.json", file_stem));
    let header_file = File::create(&header_path).map_err(Error::from)?;
    serde_json::to_writer_pretty(header_file, &header)
        .map_err(|e| Error::serialization_failed("encoding analysis header file").set_source(e))?;

    tracing::info!(
        header = %header_path.display(),
        trees = total_trees,
        nodes = total_nodes,
        fields = analysis_fields.len(),
        "saved analysis sidecar"
    );

    Ok(header_path.to_string_lossy().into_owned())
}

/// Saves a single node's subtree as a new, one-tree canonical arbor.
/// Grounded in `TreeNode.save_tree`'s delegation to `Arbor.save_arbor(trees=[self])`.
pub fn save_tree(node: TreeNode<'_>, stem: &str, fields: Option<&[String]>) -> Result<String> {
    save_arbor(node.arbor(), stem, fields, Some(vec![node]), usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{Dtype, FieldRegistry, FieldSourceKind, HeaderValue, Locator, Planter, RootDescriptor, Selection};
    use arbor_units::{Unit, UnitArray, UnitRegistry};
    use std::sync::Arc;

    #[test]
    fn header_scalar_defaults_to_zero_when_missing() {
        let properties: HashMap<String, arbor_core::HeaderValue> = HashMap::new();
        assert_eq!(header_scalar(&properties, "hubble_constant"), 0.0);
    }

    /// A single three-halo chain (root <- mid <- leaf) with one `mass` field.
    struct ChainFile {
        dialect: &'static str,
    }

    impl arbor_core::DataFile for ChainFile {
        fn dialect(&self) -> &'static str {
            self.dialect
        }
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn header_properties(&self) -> HashMap<String, HeaderValue> {
            HashMap::new()
        }
        fn read_fields(
            &mut self,
            field_names: &[String],
            _selection: Selection<'_>,
            _dtypes: &HashMap<String, Dtype>,
        ) -> Result<HashMap<String, UnitArray>> {
            let mut out = HashMap::new();
            for name in field_names {
                let array = match name.as_str() {
                    "uid" => UnitArray::new(vec![2.0, 1.0, 0.0], Unit::dimensionless()),
                    "desc_uid" => UnitArray::new(vec![-1.0, 2.0, 1.0], Unit::dimensionless()),
                    "mass" => UnitArray::new(vec![30.0, 20.0, 10.0], Unit::parse("Msun").unwrap()),
                    "score" => UnitArray::new(vec![-1.0, -1.0, -1.0], Unit::dimensionless()),
                    other => return Err(Error::field_not_found(other)),
                };
                out.insert(name.clone(), array);
            }
            Ok(out)
        }
        fn get_particle_positions(&mut self) -> Result<Vec<[f64; 3]>> {
            Ok(Vec::new())
        }
    }

    struct ChainPlanter;
    impl Planter for ChainPlanter {
        fn plant(&self, _files: &[parking_lot::Mutex<Box<dyn arbor_core::DataFile>>]) -> Result<Vec<RootDescriptor>> {
            Ok(vec![RootDescriptor {
                uid: 2,
                forest_id: 0,
                file_index: 0,
                locator: Locator::ByteOffset(0),
                tree_size: 3,
            }])
        }
    }

    struct EmptyPlanter;
    impl Planter for EmptyPlanter {
        fn plant(&self, _files: &[parking_lot::Mutex<Box<dyn arbor_core::DataFile>>]) -> Result<Vec<RootDescriptor>> {
            Ok(Vec::new())
        }
    }

    fn build_chain_arbor(dialect: &'static str) -> Arbor {
        let file: Box<dyn arbor_core::DataFile> = Box::new(ChainFile { dialect });
        let mut registry = FieldRegistry::default();
        registry.register_on_disk("uid", Unit::dimensionless(), FieldSourceKind::File).unwrap();
        registry.register_on_disk("desc_uid", Unit::dimensionless(), FieldSourceKind::File).unwrap();
        registry.register_on_disk("mass", Unit::parse("Msun").unwrap(), FieldSourceKind::File).unwrap();
        let arbor = Arbor::new(vec![file], Box::new(ChainPlanter), registry, Arc::new(UnitRegistry::new()));
        arbor.plant_trees().unwrap();
        arbor
    }

    #[test]
    fn save_arbor_forces_root_desc_uid_to_minus_one() {
        let arbor = build_chain_arbor("fixed");
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("tree").to_string_lossy().into_owned();
        let header_path = save_arbor(&arbor, &stem, None, None, usize::MAX).unwrap();

        let header: HeaderFile = serde_json::from_reader(File::open(&header_path).unwrap()).unwrap();
        assert_eq!(header.total_trees, 1);
        assert_eq!(header.root_field_data["desc_uid"], vec![-1.0]);
    }

    #[test]
    fn save_tree_on_non_root_produces_a_new_root_with_desc_uid_minus_one() {
        let arbor = build_chain_arbor("fixed");
        let root = arbor.iter_roots(None).unwrap()[0];
        let mid = root.ancestors().unwrap()[0];
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("mid").to_string_lossy().into_owned();

        let header_path = save_tree(mid, &stem, None).unwrap();
        let header: HeaderFile = serde_json::from_reader(File::open(&header_path).unwrap()).unwrap();
        assert_eq!(header.total_trees, 1);
        // mid's own subtree is itself a two-halo chain (mid <- leaf).
        assert_eq!(header.total_nodes, 2);
        assert_eq!(header.root_field_data["desc_uid"], vec![-1.0]);
    }

    #[test]
    fn empty_arbor_saves_a_header_only_file() {
        let file: Box<dyn arbor_core::DataFile> = Box::new(ChainFile { dialect: "fixed" });
        let registry = FieldRegistry::default();
        let arbor = Arbor::new(vec![file], Box::new(EmptyPlanter), registry, Arc::new(UnitRegistry::new()));
        arbor.plant_trees().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("empty").to_string_lossy().into_owned();
        let header_path = save_arbor(&arbor, &stem, None, None, usize::MAX).unwrap();

        let header: HeaderFile = serde_json::from_reader(File::open(&header_path).unwrap()).unwrap();
        assert_eq!(header.total_trees, 0);
        assert_eq!(header.total_nodes, 0);
        assert!(header.shard_files.is_empty());
    }

    #[test]
    fn resaving_a_canonical_arbor_with_an_analysis_field_writes_only_the_sidecar() {
        let arbor = build_chain_arbor(ARBOR_TYPE);
        arbor.add_analysis_field("score", Unit::dimensionless(), -1.0, false).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("arbor").to_string_lossy().into_owned();
        let result_path = save_arbor(&arbor, &stem, None, None, usize::MAX).unwrap();

        assert!(result_path.ends_with("-analysis.json"));
        assert!(!dir.path().join("arbor.json").exists());
        assert!(dir.path().join("arbor-analysis.json").exists());

        let header: AnalysisHeaderFile = serde_json::from_reader(File::open(&result_path).unwrap()).unwrap();
        assert_eq!(header.fields.len(), 1);
        assert_eq!(header.fields[0].name, "score");
    }
}
