//! JSON header-file schema for the canonical sharded format.
//!
//! Grounded in spec §4.7 ("Header file attributes... Header datasets (in
//! group `index`)... Header datasets (in group `data`)") — re-expressed as a
//! flat JSON document instead of HDF5 groups/attributes, matching how the
//! donor's own descriptor/header records serialize (`serde_json`, same as
//! `arbor_units::UnitRegistryJson`).

use arbor_core::Dtype;
use arbor_units::UnitRegistryJson;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfoRecord {
    pub name: String,
    pub units: String,
    pub dtype: Dtype,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CosmologyRecord {
    pub hubble_constant: f64,
    pub omega_matter: f64,
    pub omega_lambda: f64,
}

/// The `<stem>.json` header file: everything needed to enumerate roots and
/// answer root-only queries without opening a single shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderFile {
    pub arbor_type: String,
    pub cosmology: CosmologyRecord,
    pub box_size: f64,
    pub box_size_unit: String,
    pub total_files: usize,
    pub total_trees: usize,
    pub total_nodes: usize,
    pub unit_registry: UnitRegistryJson,
    pub fields: Vec<FieldInfoRecord>,
    /// Tree-start index into the arbor's global pre-order node numbering.
    pub tree_start_index: Vec<u64>,
    pub tree_end_index: Vec<u64>,
    pub tree_size: Vec<u64>,
    /// One entry per tree, for every saved field — enables O(1) root-only
    /// queries without touching a shard.
    pub root_field_data: HashMap<String, Vec<f64>>,
    /// Shard filenames, in order; `shard_of[tree_index]` (computed, not
    /// stored) gives which one holds a given tree.
    pub shard_files: Vec<String>,
    /// Number of trees held by each shard file, same length and order as
    /// `shard_files`; used to digitize a tree index to a shard.
    pub shard_tree_counts: Vec<usize>,
}

pub const ARBOR_TYPE: &str = "arbor-canonical";

/// The `<stem>-analysis.json` sidecar header: just enough to reload the
/// analysis fields index-aligned with the bulk shards they were derived
/// from. No cosmology/box-size/unit-registry — those live only in the main
/// header, which an analysis-only update never rewrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisHeaderFile {
    pub total_trees: usize,
    pub total_nodes: usize,
    pub fields: Vec<FieldInfoRecord>,
    pub tree_start_index: Vec<u64>,
    pub tree_end_index: Vec<u64>,
    pub tree_size: Vec<u64>,
    pub root_field_data: HashMap<String, Vec<f64>>,
    pub shard_files: Vec<String>,
    pub shard_tree_counts: Vec<usize>,
}

impl HeaderFile {
    /// Which shard index holds `tree_index`, and that tree's 0-based
    /// position within the shard.
    pub fn locate(&self, tree_index: usize) -> Option<(usize, usize)> {
        let mut consumed = 0;
        for (shard_index, count) in self.shard_tree_counts.iter().enumerate() {
            if tree_index < consumed + count {
                return Some((shard_index, tree_index - consumed));
            }
            consumed += count;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HeaderFile {
        HeaderFile {
            arbor_type: ARBOR_TYPE.to_string(),
            cosmology: CosmologyRecord::default(),
            box_size: 100.0,
            box_size_unit: "Mpc/h".to_string(),
            total_files: 2,
            total_trees: 5,
            total_nodes: 20,
            unit_registry: UnitRegistryJson::default(),
            fields: vec![FieldInfoRecord { name: "mass".to_string(), units: "Msun".to_string(), dtype: Dtype::F64 }],
            tree_start_index: vec![0, 4, 8, 12, 16],
            tree_end_index: vec![4, 8, 12, 16, 20],
            tree_size: vec![4, 4, 4, 4, 4],
            root_field_data: HashMap::new(),
            shard_files: vec!["shard_0.bin".to_string(), "shard_1.bin".to_string()],
            shard_tree_counts: vec![3, 2],
        }
    }

    #[test]
    fn locates_tree_within_its_shard() {
        let header = sample();
        assert_eq!(header.locate(0), Some((0, 0)));
        assert_eq!(header.locate(2), Some((0, 2)));
        assert_eq!(header.locate(3), Some((1, 0)));
        assert_eq!(header.locate(4), Some((1, 1)));
        assert_eq!(header.locate(5), None);
    }
}
