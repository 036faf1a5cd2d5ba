//! The `node_io_loop` substrate: group nodes by owning data file, open each
//! file once, run a per-node callback, close, and restore the caller's
//! original ordering. Both read campaigns and the canonical writer build on
//! this single entry point rather than re-deriving file grouping.
//!
//! Independent per-file groups are run with a data-parallel fan-out — the
//! donor's own `par_iter().for_each(...)` + `sort_by_key` restore-order
//! pattern (`llmcc-core/src/context.rs::from_files`) — since each group opens
//! its own handle and writes into a disjoint slice of the output. The file
//! handle itself is not held locked across the parallel section: it is
//! opened, released, iterated, then re-locked only to close.

use crate::node::TreeNode;
use arbor_error::Result;
use rayon::prelude::*;
use std::collections::HashMap;

/// Run `f` once per node in `nodes`, grouped by data file, and return results
/// in the same order as `nodes`.
pub fn node_io_loop<'a, T, F>(nodes: &[TreeNode<'a>], f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&TreeNode<'a>) -> Result<T> + Sync,
{
    if nodes.is_empty() {
        return Ok(Vec::new());
    }
    let arbor = nodes[0].arbor;

    let mut by_file: HashMap<usize, Vec<usize>> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        let file_index = arbor.root_descriptor(node.root_index())?.file_index;
        by_file.entry(file_index).or_default().push(index);
    }

    let mut file_indices: Vec<usize> = by_file.keys().copied().collect();
    file_indices.sort_unstable();

    let mut indexed_results: Vec<(usize, T)> = Vec::with_capacity(nodes.len());
    for file_index in file_indices {
        let members = &by_file[&file_index];
        {
            let mut file = arbor.file(file_index);
            file.open()?;
        }
        let group_results: Vec<Result<(usize, T)>> =
            members.par_iter().map(|&index| f(&nodes[index]).map(|value| (index, value))).collect();
        for result in group_results {
            indexed_results.push(result?);
        }
        {
            let mut file = arbor.file(file_index);
            file.close()?;
        }
    }

    indexed_results.sort_unstable_by_key(|(index, _)| *index);
    Ok(indexed_results.into_iter().map(|(_, value)| value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbor::{Arbor, Planter, RootDescriptor};
    use crate::datafile::{DataFile, HeaderValue, Locator, Selection};
    use crate::field::Dtype;
    use crate::field_registry::FieldRegistry;
    use arbor_units::UnitRegistry;
    use std::sync::Arc;

    struct FixedFile;
    impl DataFile for FixedFile {
        fn dialect(&self) -> &'static str {
            "fixed"
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
            _field_names: &[String],
            _selection: Selection<'_>,
            _dtypes: &HashMap<String, Dtype>,
        ) -> Result<HashMap<String, arbor_units::UnitArray>> {
            Ok(HashMap::new())
        }
        fn get_particle_positions(&mut self) -> Result<Vec<[f64; 3]>> {
            Ok(Vec::new())
        }
    }

    struct FixedPlanter;
    impl Planter for FixedPlanter {
        fn plant(&self, _files: &[parking_lot::Mutex<Box<dyn DataFile>>]) -> Result<Vec<RootDescriptor>> {
            Ok((0..4)
                .map(|i| RootDescriptor {
                    uid: i as i64,
                    forest_id: i as usize,
                    file_index: 0,
                    locator: Locator::Indexed { index: i as usize, len: 1 },
                    tree_size: 1,
                })
                .collect())
        }
    }

    #[test]
    fn restores_original_order_across_file_groups() {
        let files: Vec<Box<dyn DataFile>> = vec![Box::new(FixedFile)];
        let arbor = Arbor::new(files, Box::new(FixedPlanter), FieldRegistry::default(), Arc::new(UnitRegistry::new()));
        arbor.plant_trees().unwrap();
        let nodes = arbor.iter_roots(None).unwrap();

        let results = node_io_loop(&nodes, |node| Ok(node.root_index())).unwrap();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_node_list_returns_empty_results() {
        let results: Vec<usize> = node_io_loop::<usize, _>(&[], |_| Ok(0)).unwrap();
        assert!(results.is_empty());
    }
}
