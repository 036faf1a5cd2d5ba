//! Read-only, field-caching view over an arbitrary list of tree nodes.
//!
//! Grounded in the donor's `NodeContainer`/`TreeContainer` pair
//! (`node_container.py`/`tree_container.py`): both wrap an unrelated list of
//! nodes and cache field-column results the first time a field is
//! requested. Since this port represents both "a tree" and "a node" with the
//! same `TreeNode` handle, one container type serves both call sites
//! (`Arbor::container`, `select`'s result list, `save_tree`'s seed list).

use crate::node::{Scope, TreeNode};
use arbor_error::{Error, Result};
use arbor_units::UnitArray;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A persistent collection of unrelated `TreeNode`s with cached field access.
pub struct NodeContainer<'a> {
    nodes: Vec<TreeNode<'a>>,
    field_cache: RwLock<HashMap<String, UnitArray>>,
}

impl<'a> NodeContainer<'a> {
    pub fn new(nodes: Vec<TreeNode<'a>>) -> Self {
        NodeContainer { nodes, field_cache: RwLock::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[TreeNode<'a>] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<TreeNode<'a>> {
        self.nodes.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeNode<'a>> {
        self.nodes.iter()
    }

    /// `container[field]`: gather `field` across every node, caching the
    /// result. `"forest"|"tree"|"prog"` are scope keywords, not fields, and
    /// are rejected the same way the donor rejects them as a `__getitem__`
    /// string key.
    pub fn field(&self, field: &str) -> Result<UnitArray> {
        if Scope::parse(field).is_ok() {
            return Err(Error::syntax_error(format!("'{field}' is a scope, not a field")));
        }
        if let Some(array) = self.field_cache.read().get(field) {
            return Ok(array.clone());
        }
        let mut values = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            values.push(node.field_scalar(field)?);
        }
        let unit = match self.nodes.first() {
            Some(node) => node.arbor.field_registry().read().get(field)?.units.clone(),
            None => arbor_units::Unit::dimensionless(),
        };
        let array = UnitArray::new(values, unit);
        self.field_cache.write().insert(field.to_string(), array.clone());
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_scope_keywords_as_field_names() {
        let container = NodeContainer::new(Vec::new());
        assert!(container.field("tree").is_err());
        assert!(container.field("forest").is_err());
        assert!(container.field("prog").is_err());
    }

    #[test]
    fn empty_container_reports_zero_length() {
        let container = NodeContainer::new(Vec::new());
        assert_eq!(container.len(), 0);
        assert!(container.is_empty());
    }
}
