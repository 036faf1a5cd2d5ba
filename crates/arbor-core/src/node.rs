//! `TreeNode`: a lightweight handle into a root's materialized arrays.
//!
//! Mirrors the donor's own lifetime-bound handle pattern
//! (`CompileUnit<'tcx>{cc: &'tcx CompileCtxt<'tcx>, index: usize}`): a
//! `TreeNode` never owns storage, it only names a root and a position within
//! that root's arrays. Only the root's `RootState` (owned by the `Arbor`)
//! holds the materialized `uid`/`desc_uid`/link/field-cache arrays; `tree_id
//! == 0` by convention identifies the root itself, replacing the donor
//! Python's `root is self` / `root is <pointer>` / `root == -1` sentinel
//! trick with a plain index comparison.

use crate::arbor::Arbor;
use crate::link::TreeId;
use crate::selector::SelectorCandidate;
use arbor_error::{Error, Result};
use arbor_units::UnitArray;

/// Which traversal a field lookup or selection runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Tree,
    Prog,
    Forest,
}

impl Scope {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "tree" => Ok(Scope::Tree),
            "prog" => Ok(Scope::Prog),
            "forest" => Ok(Scope::Forest),
            other => Err(Error::syntax_error(format!("unknown scope '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Tree => "tree",
            Scope::Prog => "prog",
            Scope::Forest => "forest",
        }
    }
}

/// A handle to one halo. `Copy`/`Clone` — cheap to pass around, same as the
/// donor's index-plus-context handles.
#[derive(Clone, Copy)]
pub struct TreeNode<'a> {
    pub(crate) arbor: &'a Arbor,
    pub(crate) root_index: usize,
    pub(crate) tree_id: TreeId,
}

impl<'a> TreeNode<'a> {
    pub(crate) fn new(arbor: &'a Arbor, root_index: usize, tree_id: TreeId) -> Self {
        TreeNode { arbor, root_index, tree_id }
    }

    pub fn is_root(&self) -> bool {
        self.tree_id == 0
    }

    pub fn root_index(&self) -> usize {
        self.root_index
    }

    /// The arbor this node belongs to, for callers (e.g. the canonical
    /// writer) that need to re-enter the library surface from a node.
    pub fn arbor(&self) -> &'a Arbor {
        self.arbor
    }

    pub fn tree_id(&self) -> TreeId {
        self.tree_id
    }

    /// uid of this halo. Cheap for roots (stored in the root-descriptor
    /// table); triggers setup for non-roots.
    pub fn uid(&self) -> Result<i64> {
        if self.is_root() {
            return Ok(self.arbor.root_descriptor(self.root_index)?.uid);
        }
        self.arbor.setup_tree(self.root_index)?;
        let state = self.arbor.root_state(self.root_index);
        Ok(state.read().uid[self.tree_id])
    }

    pub fn desc_uid(&self) -> Result<i64> {
        if self.is_root() {
            return Ok(-1);
        }
        self.arbor.setup_tree(self.root_index)?;
        let state = self.arbor.root_state(self.root_index);
        Ok(state.read().desc_uid[self.tree_id])
    }

    /// `tree[field]`: for a root this is the arbor-wide fast path straight
    /// into the root-field table; for a non-root it triggers setup/grow on
    /// the root and indexes into the cached field array by `tree_id`.
    pub fn field_scalar(&self, field: &str) -> Result<f64> {
        if self.is_root() {
            return self.arbor.root_field_scalar(self.root_index, field);
        }
        self.arbor.grow_tree(self.root_index)?;
        self.arbor.tree_field_scalar(self.root_index, self.tree_id, field)
    }

    /// `tree["tree"|"prog"|"forest", field]`: triggers setup/grow, returns
    /// the field values along the named traversal.
    pub fn field_along(&self, scope: Scope, field: &str) -> Result<UnitArray> {
        self.arbor.grow_tree(self.root_index)?;
        if scope == Scope::Forest {
            return self.arbor.field_for_forest(self.root_index, field);
        }
        let order = self.traversal_order(scope)?;
        self.arbor.field_for_order(self.root_index, &order, field)
    }

    /// Set an analysis/analysis_saved field's value for this node.
    pub fn set_field(&self, field: &str, value: f64) -> Result<()> {
        self.arbor.set_node_field(self.root_index, self.tree_id, self.is_root(), field, value)
    }

    pub fn find_root(&self) -> TreeNode<'a> {
        TreeNode::new(self.arbor, self.root_index, 0)
    }

    /// Direct ancestors (one snapshot earlier) of this node.
    pub fn ancestors(&self) -> Result<Vec<TreeNode<'a>>> {
        self.arbor.grow_tree(self.root_index)?;
        let state = self.arbor.root_state(self.root_index);
        let guard = state.read();
        let ancestor_ids = guard.links[self.tree_id].ancestors.clone();
        drop(guard);
        Ok(ancestor_ids
            .into_iter()
            .map(|id| TreeNode::new(self.arbor, self.root_index, id))
            .collect())
    }

    pub fn descendent(&self) -> Result<Option<TreeNode<'a>>> {
        self.arbor.grow_tree(self.root_index)?;
        let state = self.arbor.root_state(self.root_index);
        let guard = state.read();
        Ok(guard.links[self.tree_id]
            .descendent
            .map(|id| TreeNode::new(self.arbor, self.root_index, id)))
    }

    /// The traversal index array for a scope, in `TreeId` space local to
    /// this node's root.
    pub fn traversal_order(&self, scope: Scope) -> Result<Vec<TreeId>> {
        self.arbor.grow_tree(self.root_index)?;
        match scope {
            Scope::Tree => Ok(self.arbor.tree_order_from(self.root_index, self.tree_id)),
            Scope::Prog => self.arbor.prog_order_from(self.root_index, self.tree_id),
            Scope::Forest => Ok(self.arbor.forest_order(self.root_index)?.into_iter().map(|(_, id)| id).collect()),
        }
    }

    /// `get_node(scope, i)`.
    pub fn get_node(&self, scope: Scope, index: usize) -> Result<TreeNode<'a>> {
        self.arbor.grow_tree(self.root_index)?;
        match scope {
            Scope::Forest => {
                let nodes = self.arbor.forest_order(self.root_index)?;
                let (root_index, tree_id) = *nodes
                    .get(index)
                    .ok_or_else(|| Error::invalid_argument(format!("forest index {index} out of range")))?;
                Ok(TreeNode::new(self.arbor, root_index, tree_id))
            }
            _ => {
                let order = self.traversal_order(scope)?;
                let tree_id = *order
                    .get(index)
                    .ok_or_else(|| Error::invalid_argument(format!("{} index {index} out of range", scope.as_str())))?;
                Ok(TreeNode::new(self.arbor, self.root_index, tree_id))
            }
        }
    }

    /// Nodes with no ancestors, within `scope` (default: tree).
    pub fn get_leaf_nodes(&self, scope: Option<Scope>) -> Result<Vec<TreeNode<'a>>> {
        self.arbor.grow_tree(self.root_index)?;
        let order = self.traversal_order(scope.unwrap_or(Scope::Tree))?;
        let state = self.arbor.root_state(self.root_index);
        let guard = state.read();
        Ok(order
            .into_iter()
            .filter(|&id| guard.links[id].ancestors.is_empty())
            .map(|id| TreeNode::new(self.arbor, self.root_index, id))
            .collect())
    }

    /// All roots in this node's forest.
    pub fn get_root_nodes(&self) -> Vec<TreeNode<'a>> {
        self.arbor
            .forest_root_indices(self.root_index)
            .into_iter()
            .map(|root_index| TreeNode::new(self.arbor, root_index, 0))
            .collect()
    }
}

impl<'a> SelectorCandidate for TreeNode<'a> {
    fn field_scalar(&self, field: &str) -> Result<f64> {
        TreeNode::field_scalar(self, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parse_round_trips() {
        assert_eq!(Scope::parse("tree").unwrap().as_str(), "tree");
        assert_eq!(Scope::parse("prog").unwrap().as_str(), "prog");
        assert_eq!(Scope::parse("forest").unwrap().as_str(), "forest");
        assert!(Scope::parse("nonsense").is_err());
    }
}
