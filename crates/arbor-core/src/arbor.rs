//! The `Arbor`: owns every DataFile, the root-descriptor table, the field
//! and unit registries, and the per-root materialized state.

use crate::datafile::{DataFile, HeaderValue, Locator, Selection};
use crate::detector::FieldAccess;
use crate::field::FieldKind;
use crate::field_registry::FieldRegistry;
use crate::link::{grow_links, NodeLink, TreeId};
use crate::node::{Scope, TreeNode};
use crate::selector::SelectorRegistry;
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitArray, UnitRegistry};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// One row of the arbor-level root-descriptor table: where a tree's bytes
/// live and which forest it belongs to. Populated once, at planting time.
#[derive(Debug, Clone, Copy)]
pub struct RootDescriptor {
    pub uid: i64,
    pub forest_id: usize,
    pub file_index: usize,
    pub locator: Locator,
    pub tree_size: usize,
}

/// Per-root materialized state: setup/grown arrays and the field cache.
/// Only roots own this; non-root `TreeNode`s index into their root's copy.
#[derive(Default)]
pub(crate) struct RootState {
    pub is_setup: bool,
    pub is_grown: bool,
    pub uid: Vec<i64>,
    pub desc_uid: Vec<i64>,
    pub links: Vec<NodeLink>,
    pub tree_order: Vec<TreeId>,
    pub field_cache: HashMap<String, UnitArray>,
}

/// Backend-specific root enumeration. Each format backend in `arbor-formats`
/// implements this to walk its own index and hand back a flat root table;
/// `Arbor` knows nothing about any particular dialect's layout.
pub trait Planter: Send + Sync {
    fn plant(&self, files: &[Mutex<Box<dyn DataFile>>]) -> Result<Vec<RootDescriptor>>;
}

pub struct Arbor {
    files: Vec<Mutex<Box<dyn DataFile>>>,
    planter: Box<dyn Planter>,
    roots: RwLock<Vec<RootDescriptor>>,
    root_state: RwLock<Vec<Arc<RwLock<RootState>>>>,
    field_registry: RwLock<FieldRegistry>,
    unit_registry: Arc<UnitRegistry>,
    selector_registry: SelectorRegistry,
    default_selector: RwLock<(String, String)>,
    root_field_table: RwLock<HashMap<String, Vec<f64>>>,
    is_planted: RwLock<bool>,
}

impl Arbor {
    pub fn new(
        files: Vec<Box<dyn DataFile>>,
        planter: Box<dyn Planter>,
        field_registry: FieldRegistry,
        unit_registry: Arc<UnitRegistry>,
    ) -> Self {
        Arbor {
            files: files.into_iter().map(Mutex::new).collect(),
            planter,
            roots: RwLock::new(Vec::new()),
            root_state: RwLock::new(Vec::new()),
            field_registry: RwLock::new(field_registry),
            unit_registry,
            selector_registry: SelectorRegistry::new(),
            default_selector: RwLock::new(("max_field_value".to_string(), "mass".to_string())),
            root_field_table: RwLock::new(HashMap::new()),
            is_planted: RwLock::new(false),
        }
    }

    pub fn size(&self) -> usize {
        self.roots.read().len()
    }

    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn unit_registry(&self) -> &UnitRegistry {
        &self.unit_registry
    }

    pub fn field_registry(&self) -> &RwLock<FieldRegistry> {
        &self.field_registry
    }

    pub fn set_selector(&self, name: impl Into<String>, field: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.selector_registry.get(&name)?;
        *self.default_selector.write() = (name, field.into());
        Ok(())
    }

    /// Idempotent: populates the root-descriptor table from the backend's
    /// own index. For forward/backward catalog dialects this is where the
    /// planter builds the full ancestor graph (spec §3 Lifecycle).
    pub fn plant_trees(&self) -> Result<()> {
        {
            if *self.is_planted.read() {
                return Ok(());
            }
        }
        let mut planted = self.is_planted.write();
        if *planted {
            return Ok(());
        }
        let descriptors = self.planter.plant(&self.files)?;
        *self.root_state.write() =
            descriptors.iter().map(|_| Arc::new(RwLock::new(RootState::default()))).collect();
        *self.roots.write() = descriptors;
        *planted = true;
        Ok(())
    }

    pub fn is_planted(&self) -> bool {
        *self.is_planted.read()
    }

    pub(crate) fn root_descriptor(&self, root_index: usize) -> Result<RootDescriptor> {
        self.roots
            .read()
            .get(root_index)
            .copied()
            .ok_or_else(|| Error::invalid_argument(format!("root index {root_index} out of range")))
    }

    pub(crate) fn root_state(&self, root_index: usize) -> Arc<RwLock<RootState>> {
        self.root_state.read()[root_index].clone()
    }

    pub(crate) fn file(&self, index: usize) -> parking_lot::MutexGuard<'_, Box<dyn DataFile>> {
        self.files[index].lock()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn header_properties(&self, file_index: usize) -> HashMap<String, HeaderValue> {
        self.files[file_index].lock().header_properties()
    }

    /// The dialect name of one backing file, e.g. `"rockstar"` or `"gadget4"`.
    pub fn dialect(&self, file_index: usize) -> &'static str {
        self.files[file_index].lock().dialect()
    }

    /// `Arbor.iter/index`: root handles, in stored order (or the given subset).
    pub fn iter_roots(&self, indices: Option<&[usize]>) -> Result<Vec<TreeNode<'_>>> {
        self.plant_trees()?;
        Ok(match indices {
            Some(idx) => idx.iter().map(|&i| TreeNode::new(self, i, 0)).collect(),
            None => (0..self.size()).map(|i| TreeNode::new(self, i, 0)).collect(),
        })
    }

    pub fn add_analysis_field(
        &self,
        name: impl Into<String>,
        units: Unit,
        default: f64,
        force_add: bool,
    ) -> Result<()> {
        self.field_registry
            .write()
            .add_analysis_field(name, units, None, default, force_add)
    }

    pub fn add_alias_field(
        &self,
        alias: impl Into<String>,
        target: &str,
        units: Option<Unit>,
        force_add: bool,
    ) -> Result<()> {
        self.field_registry.write().add_alias_field(alias, target, units, force_add)
    }

    pub fn add_derived_field(
        &self,
        name: impl Into<String>,
        function: crate::detector::DerivedFieldFn,
        units: Unit,
        vector: bool,
        force_add: bool,
    ) -> Result<()> {
        self.field_registry
            .write()
            .add_derived_field(name, function, units, None, vector, force_add, 4)
    }

    /// Setup (idempotent, per root): materialize `uid[]`/`desc_uid[]`.
    /// Orphans (a `desc_uid` pointing outside this tree) are promoted to
    /// root by clamping `desc_uid` to `-1`, logged at `warn`.
    pub(crate) fn setup_tree(&self, root_index: usize) -> Result<()> {
        self.plant_trees()?;
        if self.root_state(root_index).read().is_setup {
            return Ok(());
        }
        let descriptor = self.root_descriptor(root_index)?;
        let (uid, desc_uid) = {
            let mut file = self.files[descriptor.file_index].lock();
            file.open()?;
            let names = vec!["uid".to_string(), "desc_uid".to_string()];
            let dtypes = HashMap::new();
            let arrays = file.read_fields(
                &names,
                Selection::Run { start: descriptor.locator, count: descriptor.tree_size },
                &dtypes,
            )?;
            let uid: Vec<i64> = arrays["uid"].values.iter().map(|v| *v as i64).collect();
            let desc_uid: Vec<i64> = arrays["desc_uid"].values.iter().map(|v| *v as i64).collect();
            (uid, desc_uid)
        };

        let uid_set: std::collections::HashSet<i64> = uid.iter().copied().collect();
        let mut desc_uid = desc_uid;
        for (i, d) in desc_uid.iter_mut().enumerate() {
            if *d != -1 && !uid_set.contains(d) {
                tracing::info!(root_index, halo_index = i, desc_uid = *d, "orphan halo; promoting to root");
                *d = -1;
            }
        }

        let root_state = self.root_state(root_index);
        let mut state = root_state.write();
        state.uid = uid;
        state.desc_uid = desc_uid;
        state.is_setup = true;
        Ok(())
    }

    /// Grow (idempotent, per root): build the link array and the tree's
    /// pre-order traversal index.
    pub(crate) fn grow_tree(&self, root_index: usize) -> Result<()> {
        self.setup_tree(root_index)?;
        if self.root_state(root_index).read().is_grown {
            return Ok(());
        }
        let (uid, desc_uid) = {
            let root_state = self.root_state(root_index);
            let state = root_state.read();
            (state.uid.clone(), state.desc_uid.clone())
        };
        let links = grow_links(&uid, &desc_uid);
        let tree_order = preorder(&links, 0);

        let root_state = self.root_state(root_index);
        let mut state = root_state.write();
        state.links = links;
        state.tree_order = tree_order;
        state.is_grown = true;
        Ok(())
    }

    /// On root: clear link array, setup arrays, and the field cache. On
    /// non-root: nothing to clear at the arbor level (non-roots hold no
    /// arbor-owned storage).
    pub fn reset_node(&self, root_index: usize, is_root: bool) {
        if is_root {
            *self.root_state(root_index).write() = RootState::default();
        }
    }

    /// The whole root's cached pre-order array (start node 0, the root).
    pub(crate) fn tree_order(&self, root_index: usize) -> Vec<TreeId> {
        self.root_state(root_index).read().tree_order.clone()
    }

    /// "The tree beneath, starting with" `start` — the subtree's own
    /// pre-order, not the whole root's. Queried fresh each time rather than
    /// cached, since every node in a tree can ask for its own subtree.
    pub(crate) fn tree_order_from(&self, root_index: usize, start: TreeId) -> Vec<TreeId> {
        let state = self.root_state(root_index);
        let guard = state.read();
        preorder(&guard.links, start)
    }

    /// Main-progenitor chain starting at `start`: at each step, call the
    /// default selector on the node's ancestors.
    pub(crate) fn prog_order_from(&self, root_index: usize, start: TreeId) -> Result<Vec<TreeId>> {
        let (selector_name, selector_field) = self.default_selector.read().clone();
        let selector = self.selector_registry.get(&selector_name)?.clone();
        let mut order = vec![start];
        let mut current = start;
        loop {
            let ancestor_ids = self.root_state(root_index).read().links[current].ancestors.clone();
            if ancestor_ids.is_empty() {
                break;
            }
            let candidates: Vec<TreeNode<'_>> =
                ancestor_ids.iter().map(|&id| TreeNode::new(self, root_index, id)).collect();
            let refs: Vec<&dyn crate::selector::SelectorCandidate> =
                candidates.iter().map(|c| c as &dyn crate::selector::SelectorCandidate).collect();
            let picked = selector(&refs, &selector_field)?;
            match picked {
                Some(index) => {
                    current = ancestor_ids[index];
                    order.push(current);
                }
                None => break,
            }
        }
        Ok(order)
    }

    pub(crate) fn forest_root_indices(&self, root_index: usize) -> Vec<usize> {
        let roots = self.roots.read();
        let forest_id = roots[root_index].forest_id;
        roots
            .iter()
            .enumerate()
            .filter(|(_, r)| r.forest_id == forest_id)
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn forest_order(&self, root_index: usize) -> Result<Vec<(usize, TreeId)>> {
        let mut out = Vec::new();
        for r in self.forest_root_indices(root_index) {
            self.grow_tree(r)?;
            let order = self.tree_order(r);
            out.extend(order.into_iter().map(|id| (r, id)));
        }
        Ok(out)
    }

    /// `tree[field]` fast path: a root's value straight from the arbor-wide
    /// root-field table, materializing that column on first use.
    pub(crate) fn root_field_scalar(&self, root_index: usize, field: &str) -> Result<f64> {
        if field == "uid" {
            return Ok(self.root_descriptor(root_index)?.uid as f64);
        }
        {
            let table = self.root_field_table.read();
            if let Some(column) = table.get(field) {
                return Ok(column[root_index]);
            }
        }
        self.materialize_root_field(field)?;
        Ok(self.root_field_table.read()[field][root_index])
    }

    fn materialize_root_field(&self, field: &str) -> Result<()> {
        self.plant_trees()?;
        let kind = self.field_registry.read().get(field)?.kind.clone();
        let n = self.size();
        let mut values = vec![0.0; n];

        if let FieldKind::OnDisk { .. } = kind {
            let mut by_file: HashMap<usize, Vec<(usize, Locator)>> = HashMap::new();
            for i in 0..n {
                let descriptor = self.root_descriptor(i)?;
                by_file.entry(descriptor.file_index).or_default().push((i, descriptor.locator));
            }
            for (file_index, entries) in by_file {
                let locators: Vec<Locator> = entries.iter().map(|(_, l)| *l).collect();
                let mut file = self.files[file_index].lock();
                file.open()?;
                let dtypes = HashMap::new();
                let result = file.read_fields(&[field.to_string()], Selection::Handles(&locators), &dtypes)?;
                let array = &result[field];
                for (k, (root_i, _)) in entries.iter().enumerate() {
                    values[*root_i] = array.values[k];
                }
            }
        } else {
            for i in 0..n {
                self.grow_tree(i)?;
                self.ensure_tree_field(i, field)?;
                values[i] = self.root_state(i).read().field_cache[field].values[0];
            }
        }

        self.root_field_table.write().insert(field.to_string(), values);
        Ok(())
    }

    /// `tree[scope, field]` / per-tree scalar indexing: ensure the field
    /// array is materialized for the root, then index by `tree_id`.
    pub(crate) fn tree_field_scalar(&self, root_index: usize, tree_id: TreeId, field: &str) -> Result<f64> {
        self.ensure_tree_field(root_index, field)?;
        Ok(self.root_state(root_index).read().field_cache[field].values[tree_id])
    }

    pub(crate) fn field_for_order(&self, root_index: usize, order: &[TreeId], field: &str) -> Result<UnitArray> {
        self.ensure_tree_field(root_index, field)?;
        let root_state = self.root_state(root_index);
        let state = root_state.read();
        let array = &state.field_cache[field];
        let values = order.iter().map(|&id| array.values[id]).collect();
        Ok(UnitArray::new(values, array.unit.clone()))
    }

    pub(crate) fn field_for_forest(&self, root_index: usize, field: &str) -> Result<UnitArray> {
        let nodes = self.forest_order(root_index)?;
        let mut values = Vec::with_capacity(nodes.len());
        let mut unit = None;
        for (r, id) in nodes {
            self.ensure_tree_field(r, field)?;
            let root_state = self.root_state(r);
            let state = root_state.read();
            let array = &state.field_cache[field];
            values.push(array.values[id]);
            if unit.is_none() {
                unit = Some(array.unit.clone());
            }
        }
        Ok(UnitArray::new(values, unit.unwrap_or_else(Unit::dimensionless)))
    }

    pub(crate) fn ensure_tree_field(&self, root_index: usize, field: &str) -> Result<()> {
        if self.root_state(root_index).read().field_cache.contains_key(field) {
            return Ok(());
        }
        let tree_size = self.root_state(root_index).read().uid.len();
        let cache_snapshot = self.root_state(root_index).read().field_cache.clone();
        let (to_read, to_generate) = self
            .field_registry
            .read()
            .resolve_field_dependencies(&[field.to_string()], &cache_snapshot, Some(tree_size))?;

        if !to_read.is_empty() {
            let descriptor = self.root_descriptor(root_index)?;
            let mut file = self.files[descriptor.file_index].lock();
            file.open()?;
            let dtypes = HashMap::new();
            let arrays = file.read_fields(
                &to_read,
                Selection::Run { start: descriptor.locator, count: tree_size },
                &dtypes,
            )?;
            let root_state = self.root_state(root_index);
            let mut state = root_state.write();
            for (name, array) in arrays {
                state.field_cache.insert(name, array);
            }
        }

        for name in &to_generate {
            self.generate_tree_field(root_index, name)?;
        }
        Ok(())
    }

    fn generate_tree_field(&self, root_index: usize, name: &str) -> Result<()> {
        if self.root_state(root_index).read().field_cache.contains_key(name) {
            return Ok(());
        }
        let descriptor = self.field_registry.read().get(name)?.clone();
        match &descriptor.kind {
            FieldKind::Alias => {
                let target = descriptor.deps[0].clone();
                let value = self.root_state(root_index).read().field_cache[&target].clone();
                let converted = value.convert_to(&descriptor.units.to_string(), &self.unit_registry)?;
                self.root_state(root_index).write().field_cache.insert(name.to_string(), converted);
            }
            FieldKind::Derived { .. } => {
                let function = self
                    .field_registry
                    .read()
                    .derived_function(name)
                    .cloned()
                    .ok_or_else(|| Error::field_not_found(name))?;
                let mut accessor = ArborFieldAccess { arbor: self, root_index };
                let result = function(&mut accessor)?;
                self.root_state(root_index).write().field_cache.insert(name.to_string(), result);
            }
            FieldKind::Analysis | FieldKind::AnalysisSaved => {
                let size = self.root_state(root_index).read().uid.len();
                let array = UnitArray::new(vec![descriptor.default; size], descriptor.units.clone());
                self.root_state(root_index).write().field_cache.insert(name.to_string(), array);
            }
            FieldKind::OnDisk { .. } => {
                return Err(Error::field_not_found(name));
            }
        }
        Ok(())
    }

    /// Set an analysis/analysis_saved field's value for a single node.
    /// Invalidates any vector/magnitude cache tied to a modified component.
    pub(crate) fn set_node_field(
        &self,
        root_index: usize,
        tree_id: TreeId,
        is_root: bool,
        field: &str,
        value: f64,
    ) -> Result<()> {
        if !self.field_registry.read().get(field)?.kind.is_settable() {
            return Err(Error::field_unsettable(field));
        }

        if is_root {
            let mut table = self.root_field_table.write();
            let size = self.size();
            let column = table.entry(field.to_string()).or_insert_with(|| vec![0.0; size]);
            column[root_index] = value;
        } else {
            self.ensure_tree_field(root_index, field)?;
            let root_state = self.root_state(root_index);
            let mut state = root_state.write();
            state.field_cache.get_mut(field).unwrap().values[tree_id] = value;
        }

        if let Some(base) = field
            .strip_suffix("_x")
            .or_else(|| field.strip_suffix("_y"))
            .or_else(|| field.strip_suffix("_z"))
        {
            let magnitude = format!("{base}_magnitude");
            if is_root {
                let mut table = self.root_field_table.write();
                table.remove(base);
                table.remove(&magnitude);
            } else {
                let root_state = self.root_state(root_index);
                let mut state = root_state.write();
                state.field_cache.remove(base);
                state.field_cache.remove(&magnitude);
            }
        }
        Ok(())
    }

    /// Evaluate `predicate` against every root's own `scope` array, flattening
    /// matches across roots in root-stored order.
    pub fn select(&self, predicate: &str, scope: Scope, fields_hint: Option<&[String]>) -> Result<Vec<TreeNode<'_>>> {
        let compiled = crate::select::Predicate::compile(predicate)?;
        let roots = self.iter_roots(None)?;
        let mut matches = Vec::new();
        for root in roots {
            if let Some(hints) = fields_hint {
                for field in hints {
                    self.ensure_tree_field(root.root_index(), field)?;
                }
            }
            let mask = compiled.evaluate(root, self.unit_registry())?;
            let order = root.traversal_order(scope)?;
            if mask.len() != order.len() {
                return Err(Error::selection_scope_mismatch(order.len(), mask.len()));
            }
            for (index, keep) in mask.into_iter().enumerate() {
                if keep {
                    matches.push(root.get_node(scope, index)?);
                }
            }
        }
        Ok(matches)
    }

    /// Wrap an arbitrary list of nodes in the read-only field-caching view.
    pub fn container<'a>(&'a self, nodes: Vec<TreeNode<'a>>) -> crate::container::NodeContainer<'a> {
        crate::container::NodeContainer::new(nodes)
    }
}

struct ArborFieldAccess<'a> {
    arbor: &'a Arbor,
    root_index: usize,
}

impl<'a> FieldAccess for ArborFieldAccess<'a> {
    fn get(&mut self, name: &str) -> Result<UnitArray> {
        self.arbor.ensure_tree_field(self.root_index, name)?;
        Ok(self.arbor.root_state(self.root_index).read().field_cache[name].clone())
    }
}

/// Iterative pre-order DFS from `start`, visiting ancestors in stored order.
fn preorder(links: &[NodeLink], start: TreeId) -> Vec<TreeId> {
    let mut order = Vec::with_capacity(links.len());
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        order.push(id);
        for &ancestor in links[id].ancestors.iter().rev() {
            stack.push(ancestor);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datafile::HeaderValue;
    use crate::field::{Dtype, FieldSourceKind};

    /// A fixed in-memory three-halo chain: root <- mid <- leaf.
    struct FixedFile {
        mass: Vec<f64>,
    }

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
            field_names: &[String],
            _selection: Selection<'_>,
            _dtypes: &HashMap<String, Dtype>,
        ) -> Result<HashMap<String, UnitArray>> {
            let mut out = HashMap::new();
            for name in field_names {
                let array = match name.as_str() {
                    "uid" => UnitArray::new(vec![2.0, 1.0, 0.0], Unit::dimensionless()),
                    "desc_uid" => UnitArray::new(vec![-1.0, 2.0, 1.0], Unit::dimensionless()),
                    "mass" => UnitArray::new(self.mass.clone(), Unit::parse("Msun").unwrap()),
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

    struct FixedPlanter;
    impl Planter for FixedPlanter {
        fn plant(&self, _files: &[Mutex<Box<dyn DataFile>>]) -> Result<Vec<RootDescriptor>> {
            Ok(vec![RootDescriptor {
                uid: 2,
                forest_id: 0,
                file_index: 0,
                locator: Locator::ByteOffset(0),
                tree_size: 3,
            }])
        }
    }

    fn build_arbor(mass: Vec<f64>) -> Arbor {
        let file: Box<dyn DataFile> = Box::new(FixedFile { mass });
        let mut registry = FieldRegistry::default();
        registry
            .register_on_disk("mass", Unit::parse("Msun").unwrap(), FieldSourceKind::File)
            .unwrap();
        let mut arbor = Arbor::new(vec![file], Box::new(FixedPlanter), registry, Arc::new(UnitRegistry::new()));
        arbor
    }

    #[test]
    fn setup_and_grow_build_expected_links() {
        let arbor = build_arbor(vec![30.0, 20.0, 10.0]);
        arbor.plant_trees().unwrap();
        arbor.grow_tree(0).unwrap();
        let root_state = arbor.root_state(0);
        let state = root_state.read();
        assert_eq!(state.tree_order, vec![0, 1, 2]);
        assert_eq!(state.links[0].ancestors, vec![1]);
        assert_eq!(state.links[1].ancestors, vec![2]);
    }

    #[test]
    fn root_field_scalar_reads_through_root_field_table() {
        let arbor = build_arbor(vec![30.0, 20.0, 10.0]);
        let nodes = arbor.iter_roots(None).unwrap();
        let root = nodes[0];
        assert_eq!(root.field_scalar("mass").unwrap(), 30.0);
    }

    #[test]
    fn non_root_field_scalar_indexes_by_tree_id() {
        let arbor = build_arbor(vec![30.0, 20.0, 10.0]);
        let root = arbor.iter_roots(None).unwrap()[0];
        let ancestors = root.ancestors().unwrap();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].field_scalar("mass").unwrap(), 20.0);
    }

    #[test]
    fn prog_order_follows_max_mass_selector() {
        let arbor = build_arbor(vec![30.0, 20.0, 10.0]);
        let root = arbor.iter_roots(None).unwrap()[0];
        let order = root.traversal_order(Scope::Prog).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn setup_promotes_orphan_descendent_to_root() {
        struct OrphanFile;
        impl DataFile for OrphanFile {
            fn dialect(&self) -> &'static str {
                "orphan"
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
                        "uid" => UnitArray::new(vec![1.0, 0.0], Unit::dimensionless()),
                        "desc_uid" => UnitArray::new(vec![-1.0, 999.0], Unit::dimensionless()),
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

        let file: Box<dyn DataFile> = Box::new(OrphanFile);
        let registry = FieldRegistry::default();
        let mut arbor = Arbor::new(vec![file], Box::new(FixedPlanter), registry, Arc::new(UnitRegistry::new()));
        arbor.setup_tree(0).unwrap();
        let state = arbor.root_state(0).read();
        assert_eq!(state.desc_uid, vec![-1, -1]);
    }
}
