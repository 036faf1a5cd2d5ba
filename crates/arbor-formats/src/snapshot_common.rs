//! In-memory consolidated `DataFile` shared by the two per-snapshot
//! dialects (forward- and backward-linked): both must plant the full
//! ancestor graph up front (spec §4.4's "must plant all trees up front"
//! policy for per-snapshot catalogs — see DESIGN.md's Open Question
//! decision), so both materialize one tree-contiguous buffer eagerly
//! rather than leaving locators to be resolved lazily against many
//! scattered snapshot files.

use arbor_core::{DataFile, Dtype, HeaderValue, Locator, Planter, RootDescriptor, Selection};
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitArray};
use parking_lot::Mutex;
use std::collections::HashMap;

pub(crate) struct Row {
    pub uid: i64,
    pub desc_uid: i64,
    pub fields: HashMap<String, f64>,
}

fn find(parent: &mut [usize], x: usize) -> usize {
    if parent[x] != x {
        parent[x] = find(parent, parent[x]);
    }
    parent[x]
}

/// Partitions `rows` into trees (connected components under the forward
/// `uid -> desc_uid` edges) and reorders each tree's rows so the halo with
/// `desc_uid == -1` sits first — `Arbor::grow_tree`'s pre-order walk always
/// starts from position 0 within a tree's slice, so the root must
/// physically be there.
pub(crate) fn consolidate(rows: Vec<Row>) -> (Vec<RootDescriptor>, HashMap<String, Vec<f64>>) {
    let total = rows.len();
    let mut uid_index = HashMap::with_capacity(total);
    for (i, row) in rows.iter().enumerate() {
        uid_index.insert(row.uid, i);
    }

    let mut parent: Vec<usize> = (0..total).collect();
    for (i, row) in rows.iter().enumerate() {
        if row.desc_uid == -1 {
            continue;
        }
        if let Some(&j) = uid_index.get(&row.desc_uid) {
            let ri = find(&mut parent, i);
            let rj = find(&mut parent, j);
            if ri != rj {
                parent[ri] = rj;
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..total {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }
    let mut group_list: Vec<Vec<usize>> = groups.into_values().collect();
    group_list.sort_by_key(|indices| indices[0]);

    let mut field_names: Vec<String> = vec!["uid".to_string(), "desc_uid".to_string()];
    for row in &rows {
        for name in row.fields.keys() {
            if !field_names.contains(name) {
                field_names.push(name.clone());
            }
        }
    }

    let mut columns: HashMap<String, Vec<f64>> =
        field_names.iter().map(|name| (name.clone(), Vec::with_capacity(total))).collect();
    let mut descriptors = Vec::with_capacity(group_list.len());
    let mut cursor = 0usize;

    for (forest_id, mut indices) in group_list.into_iter().enumerate() {
        if let Some(root_pos) = indices.iter().position(|&i| rows[i].desc_uid == -1) {
            indices.swap(0, root_pos);
        } else {
            tracing::warn!(forest_id, "tree has no desc_uid == -1 halo; forcing the first row to root");
        }
        let tree_uid = rows[indices[0]].uid;
        for &i in &indices {
            columns.get_mut("uid").unwrap().push(rows[i].uid as f64);
            let desc_uid = if indices[0] == i { -1.0 } else { rows[i].desc_uid as f64 };
            columns.get_mut("desc_uid").unwrap().push(desc_uid);
            for name in field_names.iter().skip(2) {
                columns.get_mut(name).unwrap().push(*rows[i].fields.get(name).unwrap_or(&0.0));
            }
        }
        descriptors.push(RootDescriptor {
            uid: tree_uid,
            forest_id,
            file_index: 0,
            locator: Locator::Indexed { index: cursor, len: indices.len() },
            tree_size: indices.len(),
        });
        cursor += indices.len();
    }

    (descriptors, columns)
}

pub(crate) struct InMemoryCatalogFile {
    dialect: &'static str,
    columns: HashMap<String, Vec<f64>>,
    units: HashMap<String, Unit>,
    header_properties: HashMap<String, HeaderValue>,
}

impl InMemoryCatalogFile {
    pub(crate) fn new(
        dialect: &'static str,
        columns: HashMap<String, Vec<f64>>,
        units: HashMap<String, Unit>,
        header_properties: HashMap<String, HeaderValue>,
    ) -> Self {
        InMemoryCatalogFile { dialect, columns, units, header_properties }
    }
}

impl DataFile for InMemoryCatalogFile {
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
        self.header_properties.clone()
    }

    fn read_fields(
        &mut self,
        field_names: &[String],
        selection: Selection<'_>,
        _dtypes: &HashMap<String, Dtype>,
    ) -> Result<HashMap<String, UnitArray>> {
        let ranges: Vec<(usize, usize)> = match selection {
            Selection::AllInFile => {
                let len = self.columns.values().next().map(|v| v.len()).unwrap_or(0);
                vec![(0, len)]
            }
            Selection::Run { start, count } => match start {
                Locator::Indexed { index, .. } => vec![(index, count)],
                Locator::ByteOffset(_) => return Err(Error::unexpected("snapshot catalog locator must be indexed")),
            },
            Selection::Handles(handles) => handles
                .iter()
                .map(|handle| match handle {
                    Locator::Indexed { index, len } => Ok((*index, *len)),
                    Locator::ByteOffset(_) => Err(Error::unexpected("snapshot catalog locator must be indexed")),
                })
                .collect::<Result<Vec<_>>>()?,
        };

        let mut out = HashMap::with_capacity(field_names.len());
        for name in field_names {
            let column = self.columns.get(name).ok_or_else(|| Error::field_not_found(name))?;
            let mut values = Vec::new();
            for (index, len) in &ranges {
                values.extend_from_slice(&column[*index..*index + *len]);
            }
            let unit = self.units.get(name).cloned().unwrap_or_else(Unit::dimensionless);
            out.insert(name.clone(), UnitArray::new(values, unit));
        }
        Ok(out)
    }

    fn get_particle_positions(&mut self) -> Result<Vec<[f64; 3]>> {
        match (self.columns.get("x"), self.columns.get("y"), self.columns.get("z")) {
            (Some(x), Some(y), Some(z)) => {
                Ok(x.iter().zip(y).zip(z).map(|((a, b), c)| [*a, *b, *c]).collect())
            }
            _ => Err(Error::not_implemented("particle positions without x/y/z fields")),
        }
    }
}

/// Hands back the root table computed once during consolidation; planting
/// a per-snapshot dialect is then O(1) and idempotent by construction.
pub(crate) struct PrecomputedPlanter(pub(crate) Vec<RootDescriptor>);

impl Planter for PrecomputedPlanter {
    fn plant(&self, _files: &[Mutex<Box<dyn DataFile>>]) -> Result<Vec<RootDescriptor>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consolidate_places_root_first_and_groups_by_component() {
        let rows = vec![
            Row { uid: 10, desc_uid: 11, fields: HashMap::new() },
            Row { uid: 11, desc_uid: -1, fields: HashMap::new() },
            Row { uid: 20, desc_uid: -1, fields: HashMap::new() },
        ];
        let (descriptors, columns) = consolidate(rows);
        assert_eq!(descriptors.len(), 2);
        let first_tree = descriptors.iter().find(|d| d.tree_size == 2).unwrap();
        let Locator::Indexed { index, .. } = first_tree.locator else { panic!("expected indexed locator") };
        assert_eq!(columns["desc_uid"][index], -1.0);
    }
}
