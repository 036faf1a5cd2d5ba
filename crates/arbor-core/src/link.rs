//! Compact ancestor/descendent links built once per root by `grow_tree`.

/// One halo's position inside its tree's pre-order link array.
pub type TreeId = usize;

/// `descendent` and `ancestors` are tree-local positions (`TreeId`), not
/// arbor-wide uids — resolving a link never touches the uid map again.
#[derive(Debug, Clone, Default)]
pub struct NodeLink {
    pub tree_id: TreeId,
    pub descendent: Option<TreeId>,
    pub ancestors: Vec<TreeId>,
}

impl NodeLink {
    pub fn new(tree_id: TreeId) -> Self {
        NodeLink {
            tree_id,
            descendent: None,
            ancestors: Vec::new(),
        }
    }
}

/// Build the link array for one tree from its `uid`/`desc_uid` setup arrays.
///
/// Two passes, mirroring the source's own approach: the first pass builds
/// the uid->index map incrementally and links whatever descendent has
/// already been seen; the second pass re-resolves the handful of links
/// whose descendent appears later in the array than its ancestor.
pub fn grow_links(uids: &[i64], desc_uids: &[i64]) -> Vec<NodeLink> {
    debug_assert_eq!(uids.len(), desc_uids.len());
    let size = uids.len();
    let mut links: Vec<NodeLink> = (0..size).map(NodeLink::new).collect();
    let mut uid_map: std::collections::HashMap<i64, TreeId> =
        std::collections::HashMap::with_capacity(size);
    let mut unresolved = Vec::new();

    for i in 0..size {
        uid_map.insert(uids[i], i);
        let desc_uid = desc_uids[i];
        if desc_uid == -1 {
            continue;
        }
        match uid_map.get(&desc_uid) {
            Some(&desc_index) => {
                links[desc_index].ancestors.push(i);
                links[i].descendent = Some(desc_index);
            }
            None => unresolved.push(i),
        }
    }

    for i in unresolved {
        let desc_uid = desc_uids[i];
        if desc_uid == -1 {
            continue;
        }
        if let Some(&desc_index) = uid_map.get(&desc_uid) {
            links[desc_index].ancestors.push(i);
            links[i].descendent = Some(desc_index);
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_simple_chain() {
        // halo 0 -> halo 1 -> root (desc_uid -1)
        let uids = vec![10, 11, 12];
        let desc_uids = vec![11, 12, -1];
        let links = grow_links(&uids, &desc_uids);
        assert_eq!(links[2].ancestors, vec![1]);
        assert_eq!(links[1].ancestors, vec![0]);
        assert!(links[0].ancestors.is_empty());
        assert_eq!(links[0].descendent, Some(1));
        assert_eq!(links[1].descendent, Some(2));
        assert_eq!(links[2].descendent, None);
    }

    #[test]
    fn links_out_of_order_descendent() {
        // halo at index 0 descends to a halo that appears at index 2.
        let uids = vec![1, 2, 3];
        let desc_uids = vec![3, -1, 2];
        let links = grow_links(&uids, &desc_uids);
        assert_eq!(links[2].ancestors, vec![0]);
        assert_eq!(links[1].ancestors, vec![2]);
        assert_eq!(links[0].descendent, Some(2));
        assert_eq!(links[2].descendent, Some(1));
        assert_eq!(links[1].descendent, None);
    }

    #[test]
    fn single_node_tree() {
        let links = grow_links(&[5], &[-1]);
        assert_eq!(links.len(), 1);
        assert!(links[0].ancestors.is_empty());
        assert_eq!(links[0].descendent, None);
    }
}
