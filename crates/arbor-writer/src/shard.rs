//! Binary shard-file schema: one row per halo, in pre-order, for every
//! saved field, plus the shard-local slice of the tree index arrays.
//!
//! Grounded in spec §4.7's shard-file description; encoded with `bincode`
//! rather than HDF5 datasets, matching the donor stack's own
//! `serde`-everywhere convention (`arbor_units::UnitRegistryJson`,
//! `arbor_core::field::FieldDescriptor`'s serializable sibling records).

use arbor_error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardRecord {
    /// Tree-start/end indices local to this shard's row numbering.
    pub tree_start_index: Vec<u64>,
    pub tree_end_index: Vec<u64>,
    pub tree_size: Vec<u64>,
    /// field name -> one value per row, rows in pre-order, trees
    /// concatenated in the order they were assigned to this shard.
    pub fields: HashMap<String, Vec<f64>>,
}

impl ShardRecord {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        bincode::serialize_into(writer, self)
            .map_err(|e| Error::serialization_failed("encoding shard record").set_source(e))
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        bincode::deserialize_from(reader)
            .map_err(|e| Error::serialization_failed("decoding shard record").set_source(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bincode() {
        let mut fields = HashMap::new();
        fields.insert("mass".to_string(), vec![1.0, 2.0, 3.0]);
        let record = ShardRecord {
            tree_start_index: vec![0],
            tree_end_index: vec![3],
            tree_size: vec![3],
            fields,
        };
        let mut buf = Vec::new();
        record.write_to(&mut buf).unwrap();
        let decoded = ShardRecord::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded.tree_size, vec![3]);
        assert_eq!(decoded.fields["mass"], vec![1.0, 2.0, 3.0]);
    }
}
