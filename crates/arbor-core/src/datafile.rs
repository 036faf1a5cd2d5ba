//! The `DataFile` contract every format backend implements.

use crate::field::Dtype;
use arbor_error::Result;
use arbor_units::UnitArray;
use std::collections::HashMap;

/// Where a single halo's row lives inside an open data file.
///
/// Text dialects locate a halo by byte offset; struct-of-arrays dialects
/// locate it by a flat index plus a contiguous run length (used when a
/// whole tree's rows are read in one slice).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    ByteOffset(u64),
    Indexed { index: usize, len: usize },
}

/// What rows `read_fields` should return.
pub enum Selection<'a> {
    /// Every halo currently resident in the open file.
    AllInFile,
    /// Exactly these rows, in this order — one row per locator. Used for
    /// root-only batched reads across many trees.
    Handles(&'a [Locator]),
    /// `count` contiguous rows starting at `start` — one tree's full row
    /// range, used by `setup_tree`.
    Run { start: Locator, count: usize },
}

/// A scalar pulled straight from a file's header (redshift, scale factor,
/// cosmology pieces, box size, ...), before any unit conversion.
#[derive(Debug, Clone, Copy)]
pub struct HeaderValue {
    pub value: f64,
    pub unit: &'static str,
}

/// One on-disk dialect's file handle. Implementations may pool or refcount
/// the underlying OS handle across `open`/`close` pairs; both must be
/// idempotent.
pub trait DataFile: Send + Sync {
    /// Dialect name, matching its registration key in the backend dispatch table.
    fn dialect(&self) -> &'static str;

    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Scalars this backend pulled out of the header on `open`.
    fn header_properties(&self) -> HashMap<String, HeaderValue>;

    /// Read `field_names` for `selection`, in `dtypes[name]` (defaulting to
    /// `Dtype::F64` for names absent from the map). Implementations may
    /// cache decoded column arrays between calls on the same open handle.
    fn read_fields(
        &mut self,
        field_names: &[String],
        selection: Selection<'_>,
        dtypes: &HashMap<String, Dtype>,
    ) -> Result<HashMap<String, UnitArray>>;

    /// (N, 3) coordinates for every halo in this file, for spatial indexing.
    fn get_particle_positions(&mut self) -> Result<Vec<[f64; 3]>>;
}

/// Fast-sniff probe used by backend dispatch: does this path look like this
/// dialect? I/O failures during the probe must be swallowed and treated as
/// "did not match" (mirrors the donor's `except BaseException: pass` around
/// each candidate's validity check, re-expressed as a collapsed `bool`).
pub trait DataFileProbe: Send + Sync {
    fn dialect(&self) -> &'static str;
    fn is_valid(&self, path: &std::path::Path) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_variants_are_distinguishable() {
        let a = Locator::ByteOffset(128);
        let b = Locator::Indexed { index: 3, len: 10 };
        assert_ne!(a, Locator::ByteOffset(129));
        assert_eq!(b, Locator::Indexed { index: 3, len: 10 });
    }
}
