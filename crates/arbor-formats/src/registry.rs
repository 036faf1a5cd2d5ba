//! Sniff-based dispatch across every on-disk dialect this crate knows.
//!
//! Grounded in `original_source/ytree/data_structures/arbor.py::load`'s
//! `_guess_arbor`/explicit-`method` dispatch: try each frontend's
//! `_is_valid` in turn unless the caller already named one.

use arbor_core::{Arbor, DataFileProbe};
use arbor_error::{Error, Result};
use std::path::Path;

/// One dialect this crate can open: its sniffer plus its `open` entry point.
struct Dialect {
    name: &'static str,
    probe: Box<dyn DataFileProbe>,
    open: fn(&Path) -> Result<Arbor>,
}

fn dialects() -> Vec<Dialect> {
    vec![
        Dialect { name: crate::canonical::DIALECT, probe: Box::new(crate::canonical::Probe), open: crate::canonical::open },
        Dialect {
            name: crate::text_tree_grouped::DIALECT,
            probe: Box::new(crate::text_tree_grouped::Probe),
            open: crate::text_tree_grouped::open,
        },
        Dialect { name: crate::text_tree::DIALECT, probe: Box::new(crate::text_tree::Probe), open: crate::text_tree::open },
        Dialect {
            name: crate::snapshot_forward::DIALECT,
            probe: Box::new(crate::snapshot_forward::Probe),
            open: crate::snapshot_forward::open,
        },
        Dialect {
            name: crate::hlist_style::DIALECT,
            probe: Box::new(crate::hlist_style::Probe),
            open: crate::hlist_style::open,
        },
        Dialect {
            name: crate::snapshot_backward::DIALECT,
            probe: Box::new(crate::snapshot_backward::Probe),
            open: crate::snapshot_backward::open,
        },
        Dialect { name: crate::forest_pack::DIALECT, probe: Box::new(crate::forest_pack::Probe), open: crate::forest_pack::open },
        Dialect { name: crate::inline_pack::DIALECT, probe: Box::new(crate::inline_pack::Probe), open: crate::inline_pack::open },
    ]
}

/// Opens `path` as an `Arbor`, either through the named dialect (`method`)
/// or by probing every known dialect in turn and taking the first match.
pub fn load(path: impl AsRef<Path>, method: Option<&str>) -> Result<Arbor> {
    let path = path.as_ref();
    let candidates = dialects();

    if let Some(method) = method {
        let dialect = candidates
            .into_iter()
            .find(|d| d.name == method)
            .ok_or_else(|| Error::backend_unknown(method))?;
        return (dialect.open)(path);
    }

    let mut matches: Vec<&Dialect> = candidates.iter().filter(|d| d.probe.is_valid(path)).collect();
    match matches.len() {
        0 => Err(Error::backend_unknown(path.to_string_lossy())),
        1 => (matches.remove(0).open)(path),
        _ => {
            let names: Vec<&str> = matches.iter().map(|d| d.name).collect();
            Err(Error::backend_ambiguous(names.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_named_method_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.dat");
        assert!(load(&path, Some("not_a_real_dialect")).is_err());
    }

    #[test]
    fn no_matching_dialect_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "nothing recognizable here").unwrap();
        assert!(load(&path, None).is_err());
    }
}
