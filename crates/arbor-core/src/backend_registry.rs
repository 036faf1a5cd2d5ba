//! Dispatch table over registered `DataFile` backends, mirroring
//! `llmcc-core`'s `LanguageRegistry` but keyed by dialect name and fast-sniff
//! probes instead of file extensions.

use crate::datafile::{DataFile, DataFileProbe};
use arbor_error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Builds a concrete `DataFile` once its dialect has been chosen.
pub type DataFileConstructor = Arc<dyn Fn(&Path) -> Result<Box<dyn DataFile>> + Send + Sync>;

struct Backend {
    probe: Arc<dyn DataFileProbe>,
    construct: DataFileConstructor,
}

/// Registry of all compiled-in dialects. One process-wide instance is
/// typically built once (via `default_registry()` in `arbor-formats`) and
/// shared by every `Arbor::load` call.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Backend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        BackendRegistry { backends: Vec::new() }
    }

    pub fn register(&mut self, probe: Arc<dyn DataFileProbe>, construct: DataFileConstructor) {
        self.backends.push(Backend { probe, construct });
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.probe.dialect()).collect()
    }

    /// Resolve a path to a backend, either by explicit `method` override or
    /// by sniffing every registered probe. Exactly one match is required.
    pub fn resolve(&self, path: &Path, method: Option<&str>) -> Result<Box<dyn DataFile>> {
        if let Some(method) = method {
            let backend = self
                .backends
                .iter()
                .find(|b| b.probe.dialect() == method)
                .ok_or_else(|| Error::backend_unknown(method))?;
            return (backend.construct)(path);
        }

        let matches: Vec<&Backend> = self.backends.iter().filter(|b| b.probe.is_valid(path)).collect();
        match matches.len() {
            1 => (matches[0].construct)(path),
            0 => Err(Error::backend_ambiguous(path.to_string_lossy(), &[])),
            _ => {
                let names: Vec<&str> = matches.iter().map(|b| b.probe.dialect()).collect();
                Err(Error::backend_ambiguous(path.to_string_lossy(), &names))
            }
        }
    }
}

/// Header scalars pulled out of every header regardless of dialect, keyed by
/// name; used by callers that only need cosmology/box-size without opening
/// the full backend.
pub type HeaderScan = HashMap<String, f64>;
