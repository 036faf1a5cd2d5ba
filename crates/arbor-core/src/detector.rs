//! Dependency discovery for derived fields via a "fake container".
//!
//! A derived field's body is an ordinary closure over a `FieldAccess`. To
//! discover its dependencies we hand it a `FieldDetector` instead of real
//! data: every name it asks for is recorded, and it gets back a
//! dimensionless ones-array of the probe size so arithmetic in the body
//! doesn't panic. No reflection or metaprogramming is needed — the same
//! closure runs for real later against the actual field cache.

use arbor_error::Result;
use arbor_units::{Unit, UnitArray};
use std::collections::HashSet;

/// What a derived-field closure is handed: something it can index by
/// field name to get a `UnitArray`.
pub trait FieldAccess {
    fn get(&mut self, name: &str) -> Result<UnitArray>;
}

/// The type of a registered derived-field function.
pub type DerivedFieldFn = std::sync::Arc<dyn Fn(&mut dyn FieldAccess) -> Result<UnitArray> + Send + Sync>;

/// Records every field name a derived-field closure accesses, without
/// performing real I/O.
pub struct FieldDetector {
    accessed: HashSet<String>,
    probe_size: usize,
}

impl FieldDetector {
    pub fn new(probe_size: usize) -> Self {
        FieldDetector {
            accessed: HashSet::new(),
            probe_size,
        }
    }

    /// Run `f` against this detector and return the set of field names it touched.
    pub fn discover(mut self, f: &DerivedFieldFn) -> Result<Vec<String>> {
        f(&mut self)?;
        let mut deps: Vec<String> = self.accessed.into_iter().collect();
        deps.sort();
        Ok(deps)
    }
}

impl FieldAccess for FieldDetector {
    fn get(&mut self, name: &str) -> Result<UnitArray> {
        self.accessed.insert(name.to_string());
        Ok(UnitArray::new(vec![1.0; self.probe_size], Unit::dimensionless()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_dependencies_without_real_data() {
        let f: DerivedFieldFn = std::sync::Arc::new(|data: &mut dyn FieldAccess| {
            let mass = data.get("mass")?;
            let radius = data.get("virial_radius")?;
            Ok(UnitArray::new(
                mass.values.iter().zip(&radius.values).map(|(m, r)| m / r).collect(),
                Unit::dimensionless(),
            ))
        });

        let detector = FieldDetector::new(4);
        let deps = detector.discover(&f).unwrap();
        assert_eq!(deps, vec!["mass".to_string(), "virial_radius".to_string()]);
    }
}
