//! Tree-node selectors: pick one ancestor among several by field value.
//!
//! Used when more than one ancestor shares a descendent and the caller walks
//! a single preferred line (`get_node("prog", 0)`, leaf-node traversal, ...).
//! Selectors are registered by name, same as the field registry, so callers
//! can add their own ranking rule without touching this crate.

use arbor_error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Anything a selector can rank: a scalar field value lookup. Kept separate
/// from the concrete tree-node type so this module has no dependency on
/// `node.rs` and can be built and tested standalone.
pub trait SelectorCandidate {
    fn field_scalar(&self, field: &str) -> Result<f64>;
}

/// `f(candidates, field) -> index of the chosen candidate`, or `None` if
/// `candidates` is empty.
pub type SelectorFn =
    Arc<dyn Fn(&[&dyn SelectorCandidate], &str) -> Result<Option<usize>> + Send + Sync>;

/// Registry of named ranking rules, pre-populated with `max_field_value` and
/// `min_field_value`.
pub struct SelectorRegistry {
    selectors: HashMap<String, SelectorFn>,
}

impl Default for SelectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectorRegistry {
    pub fn new() -> Self {
        let mut registry = SelectorRegistry {
            selectors: HashMap::new(),
        };
        registry.add("max_field_value", Arc::new(max_field_value));
        registry.add("min_field_value", Arc::new(min_field_value));
        registry
    }

    pub fn add(&mut self, name: impl Into<String>, f: SelectorFn) {
        self.selectors.insert(name.into(), f);
    }

    pub fn get(&self, name: &str) -> Result<&SelectorFn> {
        self.selectors.get(name).ok_or_else(|| Error::selector_not_found(name))
    }
}

/// Selects the ancestor with the maximum value of `field`. Ties break toward
/// the first occurrence.
fn max_field_value(candidates: &[&dyn SelectorCandidate], field: &str) -> Result<Option<usize>> {
    rank(candidates, field, |current, best| current > best)
}

/// Selects the ancestor with the minimum value of `field`. Ties break toward
/// the first occurrence.
fn min_field_value(candidates: &[&dyn SelectorCandidate], field: &str) -> Result<Option<usize>> {
    rank(candidates, field, |current, best| current < best)
}

fn rank(
    candidates: &[&dyn SelectorCandidate],
    field: &str,
    better: impl Fn(f64, f64) -> bool,
) -> Result<Option<usize>> {
    if candidates.is_empty() {
        return Ok(None);
    }
    let mut best_index = 0;
    let mut best_value = candidates[0].field_scalar(field)?;
    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        let value = candidate.field_scalar(field)?;
        if better(value, best_value) {
            best_value = value;
            best_index = index;
        }
    }
    Ok(Some(best_index))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);
    impl SelectorCandidate for Fixed {
        fn field_scalar(&self, _field: &str) -> Result<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn max_field_value_picks_largest() {
        let a = Fixed(1.0);
        let b = Fixed(5.0);
        let c = Fixed(3.0);
        let candidates: Vec<&dyn SelectorCandidate> = vec![&a, &b, &c];
        let index = max_field_value(&candidates, "mass").unwrap();
        assert_eq!(index, Some(1));
    }

    #[test]
    fn min_field_value_picks_smallest() {
        let a = Fixed(1.0);
        let b = Fixed(5.0);
        let c = Fixed(3.0);
        let candidates: Vec<&dyn SelectorCandidate> = vec![&a, &b, &c];
        let index = min_field_value(&candidates, "mass").unwrap();
        assert_eq!(index, Some(0));
    }

    #[test]
    fn ties_break_toward_first_occurrence() {
        let a = Fixed(2.0);
        let b = Fixed(2.0);
        let candidates: Vec<&dyn SelectorCandidate> = vec![&a, &b];
        assert_eq!(max_field_value(&candidates, "mass").unwrap(), Some(0));
    }

    #[test]
    fn empty_candidates_returns_none() {
        let candidates: Vec<&dyn SelectorCandidate> = vec![];
        assert_eq!(max_field_value(&candidates, "mass").unwrap(), None);
    }

    #[test]
    fn registry_resolves_defaults_and_rejects_unknown() {
        let registry = SelectorRegistry::new();
        assert!(registry.get("max_field_value").is_ok());
        assert!(registry.get("min_field_value").is_ok());
        assert!(registry.get("nonexistent").is_err());
    }
}
