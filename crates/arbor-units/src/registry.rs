//! The live unit registry: `"h"` and `"unitary"` are not fixed conversion
//! factors, they are updated once the arbor reads `hubble_constant` and
//! `box_size` from a catalog header, and everything parsed against the
//! registry before or after that update converts correctly.

use crate::atom::{self, Factor};
use crate::unit::Unit;
use arbor_error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Snapshot of the registry's live values, serializable as the
/// `unit_registry_json` header attribute of the canonical format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitRegistryJson {
    pub hubble_constant: Option<f64>,
    pub box_size_cm: Option<f64>,
    pub scale_factor: Option<f64>,
}

/// Holds the values `"h"`, `"unitary"`, and comoving-length atoms resolve
/// against. Updated once at header-parse time, then read-only.
pub struct UnitRegistry {
    hubble_constant: RwLock<Option<f64>>,
    box_size_cm: RwLock<Option<f64>>,
    scale_factor: RwLock<Option<f64>>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    pub fn new() -> Self {
        UnitRegistry {
            hubble_constant: RwLock::new(None),
            box_size_cm: RwLock::new(None),
            scale_factor: RwLock::new(None),
        }
    }

    pub fn set_hubble_constant(&self, h: f64) {
        *self.hubble_constant.write() = Some(h);
    }

    pub fn set_box_size_cm(&self, cm: f64) {
        *self.box_size_cm.write() = Some(cm);
    }

    pub fn set_scale_factor(&self, a: f64) {
        *self.scale_factor.write() = Some(a);
    }

    pub fn hubble_constant(&self) -> Option<f64> {
        *self.hubble_constant.read()
    }

    pub fn box_size_cm(&self) -> Option<f64> {
        *self.box_size_cm.read()
    }

    /// Resolve a unit's overall multiplicative factor into cgs, given the
    /// registry's currently-live values.
    pub fn cgs_factor(&self, unit: &Unit) -> Result<f64> {
        let mut total = 1.0;
        for (name, exp) in unit.terms() {
            let info = atom::lookup(name).ok_or_else(|| Error::unit_parse(name.clone()))?;
            let base = match info.factor {
                Factor::Fixed(f) => f,
                Factor::Hubble => self
                    .hubble_constant
                    .read()
                    .ok_or_else(|| Error::unit_parse("h (hubble_constant not yet set)"))?,
                Factor::Unitary => self
                    .box_size_cm
                    .read()
                    .ok_or_else(|| Error::unit_parse("unitary (box_size not yet set)"))?,
                Factor::ComovingLength(base_cgs) => {
                    let a = self.scale_factor.read().unwrap_or(1.0);
                    base_cgs * a
                }
            };
            total *= base.powi(*exp);
        }
        Ok(total)
    }

    /// Multiplicative conversion factor from `from` to `to`; both must be
    /// dimensionally equivalent.
    pub fn conversion_factor(&self, from: &Unit, to: &Unit) -> Result<f64> {
        if !from.is_equivalent(to) {
            return Err(Error::unit_parse(format!("{} -> {}", from, to)));
        }
        Ok(self.cgs_factor(from)? / self.cgs_factor(to)?)
    }

    pub fn to_json(&self) -> UnitRegistryJson {
        UnitRegistryJson {
            hubble_constant: self.hubble_constant(),
            box_size_cm: self.box_size_cm(),
            scale_factor: *self.scale_factor.read(),
        }
    }

    pub fn from_json(snapshot: &UnitRegistryJson) -> Self {
        let registry = Self::new();
        if let Some(h) = snapshot.hubble_constant {
            registry.set_hubble_constant(h);
        }
        if let Some(b) = snapshot.box_size_cm {
            registry.set_box_size_cm(b);
        }
        if let Some(a) = snapshot.scale_factor {
            registry.set_scale_factor(a);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hubble_conversion_updates_after_header_read() {
        let registry = UnitRegistry::new();
        let msun_per_h = Unit::parse("Msun/h").unwrap();
        let msun = Unit::parse("Msun").unwrap();

        registry.set_hubble_constant(0.7);
        let factor = registry.conversion_factor(&msun_per_h, &msun).unwrap();
        // 1 Msun/h = (1/h) Msun = (1/0.7) Msun
        assert!((factor - (1.0 / 0.7)).abs() < 1e-12);
    }

    #[test]
    fn unresolved_hubble_constant_errors() {
        let registry = UnitRegistry::new();
        let msun_per_h = Unit::parse("Msun/h").unwrap();
        assert!(registry.cgs_factor(&msun_per_h).is_err());
    }

    #[test]
    fn json_round_trip_preserves_live_values() {
        let registry = UnitRegistry::new();
        registry.set_hubble_constant(0.6774);
        registry.set_box_size_cm(1.0e27);
        let snapshot = registry.to_json();
        let reloaded = UnitRegistry::from_json(&snapshot);
        assert_eq!(reloaded.hubble_constant(), Some(0.6774));
        assert_eq!(reloaded.box_size_cm(), Some(1.0e27));
    }
}
