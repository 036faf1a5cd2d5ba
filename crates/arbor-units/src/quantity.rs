//! Value-plus-unit scalars and arrays.

use crate::registry::UnitRegistry;
use crate::unit::Unit;
use arbor_error::Result;

/// A single value with an attached unit.
#[derive(Debug, Clone)]
pub struct Scalar {
    pub value: f64,
    pub unit: Unit,
}

impl Scalar {
    pub fn new(value: f64, unit: Unit) -> Self {
        Scalar { value, unit }
    }

    /// Convert to a target unit string, given a registry to resolve live factors.
    pub fn convert_to(&self, target: &str, registry: &UnitRegistry) -> Result<Scalar> {
        let target_unit = Unit::parse(target)?;
        let factor = registry.conversion_factor(&self.unit, &target_unit)?;
        Ok(Scalar::new(self.value * factor, target_unit))
    }
}

/// A 1-D array of values sharing one unit — the representation used for
/// every on-disk, alias, derived, and analysis field column.
#[derive(Debug, Clone)]
pub struct UnitArray {
    pub values: Vec<f64>,
    pub unit: Unit,
}

impl UnitArray {
    pub fn new(values: Vec<f64>, unit: Unit) -> Self {
        UnitArray { values, unit }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert every element to a target unit, given a registry to resolve
    /// live factors (`h`, `unitary`, comoving length).
    pub fn convert_to(&self, target: &str, registry: &UnitRegistry) -> Result<UnitArray> {
        let target_unit = Unit::parse(target)?;
        let factor = registry.conversion_factor(&self.unit, &target_unit)?;
        let values = self.values.iter().map(|v| v * factor).collect();
        Ok(UnitArray::new(values, target_unit))
    }

    /// Build a (N, 3) vector field's magnitude column, used by the
    /// x/y/z-component vector-field convention.
    pub fn magnitude_of(components: &[&UnitArray]) -> UnitArray {
        debug_assert_eq!(components.len(), 3);
        let n = components[0].len();
        let unit = components[0].unit.clone();
        let values = (0..n)
            .map(|i| {
                components
                    .iter()
                    .map(|c| c.values[i].powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .collect();
        UnitArray::new(values, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_conversion_applies_hubble_factor() {
        let registry = UnitRegistry::new();
        registry.set_hubble_constant(0.7);
        let mass = Scalar::new(10.0, Unit::parse("Msun/h").unwrap());
        let converted = mass.convert_to("Msun", &registry).unwrap();
        assert!((converted.value - 10.0 / 0.7).abs() < 1e-9);
    }

    #[test]
    fn array_conversion_is_elementwise() {
        let registry = UnitRegistry::new();
        let arr = UnitArray::new(vec![1.0, 2.0, 3.0], Unit::parse("Mpc").unwrap());
        let converted = arr.convert_to("kpc", &registry).unwrap();
        assert_eq!(converted.values, vec![1000.0, 2000.0, 3000.0]);
    }

    #[test]
    fn magnitude_matches_euclidean_norm() {
        let x = UnitArray::new(vec![3.0], Unit::parse("Mpc").unwrap());
        let y = UnitArray::new(vec![4.0], Unit::parse("Mpc").unwrap());
        let z = UnitArray::new(vec![0.0], Unit::parse("Mpc").unwrap());
        let mag = UnitArray::magnitude_of(&[&x, &y, &z]);
        assert!((mag.values[0] - 5.0).abs() < 1e-12);
    }
}
