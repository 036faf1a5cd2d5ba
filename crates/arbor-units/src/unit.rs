//! Unit expression parsing, composition, and dimensional equivalence.

use crate::atom::{self, Dimension, DIMENSIONLESS};
use arbor_error::{Error, Result};
use std::fmt;

/// A parsed unit expression: a product of atoms raised to integer powers.
///
/// Parsed from strings like `"Msun/h"`, `"km/s"`, `"Mpccm/h"`, `"g*cm**2/s**2"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    terms: Vec<(String, i32)>,
}

impl Unit {
    /// The dimensionless unit.
    pub fn dimensionless() -> Self {
        Unit { terms: Vec::new() }
    }

    /// Parse a unit expression string.
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() || expr == "dimensionless" || expr == "none" {
            return Ok(Self::dimensionless());
        }

        let mut terms: Vec<(String, i32)> = Vec::new();
        let mut groups = expr.split('/');
        let numerator = groups.next().unwrap();
        parse_group(numerator, 1, &mut terms)?;
        for denom in groups {
            parse_group(denom, -1, &mut terms)?;
        }

        // Validate every atom resolves, so malformed units fail at parse time.
        for (name, _) in &terms {
            if atom::lookup(name).is_none() {
                return Err(Error::unit_parse(expr));
            }
        }

        Ok(Unit { terms })
    }

    /// This unit's dimension vector, summing each atom's dimension times its exponent.
    pub fn dimension(&self) -> Dimension {
        let mut dim = DIMENSIONLESS;
        for (name, exp) in &self.terms {
            if let Some(info) = atom::lookup(name) {
                for i in 0..5 {
                    dim[i] += info.dimension[i] * exp;
                }
            }
        }
        dim
    }

    /// Whether two units describe the same physical quantity (same dimension
    /// vector, including the pseudo-dimensions for `h` and `unitary`).
    pub fn is_equivalent(&self, other: &Unit) -> bool {
        self.dimension() == other.dimension()
    }

    /// Multiply this unit by another, combining exponents of shared atoms.
    pub fn mul(&self, other: &Unit) -> Unit {
        let mut terms = self.terms.clone();
        for (name, exp) in &other.terms {
            merge_term(&mut terms, name, *exp);
        }
        Unit { terms }
    }

    /// Divide this unit by another.
    pub fn div(&self, other: &Unit) -> Unit {
        let mut terms = self.terms.clone();
        for (name, exp) in &other.terms {
            merge_term(&mut terms, name, -exp);
        }
        Unit { terms }
    }

    pub(crate) fn terms(&self) -> &[(String, i32)] {
        &self.terms
    }

    pub fn is_dimensionless(&self) -> bool {
        self.terms.iter().all(|(_, e)| *e == 0)
    }
}

fn merge_term(terms: &mut Vec<(String, i32)>, name: &str, exp: i32) {
    if exp == 0 {
        return;
    }
    if let Some(entry) = terms.iter_mut().find(|(n, _)| n == name) {
        entry.1 += exp;
        if entry.1 == 0 {
            terms.retain(|(_, e)| *e != 0);
        }
    } else {
        terms.push((name.to_string(), exp));
    }
}

fn parse_group(group: &str, sign: i32, terms: &mut Vec<(String, i32)>) -> Result<()> {
    let group = group.trim();
    if group.is_empty() {
        return Ok(());
    }
    for atom_expr in group.split('*') {
        let atom_expr = atom_expr.trim();
        if atom_expr.is_empty() {
            continue;
        }
        let (name, exp) = if let Some((base, power)) = atom_expr.split_once("**") {
            let power: i32 = power
                .trim()
                .parse()
                .map_err(|_| Error::unit_parse(atom_expr))?;
            (base.trim(), power)
        } else {
            (atom_expr, 1)
        };
        merge_term(terms, name, sign * exp);
    }
    Ok(())
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "dimensionless");
        }
        let (pos, neg): (Vec<_>, Vec<_>) = self.terms.iter().partition(|(_, e)| *e > 0);
        let fmt_term = |(name, exp): &(String, i32)| {
            let exp = exp.abs();
            if exp == 1 {
                name.clone()
            } else {
                format!("{}**{}", name, exp)
            }
        };
        let num = if pos.is_empty() {
            "1".to_string()
        } else {
            pos.iter().map(|t| fmt_term(t)).collect::<Vec<_>>().join("*")
        };
        write!(f, "{}", num)?;
        for term in &neg {
            write!(f, "/{}", fmt_term(term))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_atom() {
        let u = Unit::parse("Msun").unwrap();
        assert_eq!(u.dimension(), [0, 1, 0, 0, 0]);
    }

    #[test]
    fn parses_hubble_suffix() {
        let u = Unit::parse("Msun/h").unwrap();
        assert_eq!(u.dimension(), [0, 1, 0, -1, 0]);
        assert!(!u.is_equivalent(&Unit::parse("Msun").unwrap()));
    }

    #[test]
    fn parses_compound_velocity() {
        let u = Unit::parse("km/s").unwrap();
        let v = Unit::parse("km").unwrap().div(&Unit::parse("s").unwrap());
        assert_eq!(u.dimension(), v.dimension());
    }

    #[test]
    fn rejects_unknown_atom() {
        assert!(Unit::parse("frobnicate").is_err());
    }

    #[test]
    fn comoving_length_dimension_matches_physical_length() {
        let comoving = Unit::parse("Mpccm").unwrap();
        let physical = Unit::parse("Mpc").unwrap();
        assert!(comoving.is_equivalent(&physical));
    }

    #[test]
    fn mul_div_round_trip() {
        let mass = Unit::parse("Msun").unwrap();
        let time = Unit::parse("s").unwrap();
        let combined = mass.div(&time).mul(&time);
        assert_eq!(combined.dimension(), mass.dimension());
    }
}
