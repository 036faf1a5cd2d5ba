//! The base-unit table: every atom the parser recognizes, its dimension
//! vector, and its conversion factor into cgs.
//!
//! Dimension vector order is `[length, mass, time, hubble, unitary]`. The
//! last two track powers of the live `"h"` and `"unitary"` pseudo-units so
//! that `Msun/h` and `Msun` are NOT considered dimensionally equivalent
//! (their `h` exponent differs) even though both describe a mass.

pub type Dimension = [i32; 5];

pub const DIMENSIONLESS: Dimension = [0, 0, 0, 0, 0];

/// A fixed conversion factor into cgs, or a marker that the factor is
/// supplied at runtime by the registry (for "h", "unitary", and the
/// comoving length suffixes, which depend on values read from a catalog
/// header).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Factor {
    Fixed(f64),
    Hubble,
    Unitary,
    /// Comoving length atom; factor is `base_cgs * scale_factor`.
    ComovingLength(f64),
}

pub struct AtomInfo {
    pub dimension: Dimension,
    pub factor: Factor,
}

/// Look up a base atom by exact name. Comoving length atoms (`Mpccm`,
/// `kpccm`, ...) are synthesized on the fly from the plain length atoms,
/// matching the spec's "the 'cm' suffix is registered automatically for
/// length units" rule.
pub fn lookup(name: &str) -> Option<AtomInfo> {
    if name.is_empty() {
        return Some(AtomInfo {
            dimension: DIMENSIONLESS,
            factor: Factor::Fixed(1.0),
        });
    }

    if let Some(info) = fixed_atom(name) {
        return Some(info);
    }

    if let Some(base) = name.strip_suffix("cm") {
        if let Some(AtomInfo {
            dimension,
            factor: Factor::Fixed(f),
        }) = fixed_atom(base)
        {
            if dimension == [1, 0, 0, 0, 0] {
                return Some(AtomInfo {
                    dimension,
                    factor: Factor::ComovingLength(f),
                });
            }
        }
    }

    match name {
        "h" => Some(AtomInfo {
            dimension: [0, 0, 0, 1, 0],
            factor: Factor::Hubble,
        }),
        "unitary" => Some(AtomInfo {
            dimension: [1, 0, 0, 0, 1],
            factor: Factor::Unitary,
        }),
        _ => None,
    }
}

fn fixed_atom(name: &str) -> Option<AtomInfo> {
    let (dimension, cgs): (Dimension, f64) = match name {
        "cm" => ([1, 0, 0, 0, 0], 1.0),
        "m" => ([1, 0, 0, 0, 0], 1.0e2),
        "km" => ([1, 0, 0, 0, 0], 1.0e5),
        "pc" => ([1, 0, 0, 0, 0], 3.085_677_581_491_367e18),
        "kpc" => ([1, 0, 0, 0, 0], 3.085_677_581_491_367e21),
        "Mpc" => ([1, 0, 0, 0, 0], 3.085_677_581_491_367e24),
        "Gpc" => ([1, 0, 0, 0, 0], 3.085_677_581_491_367e27),
        "g" => ([0, 1, 0, 0, 0], 1.0),
        "kg" => ([0, 1, 0, 0, 0], 1.0e3),
        "Msun" => ([0, 1, 0, 0, 0], 1.988_92e33),
        "s" => ([0, 0, 1, 0, 0], 1.0),
        "yr" => ([0, 0, 1, 0, 0], 3.155_76e7),
        "Myr" => ([0, 0, 1, 0, 0], 3.155_76e13),
        "Gyr" => ([0, 0, 1, 0, 0], 3.155_76e16),
        "km/s" => ([1, 0, -1, 0, 0], 1.0e5),
        "none" | "dimensionless" => (DIMENSIONLESS, 1.0),
        _ => return None,
    };
    Some(AtomInfo {
        dimension,
        factor: Factor::Fixed(cgs),
    })
}
