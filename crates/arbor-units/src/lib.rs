//! # arbor-units
//!
//! Value-plus-unit scalars and arrays with conversion and dimensional
//! checks. Two units are a live registry entry rather than a fixed
//! conversion factor: `"h"` (the Hubble parameter) and `"unitary"`
//! (fraction of the simulation box), both updated once when an arbor
//! reads them out of a catalog header. Length units additionally get an
//! automatic comoving variant (`"Mpccm"`, `"kpccm"`, ...).

mod atom;
mod quantity;
mod registry;
mod unit;

pub use quantity::{Scalar, UnitArray};
pub use registry::{UnitRegistry, UnitRegistryJson};
pub use unit::Unit;
