//! # arbor-core
//!
//! In-memory forest/tree/halo data model for the arbor engine: the `Arbor`
//! container, `TreeNode` handles, the field and selector registries, the
//! `select` predicate evaluator, the `node_io_loop` substrate shared by
//! reading and writing, and the `DataFile`/backend-registry dispatch
//! contract every on-disk dialect implements.
//!
//! A root/non-root split replaces the donor Python's weak-reference
//! lifecycle sentinels: the `Arbor` owns every data file and every root's
//! materialized arrays; a `TreeNode` never owns storage, it only names a
//! root and a position within that root's arrays.

mod arbor;
mod backend_registry;
mod container;
mod datafile;
mod detector;
mod field;
mod field_registry;
mod link;
mod node;
mod node_io;
mod select;
mod selector;
mod test_support;

pub use arbor::{Arbor, Planter, RootDescriptor};
pub use backend_registry::{BackendRegistry, DataFileConstructor, HeaderScan};
pub use container::NodeContainer;
pub use datafile::{DataFile, DataFileProbe, HeaderValue, Locator, Selection};
pub use detector::{DerivedFieldFn, FieldAccess, FieldDetector};
pub use field::{Dtype, FieldDescriptor, FieldKind, FieldSourceKind};
pub use field_registry::FieldRegistry;
pub use link::{grow_links, NodeLink, TreeId};
pub use node::{Scope, TreeNode};
pub use node_io::node_io_loop;
pub use select::Predicate;
pub use selector::{SelectorCandidate, SelectorFn, SelectorRegistry};
pub use test_support::test_data_dir;
