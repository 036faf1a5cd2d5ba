//! # arbor-formats
//!
//! On-disk dialect backends for the arbor engine: eight concrete
//! `DataFile`/`Planter` pairs plus one dispatcher (`load`) that picks among
//! them by sniffing, mirroring how the original ytree package resolves a
//! frontend from a bare file path.

mod canonical;
mod columns;
mod forest_pack;
mod hlist_style;
mod inline_pack;
mod registry;
mod snapshot_backward;
mod snapshot_common;
mod snapshot_forward;
mod text_tree;
mod text_tree_grouped;

pub use canonical::{open as open_canonical, Probe as CanonicalProbe, DIALECT as CANONICAL_DIALECT};
pub use forest_pack::{open as open_forest_pack, Probe as ForestPackProbe, DIALECT as FOREST_PACK_DIALECT};
pub use hlist_style::{open as open_hlist_style, Probe as HlistStyleProbe, DIALECT as HLIST_STYLE_DIALECT};
pub use inline_pack::{open as open_inline_pack, Probe as InlinePackProbe, DIALECT as INLINE_PACK_DIALECT};
pub use registry::load;
pub use snapshot_backward::{open as open_snapshot_backward, Probe as SnapshotBackwardProbe, DIALECT as SNAPSHOT_BACKWARD_DIALECT};
pub use snapshot_forward::{open as open_snapshot_forward, Probe as SnapshotForwardProbe, DIALECT as SNAPSHOT_FORWARD_DIALECT};
pub use text_tree::{open as open_text_tree, Probe as TextTreeProbe, DIALECT as TEXT_TREE_DIALECT};
pub use text_tree_grouped::{open as open_text_tree_grouped, Probe as TextTreeGroupedProbe, DIALECT as TEXT_TREE_GROUPED_DIALECT};
