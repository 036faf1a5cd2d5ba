//! Field descriptor records.

use arbor_units::Unit;
use serde::{Deserialize, Serialize};

/// The storage type of a field's raw values. Vector fields are stored as
/// three parallel scalar columns plus a derived (N, 3) accessor; this enum
/// only describes the scalar element width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    F64,
    I64,
}

impl Default for Dtype {
    fn default() -> Self {
        Dtype::F64
    }
}

/// Where an on-disk field's raw bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSourceKind {
    File,
    Header,
    ArborGenerated,
}

/// `kind` categorizes how a field's values are produced; `alias`/`derived`
/// fields record their dependencies instead of a storage source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    OnDisk { source: FieldSourceKind },
    Alias,
    Derived { vector: bool },
    Analysis,
    AnalysisSaved,
}

impl FieldKind {
    pub fn is_generated(&self) -> bool {
        matches!(
            self,
            FieldKind::Alias | FieldKind::Derived { .. } | FieldKind::Analysis | FieldKind::AnalysisSaved
        )
    }

    pub fn is_settable(&self) -> bool {
        matches!(self, FieldKind::Analysis | FieldKind::AnalysisSaved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::OnDisk { .. } => "on-disk",
            FieldKind::Alias => "alias",
            FieldKind::Derived { .. } => "derived",
            FieldKind::Analysis => "analysis",
            FieldKind::AnalysisSaved => "analysis_saved",
        }
    }
}

/// `{ name, units, dtype, kind, source, deps[], vector_components[]?, default?, description? }`
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub units: Unit,
    pub dtype: Dtype,
    pub kind: FieldKind,
    pub deps: Vec<String>,
    pub aliases: Vec<String>,
    pub vector_components: Option<[String; 3]>,
    pub default: f64,
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn on_disk(name: impl Into<String>, units: Unit, source: FieldSourceKind) -> Self {
        FieldDescriptor {
            name: name.into(),
            units,
            dtype: Dtype::F64,
            kind: FieldKind::OnDisk { source },
            deps: Vec::new(),
            aliases: Vec::new(),
            vector_components: None,
            default: 0.0,
            description: None,
        }
    }
}
