//! Per-tree evolution errors.

use arbor_arena::ArenaError;
use arbor_catalog::SpecError;
use arbor_core::{SinkError, TimeError, TreeId, TreeStructureError};
use arbor_module::PipelineError;
use std::error::Error;
use std::fmt;

/// A failure that aborted the processing of one tree.
///
/// Carries the tree identifier; the underlying kind carries the
/// snapshot/halo/module specifics. The engine closes the tree's region
/// on the way out and may continue with the next tree.
#[derive(Debug)]
pub struct EvolveError {
    /// The tree that was aborted.
    pub tree: TreeId,
    /// What went wrong.
    pub kind: EvolveErrorKind,
}

impl fmt::Display for EvolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree {}: {}", self.tree, self.kind)
    }
}

impl Error for EvolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.kind)
    }
}

/// The specific failure underneath an [`EvolveError`].
#[derive(Debug)]
pub enum EvolveErrorKind {
    /// The tree's structural links are inconsistent.
    Structure(TreeStructureError),
    /// A region allocation failed (budget exhausted).
    Allocation(ArenaError),
    /// A module failed during group processing.
    Pipeline(PipelineError),
    /// An init or output plan failed to execute.
    Plan(SpecError),
    /// A snapshot pair produced an invalid elapsed time.
    Time(TimeError),
    /// The output sink rejected a record.
    Sink(SinkError),
}

impl fmt::Display for EvolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structure(e) => write!(f, "malformed tree: {e}"),
            Self::Allocation(e) => write!(f, "allocation failed: {e}"),
            Self::Pipeline(e) => write!(f, "{e}"),
            Self::Plan(e) => write!(f, "property plan failed: {e}"),
            Self::Time(e) => write!(f, "time grid: {e}"),
            Self::Sink(e) => write!(f, "{e}"),
        }
    }
}

impl Error for EvolveErrorKind {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Structure(e) => Some(e),
            Self::Allocation(e) => Some(e),
            Self::Pipeline(e) => Some(e),
            Self::Plan(e) => Some(e),
            Self::Time(e) => Some(e),
            Self::Sink(e) => Some(e),
        }
    }
}

impl From<TreeStructureError> for EvolveErrorKind {
    fn from(e: TreeStructureError) -> Self {
        Self::Structure(e)
    }
}

impl From<ArenaError> for EvolveErrorKind {
    fn from(e: ArenaError) -> Self {
        Self::Allocation(e)
    }
}

impl From<PipelineError> for EvolveErrorKind {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<SpecError> for EvolveErrorKind {
    fn from(e: SpecError) -> Self {
        Self::Plan(e)
    }
}

impl From<TimeError> for EvolveErrorKind {
    fn from(e: TimeError) -> Self {
        Self::Time(e)
    }
}

impl From<SinkError> for EvolveErrorKind {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

/// Errors constructing a [`TreeEvolver`](crate::evolve::TreeEvolver).
///
/// Startup-time: the catalog handed in does not contain the core halo
/// fields, meaning it was not built from
/// [`core_halo_descriptors`](crate::properties::core_halo_descriptors).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetupError {
    /// A core halo field is missing from the catalog.
    MissingCoreField {
        /// The missing field's name.
        field: &'static str,
    },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCoreField { field } => {
                write!(f, "catalog lacks core halo field '{field}'")
            }
        }
    }
}

impl Error for SetupError {}
