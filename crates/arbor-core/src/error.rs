//! Error types shared across the Arbor workspace.
//!
//! Organized by subsystem: tree structure, module execution, the time
//! grid, and the source/sink/parameter boundaries. Per-crate errors
//! (arena, catalog compilation, pipeline activation) live with their
//! subsystems and wrap or carry these where they compose.

use crate::id::{HaloIdx, SnapNum};
use std::error::Error;
use std::fmt;

/// Structural inconsistencies in a loaded merger tree.
///
/// All variants are fatal for the tree they occur in and must never
/// corrupt state for other trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeStructureError {
    /// A progenitor chain revisits a halo.
    ProgenitorCycle {
        /// The halo at which the cycle was detected.
        halo: HaloIdx,
    },
    /// A group membership chain revisits a halo.
    GroupCycle {
        /// The halo at which the cycle was detected.
        halo: HaloIdx,
    },
    /// A structural link points outside the tree's halo slice.
    LinkOutOfRange {
        /// The halo carrying the bad link.
        halo: HaloIdx,
        /// Which link was out of range ("descendant", "first_progenitor", ...).
        link: &'static str,
        /// The out-of-range target index.
        target: HaloIdx,
    },
    /// A descendant does not live at a strictly later snapshot.
    DescendantNotLater {
        /// The progenitor halo.
        halo: HaloIdx,
        /// Its descendant.
        descendant: HaloIdx,
    },
    /// A halo's group chain does not lead back to its declared group root.
    StrandedHalo {
        /// The stranded halo.
        halo: HaloIdx,
    },
}

impl fmt::Display for TreeStructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgenitorCycle { halo } => {
                write!(f, "progenitor chain cycles at halo {halo}")
            }
            Self::GroupCycle { halo } => {
                write!(f, "group chain cycles at halo {halo}")
            }
            Self::LinkOutOfRange { halo, link, target } => {
                write!(f, "halo {halo}: {link} link targets out-of-range halo {target}")
            }
            Self::DescendantNotLater { halo, descendant } => {
                write!(
                    f,
                    "halo {halo}: descendant {descendant} is not at a later snapshot"
                )
            }
            Self::StrandedHalo { halo } => {
                write!(f, "halo {halo} is not reachable from its group root")
            }
        }
    }
}

impl Error for TreeStructureError {}

/// Errors returned by a physics module's entry points.
///
/// Wrapped by the pipeline with the failing module's name; a `process`
/// failure aborts the current tree, an `init` failure aborts startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleError {
    /// The module's computation failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The module needs a property the catalog does not define.
    MissingProperty {
        /// The missing property's name.
        property: String,
    },
    /// An entry point was invoked in the wrong lifecycle phase.
    InvalidState {
        /// Description of the phase mismatch.
        reason: String,
    },
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::MissingProperty { property } => {
                write!(f, "property '{property}' is not defined in the catalog")
            }
            Self::InvalidState { reason } => write!(f, "invalid state: {reason}"),
        }
    }
}

impl Error for ModuleError {}

/// Errors from the time grid.
#[derive(Clone, Debug, PartialEq)]
pub enum TimeError {
    /// The snapshot redshift list was empty.
    EmptySnapshotList,
    /// A redshift value was non-finite or not greater than -1.
    InvalidRedshift {
        /// Position in the snapshot list.
        index: usize,
        /// The offending value.
        value: f64,
    },
    /// Redshifts must strictly decrease with snapshot number.
    NotDescending {
        /// Position of the offending entry.
        index: usize,
        /// The offending value.
        value: f64,
        /// The preceding value it failed to descend below.
        previous: f64,
    },
    /// A snapshot number outside the grid.
    UnknownSnapshot {
        /// The unknown snapshot.
        snap: SnapNum,
    },
    /// An elapsed-time query did not yield a strictly positive result.
    NonPositiveElapsed {
        /// The progenitor snapshot.
        from: SnapNum,
        /// The descendant snapshot.
        to: SnapNum,
        /// The non-positive elapsed value, for diagnostics.
        elapsed: f64,
    },
}

impl fmt::Display for TimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySnapshotList => write!(f, "snapshot redshift list is empty"),
            Self::InvalidRedshift { index, value } => {
                write!(f, "snapshot {index}: invalid redshift {value}")
            }
            Self::NotDescending {
                index,
                value,
                previous,
            } => {
                write!(
                    f,
                    "snapshot {index}: redshift {value} does not descend below {previous}"
                )
            }
            Self::UnknownSnapshot { snap } => write!(f, "snapshot {snap} is not in the time grid"),
            Self::NonPositiveElapsed { from, to, elapsed } => {
                write!(
                    f,
                    "elapsed time from snapshot {from} to {to} is {elapsed}, expected > 0"
                )
            }
        }
    }
}

impl Error for TimeError {}

/// Errors from a tree source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceError {
    /// The source could not be read.
    Unavailable {
        /// Description of the I/O-level failure.
        reason: String,
    },
    /// The requested tree index does not exist.
    UnknownTree {
        /// The requested index.
        index: usize,
    },
    /// The tree's raw records could not be decoded.
    Malformed {
        /// The tree index.
        index: usize,
        /// Description of the decoding failure.
        reason: String,
    },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "tree source unavailable: {reason}"),
            Self::UnknownTree { index } => write!(f, "no tree at index {index}"),
            Self::Malformed { index, reason } => {
                write!(f, "tree {index} is malformed: {reason}")
            }
        }
    }
}

impl Error for SourceError {}

/// Errors from an output sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkError {
    /// The sink rejected a record.
    Rejected {
        /// Description of the rejection.
        reason: String,
    },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "output sink rejected record: {reason}"),
        }
    }
}

impl Error for SinkError {}

/// A module parameter that could not be parsed to its expected type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterError {
    /// The module namespace the parameter belongs to.
    pub module: String,
    /// The parameter key.
    pub key: String,
    /// The raw string value that failed to parse.
    pub value: String,
    /// The expected type name.
    pub expected: &'static str,
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter {}.{} = '{}' is not a valid {}",
            self.module, self.key, self.value, self.expected
        )
    }
}

impl Error for ParameterError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_errors_name_the_halo() {
        let err = TreeStructureError::LinkOutOfRange {
            halo: HaloIdx(3),
            link: "descendant",
            target: HaloIdx(99),
        };
        let msg = format!("{err}");
        assert!(msg.contains('3') && msg.contains("descendant") && msg.contains("99"));
    }

    #[test]
    fn parameter_error_names_module_and_key() {
        let err = ParameterError {
            module: "cooling".into(),
            key: "efficiency".into(),
            value: "fast".into(),
            expected: "f64",
        };
        let msg = format!("{err}");
        assert!(msg.contains("cooling.efficiency") && msg.contains("fast"));
    }
}
