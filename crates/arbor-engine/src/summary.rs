//! Run summaries.

use arbor_arena::RegionReport;
use arbor_core::SourceError;
use arbor_forest::{EvolveError, TreeOutcome};
use arbor_module::CleanupFailure;
use std::fmt;

/// One tree that did not finish.
#[derive(Debug)]
pub struct TreeFailure {
    /// Index of the tree in the source's order.
    pub index: usize,
    /// What stopped it.
    pub error: FailureCause,
}

/// Why a tree failed.
#[derive(Debug)]
pub enum FailureCause {
    /// The source could not produce the tree.
    Source(SourceError),
    /// Evolution aborted mid-tree.
    Evolve(EvolveError),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "{e}"),
            Self::Evolve(e) => write!(f, "{e}"),
        }
    }
}

/// Aggregate outcome of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Per-tree outcomes, in processing order.
    pub processed: Vec<TreeOutcome>,
    /// Trees that failed, with their causes.
    pub failures: Vec<TreeFailure>,
    /// Module cleanup failures, surfaced as warnings.
    pub cleanup_warnings: Vec<CleanupFailure>,
    /// Memory accounting summed over all processed trees.
    pub memory: RegionReport,
}

impl RunSummary {
    /// Number of trees fully processed.
    pub fn trees_processed(&self) -> usize {
        self.processed.len()
    }

    /// Total output records emitted.
    pub fn records_emitted(&self) -> usize {
        self.processed.iter().map(|o| o.records).sum()
    }

    /// Whether every tree finished and every cleanup succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.cleanup_warnings.is_empty()
    }

    pub(crate) fn record(&mut self, outcome: TreeOutcome) {
        self.memory.absorb(&outcome.report);
        self.processed.push(outcome);
    }
}
