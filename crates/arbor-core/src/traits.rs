//! Boundary traits: tree sources, output sinks, and parameter sources.
//!
//! These are the complete contracts with the excluded I/O and
//! configuration subsystems. The engine consumes trees through
//! [`TreeSource`], produces finalized records through [`OutputSink`],
//! and reads configuration through [`ParameterSource`]; on-disk formats
//! never appear in the core.

use crate::error::{ParameterError, SinkError, SourceError};
use crate::id::{SnapNum, TreeId};
use crate::property::OutputRecord;
use crate::raw::RawHalo;

/// One loaded merger tree: its identity and raw halo records.
#[derive(Clone, Debug)]
pub struct TreeData {
    /// Source-stable identity of the tree.
    pub tree_id: TreeId,
    /// All halos of the tree, across all snapshots. Structural links
    /// index into this slice.
    pub halos: Vec<RawHalo>,
}

/// Yields merger trees in a stable, repeatable order.
///
/// Implementations must return the same trees in the same order for a
/// given input across repeated runs; determinism of the whole
/// simulation depends on it. `Sync` so the parallel runner can share
/// one source across workers.
pub trait TreeSource: Sync {
    /// Number of trees available.
    fn tree_count(&self) -> usize;

    /// Load the raw records of one tree.
    fn load_tree(&self, index: usize) -> Result<TreeData, SourceError>;
}

/// Accepts finalized output records.
///
/// The engine calls [`accept`](OutputSink::accept) exactly once per
/// working halo per snapshot it finalizes, in traversal order, and
/// never twice for the same (tree, snapshot, working halo) triple.
/// Working halos are identified by their galaxy tag: an orphan shares
/// its host's raw halo index but remains a distinct record.
pub trait OutputSink {
    /// Accept one finalized record.
    fn accept(
        &mut self,
        tree: TreeId,
        snap: SnapNum,
        record: OutputRecord,
    ) -> Result<(), SinkError>;
}

/// Read-only key/value configuration for module activation and
/// module-namespaced parameters.
///
/// The core only ever asks three questions: is module X active, in what
/// order, and what is parameter Y for module X. Typed accessors parse
/// on demand and fall back to the caller's default when the key is
/// absent.
pub trait ParameterSource {
    /// Names of active modules in declared execution order.
    fn active_modules(&self) -> &[String];

    /// Raw string value of a module-namespaced parameter, if set.
    fn parameter(&self, module: &str, key: &str) -> Option<&str>;

    /// Whether a module appears in the active list.
    fn is_active(&self, module: &str) -> bool {
        self.active_modules().iter().any(|m| m == module)
    }

    /// A parameter parsed as `f64`, or `default` when absent.
    fn parameter_f64(
        &self,
        module: &str,
        key: &str,
        default: f64,
    ) -> Result<f64, ParameterError> {
        match self.parameter(module, key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ParameterError {
                module: module.to_string(),
                key: key.to_string(),
                value: raw.to_string(),
                expected: "f64",
            }),
        }
    }

    /// A parameter parsed as `i64`, or `default` when absent.
    fn parameter_i64(
        &self,
        module: &str,
        key: &str,
        default: i64,
    ) -> Result<i64, ParameterError> {
        match self.parameter(module, key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ParameterError {
                module: module.to_string(),
                key: key.to_string(),
                value: raw.to_string(),
                expected: "i64",
            }),
        }
    }

    /// A parameter parsed as `bool` (`true`/`false`/`1`/`0`), or
    /// `default` when absent.
    fn parameter_bool(
        &self,
        module: &str,
        key: &str,
        default: bool,
    ) -> Result<bool, ParameterError> {
        match self.parameter(module, key) {
            None => Ok(default),
            Some(raw) => match raw.trim() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                other => Err(ParameterError {
                    module: module.to_string(),
                    key: key.to_string(),
                    value: other.to_string(),
                    expected: "bool",
                }),
            },
        }
    }
}
