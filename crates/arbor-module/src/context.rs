//! Contexts passed to module entry points.

use arbor_arena::ScratchRegion;
use arbor_catalog::Catalog;
use arbor_core::{ParameterSource, SnapNum, TimeGrid};

/// Context for [`GalaxyModule::init`](crate::module::GalaxyModule::init).
///
/// Modules use it to read their parameters, resolve property accessors
/// against the compiled catalog, and size any lookup tables against
/// the time grid.
pub struct ModuleInit<'a> {
    /// The compiled property catalog.
    pub catalog: &'a Catalog,
    /// Read-only run configuration.
    pub params: &'a dyn ParameterSource,
    /// Snapshot redshift/lookback table.
    pub time: &'a TimeGrid,
}

/// Context for [`GalaxyModule::process`](crate::module::GalaxyModule::process):
/// everything about the snapshot being evolved except the group itself.
pub struct GroupContext<'a> {
    /// Snapshot currently being processed.
    pub snap: SnapNum,
    /// Redshift of that snapshot.
    pub redshift: f64,
    /// Snapshot redshift/lookback table.
    pub time: &'a TimeGrid,
    /// The compiled property catalog.
    pub catalog: &'a Catalog,
    /// Read-only run configuration.
    pub params: &'a dyn ParameterSource,
    /// Per-group temporary space; reset before each module runs.
    pub scratch: &'a mut ScratchRegion,
}
