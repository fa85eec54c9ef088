//! Named computations referenced by descriptor rules.
//!
//! `Computed` init rules and `Recompute`/`Custom` output rules refer to
//! computations by name; the names are resolved against a
//! [`ComputeRegistry`] at catalog compilation, so a dangling reference
//! is a definition-time error, not a runtime surprise.

use indexmap::IndexMap;

use arbor_core::{Cosmology, HaloRole, PropertyValue, RawHalo};

use crate::catalog::Catalog;
use crate::record::Record;

/// A registered computation.
pub type ComputeFn = Box<dyn Fn(&ComputeCtx<'_>) -> PropertyValue + Send + Sync>;

/// Name → computation table, populated once at startup.
///
/// Insertion order is preserved so diagnostics listing available
/// computations are stable across runs.
#[derive(Default)]
pub struct ComputeRegistry {
    functions: IndexMap<String, ComputeFn>,
}

impl ComputeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a computation under a name. A repeated name replaces
    /// the earlier entry; the catalog is compiled afterwards, so the
    /// last registration wins consistently.
    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&ComputeCtx<'_>) -> PropertyValue + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Box::new(function));
    }

    /// Whether a computation is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Look up a computation.
    pub fn get(&self, name: &str) -> Option<&ComputeFn> {
        self.functions.get(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ComputeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Inputs a plan execution needs from the caller.
///
/// The catalog builds the full [`ComputeCtx`] from this plus its own
/// state and the records involved.
pub struct ComputeEnv<'a> {
    /// The raw halo the record derives from.
    pub raw: &'a RawHalo,
    /// The halo's role this snapshot.
    pub role: HaloRole,
    /// Redshift of the snapshot being processed.
    pub redshift: f64,
    /// Cosmology parameters.
    pub cosmology: &'a Cosmology,
    /// The computation table validated at compile time.
    pub computes: &'a ComputeRegistry,
}

/// Everything a computation may consult.
///
/// During halo-record initialization `halo` and `galaxy` are absent;
/// during galaxy initialization `halo` is present; at output time both
/// are.
pub struct ComputeCtx<'a> {
    /// The raw halo the record derives from.
    pub raw: &'a RawHalo,
    /// The halo's role this snapshot.
    pub role: HaloRole,
    /// Redshift of the snapshot being processed.
    pub redshift: f64,
    /// Cosmology parameters.
    pub cosmology: &'a Cosmology,
    /// The compiled catalog, for name lookups.
    pub catalog: &'a Catalog,
    /// The working halo record, when one exists yet.
    pub halo: Option<&'a Record>,
    /// The galaxy record, when one exists yet.
    pub galaxy: Option<&'a Record>,
}

impl ComputeCtx<'_> {
    /// A named scalar from the halo record, if both exist.
    pub fn halo_scalar(&self, name: &str) -> Option<f64> {
        let acc = self.catalog.halo_accessor(name)?;
        Some(self.halo?.scalar(acc))
    }

    /// A named scalar from the galaxy record, if both exist.
    pub fn galaxy_scalar(&self, name: &str) -> Option<f64> {
        let acc = self.catalog.galaxy_accessor(name)?;
        Some(self.galaxy?.scalar(acc))
    }
}
