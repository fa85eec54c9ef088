//! Engine construction: catalog compilation and pipeline activation.

use std::error::Error;
use std::fmt;

use arbor_catalog::{Catalog, CatalogSpec, ComputeRegistry, SpecError};
use arbor_core::{TimeError, TimeGrid};
use arbor_forest::{core_halo_descriptors, core_provided_names, register_core_computations,
    SetupError};
use arbor_module::{ActivePipeline, ModuleInit, ModuleRegistry, PipelineError, RegistryError};

use crate::params::RunParameters;

/// Definition-time errors: everything that can go wrong before the
/// first tree is processed.
///
/// Each variant names the offending module, descriptor, or snapshot
/// through its wrapped error.
#[derive(Debug)]
pub enum BuildError {
    /// Module activation failed (unknown name, unsatisfied
    /// requirement).
    Registry(RegistryError),
    /// Descriptor validation failed.
    Spec(SpecError),
    /// The snapshot list is unusable.
    Time(TimeError),
    /// A module's `init` failed.
    Pipeline(PipelineError),
    /// The compiled catalog lacks a core field (internal
    /// inconsistency).
    Setup(SetupError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "module activation: {e}"),
            Self::Spec(e) => write!(f, "property catalog: {e}"),
            Self::Time(e) => write!(f, "snapshot grid: {e}"),
            Self::Pipeline(e) => write!(f, "module startup: {e}"),
            Self::Setup(e) => write!(f, "engine setup: {e}"),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(e) => Some(e),
            Self::Spec(e) => Some(e),
            Self::Time(e) => Some(e),
            Self::Pipeline(e) => Some(e),
            Self::Setup(e) => Some(e),
        }
    }
}

impl From<RegistryError> for BuildError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<SpecError> for BuildError {
    fn from(e: SpecError) -> Self {
        Self::Spec(e)
    }
}

impl From<TimeError> for BuildError {
    fn from(e: TimeError) -> Self {
        Self::Time(e)
    }
}

impl From<PipelineError> for BuildError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<SetupError> for BuildError {
    fn from(e: SetupError) -> Self {
        Self::Setup(e)
    }
}

/// Everything the run loop needs, fully validated and initialized.
pub(crate) struct BuiltEngine {
    pub catalog: Catalog,
    pub computes: ComputeRegistry,
    pub grid: TimeGrid,
    pub pipeline: ActivePipeline,
}

/// Compile the catalog, activate the configured modules, build the
/// time grid, and run module initialization.
///
/// The catalog spec is the core halo descriptors plus the galaxy
/// descriptors declared by the active modules, in activation order —
/// the galaxy field set is decided entirely by the module selection.
pub(crate) fn build(
    params: &RunParameters,
    registry: ModuleRegistry,
) -> Result<BuiltEngine, BuildError> {
    let mut computes = ComputeRegistry::new();
    register_core_computations(&mut computes, params.run.particle_mass);

    let pipeline = registry.activate(
        arbor_core::ParameterSource::active_modules(params),
        &core_provided_names(),
    )?;

    let catalog = CatalogSpec {
        halo: core_halo_descriptors(),
        galaxy: pipeline.galaxy_descriptors(),
    }
    .compile(&computes)?;

    let grid = TimeGrid::new(params.cosmology(), &params.snapshots.redshifts)?;

    let mut pipeline = pipeline;
    pipeline.init_all(&ModuleInit {
        catalog: &catalog,
        params,
        time: &grid,
    })?;

    Ok(BuiltEngine {
        catalog,
        computes,
        grid,
        pipeline,
    })
}
