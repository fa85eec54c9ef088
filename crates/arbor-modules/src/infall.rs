//! Hot-gas infall onto group centrals.
//!
//! Newly accreted dark matter brings its share of baryons: each
//! snapshot, the central gains `baryon_fraction × max(ΔMvir, 0)` of
//! hot gas. Mass loss does not remove gas — stripping is a separate
//! concern for a separate module.
//!
//! # Parameters (`[modules.infall]`)
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `baryon_fraction` | 0.17 | Fraction of accreted mass arriving as gas |

use tracing::info;

use arbor_catalog::Accessor;
use arbor_core::{HaloRole, ModuleError, PropertyDescriptor};
use arbor_module::{GalaxyModule, GroupContext, HaloGroup, ModuleInit};

use crate::fields::HOT_GAS;

/// Default cosmic baryon fraction (Omega_b / Omega_m).
const DEFAULT_BARYON_FRACTION: f64 = 0.17;

/// Deposits the baryonic share of newly accreted halo mass as hot gas
/// on the group central.
pub struct InfallModule {
    baryon_fraction: f64,
    hot_gas: Option<Accessor>,
    delta_mvir: Option<Accessor>,
}

impl InfallModule {
    /// Create the module with default parameters; actual values are
    /// read from the run configuration at `init`.
    pub fn new() -> Self {
        Self {
            baryon_fraction: DEFAULT_BARYON_FRACTION,
            hot_gas: None,
            delta_mvir: None,
        }
    }

    fn require_galaxy(ctx: &ModuleInit<'_>, name: &str) -> Result<Accessor, ModuleError> {
        ctx.catalog
            .galaxy_accessor(name)
            .ok_or_else(|| ModuleError::MissingProperty {
                property: name.to_string(),
            })
    }

    fn require_halo(ctx: &ModuleInit<'_>, name: &str) -> Result<Accessor, ModuleError> {
        ctx.catalog
            .halo_accessor(name)
            .ok_or_else(|| ModuleError::MissingProperty {
                property: name.to_string(),
            })
    }
}

impl Default for InfallModule {
    fn default() -> Self {
        Self::new()
    }
}

impl GalaxyModule for InfallModule {
    fn name(&self) -> &str {
        "infall"
    }

    fn provides(&self) -> Vec<String> {
        vec![HOT_GAS.to_string()]
    }

    fn galaxy_properties(&self) -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::scalar(HOT_GAS, 0.0)
            .with_range(0.0, 1.0e7)
            .provided_by(self.name())]
    }

    fn init(&mut self, ctx: &ModuleInit<'_>) -> Result<(), ModuleError> {
        self.baryon_fraction = ctx
            .params
            .parameter_f64(self.name(), "baryon_fraction", DEFAULT_BARYON_FRACTION)
            .map_err(|e| ModuleError::ExecutionFailed {
                reason: e.to_string(),
            })?;
        self.hot_gas = Some(Self::require_galaxy(ctx, HOT_GAS)?);
        self.delta_mvir = Some(Self::require_halo(ctx, "delta_mvir")?);
        info!(
            baryon_fraction = self.baryon_fraction,
            "infall module initialized"
        );
        Ok(())
    }

    fn process(
        &mut self,
        _ctx: &mut GroupContext<'_>,
        group: &mut HaloGroup<'_>,
    ) -> Result<(), ModuleError> {
        let hot_gas = self.hot_gas.expect("resolved in init");
        let delta_mvir = self.delta_mvir.expect("resolved in init");
        for halo in group.members_mut() {
            if halo.role != HaloRole::Central {
                continue;
            }
            let accreted = halo.halo.scalar(delta_mvir);
            if accreted > 0.0 {
                let gained = self.baryon_fraction * accreted;
                let current = halo.galaxy.scalar(hot_gas);
                halo.galaxy.set_scalar(hot_gas, current + gained);
            }
        }
        Ok(())
    }
}
