//! Hot-to-cold gas cooling on a dynamical time.
//!
//! Hot halo gas condenses onto the central's disk at a rate set by the
//! halo dynamical time `t_dyn = Rvir / Vvir`: over a timestep `dt` a
//! fraction `efficiency × dt / t_dyn` of the hot reservoir cools,
//! never more than what is there.
//!
//! # Parameters (`[modules.cooling]`)
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `efficiency` | 0.5 | Fraction of the hot reservoir cooled per dynamical time |

use tracing::info;

use arbor_catalog::Accessor;
use arbor_core::time::MPC_OVER_KMS_IN_GYR;
use arbor_core::{HaloRole, ModuleError, PropertyDescriptor};
use arbor_module::{GalaxyModule, GroupContext, HaloGroup, ModuleInit};

use crate::fields::{COLD_GAS, HOT_GAS};

const DEFAULT_EFFICIENCY: f64 = 0.5;

/// Moves hot gas into the cold disk reservoir on group centrals.
pub struct CoolingModule {
    efficiency: f64,
    hot_gas: Option<Accessor>,
    cold_gas: Option<Accessor>,
    rvir: Option<Accessor>,
    vvir: Option<Accessor>,
}

impl CoolingModule {
    /// Create the module with default parameters.
    pub fn new() -> Self {
        Self {
            efficiency: DEFAULT_EFFICIENCY,
            hot_gas: None,
            cold_gas: None,
            rvir: None,
            vvir: None,
        }
    }
}

impl Default for CoolingModule {
    fn default() -> Self {
        Self::new()
    }
}

impl GalaxyModule for CoolingModule {
    fn name(&self) -> &str {
        "cooling"
    }

    fn provides(&self) -> Vec<String> {
        vec![COLD_GAS.to_string()]
    }

    fn requires(&self) -> Vec<String> {
        vec![HOT_GAS.to_string()]
    }

    fn galaxy_properties(&self) -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::scalar(COLD_GAS, 0.0)
            .with_range(0.0, 1.0e7)
            .provided_by(self.name())]
    }

    fn init(&mut self, ctx: &ModuleInit<'_>) -> Result<(), ModuleError> {
        self.efficiency = ctx
            .params
            .parameter_f64(self.name(), "efficiency", DEFAULT_EFFICIENCY)
            .map_err(|e| ModuleError::ExecutionFailed {
                reason: e.to_string(),
            })?;
        let galaxy = |name: &str| {
            ctx.catalog
                .galaxy_accessor(name)
                .ok_or_else(|| ModuleError::MissingProperty {
                    property: name.to_string(),
                })
        };
        let halo = |name: &str| {
            ctx.catalog
                .halo_accessor(name)
                .ok_or_else(|| ModuleError::MissingProperty {
                    property: name.to_string(),
                })
        };
        self.hot_gas = Some(galaxy(HOT_GAS)?);
        self.cold_gas = Some(galaxy(COLD_GAS)?);
        self.rvir = Some(halo("rvir")?);
        self.vvir = Some(halo("vvir")?);
        info!(efficiency = self.efficiency, "cooling module initialized");
        Ok(())
    }

    fn process(
        &mut self,
        _ctx: &mut GroupContext<'_>,
        group: &mut HaloGroup<'_>,
    ) -> Result<(), ModuleError> {
        let hot_acc = self.hot_gas.expect("resolved in init");
        let cold_acc = self.cold_gas.expect("resolved in init");
        let rvir_acc = self.rvir.expect("resolved in init");
        let vvir_acc = self.vvir.expect("resolved in init");

        for halo in group.members_mut() {
            if halo.role != HaloRole::Central {
                continue;
            }
            let hot = halo.galaxy.scalar(hot_acc);
            if hot <= 0.0 {
                continue;
            }
            let rvir = halo.halo.scalar(rvir_acc);
            let vvir = halo.halo.scalar(vvir_acc);
            if vvir <= 0.0 || rvir <= 0.0 {
                continue;
            }
            let t_dyn = rvir / vvir * MPC_OVER_KMS_IN_GYR;
            let fraction = (self.efficiency * halo.dt / t_dyn).min(1.0);
            let cooled = hot * fraction;
            halo.galaxy.set_scalar(hot_acc, hot - cooled);
            let cold = halo.galaxy.scalar(cold_acc);
            halo.galaxy.set_scalar(cold_acc, cold + cooled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use arbor_test_utils::FixedParameters;

    fn catalog() -> arbor_catalog::Catalog {
        // hot_gas normally comes from the infall module's declaration.
        let mut galaxy = vec![PropertyDescriptor::scalar(HOT_GAS, 0.0)];
        galaxy.extend(CoolingModule::new().galaxy_properties());
        testkit::compile(galaxy)
    }

    #[test]
    fn cooling_conserves_total_gas() {
        let catalog = catalog();
        let hot = catalog.galaxy_accessor(HOT_GAS).unwrap();
        let cold = catalog.galaxy_accessor(COLD_GAS).unwrap();
        let rvir = catalog.halo_accessor("rvir").unwrap();
        let vvir = catalog.halo_accessor("vvir").unwrap();

        let mut members = vec![testkit::working(&catalog, HaloRole::Central, 0.2)];
        members[0].galaxy.set_scalar(hot, 1.0);
        members[0].halo.set_scalar(rvir, 0.2);
        members[0].halo.set_scalar(vvir, 200.0);

        let params = FixedParameters::new();
        testkit::run_once(Box::new(CoolingModule::new()), &catalog, &params, &mut members, 0);

        let total = members[0].galaxy.scalar(hot) + members[0].galaxy.scalar(cold);
        assert!((total - 1.0).abs() < 1e-12, "gas must be conserved");
        assert!(members[0].galaxy.scalar(cold) > 0.0);
    }

    #[test]
    fn cooled_fraction_never_exceeds_the_reservoir() {
        let catalog = catalog();
        let hot = catalog.galaxy_accessor(HOT_GAS).unwrap();
        let cold = catalog.galaxy_accessor(COLD_GAS).unwrap();
        let rvir = catalog.halo_accessor("rvir").unwrap();
        let vvir = catalog.halo_accessor("vvir").unwrap();

        // Tiny dynamical time and a huge step: fraction clamps at 1.
        let mut members = vec![testkit::working(&catalog, HaloRole::Central, 50.0)];
        members[0].galaxy.set_scalar(hot, 0.7);
        members[0].halo.set_scalar(rvir, 0.001);
        members[0].halo.set_scalar(vvir, 500.0);

        let params = FixedParameters::new();
        testkit::run_once(Box::new(CoolingModule::new()), &catalog, &params, &mut members, 0);

        assert_eq!(members[0].galaxy.scalar(hot), 0.0);
        assert!((members[0].galaxy.scalar(cold) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn zero_virial_velocity_cools_nothing() {
        let catalog = catalog();
        let hot = catalog.galaxy_accessor(HOT_GAS).unwrap();
        let cold = catalog.galaxy_accessor(COLD_GAS).unwrap();

        let mut members = vec![testkit::working(&catalog, HaloRole::Central, 0.2)];
        members[0].galaxy.set_scalar(hot, 1.0);

        let params = FixedParameters::new();
        testkit::run_once(Box::new(CoolingModule::new()), &catalog, &params, &mut members, 0);
        assert_eq!(members[0].galaxy.scalar(hot), 1.0);
        assert_eq!(members[0].galaxy.scalar(cold), 0.0);
    }
}
