//! Star formation from cold disk gas.
//!
//! Cold gas turns into stars at `efficiency × ColdGas / t_dyn`, with
//! `t_dyn = Rvir / Vvir`, integrated over the timestep and capped at
//! the available reservoir. Runs on every galaxy that holds cold gas,
//! satellites and orphans included — their disks keep forming stars
//! after infall.
//!
//! # Parameters (`[modules.star_formation]`)
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `efficiency` | 0.05 | Fraction of the cold reservoir converted per dynamical time |

use tracing::info;

use arbor_catalog::Accessor;
use arbor_core::time::MPC_OVER_KMS_IN_GYR;
use arbor_core::{ModuleError, PropertyDescriptor};
use arbor_module::{GalaxyModule, GroupContext, HaloGroup, ModuleInit};

use crate::fields::{COLD_GAS, SFR, STELLAR_MASS};

const DEFAULT_EFFICIENCY: f64 = 0.05;

/// Converts cold gas into stellar mass and records the step-averaged
/// star-formation rate.
pub struct StarFormationModule {
    efficiency: f64,
    cold_gas: Option<Accessor>,
    stellar_mass: Option<Accessor>,
    sfr: Option<Accessor>,
    rvir: Option<Accessor>,
    vvir: Option<Accessor>,
}

impl StarFormationModule {
    /// Create the module with default parameters.
    pub fn new() -> Self {
        Self {
            efficiency: DEFAULT_EFFICIENCY,
            cold_gas: None,
            stellar_mass: None,
            sfr: None,
            rvir: None,
            vvir: None,
        }
    }
}

impl Default for StarFormationModule {
    fn default() -> Self {
        Self::new()
    }
}

impl GalaxyModule for StarFormationModule {
    fn name(&self) -> &str {
        "star_formation"
    }

    fn provides(&self) -> Vec<String> {
        vec![STELLAR_MASS.to_string(), SFR.to_string()]
    }

    fn requires(&self) -> Vec<String> {
        vec![COLD_GAS.to_string()]
    }

    fn galaxy_properties(&self) -> Vec<PropertyDescriptor> {
        vec![
            PropertyDescriptor::scalar(STELLAR_MASS, 0.0)
                .with_range(0.0, 1.0e7)
                .provided_by(self.name()),
            PropertyDescriptor::scalar(SFR, 0.0)
                .with_range(0.0, 1.0e7)
                .provided_by(self.name()),
        ]
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
        self.cold_gas = Some(galaxy(COLD_GAS)?);
        self.stellar_mass = Some(galaxy(STELLAR_MASS)?);
        self.sfr = Some(galaxy(SFR)?);
        self.rvir = Some(halo("rvir")?);
        self.vvir = Some(halo("vvir")?);
        info!(
            efficiency = self.efficiency,
            "star formation module initialized"
        );
        Ok(())
    }

    fn process(
        &mut self,
        _ctx: &mut GroupContext<'_>,
        group: &mut HaloGroup<'_>,
    ) -> Result<(), ModuleError> {
        let cold_acc = self.cold_gas.expect("resolved in init");
        let stellar_acc = self.stellar_mass.expect("resolved in init");
        let sfr_acc = self.sfr.expect("resolved in init");
        let rvir_acc = self.rvir.expect("resolved in init");
        let vvir_acc = self.vvir.expect("resolved in init");

        for halo in group.members_mut() {
            let cold = halo.galaxy.scalar(cold_acc);
            halo.galaxy.set_scalar(sfr_acc, 0.0);
            if cold <= 0.0 || halo.dt <= 0.0 {
                continue;
            }
            // Orphans keep the virial scales frozen at infall, so the
            // record values stay usable here.
            let rvir = halo.halo.scalar(rvir_acc);
            let vvir = halo.halo.scalar(vvir_acc);
            if rvir <= 0.0 || vvir <= 0.0 {
                continue;
            }
            let t_dyn = rvir / vvir * MPC_OVER_KMS_IN_GYR;
            let formed = (self.efficiency * cold / t_dyn * halo.dt).min(cold);
            halo.galaxy.set_scalar(cold_acc, cold - formed);
            let stars = halo.galaxy.scalar(stellar_acc);
            halo.galaxy.set_scalar(stellar_acc, stars + formed);
            halo.galaxy.set_scalar(sfr_acc, formed / halo.dt);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use arbor_core::HaloRole;
    use arbor_test_utils::FixedParameters;

    fn catalog() -> arbor_catalog::Catalog {
        let mut galaxy = vec![PropertyDescriptor::scalar(COLD_GAS, 0.0)];
        galaxy.extend(StarFormationModule::new().galaxy_properties());
        testkit::compile(galaxy)
    }

    #[test]
    fn stars_form_from_cold_gas_and_mass_is_conserved() {
        let catalog = catalog();
        let cold = catalog.galaxy_accessor(COLD_GAS).unwrap();
        let stars = catalog.galaxy_accessor(STELLAR_MASS).unwrap();
        let sfr = catalog.galaxy_accessor(SFR).unwrap();
        let rvir = catalog.halo_accessor("rvir").unwrap();
        let vvir = catalog.halo_accessor("vvir").unwrap();

        let mut members = vec![testkit::working(&catalog, HaloRole::Central, 0.5)];
        members[0].galaxy.set_scalar(cold, 0.4);
        members[0].halo.set_scalar(rvir, 0.2);
        members[0].halo.set_scalar(vvir, 150.0);

        let params = FixedParameters::new();
        testkit::run_once(
            Box::new(StarFormationModule::new()),
            &catalog,
            &params,
            &mut members,
            0,
        );

        let cold_after = members[0].galaxy.scalar(cold);
        let stars_after = members[0].galaxy.scalar(stars);
        assert!(stars_after > 0.0);
        assert!((cold_after + stars_after - 0.4).abs() < 1e-12);
        assert!((members[0].galaxy.scalar(sfr) - stars_after / 0.5).abs() < 1e-12);
    }

    #[test]
    fn satellites_form_stars_too() {
        let catalog = catalog();
        let cold = catalog.galaxy_accessor(COLD_GAS).unwrap();
        let stars = catalog.galaxy_accessor(STELLAR_MASS).unwrap();
        let rvir = catalog.halo_accessor("rvir").unwrap();
        let vvir = catalog.halo_accessor("vvir").unwrap();

        let mut members = vec![
            testkit::working(&catalog, HaloRole::Central, 0.5),
            testkit::working(&catalog, HaloRole::Satellite, 0.5),
        ];
        for member in members.iter_mut() {
            member.galaxy.set_scalar(cold, 0.1);
            member.halo.set_scalar(rvir, 0.1);
            member.halo.set_scalar(vvir, 100.0);
        }

        let params = FixedParameters::new();
        testkit::run_once(
            Box::new(StarFormationModule::new()),
            &catalog,
            &params,
            &mut members,
            0,
        );
        assert!(members[1].galaxy.scalar(stars) > 0.0);
    }

    #[test]
    fn empty_disk_forms_nothing_and_zeroes_the_rate() {
        let catalog = catalog();
        let stars = catalog.galaxy_accessor(STELLAR_MASS).unwrap();
        let sfr = catalog.galaxy_accessor(SFR).unwrap();

        let mut members = vec![testkit::working(&catalog, HaloRole::Central, 0.5)];
        members[0].galaxy.set_scalar(sfr, 3.0); // stale value from a previous step

        let params = FixedParameters::new();
        testkit::run_once(
            Box::new(StarFormationModule::new()),
            &catalog,
            &params,
            &mut members,
            0,
        );
        assert_eq!(members[0].galaxy.scalar(stars), 0.0);
        assert_eq!(members[0].galaxy.scalar(sfr), 0.0);
    }
}
