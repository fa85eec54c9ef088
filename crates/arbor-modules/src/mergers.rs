//! Satellite merger clocks and baryon hand-off.
//!
//! Orphans spiral toward the group central on a dynamical-friction
//! timescale. When a galaxy first becomes an orphan the core zeroes
//! its merger clock; this module winds the clock to `clock_scale`
//! dynamical times of the host, then counts it down each snapshot.
//! At expiry the orphan's reservoirs move onto the central — gas to
//! gas, stars to stars — and the orphan is flagged as merged; the
//! traversal engine drops it from future snapshots and records the
//! merge target on its final output record.
//!
//! The core never merges baryons on its own: everything here is
//! module policy, which is why the clock lives in an ordinary halo
//! property any alternative merger module could replace.
//!
//! # Parameters (`[modules.satellite_mergers]`)
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `clock_scale` | 2.0 | Merger clock in units of the host dynamical time |

use tracing::info;

use arbor_catalog::Accessor;
use arbor_core::time::MPC_OVER_KMS_IN_GYR;
use arbor_core::{HaloRole, MergeState, ModuleError, PropertyCategory};
use arbor_module::{GalaxyModule, GroupContext, HaloGroup, ModuleInit};

use crate::fields::{COLD_GAS, HOT_GAS, STELLAR_MASS};

const DEFAULT_CLOCK_SCALE: f64 = 2.0;

/// Merges expired orphans into their group central.
pub struct SatelliteMergersModule {
    clock_scale: f64,
    /// The merge clock's "nothing scheduled" sentinel, read from the
    /// catalog metadata so this module and the core cannot disagree.
    clock_none: f64,
    merge_clock: Option<Accessor>,
    rvir: Option<Accessor>,
    vvir: Option<Accessor>,
    hot_gas: Option<Accessor>,
    cold_gas: Option<Accessor>,
    stellar_mass: Option<Accessor>,
}

impl SatelliteMergersModule {
    /// Create the module with default parameters.
    pub fn new() -> Self {
        Self {
            clock_scale: DEFAULT_CLOCK_SCALE,
            clock_none: f64::MAX,
            merge_clock: None,
            rvir: None,
            vvir: None,
            hot_gas: None,
            cold_gas: None,
            stellar_mass: None,
        }
    }
}

impl Default for SatelliteMergersModule {
    fn default() -> Self {
        Self::new()
    }
}

impl GalaxyModule for SatelliteMergersModule {
    fn name(&self) -> &str {
        "satellite_mergers"
    }

    fn requires(&self) -> Vec<String> {
        vec![
            HOT_GAS.to_string(),
            COLD_GAS.to_string(),
            STELLAR_MASS.to_string(),
        ]
    }

    fn init(&mut self, ctx: &ModuleInit<'_>) -> Result<(), ModuleError> {
        self.clock_scale = ctx
            .params
            .parameter_f64(self.name(), "clock_scale", DEFAULT_CLOCK_SCALE)
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
        self.merge_clock = Some(halo("merge_clock")?);
        self.rvir = Some(halo("rvir")?);
        self.vvir = Some(halo("vvir")?);
        self.hot_gas = Some(galaxy(HOT_GAS)?);
        self.cold_gas = Some(galaxy(COLD_GAS)?);
        self.stellar_mass = Some(galaxy(STELLAR_MASS)?);
        self.clock_none = ctx
            .catalog
            .find_meta(PropertyCategory::Halo, "merge_clock")
            .and_then(|meta| meta.sentinels.first().copied())
            .ok_or_else(|| ModuleError::InvalidState {
                reason: "merge_clock declares no sentinel".to_string(),
            })?;
        info!(clock_scale = self.clock_scale, "satellite mergers module initialized");
        Ok(())
    }

    fn process(
        &mut self,
        _ctx: &mut GroupContext<'_>,
        group: &mut HaloGroup<'_>,
    ) -> Result<(), ModuleError> {
        let clock_acc = self.merge_clock.expect("resolved in init");
        let rvir_acc = self.rvir.expect("resolved in init");
        let vvir_acc = self.vvir.expect("resolved in init");
        let hot = self.hot_gas.expect("resolved in init");
        let cold = self.cold_gas.expect("resolved in init");
        let stars = self.stellar_mass.expect("resolved in init");

        let central_index = group.central_index();
        let host_t_dyn = {
            let central = group.central();
            let rvir = central.halo.scalar(rvir_acc);
            let vvir = central.halo.scalar(vvir_acc);
            if vvir > 0.0 {
                rvir / vvir * MPC_OVER_KMS_IN_GYR
            } else {
                0.0
            }
        };
        let central_tag = group.central().tag;

        for index in 0..group.len() {
            if index == central_index {
                continue;
            }
            let member = &mut group.members_mut()[index];
            if member.role != HaloRole::Orphan {
                continue;
            }
            let mut clock = member.halo.scalar(clock_acc);
            if clock >= self.clock_none {
                continue;
            }
            if clock <= 0.0 && host_t_dyn > 0.0 {
                // Just lost its subhalo: wind the dynamical-friction
                // clock before any countdown.
                clock = self.clock_scale * host_t_dyn;
            }
            clock -= member.dt;
            if clock > 0.0 {
                member.halo.set_scalar(clock_acc, clock);
                continue;
            }

            member.halo.set_scalar(clock_acc, 0.0);
            member.merge = MergeState::MergedInto {
                target: central_tag,
            };
            let (sat_hot, sat_cold, sat_stars) = (
                member.galaxy.scalar(hot),
                member.galaxy.scalar(cold),
                member.galaxy.scalar(stars),
            );
            member.galaxy.set_scalar(hot, 0.0);
            member.galaxy.set_scalar(cold, 0.0);
            member.galaxy.set_scalar(stars, 0.0);

            let (central, satellite) = group.pair_mut(central_index, index);
            debug_assert!(satellite.merge.is_terminal());
            central
                .galaxy
                .set_scalar(hot, central.galaxy.scalar(hot) + sat_hot);
            central
                .galaxy
                .set_scalar(cold, central.galaxy.scalar(cold) + sat_cold);
            central
                .galaxy
                .set_scalar(stars, central.galaxy.scalar(stars) + sat_stars);
        }
        Ok(())
    }
}
