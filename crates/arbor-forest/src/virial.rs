//! Virial property derivation.
//!
//! Masses are 10^10 Msun/h, lengths Mpc/h, velocities km/s. The
//! spherical-overdensity mass from the source is preferred for group
//! roots; otherwise mass is particle count times particle mass. The
//! virial radius is the 200 ρ_crit(z) sphere and the virial velocity
//! the circular velocity at that radius.

use arbor_core::time::GRAVITY;
use arbor_core::{Cosmology, HaloIdx, PropertyValue, RawHalo};

use arbor_catalog::ComputeRegistry;

/// Virial mass of a halo.
///
/// Group roots with a positive spherical-overdensity mass use it;
/// everything else falls back to `len × particle_mass` (satellite
/// subhalo masses from SO finders are unreliable).
pub fn virial_mass(halo: HaloIdx, halos: &[RawHalo], particle_mass: f64) -> f64 {
    let h = &halos[halo.index()];
    if h.is_group_root(halo) && h.mvir > 0.0 {
        h.mvir
    } else {
        f64::from(h.len) * particle_mass
    }
}

/// Virial radius: the radius enclosing 200 times the critical density
/// at the halo's redshift.
pub fn virial_radius(
    halo: HaloIdx,
    halos: &[RawHalo],
    cosmology: &Cosmology,
    redshift: f64,
    particle_mass: f64,
) -> f64 {
    let mass = virial_mass(halo, halos, particle_mass);
    let rho_crit = cosmology.rho_crit(redshift);
    let fac = 1.0 / (200.0 * 4.0 * std::f64::consts::PI / 3.0 * rho_crit);
    (mass * fac).cbrt()
}

/// Virial velocity: `sqrt(G Mvir / Rvir)`, or zero when the radius is
/// not positive.
pub fn virial_velocity(
    halo: HaloIdx,
    halos: &[RawHalo],
    cosmology: &Cosmology,
    redshift: f64,
    particle_mass: f64,
) -> f64 {
    let rvir = virial_radius(halo, halos, cosmology, redshift, particle_mass);
    if rvir > 0.0 {
        (GRAVITY * virial_mass(halo, halos, particle_mass) / rvir).sqrt()
    } else {
        0.0
    }
}

fn raw_virial_mass(raw: &RawHalo, particle_mass: f64) -> f64 {
    // Fresh halos are always group roots, so the SO mass is usable
    // whenever the source provided one.
    if raw.mvir > 0.0 {
        raw.mvir
    } else {
        f64::from(raw.len) * particle_mass
    }
}

/// Register the core computations referenced by the halo descriptors:
/// `virial_mass`, `virial_radius`, `virial_velocity` (fresh-halo
/// initialization) and `role_code` (output).
pub fn register_core_computations(registry: &mut ComputeRegistry, particle_mass: f64) {
    registry.register("virial_mass", move |ctx| {
        PropertyValue::Scalar(raw_virial_mass(ctx.raw, particle_mass))
    });
    registry.register("virial_radius", move |ctx| {
        let mass = raw_virial_mass(ctx.raw, particle_mass);
        let rho_crit = ctx.cosmology.rho_crit(ctx.redshift);
        let fac = 1.0 / (200.0 * 4.0 * std::f64::consts::PI / 3.0 * rho_crit);
        PropertyValue::Scalar((mass * fac).cbrt())
    });
    registry.register("virial_velocity", move |ctx| {
        let mass = raw_virial_mass(ctx.raw, particle_mass);
        let rho_crit = ctx.cosmology.rho_crit(ctx.redshift);
        let fac = 1.0 / (200.0 * 4.0 * std::f64::consts::PI / 3.0 * rho_crit);
        let rvir = (mass * fac).cbrt();
        let vvir = if rvir > 0.0 {
            (GRAVITY * mass / rvir).sqrt()
        } else {
            0.0
        };
        PropertyValue::Scalar(vvir)
    });
    registry.register("role_code", |ctx| PropertyValue::Int(ctx.role.code()));
}
