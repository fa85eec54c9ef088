//! Cosmology parameters and the snapshot time grid.
//!
//! Elapsed time between a progenitor and its descendant is the quantity
//! every physics module integrates over, and its sign is a classic
//! trap: the grid stores *lookback* times, which decrease with snapshot
//! number. [`TimeGrid::elapsed_between`] fixes the subtraction order
//! (`lookback[progenitor] - lookback[descendant]`) and rejects any
//! non-positive result, so a reversed convention cannot pass silently.

use crate::error::TimeError;
use crate::id::SnapNum;

/// Gravitational constant in simulation units
/// ((Mpc/h) (km/s)^2 per 10^10 Msun/h).
pub const GRAVITY: f64 = 43.0071;

/// Hubble constant at z = 0 in h-scaled units (km/s per Mpc/h).
pub const HUBBLE0: f64 = 100.0;

/// Conversion from (Mpc/h)/(km/s) to Gyr/h.
///
/// Also the conversion from inverse Hubble units to Gyr; used both by
/// the lookback integral and by anything forming a dynamical time as
/// `radius / velocity`.
pub const MPC_OVER_KMS_IN_GYR: f64 = 977.792;

/// Integration steps per unit redshift for the lookback integral.
const STEPS_PER_UNIT_Z: usize = 256;

/// Flat-or-curved FLRW cosmology parameters.
///
/// All masses are 10^10 Msun/h, lengths Mpc/h, velocities km/s; with
/// h-scaled units the Hubble constant is always [`HUBBLE0`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cosmology {
    /// Matter density parameter at z = 0.
    pub omega_m: f64,
    /// Dark-energy density parameter at z = 0.
    pub omega_lambda: f64,
    /// Dimensionless Hubble parameter (H0 / 100 km/s/Mpc). Retained
    /// for unit conversion at the I/O boundary; internal quantities
    /// are h-scaled and do not use it.
    pub hubble_h: f64,
}

impl Cosmology {
    /// Square of the Hubble parameter at redshift `z`, in
    /// (km/s per Mpc/h)^2.
    pub fn hubble_sq(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        HUBBLE0
            * HUBBLE0
            * (self.omega_m * zp1 * zp1 * zp1
                + (1.0 - self.omega_m - self.omega_lambda) * zp1 * zp1
                + self.omega_lambda)
    }

    /// Critical density at redshift `z`, in 10^10 Msun/h per (Mpc/h)^3.
    pub fn rho_crit(&self, z: f64) -> f64 {
        3.0 * self.hubble_sq(z) / (8.0 * std::f64::consts::PI * GRAVITY)
    }

    /// Lookback time from redshift `z` to z = 0, in Gyr/h.
    ///
    /// Computed by composite Simpson integration of `1 / [H(z')(1+z')]`
    /// over `[0, z]`. Monotonically increasing in `z`.
    pub fn lookback_time(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        // Simpson needs an even interval count.
        let mut n = (z * STEPS_PER_UNIT_Z as f64).ceil() as usize;
        n = n.max(2);
        if n % 2 == 1 {
            n += 1;
        }
        let h = z / n as f64;
        let integrand = |zp: f64| 1.0 / (self.hubble_sq(zp).sqrt() * (1.0 + zp));
        let mut sum = integrand(0.0) + integrand(z);
        for i in 1..n {
            let w = if i % 2 == 0 { 2.0 } else { 4.0 };
            sum += w * integrand(i as f64 * h);
        }
        sum * h / 3.0 * MPC_OVER_KMS_IN_GYR
    }
}

/// Per-snapshot redshift and lookback-time table.
///
/// Snapshots ascend with cosmic time, so the supplied redshift list
/// must be strictly decreasing. The table is immutable after
/// construction and shared read-only by all tree workers.
#[derive(Clone, Debug)]
pub struct TimeGrid {
    cosmology: Cosmology,
    redshifts: Vec<f64>,
    lookback: Vec<f64>,
}

impl TimeGrid {
    /// Build the time grid for the given snapshot redshift list.
    ///
    /// Fails if the list is empty, contains a non-finite or sub-(-1)
    /// value, or is not strictly decreasing.
    pub fn new(cosmology: Cosmology, redshifts: &[f64]) -> Result<Self, TimeError> {
        if redshifts.is_empty() {
            return Err(TimeError::EmptySnapshotList);
        }
        for (i, &z) in redshifts.iter().enumerate() {
            if !z.is_finite() || z <= -1.0 {
                return Err(TimeError::InvalidRedshift { index: i, value: z });
            }
        }
        for (i, pair) in redshifts.windows(2).enumerate() {
            if pair[1] >= pair[0] {
                return Err(TimeError::NotDescending {
                    index: i + 1,
                    value: pair[1],
                    previous: pair[0],
                });
            }
        }
        let lookback = redshifts.iter().map(|&z| cosmology.lookback_time(z)).collect();
        Ok(Self {
            cosmology,
            redshifts: redshifts.to_vec(),
            lookback,
        })
    }

    /// The cosmology this grid was built for.
    pub fn cosmology(&self) -> &Cosmology {
        &self.cosmology
    }

    /// Number of snapshots in the grid.
    pub fn snapshot_count(&self) -> usize {
        self.redshifts.len()
    }

    /// Redshift of a snapshot.
    pub fn redshift(&self, snap: SnapNum) -> Result<f64, TimeError> {
        self.redshifts
            .get(snap.index())
            .copied()
            .ok_or(TimeError::UnknownSnapshot { snap })
    }

    /// Lookback time of a snapshot, in Gyr/h.
    pub fn lookback(&self, snap: SnapNum) -> Result<f64, TimeError> {
        self.lookback
            .get(snap.index())
            .copied()
            .ok_or(TimeError::UnknownSnapshot { snap })
    }

    /// Cosmic time elapsed from a progenitor's snapshot to its
    /// descendant's snapshot, in Gyr/h. Strictly positive for every
    /// valid (progenitor, descendant) pair.
    ///
    /// Lookback times decrease with snapshot number, so the elapsed
    /// time is `lookback(progenitor) - lookback(descendant)`. A
    /// non-positive result means the pair is not ordered
    /// progenitor-before-descendant and is reported as an error rather
    /// than returned as a silent negative timestep.
    pub fn elapsed_between(
        &self,
        progenitor: SnapNum,
        descendant: SnapNum,
    ) -> Result<f64, TimeError> {
        let dt = self.lookback(progenitor)? - self.lookback(descendant)?;
        if dt <= 0.0 {
            return Err(TimeError::NonPositiveElapsed {
                from: progenitor,
                to: descendant,
                elapsed: dt,
            });
        }
        Ok(dt)
    }
}
