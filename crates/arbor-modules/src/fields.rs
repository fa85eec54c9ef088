//! Galaxy property names shared by the reference modules.
//!
//! Modules reference each other's reservoirs by these names (cooling
//! drains what infall filled), so the strings live in one place.

/// Hot halo gas reservoir, in 10^10 Msun/h. Provided by infall.
pub const HOT_GAS: &str = "hot_gas";

/// Cold disk gas reservoir, in 10^10 Msun/h. Provided by cooling.
pub const COLD_GAS: &str = "cold_gas";

/// Total stellar mass, in 10^10 Msun/h. Provided by star formation.
pub const STELLAR_MASS: &str = "stellar_mass";

/// Star-formation rate over the last timestep, in 10^10 Msun/h per
/// Gyr/h. Provided by star formation.
pub const SFR: &str = "sfr";
