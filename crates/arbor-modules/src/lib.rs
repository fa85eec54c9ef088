//! Reference physics modules for Arbor simulations.
//!
//! Four modules that together form a minimal but complete baryonic
//! pipeline, in the order they are meant to run:
//!
//! | Module | Provides | Requires |
//! |--------|----------|----------|
//! | [`InfallModule`] | `hot_gas` | — |
//! | [`CoolingModule`] | `cold_gas` | `hot_gas` |
//! | [`StarFormationModule`] | `stellar_mass`, `sfr` | `cold_gas` |
//! | [`SatelliteMergersModule`] | — | `hot_gas`, `cold_gas`, `stellar_mass` |
//!
//! Each module reads its parameters from the run configuration under
//! its own namespace, declares the galaxy properties it provides, and
//! moves mass between reservoirs without creating or destroying it
//! beyond its documented source terms.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cooling;
pub mod fields;
pub mod infall;
pub mod mergers;
pub mod star_formation;

pub use cooling::CoolingModule;
pub use infall::InfallModule;
pub use mergers::SatelliteMergersModule;
pub use star_formation::StarFormationModule;

use arbor_module::{ModuleRegistry, RegistryError};

/// Register all reference modules with a registry.
///
/// Registration only makes the modules available; the run
/// configuration decides which are active and in what order.
pub fn register_standard_modules(registry: &mut ModuleRegistry) -> Result<(), RegistryError> {
    registry.register(Box::new(InfallModule::new()))?;
    registry.register(Box::new(CoolingModule::new()))?;
    registry.register(Box::new(StarFormationModule::new()))?;
    registry.register(Box::new(SatelliteMergersModule::new()))?;
    Ok(())
}
