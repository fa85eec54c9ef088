//! The [`GalaxyModule`] trait.

use arbor_core::{ModuleError, PropertyDescriptor};

use crate::context::{GroupContext, ModuleInit};
use crate::group::HaloGroup;

/// A self-contained physics unit in the per-group pipeline.
///
/// # Contract
///
/// - `process()` MUST be deterministic: the same group state and
///   context produce identical mutations.
/// - Modules mutate galaxy state only through record accessors; the
///   raw halo and the core-owned halo bookkeeping fields are read-only
///   by convention.
/// - `provides()`/`requires()` name galaxy properties; activation
///   checks that every requirement is provided by the core or by an
///   earlier-activated module.
/// - `galaxy_properties()` declares the descriptors for everything the
///   module provides; the engine folds them into the catalog before
///   compilation, so the galaxy field set is module-declared, not
///   fixed by the core.
///
/// # Lifecycle
///
/// `Registered → Activated → Initialized → Running → Cleaned`, driven
/// by the registry and pipeline. A module never transitions back from
/// `Cleaned`.
///
/// # Object safety
///
/// The trait is object-safe; the pipeline stores modules as
/// `Vec<Box<dyn GalaxyModule>>`.
///
/// # Examples
///
/// A module that deposits a fixed gas mass on every central:
///
/// ```
/// use arbor_catalog::Accessor;
/// use arbor_core::{HaloRole, ModuleError, PropertyDescriptor};
/// use arbor_module::{GalaxyModule, GroupContext, HaloGroup, ModuleInit};
///
/// struct FixedDeposit {
///     cold_gas: Option<Accessor>,
/// }
///
/// impl GalaxyModule for FixedDeposit {
///     fn name(&self) -> &str { "fixed_deposit" }
///
///     fn provides(&self) -> Vec<String> { vec!["cold_gas".into()] }
///
///     fn galaxy_properties(&self) -> Vec<PropertyDescriptor> {
///         vec![PropertyDescriptor::scalar("cold_gas", 0.0).provided_by("fixed_deposit")]
///     }
///
///     fn init(&mut self, ctx: &ModuleInit<'_>) -> Result<(), ModuleError> {
///         self.cold_gas = ctx.catalog.galaxy_accessor("cold_gas");
///         self.cold_gas.map(|_| ()).ok_or(ModuleError::MissingProperty {
///             property: "cold_gas".into(),
///         })
///     }
///
///     fn process(
///         &mut self,
///         _ctx: &mut GroupContext<'_>,
///         group: &mut HaloGroup<'_>,
///     ) -> Result<(), ModuleError> {
///         let acc = self.cold_gas.expect("resolved in init");
///         for halo in group.members_mut() {
///             if halo.role == HaloRole::Central {
///                 halo.galaxy.set_scalar(acc, 1.0);
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait GalaxyModule: Send {
    /// Unique module name, used for activation, parameter namespacing,
    /// and error reporting.
    fn name(&self) -> &str;

    /// Galaxy property names this module writes.
    ///
    /// Called at activation, not per-group.
    fn provides(&self) -> Vec<String> {
        Vec::new()
    }

    /// Galaxy property names this module reads and therefore needs an
    /// earlier provider for.
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }

    /// Descriptors for every property this module provides.
    ///
    /// Folded into the catalog spec before compilation.
    fn galaxy_properties(&self) -> Vec<PropertyDescriptor> {
        Vec::new()
    }

    /// One-time setup: read parameters, resolve accessors, build
    /// lookup tables. Called once, in activation order, before any
    /// tree is processed. A failure aborts startup.
    fn init(&mut self, ctx: &ModuleInit<'_>) -> Result<(), ModuleError>;

    /// Evolve one halo group for one snapshot.
    ///
    /// All halos of the group are visible at once; physics that needs
    /// cross-sibling visibility (stripping, mergers) reads and writes
    /// any member. A failure aborts the current tree, not the run.
    fn process(
        &mut self,
        ctx: &mut GroupContext<'_>,
        group: &mut HaloGroup<'_>,
    ) -> Result<(), ModuleError>;

    /// One-time teardown, called in reverse activation order.
    /// Failures are surfaced as warnings and do not stop other
    /// modules' cleanup.
    fn cleanup(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}
