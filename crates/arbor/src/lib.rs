//! Arbor: semi-analytic galaxy evolution over dark-matter merger trees.
//!
//! This is the top-level facade crate that re-exports the public API
//! from all Arbor sub-crates. For most users, adding `arbor` as a
//! single dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use arbor::prelude::*;
//!
//! // Declare the run: cosmology, snapshot grid, active physics.
//! let params = RunParameters::from_toml_str(r#"
//!     [cosmology]
//!     omega_m = 0.25
//!     omega_lambda = 0.75
//!     hubble_h = 0.73
//!
//!     [snapshots]
//!     redshifts = [4.0, 2.0, 1.0, 0.0]
//!
//!     [modules]
//!     enabled = ["infall", "cooling", "star_formation"]
//! "#).unwrap();
//!
//! // Make the reference physics modules available.
//! let mut registry = ModuleRegistry::new();
//! arbor::modules::register_standard_modules(&mut registry).unwrap();
//!
//! // Build: validates descriptors, checks module dependencies,
//! // initializes the pipeline. All definition errors surface here.
//! let engine = SimulationEngine::new(params, registry).unwrap();
//!
//! // A two-snapshot toy tree in place of a real tree file.
//! # use arbor_test_utils::{MemorySink, TreeBuilder, VecTreeSource};
//! let mut builder = TreeBuilder::new();
//! let early = builder.add_halo(0, 1.0);
//! let late = builder.add_halo(1, 1.8);
//! builder.link_descendant(early, late);
//! let source = VecTreeSource::new(vec![builder.build_tree(0)]);
//!
//! let mut sink = MemorySink::new();
//! let summary = engine.run(&source, &mut sink);
//! assert!(summary.is_clean());
//! assert_eq!(summary.records_emitted(), 2);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in
//! the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `arbor-core` | IDs, raw halos, roles, descriptors, time grid, boundary traits |
//! | [`arena`] | `arbor-arena` | Forest-scoped regions, budgets, leak accounting |
//! | [`catalog`] | `arbor-catalog` | Property catalog compilation, records, accessors |
//! | [`module`] | `arbor-module` | The `GalaxyModule` trait, registry, pipeline |
//! | [`forest`] | `arbor-forest` | Tree validation, traversal, inheritance, per-tree evolution |
//! | [`modules`] | `arbor-modules` | Reference physics (infall, cooling, star formation, mergers) |
//! | [`engine`] | `arbor-engine` | Run parameters, orchestration, parallel runner |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`arbor-core`).
pub use arbor_core as types;

/// Forest-scoped allocation regions (`arbor-arena`).
pub use arbor_arena as arena;

/// Property catalog and records (`arbor-catalog`).
pub use arbor_catalog as catalog;

/// Module trait, registry, and pipeline (`arbor-module`).
///
/// The [`module::GalaxyModule`] trait is the main extension point for
/// user-defined physics.
pub use arbor_module as module;

/// Merger-tree traversal and per-tree evolution (`arbor-forest`).
pub use arbor_forest as forest;

/// Reference physics modules (`arbor-modules`).
pub use arbor_modules as modules;

/// Run orchestration (`arbor-engine`).
pub use arbor_engine as engine;

/// Common imports for typical Arbor usage.
///
/// ```rust
/// use arbor::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use arbor_core::{
        Cosmology, GalaxyTag, GroupId, HaloIdx, HaloRole, MergeState, OutputRecord, OutputSink,
        ParameterSource, PropertyDescriptor, PropertyKind, PropertyValue, RawHalo, SnapNum,
        TimeGrid, TreeData, TreeId, TreeSource,
    };

    // Errors
    pub use arbor_core::{ModuleError, SinkError, SourceError, TimeError, TreeStructureError};

    // Arena
    pub use arbor_arena::{AllocCategory, ForestRegion, RegionBudget, RegionReport};

    // Catalog
    pub use arbor_catalog::{Accessor, Catalog, CatalogSpec, ComputeRegistry, Record, SpecError};

    // Modules
    pub use arbor_module::{
        ActivePipeline, GalaxyModule, GroupContext, HaloGroup, ModuleInit, ModuleRegistry,
        PipelineError, RegistryError, WorkingHalo,
    };

    // Forest
    pub use arbor_forest::{EvolveError, TreeEvolver, TreeOutcome};

    // Engine
    pub use arbor_engine::{
        BuildError, ErrorPolicy, ParallelRunner, RunParameters, RunSummary, SimulationEngine,
    };
}
