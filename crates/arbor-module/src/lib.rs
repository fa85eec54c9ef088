//! Physics-module trait, registry, and execution pipeline.
//!
//! A physics module is a self-contained unit implementing the
//! three-entry-point contract — `init`, `process`, `cleanup` — plus
//! static declarations of the galaxy properties it provides and
//! requires. The core has zero knowledge of any specific physics: it
//! registers modules explicitly at startup, activates a user-declared
//! ordered subset (checking that every requirement has an earlier
//! provider), and invokes `process` once per halo group per snapshot in
//! exactly that order, every time.
//!
//! Execution order is deliberately user-declared rather than derived
//! from a dependency graph; the activation check catches ordering
//! mistakes at startup and failure reports stay as simple as "module X
//! failed at position Y".

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod error;
pub mod group;
pub mod module;
pub mod pipeline;
pub mod registry;

pub use context::{GroupContext, ModuleInit};
pub use error::{CleanupFailure, PipelineError, RegistryError};
pub use group::{HaloGroup, WorkingHalo};
pub use module::GalaxyModule;
pub use pipeline::ActivePipeline;
pub use registry::ModuleRegistry;
