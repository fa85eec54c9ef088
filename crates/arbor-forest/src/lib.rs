//! Merger-tree traversal and per-tree galaxy evolution.
//!
//! This crate walks one merger tree at a time in a depth-respecting
//! order, gives every halo a consistent galaxy record across snapshots
//! by progenitor inheritance (primary progenitor carries the galaxy
//! forward; every other progenitor's galaxy enters the descendant's
//! group for modules to reconcile), assigns each halo exactly one role
//! per snapshot, runs the module pipeline once per halo group, and
//! finalizes records to the output sink — all inside one
//! forest-scoped allocation region that is leak-checked on close.
//!
//! Per-tree state machine: `Loaded → Traversing → Finalizing → Closed`.
//! A structurally inconsistent tree, an exhausted budget, or a failing
//! module aborts that tree only; the region still closes and the next
//! tree is unaffected.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod evolve;
mod inherit;
pub mod properties;
pub mod validate;
pub mod virial;
pub mod walk;

pub use error::{EvolveError, EvolveErrorKind, SetupError};
pub use evolve::{TreeEvolver, TreeOutcome};
pub use properties::{core_halo_descriptors, core_provided_names, CoreHaloFields, MERGE_CLOCK_NONE};
pub use validate::validate_structure;
pub use virial::{register_core_computations, virial_mass, virial_radius, virial_velocity};
pub use walk::{plan_traversal, GroupPlan};
