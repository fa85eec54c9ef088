//! Property catalog: the compiled form of the descriptor lists.
//!
//! A [`CatalogSpec`] holds the complete, declarative description of
//! every tracked per-halo and per-galaxy field. Compilation validates
//! the descriptors once, before any tree is processed, and produces an
//! immutable [`Catalog`]: record layouts, typed accessors, an
//! initialization plan, an output plan, and a runtime-queryable
//! metadata table. Everything derives from the one descriptor list, so
//! there is no second hand-maintained copy of "what fields exist" to
//! drift out of sync.
//!
//! The hot path never interprets descriptors: accessors are resolved
//! slot offsets, and the init/output plans are precompiled op lists,
//! following the validate-once / precompute-a-plan architecture used
//! throughout the engine.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod catalog;
pub mod compute;
pub mod error;
pub mod record;

pub use catalog::{Accessor, Catalog, CatalogSpec, PropertyMeta};
pub use compute::{ComputeCtx, ComputeEnv, ComputeRegistry};
pub use error::SpecError;
pub use record::Record;
