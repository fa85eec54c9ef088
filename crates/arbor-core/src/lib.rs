//! Core types and traits for the Arbor galaxy-evolution framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Arbor workspace:
//! strongly-typed identifiers, the raw merger-tree input record, halo
//! roles, property descriptors, the cosmological time grid, error
//! types, and the boundary traits for tree sources and output sinks.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod property;
pub mod raw;
pub mod role;
pub mod time;
pub mod traits;

pub use error::{
    ModuleError, ParameterError, SinkError, SourceError, TimeError, TreeStructureError,
};
pub use id::{GalaxyTag, GroupId, HaloIdx, PropertyId, SnapNum, TreeId};
pub use property::{
    InitRule, OutputCondition, OutputExpr, OutputRecord, OutputRule, PropertyCategory,
    PropertyDescriptor, PropertyKind, PropertySet, PropertyValue,
};
pub use raw::{RawHalo, SourceField};
pub use role::{HaloRole, MergeState};
pub use time::{Cosmology, TimeGrid};
pub use traits::{OutputSink, ParameterSource, TreeData, TreeSource};
