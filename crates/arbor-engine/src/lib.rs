//! Run orchestration for Arbor simulations.
//!
//! The engine ties the workspace together: it loads run parameters
//! from TOML, compiles the property catalog (core halo fields plus the
//! active modules' declared galaxy fields), activates and initializes
//! the module pipeline, and then evolves every tree from a source
//! inside its own leak-checked region, handing finalized records to
//! the sink. A failing tree is logged, its region closed, and the run
//! continues or aborts according to the configured policy.
//!
//! Trees are embarrassingly independent, so [`parallel::ParallelRunner`]
//! fans whole trees out to worker threads, each with its own pipeline,
//! scratch, sink, and regions; the shared catalog, time grid, and
//! parameters are read-only.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod parallel;
pub mod params;
pub mod run;
pub mod summary;

pub use config::BuildError;
pub use parallel::{ParallelRunner, WorkerRun};
pub use params::{ErrorPolicy, ParamsError, RunParameters};
pub use run::SimulationEngine;
pub use summary::{FailureCause, RunSummary, TreeFailure};
