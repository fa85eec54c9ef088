//! Registry and pipeline error types.

use arbor_core::{GroupId, ModuleError};
use std::error::Error;
use std::fmt;

/// Errors from module registration and activation (startup-time).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A module with this name is already registered.
    DuplicateModule {
        /// The colliding name.
        name: String,
    },
    /// The activation list names a module that was never registered.
    UnknownModule {
        /// The unknown name.
        name: String,
    },
    /// A module requires a property with no earlier provider.
    ///
    /// Either no activated module provides it, or the provider appears
    /// *after* the requirer in the activation order — order is
    /// user-declared and never reshuffled automatically.
    UnsatisfiedRequirement {
        /// The module whose requirement is unmet.
        module: String,
        /// The property nobody provides early enough.
        property: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateModule { name } => {
                write!(f, "module '{name}' is already registered")
            }
            Self::UnknownModule { name } => {
                write!(f, "module '{name}' is not registered")
            }
            Self::UnsatisfiedRequirement { module, property } => {
                write!(
                    f,
                    "module '{module}' requires property '{property}', which no earlier-activated \
                     module or core field provides"
                )
            }
        }
    }
}

impl Error for RegistryError {}

/// Errors from pipeline lifecycle execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineError {
    /// A module's `init` failed; startup is aborted.
    InitFailed {
        /// The failing module.
        module: String,
        /// The underlying module error.
        error: ModuleError,
    },
    /// A module's `process` failed; the current tree is aborted.
    ModuleFailed {
        /// The failing module.
        module: String,
        /// The group being processed when it failed.
        group: GroupId,
        /// The underlying module error.
        error: ModuleError,
    },
    /// A lifecycle call arrived in the wrong phase.
    WrongPhase {
        /// The phase the call requires.
        expected: &'static str,
        /// The phase the pipeline was in.
        actual: &'static str,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed { module, error } => {
                write!(f, "module '{module}' failed to initialize: {error}")
            }
            Self::ModuleFailed {
                module,
                group,
                error,
            } => {
                write!(f, "module '{module}' failed on {group}: {error}")
            }
            Self::WrongPhase { expected, actual } => {
                write!(f, "pipeline is {actual}, call requires {expected}")
            }
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InitFailed { error, .. } | Self::ModuleFailed { error, .. } => Some(error),
            Self::WrongPhase { .. } => None,
        }
    }
}

/// One module's failed cleanup, surfaced as a warning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupFailure {
    /// The module whose cleanup failed.
    pub module: String,
    /// The underlying module error.
    pub error: ModuleError,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module '{}' cleanup failed: {}", self.module, self.error)
    }
}
