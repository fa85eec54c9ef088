//! Catalog compilation and execution errors.

use arbor_core::{PropertyCategory, PropertyKind};
use std::error::Error;
use std::fmt;

/// Errors from descriptor validation and plan execution.
///
/// Compilation errors are definition-time failures: they abort startup
/// before any tree is processed and always name the offending
/// descriptor and the malformed or missing attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum SpecError {
    /// A descriptor name is not a valid identifier.
    InvalidIdentifier {
        /// The category the descriptor was declared in.
        category: PropertyCategory,
        /// The offending name.
        name: String,
    },
    /// Two descriptors in one category share a name.
    DuplicateName {
        /// The category the collision occurred in.
        category: PropertyCategory,
        /// The duplicated name.
        name: String,
    },
    /// A `Default` init value's kind does not match the descriptor.
    DefaultKindMismatch {
        /// The descriptor's name.
        name: String,
        /// The descriptor's declared kind.
        expected: PropertyKind,
        /// The default value's kind.
        got: PropertyKind,
    },
    /// A `Computed`, `Recompute`, or `Custom` rule names a computation
    /// missing from the registry.
    UnknownComputation {
        /// The descriptor's name.
        name: String,
        /// The unresolved computation name.
        function: String,
    },
    /// A source-field rule's kind does not match the descriptor.
    SourceKindMismatch {
        /// The descriptor's name.
        name: String,
        /// The descriptor's declared kind.
        expected: PropertyKind,
        /// The source field's kind.
        got: PropertyKind,
    },
    /// A conditional rule references a property not declared in the
    /// descriptor's category.
    UnknownProperty {
        /// The descriptor's name.
        name: String,
        /// The unresolved property reference.
        referenced: String,
    },
    /// A conditional's condition references a non-scalar property.
    ConditionNotScalar {
        /// The descriptor's name.
        name: String,
        /// The referenced property.
        referenced: String,
    },
    /// A conditional branch expression's kind does not match the
    /// descriptor.
    ExprKindMismatch {
        /// The descriptor's name.
        name: String,
        /// The descriptor's declared kind.
        expected: PropertyKind,
        /// The expression's kind.
        got: PropertyKind,
    },
    /// A vector-typed descriptor uses a rule that is not
    /// vector-compatible (conditional output).
    VectorRuleMismatch {
        /// The descriptor's name.
        name: String,
    },
    /// A validity range with `min > max` or a non-finite bound.
    InvalidRange {
        /// The descriptor's name.
        name: String,
        /// The declared lower bound.
        min: f64,
        /// The declared upper bound.
        max: f64,
    },
    /// A non-finite sentinel value.
    InvalidSentinel {
        /// The descriptor's name.
        name: String,
        /// The offending sentinel.
        value: f64,
    },
    /// A registered computation returned a value of the wrong kind at
    /// run time. Closure return kinds cannot be checked at compile
    /// time, so this is the one validation deferred to execution.
    ComputationKindMismatch {
        /// The descriptor's name.
        name: String,
        /// The computation that misbehaved.
        function: String,
        /// The descriptor's declared kind.
        expected: PropertyKind,
        /// The kind the computation returned.
        got: PropertyKind,
    },
    /// A record's storage does not match the category layout.
    StorageSizeMismatch {
        /// The category whose layout was expected.
        category: PropertyCategory,
        /// Slots the layout requires.
        expected: usize,
        /// Slots the record actually has.
        got: usize,
    },
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIdentifier { category, name } => {
                write!(f, "{category} property '{name}' is not a valid identifier")
            }
            Self::DuplicateName { category, name } => {
                write!(f, "{category} property '{name}' is declared twice")
            }
            Self::DefaultKindMismatch {
                name,
                expected,
                got,
            } => {
                write!(
                    f,
                    "property '{name}': default value is {got}, descriptor is {expected}"
                )
            }
            Self::UnknownComputation { name, function } => {
                write!(
                    f,
                    "property '{name}': computation '{function}' is not registered"
                )
            }
            Self::SourceKindMismatch {
                name,
                expected,
                got,
            } => {
                write!(
                    f,
                    "property '{name}': source field is {got}, descriptor is {expected}"
                )
            }
            Self::UnknownProperty { name, referenced } => {
                write!(
                    f,
                    "property '{name}': conditional references unknown property '{referenced}'"
                )
            }
            Self::ConditionNotScalar { name, referenced } => {
                write!(
                    f,
                    "property '{name}': condition property '{referenced}' is not a scalar"
                )
            }
            Self::ExprKindMismatch {
                name,
                expected,
                got,
            } => {
                write!(
                    f,
                    "property '{name}': conditional branch is {got}, descriptor is {expected}"
                )
            }
            Self::VectorRuleMismatch { name } => {
                write!(
                    f,
                    "property '{name}': vector fields cannot use conditional output"
                )
            }
            Self::InvalidRange { name, min, max } => {
                write!(f, "property '{name}': invalid range [{min}, {max}]")
            }
            Self::InvalidSentinel { name, value } => {
                write!(f, "property '{name}': non-finite sentinel {value}")
            }
            Self::ComputationKindMismatch {
                name,
                function,
                expected,
                got,
            } => {
                write!(
                    f,
                    "property '{name}': computation '{function}' returned {got}, expected {expected}"
                )
            }
            Self::StorageSizeMismatch {
                category,
                expected,
                got,
            } => {
                write!(
                    f,
                    "{category} record has {got} slots, layout requires {expected}"
                )
            }
        }
    }
}

impl Error for SpecError {}
