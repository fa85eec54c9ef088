//! Arena-specific error types.

use crate::category::AllocCategory;
use std::error::Error;
use std::fmt;

/// Errors from region allocation and close.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// An allocation would exceed the category's byte cap.
    ///
    /// Fatal for the current tree only; the region can still be closed
    /// cleanly.
    BudgetExceeded {
        /// The category whose cap was hit.
        category: AllocCategory,
        /// Bytes requested by the failing allocation.
        requested: u64,
        /// Bytes already live in the category.
        live: u64,
        /// The configured cap.
        budget: u64,
    },
    /// `close()` found buffers still alive.
    ///
    /// Something holds a [`RegionBuf`](crate::buffer::RegionBuf) that
    /// should have been dropped before the region closed. This is a
    /// programming error in the caller, surfaced loudly with the
    /// categories and byte counts involved.
    LiveAllocations {
        /// Per-category live byte counts at close time (non-zero only).
        live: Vec<(AllocCategory, u64)>,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExceeded {
                category,
                requested,
                live,
                budget,
            } => {
                write!(
                    f,
                    "{category} budget exceeded: requested {requested} bytes with {live} live, cap {budget}"
                )
            }
            Self::LiveAllocations { live } => {
                write!(f, "region closed with live allocations:")?;
                for (category, bytes) in live {
                    write!(f, " {category}={bytes}B")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for ArenaError {}
