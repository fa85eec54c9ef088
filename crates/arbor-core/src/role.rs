//! Halo roles and merge tracking.

use crate::id::GalaxyTag;
use std::fmt;

/// The role a halo holds within its host group at one snapshot.
///
/// Exactly one role holds per halo per snapshot. Roles are assigned by
/// the traversal engine before module execution and are immutable for
/// the remainder of that snapshot's processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HaloRole {
    /// Top of its halo group; hosts the group's central galaxy.
    Central,
    /// Member of a group with a surviving subhalo of its own.
    Satellite,
    /// Its subhalo was lost by the source tree, but the galaxy is still
    /// tracked (virial mass zeroed).
    Orphan,
}

impl HaloRole {
    /// Integer code used in output records (0 central, 1 satellite,
    /// 2 orphan), matching the conventional type column.
    pub fn code(self) -> i64 {
        match self {
            Self::Central => 0,
            Self::Satellite => 1,
            Self::Orphan => 2,
        }
    }

    /// Lowercase name for logging and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Central => "central",
            Self::Satellite => "satellite",
            Self::Orphan => "orphan",
        }
    }
}

impl fmt::Display for HaloRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merge status of a galaxy, written by physics modules.
///
/// The core never sets `MergedInto` or `Disrupted` itself; it only
/// reacts to them at finalization by recording the merge on the
/// galaxy's last surviving record and dropping it from the
/// carried-forward set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeState {
    /// The galaxy survives to the next snapshot.
    Alive,
    /// The galaxy merged into another galaxy this snapshot.
    MergedInto {
        /// Tag of the galaxy that absorbed it.
        target: GalaxyTag,
    },
    /// The galaxy was tidally disrupted this snapshot.
    Disrupted,
}

impl MergeState {
    /// Integer code for output records (0 alive, 1 merged, 2 disrupted).
    pub fn code(self) -> i64 {
        match self {
            Self::Alive => 0,
            Self::MergedInto { .. } => 1,
            Self::Disrupted => 2,
        }
    }

    /// Whether the galaxy is gone after this snapshot.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_codes_are_distinct() {
        let codes = [
            HaloRole::Central.code(),
            HaloRole::Satellite.code(),
            HaloRole::Orphan.code(),
        ];
        assert_eq!(codes, [0, 1, 2]);
    }

    #[test]
    fn merged_and_disrupted_are_terminal() {
        assert!(!MergeState::Alive.is_terminal());
        assert!(MergeState::Disrupted.is_terminal());
        assert!(MergeState::MergedInto {
            target: GalaxyTag::next()
        }
        .is_terminal());
    }
}
