//! Allocation categories for diagnostics.

use std::fmt;

/// Diagnostic tag for region allocations.
///
/// Categories do not change allocation behavior; they partition the
/// region's accounting so that memory reports can say *what* grew, not
/// just that something did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocCategory {
    /// Raw merger-tree records and traversal scaffolding.
    TreeStructural,
    /// Working halo records for the snapshot being processed.
    HaloWorking,
    /// Galaxy state records.
    GalaxyState,
    /// Output-record staging before hand-off to the sink.
    IoStaging,
    /// Short-lived utility buffers.
    Scratch,
}

impl AllocCategory {
    /// All categories, in accounting order.
    pub const ALL: [AllocCategory; 5] = [
        Self::TreeStructural,
        Self::HaloWorking,
        Self::GalaxyState,
        Self::IoStaging,
        Self::Scratch,
    ];

    /// Stable index into per-category accounting arrays.
    pub fn index(self) -> usize {
        match self {
            Self::TreeStructural => 0,
            Self::HaloWorking => 1,
            Self::GalaxyState => 2,
            Self::IoStaging => 3,
            Self::Scratch => 4,
        }
    }

    /// Kebab-case name for reports and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TreeStructural => "tree-structural",
            Self::HaloWorking => "halo-working",
            Self::GalaxyState => "galaxy-state",
            Self::IoStaging => "io-staging",
            Self::Scratch => "scratch",
        }
    }
}

impl fmt::Display for AllocCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_dense_and_distinct() {
        for (i, cat) in AllocCategory::ALL.iter().enumerate() {
            assert_eq!(cat.index(), i);
        }
    }
}
