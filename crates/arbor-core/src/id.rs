//! Strongly-typed identifiers used across the workspace.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tree-local index of a halo within one merger tree's raw halo slice.
///
/// Structural links in [`RawHalo`](crate::raw::RawHalo) (progenitor,
/// descendant, group chains) are expressed as `HaloIdx` values into the
/// same slice. Indices are only meaningful within their own tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HaloIdx(pub u32);

impl HaloIdx {
    /// The index as a `usize`, for slice addressing.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for HaloIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for HaloIdx {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Snapshot number: one discrete cosmic time slice.
///
/// Snapshots ascend with cosmic time (snapshot 0 is the earliest).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapNum(pub u32);

impl SnapNum {
    /// The snapshot number as a `usize`, for table addressing.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SnapNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SnapNum {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies one merger tree within a run.
///
/// Assigned by the tree source; must be stable across repeated loads of
/// the same input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(pub u64);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TreeId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies a property (tracked per-halo or per-galaxy field) within
/// a compiled catalog.
///
/// Assigned sequentially at catalog compilation; `PropertyId(n)` is the
/// n-th descriptor across both categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub u32);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PropertyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Counter backing [`GalaxyTag::next`].
static GALAXY_TAG_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of one galaxy, stable across snapshots.
///
/// Assigned when a galaxy is first instantiated and carried forward
/// through progenitor inheritance, so the same galaxy keeps the same
/// tag across snapshots. Merger bookkeeping uses tags to locate a
/// galaxy's previous finalized record.
///
/// The traversal engine assigns tags from a per-tree sequence
/// ([`GalaxyTag::from_sequence`]) so that output records are
/// byte-identical across repeated runs; tags are therefore unique
/// within a tree, not across trees. [`GalaxyTag::next`] draws from a
/// process-global counter instead, for tests and fixtures that need
/// uniqueness without a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GalaxyTag(u64);

impl GalaxyTag {
    /// Allocate a fresh, process-unique tag. Thread-safe.
    pub fn next() -> Self {
        Self(GALAXY_TAG_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The tag for position `n` in a deterministic per-tree sequence.
    pub fn from_sequence(n: u64) -> Self {
        Self(n)
    }

    /// The tag's numeric value, for storing in integer record fields
    /// (merge-target bookkeeping).
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GalaxyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one halo group (all halos sharing a host structure at one
/// snapshot) for diagnostics and error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupId {
    /// The tree the group belongs to.
    pub tree: TreeId,
    /// The snapshot at which the group exists.
    pub snap: SnapNum,
    /// Tree-local index of the group's root (host) halo.
    pub root: HaloIdx,
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tree {} snapshot {} group {}",
            self.tree, self.snap, self.root
        )
    }
}
