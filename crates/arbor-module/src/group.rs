//! Working halo state and the per-group view handed to modules.

use arbor_catalog::Record;
use arbor_core::{GalaxyTag, GroupId, HaloIdx, HaloRole, MergeState, SnapNum};

/// The mutable working state of one halo-instance being processed.
///
/// Created by the traversal engine when a halo is first instantiated —
/// either fresh, or by copying forward from its progenitor — and
/// destroyed when the tree's region closes. The `halo` record carries
/// every halo-category catalog field; the `galaxy` record is
/// exclusively owned and deep-copied on inheritance, never aliased, so
/// sibling branches cannot observe each other's mutations.
#[derive(Debug)]
pub struct WorkingHalo {
    /// Index of the raw halo this working state currently occupies.
    pub raw_index: HaloIdx,
    /// Snapshot being processed.
    pub snap: SnapNum,
    /// Role this snapshot; assigned before module execution and
    /// immutable until the snapshot is finalized.
    pub role: HaloRole,
    /// Merge status, written by modules.
    pub merge: MergeState,
    /// Persistent identity of the carried galaxy.
    pub tag: GalaxyTag,
    /// Cosmic time elapsed since the progenitor snapshot, in Gyr/h.
    /// Strictly positive for inherited halos; zero only for a fresh
    /// halo at the first snapshot.
    pub dt: f64,
    /// Halo-category record (virial quantities, merge bookkeeping,
    /// kinematics).
    pub halo: Record,
    /// Galaxy-category record (baryonic reservoirs).
    pub galaxy: Record,
}

/// One halo group at one snapshot: the unit of module execution.
///
/// All halos sharing a host structure are processed together in a
/// single `process` call, because module physics legitimately needs
/// visibility across siblings within a group.
#[derive(Debug)]
pub struct HaloGroup<'a> {
    id: GroupId,
    central: usize,
    members: &'a mut [WorkingHalo],
}

impl<'a> HaloGroup<'a> {
    /// Wrap a group's members for module execution.
    ///
    /// # Panics
    ///
    /// Panics unless `members[central]` is the group's single
    /// `Central` — one central per group is a core invariant the
    /// traversal engine establishes before any module runs.
    pub fn new(id: GroupId, members: &'a mut [WorkingHalo], central: usize) -> Self {
        assert!(
            members[central].role == HaloRole::Central,
            "{id}: member {central} is not the central"
        );
        let centrals = members
            .iter()
            .filter(|m| m.role == HaloRole::Central)
            .count();
        assert_eq!(centrals, 1, "{id}: expected exactly one central, found {centrals}");
        Self {
            id,
            central,
            members,
        }
    }

    /// Group identity for error reporting.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Number of halos in the group.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group is empty (never true for a constructed group).
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Index of the central within the member slice.
    pub fn central_index(&self) -> usize {
        self.central
    }

    /// Read access to all members.
    pub fn members(&self) -> &[WorkingHalo] {
        self.members
    }

    /// Mutable access to all members.
    pub fn members_mut(&mut self) -> &mut [WorkingHalo] {
        self.members
    }

    /// The group's central.
    pub fn central(&self) -> &WorkingHalo {
        &self.members[self.central]
    }

    /// The group's central, mutably.
    pub fn central_mut(&mut self) -> &mut WorkingHalo {
        &mut self.members[self.central]
    }

    /// Two distinct members mutably at once (e.g. a merging satellite
    /// and the central absorbing it).
    ///
    /// # Panics
    ///
    /// Panics if `a == b` or either index is out of bounds.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (&mut WorkingHalo, &mut WorkingHalo) {
        assert_ne!(a, b, "pair_mut needs two distinct members");
        if a < b {
            let (left, right) = self.members.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.members.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }
}
