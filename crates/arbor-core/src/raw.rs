//! The immutable merger-tree input record and its named fields.

use crate::id::{HaloIdx, SnapNum};
use crate::property::{PropertyKind, PropertyValue};

/// One halo as read from the merger-tree source for one snapshot.
///
/// Structural links are tree-local indices; `None` marks the end of a
/// chain (the source format's `-1` sentinels are resolved at load
/// time). A `RawHalo` is allocated once per loaded tree, read-only for
/// the remainder of processing, and freed when the tree's region
/// closes.
#[derive(Clone, Debug, PartialEq)]
pub struct RawHalo {
    /// The halo this one merges into at a later snapshot, if any.
    pub descendant: Option<HaloIdx>,
    /// Head of this halo's progenitor chain (most massive first in
    /// well-formed inputs, but the engine does not rely on that).
    pub first_progenitor: Option<HaloIdx>,
    /// Next sibling in the progenitor chain of this halo's descendant.
    pub next_progenitor: Option<HaloIdx>,
    /// Root (host) halo of the group this halo belongs to at this
    /// snapshot. A group root points to itself.
    pub first_in_group: HaloIdx,
    /// Next halo in this halo's group chain.
    pub next_in_group: Option<HaloIdx>,
    /// Snapshot at which this halo exists.
    pub snap: SnapNum,
    /// Number of bound particles.
    pub len: u32,
    /// Spherical-overdensity virial mass in 10^10 Msun/h. Non-positive
    /// means the source did not provide one; the particle-count mass is
    /// used instead.
    pub mvir: f64,
    /// Comoving position in Mpc/h.
    pub pos: [f64; 3],
    /// Peculiar velocity in km/s.
    pub vel: [f64; 3],
    /// Specific angular momentum in (Mpc/h)(km/s).
    pub spin: [f64; 3],
    /// 1D velocity dispersion in km/s.
    pub vel_disp: f64,
    /// Maximum circular velocity in km/s.
    pub vmax: f64,
    /// Most-bound particle ID, or any source-stable unique halo ID.
    pub most_bound_id: i64,
}

impl RawHalo {
    /// Whether this halo is the root of its group.
    pub fn is_group_root(&self, own_index: HaloIdx) -> bool {
        self.first_in_group == own_index
    }
}

/// Names one physical field of [`RawHalo`] for use in descriptor rules.
///
/// `copied-from-source` initialization and `from-source` output rules
/// reference raw fields through this enum, so a descriptor can never
/// name a field that does not exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceField {
    /// Snapshot number (integer).
    Snap,
    /// Bound particle count (integer).
    Len,
    /// Spherical-overdensity virial mass (scalar).
    Mvir,
    /// Comoving position (3-vector).
    Pos,
    /// Peculiar velocity (3-vector).
    Vel,
    /// Specific angular momentum (3-vector).
    Spin,
    /// Velocity dispersion (scalar).
    VelDisp,
    /// Maximum circular velocity (scalar).
    Vmax,
    /// Most-bound particle ID (integer).
    MostBoundId,
}

impl SourceField {
    /// The property kind a descriptor must have to copy this field.
    pub fn kind(self) -> PropertyKind {
        match self {
            Self::Snap | Self::Len | Self::MostBoundId => PropertyKind::Int,
            Self::Mvir | Self::VelDisp | Self::Vmax => PropertyKind::Scalar,
            Self::Pos | Self::Vel | Self::Spin => PropertyKind::Vec3,
        }
    }

    /// Read this field's value from a raw halo.
    pub fn read(self, halo: &RawHalo) -> PropertyValue {
        match self {
            Self::Snap => PropertyValue::Int(i64::from(halo.snap.0)),
            Self::Len => PropertyValue::Int(i64::from(halo.len)),
            Self::Mvir => PropertyValue::Scalar(halo.mvir),
            Self::Pos => PropertyValue::Vec3(halo.pos),
            Self::Vel => PropertyValue::Vec3(halo.vel),
            Self::Spin => PropertyValue::Vec3(halo.spin),
            Self::VelDisp => PropertyValue::Scalar(halo.vel_disp),
            Self::Vmax => PropertyValue::Scalar(halo.vmax),
            Self::MostBoundId => PropertyValue::Int(halo.most_bound_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_halo() -> RawHalo {
        RawHalo {
            descendant: None,
            first_progenitor: None,
            next_progenitor: None,
            first_in_group: HaloIdx(0),
            next_in_group: None,
            snap: SnapNum(4),
            len: 250,
            mvir: 1.5,
            pos: [1.0, 2.0, 3.0],
            vel: [10.0, 20.0, 30.0],
            spin: [0.1, 0.2, 0.3],
            vel_disp: 85.0,
            vmax: 160.0,
            most_bound_id: 900_000_001,
        }
    }

    #[test]
    fn group_root_is_self_referential() {
        let halo = sample_halo();
        assert!(halo.is_group_root(HaloIdx(0)));
        assert!(!halo.is_group_root(HaloIdx(1)));
    }

    #[test]
    fn source_field_reads_match_kinds() {
        let halo = sample_halo();
        for field in [
            SourceField::Snap,
            SourceField::Len,
            SourceField::Mvir,
            SourceField::Pos,
            SourceField::Vel,
            SourceField::Spin,
            SourceField::VelDisp,
            SourceField::Vmax,
            SourceField::MostBoundId,
        ] {
            assert_eq!(field.read(&halo).kind(), field.kind());
        }
    }

    #[test]
    fn vec3_fields_read_componentwise() {
        let halo = sample_halo();
        assert_eq!(
            SourceField::Pos.read(&halo),
            PropertyValue::Vec3([1.0, 2.0, 3.0])
        );
    }
}
