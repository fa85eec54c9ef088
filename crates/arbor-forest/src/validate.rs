//! Structural validation of a loaded merger tree.
//!
//! Runs once per tree, immediately after load. Everything the walker
//! and inheritance code rely on is established here, so the hot path
//! can index without re-checking: links are in range, descendants are
//! strictly later in time, chains are acyclic, and every halo belongs
//! to exactly the group its `first_in_group` claims.

use arbor_core::{HaloIdx, RawHalo, TreeStructureError};

fn check_link(
    halos: &[RawHalo],
    halo: HaloIdx,
    link: &'static str,
    target: Option<HaloIdx>,
) -> Result<(), TreeStructureError> {
    if let Some(target) = target {
        if target.index() >= halos.len() {
            return Err(TreeStructureError::LinkOutOfRange { halo, link, target });
        }
    }
    Ok(())
}

/// Validate a tree's structural links.
///
/// A failure is fatal for this tree only and names the offending halo;
/// no state escapes to other trees.
pub fn validate_structure(halos: &[RawHalo]) -> Result<(), TreeStructureError> {
    let n = halos.len();

    // Link ranges first, so the chain walks below can index freely.
    for (i, halo) in halos.iter().enumerate() {
        let idx = HaloIdx(i as u32);
        check_link(halos, idx, "descendant", halo.descendant)?;
        check_link(halos, idx, "first_progenitor", halo.first_progenitor)?;
        check_link(halos, idx, "next_progenitor", halo.next_progenitor)?;
        check_link(halos, idx, "first_in_group", Some(halo.first_in_group))?;
        check_link(halos, idx, "next_in_group", halo.next_in_group)?;
    }

    // Descendants must live strictly later; progenitor chains walk
    // strictly earlier halos, so time ordering alone rules out cycles
    // through descendant links.
    for (i, halo) in halos.iter().enumerate() {
        if let Some(desc) = halo.descendant {
            if halos[desc.index()].snap <= halo.snap {
                return Err(TreeStructureError::DescendantNotLater {
                    halo: HaloIdx(i as u32),
                    descendant: desc,
                });
            }
        }
    }

    // Progenitor sibling chains: bounded walk catches self-referential
    // chains regardless of snapshot values.
    for (i, halo) in halos.iter().enumerate() {
        let mut steps = 0usize;
        let mut cursor = halo.first_progenitor;
        while let Some(p) = cursor {
            steps += 1;
            if steps > n {
                return Err(TreeStructureError::ProgenitorCycle { halo: p });
            }
            if halos[p.index()].snap >= halo.snap {
                return Err(TreeStructureError::DescendantNotLater {
                    halo: p,
                    descendant: HaloIdx(i as u32),
                });
            }
            cursor = halos[p.index()].next_progenitor;
        }
    }

    // Group chains: every declared root must be self-rooted, chains
    // must stay within one snapshot and terminate, and every halo must
    // actually be reachable from its declared root.
    let mut reached = vec![false; n];
    for (i, halo) in halos.iter().enumerate() {
        let idx = HaloIdx(i as u32);
        if !halo.is_group_root(idx) {
            continue;
        }
        let mut steps = 0usize;
        let mut cursor = Some(idx);
        while let Some(m) = cursor {
            steps += 1;
            if steps > n {
                return Err(TreeStructureError::GroupCycle { halo: m });
            }
            let member = &halos[m.index()];
            if member.first_in_group != idx || member.snap != halo.snap {
                return Err(TreeStructureError::StrandedHalo { halo: m });
            }
            reached[m.index()] = true;
            cursor = member.next_in_group;
        }
    }
    for (i, seen) in reached.iter().enumerate() {
        if !seen {
            return Err(TreeStructureError::StrandedHalo {
                halo: HaloIdx(i as u32),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::SnapNum;
    use arbor_test_utils::TreeBuilder;

    #[test]
    fn well_formed_tree_passes() {
        let mut builder = TreeBuilder::new();
        let a = builder.add_halo(0, 1.0);
        let b = builder.add_halo(0, 0.5);
        let c = builder.add_halo(1, 1.6);
        builder.link_descendant(a, c).link_descendant(b, c);
        assert!(validate_structure(&builder.build()).is_ok());
    }

    #[test]
    fn out_of_range_descendant_names_halo_and_link() {
        let mut builder = TreeBuilder::new();
        let a = builder.add_halo(0, 1.0);
        let mut halos = builder.build();
        halos[a.index()].descendant = Some(HaloIdx(99));
        match validate_structure(&halos) {
            Err(TreeStructureError::LinkOutOfRange { halo, link, target }) => {
                assert_eq!(halo, a);
                assert_eq!(link, "descendant");
                assert_eq!(target, HaloIdx(99));
            }
            other => panic!("expected LinkOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn descendant_at_same_snapshot_rejected() {
        let mut builder = TreeBuilder::new();
        let a = builder.add_halo(1, 1.0);
        let b = builder.add_halo(1, 2.0);
        let mut halos = builder.build();
        halos[a.index()].descendant = Some(b);
        assert!(matches!(
            validate_structure(&halos),
            Err(TreeStructureError::DescendantNotLater { .. })
        ));
    }

    #[test]
    fn progenitor_sibling_cycle_detected() {
        let mut builder = TreeBuilder::new();
        let a = builder.add_halo(0, 1.0);
        let b = builder.add_halo(0, 0.5);
        let c = builder.add_halo(1, 1.6);
        builder.link_descendant(a, c).link_descendant(b, c);
        let mut halos = builder.build();
        // b's sibling link loops back to a.
        halos[b.index()].next_progenitor = Some(a);
        assert!(matches!(
            validate_structure(&halos),
            Err(TreeStructureError::ProgenitorCycle { .. })
        ));
    }

    #[test]
    fn group_chain_cycle_detected() {
        let mut builder = TreeBuilder::new();
        let root = builder.add_halo(0, 2.0);
        let sat = builder.add_halo(0, 0.4);
        builder.join_group(root, sat);
        let mut halos = builder.build();
        halos[sat.index()].next_in_group = Some(sat);
        assert!(matches!(
            validate_structure(&halos),
            Err(TreeStructureError::GroupCycle { .. }) | Err(TreeStructureError::StrandedHalo { .. })
        ));
    }

    #[test]
    fn halo_pointing_at_foreign_group_root_is_stranded() {
        let mut builder = TreeBuilder::new();
        let root = builder.add_halo(0, 2.0);
        let stray = builder.add_halo(0, 0.3);
        let mut halos = builder.build();
        // stray claims root's group but root's chain never reaches it.
        halos[stray.index()].first_in_group = root;
        match validate_structure(&halos) {
            Err(TreeStructureError::StrandedHalo { halo }) => assert_eq!(halo, stray),
            other => panic!("expected StrandedHalo, got {other:?}"),
        }
    }

    #[test]
    fn group_member_at_wrong_snapshot_is_stranded() {
        let mut builder = TreeBuilder::new();
        let root = builder.add_halo(0, 2.0);
        let sat = builder.add_halo(0, 0.4);
        builder.join_group(root, sat);
        let mut halos = builder.build();
        halos[sat.index()].snap = SnapNum(1);
        assert!(matches!(
            validate_structure(&halos),
            Err(TreeStructureError::StrandedHalo { .. })
        ));
    }

    #[test]
    fn random_forests_always_validate() {
        for tree in arbor_test_utils::random_forest(123, 8, 15) {
            validate_structure(&tree.halos).unwrap();
        }
    }

    mod fuzz {
        use super::*;
        use crate::walk::plan_traversal;
        use proptest::prelude::*;

        /// Arbitrary (frequently malformed) halo arrays: links may be
        /// out of range or self-referential.
        fn arb_halos() -> impl Strategy<Value = Vec<RawHalo>> {
            prop::collection::vec(
                (
                    prop::option::of(0u32..12),
                    prop::option::of(0u32..12),
                    prop::option::of(0u32..12),
                    0u32..12,
                    prop::option::of(0u32..12),
                    0u32..6,
                ),
                1..10,
            )
            .prop_map(|rows| {
                rows.into_iter()
                    .map(|(desc, first_prog, next_prog, group, next_group, snap)| RawHalo {
                        descendant: desc.map(HaloIdx),
                        first_progenitor: first_prog.map(HaloIdx),
                        next_progenitor: next_prog.map(HaloIdx),
                        first_in_group: HaloIdx(group),
                        next_in_group: next_group.map(HaloIdx),
                        snap: SnapNum(snap),
                        len: 10,
                        mvir: 1.0,
                        pos: [0.0; 3],
                        vel: [0.0; 3],
                        spin: [0.0; 3],
                        vel_disp: 0.0,
                        vmax: 0.0,
                        most_bound_id: 0,
                    })
                    .collect()
            })
        }

        proptest! {
            /// Validation is total: garbage links produce errors,
            /// never panics, and an accepted tree always yields a
            /// plan covering every halo exactly once.
            #[test]
            fn validation_is_total_and_accepted_trees_plan_fully(halos in arb_halos()) {
                if validate_structure(&halos).is_ok() {
                    let plan = plan_traversal(&halos);
                    let planned: usize = plan.iter().map(|p| p.members.len()).sum();
                    prop_assert_eq!(planned, halos.len());
                }
            }
        }
    }
}
