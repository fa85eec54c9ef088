//! The per-tree evolution driver.

use tracing::{debug, error, info};

use arbor_arena::{AllocCategory, ForestRegion, RegionBudget, RegionReport, ScratchRegion};
use arbor_catalog::{Catalog, ComputeEnv, ComputeRegistry};
use arbor_core::{
    GroupId, HaloRole, MergeState, OutputSink, ParameterSource, RawHalo, TimeGrid, TreeData,
    TreeId,
};
use arbor_module::{ActivePipeline, GroupContext, HaloGroup, WorkingHalo};

use crate::error::{EvolveError, EvolveErrorKind, SetupError};
use crate::inherit::{fresh_central, join_progenitors, Finalized, InheritCtx, Track};
use crate::properties::CoreHaloFields;
use crate::validate::validate_structure;
use crate::walk::plan_traversal;

/// Statistics from one successfully evolved tree.
#[derive(Clone, Debug)]
pub struct TreeOutcome {
    /// The evolved tree.
    pub tree: TreeId,
    /// Raw halos in the tree.
    pub halos: usize,
    /// Halo groups evaluated.
    pub groups: usize,
    /// Output records emitted.
    pub records: usize,
    /// Final region accounting (allocated == freed).
    pub report: RegionReport,
}

/// Evolves one merger tree at a time through the full per-tree state
/// machine: `Loaded → Traversing → Finalizing → Closed`.
///
/// Construction resolves the core halo accessors once; `evolve` can
/// then be called for any number of trees. Each call opens a fresh
/// region, and the region is closed on **every** exit path — a
/// malformed tree or failing module aborts that tree only, with its
/// memory released and accounted.
pub struct TreeEvolver<'a> {
    catalog: &'a Catalog,
    computes: &'a ComputeRegistry,
    grid: &'a TimeGrid,
    params: &'a dyn ParameterSource,
    fields: CoreHaloFields,
    particle_mass: f64,
    budget: RegionBudget,
}

impl<'a> TreeEvolver<'a> {
    /// Create an evolver over a compiled catalog.
    ///
    /// Fails at startup if the catalog lacks the core halo fields.
    pub fn new(
        catalog: &'a Catalog,
        computes: &'a ComputeRegistry,
        grid: &'a TimeGrid,
        params: &'a dyn ParameterSource,
        particle_mass: f64,
        budget: RegionBudget,
    ) -> Result<Self, SetupError> {
        let fields = CoreHaloFields::resolve(catalog)?;
        Ok(Self {
            catalog,
            computes,
            grid,
            params,
            fields,
            particle_mass,
            budget,
        })
    }

    /// Evolve one tree and hand its finalized records to the sink.
    ///
    /// The pipeline must be initialized. On success every byte
    /// allocated for the tree has been freed and accounted in the
    /// returned report; on failure the region is still closed before
    /// the error is returned, so subsequent trees start clean.
    pub fn evolve(
        &self,
        tree: &TreeData,
        pipeline: &mut ActivePipeline,
        scratch: &mut ScratchRegion,
        sink: &mut dyn OutputSink,
    ) -> Result<TreeOutcome, EvolveError> {
        let region = ForestRegion::open(self.budget.clone());
        let result = self.run(&region, tree, pipeline, scratch, sink);
        match result {
            Ok((groups, records)) => {
                let report = region.close().map_err(|e| EvolveError {
                    tree: tree.tree_id,
                    kind: e.into(),
                })?;
                info!(
                    tree = %tree.tree_id,
                    halos = tree.halos.len(),
                    groups,
                    records,
                    "tree evolved"
                );
                Ok(TreeOutcome {
                    tree: tree.tree_id,
                    halos: tree.halos.len(),
                    groups,
                    records,
                    report,
                })
            }
            Err(kind) => {
                // All per-tree state lives inside run() and has been
                // dropped; the close can only fail on a genuine leak.
                if let Err(leak) = region.close() {
                    error!(tree = %tree.tree_id, %leak, "region leak during abort");
                }
                Err(EvolveError {
                    tree: tree.tree_id,
                    kind,
                })
            }
        }
    }

    fn run(
        &self,
        region: &ForestRegion,
        tree: &TreeData,
        pipeline: &mut ActivePipeline,
        scratch: &mut ScratchRegion,
        sink: &mut dyn OutputSink,
    ) -> Result<(usize, usize), EvolveErrorKind> {
        // Loaded: structural checks and accounting for the raw records.
        validate_structure(&tree.halos)?;
        let structural_bytes =
            (tree.halos.len() * (std::mem::size_of::<RawHalo>() + std::mem::size_of::<Track>()))
                as u64;
        let _structural = region.charge(AllocCategory::TreeStructural, structural_bytes)?;

        let plan = plan_traversal(&tree.halos);
        let mut track = vec![Track::default(); tree.halos.len()];
        let mut store: Vec<Finalized> = Vec::new();

        let ctx = InheritCtx {
            halos: &tree.halos,
            catalog: self.catalog,
            fields: &self.fields,
            computes: self.computes,
            grid: self.grid,
            cosmology: self.grid.cosmology(),
            particle_mass: self.particle_mass,
            region,
        };

        // Traversing: one group at a time, progenitors always first.
        // Fresh galaxies draw tags from a per-tree sequence so repeated
        // runs produce byte-identical records.
        let mut groups = 0usize;
        let mut next_tag = 0u64;
        let mut fresh_tag = || {
            next_tag += 1;
            arbor_core::GalaxyTag::from_sequence(next_tag)
        };
        for group in &plan {
            let redshift = self.grid.redshift(group.snap)?;
            let mut workspace: Vec<WorkingHalo> = Vec::new();

            for &member in &group.members {
                let before = workspace.len();
                join_progenitors(
                    &ctx,
                    member,
                    group.snap,
                    redshift,
                    &store,
                    &track,
                    &mut workspace,
                )?;
                if workspace.len() == before
                    && tree.halos[member.index()].is_group_root(member)
                {
                    workspace.push(fresh_central(&ctx, member, group.snap, redshift, fresh_tag())?);
                }
            }

            // Degenerate groups (every inherited galaxy an orphan) get
            // a fresh central so the one-central invariant holds.
            if !workspace.iter().any(|w| w.role == HaloRole::Central) {
                debug!(tree = %tree.tree_id, root = %group.root, "group without central, seeding one");
                workspace.insert(
                    0,
                    fresh_central(&ctx, group.root, group.snap, redshift, fresh_tag())?,
                );
            }
            let central = workspace
                .iter()
                .position(|w| w.role == HaloRole::Central)
                .expect("a central exists after the fallback above");

            let gid = GroupId {
                tree: tree.tree_id,
                snap: group.snap,
                root: group.root,
            };
            {
                let mut halo_group = HaloGroup::new(gid, &mut workspace, central);
                let mut group_ctx = GroupContext {
                    snap: group.snap,
                    redshift,
                    time: self.grid,
                    catalog: self.catalog,
                    params: self.params,
                    scratch: &mut *scratch,
                };
                pipeline.run_group(&mut group_ctx, &mut halo_group)?;
            }

            self.finalize_group(workspace, &mut store, &mut track);
            groups += 1;
        }

        // Finalizing: emit one record per finalized working halo, in
        // traversal order. Merge bookkeeping is complete by now, so
        // every record carries its final merge fields.
        let mut records = 0usize;
        for entry in &store {
            let env = ComputeEnv {
                raw: &tree.halos[entry.raw_index.index()],
                role: entry.role,
                redshift: self.grid.redshift(entry.snap)?,
                cosmology: self.grid.cosmology(),
                computes: self.computes,
            };
            let record =
                self.catalog
                    .build_output(entry.raw_index, entry.tag, &entry.halo, &entry.galaxy, &env)?;
            sink.accept(tree.tree_id, entry.snap, record)?;
            records += 1;
        }

        // Closed: store and charges drop here; the caller's close()
        // verifies nothing is left.
        Ok((groups, records))
    }

    /// Move a processed group's survivors into the per-tree store and
    /// record merges on their previous snapshot's entries.
    fn finalize_group(
        &self,
        workspace: Vec<WorkingHalo>,
        store: &mut Vec<Finalized>,
        track: &mut [Track],
    ) {
        let fields = &self.fields;
        let mut current_member = None;
        for halo in workspace {
            if current_member != Some(halo.raw_index) {
                current_member = Some(halo.raw_index);
                track[halo.raw_index.index()] = Track {
                    first_out: store.len(),
                    n_out: 0,
                };
            }
            match halo.merge {
                MergeState::Alive => {
                    track[halo.raw_index.index()].n_out += 1;
                    store.push(Finalized {
                        raw_index: halo.raw_index,
                        snap: halo.snap,
                        role: halo.role,
                        tag: halo.tag,
                        halo: halo.halo,
                        galaxy: halo.galaxy,
                    });
                }
                MergeState::MergedInto { target } => {
                    // The galaxy's last surviving record is its entry
                    // at the previous snapshot; stamp the merge there.
                    if let Some(prev) = store.iter_mut().rev().find(|e| e.tag == halo.tag) {
                        prev.halo.set_int(fields.merge_status, halo.merge.code());
                        prev.halo.set_int(fields.merge_target, target.raw() as i64);
                        prev.halo.set_int(fields.merge_snap, i64::from(halo.snap.0));
                    }
                    // Records drop here; the galaxy is gone.
                }
                MergeState::Disrupted => {
                    if let Some(prev) = store.iter_mut().rev().find(|e| e.tag == halo.tag) {
                        prev.halo.set_int(fields.merge_status, halo.merge.code());
                        prev.halo.set_int(fields.merge_snap, i64::from(halo.snap.0));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{core_halo_descriptors, core_provided_names};
    use crate::virial::register_core_computations;
    use arbor_catalog::CatalogSpec;
    use arbor_core::{Cosmology, ModuleError, PropertyValue, SnapNum};
    use arbor_module::{GalaxyModule, ModuleInit, ModuleRegistry};
    use arbor_test_utils::{FixedParameters, MemorySink, TreeBuilder};

    const PARTICLE_MASS: f64 = 0.01;

    struct Harness {
        catalog: Catalog,
        computes: ComputeRegistry,
        grid: TimeGrid,
        params: FixedParameters,
    }

    fn harness_with(galaxy: Vec<arbor_core::PropertyDescriptor>) -> Harness {
        let mut computes = ComputeRegistry::new();
        register_core_computations(&mut computes, PARTICLE_MASS);
        let catalog = CatalogSpec {
            halo: core_halo_descriptors(),
            galaxy,
        }
        .compile(&computes)
        .unwrap();
        let grid = TimeGrid::new(
            Cosmology {
                omega_m: 0.25,
                omega_lambda: 0.75,
                hubble_h: 0.73,
            },
            &[4.0, 2.0, 1.0, 0.5, 0.0],
        )
        .unwrap();
        Harness {
            catalog,
            computes,
            grid,
            params: FixedParameters::new(),
        }
    }

    fn harness() -> Harness {
        harness_with(vec![])
    }

    fn empty_pipeline() -> ActivePipeline {
        let mut pipeline = ModuleRegistry::new().activate(&[], &[]).unwrap();
        // init_all on an empty pipeline is how physics-free mode runs.
        let h = harness();
        pipeline
            .init_all(&ModuleInit {
                catalog: &h.catalog,
                params: &h.params,
                time: &h.grid,
            })
            .unwrap();
        pipeline
    }

    fn evolve_tree(h: &Harness, tree: arbor_core::TreeData) -> (TreeOutcome, MemorySink) {
        let evolver = TreeEvolver::new(
            &h.catalog,
            &h.computes,
            &h.grid,
            &h.params,
            PARTICLE_MASS,
            RegionBudget::unlimited(),
        )
        .unwrap();
        let mut pipeline = empty_pipeline();
        let mut scratch = ScratchRegion::new(64);
        let mut sink = MemorySink::new();
        let outcome = evolver
            .evolve(&tree, &mut pipeline, &mut scratch, &mut sink)
            .unwrap();
        (outcome, sink)
    }

    fn value_of(h: &Harness, record: &arbor_core::OutputRecord, name: &str) -> PropertyValue {
        let position = h.catalog.output_names().position(|n| n == name).unwrap();
        record.values[position]
    }

    #[test]
    fn lone_root_yields_one_central_record() {
        let h = harness();
        let mut builder = TreeBuilder::new();
        builder.add_halo(0, 1.0);
        let (outcome, sink) = evolve_tree(&h, builder.build_tree(1));

        assert_eq!(outcome.groups, 1);
        assert_eq!(outcome.records, 1);
        let record = &sink.records()[0].2;
        assert_eq!(
            value_of(&h, record, "galaxy_type"),
            PropertyValue::Int(HaloRole::Central.code())
        );
        assert_eq!(value_of(&h, record, "mvir"), PropertyValue::Scalar(1.0));
    }

    #[test]
    fn galaxy_identity_persists_down_the_main_branch() {
        let h = harness();
        let mut builder = TreeBuilder::new();
        let a = builder.add_halo(0, 1.0);
        let b = builder.add_halo(1, 1.5);
        let c = builder.add_halo(2, 2.0);
        builder.link_descendant(a, b).link_descendant(b, c);
        let (outcome, sink) = evolve_tree(&h, builder.build_tree(2));

        assert_eq!(outcome.records, 3);
        let tags = sink.galaxy_tags();
        assert_eq!(tags[0], tags[1]);
        assert_eq!(tags[1], tags[2]);
    }

    #[test]
    fn mass_growth_updates_virials_and_delta() {
        let h = harness();
        let mut builder = TreeBuilder::new();
        let a = builder.add_halo(0, 1.0);
        let b = builder.add_halo(1, 1.5);
        builder.link_descendant(a, b);
        let (_, sink) = evolve_tree(&h, builder.build_tree(3));

        let final_rec = &sink.records()[1].2;
        assert_eq!(value_of(&h, final_rec, "mvir"), PropertyValue::Scalar(1.5));
        match value_of(&h, final_rec, "delta_mvir") {
            PropertyValue::Scalar(d) => assert!((d - 0.5).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn merger_carries_secondary_as_orphan() {
        let h = harness();
        let mut builder = TreeBuilder::new();
        let big = builder.add_halo(0, 2.0);
        let small = builder.add_halo(0, 0.5);
        let merged = builder.add_halo(1, 2.6);
        builder.link_descendant(big, merged).link_descendant(small, merged);
        let (outcome, sink) = evolve_tree(&h, builder.build_tree(4));

        // Snapshot 0: two centrals. Snapshot 1: one central + one orphan.
        assert_eq!(outcome.records, 4);
        let snap1: Vec<_> = sink
            .records()
            .iter()
            .filter(|(_, snap, _)| *snap == SnapNum(1))
            .collect();
        assert_eq!(snap1.len(), 2);
        let roles: Vec<i64> = snap1
            .iter()
            .map(|(_, _, r)| value_of(&h, r, "galaxy_type").as_int().unwrap())
            .collect();
        assert!(roles.contains(&HaloRole::Central.code()));
        assert!(roles.contains(&HaloRole::Orphan.code()));

        // The orphan's virial mass is zeroed and its infall state kept.
        let orphan = snap1
            .iter()
            .find(|(_, _, r)| {
                value_of(&h, r, "galaxy_type").as_int().unwrap() == HaloRole::Orphan.code()
            })
            .unwrap();
        assert_eq!(value_of(&h, &orphan.2, "mvir"), PropertyValue::Scalar(0.0));
    }

    #[test]
    fn satellite_records_infall_properties() {
        let h = harness();
        let mut builder = TreeBuilder::new();
        let field_halo = builder.add_halo(0, 0.8);
        let cluster = builder.add_halo(0, 3.0);
        let cluster_next = builder.add_halo(1, 3.5);
        let sub = builder.add_halo(1, 0.7);
        builder.link_descendant(cluster, cluster_next);
        builder.link_descendant(field_halo, sub);
        builder.join_group(cluster_next, sub);
        let (_, sink) = evolve_tree(&h, builder.build_tree(5));

        let sat = sink
            .records()
            .iter()
            .find(|(_, _, r)| {
                value_of(&h, r, "galaxy_type").as_int().unwrap() == HaloRole::Satellite.code()
            })
            .map(|(_, _, r)| r)
            .unwrap();
        assert_eq!(
            value_of(&h, sat, "infall_mvir"),
            PropertyValue::Scalar(0.8),
            "infall mass is the central-epoch virial mass"
        );
    }

    #[test]
    fn module_writes_do_not_alter_finalized_progenitor_records() {
        // A module that doubles a galaxy reservoir every snapshot; if
        // inheritance aliased records, the snapshot-0 output would show
        // the snapshot-1 value.
        struct Doubler {
            acc: Option<arbor_catalog::Accessor>,
        }
        impl GalaxyModule for Doubler {
            fn name(&self) -> &str {
                "doubler"
            }
            fn provides(&self) -> Vec<String> {
                vec!["reservoir".into()]
            }
            fn galaxy_properties(&self) -> Vec<arbor_core::PropertyDescriptor> {
                vec![arbor_core::PropertyDescriptor::scalar("reservoir", 1.0)]
            }
            fn init(&mut self, ctx: &ModuleInit<'_>) -> Result<(), ModuleError> {
                self.acc = ctx.catalog.galaxy_accessor("reservoir");
                Ok(())
            }
            fn process(
                &mut self,
                _ctx: &mut GroupContext<'_>,
                group: &mut HaloGroup<'_>,
            ) -> Result<(), ModuleError> {
                let acc = self.acc.expect("resolved in init");
                for halo in group.members_mut() {
                    let v = halo.galaxy.scalar(acc);
                    halo.galaxy.set_scalar(acc, v * 2.0);
                }
                Ok(())
            }
        }

        let mut registry = ModuleRegistry::new();
        registry.register(Box::new(Doubler { acc: None })).unwrap();
        let galaxy_descriptors = vec![arbor_core::PropertyDescriptor::scalar("reservoir", 1.0)];
        let h = harness_with(galaxy_descriptors);
        let mut pipeline = registry
            .activate(&["doubler".to_string()], &core_provided_names())
            .unwrap();
        pipeline
            .init_all(&ModuleInit {
                catalog: &h.catalog,
                params: &h.params,
                time: &h.grid,
            })
            .unwrap();

        let mut builder = TreeBuilder::new();
        let a = builder.add_halo(0, 1.0);
        let b = builder.add_halo(1, 1.5);
        builder.link_descendant(a, b);

        let evolver = TreeEvolver::new(
            &h.catalog,
            &h.computes,
            &h.grid,
            &h.params,
            PARTICLE_MASS,
            RegionBudget::unlimited(),
        )
        .unwrap();
        let mut scratch = ScratchRegion::new(64);
        let mut sink = MemorySink::new();
        evolver
            .evolve(&builder.build_tree(6), &mut pipeline, &mut scratch, &mut sink)
            .unwrap();

        // Snapshot 0 finalized at 2.0; snapshot 1 doubled the carried
        // copy to 4.0 without touching the earlier record.
        assert_eq!(
            value_of(&h, &sink.records()[0].2, "reservoir"),
            PropertyValue::Scalar(2.0)
        );
        assert_eq!(
            value_of(&h, &sink.records()[1].2, "reservoir"),
            PropertyValue::Scalar(4.0)
        );
    }

    #[test]
    fn region_report_nets_zero_for_every_category() {
        let h = harness();
        let forest = arbor_test_utils::random_forest(99, 1, 8);
        let (outcome, _) = evolve_tree(&h, forest.into_iter().next().unwrap());
        for category in AllocCategory::ALL {
            let stats = outcome.report.category(category);
            assert_eq!(
                stats.allocated_bytes, stats.freed_bytes,
                "category {category} leaked"
            );
        }
        assert!(outcome.report.total_allocated_bytes() > 0);
    }

    #[test]
    fn malformed_tree_aborts_cleanly_and_next_tree_succeeds() {
        let h = harness();
        let mut builder = TreeBuilder::new();
        let a = builder.add_halo(0, 1.0);
        let mut bad = builder.build_tree(7);
        bad.halos[a.index()].descendant = Some(arbor_core::HaloIdx(42));

        let evolver = TreeEvolver::new(
            &h.catalog,
            &h.computes,
            &h.grid,
            &h.params,
            PARTICLE_MASS,
            RegionBudget::unlimited(),
        )
        .unwrap();
        let mut pipeline = empty_pipeline();
        let mut scratch = ScratchRegion::new(64);
        let mut sink = MemorySink::new();

        let err = evolver
            .evolve(&bad, &mut pipeline, &mut scratch, &mut sink)
            .unwrap_err();
        assert_eq!(err.tree, TreeId(7));
        assert!(matches!(err.kind, EvolveErrorKind::Structure(_)));
        assert!(sink.is_empty());

        // The failure must not poison the evolver for the next tree.
        let mut builder = TreeBuilder::new();
        builder.add_halo(0, 1.0);
        evolver
            .evolve(&builder.build_tree(8), &mut pipeline, &mut scratch, &mut sink)
            .unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn budget_exhaustion_is_an_allocation_error_for_that_tree() {
        let h = harness();
        let evolver = TreeEvolver::new(
            &h.catalog,
            &h.computes,
            &h.grid,
            &h.params,
            PARTICLE_MASS,
            RegionBudget::unlimited().with_cap(AllocCategory::HaloWorking, 8),
        )
        .unwrap();
        let mut builder = TreeBuilder::new();
        builder.add_halo(0, 1.0);
        let mut pipeline = empty_pipeline();
        let mut scratch = ScratchRegion::new(64);
        let mut sink = MemorySink::new();
        let err = evolver
            .evolve(&builder.build_tree(9), &mut pipeline, &mut scratch, &mut sink)
            .unwrap_err();
        assert!(matches!(err.kind, EvolveErrorKind::Allocation(_)));
    }

    #[test]
    fn every_snapshot_of_a_random_forest_is_emitted_exactly_once() {
        let h = harness();
        for tree in arbor_test_utils::random_forest(1234, 4, 10) {
            // MemorySink rejects duplicate (tree, snap, galaxy)
            // triples, so a clean run proves the exactly-once contract.
            let (outcome, sink) = evolve_tree(&h, tree);
            assert_eq!(outcome.records, sink.len());
        }
    }
}
