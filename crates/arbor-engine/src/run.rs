//! The single-threaded run loop.

use tracing::{error, info, warn};

use arbor_arena::ScratchRegion;
use arbor_catalog::{Catalog, ComputeRegistry};
use arbor_core::{OutputSink, TimeGrid, TreeSource};
use arbor_forest::TreeEvolver;
use arbor_module::{ActivePipeline, ModuleRegistry};

use crate::config::{build, BuildError, BuiltEngine};
use crate::params::{ErrorPolicy, RunParameters};
use crate::summary::{FailureCause, RunSummary, TreeFailure};

/// A fully built simulation: validated catalog, initialized pipeline,
/// time grid, and run parameters.
///
/// `new` performs every definition-time check — descriptor validation,
/// activation dependency checking, snapshot grid construction, module
/// initialization — so a constructed engine cannot fail on
/// configuration grounds; everything after is per-tree. `run` consumes
/// the engine: modules are cleaned up (reverse order) at the end and
/// never re-initialized.
#[derive(Debug)]
pub struct SimulationEngine {
    params: RunParameters,
    catalog: Catalog,
    computes: ComputeRegistry,
    grid: TimeGrid,
    pipeline: ActivePipeline,
}

impl SimulationEngine {
    /// Build an engine from parameters and a module registry.
    pub fn new(params: RunParameters, registry: ModuleRegistry) -> Result<Self, BuildError> {
        let BuiltEngine {
            catalog,
            computes,
            grid,
            pipeline,
        } = build(&params, registry)?;
        info!(
            modules = ?pipeline.names(),
            snapshots = grid.snapshot_count(),
            properties = catalog.metadata().len(),
            "engine built"
        );
        Ok(Self {
            params,
            catalog,
            computes,
            grid,
            pipeline,
        })
    }

    /// The compiled property catalog (for sinks and validators).
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Evolve every tree the source yields, in source order.
    ///
    /// Each tree runs inside its own region; a failing tree is
    /// recorded and the run continues or aborts per the configured
    /// policy. Module cleanup always runs before this returns.
    pub fn run(mut self, source: &dyn TreeSource, sink: &mut dyn OutputSink) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut scratch = ScratchRegion::new(1024);

        let evolver = match TreeEvolver::new(
            &self.catalog,
            &self.computes,
            &self.grid,
            &self.params,
            self.params.run.particle_mass,
            self.params.memory.budget(),
        ) {
            Ok(evolver) => evolver,
            Err(e) => {
                // Unreachable with a catalog built by `new`, but a
                // summary with the cleanup warnings is still owed.
                error!(%e, "evolver setup failed");
                summary.cleanup_warnings = self.pipeline.cleanup_all();
                return summary;
            }
        };

        let tree_count = source.tree_count();
        info!(trees = tree_count, "run started");
        for index in 0..tree_count {
            let tree = match source.load_tree(index) {
                Ok(tree) => tree,
                Err(e) => {
                    warn!(index, %e, "tree failed to load");
                    summary.failures.push(TreeFailure {
                        index,
                        error: FailureCause::Source(e),
                    });
                    if self.params.run.on_tree_error == ErrorPolicy::Abort {
                        break;
                    }
                    continue;
                }
            };
            match evolver.evolve(&tree, &mut self.pipeline, &mut scratch, sink) {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    warn!(index, %e, "tree aborted");
                    summary.failures.push(TreeFailure {
                        index,
                        error: FailureCause::Evolve(e),
                    });
                    if self.params.run.on_tree_error == ErrorPolicy::Abort {
                        break;
                    }
                }
            }
        }

        summary.cleanup_warnings = self.pipeline.cleanup_all();
        info!(
            processed = summary.trees_processed(),
            records = summary.records_emitted(),
            failures = summary.failures.len(),
            "run finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{PropertyValue, SnapNum};
    use arbor_modules::register_standard_modules;
    use arbor_test_utils::{random_forest, MemorySink, TreeBuilder, VecTreeSource};

    const PARAMS: &str = r#"
        [run]
        particle_mass = 0.01

        [cosmology]
        omega_m = 0.25
        omega_lambda = 0.75
        hubble_h = 0.73

        [snapshots]
        redshifts = [4.0, 2.0, 1.0, 0.5, 0.0]

        [modules]
        enabled = ["infall", "cooling", "star_formation", "satellite_mergers"]

        [modules.satellite_mergers]
        clock_scale = 10.0
    "#;

    fn engine_with(params_text: &str) -> SimulationEngine {
        let params = RunParameters::from_toml_str(params_text).unwrap();
        let mut registry = ModuleRegistry::new();
        register_standard_modules(&mut registry).unwrap();
        SimulationEngine::new(params, registry).unwrap()
    }

    fn growing_chain_tree(tree_id: u64) -> arbor_core::TreeData {
        let mut builder = TreeBuilder::new();
        let mut prev = builder.add_halo(0, 1.0);
        for (snap, mass) in [(1u32, 1.5), (2, 2.2), (3, 3.0), (4, 4.0)] {
            let next = builder.add_halo(snap, mass);
            builder.link_descendant(prev, next);
            prev = next;
        }
        builder.build_tree(tree_id)
    }

    #[test]
    fn full_pipeline_produces_stars_from_accreted_gas() {
        let engine = engine_with(PARAMS);
        let catalog_names: Vec<String> = engine
            .catalog()
            .output_names()
            .map(str::to_string)
            .collect();
        let source = VecTreeSource::new(vec![growing_chain_tree(1)]);
        let mut sink = MemorySink::new();
        let summary = engine.run(&source, &mut sink);

        assert!(summary.is_clean());
        assert_eq!(summary.trees_processed(), 1);
        assert_eq!(summary.records_emitted(), 5);

        let position = |name: &str| catalog_names.iter().position(|n| n == name).unwrap();
        let last = &sink.records().last().unwrap().2;
        let stars = last.values[position("stellar_mass")];
        let hot = last.values[position("hot_gas")];
        match (stars, hot) {
            (PropertyValue::Scalar(stars), PropertyValue::Scalar(hot)) => {
                assert!(stars > 0.0, "accreted gas should have formed stars");
                assert!(hot >= 0.0);
            }
            other => panic!("unexpected kinds: {other:?}"),
        }
    }

    #[test]
    fn repeated_runs_are_deterministic() {
        let run = || {
            let engine = engine_with(PARAMS);
            let source = VecTreeSource::new(random_forest(2024, 3, 5));
            let mut sink = MemorySink::new();
            let summary = engine.run(&source, &mut sink);
            assert!(summary.is_clean());
            sink
        };
        let a = run();
        let b = run();
        assert_eq!(a.len(), b.len());
        for ((ta, sa, ra), (tb, sb, rb)) in a.records().iter().zip(b.records().iter()) {
            assert_eq!((ta, sa), (tb, sb));
            assert_eq!(ra.halo, rb.halo);
            assert_eq!(ra.values, rb.values, "output values must be bit-identical");
        }
    }

    #[test]
    fn one_bad_tree_does_not_stop_the_run_under_continue_policy() {
        let engine = engine_with(PARAMS);
        let mut bad = growing_chain_tree(7);
        bad.halos[0].descendant = Some(arbor_core::HaloIdx(999));
        let source = VecTreeSource::new(vec![bad, growing_chain_tree(8)]);
        let mut sink = MemorySink::new();
        let summary = engine.run(&source, &mut sink);

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].index, 0);
        assert_eq!(summary.trees_processed(), 1);
        assert_eq!(sink.len(), 5);
    }

    #[test]
    fn abort_policy_stops_after_first_failure() {
        let text = PARAMS.replace("particle_mass = 0.01", "particle_mass = 0.01\non_tree_error = \"abort\"");
        let engine = engine_with(&text);
        let mut bad = growing_chain_tree(7);
        bad.halos[0].descendant = Some(arbor_core::HaloIdx(999));
        let source = VecTreeSource::new(vec![bad, growing_chain_tree(8)]);
        let mut sink = MemorySink::new();
        let summary = engine.run(&source, &mut sink);

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.trees_processed(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn activation_order_violation_is_a_build_error() {
        let text = PARAMS.replace(
            "enabled = [\"infall\", \"cooling\", \"star_formation\", \"satellite_mergers\"]",
            "enabled = [\"cooling\", \"infall\"]",
        );
        let params = RunParameters::from_toml_str(&text).unwrap();
        let mut registry = ModuleRegistry::new();
        register_standard_modules(&mut registry).unwrap();
        match SimulationEngine::new(params, registry) {
            Err(BuildError::Registry(
                arbor_module::RegistryError::UnsatisfiedRequirement { module, property },
            )) => {
                assert_eq!(module, "cooling");
                assert_eq!(property, "hot_gas");
            }
            other => panic!("expected UnsatisfiedRequirement, got {other:?}"),
        }
    }

    #[test]
    fn physics_free_run_still_tracks_halos() {
        let text = PARAMS.replace(
            "enabled = [\"infall\", \"cooling\", \"star_formation\", \"satellite_mergers\"]",
            "enabled = []",
        );
        let engine = engine_with(&text);
        let source = VecTreeSource::new(vec![growing_chain_tree(3)]);
        let mut sink = MemorySink::new();
        let summary = engine.run(&source, &mut sink);
        assert!(summary.is_clean());
        assert_eq!(summary.records_emitted(), 5);
    }

    #[test]
    fn merger_clock_eventually_merges_an_orphan_and_moves_its_stars() {
        // Two snap-0 roots merge into one snap-1 halo; the secondary
        // becomes an orphan, its clock winds and expires over the
        // following snapshots, and its baryons end up on the central.
        let engine = engine_with(PARAMS);
        let catalog_names: Vec<String> = engine
            .catalog()
            .output_names()
            .map(str::to_string)
            .collect();

        let mut builder = TreeBuilder::new();
        let big = builder.add_halo(0, 2.0);
        let small = builder.add_halo(0, 1.0);
        let mut prev = builder.add_halo(1, 3.2);
        builder.link_descendant(big, prev).link_descendant(small, prev);
        for (snap, mass) in [(2u32, 3.5), (3, 3.8), (4, 4.0)] {
            let next = builder.add_halo(snap, mass);
            builder.link_descendant(prev, next);
            prev = next;
        }

        let source = VecTreeSource::new(vec![builder.build_tree(11)]);
        let mut sink = MemorySink::new();
        let summary = engine.run(&source, &mut sink);
        assert!(summary.is_clean());

        let position = |name: &str| catalog_names.iter().position(|n| n == name).unwrap();
        let type_at = position("galaxy_type");
        let status_at = position("merge_status");

        // The orphan disappears from output after its merge snapshot,
        // and its final record is flagged merged.
        let orphan_records: Vec<&(arbor_core::TreeId, SnapNum, arbor_core::OutputRecord)> = sink
            .records()
            .iter()
            .filter(|(_, _, r)| r.values[type_at] == PropertyValue::Int(2))
            .collect();
        assert!(!orphan_records.is_empty(), "the secondary must appear as an orphan");
        let merged_flagged = sink
            .records()
            .iter()
            .any(|(_, _, r)| r.values[status_at] == PropertyValue::Int(1));
        assert!(merged_flagged, "a record must carry the merged flag");

        // Fewer records at the end than working halos at the start of
        // the tail: the orphan stopped being emitted after merging.
        let last_snap_records = sink
            .records()
            .iter()
            .filter(|(_, snap, _)| *snap == SnapNum(4))
            .count();
        assert_eq!(last_snap_records, 1);
    }
}
