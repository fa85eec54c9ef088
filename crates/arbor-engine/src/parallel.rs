//! Parallel forest processing.
//!
//! Trees share no mutable state, so the sanctioned concurrency model
//! is whole trees fanned out to worker threads. Each worker owns its
//! pipeline instance, scratch space, sink, and per-tree regions; the
//! catalog, computation table, time grid, and parameters are shared
//! read-only. A channel of tree indices is the only coordination.

use crossbeam_channel::unbounded;
use tracing::{info, warn};

use arbor_arena::ScratchRegion;
use arbor_catalog::{Catalog, ComputeRegistry};
use arbor_core::{OutputSink, TimeGrid, TreeSource};
use arbor_forest::TreeEvolver;
use arbor_module::{ActivePipeline, CleanupFailure, ModuleInit};

use crate::params::RunParameters;
use crate::summary::{FailureCause, RunSummary, TreeFailure};

/// Output of one worker: its sink plus its share of the summary.
pub struct WorkerRun<K> {
    /// The worker's sink, with every record it accepted.
    pub sink: K,
    /// The worker's share of the run summary.
    pub summary: RunSummary,
}

/// Fans whole trees out to worker threads.
///
/// Built from the same parameters and registry-produced pipelines as
/// the single-threaded engine; the caller supplies one uninitialized
/// pipeline and one sink per worker.
pub struct ParallelRunner<'a> {
    params: &'a RunParameters,
    catalog: &'a Catalog,
    computes: &'a ComputeRegistry,
    grid: &'a TimeGrid,
}

impl<'a> ParallelRunner<'a> {
    /// Create a runner over shared, read-only run state.
    pub fn new(
        params: &'a RunParameters,
        catalog: &'a Catalog,
        computes: &'a ComputeRegistry,
        grid: &'a TimeGrid,
    ) -> Self {
        Self {
            params,
            catalog,
            computes,
            grid,
        }
    }

    /// Process every tree of `source` across one worker per
    /// (pipeline, sink) pair, returning each worker's sink and
    /// summary in worker order.
    ///
    /// Tree-to-worker assignment depends on scheduling, so record
    /// order *across* sinks is not deterministic — callers that need
    /// a canonical order merge by (tree, snapshot). Every per-tree
    /// guarantee (region isolation, exactly-once emission, module
    /// order within a group) holds unchanged.
    pub fn run<S, K>(&self, source: &S, workers: Vec<(ActivePipeline, K)>) -> Vec<WorkerRun<K>>
    where
        S: TreeSource + Sync,
        K: OutputSink + Send,
    {
        let (index_tx, index_rx) = unbounded::<usize>();
        for index in 0..source.tree_count() {
            // An unbounded channel with a live receiver cannot refuse.
            index_tx.send(index).expect("receiver held below");
        }
        drop(index_tx);

        info!(
            trees = source.tree_count(),
            workers = workers.len(),
            "parallel run started"
        );

        let results: Vec<WorkerRun<K>> = std::thread::scope(|scope| {
            let handles: Vec<_> = workers
                .into_iter()
                .enumerate()
                .map(|(worker_id, (mut pipeline, mut sink))| {
                    let index_rx = index_rx.clone();
                    scope.spawn(move || {
                        let mut summary = RunSummary::default();
                        let mut scratch = ScratchRegion::new(1024);

                        if let Err(e) = pipeline.init_all(&ModuleInit {
                            catalog: self.catalog,
                            params: self.params,
                            time: self.grid,
                        }) {
                            warn!(worker_id, %e, "worker pipeline failed to initialize");
                            summary.cleanup_warnings = pipeline.cleanup_all();
                            return WorkerRun { sink, summary };
                        }

                        let evolver = match TreeEvolver::new(
                            self.catalog,
                            self.computes,
                            self.grid,
                            self.params,
                            self.params.run.particle_mass,
                            self.params.memory.budget(),
                        ) {
                            Ok(evolver) => evolver,
                            Err(e) => {
                                warn!(worker_id, %e, "worker evolver setup failed");
                                summary.cleanup_warnings = pipeline.cleanup_all();
                                return WorkerRun { sink, summary };
                            }
                        };

                        while let Ok(index) = index_rx.recv() {
                            let tree = match source.load_tree(index) {
                                Ok(tree) => tree,
                                Err(e) => {
                                    summary.failures.push(TreeFailure {
                                        index,
                                        error: FailureCause::Source(e),
                                    });
                                    continue;
                                }
                            };
                            match evolver.evolve(&tree, &mut pipeline, &mut scratch, &mut sink)
                            {
                                Ok(outcome) => summary.record(outcome),
                                Err(e) => summary.failures.push(TreeFailure {
                                    index,
                                    error: FailureCause::Evolve(e),
                                }),
                            }
                        }

                        summary.cleanup_warnings = pipeline.cleanup_all();
                        WorkerRun { sink, summary }
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker thread panicked"))
                .collect()
        });

        let cleanup_failures: usize = results
            .iter()
            .map(|r| r.summary.cleanup_warnings.len())
            .sum();
        if cleanup_failures > 0 {
            warn!(cleanup_failures, "workers reported cleanup failures");
        }
        results
    }
}

/// Merge worker cleanup warnings for surfacing at the end of a run.
pub fn collect_cleanup_warnings<K>(results: &[WorkerRun<K>]) -> Vec<CleanupFailure> {
    results
        .iter()
        .flat_map(|r| r.summary.cleanup_warnings.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RunParameters;
    use arbor_catalog::CatalogSpec;
    use arbor_core::ParameterSource;
    use arbor_forest::{core_halo_descriptors, core_provided_names, register_core_computations};
    use arbor_module::ModuleRegistry;
    use arbor_modules::register_standard_modules;
    use arbor_test_utils::{random_forest, MemorySink, VecTreeSource};

    const PARAMS: &str = r#"
        [cosmology]
        omega_m = 0.25
        omega_lambda = 0.75
        hubble_h = 0.73

        [snapshots]
        redshifts = [6.0, 4.0, 2.5, 1.5, 1.0, 0.6, 0.3, 0.0]

        [modules]
        enabled = ["infall", "cooling", "star_formation"]
    "#;

    fn pipeline(params: &RunParameters) -> ActivePipeline {
        let mut registry = ModuleRegistry::new();
        register_standard_modules(&mut registry).unwrap();
        registry
            .activate(params.active_modules(), &core_provided_names())
            .unwrap()
    }

    #[test]
    fn workers_partition_the_forest_without_losing_trees() {
        let params = RunParameters::from_toml_str(PARAMS).unwrap();
        let mut computes = arbor_catalog::ComputeRegistry::new();
        register_core_computations(&mut computes, params.run.particle_mass);
        let probe = pipeline(&params);
        let catalog = CatalogSpec {
            halo: core_halo_descriptors(),
            galaxy: probe.galaxy_descriptors(),
        }
        .compile(&computes)
        .unwrap();
        let grid = arbor_core::TimeGrid::new(params.cosmology(), &params.snapshots.redshifts)
            .unwrap();
        drop(probe);

        let source = VecTreeSource::new(random_forest(55, 6, 8));
        let runner = ParallelRunner::new(&params, &catalog, &computes, &grid);
        let workers = vec![
            (pipeline(&params), MemorySink::new()),
            (pipeline(&params), MemorySink::new()),
        ];
        let results = runner.run(&source, workers);

        let processed: usize = results.iter().map(|r| r.summary.trees_processed()).sum();
        let failures: usize = results.iter().map(|r| r.summary.failures.len()).sum();
        assert_eq!(processed, 6);
        assert_eq!(failures, 0);
        assert!(collect_cleanup_warnings(&results).is_empty());

        // Every tree's records landed in exactly one worker's sink.
        let mut seen_trees: Vec<u64> = results
            .iter()
            .flat_map(|r| r.sink.records().iter().map(|(tree, _, _)| tree.0))
            .collect();
        seen_trees.sort_unstable();
        seen_trees.dedup();
        assert_eq!(seen_trees, [0, 1, 2, 3, 4, 5]);
    }
}
