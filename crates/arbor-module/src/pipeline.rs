//! The activated module pipeline and its lifecycle state machine.

use arbor_core::PropertyDescriptor;
use tracing::{info, warn};

use crate::context::{GroupContext, ModuleInit};
use crate::error::{CleanupFailure, PipelineError};
use crate::group::HaloGroup;
use crate::module::GalaxyModule;

/// Lifecycle phase of the pipeline as a whole.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Activated,
    Initialized,
    Cleaned,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::Initialized => "initialized",
            Self::Cleaned => "cleaned",
        }
    }
}

/// The user-declared, ordered, activated module sequence.
///
/// Invokes each module's lifecycle in exactly the declared order:
/// `init_all` forward, `run_group` forward once per halo group per
/// snapshot, `cleanup_all` in reverse. The order never varies between
/// runs or between groups — determinism of module execution is a core
/// guarantee, which is why modules live in a plain `Vec` and never in
/// an unordered collection.
pub struct ActivePipeline {
    modules: Vec<Box<dyn GalaxyModule>>,
    phase: Phase,
}

impl ActivePipeline {
    pub(crate) fn new(modules: Vec<Box<dyn GalaxyModule>>) -> Self {
        Self {
            modules,
            phase: Phase::Activated,
        }
    }

    /// Active module names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Number of active modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no modules are active (physics-free mode).
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Galaxy descriptors declared by the active modules, in
    /// activation order. Folded into the catalog spec before
    /// compilation.
    pub fn galaxy_descriptors(&self) -> Vec<PropertyDescriptor> {
        self.modules
            .iter()
            .flat_map(|m| m.galaxy_properties())
            .collect()
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), PipelineError> {
        if self.phase != expected {
            return Err(PipelineError::WrongPhase {
                expected: expected.as_str(),
                actual: self.phase.as_str(),
            });
        }
        Ok(())
    }

    /// Initialize every module in activation order.
    ///
    /// On the first failure the already-initialized prefix is cleaned
    /// up (reverse order, best-effort) and the failing module's name is
    /// reported; startup must abort.
    pub fn init_all(&mut self, ctx: &ModuleInit<'_>) -> Result<(), PipelineError> {
        self.expect_phase(Phase::Activated)?;
        for index in 0..self.modules.len() {
            if let Err(error) = self.modules[index].init(ctx) {
                let failed = self.modules[index].name().to_string();
                warn!(module = %failed, %error, "module init failed; unwinding");
                for module in self.modules[..index].iter_mut().rev() {
                    if let Err(cleanup_error) = module.cleanup() {
                        warn!(module = module.name(), %cleanup_error, "cleanup during unwind failed");
                    }
                }
                self.phase = Phase::Cleaned;
                return Err(PipelineError::InitFailed {
                    module: failed,
                    error,
                });
            }
            info!(module = self.modules[index].name(), "module initialized");
        }
        self.phase = Phase::Initialized;
        Ok(())
    }

    /// Run every module's `process` on one halo group, in activation
    /// order.
    ///
    /// Scratch is reset before each module so every module sees empty
    /// temporary space. A failure aborts the current tree and names
    /// the module and the group.
    pub fn run_group(
        &mut self,
        ctx: &mut GroupContext<'_>,
        group: &mut HaloGroup<'_>,
    ) -> Result<(), PipelineError> {
        self.expect_phase(Phase::Initialized)?;
        for module in &mut self.modules {
            ctx.scratch.reset();
            if let Err(error) = module.process(ctx, group) {
                return Err(PipelineError::ModuleFailed {
                    module: module.name().to_string(),
                    group: group.id(),
                    error,
                });
            }
        }
        Ok(())
    }

    /// Clean up every module in reverse activation order, best-effort.
    ///
    /// Failures are collected and returned for surfacing as warnings;
    /// they never stop the remaining cleanups. Idempotent: a second
    /// call is a no-op. A module never transitions back from cleaned.
    pub fn cleanup_all(&mut self) -> Vec<CleanupFailure> {
        if self.phase == Phase::Cleaned {
            return Vec::new();
        }
        let initialized = self.phase == Phase::Initialized;
        self.phase = Phase::Cleaned;
        if !initialized {
            return Vec::new();
        }
        let mut failures = Vec::new();
        for module in self.modules.iter_mut().rev() {
            if let Err(error) = module.cleanup() {
                warn!(module = module.name(), %error, "module cleanup failed");
                failures.push(CleanupFailure {
                    module: module.name().to_string(),
                    error,
                });
            } else {
                info!(module = module.name(), "module cleaned up");
            }
        }
        failures
    }
}

impl std::fmt::Debug for ActivePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivePipeline")
            .field("modules", &self.names())
            .field("phase", &self.phase.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::WorkingHalo;
    use crate::registry::ModuleRegistry;
    use arbor_arena::ScratchRegion;
    use arbor_catalog::{Catalog, CatalogSpec, ComputeRegistry, Record};
    use arbor_core::{
        Cosmology, GalaxyTag, GroupId, HaloIdx, HaloRole, MergeState, ModuleError,
        ParameterSource, PropertyDescriptor, SnapNum, TimeGrid, TreeId,
    };
    use std::sync::{Arc, Mutex};

    struct NoParams;
    impl ParameterSource for NoParams {
        fn active_modules(&self) -> &[String] {
            &[]
        }
        fn parameter(&self, _module: &str, _key: &str) -> Option<&str> {
            None
        }
    }

    /// Appends "<name>:<event>" to a shared journal on every lifecycle
    /// call, and can be told to fail at any entry point.
    struct Journaled {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        fail_init: bool,
        fail_process: bool,
        fail_cleanup: bool,
        write_on_all: bool,
    }

    impl Journaled {
        fn new(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                name,
                journal: Arc::clone(journal),
                fail_init: false,
                fail_process: false,
                fail_cleanup: false,
                write_on_all: false,
            })
        }

        fn log(&self, event: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:{event}", self.name));
        }
    }

    impl GalaxyModule for Journaled {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&mut self, _ctx: &ModuleInit<'_>) -> Result<(), ModuleError> {
            self.log("init");
            if self.fail_init {
                return Err(ModuleError::ExecutionFailed {
                    reason: "init refused".into(),
                });
            }
            Ok(())
        }

        fn process(
            &mut self,
            ctx: &mut GroupContext<'_>,
            group: &mut HaloGroup<'_>,
        ) -> Result<(), ModuleError> {
            self.log("process");
            if self.fail_process {
                return Err(ModuleError::ExecutionFailed {
                    reason: "process refused".into(),
                });
            }
            if self.write_on_all {
                let acc = ctx.catalog.galaxy_accessor("marker").ok_or_else(|| {
                    ModuleError::MissingProperty {
                        property: "marker".into(),
                    }
                })?;
                for halo in group.members_mut() {
                    halo.galaxy.set_scalar(acc, 42.0);
                }
            }
            Ok(())
        }

        fn cleanup(&mut self) -> Result<(), ModuleError> {
            self.log("cleanup");
            if self.fail_cleanup {
                return Err(ModuleError::ExecutionFailed {
                    reason: "cleanup refused".into(),
                });
            }
            Ok(())
        }
    }

    fn test_catalog() -> Catalog {
        CatalogSpec {
            halo: vec![PropertyDescriptor::scalar("mvir", 0.0)],
            galaxy: vec![PropertyDescriptor::scalar("marker", 0.0)],
        }
        .compile(&ComputeRegistry::new())
        .unwrap()
    }

    fn test_grid() -> TimeGrid {
        TimeGrid::new(
            Cosmology {
                omega_m: 0.25,
                omega_lambda: 0.75,
                hubble_h: 0.73,
            },
            &[2.0, 1.0, 0.0],
        )
        .unwrap()
    }

    fn working(role: HaloRole, catalog: &Catalog) -> WorkingHalo {
        WorkingHalo {
            raw_index: HaloIdx(0),
            snap: SnapNum(1),
            role,
            merge: MergeState::Alive,
            tag: GalaxyTag::next(),
            dt: 0.1,
            halo: Record::detached(catalog.halo_slot_count()),
            galaxy: Record::detached(catalog.galaxy_slot_count()),
        }
    }

    fn activate(modules: Vec<Box<dyn GalaxyModule>>) -> ActivePipeline {
        let mut registry = ModuleRegistry::new();
        let order: Vec<String> = modules.iter().map(|m| m.name().to_string()).collect();
        for module in modules {
            registry.register(module).unwrap();
        }
        registry.activate(&order, &[]).unwrap()
    }

    #[test]
    fn lifecycle_runs_forward_and_cleanup_reverse() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = activate(vec![
            Journaled::new("first", &journal),
            Journaled::new("second", &journal),
        ]);
        let catalog = test_catalog();
        let grid = test_grid();
        let init = ModuleInit {
            catalog: &catalog,
            params: &NoParams,
            time: &grid,
        };
        pipeline.init_all(&init).unwrap();

        let mut scratch = ScratchRegion::new(16);
        let mut ctx = GroupContext {
            snap: SnapNum(1),
            redshift: 1.0,
            time: &grid,
            catalog: &catalog,
            params: &NoParams,
            scratch: &mut scratch,
        };
        let mut members = vec![working(HaloRole::Central, &catalog)];
        let gid = GroupId {
            tree: TreeId(0),
            snap: SnapNum(1),
            root: HaloIdx(0),
        };
        let mut group = HaloGroup::new(gid, &mut members, 0);
        pipeline.run_group(&mut ctx, &mut group).unwrap();

        assert!(pipeline.cleanup_all().is_empty());
        let events = journal.lock().unwrap().clone();
        assert_eq!(
            events,
            [
                "first:init",
                "second:init",
                "first:process",
                "second:process",
                "second:cleanup",
                "first:cleanup",
            ]
        );
    }

    #[test]
    fn process_order_is_identical_across_repeated_groups() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = activate(vec![
            Journaled::new("a", &journal),
            Journaled::new("b", &journal),
            Journaled::new("c", &journal),
        ]);
        let catalog = test_catalog();
        let grid = test_grid();
        pipeline
            .init_all(&ModuleInit {
                catalog: &catalog,
                params: &NoParams,
                time: &grid,
            })
            .unwrap();
        journal.lock().unwrap().clear();

        let mut scratch = ScratchRegion::new(16);
        for _ in 0..3 {
            let mut ctx = GroupContext {
                snap: SnapNum(1),
                redshift: 1.0,
                time: &grid,
                catalog: &catalog,
                params: &NoParams,
                scratch: &mut scratch,
            };
            let mut members = vec![working(HaloRole::Central, &catalog)];
            let gid = GroupId {
                tree: TreeId(0),
                snap: SnapNum(1),
                root: HaloIdx(0),
            };
            let mut group = HaloGroup::new(gid, &mut members, 0);
            pipeline.run_group(&mut ctx, &mut group).unwrap();
        }
        let events = journal.lock().unwrap().clone();
        let one_round = ["a:process", "b:process", "c:process"];
        assert_eq!(events.len(), 9);
        for round in events.chunks(3) {
            assert_eq!(round, one_round);
        }
    }

    #[test]
    fn group_level_delivery_writes_every_member() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut writer = Journaled::new("writer", &journal);
        writer.write_on_all = true;
        let mut pipeline = activate(vec![writer]);
        let catalog = test_catalog();
        let grid = test_grid();
        pipeline
            .init_all(&ModuleInit {
                catalog: &catalog,
                params: &NoParams,
                time: &grid,
            })
            .unwrap();

        let mut members = vec![
            working(HaloRole::Central, &catalog),
            working(HaloRole::Satellite, &catalog),
            working(HaloRole::Satellite, &catalog),
        ];
        let mut scratch = ScratchRegion::new(16);
        let mut ctx = GroupContext {
            snap: SnapNum(1),
            redshift: 1.0,
            time: &grid,
            catalog: &catalog,
            params: &NoParams,
            scratch: &mut scratch,
        };
        let gid = GroupId {
            tree: TreeId(0),
            snap: SnapNum(1),
            root: HaloIdx(0),
        };
        let mut group = HaloGroup::new(gid, &mut members, 0);
        pipeline.run_group(&mut ctx, &mut group).unwrap();

        let acc = catalog.galaxy_accessor("marker").unwrap();
        for halo in &members {
            assert_eq!(halo.galaxy.scalar(acc), 42.0);
        }
    }

    #[test]
    fn init_failure_names_module_and_unwinds_initialized_prefix() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let ok = Journaled::new("ok", &journal);
        let mut bad = Journaled::new("bad", &journal);
        bad.fail_init = true;
        let mut pipeline = activate(vec![ok, bad]);
        let catalog = test_catalog();
        let grid = test_grid();
        let err = pipeline
            .init_all(&ModuleInit {
                catalog: &catalog,
                params: &NoParams,
                time: &grid,
            })
            .unwrap_err();
        match err {
            PipelineError::InitFailed { module, .. } => assert_eq!(module, "bad"),
            other => panic!("expected InitFailed, got {other:?}"),
        }
        let events = journal.lock().unwrap().clone();
        assert_eq!(events, ["ok:init", "bad:init", "ok:cleanup"]);
    }

    #[test]
    fn process_failure_reports_module_and_group() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut bad = Journaled::new("bad", &journal);
        bad.fail_process = true;
        let mut pipeline = activate(vec![bad]);
        let catalog = test_catalog();
        let grid = test_grid();
        pipeline
            .init_all(&ModuleInit {
                catalog: &catalog,
                params: &NoParams,
                time: &grid,
            })
            .unwrap();

        let mut members = vec![working(HaloRole::Central, &catalog)];
        let mut scratch = ScratchRegion::new(16);
        let mut ctx = GroupContext {
            snap: SnapNum(1),
            redshift: 1.0,
            time: &grid,
            catalog: &catalog,
            params: &NoParams,
            scratch: &mut scratch,
        };
        let gid = GroupId {
            tree: TreeId(5),
            snap: SnapNum(1),
            root: HaloIdx(2),
        };
        let mut group = HaloGroup::new(gid, &mut members, 0);
        match pipeline.run_group(&mut ctx, &mut group) {
            Err(PipelineError::ModuleFailed { module, group, .. }) => {
                assert_eq!(module, "bad");
                assert_eq!(group.tree, TreeId(5));
                assert_eq!(group.root, HaloIdx(2));
            }
            other => panic!("expected ModuleFailed, got {other:?}"),
        }
    }

    #[test]
    fn cleanup_failures_are_collected_not_fatal() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut bad = Journaled::new("bad", &journal);
        bad.fail_cleanup = true;
        let ok = Journaled::new("ok", &journal);
        let mut pipeline = activate(vec![bad, ok]);
        let catalog = test_catalog();
        let grid = test_grid();
        pipeline
            .init_all(&ModuleInit {
                catalog: &catalog,
                params: &NoParams,
                time: &grid,
            })
            .unwrap();

        let failures = pipeline.cleanup_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].module, "bad");
        // Both cleanups ran despite the failure, in reverse order.
        let events = journal.lock().unwrap().clone();
        assert_eq!(
            events,
            ["bad:init", "ok:init", "ok:cleanup", "bad:cleanup"]
        );
    }

    #[test]
    fn run_before_init_is_a_phase_error() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = activate(vec![Journaled::new("only", &journal)]);
        let catalog = test_catalog();
        let grid = test_grid();
        let mut scratch = ScratchRegion::new(4);
        let mut ctx = GroupContext {
            snap: SnapNum(0),
            redshift: 2.0,
            time: &grid,
            catalog: &catalog,
            params: &NoParams,
            scratch: &mut scratch,
        };
        let mut members = vec![working(HaloRole::Central, &catalog)];
        let gid = GroupId {
            tree: TreeId(0),
            snap: SnapNum(0),
            root: HaloIdx(0),
        };
        let mut group = HaloGroup::new(gid, &mut members, 0);
        assert!(matches!(
            pipeline.run_group(&mut ctx, &mut group),
            Err(PipelineError::WrongPhase { .. })
        ));
    }

    #[test]
    fn cleanup_is_idempotent() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = activate(vec![Journaled::new("only", &journal)]);
        let catalog = test_catalog();
        let grid = test_grid();
        pipeline
            .init_all(&ModuleInit {
                catalog: &catalog,
                params: &NoParams,
                time: &grid,
            })
            .unwrap();
        assert!(pipeline.cleanup_all().is_empty());
        assert!(pipeline.cleanup_all().is_empty());
        let cleanups = journal
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.ends_with("cleanup"))
            .count();
        assert_eq!(cleanups, 1);
    }
}
