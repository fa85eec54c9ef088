//! Test utilities and fixtures for Arbor development.
//!
//! Provides in-memory implementations of the boundary traits
//! ([`TreeSource`], [`OutputSink`], [`ParameterSource`]), a
//! [`TreeBuilder`] for hand-constructing structurally valid merger
//! trees, a seeded random forest generator, and a journaling module
//! fixture for observing pipeline behavior.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use arbor_catalog::Accessor;
use arbor_core::{
    GalaxyTag, HaloIdx, ModuleError, OutputRecord, ParameterSource, PropertyDescriptor, RawHalo,
    SinkError, SnapNum, SourceError, TreeData, TreeId, TreeSource,
};
use arbor_module::{GalaxyModule, GroupContext, HaloGroup, ModuleInit};

// ── Tree construction ──────────────────────────────────────────────

/// Builds structurally valid merger trees by hand.
///
/// Every added halo starts as its own group root with no links;
/// [`link_descendant`](TreeBuilder::link_descendant) wires
/// progenitor/descendant chains (appending to the sibling chain in
/// call order) and [`join_group`](TreeBuilder::join_group) attaches a
/// halo to another's group.
pub struct TreeBuilder {
    halos: Vec<RawHalo>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self { halos: Vec::new() }
    }

    /// Add a halo at a snapshot with the given virial mass; returns
    /// its tree-local index.
    pub fn add_halo(&mut self, snap: u32, mvir: f64) -> HaloIdx {
        let idx = HaloIdx(self.halos.len() as u32);
        self.halos.push(RawHalo {
            descendant: None,
            first_progenitor: None,
            next_progenitor: None,
            first_in_group: idx,
            next_in_group: None,
            snap: SnapNum(snap),
            len: (mvir * 100.0).max(1.0) as u32,
            mvir,
            pos: [0.0; 3],
            vel: [0.0; 3],
            spin: [0.0; 3],
            vel_disp: 0.0,
            vmax: 0.0,
            most_bound_id: idx.0 as i64 + 1,
        });
        idx
    }

    /// Set a halo's position (useful for inheritance assertions).
    pub fn set_pos(&mut self, halo: HaloIdx, pos: [f64; 3]) -> &mut Self {
        self.halos[halo.index()].pos = pos;
        self
    }

    /// Declare `descendant` as `progenitor`'s descendant, appending
    /// `progenitor` to the descendant's progenitor sibling chain.
    pub fn link_descendant(&mut self, progenitor: HaloIdx, descendant: HaloIdx) -> &mut Self {
        self.halos[progenitor.index()].descendant = Some(descendant);
        match self.halos[descendant.index()].first_progenitor {
            None => self.halos[descendant.index()].first_progenitor = Some(progenitor),
            Some(first) => {
                let mut cursor = first;
                while let Some(next) = self.halos[cursor.index()].next_progenitor {
                    cursor = next;
                }
                self.halos[cursor.index()].next_progenitor = Some(progenitor);
            }
        }
        self
    }

    /// Attach `member` to `root`'s group, appending to the group chain.
    pub fn join_group(&mut self, root: HaloIdx, member: HaloIdx) -> &mut Self {
        self.halos[member.index()].first_in_group = root;
        let mut cursor = root;
        while let Some(next) = self.halos[cursor.index()].next_in_group {
            cursor = next;
        }
        self.halos[cursor.index()].next_in_group = Some(member);
        self
    }

    pub fn build(self) -> Vec<RawHalo> {
        self.halos
    }

    /// Wrap the built halos as a one-tree [`TreeData`].
    pub fn build_tree(self, tree_id: u64) -> TreeData {
        TreeData {
            tree_id: TreeId(tree_id),
            halos: self.build(),
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a deterministic random forest: `tree_count` structurally
/// valid trees spanning `snap_count` snapshots, seeded so the same
/// seed yields byte-identical trees.
///
/// Each tree starts from a handful of roots at snapshot 0; at every
/// later snapshot existing branches continue, merge pairwise, or die,
/// and new branches occasionally appear. All halos are group roots
/// (central-only trees); satellite/orphan coverage comes from
/// hand-built [`TreeBuilder`] trees.
pub fn random_forest(seed: u64, tree_count: usize, snap_count: u32) -> Vec<TreeData> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..tree_count)
        .map(|i| {
            let mut builder = TreeBuilder::new();
            let mut tips: Vec<(HaloIdx, f64)> = (0..rng.random_range(1..4usize))
                .map(|_| {
                    let mass = rng.random_range(0.1..2.0);
                    (builder.add_halo(0, mass), mass)
                })
                .collect();
            for snap in 1..snap_count {
                let mut next_tips = Vec::new();
                let mut pending = tips.drain(..).collect::<Vec<_>>();
                while let Some((halo, mass)) = pending.pop() {
                    let roll: f64 = rng.random();
                    if roll < 0.1 {
                        continue; // branch dies
                    }
                    let grown = mass * rng.random_range(1.0..1.6);
                    let desc = builder.add_halo(snap, grown);
                    builder.link_descendant(halo, desc);
                    // Sometimes a second branch merges into this one.
                    if roll > 0.7 {
                        if let Some((other, other_mass)) = pending.pop() {
                            builder.link_descendant(other, desc);
                            next_tips.push((desc, grown + other_mass));
                            continue;
                        }
                    }
                    next_tips.push((desc, grown));
                }
                if next_tips.is_empty() || rng.random::<f64>() > 0.8 {
                    let mass = rng.random_range(0.1..1.0);
                    next_tips.push((builder.add_halo(snap, mass), mass));
                }
                tips = next_tips;
            }
            builder.build_tree(i as u64)
        })
        .collect()
}

// ── Boundary trait fixtures ────────────────────────────────────────

/// A [`TreeSource`] over pre-built trees.
pub struct VecTreeSource {
    trees: Vec<TreeData>,
}

impl VecTreeSource {
    pub fn new(trees: Vec<TreeData>) -> Self {
        Self { trees }
    }
}

impl TreeSource for VecTreeSource {
    fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn load_tree(&self, index: usize) -> Result<TreeData, SourceError> {
        self.trees
            .get(index)
            .cloned()
            .ok_or(SourceError::UnknownTree { index })
    }
}

/// An [`OutputSink`] that collects records and rejects any duplicate
/// (tree, snapshot, working halo) triple, enforcing the exactly-once
/// contract. Working halos are identified by their galaxy tag, since
/// an orphan shares its host's raw halo index.
#[derive(Default)]
pub struct MemorySink {
    records: Vec<(TreeId, SnapNum, OutputRecord)>,
    seen: HashSet<(TreeId, SnapNum, GalaxyTag)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[(TreeId, SnapNum, OutputRecord)] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records for one tree, in acceptance order.
    pub fn tree_records(&self, tree: TreeId) -> Vec<&OutputRecord> {
        self.records
            .iter()
            .filter(|(t, _, _)| *t == tree)
            .map(|(_, _, r)| r)
            .collect()
    }

    /// Tags seen across all records, for identity assertions.
    pub fn galaxy_tags(&self) -> Vec<GalaxyTag> {
        self.records.iter().map(|(_, _, r)| r.galaxy).collect()
    }
}

impl arbor_core::OutputSink for MemorySink {
    fn accept(
        &mut self,
        tree: TreeId,
        snap: SnapNum,
        record: OutputRecord,
    ) -> Result<(), SinkError> {
        if !self.seen.insert((tree, snap, record.galaxy)) {
            return Err(SinkError::Rejected {
                reason: format!(
                    "duplicate record for tree {tree} snapshot {snap} galaxy {}",
                    record.galaxy
                ),
            });
        }
        self.records.push((tree, snap, record));
        Ok(())
    }
}

/// A [`ParameterSource`] backed by plain vectors.
#[derive(Default)]
pub struct FixedParameters {
    active: Vec<String>,
    entries: Vec<(String, String, String)>,
}

impl FixedParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(mut self, modules: &[&str]) -> Self {
        self.active = modules.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_parameter(mut self, module: &str, key: &str, value: &str) -> Self {
        self.entries
            .push((module.to_string(), key.to_string(), value.to_string()));
        self
    }
}

impl ParameterSource for FixedParameters {
    fn active_modules(&self) -> &[String] {
        &self.active
    }

    fn parameter(&self, module: &str, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(m, k, _)| m == module && k == key)
            .map(|(_, _, v)| v.as_str())
    }
}

// ── Module fixtures ────────────────────────────────────────────────

/// A module that journals every lifecycle call and optionally writes a
/// fixed value into a declared galaxy property on every group member.
///
/// Journal entries look like `"cooling:init"`, `"cooling:process:g3"`
/// (group root 3), `"cooling:cleanup"`, so tests can assert both
/// ordering and group delivery.
pub struct RecordingModule {
    name: String,
    provides: Vec<String>,
    requires: Vec<String>,
    descriptors: Vec<PropertyDescriptor>,
    journal: Arc<Mutex<Vec<String>>>,
    write: Option<(String, f64)>,
    accessor: Option<Accessor>,
}

impl RecordingModule {
    pub fn new(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            provides: Vec::new(),
            requires: Vec::new(),
            descriptors: Vec::new(),
            journal: Arc::clone(journal),
            write: None,
            accessor: None,
        }
    }

    /// Declare a provided scalar property (default 0.0) and write
    /// `value` into it on every member of every processed group.
    pub fn provides_scalar(mut self, property: &str, value: f64) -> Self {
        self.provides.push(property.to_string());
        self.descriptors
            .push(PropertyDescriptor::scalar(property, 0.0).provided_by(&self.name));
        self.write = Some((property.to_string(), value));
        self
    }

    /// Declare a required property.
    pub fn requires_property(mut self, property: &str) -> Self {
        self.requires.push(property.to_string());
        self
    }

    fn log(&self, event: String) {
        self.journal.lock().unwrap().push(event);
    }
}

impl GalaxyModule for RecordingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn provides(&self) -> Vec<String> {
        self.provides.clone()
    }

    fn requires(&self) -> Vec<String> {
        self.requires.clone()
    }

    fn galaxy_properties(&self) -> Vec<PropertyDescriptor> {
        self.descriptors.clone()
    }

    fn init(&mut self, ctx: &ModuleInit<'_>) -> Result<(), ModuleError> {
        if let Some((property, _)) = &self.write {
            self.accessor = Some(ctx.catalog.galaxy_accessor(property).ok_or_else(|| {
                ModuleError::MissingProperty {
                    property: property.clone(),
                }
            })?);
        }
        self.log(format!("{}:init", self.name));
        Ok(())
    }

    fn process(
        &mut self,
        _ctx: &mut GroupContext<'_>,
        group: &mut HaloGroup<'_>,
    ) -> Result<(), ModuleError> {
        self.log(format!("{}:process:g{}", self.name, group.id().root));
        if let (Some(acc), Some((_, value))) = (self.accessor, &self.write) {
            let value = *value;
            for halo in group.members_mut() {
                halo.galaxy.set_scalar(acc, value);
            }
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), ModuleError> {
        self.log(format!("{}:cleanup", self.name));
        Ok(())
    }
}
