//! Progenitor inheritance: carrying galaxies forward one snapshot.
//!
//! When a halo group is evaluated, every member halo gathers the
//! finalized galaxies of all its progenitors. The **primary**
//! progenitor — the most massive occupied one, ties broken by lowest
//! tree-local index — supplies the galaxy that follows the halo
//! itself: its record is updated to the descendant halo's physical
//! state and it becomes the member's central or subhalo satellite.
//! Every other progenitor's galaxy is carried as an orphan: its
//! subhalo is gone, its virial mass is zeroed, and its fate (merging,
//! disruption) is for modules to decide — the core never merges
//! baryons implicitly.
//!
//! Galaxy records are deep-copied on every carry-forward. The
//! finalized progenitor record and the new working copy share no
//! storage, so module writes at the current snapshot can never corrupt
//! an earlier snapshot's finalized state, and two galaxies entering
//! the same group stay fully independent.

use arbor_arena::ForestRegion;
use arbor_catalog::{Catalog, ComputeEnv, ComputeRegistry, Record};
use arbor_core::{
    Cosmology, GalaxyTag, HaloIdx, HaloRole, MergeState, RawHalo, SnapNum, TimeGrid,
};
use arbor_module::WorkingHalo;

use crate::error::EvolveErrorKind;
use crate::properties::{CoreHaloFields, MERGE_CLOCK_NONE};
use crate::virial::{virial_mass, virial_radius, virial_velocity};

/// Per-raw-halo bookkeeping: where the halo's finalized galaxies live
/// in the per-tree store.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Track {
    pub first_out: usize,
    pub n_out: usize,
}

impl Track {
    pub(crate) fn occupied(&self) -> bool {
        self.n_out > 0
    }
}

/// One finalized working halo: a snapshot's worth of evolution,
/// appended to the per-tree store after its group's modules have run.
#[derive(Debug)]
pub(crate) struct Finalized {
    pub raw_index: HaloIdx,
    pub snap: SnapNum,
    pub role: HaloRole,
    pub tag: GalaxyTag,
    pub halo: Record,
    pub galaxy: Record,
}

/// Shared inputs for inheritance within one tree.
pub(crate) struct InheritCtx<'a> {
    pub halos: &'a [RawHalo],
    pub catalog: &'a Catalog,
    pub fields: &'a CoreHaloFields,
    pub computes: &'a ComputeRegistry,
    pub grid: &'a TimeGrid,
    pub cosmology: &'a Cosmology,
    pub particle_mass: f64,
    pub region: &'a ForestRegion,
}

/// The most massive occupied progenitor of a halo, ties broken by
/// lowest tree-local index. `None` when no progenitor carries a
/// galaxy.
///
/// Mass ranking uses the particle count: an occupied progenitor is
/// compared by what it actually bound, not by a possibly-absent
/// spherical-overdensity mass.
pub(crate) fn find_primary_progenitor(
    member: HaloIdx,
    halos: &[RawHalo],
    track: &[Track],
) -> Option<HaloIdx> {
    let mut best: Option<(u32, HaloIdx)> = None;
    let mut cursor = halos[member.index()].first_progenitor;
    while let Some(p) = cursor {
        if track[p.index()].occupied() {
            let len = halos[p.index()].len;
            best = Some(match best {
                None => (len, p),
                Some((best_len, best_idx)) => {
                    if len > best_len || (len == best_len && p < best_idx) {
                        (len, p)
                    } else {
                        (best_len, best_idx)
                    }
                }
            });
        }
        cursor = halos[p.index()].next_progenitor;
    }
    best.map(|(_, p)| p)
}

/// Carry every progenitor galaxy of `member` into the workspace.
///
/// Appends one [`WorkingHalo`] per inherited galaxy, in progenitor
/// chain order, each with deep-copied records and a strictly positive
/// elapsed time since its progenitor snapshot.
#[allow(clippy::too_many_arguments)]
pub(crate) fn join_progenitors(
    ctx: &InheritCtx<'_>,
    member: HaloIdx,
    snap: SnapNum,
    redshift: f64,
    store: &[Finalized],
    track: &[Track],
    workspace: &mut Vec<WorkingHalo>,
) -> Result<(), EvolveErrorKind> {
    let primary = find_primary_progenitor(member, ctx.halos, track);
    let fields = ctx.fields;
    let mut cursor = ctx.halos[member.index()].first_progenitor;
    while let Some(prog) = cursor {
        let slot = track[prog.index()];
        for entry in &store[slot.first_out..slot.first_out + slot.n_out] {
            let mut halo_rec = ctx.catalog.halo_record_in(ctx.region)?;
            halo_rec.deep_copy_from(&entry.halo);
            let mut galaxy_rec = ctx.catalog.galaxy_record_in(ctx.region)?;
            galaxy_rec.deep_copy_from(&entry.galaxy);

            let dt = ctx.grid.elapsed_between(entry.snap, snap)?;
            let mut role = entry.role;

            if entry.role != HaloRole::Orphan {
                // Remember the halo's state before this snapshot's
                // update: it becomes the infall record if the halo
                // stops being a central here.
                let prev_mvir = halo_rec.scalar(fields.mvir);
                let prev_vvir = halo_rec.scalar(fields.vvir);
                let prev_vmax = halo_rec.scalar(fields.vmax);

                if Some(prog) == primary {
                    role = follow_halo(
                        ctx, member, &mut halo_rec, entry.role, prev_mvir, prev_vvir, prev_vmax,
                        redshift,
                    );
                } else {
                    // Subhalo absorbed by the primary branch: the
                    // galaxy survives as an orphan until modules
                    // resolve it.
                    halo_rec.set_scalar(fields.delta_mvir, -prev_mvir);
                    halo_rec.set_scalar(fields.mvir, 0.0);
                    if entry.role == HaloRole::Central
                        || halo_rec.scalar(fields.merge_clock) >= MERGE_CLOCK_NONE
                    {
                        halo_rec.set_scalar(fields.merge_clock, 0.0);
                        halo_rec.set_scalar(fields.infall_mvir, prev_mvir);
                        halo_rec.set_scalar(fields.infall_vvir, prev_vvir);
                        halo_rec.set_scalar(fields.infall_vmax, prev_vmax);
                    }
                    role = HaloRole::Orphan;
                }
            }

            halo_rec.set_int(fields.snap, i64::from(snap.0));
            halo_rec.set_scalar(fields.dt, dt);

            workspace.push(WorkingHalo {
                raw_index: member,
                snap,
                role,
                merge: MergeState::Alive,
                tag: entry.tag,
                dt,
                halo: halo_rec,
                galaxy: galaxy_rec,
            });
        }
        cursor = ctx.halos[prog.index()].next_progenitor;
    }
    Ok(())
}

/// Update a primary-inherited record to the descendant halo's physical
/// state and return the new role.
#[allow(clippy::too_many_arguments)]
fn follow_halo(
    ctx: &InheritCtx<'_>,
    member: HaloIdx,
    halo_rec: &mut Record,
    previous_role: HaloRole,
    prev_mvir: f64,
    prev_vvir: f64,
    prev_vmax: f64,
    redshift: f64,
) -> HaloRole {
    let fields = ctx.fields;
    let raw = &ctx.halos[member.index()];

    halo_rec.set_vec3(fields.pos, raw.pos);
    halo_rec.set_vec3(fields.vel, raw.vel);
    halo_rec.set_vec3(fields.spin, raw.spin);
    halo_rec.set_int(fields.len, i64::from(raw.len));
    halo_rec.set_scalar(fields.vmax, raw.vmax);
    halo_rec.set_scalar(fields.vel_disp, raw.vel_disp);
    halo_rec.set_int(fields.most_bound_id, raw.most_bound_id);

    let new_mvir = virial_mass(member, ctx.halos, ctx.particle_mass);
    halo_rec.set_scalar(fields.delta_mvir, new_mvir - prev_mvir);
    if new_mvir > prev_mvir {
        // Keep the largest virial extent the halo has reached.
        halo_rec.set_scalar(
            fields.rvir,
            virial_radius(member, ctx.halos, ctx.cosmology, redshift, ctx.particle_mass),
        );
        halo_rec.set_scalar(
            fields.vvir,
            virial_velocity(member, ctx.halos, ctx.cosmology, redshift, ctx.particle_mass),
        );
    }
    halo_rec.set_scalar(fields.mvir, new_mvir);

    if raw.is_group_root(member) {
        halo_rec.set_scalar(fields.merge_clock, MERGE_CLOCK_NONE);
        HaloRole::Central
    } else {
        if previous_role == HaloRole::Central {
            halo_rec.set_scalar(fields.infall_mvir, prev_mvir);
            halo_rec.set_scalar(fields.infall_vvir, prev_vvir);
            halo_rec.set_scalar(fields.infall_vmax, prev_vmax);
        }
        if previous_role == HaloRole::Central
            || halo_rec.scalar(fields.merge_clock) >= MERGE_CLOCK_NONE
        {
            // Fell into the group without a scheduled merger; modules
            // set the clock when the physics calls for one.
            halo_rec.set_scalar(fields.merge_clock, MERGE_CLOCK_NONE);
        }
        HaloRole::Satellite
    }
}

/// Initialize a brand-new central for a progenitor-less group root.
///
/// Runs the catalog's init plans, so every declared field is set
/// before any module sees the record. The tag comes from the
/// evolver's per-tree sequence, keeping outputs byte-identical across
/// runs.
pub(crate) fn fresh_central(
    ctx: &InheritCtx<'_>,
    member: HaloIdx,
    snap: SnapNum,
    redshift: f64,
    tag: GalaxyTag,
) -> Result<WorkingHalo, EvolveErrorKind> {
    let raw = &ctx.halos[member.index()];
    let env = ComputeEnv {
        raw,
        role: HaloRole::Central,
        redshift,
        cosmology: ctx.cosmology,
        computes: ctx.computes,
    };
    let mut halo_rec = ctx.catalog.halo_record_in(ctx.region)?;
    ctx.catalog.init_halo_record(&mut halo_rec, &env)?;
    let mut galaxy_rec = ctx.catalog.galaxy_record_in(ctx.region)?;
    ctx.catalog.init_galaxy_record(&mut galaxy_rec, &halo_rec, &env)?;

    let dt = if snap.0 > 0 {
        ctx.grid.elapsed_between(SnapNum(snap.0 - 1), snap)?
    } else {
        0.0
    };
    halo_rec.set_scalar(ctx.fields.dt, dt);

    Ok(WorkingHalo {
        raw_index: member,
        snap,
        role: HaloRole::Central,
        merge: MergeState::Alive,
        tag,
        dt,
        halo: halo_rec,
        galaxy: galaxy_rec,
    })
}
