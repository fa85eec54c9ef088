//! Core halo-category descriptors and their resolved accessors.
//!
//! These are the fields the traversal engine itself maintains on every
//! working halo. Modules may read any of them (they satisfy `requires`
//! at any pipeline position); galaxy-category fields are declared by
//! modules, never here.

use arbor_catalog::{Accessor, Catalog};
use arbor_core::{
    HaloRole, OutputCondition, OutputExpr, OutputRule, PropertyDescriptor, PropertyValue,
    SourceField,
};

use crate::error::SetupError;

/// Merger-clock value meaning "no merger scheduled". Excluded from
/// range validation as a sentinel.
pub const MERGE_CLOCK_NONE: f64 = 999.9;

/// The halo-category descriptor list.
///
/// Compiled (together with the active modules' galaxy descriptors)
/// into the catalog; layout, initialization, output, and metadata all
/// derive from this one list.
pub fn core_halo_descriptors() -> Vec<PropertyDescriptor> {
    vec![
        PropertyDescriptor::int("snap", 0).with_init(arbor_core::InitRule::CopiedFromSource(
            SourceField::Snap,
        )),
        // Role code is produced at output time from the assigned role;
        // there is no stored working value.
        PropertyDescriptor::int("galaxy_type", 0).with_output(OutputRule::Custom(
            "role_code".to_string(),
        )),
        PropertyDescriptor::scalar("mvir", 0.0)
            .with_init(arbor_core::InitRule::Computed("virial_mass".to_string()))
            .with_range(0.0, 1.0e7),
        PropertyDescriptor::scalar("rvir", 0.0)
            .with_init(arbor_core::InitRule::Computed("virial_radius".to_string()))
            .with_range(0.0, 1.0e3),
        PropertyDescriptor::scalar("vvir", 0.0)
            .with_init(arbor_core::InitRule::Computed(
                "virial_velocity".to_string(),
            ))
            .with_range(0.0, 1.0e4),
        PropertyDescriptor::scalar("vmax", 0.0)
            .with_init(arbor_core::InitRule::CopiedFromSource(SourceField::Vmax)),
        PropertyDescriptor::scalar("vel_disp", 0.0).with_init(
            arbor_core::InitRule::CopiedFromSource(SourceField::VelDisp),
        ),
        PropertyDescriptor::scalar("delta_mvir", 0.0),
        // Infall bookkeeping is meaningful only once a halo stops being
        // a central; a central reports zero.
        PropertyDescriptor::scalar("infall_mvir", 0.0).with_output(OutputRule::Conditional {
            condition: OutputCondition::RoleIs(HaloRole::Central),
            when_true: OutputExpr::Value(PropertyValue::Scalar(0.0)),
            when_false: OutputExpr::Property("infall_mvir".to_string()),
        }),
        PropertyDescriptor::scalar("infall_vvir", 0.0),
        PropertyDescriptor::scalar("infall_vmax", 0.0),
        PropertyDescriptor::scalar("merge_clock", MERGE_CLOCK_NONE)
            .with_range(0.0, MERGE_CLOCK_NONE)
            .with_sentinels(&[MERGE_CLOCK_NONE])
            .with_output(OutputRule::Skip),
        PropertyDescriptor::int("merge_status", 0),
        PropertyDescriptor::int("merge_target", -1),
        PropertyDescriptor::int("merge_snap", -1),
        PropertyDescriptor::vec3_from_source("pos", SourceField::Pos),
        PropertyDescriptor::vec3_from_source("vel", SourceField::Vel),
        PropertyDescriptor::vec3_from_source("spin", SourceField::Spin),
        PropertyDescriptor::int("len", 0)
            .with_init(arbor_core::InitRule::CopiedFromSource(SourceField::Len)),
        PropertyDescriptor::int("most_bound_id", 0).with_init(
            arbor_core::InitRule::CopiedFromSource(SourceField::MostBoundId),
        ),
        PropertyDescriptor::scalar("dt", 0.0).with_output(OutputRule::Skip),
    ]
}

/// Names of the core-provided properties, for module activation
/// checking.
pub fn core_provided_names() -> Vec<String> {
    core_halo_descriptors()
        .into_iter()
        .map(|d| d.name)
        .collect()
}

/// Resolved accessors for every core halo field the engine writes.
#[derive(Clone, Copy, Debug)]
pub struct CoreHaloFields {
    /// Snapshot number.
    pub snap: Accessor,
    /// Virial mass.
    pub mvir: Accessor,
    /// Virial radius.
    pub rvir: Accessor,
    /// Virial velocity.
    pub vvir: Accessor,
    /// Maximum circular velocity.
    pub vmax: Accessor,
    /// Velocity dispersion.
    pub vel_disp: Accessor,
    /// Virial mass change since the progenitor snapshot.
    pub delta_mvir: Accessor,
    /// Virial mass at infall.
    pub infall_mvir: Accessor,
    /// Virial velocity at infall.
    pub infall_vvir: Accessor,
    /// Maximum circular velocity at infall.
    pub infall_vmax: Accessor,
    /// Remaining merger clock in Gyr/h, or [`MERGE_CLOCK_NONE`].
    pub merge_clock: Accessor,
    /// Merge status code on the final record.
    pub merge_status: Accessor,
    /// Tag of the galaxy merged into.
    pub merge_target: Accessor,
    /// Snapshot at which the merge happened.
    pub merge_snap: Accessor,
    /// Position.
    pub pos: Accessor,
    /// Velocity.
    pub vel: Accessor,
    /// Spin.
    pub spin: Accessor,
    /// Particle count.
    pub len: Accessor,
    /// Most-bound particle ID.
    pub most_bound_id: Accessor,
    /// Elapsed time since the progenitor snapshot.
    pub dt: Accessor,
}

impl CoreHaloFields {
    /// Resolve every core accessor against a compiled catalog.
    ///
    /// Fails naming the first missing field if the catalog was not
    /// built from [`core_halo_descriptors`].
    pub fn resolve(catalog: &Catalog) -> Result<Self, SetupError> {
        let get = |field: &'static str| {
            catalog
                .halo_accessor(field)
                .ok_or(SetupError::MissingCoreField { field })
        };
        Ok(Self {
            snap: get("snap")?,
            mvir: get("mvir")?,
            rvir: get("rvir")?,
            vvir: get("vvir")?,
            vmax: get("vmax")?,
            vel_disp: get("vel_disp")?,
            delta_mvir: get("delta_mvir")?,
            infall_mvir: get("infall_mvir")?,
            infall_vvir: get("infall_vvir")?,
            infall_vmax: get("infall_vmax")?,
            merge_clock: get("merge_clock")?,
            merge_status: get("merge_status")?,
            merge_target: get("merge_target")?,
            merge_snap: get("merge_snap")?,
            pos: get("pos")?,
            vel: get("vel")?,
            spin: get("spin")?,
            len: get("len")?,
            most_bound_id: get("most_bound_id")?,
            dt: get("dt")?,
        })
    }
}
