//! Descriptor validation and the compiled catalog.

use indexmap::IndexMap;

use arbor_arena::{AllocCategory, ArenaError, ForestRegion};
use arbor_core::{
    GalaxyTag, HaloIdx, InitRule, OutputCondition, OutputExpr, OutputRecord, OutputRule,
    PropertyCategory, PropertyDescriptor, PropertyId, PropertyKind, PropertySet, PropertyValue,
    SourceField,
};

use crate::compute::{ComputeCtx, ComputeEnv, ComputeRegistry};
use crate::error::SpecError;
use crate::record::Record;

// ── Accessor ───────────────────────────────────────────────────────

/// A compiled handle to one property: its ID, kind, and resolved slot
/// offset within its category's record layout.
///
/// Accessors are resolved once (at startup or module `resolve`) and
/// used for every read/write thereafter; the hot path never touches
/// names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Accessor {
    id: PropertyId,
    kind: PropertyKind,
    offset: usize,
}

impl Accessor {
    /// Construct an accessor. Outside the catalog this is only useful
    /// for tests and mock layouts.
    pub fn new(id: PropertyId, kind: PropertyKind, offset: usize) -> Self {
        Self { id, kind, offset }
    }

    /// The property's ID.
    pub fn id(&self) -> PropertyId {
        self.id
    }

    /// The property's kind.
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// The property's slot offset within its record.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

// ── Metadata ───────────────────────────────────────────────────────

/// Runtime-queryable description of one property, for external
/// validators and sinks.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyMeta {
    /// The property's ID.
    pub id: PropertyId,
    /// The property's name.
    pub name: String,
    /// Which record the property lives in.
    pub category: PropertyCategory,
    /// Data type.
    pub kind: PropertyKind,
    /// Inclusive validity range, if declared.
    pub range: Option<(f64, f64)>,
    /// Sentinel values excluded from range validation.
    pub sentinels: Vec<f64>,
    /// Whether the property reaches output records.
    pub output: bool,
}

impl PropertyMeta {
    /// Whether a scalar value is valid: inside the declared range, or
    /// equal to a declared sentinel. Properties without a range accept
    /// everything.
    pub fn is_valid(&self, value: f64) -> bool {
        if self.sentinels.iter().any(|&s| s == value) {
            return true;
        }
        match self.range {
            Some((min, max)) => value >= min && value <= max,
            None => true,
        }
    }
}

// ── Compiled plans ─────────────────────────────────────────────────

#[derive(Debug)]
enum InitOp {
    Default {
        acc: Accessor,
        value: PropertyValue,
    },
    FromSource {
        acc: Accessor,
        field: SourceField,
    },
    Computed {
        acc: Accessor,
        name: String,
        function: String,
    },
}

#[derive(Debug)]
enum CompiledCond {
    RoleIs(arbor_core::HaloRole),
    PropertyPositive { category: PropertyCategory, acc: Accessor },
}

#[derive(Debug)]
enum CompiledExpr {
    Value(PropertyValue),
    Property {
        category: PropertyCategory,
        acc: Accessor,
    },
    Source(SourceField),
}

#[derive(Debug)]
enum OutputOp {
    Direct {
        category: PropertyCategory,
        acc: Accessor,
    },
    FromSource {
        field: SourceField,
    },
    Compute {
        name: String,
        function: String,
        kind: PropertyKind,
    },
    Conditional {
        condition: CompiledCond,
        when_true: CompiledExpr,
        when_false: CompiledExpr,
    },
}

#[derive(Debug)]
struct CategoryTable {
    category: PropertyCategory,
    slot_count: usize,
    by_name: IndexMap<String, usize>,
    accessors: Vec<Accessor>,
    init_ops: Vec<InitOp>,
}

impl CategoryTable {
    fn accessor(&self, name: &str) -> Option<Accessor> {
        self.by_name.get(name).map(|&i| self.accessors[i])
    }
}

// ── Spec ───────────────────────────────────────────────────────────

/// The complete declarative description of every tracked field,
/// partitioned into halo and galaxy categories.
///
/// Built once at startup (core halo descriptors plus the active
/// modules' declared galaxy descriptors) and compiled into a
/// [`Catalog`] before any tree is processed.
#[derive(Clone, Debug, Default)]
pub struct CatalogSpec {
    /// Halo-category descriptors, owned by the core.
    pub halo: Vec<PropertyDescriptor>,
    /// Galaxy-category descriptors, declared by modules.
    pub galaxy: Vec<PropertyDescriptor>,
}

impl CatalogSpec {
    /// Validate every descriptor and compile the catalog.
    ///
    /// All validation happens here, before any tree is processed; a
    /// failure names the offending descriptor and the malformed or
    /// missing attribute.
    pub fn compile(self, computes: &ComputeRegistry) -> Result<Catalog, SpecError> {
        let mut next_id = 0u32;
        let halo = compile_category(PropertyCategory::Halo, &self.halo, computes, &mut next_id)?;
        let galaxy =
            compile_category(PropertyCategory::Galaxy, &self.galaxy, computes, &mut next_id)?;

        // Metadata across both categories, in ID order.
        let mut metadata = Vec::with_capacity(self.halo.len() + self.galaxy.len());
        for (table, descs) in [(&halo, &self.halo), (&galaxy, &self.galaxy)] {
            for (i, desc) in descs.iter().enumerate() {
                metadata.push(PropertyMeta {
                    id: table.accessors[i].id(),
                    name: desc.name.clone(),
                    category: table.category,
                    kind: desc.kind,
                    range: desc.range,
                    sentinels: desc.sentinels.clone(),
                    output: desc.output != OutputRule::Skip,
                });
            }
        }

        // Output plan: halo properties first, then galaxy, declaration
        // order within each. Compiled after both tables exist so
        // conditional references resolve.
        let mut output_ops = Vec::new();
        let mut output_names = Vec::new();
        let mut output_set = PropertySet::empty();
        for (table, descs) in [(&halo, &self.halo), (&galaxy, &self.galaxy)] {
            for (i, desc) in descs.iter().enumerate() {
                let acc = table.accessors[i];
                let Some(op) = compile_output_op(desc, table, acc)? else {
                    continue;
                };
                output_ops.push(op);
                output_names.push(desc.name.clone());
                output_set.insert(acc.id());
            }
        }

        Ok(Catalog {
            halo,
            galaxy,
            metadata,
            output_ops,
            output_names,
            output_set,
        })
    }
}

fn valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn compile_category(
    category: PropertyCategory,
    descriptors: &[PropertyDescriptor],
    computes: &ComputeRegistry,
    next_id: &mut u32,
) -> Result<CategoryTable, SpecError> {
    let mut by_name = IndexMap::new();
    let mut accessors = Vec::with_capacity(descriptors.len());
    let mut init_ops = Vec::with_capacity(descriptors.len());
    let mut offset = 0usize;

    for (i, desc) in descriptors.iter().enumerate() {
        if !valid_identifier(&desc.name) {
            return Err(SpecError::InvalidIdentifier {
                category,
                name: desc.name.clone(),
            });
        }
        if by_name.insert(desc.name.clone(), i).is_some() {
            return Err(SpecError::DuplicateName {
                category,
                name: desc.name.clone(),
            });
        }
        if let Some((min, max)) = desc.range {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(SpecError::InvalidRange {
                    name: desc.name.clone(),
                    min,
                    max,
                });
            }
        }
        if let Some(&bad) = desc.sentinels.iter().find(|s| !s.is_finite()) {
            return Err(SpecError::InvalidSentinel {
                name: desc.name.clone(),
                value: bad,
            });
        }

        let acc = Accessor::new(PropertyId(*next_id), desc.kind, offset);
        *next_id += 1;
        offset += desc.kind.slot_width();

        let op = match &desc.init {
            InitRule::Default(value) => {
                if value.kind() != desc.kind {
                    return Err(SpecError::DefaultKindMismatch {
                        name: desc.name.clone(),
                        expected: desc.kind,
                        got: value.kind(),
                    });
                }
                InitOp::Default { acc, value: *value }
            }
            InitRule::CopiedFromSource(field) => {
                if field.kind() != desc.kind {
                    return Err(SpecError::SourceKindMismatch {
                        name: desc.name.clone(),
                        expected: desc.kind,
                        got: field.kind(),
                    });
                }
                InitOp::FromSource { acc, field: *field }
            }
            InitRule::Computed(function) => {
                if !computes.contains(function) {
                    return Err(SpecError::UnknownComputation {
                        name: desc.name.clone(),
                        function: function.clone(),
                    });
                }
                InitOp::Computed {
                    acc,
                    name: desc.name.clone(),
                    function: function.clone(),
                }
            }
        };
        init_ops.push(op);
        accessors.push(acc);

        // Output computation names are checked here too, so every
        // definition error surfaces at compile time.
        match &desc.output {
            OutputRule::Recompute(function) | OutputRule::Custom(function) => {
                if !computes.contains(function) {
                    return Err(SpecError::UnknownComputation {
                        name: desc.name.clone(),
                        function: function.clone(),
                    });
                }
            }
            OutputRule::FromSource(field) => {
                if field.kind() != desc.kind {
                    return Err(SpecError::SourceKindMismatch {
                        name: desc.name.clone(),
                        expected: desc.kind,
                        got: field.kind(),
                    });
                }
            }
            OutputRule::Conditional { .. } if desc.kind == PropertyKind::Vec3 => {
                return Err(SpecError::VectorRuleMismatch {
                    name: desc.name.clone(),
                });
            }
            _ => {}
        }
    }

    Ok(CategoryTable {
        category,
        slot_count: offset,
        by_name,
        accessors,
        init_ops,
    })
}

fn compile_expr(
    desc: &PropertyDescriptor,
    table: &CategoryTable,
    expr: &OutputExpr,
) -> Result<CompiledExpr, SpecError> {
    match expr {
        OutputExpr::Value(value) => {
            if value.kind() != desc.kind {
                return Err(SpecError::ExprKindMismatch {
                    name: desc.name.clone(),
                    expected: desc.kind,
                    got: value.kind(),
                });
            }
            Ok(CompiledExpr::Value(*value))
        }
        OutputExpr::Property(referenced) => {
            let acc = table
                .accessor(referenced)
                .ok_or_else(|| SpecError::UnknownProperty {
                    name: desc.name.clone(),
                    referenced: referenced.clone(),
                })?;
            if acc.kind() != desc.kind {
                return Err(SpecError::ExprKindMismatch {
                    name: desc.name.clone(),
                    expected: desc.kind,
                    got: acc.kind(),
                });
            }
            Ok(CompiledExpr::Property {
                category: table.category,
                acc,
            })
        }
        OutputExpr::Source(field) => {
            if field.kind() != desc.kind {
                return Err(SpecError::ExprKindMismatch {
                    name: desc.name.clone(),
                    expected: desc.kind,
                    got: field.kind(),
                });
            }
            Ok(CompiledExpr::Source(*field))
        }
    }
}

fn compile_output_op(
    desc: &PropertyDescriptor,
    table: &CategoryTable,
    acc: Accessor,
) -> Result<Option<OutputOp>, SpecError> {
    let op = match &desc.output {
        OutputRule::Skip => return Ok(None),
        OutputRule::Direct => OutputOp::Direct {
            category: table.category,
            acc,
        },
        OutputRule::FromSource(field) => OutputOp::FromSource { field: *field },
        OutputRule::Recompute(function) | OutputRule::Custom(function) => OutputOp::Compute {
            name: desc.name.clone(),
            function: function.clone(),
            kind: desc.kind,
        },
        OutputRule::Conditional {
            condition,
            when_true,
            when_false,
        } => {
            let condition = match condition {
                OutputCondition::RoleIs(role) => CompiledCond::RoleIs(*role),
                OutputCondition::PropertyPositive(referenced) => {
                    let cond_acc = table.accessor(referenced).ok_or_else(|| {
                        SpecError::UnknownProperty {
                            name: desc.name.clone(),
                            referenced: referenced.clone(),
                        }
                    })?;
                    if cond_acc.kind() != PropertyKind::Scalar {
                        return Err(SpecError::ConditionNotScalar {
                            name: desc.name.clone(),
                            referenced: referenced.clone(),
                        });
                    }
                    CompiledCond::PropertyPositive {
                        category: table.category,
                        acc: cond_acc,
                    }
                }
            };
            OutputOp::Conditional {
                condition,
                when_true: compile_expr(desc, table, when_true)?,
                when_false: compile_expr(desc, table, when_false)?,
            }
        }
    };
    Ok(Some(op))
}

// ── Catalog ────────────────────────────────────────────────────────

/// The compiled property catalog.
///
/// Immutable after compilation; shared read-only across all concurrent
/// tree workers without synchronization.
#[derive(Debug)]
pub struct Catalog {
    halo: CategoryTable,
    galaxy: CategoryTable,
    metadata: Vec<PropertyMeta>,
    output_ops: Vec<OutputOp>,
    output_names: Vec<String>,
    output_set: PropertySet,
}

impl Catalog {
    /// Slot count of a halo record.
    pub fn halo_slot_count(&self) -> usize {
        self.halo.slot_count
    }

    /// Slot count of a galaxy record.
    pub fn galaxy_slot_count(&self) -> usize {
        self.galaxy.slot_count
    }

    /// Accessor for a halo-category property.
    pub fn halo_accessor(&self, name: &str) -> Option<Accessor> {
        self.halo.accessor(name)
    }

    /// Accessor for a galaxy-category property.
    pub fn galaxy_accessor(&self, name: &str) -> Option<Accessor> {
        self.galaxy.accessor(name)
    }

    /// A fresh, detached halo record (tests and fixtures).
    pub fn new_halo_record(&self) -> Record {
        Record::detached(self.halo.slot_count)
    }

    /// A fresh, detached galaxy record (tests and fixtures).
    pub fn new_galaxy_record(&self) -> Record {
        Record::detached(self.galaxy.slot_count)
    }

    /// A fresh halo record allocated from a region under
    /// [`AllocCategory::HaloWorking`].
    pub fn halo_record_in(&self, region: &ForestRegion) -> Result<Record, ArenaError> {
        Ok(Record::from_storage(
            region.alloc_slots(AllocCategory::HaloWorking, self.halo.slot_count)?,
        ))
    }

    /// A fresh galaxy record allocated from a region under
    /// [`AllocCategory::GalaxyState`].
    pub fn galaxy_record_in(&self, region: &ForestRegion) -> Result<Record, ArenaError> {
        Ok(Record::from_storage(
            region.alloc_slots(AllocCategory::GalaxyState, self.galaxy.slot_count)?,
        ))
    }

    /// Run the halo init plan: every halo-category property is set by
    /// its rule. After this returns, no declared field is
    /// uninitialized.
    pub fn init_halo_record(
        &self,
        record: &mut Record,
        env: &ComputeEnv<'_>,
    ) -> Result<(), SpecError> {
        self.run_init(&self.halo, record, env, None)
    }

    /// Run the galaxy init plan. The halo record is available to
    /// computed rules.
    pub fn init_galaxy_record(
        &self,
        record: &mut Record,
        halo: &Record,
        env: &ComputeEnv<'_>,
    ) -> Result<(), SpecError> {
        self.run_init(&self.galaxy, record, env, Some(halo))
    }

    fn run_init(
        &self,
        table: &CategoryTable,
        record: &mut Record,
        env: &ComputeEnv<'_>,
        halo: Option<&Record>,
    ) -> Result<(), SpecError> {
        if record.slot_count() != table.slot_count {
            return Err(SpecError::StorageSizeMismatch {
                category: table.category,
                expected: table.slot_count,
                got: record.slot_count(),
            });
        }
        for op in &table.init_ops {
            match op {
                InitOp::Default { acc, value } => record.set(*acc, *value),
                InitOp::FromSource { acc, field } => record.set(*acc, field.read(env.raw)),
                InitOp::Computed {
                    acc,
                    name,
                    function,
                } => {
                    let value = self.run_compute(name, function, env, halo, None)?;
                    if value.kind() != acc.kind() {
                        return Err(SpecError::ComputationKindMismatch {
                            name: name.clone(),
                            function: function.clone(),
                            expected: acc.kind(),
                            got: value.kind(),
                        });
                    }
                    record.set(*acc, value);
                }
            }
        }
        Ok(())
    }

    fn run_compute(
        &self,
        name: &str,
        function: &str,
        env: &ComputeEnv<'_>,
        halo: Option<&Record>,
        galaxy: Option<&Record>,
    ) -> Result<PropertyValue, SpecError> {
        let f = env
            .computes
            .get(function)
            .ok_or_else(|| SpecError::UnknownComputation {
                name: name.to_string(),
                function: function.to_string(),
            })?;
        let ctx = ComputeCtx {
            raw: env.raw,
            role: env.role,
            redshift: env.redshift,
            cosmology: env.cosmology,
            catalog: self,
            halo,
            galaxy,
        };
        Ok(f(&ctx))
    }

    /// Run the output plan: build a flattened [`OutputRecord`] from a
    /// finalized working halo and its galaxy.
    pub fn build_output(
        &self,
        halo_idx: HaloIdx,
        galaxy_tag: GalaxyTag,
        halo: &Record,
        galaxy: &Record,
        env: &ComputeEnv<'_>,
    ) -> Result<OutputRecord, SpecError> {
        if halo.slot_count() != self.halo.slot_count {
            return Err(SpecError::StorageSizeMismatch {
                category: PropertyCategory::Halo,
                expected: self.halo.slot_count,
                got: halo.slot_count(),
            });
        }
        if galaxy.slot_count() != self.galaxy.slot_count {
            return Err(SpecError::StorageSizeMismatch {
                category: PropertyCategory::Galaxy,
                expected: self.galaxy.slot_count,
                got: galaxy.slot_count(),
            });
        }
        let pick = |category: PropertyCategory| match category {
            PropertyCategory::Halo => halo,
            PropertyCategory::Galaxy => galaxy,
        };
        let mut values = Vec::with_capacity(self.output_ops.len());
        for op in &self.output_ops {
            let value = match op {
                OutputOp::Direct { category, acc } => pick(*category).get(*acc),
                OutputOp::FromSource { field } => field.read(env.raw),
                OutputOp::Compute {
                    name,
                    function,
                    kind,
                } => {
                    let value =
                        self.run_compute(name, function, env, Some(halo), Some(galaxy))?;
                    if value.kind() != *kind {
                        return Err(SpecError::ComputationKindMismatch {
                            name: name.clone(),
                            function: function.clone(),
                            expected: *kind,
                            got: value.kind(),
                        });
                    }
                    value
                }
                OutputOp::Conditional {
                    condition,
                    when_true,
                    when_false,
                } => {
                    let holds = match condition {
                        CompiledCond::RoleIs(role) => env.role == *role,
                        CompiledCond::PropertyPositive { category, acc } => {
                            pick(*category).scalar(*acc) > 0.0
                        }
                    };
                    let expr = if holds { when_true } else { when_false };
                    match expr {
                        CompiledExpr::Value(value) => *value,
                        CompiledExpr::Property { category, acc } => pick(*category).get(*acc),
                        CompiledExpr::Source(field) => field.read(env.raw),
                    }
                }
            };
            values.push(value);
        }
        Ok(OutputRecord {
            halo: halo_idx,
            galaxy: galaxy_tag,
            values,
        })
    }

    /// The metadata table, in property-ID order.
    pub fn metadata(&self) -> &[PropertyMeta] {
        &self.metadata
    }

    /// Metadata for one property by category and name.
    pub fn find_meta(&self, category: PropertyCategory, name: &str) -> Option<&PropertyMeta> {
        self.metadata
            .iter()
            .find(|m| m.category == category && m.name == name)
    }

    /// IDs of all output-flagged properties.
    pub fn output_properties(&self) -> &PropertySet {
        &self.output_set
    }

    /// Output column names, in output-record order.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.output_names.iter().map(String::as_str)
    }
}
