//! Property descriptors: the single source of truth for tracked fields.
//!
//! Every per-halo and per-galaxy field is declared as a
//! [`PropertyDescriptor`]. The catalog crate compiles the full
//! descriptor list into record layouts, accessors, initialization
//! plans, and output plans, so no second hand-maintained copy of "what
//! fields exist" can drift from this one.

use crate::id::{GalaxyTag, HaloIdx, PropertyId};
use crate::raw::SourceField;
use smallvec::SmallVec;
use std::fmt;

/// Classification of a property's data type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    /// A signed integer (snapshot numbers, type codes, IDs).
    Int,
    /// A single floating-point value.
    Scalar,
    /// A fixed three-component vector (position, velocity, spin).
    Vec3,
}

impl PropertyKind {
    /// Number of f64 storage slots this kind occupies in a record.
    pub fn slot_width(self) -> usize {
        match self {
            Self::Int | Self::Scalar => 1,
            Self::Vec3 => 3,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Scalar => "scalar",
            Self::Vec3 => "vec3",
        };
        f.write_str(name)
    }
}

/// A dynamically-typed property value.
///
/// Used at the edges of the system (initialization defaults, output
/// records, computed rules); the hot path goes through compiled
/// accessors that skip the tag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PropertyValue {
    /// An integer value.
    Int(i64),
    /// A scalar value.
    Scalar(f64),
    /// A three-component vector value.
    Vec3([f64; 3]),
}

impl PropertyValue {
    /// The kind of this value.
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Int(_) => PropertyKind::Int,
            Self::Scalar(_) => PropertyKind::Scalar,
            Self::Vec3(_) => PropertyKind::Vec3,
        }
    }

    /// The scalar payload, if this is a scalar.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The vector payload, if this is a vector.
    pub fn as_vec3(&self) -> Option<[f64; 3]> {
        match self {
            Self::Vec3(v) => Some(*v),
            _ => None,
        }
    }
}

/// How a property is initialized when a fresh record is created.
///
/// Every declared property is initialized by its rule before any module
/// reads the record; there is no "uninitialized" state.
#[derive(Clone, Debug, PartialEq)]
pub enum InitRule {
    /// Set to a literal default value.
    Default(PropertyValue),
    /// Copy from a named field of the originating [`RawHalo`](crate::raw::RawHalo).
    CopiedFromSource(SourceField),
    /// Produced by a named computation registered with the catalog.
    Computed(String),
}

/// How a property is emitted into an [`OutputRecord`].
#[derive(Clone, Debug, PartialEq)]
pub enum OutputRule {
    /// Not emitted; internal bookkeeping only.
    Skip,
    /// Copy the working value verbatim.
    Direct,
    /// Re-read the named field of the raw halo at output time.
    FromSource(SourceField),
    /// Recompute through a named computation at output time.
    Recompute(String),
    /// Choose between two expressions based on a condition.
    Conditional {
        /// The condition selecting which expression applies.
        condition: OutputCondition,
        /// Emitted when the condition holds.
        when_true: OutputExpr,
        /// Emitted when the condition does not hold.
        when_false: OutputExpr,
    },
    /// Produced by a named computation with no working-value default.
    Custom(String),
}

/// Condition for [`OutputRule::Conditional`].
#[derive(Clone, Debug, PartialEq)]
pub enum OutputCondition {
    /// The halo holds the given role this snapshot.
    RoleIs(crate::role::HaloRole),
    /// The named scalar property is strictly positive.
    PropertyPositive(String),
}

/// Value expression for [`OutputRule::Conditional`] branches.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputExpr {
    /// A literal value.
    Value(PropertyValue),
    /// The working value of a named property in the same category.
    Property(String),
    /// A field of the raw halo.
    Source(SourceField),
}

/// Which record a property belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyCategory {
    /// Dark-matter halo tracking state, owned by the core.
    Halo,
    /// Baryonic galaxy state, declared by physics modules.
    Galaxy,
}

impl fmt::Display for PropertyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Halo => "halo",
            Self::Galaxy => "galaxy",
        };
        f.write_str(name)
    }
}

/// Declarative description of one tracked field.
///
/// Descriptors are pure data: validation and compilation into layouts
/// and plans happen in the catalog crate, once, before any tree is
/// processed.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescriptor {
    /// Field name. Must be a valid identifier, unique in its category.
    pub name: String,
    /// Data type.
    pub kind: PropertyKind,
    /// How a fresh record initializes this field.
    pub init: InitRule,
    /// How the field reaches output records.
    pub output: OutputRule,
    /// Optional inclusive validity range for external validators.
    pub range: Option<(f64, f64)>,
    /// Sentinel values excluded from range validation (e.g. the 999.9
    /// "no merger scheduled" clock value).
    pub sentinels: Vec<f64>,
    /// Name of the module that populates this field, if any. Purely
    /// informational; activation checking uses module declarations.
    pub provided_by: Option<String>,
}

impl PropertyDescriptor {
    /// A scalar field with a literal default and direct output.
    pub fn scalar(name: &str, default: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::Scalar,
            init: InitRule::Default(PropertyValue::Scalar(default)),
            output: OutputRule::Direct,
            range: None,
            sentinels: Vec::new(),
            provided_by: None,
        }
    }

    /// An integer field with a literal default and direct output.
    pub fn int(name: &str, default: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::Int,
            init: InitRule::Default(PropertyValue::Int(default)),
            output: OutputRule::Direct,
            range: None,
            sentinels: Vec::new(),
            provided_by: None,
        }
    }

    /// A vector field copied from a raw-halo source field.
    pub fn vec3_from_source(name: &str, source: SourceField) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::Vec3,
            init: InitRule::CopiedFromSource(source),
            output: OutputRule::Direct,
            range: None,
            sentinels: Vec::new(),
            provided_by: None,
        }
    }

    /// Replace the output rule.
    pub fn with_output(mut self, output: OutputRule) -> Self {
        self.output = output;
        self
    }

    /// Replace the initialization rule.
    pub fn with_init(mut self, init: InitRule) -> Self {
        self.init = init;
        self
    }

    /// Attach a validity range.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    /// Attach sentinel values excluded from validation.
    pub fn with_sentinels(mut self, sentinels: &[f64]) -> Self {
        self.sentinels = sentinels.to_vec();
        self
    }

    /// Record the providing module's name.
    pub fn provided_by(mut self, module: &str) -> Self {
        self.provided_by = Some(module.to_string());
        self
    }
}

/// A set of property IDs implemented as a word-packed bitset.
///
/// Used by the catalog (output-flagged fields, per-category ID sets)
/// and by diagnostics. Stores up to 256 properties without heap
/// allocation.
#[derive(Clone, Debug, Default)]
pub struct PropertySet {
    words: SmallVec<[u64; 4]>,
}

impl PropertySet {
    const WORD_BITS: usize = 64;

    /// Create an empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Insert a property ID.
    pub fn insert(&mut self, id: PropertyId) {
        let word = id.0 as usize / Self::WORD_BITS;
        let bit = id.0 as usize % Self::WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << bit;
    }

    /// Whether the set contains a property ID.
    pub fn contains(&self, id: PropertyId) -> bool {
        let word = id.0 as usize / Self::WORD_BITS;
        let bit = id.0 as usize % Self::WORD_BITS;
        word < self.words.len() && (self.words[word] >> bit) & 1 == 1
    }

    /// Merge another set into this one.
    pub fn union_with(&mut self, other: &Self) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (dst, src) in self.words.iter_mut().zip(other.words.iter()) {
            *dst |= src;
        }
    }

    /// Whether every ID in `self` is also in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// Whether the set contains no IDs.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of IDs in the set.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over IDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            (0..Self::WORD_BITS)
                .filter(move |bit| (word >> bit) & 1 == 1)
                .map(move |bit| PropertyId((wi * Self::WORD_BITS + bit) as u32))
        })
    }
}

impl PartialEq for PropertySet {
    fn eq(&self, other: &Self) -> bool {
        let longest = self.words.len().max(other.words.len());
        (0..longest).all(|i| {
            self.words.get(i).copied().unwrap_or(0) == other.words.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for PropertySet {}

impl FromIterator<PropertyId> for PropertySet {
    fn from_iter<I: IntoIterator<Item = PropertyId>>(iter: I) -> Self {
        let mut set = Self::empty();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// A flattened, read-only snapshot of one finalized halo + galaxy,
/// destined for the output sink.
///
/// Values appear in the catalog's output order; field names and kinds
/// are available from the catalog's metadata table. The record carries
/// no layout of its own so that sinks stay decoupled from slot
/// arithmetic.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputRecord {
    /// Tree-local index of the halo this record describes.
    pub halo: HaloIdx,
    /// Identity of the galaxy carried by the halo.
    pub galaxy: GalaxyTag,
    /// Output-flagged values in catalog output order.
    pub values: Vec<PropertyValue>,
}
