//! Slot-backed records and typed accessors.

use arbor_arena::RegionBuf;
use arbor_core::{PropertyKind, PropertyValue};

use crate::catalog::Accessor;

/// One halo or galaxy record: a flat array of f64 slots addressed
/// through compiled [`Accessor`]s.
///
/// Scalars occupy one slot; vectors three consecutive slots; integers
/// one slot storing the i64 bit pattern, so every `i64` round-trips
/// exactly (the slot is never used arithmetically as a float). A
/// zeroed buffer therefore reads as 0 / 0.0 / zero-vector for every
/// kind, which is what a fresh record looks like before its init plan
/// runs.
///
/// Galaxy records are never shared: carrying a galaxy forward to a
/// descendant goes through [`deep_copy_from`](Record::deep_copy_from),
/// the single copy primitive in the workspace, so sibling branches can
/// never observe each other's mutations.
#[derive(Debug)]
pub struct Record {
    slots: RegionBuf,
}

impl Record {
    /// Wrap region-allocated storage. The buffer length must match the
    /// category layout; catalog entry points verify this.
    pub fn from_storage(slots: RegionBuf) -> Self {
        Self { slots }
    }

    /// A record backed by detached storage (tests, fixtures).
    pub fn detached(slot_count: usize) -> Self {
        Self {
            slots: RegionBuf::detached(slot_count),
        }
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Read a scalar property.
    pub fn scalar(&self, acc: Accessor) -> f64 {
        debug_assert_eq!(acc.kind(), PropertyKind::Scalar);
        self.slots[acc.offset()]
    }

    /// Write a scalar property.
    pub fn set_scalar(&mut self, acc: Accessor, value: f64) {
        debug_assert_eq!(acc.kind(), PropertyKind::Scalar);
        self.slots[acc.offset()] = value;
    }

    /// Read an integer property.
    pub fn int(&self, acc: Accessor) -> i64 {
        debug_assert_eq!(acc.kind(), PropertyKind::Int);
        self.slots[acc.offset()].to_bits() as i64
    }

    /// Write an integer property.
    pub fn set_int(&mut self, acc: Accessor, value: i64) {
        debug_assert_eq!(acc.kind(), PropertyKind::Int);
        self.slots[acc.offset()] = f64::from_bits(value as u64);
    }

    /// Read a vector property.
    pub fn vec3(&self, acc: Accessor) -> [f64; 3] {
        debug_assert_eq!(acc.kind(), PropertyKind::Vec3);
        let o = acc.offset();
        [self.slots[o], self.slots[o + 1], self.slots[o + 2]]
    }

    /// Write a vector property.
    pub fn set_vec3(&mut self, acc: Accessor, value: [f64; 3]) {
        debug_assert_eq!(acc.kind(), PropertyKind::Vec3);
        let o = acc.offset();
        self.slots[o..o + 3].copy_from_slice(&value);
    }

    /// Read a property as a tagged value.
    pub fn get(&self, acc: Accessor) -> PropertyValue {
        match acc.kind() {
            PropertyKind::Int => PropertyValue::Int(self.int(acc)),
            PropertyKind::Scalar => PropertyValue::Scalar(self.scalar(acc)),
            PropertyKind::Vec3 => PropertyValue::Vec3(self.vec3(acc)),
        }
    }

    /// Write a property from a tagged value.
    ///
    /// # Panics
    ///
    /// Panics if the value's kind does not match the accessor's kind.
    /// Compilation guarantees matching kinds for every plan-driven
    /// write, so a mismatch is a programming error at the call site.
    pub fn set(&mut self, acc: Accessor, value: PropertyValue) {
        match (acc.kind(), value) {
            (PropertyKind::Int, PropertyValue::Int(v)) => self.set_int(acc, v),
            (PropertyKind::Scalar, PropertyValue::Scalar(v)) => self.set_scalar(acc, v),
            (PropertyKind::Vec3, PropertyValue::Vec3(v)) => self.set_vec3(acc, v),
            (expected, got) => panic!(
                "kind mismatch writing property: accessor is {expected}, value is {}",
                got.kind()
            ),
        }
    }

    /// Copy every slot from another record of the same layout.
    ///
    /// This is the deep-copy used for progenitor inheritance; after the
    /// call the two records share nothing.
    ///
    /// # Panics
    ///
    /// Panics if the slot counts differ (records of different
    /// categories).
    pub fn deep_copy_from(&mut self, src: &Record) {
        assert_eq!(
            self.slots.len(),
            src.slots.len(),
            "deep copy between records of different layouts"
        );
        self.slots.copy_from_slice(&src.slots);
    }
}
