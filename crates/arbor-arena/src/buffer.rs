//! Owned slot buffers handed out by a region.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::category::AllocCategory;
use crate::region::Ledger;

/// An owned, zero-initialized buffer of f64 slots.
///
/// Buffers allocated from a [`ForestRegion`](crate::region::ForestRegion)
/// carry a handle to the region's ledger and return their bytes when
/// dropped; the region's `close()` uses this to detect buffers that
/// outlived it. Detached buffers (tests, mocks) carry no handle.
#[derive(Debug)]
pub struct RegionBuf {
    data: Vec<f64>,
    tag: Option<LedgerTag>,
}

#[derive(Debug)]
struct LedgerTag {
    ledger: Arc<Ledger>,
    category: AllocCategory,
    bytes: u64,
}

impl RegionBuf {
    pub(crate) fn attached(data: Vec<f64>, category: AllocCategory, ledger: Arc<Ledger>) -> Self {
        let bytes = (data.len() * std::mem::size_of::<f64>()) as u64;
        Self {
            data,
            tag: Some(LedgerTag {
                ledger,
                category,
                bytes,
            }),
        }
    }

    /// A buffer tied to no region, for tests and mock storage.
    pub fn detached(slots: usize) -> Self {
        Self {
            data: vec![0.0; slots],
            tag: None,
        }
    }

    /// Number of f64 slots.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer has zero slots.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The category this buffer was allocated under, if attached.
    pub fn category(&self) -> Option<AllocCategory> {
        self.tag.as_ref().map(|t| t.category)
    }
}

impl Deref for RegionBuf {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.data
    }
}

impl DerefMut for RegionBuf {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Drop for RegionBuf {
    fn drop(&mut self) {
        if let Some(tag) = &self.tag {
            tag.ledger.record_free(tag.category, tag.bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionBudget;
    use crate::region::ForestRegion;

    #[test]
    fn detached_buffer_is_zeroed_and_untagged() {
        let buf = RegionBuf::detached(8);
        assert_eq!(buf.len(), 8);
        assert!(buf.iter().all(|&v| v == 0.0));
        assert_eq!(buf.category(), None);
    }

    #[test]
    fn attached_buffer_reports_category() {
        let region = ForestRegion::open(RegionBudget::unlimited());
        let buf = region.alloc_slots(AllocCategory::GalaxyState, 4).unwrap();
        assert_eq!(buf.category(), Some(AllocCategory::GalaxyState));
        drop(buf);
        region.close().unwrap();
    }

    #[test]
    fn writes_persist_through_deref() {
        let mut buf = RegionBuf::detached(3);
        buf[1] = 42.0;
        assert_eq!(&buf[..], &[0.0, 42.0, 0.0]);
    }
}
