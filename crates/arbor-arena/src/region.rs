//! The forest-scoped allocation region.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::buffer::RegionBuf;
use crate::category::AllocCategory;
use crate::config::RegionBudget;
use crate::error::ArenaError;
use crate::report::{CategoryStats, RegionReport};

const SLOT_BYTES: u64 = std::mem::size_of::<f64>() as u64;

/// Shared accounting state between a region and its buffers.
///
/// Buffers hold an `Arc` to the ledger and return their bytes on drop,
/// so the region can tell at close time whether anything escaped.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    live: [AtomicU64; AllocCategory::ALL.len()],
    allocated: [AtomicU64; AllocCategory::ALL.len()],
    freed: [AtomicU64; AllocCategory::ALL.len()],
    peak: [AtomicU64; AllocCategory::ALL.len()],
}

impl Ledger {
    fn record_alloc(&self, category: AllocCategory, bytes: u64) {
        let i = category.index();
        self.allocated[i].fetch_add(bytes, Ordering::Relaxed);
        let live = self.live[i].fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak[i].fetch_max(live, Ordering::Relaxed);
    }

    pub(crate) fn record_free(&self, category: AllocCategory, bytes: u64) {
        let i = category.index();
        self.live[i].fetch_sub(bytes, Ordering::Relaxed);
        self.freed[i].fetch_add(bytes, Ordering::Relaxed);
    }

    fn live_bytes(&self, category: AllocCategory) -> u64 {
        self.live[category.index()].load(Ordering::Relaxed)
    }

    fn stats(&self, category: AllocCategory) -> CategoryStats {
        let i = category.index();
        CategoryStats {
            allocated_bytes: self.allocated[i].load(Ordering::Relaxed),
            freed_bytes: self.freed[i].load(Ordering::Relaxed),
            peak_live_bytes: self.peak[i].load(Ordering::Relaxed),
        }
    }
}

/// A bounded allocation lifetime tied to the processing of one tree.
///
/// All per-tree state — raw records, working halos, galaxy state,
/// output staging — is allocated through the region as f64 slot
/// buffers. Regions do not nest; nothing allocated in one region may be
/// reachable from another, which is the invariant that makes per-tree
/// parallelism safe without locks.
///
/// # Close semantics
///
/// [`close`](ForestRegion::close) consumes the region. It succeeds only
/// when every [`RegionBuf`] has been dropped, returning the final
/// per-category accounting; otherwise it fails with the categories and
/// byte counts still live. Either way the buffers' memory itself is
/// reclaimed by `Drop` as usual — the check exists to make lifetime
/// bugs loud, not to manage memory.
#[derive(Debug)]
pub struct ForestRegion {
    ledger: Arc<Ledger>,
    budget: RegionBudget,
}

impl ForestRegion {
    /// Open a region with the given budget.
    pub fn open(budget: RegionBudget) -> Self {
        Self {
            ledger: Arc::new(Ledger::default()),
            budget,
        }
    }

    /// Allocate a zero-initialized buffer of `slots` f64 slots.
    ///
    /// Fails with [`ArenaError::BudgetExceeded`] if the category's cap
    /// would be exceeded; the region remains usable (the failed
    /// allocation changes nothing).
    pub fn alloc_slots(
        &self,
        category: AllocCategory,
        slots: usize,
    ) -> Result<RegionBuf, ArenaError> {
        let bytes = slots as u64 * SLOT_BYTES;
        if let Some(cap) = self.budget.cap(category) {
            let live = self.ledger.live_bytes(category);
            if live + bytes > cap {
                return Err(ArenaError::BudgetExceeded {
                    category,
                    requested: bytes,
                    live,
                    budget: cap,
                });
            }
        }
        self.ledger.record_alloc(category, bytes);
        Ok(RegionBuf::attached(
            vec![0.0; slots],
            category,
            Arc::clone(&self.ledger),
        ))
    }

    /// Register externally-owned bytes against the region's ledger.
    ///
    /// Used for per-tree allocations that are not slot buffers (the
    /// raw halo records, traversal scaffolding): the returned guard
    /// counts the bytes under `category` until it is dropped, so the
    /// close-time leak check covers them like any buffer.
    pub fn charge(
        &self,
        category: AllocCategory,
        bytes: u64,
    ) -> Result<RegionCharge, ArenaError> {
        if let Some(cap) = self.budget.cap(category) {
            let live = self.ledger.live_bytes(category);
            if live + bytes > cap {
                return Err(ArenaError::BudgetExceeded {
                    category,
                    requested: bytes,
                    live,
                    budget: cap,
                });
            }
        }
        self.ledger.record_alloc(category, bytes);
        Ok(RegionCharge {
            ledger: Arc::clone(&self.ledger),
            category,
            bytes,
        })
    }

    /// Bytes currently live in one category.
    pub fn live_bytes(&self, category: AllocCategory) -> u64 {
        self.ledger.live_bytes(category)
    }

    /// A point-in-time accounting snapshot (the region stays open).
    pub fn snapshot_report(&self) -> RegionReport {
        let mut stats = [CategoryStats::default(); AllocCategory::ALL.len()];
        for category in AllocCategory::ALL {
            stats[category.index()] = self.ledger.stats(category);
        }
        RegionReport::new(stats)
    }

    /// Close the region, verifying that nothing is still live.
    ///
    /// On success every category reports `allocated == freed`. On
    /// failure the error lists each category with a non-zero live byte
    /// count — some buffer outlived the region it belongs to.
    pub fn close(self) -> Result<RegionReport, ArenaError> {
        let mut leaked = Vec::new();
        for category in AllocCategory::ALL {
            let live = self.ledger.live_bytes(category);
            if live > 0 {
                leaked.push((category, live));
            }
        }
        if !leaked.is_empty() {
            return Err(ArenaError::LiveAllocations { live: leaked });
        }
        Ok(self.snapshot_report())
    }
}

/// A byte charge against a region for storage the region does not own.
///
/// Returned by [`ForestRegion::charge`]; the bytes are released when
/// the guard drops.
#[derive(Debug)]
pub struct RegionCharge {
    ledger: Arc<Ledger>,
    category: AllocCategory,
    bytes: u64,
}

impl RegionCharge {
    /// Bytes held by this charge.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for RegionCharge {
    fn drop(&mut self) {
        self.ledger.record_free(self.category, self.bytes);
    }
}
