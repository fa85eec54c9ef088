//! Region accounting reports.

use crate::category::AllocCategory;
use std::fmt;

/// Accounting totals for one category over a region's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CategoryStats {
    /// Total bytes allocated in this category.
    pub allocated_bytes: u64,
    /// Total bytes returned by dropped buffers.
    pub freed_bytes: u64,
    /// High-water mark of simultaneously live bytes.
    pub peak_live_bytes: u64,
}

impl CategoryStats {
    /// `allocated - freed`; zero for a cleanly closed region.
    pub fn net_bytes(&self) -> i64 {
        self.allocated_bytes as i64 - self.freed_bytes as i64
    }
}

/// Final accounting for a closed region.
///
/// Produced by [`ForestRegion::close`](crate::region::ForestRegion::close)
/// on success; every category satisfies `allocated == freed`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionReport {
    stats: [CategoryStats; AllocCategory::ALL.len()],
}

impl RegionReport {
    pub(crate) fn new(stats: [CategoryStats; AllocCategory::ALL.len()]) -> Self {
        Self { stats }
    }

    /// Accounting totals for one category.
    pub fn category(&self, category: AllocCategory) -> &CategoryStats {
        &self.stats[category.index()]
    }

    /// Total bytes allocated across all categories.
    pub fn total_allocated_bytes(&self) -> u64 {
        self.stats.iter().map(|s| s.allocated_bytes).sum()
    }

    /// Total bytes freed across all categories.
    pub fn total_freed_bytes(&self) -> u64 {
        self.stats.iter().map(|s| s.freed_bytes).sum()
    }

    /// Largest single-category peak, a rough proxy for the region's
    /// memory footprint.
    pub fn max_peak_live_bytes(&self) -> u64 {
        self.stats.iter().map(|s| s.peak_live_bytes).max().unwrap_or(0)
    }

    /// Merge another report into this one (used when summarizing a run
    /// across many trees).
    pub fn absorb(&mut self, other: &RegionReport) {
        for (dst, src) in self.stats.iter_mut().zip(other.stats.iter()) {
            dst.allocated_bytes += src.allocated_bytes;
            dst.freed_bytes += src.freed_bytes;
            dst.peak_live_bytes = dst.peak_live_bytes.max(src.peak_live_bytes);
        }
    }
}

impl fmt::Display for RegionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for category in AllocCategory::ALL {
            let s = self.category(category);
            writeln!(
                f,
                "{category}: allocated {}B, freed {}B, peak {}B",
                s.allocated_bytes, s.freed_bytes, s.peak_live_bytes
            )?;
        }
        Ok(())
    }
}
