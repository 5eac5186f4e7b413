//! HDR merge stage: pairs sequence-tagged depth framesets and merges each
//! completed pair into a single depth frame.

pub mod cache;
pub mod check;
pub mod merge;
pub mod pair;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use tracing::{debug, instrument, trace};

pub use cache::{Eviction, MergedCache};
pub use check::{check_mergeability, is_eligible, should_use_ir, Mergeability, RejectReason};
pub use merge::{merge, select, select_with_ir, IrWindow, MergeOutput};
pub use pair::PairBuffer;

use crate::frame::{FrameAllocator, FrameUnit};
use crate::pipeline::ProcessingBlock;
use crate::{HdrConfig, Metrics};

/// HDR merge processing block
pub struct HdrMerge {
    window: IrWindow,
    sequence_size: i64,
    pending_timeout: Option<Duration>,
    pairs: PairBuffer,
    cache: MergedCache,
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_in: AtomicU64,
    merged: AtomicU64,
    merged_with_ir: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
    alloc_failures: AtomicU64,
    stale_discards: AtomicU64,
}

impl Stats {
    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(name).increment(1);
    }
}

impl Default for HdrMerge {
    fn default() -> Self {
        Self::from_config(&HdrConfig::default())
    }
}

impl HdrMerge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &HdrConfig) -> Self {
        Self {
            window: IrWindow::from(config),
            sequence_size: config.sequence_size,
            pending_timeout: config.pending_timeout_ms.map(Duration::from_millis),
            pairs: PairBuffer::new(),
            cache: MergedCache::new(),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Number of framesets waiting for their partner
    pub fn pending(&self) -> usize {
        self.pairs.len()
    }

    pub fn cached(&self) -> Option<&crate::Frame> {
        self.cache.get()
    }

    pub fn stats(&self) -> Metrics {
        let s = &self.stats;
        Metrics {
            frames_in: s.frames_in.load(Ordering::Relaxed),
            merged: s.merged.load(Ordering::Relaxed),
            merged_with_ir: s.merged_with_ir.load(Ordering::Relaxed),
            rejected: s.rejected.load(Ordering::Relaxed),
            dropped: s.dropped.load(Ordering::Relaxed),
            evicted: s.evicted.load(Ordering::Relaxed),
            alloc_failures: s.alloc_failures.load(Ordering::Relaxed),
            stale_discards: s.stale_discards.load(Ordering::Relaxed),
        }
    }

    fn discard_stale_half_pair(&mut self, sequence_id: i64) {
        let Some(timeout) = self.pending_timeout else {
            return;
        };
        if sequence_id != 1 {
            return;
        }
        if let Some(age) = self.pairs.pending_age(Instant::now()) {
            if age > timeout {
                debug!("Discarding half pair held for {:?}", age);
                self.pairs.clear();
                Stats::bump(&self.stats.stale_discards, "hdr_merge_stale_discards");
            }
        }
    }

    fn reject(&self, reason: RejectReason) {
        debug!("Pair not mergeable: {:?}", reason);
        Stats::bump(&self.stats.rejected, "hdr_merge_pairs_rejected");
    }

    /// Returns true once a pair reached the merge step, whether or not a
    /// buffer could be allocated for it
    fn merge_ready_pair(&mut self, allocator: &dyn FrameAllocator) -> bool {
        let Some((first, second)) = self.pairs.extract_and_clear() else {
            return false;
        };

        let use_ir = match check_mergeability(&first, &second) {
            Mergeability::Mergeable { use_ir } => use_ir,
            Mergeability::Rejected(reason) => {
                self.reject(reason);
                return false;
            }
        };

        match merge(allocator, &first, &second, use_ir, self.window) {
            MergeOutput::Merged(frame) => {
                trace!("Merged pair at counter {:?}", frame.frame_counter());
                self.cache.replace(frame);
                Stats::bump(&self.stats.merged, "hdr_merge_pairs_merged");
                if use_ir {
                    Stats::bump(&self.stats.merged_with_ir, "hdr_merge_pairs_merged_ir");
                }
                true
            }
            MergeOutput::Unmerged(_) => {
                Stats::bump(&self.stats.alloc_failures, "hdr_merge_alloc_failures");
                // Cache is left as is; no eviction either
                true
            }
            MergeOutput::Rejected(reason) => {
                self.reject(reason);
                false
            }
        }
    }
}

impl ProcessingBlock for HdrMerge {
    fn name(&self) -> &str {
        "HDR Merge"
    }

    fn should_process(&self, unit: &FrameUnit) -> bool {
        is_eligible(unit, self.sequence_size)
    }

    #[instrument(skip(self, allocator, unit), fields(counter = ?unit.frame_counter()))]
    fn process(&mut self, allocator: &dyn FrameAllocator, unit: FrameUnit) -> FrameUnit {
        let Some(set) = unit.as_frameset() else {
            return unit;
        };
        let Some(depth) = set.depth_frame() else {
            return unit;
        };
        let Some(sequence_id) = depth.sequence_id() else {
            return unit;
        };
        Stats::bump(&self.stats.frames_in, "hdr_merge_frames_in");

        self.discard_stale_half_pair(sequence_id);
        if !self.pairs.admit(set.clone(), sequence_id) {
            debug!("Dropped out-of-order sequence id {}", sequence_id);
            Stats::bump(&self.stats.dropped, "hdr_merge_admissions_dropped");
        }

        let handled = self.pairs.is_complete() && self.merge_ready_pair(allocator);
        if !handled && self.cache.evict_if_stale(depth).is_some() {
            Stats::bump(&self.stats.evicted, "hdr_merge_cache_evictions");
        }

        match self.cache.get() {
            Some(merged) => FrameUnit::Single(merged.clone()),
            None => unit,
        }
    }

    fn reset(&mut self) {
        self.pairs.clear();
        self.cache.clear();
    }
}
