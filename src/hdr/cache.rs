//! Last merged frame, kept across calls until replaced or evicted

use tracing::debug;

use crate::frame::Frame;

/// Why a cached merge was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Input counter went backwards past the cached frame
    CounterRegression { cached: i64, input: i64 },
    /// Input resolution no longer matches
    ResolutionChange,
}

#[derive(Debug, Default)]
pub struct MergedCache {
    frame: Option<Frame>,
}

impl MergedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
    }

    pub fn replace(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }

    pub fn clear(&mut self) {
        self.frame = None;
    }

    /// Drops the cached frame if `input` shows a counter regression or a
    /// resolution change. Returns what triggered the eviction, if any.
    pub fn evict_if_stale(&mut self, input: &Frame) -> Option<Eviction> {
        let cached = self.frame.as_ref()?;

        let reason = match (cached.frame_counter(), input.frame_counter()) {
            (Some(c), Some(r)) if c > r => Some(Eviction::CounterRegression {
                cached: c,
                input: r,
            }),
            _ if !cached.profile().same_resolution(input.profile()) => {
                Some(Eviction::ResolutionChange)
            }
            _ => None,
        };

        if let Some(reason) = reason {
            debug!("Discarding cached merge: {:?}", reason);
            self.frame = None;
        }
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{depth_frame, MetadataKind};

    fn frame(w: u32, h: u32, counter: i64) -> Frame {
        let n = (w * h) as usize;
        depth_frame(w, h, &vec![1; n], &[(MetadataKind::FrameCounter, counter)])
    }

    #[test]
    fn keeps_frame_for_newer_input() {
        let mut cache = MergedCache::new();
        cache.replace(frame(4, 2, 10));
        assert_eq!(cache.evict_if_stale(&frame(4, 2, 12)), None);
        assert_eq!(cache.evict_if_stale(&frame(4, 2, 10)), None);
        assert!(!cache.is_empty());
    }

    #[test]
    fn counter_regression_evicts() {
        let mut cache = MergedCache::new();
        cache.replace(frame(4, 2, 10));
        assert_eq!(
            cache.evict_if_stale(&frame(4, 2, 3)),
            Some(Eviction::CounterRegression {
                cached: 10,
                input: 3
            })
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn resolution_change_evicts() {
        let mut cache = MergedCache::new();
        cache.replace(frame(4, 2, 10));
        assert_eq!(
            cache.evict_if_stale(&frame(2, 4, 11)),
            Some(Eviction::ResolutionChange)
        );
        assert!(cache.get().is_none());
    }

    #[test]
    fn empty_cache_is_untouched() {
        let mut cache = MergedCache::new();
        assert_eq!(cache.evict_if_stale(&frame(1, 1, 0)), None);
        assert!(cache.is_empty());
    }
}
