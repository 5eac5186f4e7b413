//! Two-slot buffer collecting an HDR pair in sequence order

use std::time::{Duration, Instant};

use crate::frame::Frameset;

const PAIR_LEN: usize = 2;

/// Holds up to two framesets, indexed by sequence id
#[derive(Debug, Default)]
pub struct PairBuffer {
    slots: Vec<Frameset>,
}

impl PairBuffer {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(PAIR_LEN),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Admit `set` only when `sequence_id` equals the current occupancy.
    /// Returns false (and leaves the buffer alone) otherwise.
    pub fn admit(&mut self, set: Frameset, sequence_id: i64) -> bool {
        if self.is_complete() || sequence_id != self.slots.len() as i64 {
            return false;
        }
        self.slots.push(set);
        true
    }

    pub fn is_complete(&self) -> bool {
        self.slots.len() >= PAIR_LEN
    }

    /// Takes both framesets, ordered by sequence id, and empties the buffer.
    /// The buffer is emptied even when the pair is incomplete.
    pub fn extract_and_clear(&mut self) -> Option<(Frameset, Frameset)> {
        let mut drained = self.slots.drain(..);
        let pair = match (drained.next(), drained.next()) {
            (Some(first), Some(second)) => Some((first, second)),
            _ => None,
        };
        drop(drained);
        self.slots.clear();
        pair
    }

    /// Age of the held id-0 frameset, by its depth capture timestamp
    pub fn pending_age(&self, now: Instant) -> Option<Duration> {
        let held = self.slots.first()?.depth_frame()?;
        Some(now.saturating_duration_since(held.timestamp))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
