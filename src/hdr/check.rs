//! Eligibility, pair consistency and infrared alignment checks

use tracing::trace;

use crate::frame::{Frame, FrameUnit, Frameset, MetadataKind};

/// Why a completed pair could not be merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingDepth,
    /// Depth not tagged as a depth frame, not Z16, or buffer too short
    UnreadableDepth,
    MissingCounter,
    CounterGap { first: i64, second: i64 },
    DepthSizeMismatch,
}

/// Outcome of checking a completed pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mergeability {
    Mergeable { use_ir: bool },
    Rejected(RejectReason),
}

impl Mergeability {
    pub fn is_mergeable(&self) -> bool {
        matches!(self, Mergeability::Mergeable { .. })
    }
}

/// A unit is eligible when it is a frameset whose depth frame declares
/// a sequence id and a sequence size equal to `sequence_size`.
pub fn is_eligible(unit: &FrameUnit, sequence_size: i64) -> bool {
    let Some(set) = unit.as_frameset() else {
        return false;
    };
    let Some(depth) = set.depth_frame() else {
        return false;
    };

    if !depth.supports_metadata(MetadataKind::SubpresetSequenceSize)
        || !depth.supports_metadata(MetadataKind::SubpresetSequenceId)
    {
        return false;
    }
    depth.sequence_size() == Some(sequence_size)
}

/// Checks that `second` directly follows `first` and both depth frames
/// share dimensions, then decides whether infrared can guide the merge.
pub fn check_mergeability(first: &Frameset, second: &Frameset) -> Mergeability {
    let (Some(d0), Some(d1)) = (first.depth_frame(), second.depth_frame()) else {
        return Mergeability::Rejected(RejectReason::MissingDepth);
    };
    if d0.as_depth().is_err() || d1.as_depth().is_err() {
        return Mergeability::Rejected(RejectReason::UnreadableDepth);
    }
    let (Some(c0), Some(c1)) = (d0.frame_counter(), d1.frame_counter()) else {
        return Mergeability::Rejected(RejectReason::MissingCounter);
    };

    // Output is built from frames n and n+1 with n as the base
    if c0.checked_add(1) != Some(c1) {
        return Mergeability::Rejected(RejectReason::CounterGap {
            first: c0,
            second: c1,
        });
    }
    if !d0.profile().same_resolution(d1.profile()) {
        return Mergeability::Rejected(RejectReason::DepthSizeMismatch);
    }

    let use_ir = should_use_ir(d0, first.infrared_frame(), d1, second.infrared_frame());
    Mergeability::Mergeable { use_ir }
}

/// Infrared may guide the merge only if both companions exist, match the
/// depth resolution, carry usable 8-bit data, and were captured with the
/// same frame counter and sequence id as their depth frame.
pub fn should_use_ir(
    depth0: &Frame,
    ir0: Option<&Frame>,
    depth1: &Frame,
    ir1: Option<&Frame>,
) -> bool {
    let (Some(ir0), Some(ir1)) = (ir0, ir1) else {
        return false;
    };

    if !depth0.profile().same_resolution(ir0.profile())
        || !ir1.profile().same_resolution(ir0.profile())
    {
        trace!("IR dimensions differ from depth");
        return false;
    }
    if ir0.as_infrared().is_err() || ir1.as_infrared().is_err() {
        trace!("IR frames are not readable as Y8");
        return false;
    }

    let aligned = same_metadata(depth0, ir0, MetadataKind::FrameCounter)
        && same_metadata(depth1, ir1, MetadataKind::FrameCounter)
        && same_metadata(depth0, ir0, MetadataKind::SubpresetSequenceId)
        && same_metadata(depth1, ir1, MetadataKind::SubpresetSequenceId);
    if !aligned {
        trace!("IR metadata out of step with depth");
    }
    aligned
}

// Missing metadata on either side counts as a mismatch
fn same_metadata(a: &Frame, b: &Frame, kind: MetadataKind) -> bool {
    match (a.metadata(kind), b.metadata(kind)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
