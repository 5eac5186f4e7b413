//! Per-pixel HDR merge

use std::time::Instant;

use tracing::{instrument, warn};

use super::check::RejectReason;
use crate::frame::{Extension, Frame, FrameAllocator, Frameset};
use crate::HdrConfig;

/// Open interval of infrared intensities treated as neither under- nor
/// over-saturated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrWindow {
    pub under_saturated: u8,
    pub over_saturated: u8,
}

impl IrWindow {
    pub fn new(under_saturated: u8, over_saturated: u8) -> Self {
        Self {
            under_saturated,
            over_saturated,
        }
    }

    #[inline]
    pub fn is_valid(&self, ir: u8) -> bool {
        ir > self.under_saturated && ir < self.over_saturated
    }
}

impl Default for IrWindow {
    fn default() -> Self {
        Self::from(&HdrConfig::default())
    }
}

impl From<&HdrConfig> for IrWindow {
    fn from(config: &HdrConfig) -> Self {
        Self::new(config.ir_under_saturated, config.ir_over_saturated)
    }
}

/// First exposure wins when it has a return, second fills holes
#[inline]
pub fn select(d0: u16, d1: u16) -> u16 {
    if d0 != 0 {
        d0
    } else {
        d1
    }
}

/// Like [`select`], but a sample only counts when its IR is in the window
#[inline]
pub fn select_with_ir(d0: u16, ir0: u8, d1: u16, ir1: u8, window: IrWindow) -> u16 {
    if window.is_valid(ir0) && d0 != 0 {
        d0
    } else if window.is_valid(ir1) && d1 != 0 {
        d1
    } else {
        0
    }
}

/// Result of a merge attempt
#[derive(Debug, Clone)]
pub enum MergeOutput {
    Merged(Frame),
    /// No buffer could be allocated; carries the first frameset unchanged
    Unmerged(Frameset),
    /// The pair has no readable depth to merge
    Rejected(RejectReason),
}

/// Merges a checked pair into a new depth frame shaped like the first
/// depth frame. Infrared samples are read only when `use_ir` is set.
#[instrument(skip(allocator, first, second, window))]
pub fn merge(
    allocator: &dyn FrameAllocator,
    first: &Frameset,
    second: &Frameset,
    use_ir: bool,
    window: IrWindow,
) -> MergeOutput {
    let start = Instant::now();

    let (Some(first_depth), Some(second_depth)) = (first.depth_frame(), second.depth_frame())
    else {
        return MergeOutput::Rejected(RejectReason::MissingDepth);
    };
    let (d0, d1) = match (first_depth.as_depth(), second_depth.as_depth()) {
        (Ok(d0), Ok(d1)) => (d0, d1),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Depth frame unreadable, skipping merge: {}", e);
            return MergeOutput::Rejected(RejectReason::UnreadableDepth);
        }
    };

    let profile = *first_depth.profile();
    let Some(mut out) = allocator.allocate_video_frame(
        profile,
        first_depth,
        profile.bytes_per_pixel(),
        profile.width,
        profile.height,
        profile.stride_bytes,
        Extension::DepthFrame,
    ) else {
        warn!(
            "Failed to allocate {}x{} merged depth frame",
            profile.width, profile.height
        );
        return MergeOutput::Unmerged(first.clone());
    };
    out.set_sensor(first_depth.sensor());

    let ir = if use_ir {
        first
            .infrared_frame()
            .zip(second.infrared_frame())
            .and_then(|(a, b)| Some((a.as_infrared().ok()?, b.as_infrared().ok()?)))
    } else {
        None
    };

    let pixels = d0.samples().zip(d1.samples());
    match ir {
        Some((i0, i1)) => {
            let guided = pixels.zip(i0.samples().iter().zip(i1.samples()));
            for (i, ((a, b), (&ia, &ib))) in guided.enumerate() {
                out.put_u16(i, select_with_ir(a, ia, b, ib, window));
            }
        }
        None => {
            for (i, (a, b)) in pixels.enumerate() {
                out.put_u16(i, select(a, b));
            }
        }
    }

    metrics::histogram!("hdr_merge_merge_time_us").record(start.elapsed().as_micros() as f64);
    MergeOutput::Merged(out.freeze())
}
