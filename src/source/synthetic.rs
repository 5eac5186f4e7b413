//! Deterministic HDR sensor stand-in
//!
//! Emits alternating short (id 0) and long (id 1) exposures of a ramp
//! scene. The short exposure loses the far half of the scene, the long one
//! saturates the near half, so only a merge covers the whole frame.

use std::sync::Arc;

use crate::frame::{depth_frame, infrared_frame, Frame, Frameset, MetadataKind, SensorHandle};
use crate::SourceConfig;

const SENSOR: SensorHandle = SensorHandle(1);

// IR levels per region
const IR_GOOD: u8 = 120;
const IR_DARK: u8 = 2;
const IR_SATURATED: u8 = 255;

pub struct SyntheticHdrSource {
    config: SourceConfig,
    counter: i64,
}

impl SyntheticHdrSource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config, counter: 0 }
    }

    /// Ground-truth depth at (x, y)
    pub fn scene_depth(x: u32, y: u32) -> u16 {
        (500 + 10 * x + y) as u16
    }

    pub fn next_frameset(&mut self) -> Frameset {
        let counter = self.counter;
        self.counter += 1;
        let sequence_id = counter % 2;

        let (w, h) = (self.config.width, self.config.height);
        let mut depth = Vec::with_capacity((w * h) as usize);
        let mut ir = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let near = x < w / 2;
                let truth = Self::scene_depth(x, y);
                let (d, i) = match (sequence_id, near) {
                    (0, true) => (truth, IR_GOOD),
                    // Too dark to range; occasional speckle
                    (0, false) => (u16::from((x + y) % 3 == 0), IR_DARK),
                    // Saturated return, depth is garbage
                    (_, true) => (truth.wrapping_add(37), IR_SATURATED),
                    (_, false) => (truth, IR_GOOD),
                };
                depth.push(d);
                ir.push(i);
            }
        }

        let period_us = 1_000_000 / i64::from(self.config.fps.max(1));
        let meta = [
            (MetadataKind::FrameCounter, counter),
            (MetadataKind::SubpresetSequenceId, sequence_id),
            (MetadataKind::SubpresetSequenceSize, 2),
            (MetadataKind::FrameTimestamp, counter * period_us),
        ];

        let mut depth = depth_frame(w, h, &depth, &meta);
        with_sensor(&mut depth);
        let infrared = self.config.with_infrared.then(|| {
            let mut f = infrared_frame(w, h, &ir, &meta);
            with_sensor(&mut f);
            f
        });
        Frameset::new(depth, infrared)
    }
}

fn with_sensor(frame: &mut Frame) {
    Arc::make_mut(&mut frame.meta).sensor = Some(SENSOR);
}

impl Iterator for SyntheticHdrSource {
    type Item = Frameset;

    fn next(&mut self) -> Option<Frameset> {
        match self.config.frame_limit {
            Some(limit) if self.counter as u64 >= limit => None,
            _ => Some(self.next_frameset()),
        }
    }
}
