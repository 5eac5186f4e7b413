//! Frame allocation for processing blocks that produce new frames

use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tracing::debug;

use super::frame::{Extension, Frame, FrameMetadata, SensorHandle, StreamProfile};

/// Source of new video frames
pub trait FrameAllocator {
    /// Allocate a writable frame shaped like `template`. `None` means the
    /// allocator could not provide a buffer.
    #[allow(clippy::too_many_arguments)]
    fn allocate_video_frame(
        &self,
        profile: StreamProfile,
        template: &Frame,
        bytes_per_pixel: usize,
        width: u32,
        height: u32,
        stride: u32,
        extension: Extension,
    ) -> Option<VideoFrameMut>;
}

/// Writable frame; becomes an immutable [`Frame`] on [`freeze`](Self::freeze)
pub struct VideoFrameMut {
    data: BytesMut,
    meta: FrameMetadata,
    timestamp: Instant,
}

impl VideoFrameMut {
    pub fn set_sensor(&mut self, sensor: Option<SensorHandle>) {
        self.meta.sensor = sensor;
    }

    /// Writes a 16-bit sample at pixel index `i`
    #[inline]
    pub fn put_u16(&mut self, i: usize, value: u16) {
        self.data[i * 2..i * 2 + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn freeze(self) -> Frame {
        Frame {
            data: self.data.freeze(),
            meta: Arc::new(self.meta),
            timestamp: self.timestamp,
        }
    }
}

/// Heap-backed allocator with an optional per-frame size ceiling
#[derive(Debug, Clone, Default)]
pub struct HeapAllocator {
    max_frame_bytes: Option<usize>,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes: Some(max_frame_bytes),
        }
    }
}

impl FrameAllocator for HeapAllocator {
    #[allow(clippy::too_many_arguments)]
    fn allocate_video_frame(
        &self,
        profile: StreamProfile,
        template: &Frame,
        bytes_per_pixel: usize,
        width: u32,
        height: u32,
        stride: u32,
        extension: Extension,
    ) -> Option<VideoFrameMut> {
        let row = (stride as usize).max(width as usize * bytes_per_pixel);
        let size = row * height as usize;
        if let Some(limit) = self.max_frame_bytes {
            if size > limit {
                debug!("Refusing {} byte allocation (limit {})", size, limit);
                return None;
            }
        }

        let mut meta = FrameMetadata::new(
            StreamProfile {
                width,
                height,
                stride_bytes: row as u32,
                ..profile
            },
            extension,
        );
        // Counters and sequence tags carry over from the template
        meta.values = template.meta.values.clone();

        Some(VideoFrameMut {
            data: BytesMut::zeroed(size),
            meta,
            timestamp: template.timestamp,
        })
    }
}
