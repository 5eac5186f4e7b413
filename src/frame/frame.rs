use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Frame data with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Immutable pixel data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp, used for staleness checks
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub profile: StreamProfile,
    pub extension: Extension,
    pub sensor: Option<SensorHandle>,
    pub values: BTreeMap<MetadataKind, i64>,
}

/// Per-frame metadata attributes reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataKind {
    FrameCounter,
    SubpresetSequenceId,
    SubpresetSequenceSize,
    FrameTimestamp,
}

/// Which stream a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    Depth,
    Infrared,
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 16-bit little-endian depth, 0 = no return
    Z16,
    /// 8-bit intensity
    Y8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Z16 => 2,
            PixelFormat::Y8 => 1,
        }
    }
}

/// Capability tag attached to a frame at allocation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    VideoFrame,
    DepthFrame,
}

/// Opaque handle to the sensor that produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorHandle(pub u32);

/// Spatial profile of a video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProfile {
    pub stream: StreamKind,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub stride_bytes: u32,
}

impl StreamProfile {
    /// Tightly packed profile (stride == width * bpp)
    pub fn packed(stream: StreamKind, format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            stream,
            format,
            width,
            height,
            stride_bytes: width * format.bytes_per_pixel() as u32,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn same_resolution(&self, other: &StreamProfile) -> bool {
        self.width == other.width && self.height == other.height
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("expected {expected:?} frame, got {actual:?}")]
    WrongFormat {
        expected: PixelFormat,
        actual: PixelFormat,
    },
    #[error("frame is not tagged as a depth frame")]
    NotDepth,
    #[error("buffer holds {len} bytes, profile needs {needed}")]
    ShortBuffer { len: usize, needed: usize },
}

impl FrameMetadata {
    pub fn new(profile: StreamProfile, extension: Extension) -> Self {
        Self {
            profile,
            extension,
            sensor: None,
            values: BTreeMap::new(),
        }
    }

    pub fn supports(&self, kind: MetadataKind) -> bool {
        self.values.contains_key(&kind)
    }

    pub fn get(&self, kind: MetadataKind) -> Option<i64> {
        self.values.get(&kind).copied()
    }
}

impl Frame {
    pub fn new(data: Bytes, meta: FrameMetadata) -> Self {
        Self {
            data,
            meta: Arc::new(meta),
            timestamp: Instant::now(),
        }
    }

    pub fn profile(&self) -> &StreamProfile {
        &self.meta.profile
    }

    pub fn width(&self) -> u32 {
        self.meta.profile.width
    }

    pub fn height(&self) -> u32 {
        self.meta.profile.height
    }

    pub fn sensor(&self) -> Option<SensorHandle> {
        self.meta.sensor
    }

    pub fn supports_metadata(&self, kind: MetadataKind) -> bool {
        self.meta.supports(kind)
    }

    pub fn metadata(&self, kind: MetadataKind) -> Option<i64> {
        self.meta.get(kind)
    }

    pub fn frame_counter(&self) -> Option<i64> {
        self.metadata(MetadataKind::FrameCounter)
    }

    pub fn sequence_id(&self) -> Option<i64> {
        self.metadata(MetadataKind::SubpresetSequenceId)
    }

    pub fn sequence_size(&self) -> Option<i64> {
        self.metadata(MetadataKind::SubpresetSequenceSize)
    }

    /// Typed depth view; fails unless the frame is a Z16 depth frame with a full buffer
    pub fn as_depth(&self) -> Result<DepthView<'_>, FrameError> {
        if self.meta.extension != Extension::DepthFrame {
            return Err(FrameError::NotDepth);
        }
        self.check_layout(PixelFormat::Z16)?;
        Ok(DepthView { frame: self })
    }

    /// Typed 8-bit infrared view
    pub fn as_infrared(&self) -> Result<InfraredView<'_>, FrameError> {
        self.check_layout(PixelFormat::Y8)?;
        Ok(InfraredView { frame: self })
    }

    fn check_layout(&self, expected: PixelFormat) -> Result<(), FrameError> {
        let profile = &self.meta.profile;
        if profile.format != expected {
            return Err(FrameError::WrongFormat {
                expected,
                actual: profile.format,
            });
        }
        let needed = profile.pixel_count() * expected.bytes_per_pixel();
        if self.data.len() < needed {
            return Err(FrameError::ShortBuffer {
                len: self.data.len(),
                needed,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("profile", &self.meta.profile)
            .field("counter", &self.frame_counter())
            .field("sequence_id", &self.sequence_id())
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Read-only view over Z16 samples
#[derive(Debug, Clone, Copy)]
pub struct DepthView<'a> {
    frame: &'a Frame,
}

impl<'a> DepthView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    #[inline]
    pub fn sample(&self, i: usize) -> u16 {
        let b = &self.frame.data[i * 2..i * 2 + 2];
        u16::from_le_bytes([b[0], b[1]])
    }

    pub fn samples(&self) -> impl Iterator<Item = u16> + 'a {
        let frame: &'a Frame = self.frame;
        let count = frame.meta.profile.pixel_count();
        frame.data[..count * 2]
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
    }
}

/// Read-only view over Y8 samples
#[derive(Debug, Clone, Copy)]
pub struct InfraredView<'a> {
    frame: &'a Frame,
}

impl<'a> InfraredView<'a> {
    pub fn samples(&self) -> &'a [u8] {
        let frame: &'a Frame = self.frame;
        &frame.data[..frame.meta.profile.pixel_count()]
    }
}

/// Builds a depth frame from samples, mostly for sources and tests
pub fn depth_frame(width: u32, height: u32, samples: &[u16], meta: &[(MetadataKind, i64)]) -> Frame {
    let profile = StreamProfile::packed(StreamKind::Depth, PixelFormat::Z16, width, height);
    let mut data = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        data.extend_from_slice(&s.to_le_bytes());
    }
    let mut m = FrameMetadata::new(profile, Extension::DepthFrame);
    for (kind, value) in meta {
        m.values.insert(*kind, *value);
    }
    Frame::new(Bytes::from(data), m)
}

/// Builds an 8-bit infrared frame from samples
pub fn infrared_frame(width: u32, height: u32, samples: &[u8], meta: &[(MetadataKind, i64)]) -> Frame {
    let profile = StreamProfile::packed(StreamKind::Infrared, PixelFormat::Y8, width, height);
    let mut m = FrameMetadata::new(profile, Extension::VideoFrame);
    for (kind, value) in meta {
        m.values.insert(*kind, *value);
    }
    Frame::new(Bytes::copy_from_slice(samples), m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_view_reads_little_endian() {
        let f = depth_frame(2, 1, &[0x0102, 700], &[]);
        let view = f.as_depth().unwrap();
        assert_eq!(view.sample(0), 0x0102);
        assert_eq!(view.samples().collect::<Vec<_>>(), vec![0x0102, 700]);
    }

    #[test]
    fn typed_views_reject_wrong_format() {
        let ir = infrared_frame(2, 2, &[1, 2, 3, 4], &[]);
        assert_eq!(ir.as_depth().unwrap_err(), FrameError::NotDepth);

        let d = depth_frame(2, 2, &[1, 2, 3, 4], &[]);
        assert_eq!(
            d.as_infrared().unwrap_err(),
            FrameError::WrongFormat {
                expected: PixelFormat::Y8,
                actual: PixelFormat::Z16
            }
        );
    }

    #[test]
    fn short_buffer_is_rejected() {
        let d = depth_frame(3, 3, &[1, 2], &[]);
        assert!(matches!(
            d.as_depth(),
            Err(FrameError::ShortBuffer { len: 4, needed: 18 })
        ));
    }

    #[test]
    fn metadata_support_is_per_kind() {
        let f = depth_frame(1, 1, &[5], &[(MetadataKind::FrameCounter, 42)]);
        assert!(f.supports_metadata(MetadataKind::FrameCounter));
        assert!(!f.supports_metadata(MetadataKind::SubpresetSequenceId));
        assert_eq!(f.frame_counter(), Some(42));
        assert_eq!(f.sequence_id(), None);
    }
}
