pub mod allocator;
#[allow(clippy::module_inception)]
pub mod frame;
pub mod frameset;

pub use allocator::{FrameAllocator, HeapAllocator, VideoFrameMut};
pub use frame::{
    depth_frame, infrared_frame, DepthView, Extension, Frame, FrameError, FrameMetadata,
    InfraredView, MetadataKind, PixelFormat, SensorHandle, StreamKind, StreamProfile,
};
pub use frameset::{FrameUnit, Frameset};
