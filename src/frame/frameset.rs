use super::frame::Frame;

/// Depth and infrared frames captured at the same instant
#[derive(Debug, Clone, Default)]
pub struct Frameset {
    pub depth: Option<Frame>,
    pub infrared: Option<Frame>,
}

impl Frameset {
    pub fn new(depth: Frame, infrared: Option<Frame>) -> Self {
        Self {
            depth: Some(depth),
            infrared,
        }
    }

    pub fn depth_frame(&self) -> Option<&Frame> {
        self.depth.as_ref()
    }

    pub fn infrared_frame(&self) -> Option<&Frame> {
        self.infrared.as_ref()
    }
}

/// Unit of work flowing through a processing block
#[derive(Debug, Clone)]
pub enum FrameUnit {
    Single(Frame),
    Set(Frameset),
}

impl FrameUnit {
    pub fn is_frameset(&self) -> bool {
        matches!(self, FrameUnit::Set(_))
    }

    pub fn as_frameset(&self) -> Option<&Frameset> {
        match self {
            FrameUnit::Set(fs) => Some(fs),
            FrameUnit::Single(_) => None,
        }
    }

    /// The frame whose metadata represents this unit; a set's depth member
    pub fn primary(&self) -> Option<&Frame> {
        match self {
            FrameUnit::Single(f) => Some(f),
            FrameUnit::Set(fs) => fs.depth.as_ref(),
        }
    }

    pub fn frame_counter(&self) -> Option<i64> {
        self.primary().and_then(Frame::frame_counter)
    }
}

impl From<Frame> for FrameUnit {
    fn from(frame: Frame) -> Self {
        FrameUnit::Single(frame)
    }
}

impl From<Frameset> for FrameUnit {
    fn from(set: Frameset) -> Self {
        FrameUnit::Set(set)
    }
}
