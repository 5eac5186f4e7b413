//! Processing block interface used by the pipeline

use std::sync::{Arc, Mutex};

use crate::frame::{FrameAllocator, FrameUnit};

/// A pipeline stage: a filter deciding which units it handles, plus the
/// processing step for those units.
pub trait ProcessingBlock: Send {
    fn name(&self) -> &str;

    fn should_process(&self, unit: &FrameUnit) -> bool;

    /// Must always return a unit; failures degrade to a passthrough
    fn process(&mut self, allocator: &dyn FrameAllocator, unit: FrameUnit) -> FrameUnit;

    /// Drop any state held between calls, e.g. when the pipeline stops
    fn reset(&mut self) {}

    /// Filter then process; units the block does not handle pass through
    fn invoke(&mut self, allocator: &dyn FrameAllocator, unit: FrameUnit) -> FrameUnit {
        if self.should_process(&unit) {
            self.process(allocator, unit)
        } else {
            unit
        }
    }
}

/// Shares one block between threads. Each call holds the lock for the
/// whole filter + process step.
pub struct SharedBlock<B> {
    inner: Arc<Mutex<B>>,
}

impl<B> Clone for SharedBlock<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: ProcessingBlock> SharedBlock<B> {
    pub fn new(block: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(block)),
        }
    }

    pub fn invoke(&self, allocator: &dyn FrameAllocator, unit: FrameUnit) -> FrameUnit {
        // A panic elsewhere leaves the block state consistent between calls
        let mut block = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        block.invoke(allocator, unit)
    }

    pub fn reset(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).reset();
    }

    /// Run `f` with the block locked
    pub fn with<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        let block = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&block)
    }
}
