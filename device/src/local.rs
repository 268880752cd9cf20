use crate::allocator::{Block, DevicePtr};
use crate::error::Result;

/// Per-worker bump arena backing `__local` storage.
///
/// Reset before each work-group to the entry point's static prefix; every
/// `__local` argument is then carved off the top. Overflow means the dispatch
/// was sized wrong upstream and is fatal.
#[derive(Debug)]
pub struct LocalMemory {
    block: Block,
    capacity: usize,
    top: usize,
}

impl LocalMemory {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self { block: Block::zeroed(capacity)?, capacity, top: 0 })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out since the last reset, static prefix included.
    pub fn used(&self) -> usize {
        self.top
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.top
    }

    pub fn base(&self) -> DevicePtr {
        self.block.ptr()
    }

    /// Move the bump pointer to `base + static_size`.
    pub fn reset(&mut self, static_size: usize) {
        if static_size > self.capacity {
            tracing::error!(static_size, capacity = self.capacity, "static local size exceeds local memory");
            panic!("static local size {static_size} exceeds local memory capacity {}", self.capacity);
        }
        self.top = static_size;
    }

    /// Hand out `size` bytes at the current bump pointer.
    pub fn alloc(&mut self, size: usize) -> DevicePtr {
        if size > self.remaining() {
            tracing::error!(size, used = self.top, capacity = self.capacity, "local memory overflow");
            panic!("local allocation of {size} bytes overflows local memory ({} of {} used)", self.top, self.capacity);
        }
        // SAFETY: top + size <= capacity, within the block.
        let ptr = unsafe { self.block.ptr().add(self.top) };
        self.top += size;
        ptr
    }
}
