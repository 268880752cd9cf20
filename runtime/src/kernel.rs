//! Compiled kernel entry points and their restartable execution state.
//!
//! The compiler hands the runtime an object implementing [`KernelEntry`]. Each
//! call to [`KernelEntry::invoke`] runs one work-item from the point recorded in
//! its [`WorkItemFrame`] until it finishes, reaches a barrier or traps. State that
//! must survive a barrier lives in the frame's slots; the scheduler keeps one
//! frame per work-item of the running group.

use std::fmt;
use std::ops::BitOr;

use bytemuck::Pod;
use clcpu_device::MemObjectId;
use smallvec::SmallVec;

use crate::workitem::WorkItem;

/// Fence request passed to `barrier`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BarrierFlags(u32);

impl BarrierFlags {
    pub const NONE: Self = Self(0);
    pub const LOCAL_MEM_FENCE: Self = Self(1);
    pub const GLOBAL_MEM_FENCE: Self = Self(2);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any memory fence is requested.
    pub const fn fences(self) -> bool {
        self.0 & (Self::LOCAL_MEM_FENCE.0 | Self::GLOBAL_MEM_FENCE.0) != 0
    }
}

impl BitOr for BarrierFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// How a single `invoke` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The work-item ran to completion.
    Done,
    /// The work-item reached a barrier; resume at `resume_at` on the next pass.
    Barrier { resume_at: u32 },
    /// Abnormal termination; aborts the whole dispatch with `status`.
    Trap { status: i32 },
}

/// Saved execution state of one work-item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkItemFrame {
    /// Resume point; zero on the first call.
    pub resume: u32,
    slots: SmallVec<[u64; 8]>,
}

impl WorkItemFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: usize) -> u64 {
        self.slots.get(slot).copied().unwrap_or(0)
    }

    pub fn set(&mut self, slot: usize, value: u64) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, 0);
        }
        self.slots[slot] = value;
    }

    pub(crate) fn reset(&mut self) {
        self.resume = 0;
        self.slots.clear();
    }
}

/// Native entry point of a compiled kernel.
pub trait KernelEntry: Send + Sync {
    fn name(&self) -> &str;

    /// Bytes of `__local` storage the kernel declares statically.
    fn static_local_size(&self) -> usize {
        0
    }

    fn invoke(&self, item: &mut WorkItem<'_>, frame: &mut WorkItemFrame) -> Step;
}

impl fmt::Debug for dyn KernelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelEntry").field("name", &self.name()).finish()
    }
}

/// Closure-backed [`KernelEntry`].
pub struct FnKernel<F> {
    name: String,
    static_local_size: usize,
    body: F,
}

impl<F> FnKernel<F>
where
    F: Fn(&mut WorkItem<'_>, &mut WorkItemFrame) -> Step + Send + Sync,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self { name: name.into(), static_local_size: 0, body }
    }

    pub fn with_static_local_size(mut self, size: usize) -> Self {
        self.static_local_size = size;
        self
    }
}

impl<F> KernelEntry for FnKernel<F>
where
    F: Fn(&mut WorkItem<'_>, &mut WorkItemFrame) -> Step + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn static_local_size(&self) -> usize {
        self.static_local_size
    }

    fn invoke(&self, item: &mut WorkItem<'_>, frame: &mut WorkItemFrame) -> Step {
        (self.body)(item, frame)
    }
}

/// Kernel argument as set by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelArg {
    /// Global buffer or image, resolved through global memory at dispatch.
    Global(MemObjectId),
    /// `__local` buffer of the given size, carved per work-group.
    Local(usize),
    /// By-value argument bytes.
    Value(SmallVec<[u8; 16]>),
}

impl KernelArg {
    pub fn value<T: Pod>(value: T) -> Self {
        Self::Value(SmallVec::from_slice(bytemuck::bytes_of(&value)))
    }
}
