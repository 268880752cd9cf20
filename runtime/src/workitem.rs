//! The view a running work-item has of the runtime.

use std::sync::atomic::{Ordering, fence};

use bytemuck::Pod;
use clcpu_device::{DevicePtr, Event};
use clcpu_ndrange::IndexIter;
use smallvec::SmallVec;

use crate::async_copy::{self, CopyJob};
use crate::context::RuntimeContext;
use crate::kernel::{BarrierFlags, Step};

/// Kernel argument after dispatch-time resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedArg {
    Global(DevicePtr),
    Local(DevicePtr),
    Value(SmallVec<[u8; 16]>),
    /// `__local` argument before its work-group has been set up.
    Unbound,
}

/// Builtins and arguments available to one work-item invocation.
pub struct WorkItem<'a> {
    index: &'a IndexIter,
    args: &'a [ResolvedArg],
    local_base: DevicePtr,
    context: &'a RuntimeContext,
}

impl std::fmt::Debug for WorkItem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("local_id", &self.index.local_ids())
            .field("group_id", &self.index.group_ids())
            .finish()
    }
}

impl<'a> WorkItem<'a> {
    pub(crate) fn new(
        index: &'a IndexIter,
        args: &'a [ResolvedArg],
        local_base: DevicePtr,
        context: &'a RuntimeContext,
    ) -> Self {
        Self { index, args, local_base, context }
    }

    /// Position of this work-item in the running dispatch.
    pub fn current_index(&self) -> &IndexIter {
        self.index
    }

    /// Start of this group's local memory, where static `__local` variables live.
    pub fn local_memory(&self) -> DevicePtr {
        self.local_base
    }

    pub fn work_dim(&self) -> u32 {
        self.index.dims() as u32
    }

    pub fn global_size(&self, dim: usize) -> usize {
        self.index.index().global_size(dim)
    }

    pub fn global_id(&self, dim: usize) -> usize {
        self.index.global_id(dim)
    }

    pub fn local_size(&self, dim: usize) -> usize {
        self.index.index().local_size(dim)
    }

    pub fn local_id(&self, dim: usize) -> usize {
        self.index.local_id(dim)
    }

    pub fn num_groups(&self, dim: usize) -> usize {
        self.index.index().num_groups(dim)
    }

    pub fn group_id(&self, dim: usize) -> usize {
        self.index.group_id(dim)
    }

    pub fn global_offset(&self, dim: usize) -> usize {
        self.index.index().global_offset(dim)
    }

    /// Fence as requested and yield to the other work-items of the group.
    ///
    /// The kernel returns the result from `invoke`; it is resumed at `resume_at`
    /// once every work-item of the group reached the barrier.
    pub fn barrier(&self, flags: BarrierFlags, resume_at: u32) -> Step {
        if flags.fences() {
            fence(Ordering::SeqCst);
        }
        Step::Barrier { resume_at }
    }

    /// Only the first work-item of a group issues group-wide copies.
    fn is_copy_issuer(&self) -> bool {
        self.index.is_group_start()
    }

    /// # Safety
    ///
    /// `job` must describe valid ranges until its event is waited on.
    unsafe fn issue_copy(&self, job: CopyJob, event: Option<Event>) -> Option<Event> {
        if !self.is_copy_issuer() {
            return event;
        }

        let events = self.context.events();
        let signal = match event {
            Some(parent) => events.new_child_event(parent),
            None => events.new_event(),
        };
        tracing::trace!(?signal, count = job.count, elem_size = job.elem_size, "async copy issued");
        // SAFETY: forwarded to the caller.
        unsafe { async_copy::spawn(job, std::sync::Arc::clone(events), signal) };
        Some(event.unwrap_or(signal))
    }

    /// Group-wide contiguous copy of `count` elements.
    ///
    /// Returns `event` if given, otherwise a fresh event for the copy (or `None`
    /// on work-items that do not issue it).
    ///
    /// # Safety
    ///
    /// `src` and `dst` must be valid, non-overlapping ranges of
    /// `count * elem_size` bytes until the returned event is waited on.
    pub unsafe fn async_work_group_copy(
        &self,
        dst: DevicePtr,
        src: DevicePtr,
        count: usize,
        elem_size: usize,
        event: Option<Event>,
    ) -> Option<Event> {
        // SAFETY: forwarded to the caller.
        unsafe { self.issue_copy(CopyJob::contiguous(dst, src, count, elem_size), event) }
    }

    /// Group-wide strided copy; `is_src_strided` selects gather or scatter.
    ///
    /// # Safety
    ///
    /// As [`async_work_group_copy`](Self::async_work_group_copy), with the strided
    /// side covering `((count - 1) * stride + 1) * elem_size` bytes.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn async_work_group_strided_copy(
        &self,
        dst: DevicePtr,
        src: DevicePtr,
        count: usize,
        elem_size: usize,
        stride: usize,
        is_src_strided: bool,
        event: Option<Event>,
    ) -> Option<Event> {
        // SAFETY: forwarded to the caller.
        unsafe { self.issue_copy(CopyJob::strided(dst, src, count, elem_size, stride, is_src_strided), event) }
    }

    /// Wait for every non-null event.
    pub fn wait_group_events(&self, events: &[Option<Event>]) {
        for event in events.iter().flatten() {
            self.context.events().wait(*event);
        }
    }

    pub fn acquire_global_lock(&self) {
        self.context.global_lock().acquire();
    }

    pub fn release_global_lock(&self) {
        self.context.global_lock().release();
    }

    /// Address of global argument `n`.
    pub fn global_arg(&self, n: usize) -> Option<DevicePtr> {
        match self.args.get(n)? {
            ResolvedArg::Global(ptr) => Some(*ptr),
            _ => None,
        }
    }

    /// Address of `__local` argument `n` in this group's local memory.
    pub fn local_arg(&self, n: usize) -> Option<DevicePtr> {
        match self.args.get(n)? {
            ResolvedArg::Local(ptr) => Some(*ptr),
            _ => None,
        }
    }

    /// By-value argument `n` read as `T`.
    pub fn value_arg<T: Pod>(&self, n: usize) -> Option<T> {
        match self.args.get(n)? {
            ResolvedArg::Value(bytes) => bytemuck::try_pod_read_unaligned(bytes.as_slice()).ok(),
            _ => None,
        }
    }
}
