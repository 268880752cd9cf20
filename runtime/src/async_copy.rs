//! Asynchronous local ↔ global copies.
//!
//! Each copy runs on its own short-lived OS thread and marks its event complete
//! when done. Work-items observe completion through `wait_group_events`.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use clcpu_device::{DevicePtr, Event, WaitList};

/// One possibly strided element copy.
///
/// At most one of the strides is non-zero. A non-zero `src_stride` gathers
/// elements `stride` apart into contiguous `dst`; a non-zero `dst_stride`
/// scatters contiguous `src` out with that spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyJob {
    pub dst: DevicePtr,
    pub src: DevicePtr,
    pub count: usize,
    pub elem_size: usize,
    pub dst_stride: usize,
    pub src_stride: usize,
}

impl CopyJob {
    pub fn contiguous(dst: DevicePtr, src: DevicePtr, count: usize, elem_size: usize) -> Self {
        Self { dst, src, count, elem_size, dst_stride: 0, src_stride: 0 }
    }

    pub fn strided(
        dst: DevicePtr,
        src: DevicePtr,
        count: usize,
        elem_size: usize,
        stride: usize,
        is_src_strided: bool,
    ) -> Self {
        let (src_stride, dst_stride) = if is_src_strided { (stride, 0) } else { (0, stride) };
        Self { dst, src, count, elem_size, dst_stride, src_stride }
    }

    /// Perform the copy on the calling thread.
    ///
    /// # Safety
    ///
    /// Both sides must be valid for the element ranges the strides describe and
    /// must not overlap.
    pub unsafe fn run(&self) {
        let mut src = self.src.as_ptr();
        let mut dst = self.dst.as_ptr();

        // SAFETY (all branches): forwarded to the caller.
        unsafe {
            if self.src_stride != 0 {
                for i in 0..self.count {
                    std::ptr::copy_nonoverlapping(src, dst, self.elem_size);
                    dst = dst.add(self.elem_size);
                    if i + 1 < self.count {
                        src = src.add(self.src_stride * self.elem_size);
                    }
                }
            } else if self.dst_stride != 0 {
                for i in 0..self.count {
                    std::ptr::copy_nonoverlapping(src, dst, self.elem_size);
                    src = src.add(self.elem_size);
                    if i + 1 < self.count {
                        dst = dst.add(self.dst_stride * self.elem_size);
                    }
                }
            } else {
                std::ptr::copy_nonoverlapping(src, dst, self.count * self.elem_size);
            }
        }
    }
}

/// Run `job` on a fresh thread and complete `event` afterwards.
///
/// If no thread can be spawned the copy runs inline before returning.
///
/// # Safety
///
/// Same contract as [`CopyJob::run`], for as long as the copy is in flight.
pub unsafe fn spawn(job: CopyJob, events: Arc<WaitList>, event: Event) -> Option<JoinHandle<()>> {
    let worker_events = Arc::clone(&events);
    let spawned = thread::Builder::new().name("clcpu-async-copy".into()).spawn(move || {
        // SAFETY: forwarded from `spawn`'s caller.
        unsafe { job.run() };
        worker_events.set_completed(event, true);
    });

    match spawned {
        Ok(handle) => Some(handle),
        Err(error) => {
            tracing::warn!(%error, ?event, "async copy thread unavailable, copying inline");
            // SAFETY: forwarded from `spawn`'s caller.
            unsafe { job.run() };
            events.set_completed(event, true);
            None
        }
    }
}
