//! Execution core of the clcpu CPU compute runtime.
//!
//! Commands enter through a [`CpuDevice`] (or directly through a
//! [`Multiprocessor`]), are routed onto pinned worker [`Thread`]s and executed
//! there. NDRange kernels run cooperatively: every work-item of a group is
//! multiplexed onto the worker that received the command, with barriers
//! expressed as restartable [`Step`]s.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use clcpu_ndrange::DimensionIndex;
//! use clcpu_runtime::{Command, CpuDevice, FnKernel, KernelArg, RuntimeConfig, Step, WorkItem, WorkItemFrame};
//!
//! let config = RuntimeConfig::builder().workers(2).pin_threads(false).global_memory(1 << 20).build();
//! let device = CpuDevice::new(&config).unwrap();
//!
//! let buffer = clcpu_device::MemoryObject::buffer(8 * 4);
//! device.memory().map(&buffer).unwrap();
//!
//! let kernel = Arc::new(FnKernel::new("iota", |item: &mut WorkItem<'_>, _frame: &mut WorkItemFrame| {
//!     let out = item.global_arg(0).unwrap().as_ptr().cast::<u32>();
//!     let id = item.global_id(0);
//!     unsafe { out.add(id).write(id as u32) };
//!     Step::Done
//! }));
//!
//! let index = DimensionIndex::linear(8, 4).unwrap();
//! let event = device.enqueue(Command::ndrange(index, kernel, vec![KernelArg::Global(buffer.id())])).unwrap();
//! device.wait(event);
//!
//! let mut out = [0u8; 32];
//! device.memory().read(buffer.id(), 0, &mut out).unwrap();
//! assert_eq!(out[4], 1);
//! ```

pub mod async_copy;
pub mod command;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod kernel;
pub mod module;
pub mod multiprocessor;
pub mod thread;
pub mod workitem;

mod affinity;
mod queue;
mod service;

#[cfg(test)]
pub mod test;

pub use async_copy::CopyJob;
pub use command::{
    Command, CommandId, CommandKind, HostBuffer, NdRangeCommand, STATUS_ABNORMAL, STATUS_INVALID_VALUE, ServiceCommand,
};
pub use config::RuntimeConfig;
pub use context::RuntimeContext;
pub use device::{CompletionSink, CpuDevice};
pub use error::*;
pub use kernel::{BarrierFlags, FnKernel, KernelArg, KernelEntry, Step, WorkItemFrame};
pub use module::{KernelModule, KernelRegistry};
pub use multiprocessor::Multiprocessor;
pub use thread::Thread;
pub use workitem::{ResolvedArg, WorkItem};
