//! Worker threads and cooperative work-item execution.
//!
//! A [`Thread`] owns one OS thread draining a FIFO of commands. NDRange
//! commands run group by group on the worker that received them. Inside a group
//! every work-item is invoked in local-linear order until it finishes or
//! reaches a barrier; passes repeat until the whole group is done, so a barrier
//! is crossed exactly when every work-item has reached it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use clcpu_device::LocalMemory;
use snafu::ResultExt;

use crate::affinity;
use crate::command::{Command, CommandId, CommandKind, ExecCommand, NdRangeCommand, STATUS_ABNORMAL, STATUS_INVALID_VALUE};
use crate::context::RuntimeContext;
use crate::error::{DeviceSnafu, Result, ThreadSpawnSnafu};
use crate::kernel::{KernelArg, Step, WorkItemFrame};
use crate::multiprocessor::Notifier;
use crate::queue::CommandQueue;
use crate::service;
use crate::workitem::{ResolvedArg, WorkItem};

/// Handle to one worker.
///
/// The load indicator counts commands submitted but not yet completed.
/// Dropping the handle closes the queue, lets the worker drain it and joins.
pub struct Thread {
    id: usize,
    cpu: usize,
    queue: Arc<CommandQueue>,
    load: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread").field("id", &self.id).field("cpu", &self.cpu).field("load", &self.load()).finish()
    }
}

impl Thread {
    pub(crate) fn spawn(
        name: String,
        id: usize,
        cpu: usize,
        pin: bool,
        context: Arc<RuntimeContext>,
        notifier: Arc<Notifier>,
    ) -> Result<Self> {
        let queue = Arc::new(CommandQueue::new());
        let load = Arc::new(AtomicUsize::new(0));
        let local = LocalMemory::new(context.local_memory_size()).context(DeviceSnafu)?;

        let worker = Worker {
            id,
            cpu,
            pin,
            queue: Arc::clone(&queue),
            load: Arc::clone(&load),
            context,
            notifier,
            local,
        };
        let handle =
            std::thread::Builder::new().name(name.clone()).spawn(move || worker.run()).context(ThreadSpawnSnafu { name })?;

        Ok(Self { id, cpu, queue, load, handle: Some(handle) })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Core this worker is assigned to.
    pub fn cpu(&self) -> usize {
        self.cpu
    }

    pub fn load(&self) -> usize {
        self.load.load(Ordering::Acquire)
    }

    /// Commands queued and not yet picked up.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Enqueue `command`; false if the worker is shutting down.
    pub fn submit(&self, command: Command) -> bool {
        self.load.fetch_add(1, Ordering::AcqRel);
        match self.queue.push(command) {
            Ok(()) => true,
            Err(command) => {
                self.load.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!(command.id = %command.id(), worker = self.id, "worker closed, command rejected");
                false
            }
        }
    }

    pub(crate) fn close(&self) {
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.queue.close();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!(worker = self.id, "worker thread panicked");
        }
    }
}

enum Outcome {
    Done,
    Exit(i32),
}

struct Worker {
    id: usize,
    cpu: usize,
    pin: bool,
    queue: Arc<CommandQueue>,
    load: Arc<AtomicUsize>,
    context: Arc<RuntimeContext>,
    notifier: Arc<Notifier>,
    local: LocalMemory,
}

impl Worker {
    fn run(mut self) {
        if self.pin && !affinity::pin_current_thread(self.cpu) {
            tracing::warn!(worker = self.id, cpu = self.cpu, "could not pin worker, running unpinned");
        }
        tracing::debug!(worker = self.id, cpu = self.cpu, "worker started");

        while let Some(command) = self.queue.pop() {
            if !self.execute(command) {
                self.fail_pending();
                break;
            }
        }

        tracing::debug!(worker = self.id, "worker stopped");
    }

    /// Run `command` and report it. False once the worker can no longer be trusted.
    ///
    /// A panic escaping the dispatch itself (local arena overflow, a broken
    /// scheduler invariant) closes the queue before the command is reported, so
    /// nothing else is routed here.
    fn execute(&mut self, mut command: Command) -> bool {
        let id = command.id();
        tracing::debug!(command.id = %id, command.kind = command.name(), worker = self.id, "command started");

        let (outcome, healthy) = match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(id, &mut command))) {
            Ok(outcome) => (outcome, true),
            Err(_) => {
                tracing::error!(command.id = %id, worker = self.id, "worker invariant violated, closing its queue");
                self.queue.close();
                (Outcome::Exit(STATUS_ABNORMAL), false)
            }
        };

        self.load.fetch_sub(1, Ordering::AcqRel);
        match outcome {
            Outcome::Done => self.notifier.notify_done(&command),
            Outcome::Exit(status) => self.notifier.notify_exec_done(&command, status),
        }
        healthy
    }

    /// Fail everything still queued on a closed worker.
    fn fail_pending(&mut self) {
        while let Some(command) = self.queue.pop() {
            tracing::warn!(command.id = %command.id(), worker = self.id, "command dropped by failed worker");
            self.load.fetch_sub(1, Ordering::AcqRel);
            self.notifier.notify_exec_done(&command, STATUS_ABNORMAL);
        }
    }

    fn dispatch(&mut self, id: CommandId, command: &mut Command) -> Outcome {
        match command.kind_mut() {
            CommandKind::Service(service) => match service::execute(service, self.context.memory()) {
                Ok(()) => Outcome::Done,
                Err(error) => {
                    tracing::warn!(command.id = %id, %error, "service command failed");
                    Outcome::Exit(STATUS_ABNORMAL)
                }
            },
            CommandKind::Exec(exec) => Outcome::Exit(Self::run_native(id, exec)),
            CommandKind::NdRange(ndrange) => match self.run_ndrange(id, ndrange) {
                Ok(()) => Outcome::Done,
                Err(status) => Outcome::Exit(status),
            },
        }
    }

    fn run_native(id: CommandId, exec: &mut ExecCommand) -> i32 {
        let Some(func) = exec.take() else {
            tracing::error!(command.id = %id, "native kernel already consumed");
            return STATUS_ABNORMAL;
        };

        let status = panic::catch_unwind(AssertUnwindSafe(func)).unwrap_or(STATUS_ABNORMAL);
        if status != 0 {
            tracing::warn!(command.id = %id, status, "native kernel failed");
        }
        status
    }

    #[tracing::instrument(skip_all, fields(command.id = %id, kernel = ndrange.entry.name(), worker = self.id))]
    fn run_ndrange(&mut self, id: CommandId, ndrange: &NdRangeCommand) -> Result<(), i32> {
        let context = Arc::clone(&self.context);
        let entry = &ndrange.entry;
        let index = ndrange.index;

        let mut args = Vec::with_capacity(ndrange.args.len());
        for (position, arg) in ndrange.args.iter().enumerate() {
            args.push(match arg {
                KernelArg::Global(object) => match context.memory().address_of(*object) {
                    Some(ptr) => ResolvedArg::Global(ptr),
                    None => {
                        tracing::warn!(argument = position, %object, "global argument is not mapped");
                        return Err(STATUS_INVALID_VALUE);
                    }
                },
                KernelArg::Local(_) => ResolvedArg::Unbound,
                KernelArg::Value(bytes) => ResolvedArg::Value(bytes.clone()),
            });
        }

        let per_group = index.work_items_per_group();
        let mut frames = vec![WorkItemFrame::default(); per_group];
        let mut finished = vec![false; per_group];

        for group in 0..index.total_groups() {
            let start = index.group_start(group);
            tracing::trace!(group, "work-group dispatched");

            self.local.reset(entry.static_local_size());
            for (slot, arg) in args.iter_mut().zip(&ndrange.args) {
                if let KernelArg::Local(size) = arg {
                    *slot = ResolvedArg::Local(self.local.alloc(*size));
                }
            }
            let local_base = self.local.base();
            frames.iter_mut().for_each(WorkItemFrame::reset);
            finished.fill(false);

            let mut remaining = per_group;
            while remaining > 0 {
                let mut cursor = start;
                for (frame, done) in frames.iter_mut().zip(finished.iter_mut()) {
                    if !*done {
                        let mut item = WorkItem::new(&cursor, &args, local_base, &context);
                        match panic::catch_unwind(AssertUnwindSafe(|| entry.invoke(&mut item, frame))) {
                            Ok(Step::Done) => {
                                *done = true;
                                remaining -= 1;
                            }
                            Ok(Step::Barrier { resume_at }) => frame.resume = resume_at,
                            Ok(Step::Trap { status }) => {
                                tracing::warn!(group, local = cursor.local_linear(), status, "kernel trapped");
                                return Err(status);
                            }
                            Err(_) => {
                                tracing::warn!(group, local = cursor.local_linear(), "kernel panicked");
                                return Err(STATUS_ABNORMAL);
                            }
                        }
                    }
                    cursor.advance(1);
                }
            }
        }

        Ok(())
    }
}
