//! Multiprocessors: fixed pools of pinned workers.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use snafu::ensure;

use crate::command::Command;
use crate::context::RuntimeContext;
use crate::device::CompletionSink;
use crate::error::{InvalidConfigSnafu, Result};
use crate::thread::Thread;

/// Upward completion path shared by a multiprocessor and its workers.
pub(crate) struct Notifier {
    multiprocessor: usize,
    sink: Weak<dyn CompletionSink>,
}

impl Notifier {
    pub(crate) fn notify_done(&self, command: &Command) {
        match self.sink.upgrade() {
            Some(sink) => sink.command_done(command),
            None => tracing::warn!(
                command.id = %command.id(),
                multiprocessor = self.multiprocessor,
                "device gone, completion dropped"
            ),
        }
    }

    pub(crate) fn notify_exec_done(&self, command: &Command, exit_status: i32) {
        match self.sink.upgrade() {
            Some(sink) => sink.exec_done(command, exit_status),
            None => tracing::warn!(
                command.id = %command.id(),
                multiprocessor = self.multiprocessor,
                exit_status,
                "device gone, exec completion dropped"
            ),
        }
    }
}

/// Owns a set of worker [`Thread`]s and routes commands onto them.
///
/// NDRange commands go to the least loaded worker; everything else goes to
/// the first one.
pub struct Multiprocessor {
    id: usize,
    threads: Vec<Thread>,
    notifier: Arc<Notifier>,
}

impl std::fmt::Debug for Multiprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiprocessor").field("id", &self.id).field("threads", &self.threads).finish()
    }
}

impl Multiprocessor {
    /// Spawn one worker per entry of `cpus`, assigned to that core.
    ///
    /// Workers are pinned only when `pin` is set.
    pub fn new(
        id: usize,
        cpus: &[usize],
        pin: bool,
        context: Arc<RuntimeContext>,
        sink: Weak<dyn CompletionSink>,
    ) -> Result<Self> {
        ensure!(!cpus.is_empty(), InvalidConfigSnafu { reason: format!("multiprocessor {id} has no workers") });

        let notifier = Arc::new(Notifier { multiprocessor: id, sink });
        let threads = cpus
            .iter()
            .enumerate()
            .map(|(worker, &cpu)| {
                Thread::spawn(
                    format!("clcpu-mp{id}-worker{worker}"),
                    worker,
                    cpu,
                    pin,
                    Arc::clone(&context),
                    Arc::clone(&notifier),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(multiprocessor = id, workers = threads.len(), pin, "multiprocessor started");
        Ok(Self { id, threads, notifier })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    /// Route `command` to a worker. False if that worker rejects it.
    pub fn submit(&self, command: Command) -> bool {
        let thread = if command.is_ndrange() { self.least_loaded_thread() } else { self.first_thread() };
        tracing::debug!(
            command.id = %command.id(),
            command.kind = command.name(),
            multiprocessor = self.id,
            worker = thread.id(),
            "command submitted"
        );
        thread.submit(command)
    }

    pub fn notify_done(&self, command: &Command) {
        self.notifier.notify_done(command);
    }

    pub fn notify_exec_done(&self, command: &Command, exit_status: i32) {
        self.notifier.notify_exec_done(command, exit_status);
    }

    /// Cores the workers are assigned to.
    pub fn pinned_cpus(&self) -> BTreeSet<usize> {
        self.threads.iter().map(Thread::cpu).collect()
    }

    /// Worker with the lowest load; the first one wins ties.
    ///
    /// # Panics
    ///
    /// If the pool is empty.
    pub fn least_loaded_thread(&self) -> &Thread {
        match self.threads.iter().min_by_key(|thread| thread.load()) {
            Some(thread) => thread,
            None => Self::empty_pool(self.id),
        }
    }

    fn first_thread(&self) -> &Thread {
        match self.threads.first() {
            Some(thread) => thread,
            None => Self::empty_pool(self.id),
        }
    }

    fn empty_pool(id: usize) -> ! {
        tracing::error!(multiprocessor = id, "multiprocessor has no workers");
        panic!("multiprocessor {id} has no workers");
    }

    /// Load indicators in pool order.
    pub fn thread_loads(&self) -> Vec<usize> {
        self.threads.iter().map(Thread::load).collect()
    }

    /// Stop accepting commands. Queued commands still run; dropping the
    /// multiprocessor waits for them.
    pub fn shutdown(&self) {
        for thread in &self.threads {
            thread.close();
        }
        tracing::debug!(multiprocessor = self.id, "multiprocessor shut down");
    }
}
