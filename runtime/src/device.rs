//! CPU device: owner of the shared runtime state and its multiprocessors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use clcpu_device::{Event, GlobalMemory, WaitList};
use parking_lot::Mutex;
use snafu::ensure;

use crate::command::{Command, CommandId};
use crate::config::RuntimeConfig;
use crate::context::RuntimeContext;
use crate::error::{InvalidConfigSnafu, Result};
use crate::multiprocessor::Multiprocessor;

/// Receiver of command completions.
pub trait CompletionSink: Send + Sync {
    /// `command` finished normally.
    fn command_done(&self, command: &Command);

    /// `command` finished with `exit_status` (native kernels, failed dispatches).
    fn exec_done(&self, command: &Command, exit_status: i32);
}

/// Completes events and records exit statuses.
#[derive(Debug)]
struct DeviceCompletion {
    events: Arc<WaitList>,
    statuses: Mutex<HashMap<CommandId, i32>>,
}

impl CompletionSink for DeviceCompletion {
    fn command_done(&self, command: &Command) {
        tracing::debug!(command.id = %command.id(), command.kind = command.name(), "command done");
        if let Some(event) = command.event() {
            self.events.set_completed(event, true);
        }
    }

    fn exec_done(&self, command: &Command, exit_status: i32) {
        if exit_status == 0 {
            tracing::debug!(command.id = %command.id(), "exec command done");
        } else {
            tracing::warn!(command.id = %command.id(), command.kind = command.name(), exit_status, "exec command failed");
        }
        self.statuses.lock().insert(command.id(), exit_status);
        if let Some(event) = command.event() {
            self.events.set_completed(event, true);
        }
    }
}

/// A CPU compute device.
///
/// Kernel commands are spread over multiprocessors round-robin; all other
/// commands go to the first multiprocessor.
pub struct CpuDevice {
    multiprocessors: Vec<Multiprocessor>,
    completion: Arc<DeviceCompletion>,
    context: Arc<RuntimeContext>,
    next: AtomicUsize,
}

impl std::fmt::Debug for CpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuDevice").field("multiprocessors", &self.multiprocessors).finish()
    }
}

impl CpuDevice {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        ensure!(config.workers > 0, InvalidConfigSnafu { reason: "at least one worker is required" });

        let context = Arc::new(RuntimeContext::new(config.global_memory, config.local_memory));
        let completion =
            Arc::new(DeviceCompletion { events: Arc::clone(context.events()), statuses: Mutex::new(HashMap::new()) });
        let weak = Arc::downgrade(&completion);
        let sink: Weak<dyn CompletionSink> = weak;

        let multiprocessors = config
            .partition()
            .into_iter()
            .filter(|cpus| !cpus.is_empty())
            .enumerate()
            .map(|(id, cpus)| Multiprocessor::new(id, &cpus, config.pin_threads, Arc::clone(&context), sink.clone()))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            multiprocessors = multiprocessors.len(),
            workers = config.workers,
            global_memory = config.global_memory,
            local_memory = config.local_memory,
            "cpu device created"
        );
        Ok(Self { multiprocessors, completion, context, next: AtomicUsize::new(0) })
    }

    /// Device configured from `CLCPU_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(&RuntimeConfig::from_env())
    }

    pub fn multiprocessors(&self) -> &[Multiprocessor] {
        &self.multiprocessors
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }

    pub fn memory(&self) -> &GlobalMemory {
        self.context.memory()
    }

    pub fn events(&self) -> &Arc<WaitList> {
        self.context.events()
    }

    /// Route `command` to a multiprocessor. False if it was rejected.
    pub fn submit(&self, command: Command) -> bool {
        let target = if command.is_ndrange() {
            self.next.fetch_add(1, Ordering::Relaxed) % self.multiprocessors.len()
        } else {
            0
        };
        match self.multiprocessors.get(target) {
            Some(multiprocessor) => multiprocessor.submit(command),
            None => false,
        }
    }

    /// Attach a fresh completion event to `command` and submit it.
    ///
    /// Returns `None` (and drops the event) if the command was rejected.
    pub fn enqueue(&self, command: Command) -> Option<Event> {
        let event = self.events().new_event();
        if self.submit(command.with_event(event)) {
            Some(event)
        } else {
            self.events().remove(event);
            None
        }
    }

    /// Block until `event` and its linked events completed.
    pub fn wait(&self, event: Event) {
        self.events().wait(event);
    }

    /// Take the exit status recorded for `command`, if it finished through the
    /// exec path. The record is removed, so a second call returns `None`.
    pub fn exit_status(&self, command: CommandId) -> Option<i32> {
        self.completion.statuses.lock().remove(&command)
    }

    /// Exit statuses recorded and not yet taken.
    pub fn pending_statuses(&self) -> usize {
        self.completion.statuses.lock().len()
    }

    /// Stop every multiprocessor from accepting commands.
    pub fn shutdown(&self) {
        for multiprocessor in &self.multiprocessors {
            multiprocessor.shutdown();
        }
    }
}
