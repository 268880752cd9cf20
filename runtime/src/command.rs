//! Commands routed through multiprocessors to workers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use clcpu_device::{Event, MemObjectId};
use clcpu_ndrange::DimensionIndex;
use parking_lot::Mutex;
use strum::IntoStaticStr;

use crate::kernel::{KernelArg, KernelEntry};

/// Process-unique command identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(u64);

impl CommandId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// Exit status of a command that terminated abnormally.
pub const STATUS_ABNORMAL: i32 = -1;
/// Exit status of a dispatch whose global argument was not mapped.
pub const STATUS_INVALID_VALUE: i32 = -30;

/// Host closure run as a native kernel; returns its exit status.
pub type NativeFn = Box<dyn FnOnce() -> i32 + Send>;

/// Host-side destination of a buffer read.
pub type HostBuffer = Arc<Mutex<Vec<u8>>>;

/// Buffer and synchronization work executed directly against global memory.
#[derive(Debug, Clone, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ServiceCommand {
    Marker,
    Barrier,
    ReadBuffer { buffer: MemObjectId, offset: usize, len: usize, dst: HostBuffer },
    WriteBuffer { buffer: MemObjectId, offset: usize, data: Vec<u8> },
    CopyBuffer { src: MemObjectId, src_offset: usize, dst: MemObjectId, dst_offset: usize, len: usize },
    FillBuffer { buffer: MemObjectId, offset: usize, pattern: Vec<u8>, len: usize },
}

pub struct ExecCommand {
    func: Option<NativeFn>,
}

impl ExecCommand {
    pub(crate) fn take(&mut self) -> Option<NativeFn> {
        self.func.take()
    }
}

impl fmt::Debug for ExecCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecCommand").field("pending", &self.func.is_some()).finish()
    }
}

#[derive(Debug)]
pub struct NdRangeCommand {
    pub index: DimensionIndex,
    pub entry: Arc<dyn KernelEntry>,
    pub args: Vec<KernelArg>,
}

#[derive(Debug, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CommandKind {
    Service(ServiceCommand),
    Exec(ExecCommand),
    NdRange(NdRangeCommand),
}

/// A validated command ready for execution.
#[derive(Debug)]
pub struct Command {
    id: CommandId,
    event: Option<Event>,
    kind: CommandKind,
}

impl Command {
    fn new(kind: CommandKind) -> Self {
        Self { id: CommandId::next(), event: None, kind }
    }

    pub fn service(service: ServiceCommand) -> Self {
        Self::new(CommandKind::Service(service))
    }

    pub fn exec(func: impl FnOnce() -> i32 + Send + 'static) -> Self {
        Self::new(CommandKind::Exec(ExecCommand { func: Some(Box::new(func)) }))
    }

    pub fn ndrange(index: DimensionIndex, entry: Arc<dyn KernelEntry>, args: Vec<KernelArg>) -> Self {
        Self::new(CommandKind::NdRange(NdRangeCommand { index, entry, args }))
    }

    /// Single work-item dispatch.
    pub fn task(entry: Arc<dyn KernelEntry>, args: Vec<KernelArg>) -> Self {
        Self::ndrange(DimensionIndex::single(), entry, args)
    }

    /// Completion event marked complete once the command is done.
    pub fn with_event(mut self, event: Event) -> Self {
        self.event = Some(event);
        self
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn event(&self) -> Option<Event> {
        self.event
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut CommandKind {
        &mut self.kind
    }

    pub fn is_ndrange(&self) -> bool {
        matches!(self.kind, CommandKind::NdRange(_))
    }

    pub fn name(&self) -> &'static str {
        (&self.kind).into()
    }
}
