use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::command::Command;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Command>,
    closed: bool,
}

/// FIFO feeding one worker thread.
///
/// Closing rejects further pushes; commands already queued are still handed
/// out before `pop` reports exhaustion.
#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueue `command`, handing it back if the queue is closed.
    pub(crate) fn push(&self, command: Command) -> Result<(), Command> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(command);
        }
        state.pending.push_back(command);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until a command is available; `None` once closed and drained.
    pub(crate) fn pop(&self) -> Option<Command> {
        let mut state = self.state.lock();
        loop {
            if let Some(command) = state.pending.pop_front() {
                return Some(command);
            }
            if state.closed {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().pending.len()
    }
}
