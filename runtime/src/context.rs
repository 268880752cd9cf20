use std::sync::Arc;

use clcpu_device::{GlobalLock, GlobalMemory, WaitList};

/// State shared by every worker of one device.
#[derive(Debug)]
pub struct RuntimeContext {
    memory: GlobalMemory,
    events: Arc<WaitList>,
    global_lock: GlobalLock,
    local_memory_size: usize,
}

impl RuntimeContext {
    pub fn new(global_memory: usize, local_memory_size: usize) -> Self {
        Self {
            memory: GlobalMemory::new(global_memory),
            events: Arc::new(WaitList::new()),
            global_lock: GlobalLock::new(),
            local_memory_size,
        }
    }

    pub fn memory(&self) -> &GlobalMemory {
        &self.memory
    }

    pub fn events(&self) -> &Arc<WaitList> {
        &self.events
    }

    pub fn global_lock(&self) -> &GlobalLock {
        &self.global_lock
    }

    pub fn local_memory_size(&self) -> usize {
        self.local_memory_size
    }
}
