use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide spin lock behind the `acquire_global_lock` builtins.
///
/// Busy-waits; only meant for short critical sections inside kernels.
#[derive(Debug, Default)]
pub struct GlobalLock {
    locked: AtomicBool,
}

impl GlobalLock {
    pub const fn new() -> Self {
        Self { locked: AtomicBool::new(false) }
    }

    pub fn acquire(&self) {
        while self.locked.compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
            // Spin on a plain load to keep the cache line shared.
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.locked.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed).is_ok()
    }

    pub fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Acquire and release on drop.
    pub fn lock(&self) -> GlobalLockGuard<'_> {
        self.acquire();
        GlobalLockGuard { lock: self }
    }
}

#[derive(Debug)]
pub struct GlobalLockGuard<'a> {
    lock: &'a GlobalLock,
}

impl Drop for GlobalLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
