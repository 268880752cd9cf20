use std::sync::Arc;
use std::thread;

use crate::GlobalLock;

#[test]
fn test_acquire_release() {
    let lock = GlobalLock::new();
    lock.acquire();
    assert!(lock.is_locked());
    assert!(!lock.try_acquire());
    lock.release();
    assert!(lock.try_acquire());
    lock.release();
}

#[test]
fn test_guard_releases() {
    let lock = GlobalLock::new();
    {
        let _guard = lock.lock();
        assert!(lock.is_locked());
    }
    assert!(!lock.is_locked());
}

#[test]
fn test_serializes_increments() {
    let lock = Arc::new(GlobalLock::new());
    let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let _guard = lock.lock();
                    // Non-atomic read-modify-write, only correct under the lock.
                    let value = counter.load(std::sync::atomic::Ordering::Relaxed);
                    counter.store(value + 1, std::sync::atomic::Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 4000);
}
