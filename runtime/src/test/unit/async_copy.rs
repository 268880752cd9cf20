use std::sync::Arc;

use clcpu_device::{DevicePtr, WaitList};

use crate::async_copy::{self, CopyJob};

fn ptr<T>(values: &mut [T]) -> DevicePtr {
    DevicePtr::new(values.as_mut_ptr().cast()).unwrap()
}

#[test]
fn test_contiguous_copy() {
    let mut src: Vec<u32> = (0..16).collect();
    let mut dst = vec![0u32; 16];
    let job = CopyJob::contiguous(ptr(&mut dst), ptr(&mut src), 16, 4);
    unsafe { job.run() };
    assert_eq!(dst, src);
}

#[test]
fn test_gather_from_strided_source() {
    let mut src: Vec<u32> = (0..16).collect();
    let mut dst = vec![0u32; 5];
    let job = CopyJob::strided(ptr(&mut dst), ptr(&mut src), 5, 4, 3, true);
    assert_eq!((job.src_stride, job.dst_stride), (3, 0));
    unsafe { job.run() };
    assert_eq!(dst, vec![0, 3, 6, 9, 12]);
}

#[test]
fn test_scatter_to_strided_destination() {
    let mut src = vec![1u16, 2, 3];
    let mut dst = vec![0u16; 7];
    let job = CopyJob::strided(ptr(&mut dst), ptr(&mut src), 3, 2, 3, false);
    unsafe { job.run() };
    assert_eq!(dst, vec![1, 0, 0, 2, 0, 0, 3]);
}

#[test]
fn test_spawn_completes_event() {
    let events = Arc::new(WaitList::new());
    let event = events.new_event();

    let mut src: Vec<u8> = (0..64).collect();
    let mut dst = vec![0u8; 64];
    let job = CopyJob::contiguous(ptr(&mut dst), ptr(&mut src), 64, 1);

    let handle = unsafe { async_copy::spawn(job, Arc::clone(&events), event) };
    events.wait(event);
    if let Some(handle) = handle {
        handle.join().unwrap();
    }

    assert_eq!(dst, src);
    assert!(events.is_empty());
}
