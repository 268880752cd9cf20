//! End-to-end dispatches through a CpuDevice.

use std::sync::Arc;

use clcpu_device::{Event, MemoryObject};
use clcpu_ndrange::DimensionIndex;
use parking_lot::Mutex;

use crate::test::helpers::{device, kernel, kernel_with_local, read_u32s};
use crate::{BarrierFlags, Command, KernelArg, STATUS_ABNORMAL, STATUS_INVALID_VALUE, ServiceCommand, Step};

fn mapped_buffer(device: &crate::CpuDevice, bytes: usize) -> MemoryObject {
    let buffer = MemoryObject::buffer(bytes);
    device.memory().map(&buffer).unwrap();
    buffer
}

#[test]
fn test_barrier_counter() {
    let device = device(2);
    let out = mapped_buffer(&device, 8 * 4);

    let count = kernel_with_local("count", 4, |item, frame| {
        let counter = item.local_memory().as_ptr().cast::<u32>();
        match frame.resume {
            0 => {
                unsafe {
                    if item.local_id(0) == 0 {
                        counter.write(0);
                    }
                    counter.write(counter.read() + 1);
                }
                item.barrier(BarrierFlags::LOCAL_MEM_FENCE, 1)
            }
            _ => {
                let out = item.global_arg(0).unwrap().as_ptr().cast::<u32>();
                unsafe { out.add(item.global_id(0)).write(counter.read()) };
                Step::Done
            }
        }
    });

    let index = DimensionIndex::linear(8, 4).unwrap();
    let event = device.enqueue(Command::ndrange(index, count, vec![KernelArg::Global(out.id())])).unwrap();
    device.wait(event);

    assert_eq!(read_u32s(&device, out.id(), 8), vec![4; 8]);
    assert!(device.events().is_empty());
}

#[test]
fn test_builtins_two_dims() {
    let device = device(1);
    let out = mapped_buffer(&device, 4 * 6 * 4);

    let record = kernel("record", |item, _| {
        let out = item.global_arg(0).unwrap().as_ptr().cast::<u32>();
        let x = item.global_id(0) - item.global_offset(0);
        let y = item.global_id(1) - item.global_offset(1);
        let slot = y * item.global_size(0) + x;
        let packed = (item.group_id(0) << 12) | (item.group_id(1) << 8) | (item.local_id(0) << 4) | item.local_id(1);
        assert_eq!(item.work_dim(), 2);
        assert_eq!(item.num_groups(2), 0);
        unsafe { out.add(slot).write(packed as u32) };
        Step::Done
    });

    let index = DimensionIndex::new(&[4, 6], &[2, 3], &[10, 20]).unwrap();
    let event = device.enqueue(Command::ndrange(index, record, vec![KernelArg::Global(out.id())])).unwrap();
    device.wait(event);

    let values = read_u32s(&device, out.id(), 24);
    // x = 3, y = 4 → group (1, 1), local (1, 1)
    assert_eq!(values[4 * 4 + 3], 0x1111);
    // x = 0, y = 5 → group (0, 1), local (0, 2)
    assert_eq!(values[5 * 4], 0x0102);
}

#[test]
fn test_local_and_value_args() {
    let device = device(1);
    let out = mapped_buffer(&device, 8 * 4);

    let scale = kernel("scale", |item, frame| {
        let scratch = item.local_arg(1).unwrap().as_ptr().cast::<u32>();
        let factor: u32 = item.value_arg(2).unwrap();
        let lid = item.local_id(0);
        match frame.resume {
            0 => {
                unsafe { scratch.add(lid).write(item.global_id(0) as u32 * factor) };
                item.barrier(BarrierFlags::LOCAL_MEM_FENCE, 1)
            }
            _ => {
                // Read the neighbour's value written before the barrier.
                let neighbour = (lid + 1) % item.local_size(0);
                let out = item.global_arg(0).unwrap().as_ptr().cast::<u32>();
                unsafe { out.add(item.global_id(0)).write(scratch.add(neighbour).read()) };
                Step::Done
            }
        }
    });

    let args = vec![KernelArg::Global(out.id()), KernelArg::Local(4 * 4), KernelArg::value(3u32)];
    let event = device.enqueue(Command::ndrange(DimensionIndex::linear(8, 4).unwrap(), scale, args)).unwrap();
    device.wait(event);

    assert_eq!(read_u32s(&device, out.id(), 8), vec![3, 6, 9, 0, 15, 18, 21, 12]);
}

#[test]
fn test_async_copy_into_local() {
    let device = device(1);
    let src = MemoryObject::buffer(8 * 4).with_host_data(bytemuck::cast_slice(&[1u32, 2, 3, 4, 5, 6, 7, 8]).to_vec());
    device.memory().map(&src).unwrap();
    let out = mapped_buffer(&device, 8 * 4);

    let double = kernel("double", |item, frame| {
        let local = item.local_arg(1).unwrap();
        match frame.resume {
            0 => {
                let group_src = unsafe { item.global_arg(0).unwrap().add(item.group_id(0) * 4 * 4) };
                let event = unsafe { item.async_work_group_copy(local, group_src, 4, 4, None) };
                if item.local_id(0) == 0 {
                    assert!(event.is_some());
                } else {
                    assert!(event.is_none());
                }
                item.wait_group_events(&[event]);
                item.barrier(BarrierFlags::LOCAL_MEM_FENCE, 1)
            }
            _ => {
                let value = unsafe { local.as_ptr().cast::<u32>().add(item.local_id(0)).read() };
                let out = item.global_arg(2).unwrap().as_ptr().cast::<u32>();
                unsafe { out.add(item.global_id(0)).write(value * 2) };
                Step::Done
            }
        }
    });

    let args = vec![KernelArg::Global(src.id()), KernelArg::Local(16), KernelArg::Global(out.id())];
    let event = device.enqueue(Command::ndrange(DimensionIndex::linear(8, 4).unwrap(), double, args)).unwrap();
    device.wait(event);

    assert_eq!(read_u32s(&device, out.id(), 8), vec![2, 4, 6, 8, 10, 12, 14, 16]);
    assert!(device.events().is_empty());
}

#[test]
fn test_chained_and_strided_copies_share_event() {
    let device = device(1);
    let values: Vec<u32> = (0..16).collect();
    let src = MemoryObject::buffer(16 * 4).with_host_data(bytemuck::cast_slice(&values).to_vec());
    device.memory().map(&src).unwrap();
    let out = mapped_buffer(&device, 8 * 4);

    let gather = kernel("gather", |item, frame| {
        let [front, back, column] = [1, 2, 3].map(|n| item.local_arg(n).unwrap());
        match frame.resume {
            0 => {
                let base = item.global_arg(0).unwrap();
                let group = item.group_id(0);
                let event = unsafe {
                    let event = item.async_work_group_copy(front, base.add(group * 4 * 4), 4, 4, None);
                    let event = item.async_work_group_copy(back, base.add((8 + group * 4) * 4), 4, 4, event);
                    item.async_work_group_strided_copy(column, base.add(group * 4), 4, 4, 4, true, event)
                };
                if let Some(event) = event {
                    frame.set(0, 1);
                    frame.set(1, event.to_bits());
                }
                item.barrier(BarrierFlags::LOCAL_MEM_FENCE, 1)
            }
            1 => {
                // The handle survived the barrier in the frame.
                let event = (frame.get(0) == 1).then(|| Event::from_bits(frame.get(1)));
                assert_eq!(event.is_some(), item.local_id(0) == 0);
                item.wait_group_events(&[event]);
                item.barrier(BarrierFlags::LOCAL_MEM_FENCE, 2)
            }
            _ => {
                let lid = item.local_id(0);
                let read = |ptr: clcpu_device::DevicePtr| unsafe { ptr.as_ptr().cast::<u32>().add(lid).read() };
                let value = read(front) + 100 * read(back) + 10_000 * read(column);
                let out = item.global_arg(4).unwrap().as_ptr().cast::<u32>();
                unsafe { out.add(item.global_id(0)).write(value) };
                Step::Done
            }
        }
    });

    let args = vec![
        KernelArg::Global(src.id()),
        KernelArg::Local(16),
        KernelArg::Local(16),
        KernelArg::Local(16),
        KernelArg::Global(out.id()),
    ];
    let event = device.enqueue(Command::ndrange(DimensionIndex::linear(8, 4).unwrap(), gather, args)).unwrap();
    device.wait(event);

    let expected: Vec<u32> = (0..8u32)
        .map(|gid| {
            let (group, lid) = (gid / 4, gid % 4);
            (group * 4 + lid) + 100 * (8 + group * 4 + lid) + 10_000 * (group + 4 * lid)
        })
        .collect();
    assert_eq!(read_u32s(&device, out.id(), 8), expected);
    assert!(device.events().is_empty());
}

#[test]
fn test_global_lock_serializes_commands() {
    let device = device(2);
    let counter = mapped_buffer(&device, 4);

    let bump = kernel("bump", |item, _| {
        let counter = item.global_arg(0).unwrap().as_ptr().cast::<u32>();
        item.acquire_global_lock();
        unsafe { counter.write(counter.read() + 1) };
        item.release_global_lock();
        Step::Done
    });

    let events: Vec<_> = (0..4)
        .map(|_| {
            let command = Command::ndrange(DimensionIndex::linear(16, 4).unwrap(), Arc::clone(&bump), vec![
                KernelArg::Global(counter.id()),
            ]);
            device.enqueue(command).unwrap()
        })
        .collect();
    for event in events {
        device.wait(event);
    }

    assert_eq!(read_u32s(&device, counter.id(), 1), vec![64]);
}

#[test]
fn test_task_runs_once() {
    let device = device(1);
    let out = mapped_buffer(&device, 4);

    let task = kernel("task", |item, _| {
        let out = item.global_arg(0).unwrap().as_ptr().cast::<u32>();
        unsafe { out.write(out.read() + 1 + item.global_size(0) as u32) };
        Step::Done
    });
    let event = device.enqueue(Command::task(task, vec![KernelArg::Global(out.id())])).unwrap();
    device.wait(event);

    assert_eq!(read_u32s(&device, out.id(), 1), vec![2]);
}

#[test]
fn test_trap_fails_dispatch() {
    let device = device(1);
    let out = mapped_buffer(&device, 8 * 4);

    let trap = kernel("trap", |item, _| {
        if item.global_id(0) == 5 {
            return Step::Trap { status: -5 };
        }
        let out = item.global_arg(0).unwrap().as_ptr().cast::<u32>();
        unsafe { out.add(item.global_id(0)).write(1) };
        Step::Done
    });

    let command = Command::ndrange(DimensionIndex::linear(8, 4).unwrap(), trap, vec![KernelArg::Global(out.id())]);
    let id = command.id();
    let event = device.enqueue(command).unwrap();
    device.wait(event);

    assert_eq!(device.exit_status(id), Some(-5));
    // Items after the trap never ran.
    assert_eq!(read_u32s(&device, out.id(), 8), vec![1, 1, 1, 1, 1, 0, 0, 0]);
}

#[test]
fn test_kernel_panic_is_contained() {
    let device = device(1);
    let boom = kernel("boom", |_, _| panic!("kernel fault"));

    let command = Command::task(boom, Vec::new());
    let id = command.id();
    let event = device.enqueue(command).unwrap();
    device.wait(event);
    assert_eq!(device.exit_status(id), Some(STATUS_ABNORMAL));

    let exec = Command::exec(|| 0);
    let exec_id = exec.id();
    let event = device.enqueue(exec).unwrap();
    device.wait(event);
    assert_eq!(device.exit_status(exec_id), Some(0));
}

#[test]
fn test_unmapped_global_argument() {
    let device = device(1);
    let unmapped = MemoryObject::buffer(16);

    let command = Command::task(kernel("noop", |_, _| Step::Done), vec![KernelArg::Global(unmapped.id())]);
    let id = command.id();
    let event = device.enqueue(command).unwrap();
    device.wait(event);
    assert_eq!(device.exit_status(id), Some(STATUS_INVALID_VALUE));
}

#[test]
fn test_service_commands() {
    let device = device(2);
    let a = mapped_buffer(&device, 8);
    let b = mapped_buffer(&device, 8);
    let dst = Arc::new(Mutex::new(Vec::new()));

    let commands = vec![
        Command::service(ServiceCommand::WriteBuffer { buffer: a.id(), offset: 0, data: vec![1, 2, 3, 4, 5, 6, 7, 8] }),
        Command::service(ServiceCommand::FillBuffer { buffer: b.id(), offset: 0, pattern: vec![9], len: 8 }),
        Command::service(ServiceCommand::CopyBuffer { src: a.id(), src_offset: 2, dst: b.id(), dst_offset: 4, len: 4 }),
        Command::service(ServiceCommand::Marker),
        Command::service(ServiceCommand::ReadBuffer { buffer: b.id(), offset: 0, len: 8, dst: Arc::clone(&dst) }),
    ];
    for command in commands {
        let event = device.enqueue(command).unwrap();
        device.wait(event);
    }

    assert_eq!(*dst.lock(), vec![9, 9, 9, 9, 3, 4, 5, 6]);
}

#[test]
fn test_failed_service_reports_status() {
    let device = device(1);
    let a = mapped_buffer(&device, 4);

    let command = Command::service(ServiceCommand::WriteBuffer { buffer: a.id(), offset: 2, data: vec![0; 4] });
    let id = command.id();
    let event = device.enqueue(command).unwrap();
    device.wait(event);
    assert_eq!(device.exit_status(id), Some(STATUS_ABNORMAL));
    assert_eq!(device.exit_status(id), None, "statuses are taken once");
    assert_eq!(device.pending_statuses(), 0);
}

#[test]
fn test_shutdown_rejects_enqueue() {
    let device = device(1);
    device.shutdown();
    assert!(device.enqueue(Command::exec(|| 0)).is_none());
    assert!(device.events().is_empty());
}
