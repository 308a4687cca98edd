// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end scenarios exercised against the `Kernel` API directly. The
//! host `arch::fake` backend never actually
//! dispatches a saved context, so these drive scheduling decisions one
//! primitive call at a time, the same sequence `syscalls::dispatch_syscall`
//! would: deposit the syscall args a thread would have written before
//! trapping, remove it from its ready queue, run the primitive, then read
//! the return value back out of the same slot.

use std::boxed::Box;
use std::cell::RefCell;
use std::sync::Mutex as StdMutex;
use std::vec;
use std::vec::Vec;

use abi::{BoxId, Priority, SyscallArgs, ThreadId};
use kern::config::{HEAP_ARENA_SIZE, USER_STACK_ARENA_SIZE};
use kern::console::Console;
use kern::kernel::Kernel;
use kern::task::NextTask;

extern "C" fn dummy_entry(_argc: usize, _argv: *const usize) {}

fn fresh_kernel() -> Kernel {
    let stack: &'static mut [u8] =
        Box::leak(vec![0u8; USER_STACK_ARENA_SIZE].into_boxed_slice());
    let heap: &'static mut [u8] = Box::leak(vec![0u8; HEAP_ARENA_SIZE].into_boxed_slice());
    unsafe { Kernel::new(stack, heap) }
}

/// Stands in for a thread depositing its request and trapping: selects
/// `index` as `current`, removes it from its ready queue (the syscall
/// dispatcher's "I am servicing you" contract), and records `args` so
/// the primitive's `write_ret` has somewhere to land.
fn enter_syscall(k: &mut Kernel, index: usize, args: SyscallArgs) {
    k.set_current(Some(index));
    k.remove_current_from_ready();
    k.deposit_syscall(args);
}

#[test]
fn run_enqueues_both_creator_and_new_thread() {
    let mut k = fresh_kernel();
    // Boot-time seeding: no caller yet, so only the new thread is reported.
    let r = k
        .run(dummy_entry, "first", Priority(3), 256, 0, core::ptr::null())
        .unwrap();
    assert_eq!(r, NextTask::Specific(0));

    enter_syscall(&mut k, 0, SyscallArgs::Run(make_run_args("second")));
    let outcome = k
        .run(dummy_entry, "second", Priority(3), 256, 0, core::ptr::null())
        .unwrap();
    assert_eq!(outcome, NextTask::Specific(1));
    // The creator (thread 0) is requeued as a side effect of `run`.
    assert_eq!(k.take_syscall_ret(), ThreadId::for_index_and_gen(1, 0).0 as isize);
}

fn make_run_args(name: &str) -> abi::RunArgs {
    let mut buf = [0u8; abi::NAME_MAX + 1];
    let bytes = name.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    abi::RunArgs {
        entry: dummy_entry,
        name: buf,
        priority: Priority(3),
        stack_size: 256,
        argc: 0,
        argv: core::ptr::null(),
    }
}

#[test]
fn run_with_no_free_slot_reports_minus_one() {
    let mut k = fresh_kernel();
    let mut created = 0;
    loop {
        match k.run(dummy_entry, "t", Priority(5), 64, 0, core::ptr::null()) {
            Ok(_) => created += 1,
            Err(_) => break,
        }
        if created > 1024 {
            panic!("THREAD_NUM should be a small fixed pool, never this many slots");
        }
    }
    assert!(created >= 6, "THREAD_NUM should be configured to at least 6");
}

struct RecordingConsole {
    lines: StdMutex<RefCell<Vec<String>>>,
}

impl RecordingConsole {
    fn new() -> Self {
        RecordingConsole {
            lines: StdMutex::new(RefCell::new(Vec::new())),
        }
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().borrow().clone()
    }
}

impl Console for RecordingConsole {
    fn puts(&self, s: &str) {
        self.lines.lock().unwrap().borrow_mut().push(s.to_string());
    }
}

#[test]
fn exit_logs_the_exact_banner_and_frees_the_slot() {
    let console = Box::leak(Box::new(RecordingConsole::new()));
    kern::console::set_console(console);

    let mut k = fresh_kernel();
    k.run(dummy_entry, "command", Priority(4), 256, 0, core::ptr::null())
        .unwrap();
    enter_syscall(&mut k, 0, SyscallArgs::Exit);
    k.exit().unwrap();

    assert_eq!(console.lines(), vec!["command EXIT.\n".to_string()]);
}

#[test]
fn priority_preemption_wakeup_makes_the_higher_priority_thread_selectable() {
    let mut k = fresh_kernel();
    k.run(dummy_entry, "a", Priority(8), 256, 0, core::ptr::null())
        .unwrap();
    k.run(dummy_entry, "b", Priority(1), 256, 0, core::ptr::null())
        .unwrap();
    let a = 0usize;
    let b = 1usize;

    // B sleeps: not requeued, so A is the only ready thread left.
    enter_syscall(&mut k, b, SyscallArgs::Sleep);
    k.sleep().unwrap();
    assert_eq!(k.select_next(), a);

    // A runs, wakes B.
    enter_syscall(&mut k, a, SyscallArgs::Wakeup { target: ThreadId::for_index_and_gen(b, 0) });
    k.wakeup(ThreadId::for_index_and_gen(b, 0)).unwrap();

    // B (priority 1) now outranks A (priority 8, requeued by `wakeup`).
    assert_eq!(k.select_next(), b);
}

#[test]
fn message_rendezvous_receiver_first() {
    let mut k = fresh_kernel();
    k.run(dummy_entry, "r", Priority(5), 256, 0, core::ptr::null())
        .unwrap();
    k.run(dummy_entry, "s", Priority(5), 256, 0, core::ptr::null())
        .unwrap();
    let r = 0usize;
    let s = 1usize;

    enter_syscall(
        &mut k,
        r,
        SyscallArgs::Recv { box_id: BoxId::Box1, sender: ThreadId(0), size: 0, ptr: core::ptr::null_mut() },
    );
    let outcome = k.recv(BoxId::Box1).unwrap();
    assert_eq!(outcome, NextTask::Resched);
    assert_eq!(k.take_syscall_ret(), abi::RECV_WOULD_BLOCK);

    let payload = b"static memory\n";
    enter_syscall(
        &mut k,
        s,
        SyscallArgs::Send { box_id: BoxId::Box1, size: payload.len(), ptr: payload.as_ptr() as *mut u8 },
    );
    let outcome = k
        .send(BoxId::Box1, payload.len(), payload.as_ptr() as *mut u8)
        .unwrap();
    assert!(matches!(outcome, NextTask::Specific(idx) if idx == r));
    assert_eq!(k.take_syscall_ret(), payload.len() as isize);

    // R's own return value (sender handle) and out-params were filled in
    // directly by `send`; `current` is still S here, so switch back to R
    // before reading them.
    k.set_current(Some(r));
    assert_eq!(k.take_syscall_ret(), ThreadId::for_index_and_gen(s, 0).0 as isize);
    let (sender, size, ptr) = k.take_recv_result().unwrap();
    assert_eq!(sender, ThreadId::for_index_and_gen(s, 0));
    assert_eq!(size, payload.len());
    assert_eq!(ptr, payload.as_ptr() as *mut u8);
}

#[test]
fn message_rendezvous_sender_first_fifo_and_heap_round_trips() {
    let mut k = fresh_kernel();
    k.run(dummy_entry, "s", Priority(5), 256, 0, core::ptr::null())
        .unwrap();
    k.run(dummy_entry, "r", Priority(5), 256, 0, core::ptr::null())
        .unwrap();
    let s = 0usize;
    let r = 1usize;

    enter_syscall(&mut k, s, SyscallArgs::KmAlloc { size: 18 });
    k.kmalloc(18).unwrap();
    let ptr1 = k.take_syscall_ret() as *mut u8;
    assert!(!ptr1.is_null());

    enter_syscall(&mut k, s, SyscallArgs::Send { box_id: BoxId::Box2, size: 18, ptr: ptr1 });
    k.send(BoxId::Box2, 18, ptr1).unwrap();

    enter_syscall(&mut k, s, SyscallArgs::KmAlloc { size: 18 });
    k.kmalloc(18).unwrap();
    let ptr2 = k.take_syscall_ret() as *mut u8;
    assert_ne!(ptr1, ptr2);

    enter_syscall(&mut k, s, SyscallArgs::Send { box_id: BoxId::Box2, size: 18, ptr: ptr2 });
    k.send(BoxId::Box2, 18, ptr2).unwrap();

    enter_syscall(
        &mut k,
        r,
        SyscallArgs::Recv { box_id: BoxId::Box2, sender: ThreadId(0), size: 0, ptr: core::ptr::null_mut() },
    );
    k.recv(BoxId::Box2).unwrap();
    let (_, _, first_ptr) = k.take_recv_result().unwrap();
    assert_eq!(first_ptr, ptr1, "FIFO order: first send delivered first");

    enter_syscall(
        &mut k,
        r,
        SyscallArgs::Recv { box_id: BoxId::Box2, sender: ThreadId(0), size: 0, ptr: core::ptr::null_mut() },
    );
    k.recv(BoxId::Box2).unwrap();
    let (_, _, second_ptr) = k.take_recv_result().unwrap();
    assert_eq!(second_ptr, ptr2);

    enter_syscall(&mut k, r, SyscallArgs::KmFree { ptr: first_ptr });
    unsafe { k.kmfree(first_ptr).unwrap() };
    enter_syscall(&mut k, r, SyscallArgs::KmFree { ptr: second_ptr });
    unsafe { k.kmfree(second_ptr).unwrap() };

    // Free-list state returns to where a fresh allocation of the same size
    // lands on the same address `ptr1` started at.
    enter_syscall(&mut k, r, SyscallArgs::KmAlloc { size: 18 });
    k.kmalloc(18).unwrap();
    let ptr3 = k.take_syscall_ret() as *mut u8;
    assert_eq!(ptr3, second_ptr, "most recently freed block reused first");
}

#[test]
fn double_recv_on_an_already_parked_box_is_fatal() {
    let mut k = fresh_kernel();
    k.run(dummy_entry, "r1", Priority(5), 256, 0, core::ptr::null())
        .unwrap();
    k.run(dummy_entry, "r2", Priority(5), 256, 0, core::ptr::null())
        .unwrap();

    enter_syscall(
        &mut k,
        0,
        SyscallArgs::Recv { box_id: BoxId::Box3, sender: ThreadId(0), size: 0, ptr: core::ptr::null_mut() },
    );
    k.recv(BoxId::Box3).unwrap();

    enter_syscall(
        &mut k,
        1,
        SyscallArgs::Recv { box_id: BoxId::Box3, sender: ThreadId(0), size: 0, ptr: core::ptr::null_mut() },
    );
    let err = k.recv(BoxId::Box3).unwrap_err();
    assert!(matches!(err, kern::err::InternalError::Fatal(_)));
}

#[test]
fn chpri_round_trip_restores_priority_and_moves_to_tail() {
    let mut k = fresh_kernel();
    k.run(dummy_entry, "t", Priority(5), 256, 0, core::ptr::null())
        .unwrap();

    enter_syscall(&mut k, 0, SyscallArgs::ChPri { priority: 2 });
    k.chpri(2).unwrap();
    let old = k.take_syscall_ret();
    assert_eq!(old, 5);

    enter_syscall(&mut k, 0, SyscallArgs::ChPri { priority: old as i32 });
    k.chpri(old as i32).unwrap();
    assert_eq!(k.take_syscall_ret(), 2);
}

#[test]
fn service_call_send_delivers_with_the_reserved_sender_handle() {
    // A handler invoking `send` synchronously via a service call, rather
    // than a trapping thread: `current` reads as "no caller" for the
    // primitive's duration (`syscalls::service_call`'s contract), but
    // delivery to an already-parked receiver still happens in full.
    let mut k = fresh_kernel();
    k.run(dummy_entry, "r", Priority(5), 256, 0, core::ptr::null())
        .unwrap();
    let r = 0usize;

    enter_syscall(
        &mut k,
        r,
        SyscallArgs::Recv { box_id: BoxId::Box0, sender: ThreadId(0), size: 0, ptr: core::ptr::null_mut() },
    );
    k.recv(BoxId::Box0).unwrap();

    let payload = b"from an interrupt\n";
    k.set_current(None);
    let next = k
        .send(BoxId::Box0, payload.len(), payload.as_ptr() as *mut u8)
        .unwrap();
    assert_eq!(next, NextTask::Specific(r));

    k.set_current(Some(r));
    assert_eq!(k.take_syscall_ret(), ThreadId::SERVICE_CALL.0 as isize);
    let (sender, size, ptr) = k.take_recv_result().unwrap();
    assert_eq!(sender, ThreadId::SERVICE_CALL);
    assert_eq!(size, payload.len());
    assert_eq!(ptr, payload.as_ptr() as *mut u8);
}

#[test]
fn service_call_primitives_are_harmless_no_ops_with_no_caller() {
    // Every primitive a handler might reach for via a service call other
    // than `send`/`setintr`/`kmfree` depends on having a real caller to act
    // on; none of them should panic or corrupt state when `current` is
    // `None`, they should just decline the caller-only half of their work.
    let mut k = fresh_kernel();
    k.run(dummy_entry, "t", Priority(5), 256, 0, core::ptr::null())
        .unwrap();

    k.set_current(None);
    assert_eq!(k.exit().unwrap(), NextTask::Resched);
    assert_eq!(k.wait().unwrap(), NextTask::Resched);
    assert_eq!(k.sleep().unwrap(), NextTask::Resched);
    assert_eq!(k.getid().unwrap(), NextTask::Resched);
    assert_eq!(k.chpri(3).unwrap(), NextTask::Resched);
    assert_eq!(k.kmalloc(8).unwrap(), NextTask::Resched);

    // The thread created above is still alive and still schedulable: none
    // of the no-caller calls above touched it.
    assert_eq!(k.select_next(), 0);
}

#[test]
fn service_call_kmfree_still_frees_with_no_caller_to_answer_back() {
    let mut k = fresh_kernel();
    k.run(dummy_entry, "t", Priority(5), 256, 0, core::ptr::null())
        .unwrap();

    enter_syscall(&mut k, 0, SyscallArgs::KmAlloc { size: 18 });
    k.kmalloc(18).unwrap();
    let ptr = k.take_syscall_ret() as *mut u8;
    assert!(!ptr.is_null());

    k.set_current(None);
    unsafe { k.kmfree(ptr).unwrap() };

    // Freed block is reusable: a same-size allocation lands on it again.
    enter_syscall(&mut k, 0, SyscallArgs::KmAlloc { size: 18 });
    k.kmalloc(18).unwrap();
    assert_eq!(k.take_syscall_ret() as *mut u8, ptr);
}

#[test]
fn setintr_records_the_handler_and_requeues_caller() {
    extern "C" fn handler() {}

    let mut k = fresh_kernel();
    k.run(dummy_entry, "t", Priority(5), 256, 0, core::ptr::null())
        .unwrap();

    enter_syscall(&mut k, 0, SyscallArgs::SetIntr { vector: abi::VectorType::Vector2, handler });
    let next = k.setintr(abi::VectorType::Vector2, handler).unwrap();
    assert_eq!(next, NextTask::Resched);
    assert_eq!(k.take_syscall_ret(), 0);
    assert!(k.handler_for(abi::VectorType::Vector2).is_some());
}
