// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thin userspace wrappers over the kernel's raw trap ABI.
//!
//! A syscall stub per kernel primitive, re-exporting the shared ABI crate
//! so application code never imports `abi` directly. There is no
//! register-marshalling `asm!` stub here -- this kernel has no
//! user/kernel memory-protection separation, so a thread and the kernel
//! share one address space and one compiled image, and "depositing a
//! syscall" is just a normal call into `kern::kernel::with_global` followed
//! by `kern::arch::trap()`. See DESIGN.md for why that's an intentional
//! design choice rather than an oversight.

#![no_std]

pub use abi::*;

mod kbox;
pub mod panic;

pub use kbox::KBox;

/// Deposits `args` into the calling thread's own syscall slot and traps
/// into the kernel: a user thread writes `{type, param}` into its own
/// TCB's syscall slot and executes the trap instruction. Returns the
/// primitive's `ret` once the kernel has serviced the request and
/// dispatched back into this thread.
fn raw_syscall(args: SyscallArgs) -> isize {
    kern::kernel::with_global(|k| k.deposit_syscall(args));
    kern::arch::trap();
    kern::kernel::with_global(|k| k.take_syscall_ret())
}

/// Reads back the out-parameters a matching `send` or an already-queued
/// envelope wrote into this thread's `Recv` syscall slot. Only meaningful
/// immediately after `sys_recv` returns.
fn raw_recv_result() -> (ThreadId, usize, *mut u8) {
    kern::kernel::with_global(|k| k.take_recv_result())
        .unwrap_or((ThreadId(0), 0, core::ptr::null_mut()))
}

/// Creates a new thread. Returns `Err` if the kernel has no free TCB.
pub fn sys_run(
    entry: ThreadEntry,
    name: &str,
    priority: Priority,
    stack_size: usize,
    argc: usize,
    argv: *const usize,
) -> Result<ThreadId, KernelError> {
    let mut buf = [0u8; NAME_MAX + 1];
    let bytes = name.as_bytes();
    let n = bytes.len().min(NAME_MAX);
    buf[..n].copy_from_slice(&bytes[..n]);

    let ret = raw_syscall(SyscallArgs::Run(RunArgs {
        entry,
        name: buf,
        priority,
        stack_size,
        argc,
        argv,
    }));
    if ret < 0 {
        Err(decode_error(ret))
    } else {
        Ok(ThreadId(ret as u16))
    }
}

/// Terminates the calling thread. Never returns.
pub fn sys_exit() -> ! {
    raw_syscall(SyscallArgs::Exit);
    unreachable!("a thread that has called sys_exit is never dispatched again")
}

/// Yields the CPU, requeuing the caller at the tail of its own priority.
pub fn sys_wait() {
    raw_syscall(SyscallArgs::Wait);
}

/// Blocks the caller until another thread calls `sys_wakeup` on it.
pub fn sys_sleep() {
    raw_syscall(SyscallArgs::Sleep);
}

/// Makes `target` READY again. A no-op (from the kernel's point of view,
/// there's no special case) if `target` wasn't sleeping. Fails if `target`
/// names a slot that's since been reused by a different thread.
pub fn sys_wakeup(target: ThreadId) -> Result<(), KernelError> {
    let ret = raw_syscall(SyscallArgs::Wakeup { target });
    if ret < 0 {
        Err(decode_error(ret))
    } else {
        Ok(())
    }
}

/// Returns the calling thread's own handle.
pub fn sys_getid() -> ThreadId {
    ThreadId(raw_syscall(SyscallArgs::GetId) as u16)
}

/// Sets the calling thread's priority (if `priority >= 0`) and returns the
/// previous one.
pub fn sys_chpri(priority: i32) -> Priority {
    Priority(raw_syscall(SyscallArgs::ChPri { priority }) as u8)
}

/// Allocates from the kernel heap. Returns `None` if no size class can
/// satisfy `size`.
pub fn sys_kmalloc(size: usize) -> Option<KBox> {
    let ret = raw_syscall(SyscallArgs::KmAlloc { size });
    if ret == 0 {
        None
    } else {
        Some(unsafe { KBox::from_raw(ret as *mut u8) })
    }
}

/// Returns a pointer obtained from `sys_kmalloc` (or from a received
/// message's payload) to the kernel heap.
///
/// # Safety
/// `ptr` must have come from this kernel's heap and not already be freed.
/// Prefer [`KBox`]'s `Drop` impl over calling this directly.
pub unsafe fn sys_kmfree(ptr: *mut u8) {
    raw_syscall(SyscallArgs::KmFree { ptr });
}

/// Sends a message to `box_id`. `ptr`'s ownership transfers to the kernel,
/// then to whichever thread's `sys_recv` picks it up -- the kernel never
/// reads or writes the bytes in between (zero-copy). Always
/// succeeds from the caller's point of view (heap exhaustion on the
/// envelope is fatal to the whole system, not a recoverable error here).
pub fn sys_send(box_id: BoxId, size: usize, ptr: *mut u8) -> usize {
    raw_syscall(SyscallArgs::Send { box_id, size, ptr }) as usize
}

/// Receives the next message from `box_id`, blocking if none is queued.
/// Returns the sender's handle; `size`/`ptr` describe the payload, whose
/// ownership has transferred to the caller (free it with `sys_kmfree` once
/// consumed, if it came from the kernel heap).
pub fn sys_recv(box_id: BoxId) -> (ThreadId, usize, *mut u8) {
    raw_syscall(SyscallArgs::Recv {
        box_id,
        sender: ThreadId(0),
        size: 0,
        ptr: core::ptr::null_mut(),
    });
    raw_recv_result()
}

/// Registers `handler` for `vector`. This also re-points the soft-vector
/// façade at the kernel's common entry, not at `handler` directly.
pub fn sys_setintr(vector: VectorType, handler: Handler) {
    raw_syscall(SyscallArgs::SetIntr { vector, handler });
}

/// Inverts `syscalls::run_primitive`'s `-(1 + code)` encoding of a
/// recoverable [`KernelError`] back into the original variant.
fn decode_error(ret: isize) -> KernelError {
    match -ret - 1 {
        0 => KernelError::NoFreeThread,
        1 => KernelError::OutOfMemory,
        2 => KernelError::BadVector,
        3 => KernelError::BadSyscall,
        _ => KernelError::StaleThread,
    }
}
