// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! System-call dispatcher.
//!
//! Protocol: remove `current` from its ready queue, switch on the request's
//! `Sysnum`, run the matching `Kernel` primitive, then hand the result back
//! to `arch` for dispatch. `service_call` is the interrupt-context sibling:
//! same switch, but `current` reads as "no caller" for the primitive's
//! duration.

use abi::{SyscallArgs, VectorType};

use crate::kernel::Kernel;
use crate::task::NextTask;

/// Runs the primitive named by `args` against `kernel`, returning the
/// scheduling hint every primitive produces. `kernel.current()` must
/// already have been removed from its ready queue by the caller (either
/// `dispatch_syscall`'s own prelude, or `service_call`'s "no caller" reset)
/// before this runs.
fn run_primitive(kernel: &mut Kernel, args: SyscallArgs) -> NextTask {
    let result = match args {
        SyscallArgs::Run(r) => kernel.run(r.entry, name_str(&r.name), r.priority, r.stack_size, r.argc, r.argv),
        SyscallArgs::Exit => kernel.exit(),
        SyscallArgs::Wait => kernel.wait(),
        SyscallArgs::Sleep => kernel.sleep(),
        SyscallArgs::Wakeup { target } => kernel.wakeup(target),
        SyscallArgs::GetId => kernel.getid(),
        SyscallArgs::ChPri { priority } => kernel.chpri(priority),
        SyscallArgs::KmAlloc { size } => kernel.kmalloc(size),
        SyscallArgs::KmFree { ptr } => unsafe { kernel.kmfree(ptr) },
        SyscallArgs::Send { box_id, size, ptr } => kernel.send(box_id, size, ptr),
        SyscallArgs::Recv { box_id, .. } => kernel.recv(box_id),
        SyscallArgs::SetIntr { vector, handler } => kernel.setintr(vector, handler),
    };

    match result {
        Ok(next) => next,
        Err(crate::err::InternalError::Fatal(msg)) => crate::fail::system_down(msg),
        Err(crate::err::InternalError::Recoverable(code)) => {
            // The primitive failed in a way the caller can observe:
            // requeue it (if any -- a service call has none) and surface
            // -(1+code) through its syscall slot.
            if let Some(cur) = kernel.current() {
                kernel.enqueue_ready(cur);
                kernel.write_ret(cur, -(1 + code as isize));
            }
            NextTask::Resched
        }
    }
}

fn name_str(bytes: &[u8]) -> &str {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..len]).unwrap_or("?")
}

/// Entry point for a genuine trap: `current`'s syscall slot already holds
/// the request (deposited by user-library code before trapping). Removes
/// `current` from its ready queue, runs the primitive, then re-enters the
/// scheduler.
pub fn dispatch_syscall(kernel: &mut Kernel) -> crate::arch::SavedState {
    kernel.remove_current_from_ready();
    let args = kernel
        .current()
        .and_then(|cur| kernel.save_syscall_args(cur))
        .unwrap_or_else(|| crate::fail::system_down("trap with no pending syscall request"));
    // The primitive's `NextTask` hint is informational here: every
    // primitive already leaves the ready queues in their final state
    // (enqueuing whoever it woke), so `reschedule`'s own priority-ordered
    // `select` always agrees with it. Call sites that assert on the hint
    // directly (see `kern/tests/scenarios.rs`) use the primitives' return
    // value instead of this path.
    let _ = run_primitive(kernel, args);
    reschedule(kernel)
}

/// Entry point for a handler-issued service call: same dispatch, but
/// `current` is reset to "no caller" first, since this runs inside an
/// interrupt handler rather than on behalf of a trapping thread.
pub fn service_call(kernel: &mut Kernel, args: SyscallArgs) {
    let saved = kernel.current();
    kernel.set_current(None);
    let _ = run_primitive(kernel, args);
    kernel.set_current(saved);
}

/// Common interrupt entry: records the interrupted thread's saved stack
/// pointer, invokes the registered handler (if any) for `vector`, then
/// reschedules. `SYSCALL` and `SOFTERR` are the two kernel-reserved
/// vectors; everything else is purely a pass-through to user-registered
/// handlers.
pub fn common_entry(kernel: &mut Kernel, vector: VectorType, saved_sp: usize) -> crate::arch::SavedState {
    if let Some(cur) = kernel.current() {
        kernel.set_saved_sp(cur, saved_sp);
    }

    match vector {
        VectorType::Syscall => {
            return dispatch_syscall(kernel);
        }
        VectorType::SoftErr => softerr(kernel),
        other => {
            if let Some(handler) = kernel.handler_for(other) {
                handler();
            }
        }
    }

    reschedule(kernel)
}

/// The kernel-reserved `SOFTERR` handler: destroys `current` with a
/// `"<name> DOWN."` message and continues. Unlike `exit`, this can be
/// triggered by hardware fault vectors outside the thread's own control.
fn softerr(kernel: &mut Kernel) {
    if let Some(cur) = kernel.current() {
        crate::klog!("{} DOWN.", kernel.task_name(cur));
        kernel.force_terminate(cur);
    }
}

fn reschedule(kernel: &mut Kernel) -> crate::arch::SavedState {
    let next = kernel.select_next();
    kernel.set_current(Some(next));
    *kernel.save_state(next)
}
