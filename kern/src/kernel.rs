// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The kernel singleton.
//!
//! Bundles the thread table, ready queues, heap, message boxes, and handler
//! registry behind one value, passed by exclusive reference through every
//! primitive rather than threading five separate `&mut` parameters
//! everywhere. Every method here runs with the implicit critical section
//! already in force -- callers are `syscalls.rs` and `intr.rs`, both of
//! which only ever run with interrupts masked.

use core::cell::RefCell;

use abi::{BoxId, KernelError, Priority, SyscallArgs, ThreadId, VectorType};

use crate::config::{HEAP_ARENA_SIZE, PRIORITY_NUM, THREAD_NUM, USER_STACK_ARENA_SIZE};
use crate::err::InternalError;
use crate::heap::Heap;
use crate::intr::HandlerTable;
use crate::msgbox::{MessageBox, RecvOutcome, SendOutcome};
use crate::sched::ReadyQueues;
use crate::task::{NextTask, Task};

type Result<T> = core::result::Result<T, InternalError>;

/// Bump allocator over the per-thread stack arena. Never reclaims on
/// thread exit; an intentional, documented limitation (see DESIGN.md).
struct StackArena {
    base: *mut u8,
    len: usize,
    watermark: usize,
}

// Safety: only ever touched from within the kernel's single critical
// section.
unsafe impl Send for StackArena {}

impl StackArena {
    fn carve(&mut self, size: usize) -> Option<&'static mut [u8]> {
        if self.watermark + size > self.len {
            return None;
        }
        let start = self.watermark;
        self.watermark += size;
        let ptr = unsafe { self.base.add(start) };
        let slice = unsafe { core::slice::from_raw_parts_mut(ptr, size) };
        slice.fill(0);
        Some(unsafe { core::mem::transmute::<&mut [u8], &'static mut [u8]>(slice) })
    }
}

pub struct Kernel {
    tasks: [Task; THREAD_NUM],
    ready: ReadyQueues,
    heap: Heap,
    boxes: [MessageBox; BoxId::COUNT],
    handlers: HandlerTable,
    stacks: StackArena,
    /// Thread-table index currently on the CPU. `None` only ever appears
    /// transiently during a service call's "no caller" state.
    current: Option<usize>,
}

impl Kernel {
    /// # Safety
    /// `stack_arena` and `heap_arena` must each be valid for `'static` and
    /// not aliased by anything else -- they're normally the kernel's own
    /// link-time reserved regions.
    pub unsafe fn new(stack_arena: &'static mut [u8], heap_arena: &'static mut [u8]) -> Self {
        debug_assert_eq!(stack_arena.len(), USER_STACK_ARENA_SIZE);
        debug_assert_eq!(heap_arena.len(), HEAP_ARENA_SIZE);
        Kernel {
            tasks: core::array::from_fn(|_| Task::default()),
            ready: ReadyQueues::new(),
            heap: Heap::new(heap_arena),
            boxes: core::array::from_fn(|_| MessageBox::default()),
            handlers: HandlerTable::new(),
            stacks: StackArena {
                base: stack_arena.as_mut_ptr(),
                len: stack_arena.len(),
                watermark: 0,
            },
            current: None,
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn set_current(&mut self, index: Option<usize>) {
        self.current = index;
    }

    pub fn task_id(&self, index: usize) -> ThreadId {
        self.tasks[index].id(index)
    }

    fn resolve(&self, id: ThreadId) -> Result<usize> {
        let index = id.index();
        if index >= THREAD_NUM {
            return Err(KernelError::StaleThread.into());
        }
        if self.tasks[index].is_free() || self.tasks[index].generation() != id.generation() {
            return Err(KernelError::StaleThread.into());
        }
        Ok(index)
    }

    /// Removes `current` from its ready queue, the dispatcher's "I am
    /// servicing you" contract. Called by `syscalls::dispatch` before
    /// running the primitive; a no-op if there is no caller (service-call
    /// context).
    pub fn remove_current_from_ready(&mut self) {
        if let Some(cur) = self.current {
            self.ready.remove(&mut self.tasks, cur);
        }
    }

    /// Picks who runs next and returns its saved context pointer. Fatal if
    /// every ready queue is empty -- there is no idle fallback inside the
    /// kernel.
    pub fn select_next(&mut self) -> usize {
        match self.ready.select() {
            Some(index) => index,
            None => crate::fail::system_down("system error!\n"),
        }
    }

    pub fn save_state(&self, index: usize) -> &crate::arch::SavedState {
        self.tasks[index].save()
    }

    // ---- primitives -----------------------------------------------------

    pub fn run(
        &mut self,
        entry: abi::ThreadEntry,
        name: &str,
        priority: Priority,
        stack_size: usize,
        argc: usize,
        argv: *const usize,
    ) -> Result<NextTask> {
        let index = (0..THREAD_NUM)
            .find(|&i| self.tasks[i].is_free())
            .ok_or(KernelError::NoFreeThread)?;

        let stack = self
            .stacks
            .carve(stack_size)
            .ok_or(KernelError::OutOfMemory)?;

        self.tasks[index].occupy(name, priority, entry, argc, argv);
        let mask_interrupts = priority.is_zero();
        let saved = crate::arch::init_stack(stack, entry, argc, argv, index, mask_interrupts);
        *self.tasks[index].save_mut() = saved;

        self.ready.enqueue(&mut self.tasks, index);
        let new_id = self.task_id(index);

        // `run` keeps the caller runnable too: requeue it if this wasn't
        // called from a service call with no caller.
        if let Some(cur) = self.current {
            self.ready.enqueue(&mut self.tasks, cur);
            self.write_ret(cur, new_id.0 as isize);
        }

        Ok(NextTask::Specific(index))
    }

    /// Destroys `current`: prints the exit banner, zeroes its TCB, does
    /// *not* requeue it. A service call has no caller to destroy, so this
    /// is a no-op in that context rather than fatal.
    pub fn exit(&mut self) -> Result<NextTask> {
        let Some(cur) = self.current else {
            return Ok(NextTask::Resched);
        };
        crate::klog!("{} EXIT.", self.tasks[cur].name());
        self.tasks[cur].free();
        self.current = None;
        Ok(NextTask::Resched)
    }

    /// Yield (called `wait` at the syscall boundary): requeue `current` at the tail of its
    /// priority and let the scheduler pick. No-op from a service call --
    /// there is no caller to requeue.
    pub fn wait(&mut self) -> Result<NextTask> {
        if let Some(cur) = self.current {
            self.ready.enqueue(&mut self.tasks, cur);
            self.write_ret(cur, 0);
        }
        Ok(NextTask::Resched)
    }

    /// Blocks `current` until `wakeup` targets it. Does not requeue; from a
    /// service call there is nothing to block, so this is simply a no-op.
    pub fn sleep(&mut self) -> Result<NextTask> {
        Ok(NextTask::Resched)
    }

    pub fn wakeup(&mut self, target: ThreadId) -> Result<NextTask> {
        let index = self.resolve(target)?;
        self.ready.enqueue(&mut self.tasks, index);
        if let Some(cur) = self.current {
            self.ready.enqueue(&mut self.tasks, cur);
            self.write_ret(cur, 0);
        }
        Ok(NextTask::Resched)
    }

    /// Returns `current`'s own handle. No caller, no identity to report --
    /// a no-op from a service call.
    pub fn getid(&mut self) -> Result<NextTask> {
        if let Some(cur) = self.current {
            self.ready.enqueue(&mut self.tasks, cur);
            let id = self.task_id(cur);
            self.write_ret(cur, id.0 as isize);
        }
        Ok(NextTask::Resched)
    }

    /// No-op from a service call: there is no caller whose priority could
    /// change.
    pub fn chpri(&mut self, priority: i32) -> Result<NextTask> {
        if let Some(cur) = self.current {
            let old = self.tasks[cur].priority();
            if priority >= 0 {
                self.tasks[cur].set_priority(Priority(priority as u8));
            }
            self.ready.enqueue(&mut self.tasks, cur);
            self.write_ret(cur, old.0 as isize);
        }
        Ok(NextTask::Resched)
    }

    /// No-op from a service call: with no caller to hand the pointer back
    /// to, there is no one to allocate on behalf of.
    pub fn kmalloc(&mut self, size: usize) -> Result<NextTask> {
        if let Some(cur) = self.current {
            let ptr = self.heap.alloc(size);
            self.ready.enqueue(&mut self.tasks, cur);
            self.write_ret(cur, ptr.map_or(0, |p| p as isize));
        }
        Ok(NextTask::Resched)
    }

    /// Unlike `kmalloc`, freeing a block doesn't depend on having a caller
    /// to answer back to -- an interrupt handler freeing a buffer it's
    /// done with via a service call still frees it; it just has no return
    /// value or requeue step to perform afterward.
    ///
    /// # Safety
    /// `ptr` must have come from a prior `kmalloc` on this kernel's heap
    /// and not already be freed.
    pub unsafe fn kmfree(&mut self, ptr: *mut u8) -> Result<NextTask> {
        if !ptr.is_null() {
            unsafe { self.heap.free(ptr) };
        }
        if let Some(cur) = self.current {
            self.ready.enqueue(&mut self.tasks, cur);
            self.write_ret(cur, 0);
        }
        Ok(NextTask::Resched)
    }

    /// Unlike most primitives, `send` is meant to be usable from a service
    /// call with no caller at all -- an interrupt handler delivering data
    /// it just received off a peripheral is the canonical use.
    /// The envelope/delivery logic runs exactly the same either way; only
    /// the sender identity recorded and the "write my own return value"
    /// step change.
    pub fn send(&mut self, box_id: BoxId, size: usize, ptr: *mut u8) -> Result<NextTask> {
        let sender_id = self
            .current
            .map(|cur| self.task_id(cur))
            .unwrap_or(ThreadId::SERVICE_CALL);
        let outcome = self.boxes[box_id.index()]
            .send(&mut self.heap, sender_id, size, ptr)
            .ok_or(InternalError::Fatal("heap exhausted allocating a message envelope"))?;

        if let Some(cur) = self.current {
            self.ready.enqueue(&mut self.tasks, cur);
            self.write_ret(cur, size as isize);
        }

        let woken = match outcome {
            SendOutcome::Delivered(d) => {
                self.write_recv_result(d.receiver, d.sender, d.size, d.ptr);
                self.write_ret(d.receiver, d.sender.0 as isize);
                self.ready.enqueue(&mut self.tasks, d.receiver);
                Some(d.receiver)
            }
            SendOutcome::Queued => None,
        };

        Ok(match woken {
            Some(receiver) => NextTask::Specific(receiver).combine(NextTask::Resched),
            None => NextTask::Resched,
        })
    }

    /// No-op from a service call: `recv`'s entire behavior is either
    /// delivering into `current`'s return slot or parking `current` as the
    /// box's receiver, and a service call has no TCB to do either with.
    pub fn recv(&mut self, box_id: BoxId) -> Result<NextTask> {
        let Some(cur) = self.current else {
            return Ok(NextTask::Resched);
        };
        let outcome = self.boxes[box_id.index()]
            .recv(&mut self.heap, cur)
            .ok_or(InternalError::Fatal("recv on a box with an already-parked receiver"))?;

        match outcome {
            RecvOutcome::Ready { sender, size, ptr } => {
                self.ready.enqueue(&mut self.tasks, cur);
                self.write_recv_result(cur, sender, size, ptr);
                self.write_ret(cur, sender.0 as isize);
                Ok(NextTask::Resched)
            }
            RecvOutcome::Parked => {
                self.write_ret(cur, abi::RECV_WOULD_BLOCK);
                Ok(NextTask::Resched)
            }
        }
    }

    /// Unlike most primitives, registering a handler doesn't depend on
    /// having a caller -- an interrupt handler installing another
    /// handler via a service call still succeeds; it just has no return
    /// value or requeue step of its own afterward.
    pub fn setintr(&mut self, vector: VectorType, handler: abi::Handler) -> Result<NextTask> {
        self.handlers.set(vector, handler);
        // Registering a handler always re-points the soft-vector façade at
        // the kernel's own common entry, never at `handler` directly --
        // the façade is what forwards into `handlers[vector]`.
        crate::arch::install_common_entry(vector);
        if let Some(cur) = self.current {
            self.ready.enqueue(&mut self.tasks, cur);
            self.write_ret(cur, 0);
        }
        Ok(NextTask::Resched)
    }

    pub fn handler_for(&self, vector: VectorType) -> Option<abi::Handler> {
        self.handlers.get(vector)
    }

    // ---- syscall parameter plumbing -------------------------------------

    /// Reads back the request a thread deposited in its own syscall slot
    /// before trapping, without disturbing it -- `write_ret`/
    /// `write_recv_result` still need to land in the same slot afterward.
    pub fn save_syscall_args(&self, index: usize) -> Option<SyscallArgs> {
        self.tasks[index].syscall().map(|p| p.args)
    }

    pub fn set_saved_sp(&mut self, index: usize, sp: usize) {
        self.tasks[index].save_mut().sp = sp;
    }

    pub fn task_name(&self, index: usize) -> &str {
        self.tasks[index].name()
    }

    /// Entry point/argc/argv a thread was `run` with, read back by
    /// `thread_trampoline` on its very first dispatch.
    pub fn task_init(&self, index: usize) -> (abi::ThreadEntry, usize, *const usize) {
        let init = self.tasks[index].init();
        (
            init.func.expect("thread_trampoline reached a free TCB slot"),
            init.argc,
            init.argv,
        )
    }

    /// Kernel-driven termination (the `SOFTERR` path): unlike `exit`, this
    /// isn't a primitive the terminated thread asked for, so there is no
    /// syscall return value to write.
    pub fn force_terminate(&mut self, index: usize) {
        self.tasks[index].free();
        if self.current == Some(index) {
            self.current = None;
        }
    }

    pub fn enqueue_ready(&mut self, index: usize) {
        self.ready.enqueue(&mut self.tasks, index);
    }

    /// Writes `args` into `current`'s syscall slot, the way a thread is
    /// expected to deposit its request before trapping. Because this
    /// kernel has no user/kernel memory-protection separation, the
    /// depositing happens through this same shared `Kernel` value rather
    /// than across a copy boundary -- see DESIGN.md for why `userlib` is
    /// allowed to reach in here directly instead of marshalling through a
    /// register-passed pointer the way a protected-mode port would.
    pub fn deposit_syscall(&mut self, args: SyscallArgs) {
        if let Some(cur) = self.current {
            self.tasks[cur].set_syscall(abi::SyscallParam { args, ret: 0 });
        }
    }

    /// Reads back `ret` from `current`'s syscall slot after a trap returns.
    /// Only meaningful immediately after `arch::trap()` resumes this thread.
    pub fn take_syscall_ret(&self) -> isize {
        self.current
            .and_then(|cur| self.tasks[cur].syscall())
            .map(|p| p.ret)
            .unwrap_or(0)
    }

    /// Reads back the `Recv` output fields (sender/size/ptr) `send` may have
    /// written into `current`'s syscall slot alongside `ret`.
    pub fn take_recv_result(&self) -> Option<(ThreadId, usize, *mut u8)> {
        let cur = self.current?;
        match self.tasks[cur].syscall()?.args {
            SyscallArgs::Recv { sender, size, ptr, .. } => Some((sender, size, ptr)),
            _ => None,
        }
    }

    pub(crate) fn write_ret(&mut self, index: usize, ret: isize) {
        if let Some(p) = self.tasks[index].syscall_mut() {
            p.ret = ret;
        }
    }

    fn write_recv_result(&mut self, index: usize, sender: ThreadId, size: usize, ptr: *mut u8) {
        if let Some(p) = self.tasks[index].syscall_mut() {
            if let SyscallArgs::Recv { sender: s, size: sz, ptr: pp, .. } = &mut p.args {
                *s = sender;
                *sz = size;
                *pp = ptr;
            }
        }
    }
}

/// Process-wide singleton, installed once by `startup::start_kernel`. This
/// is the one place the kernel's global mutable state lives, guarded by
/// the same critical section every other piece of kernel state relies on
/// instead of a language-level lock.
static KERNEL: critical_section::Mutex<RefCell<Option<Kernel>>> =
    critical_section::Mutex::new(RefCell::new(None));

/// Installs `kernel` as the global singleton. Called exactly once, from
/// `startup::start_kernel`; panics (a boot-sequencing bug, not a runtime
/// condition) if called twice.
pub fn install(kernel: Kernel) {
    critical_section::with(|cs| {
        let slot = KERNEL.borrow(cs);
        assert!(slot.borrow().is_none(), "kernel singleton installed twice");
        *slot.borrow_mut() = Some(kernel);
    });
}

/// Runs `f` against the installed kernel singleton. This is the one seam
/// `userlib` and the trap/interrupt entry points share -- see
/// `deposit_syscall`'s doc comment for why reaching across it is in bounds
/// for this particular kernel's (protection-free) memory model.
///
/// # Panics
/// If called before `install`.
pub fn with_global<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    critical_section::with(|cs| {
        let mut slot = KERNEL.borrow(cs).borrow_mut();
        let kernel = slot.as_mut().expect("kernel singleton not installed yet");
        f(kernel)
    })
}

/// Thread startup/exit trampoline. Every freshly-`run` thread's first
/// dispatch resumes here (its `pc` is set to this function by
/// `arch::init_stack`), with `tcb_index` carried in through the normal
/// first-argument register. Reads the entry point back out of its own
/// TCB, calls it, and issues `exit` on return -- collapsing separate
/// startup/exit trampolines into one routine since nothing here runs at a
/// different privilege level than the thread it's standing in for.
pub extern "C" fn thread_trampoline(tcb_index: usize) -> ! {
    let (entry, argc, argv) = with_global(|k| k.task_init(tcb_index));
    entry(argc, argv);
    // A thread that returns instead of calling `exit` itself still exits.
    // `userlib::sys_exit` never returns, so this path is only reached by
    // entry functions that fall off the end of `main`; go through the same
    // trap a thread-initiated `exit` would take rather than calling
    // `Kernel::exit` directly, since either way the scheduler still needs
    // to run and dispatch the next thread.
    with_global(|k| k.deposit_syscall(SyscallArgs::Exit));
    crate::arch::trap();
    unreachable!("a thread that has called exit is never dispatched again")
}

/// `PRIORITY_NUM` is asserted to be nonzero so `select_next`'s "all empty"
/// detection is reachable at all; this is a compile-time configuration
/// sanity check, not a runtime condition.
const _: () = assert!(PRIORITY_NUM > 0);
