// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thread control blocks.
//!
//! A TCB holds scheduling and lifecycle state plus an architecture-specific
//! saved register file, kept behind `arch::SavedState` so the portable
//! kernel code never needs to know its shape.

use abi::{Priority, ThreadFlags, ThreadId, NAME_MAX};

use crate::arch::SavedState;

/// A thread's entry-point bundle, captured at `run` time and consulted only
/// once, when the freshly carved stack is built.
#[derive(Copy, Clone)]
pub struct InitState {
    pub func: Option<abi::ThreadEntry>,
    pub argc: usize,
    pub argv: *const usize,
}

impl Default for InitState {
    fn default() -> Self {
        InitState {
            func: None,
            argc: 0,
            argv: core::ptr::null(),
        }
    }
}

/// Fixed-size thread control block. The kernel owns a static array of
/// `config::THREAD_NUM` of these (see `kernel::Kernel`).
///
/// A slot is free iff `init.func.is_none()`.
pub struct Task {
    /// Intrusive successor link within whichever ready queue this thread is
    /// currently on. `None` if not linked. A table index rather than a raw
    /// pointer, so this can never alias or dangle (see DESIGN.md).
    pub(crate) next: Option<usize>,
    name: [u8; NAME_MAX + 1],
    name_len: usize,
    priority: Priority,
    flags: ThreadFlags,
    init: InitState,
    /// Restart count, bumped on every `run` that reuses this slot. Low bits
    /// become the generation half of the `ThreadId` handed back to callers.
    generation: u8,
    syscall: Option<abi::SyscallParam>,
    save: SavedState,
}

// Safety: `init.argv` and `syscall`'s pointer fields are never dereferenced
// by the kernel except while servicing the owning thread from within the
// kernel's single critical section (see `Heap`/`MessageBox`'s equivalent
// impls) -- there is no genuine concurrent access for `Send` to rule out.
unsafe impl Send for Task {}

impl Default for Task {
    fn default() -> Self {
        Task {
            next: None,
            name: [0; NAME_MAX + 1],
            name_len: 0,
            priority: Priority(0),
            flags: ThreadFlags::empty(),
            init: InitState::default(),
            generation: 0,
            syscall: None,
            save: SavedState::default(),
        }
    }
}

impl Task {
    /// Whether this slot holds no thread.
    pub fn is_free(&self) -> bool {
        self.init.func.is_none()
    }

    /// Wipes the slot back to its free state, bumping the generation so any
    /// handle captured before this point reads as stale.
    pub fn free(&mut self) {
        let next_gen = self.generation.wrapping_add(1);
        *self = Task::default();
        self.generation = next_gen;
    }

    /// Populates a free slot with a new thread. Panics (a programmer error,
    /// not a runtime condition) if called on an occupied slot.
    pub fn occupy(
        &mut self,
        name: &str,
        priority: Priority,
        entry: abi::ThreadEntry,
        argc: usize,
        argv: *const usize,
    ) {
        debug_assert!(self.is_free());
        let bytes = name.as_bytes();
        let n = bytes.len().min(NAME_MAX);
        self.name[..n].copy_from_slice(&bytes[..n]);
        self.name[n] = 0;
        self.name_len = n;
        self.priority = priority;
        self.flags = ThreadFlags::empty();
        self.init = InitState {
            func: Some(entry),
            argc,
            argv,
        };
        self.syscall = None;
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("?")
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn set_priority(&mut self, p: Priority) {
        self.priority = p;
    }

    pub fn is_ready(&self) -> bool {
        self.flags.contains(ThreadFlags::READY)
    }

    pub(crate) fn set_ready(&mut self, ready: bool) {
        self.flags.set(ThreadFlags::READY, ready);
    }

    pub fn generation(&self) -> u8 {
        self.generation
    }

    pub fn id(&self, index: usize) -> ThreadId {
        ThreadId::for_index_and_gen(index, self.generation)
    }

    pub fn init(&self) -> &InitState {
        &self.init
    }

    pub fn save(&self) -> &SavedState {
        &self.save
    }

    pub fn save_mut(&mut self) -> &mut SavedState {
        &mut self.save
    }

    /// Writes the parameter block a thread deposits in its own TCB before
    /// trapping. Only ever called for `current`.
    pub fn set_syscall(&mut self, param: abi::SyscallParam) {
        self.syscall = Some(param);
    }

    pub fn syscall(&self) -> Option<&abi::SyscallParam> {
        self.syscall.as_ref()
    }

    pub fn syscall_mut(&mut self) -> Option<&mut abi::SyscallParam> {
        self.syscall.as_mut()
    }
}

/// Return value of a kernel primitive, indicating whether a scheduling
/// decision already happened or still needs to run `select`.
///
/// `#[must_use]` because forgetting to act on this would silently leave a
/// stale thread running.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum NextTask {
    /// No ready-queue change occurred that could affect who should run;
    /// run the scheduler as normal.
    Resched,
    /// We already know exactly who should run next (e.g. a `send` just
    /// woke a parked receiver with a closed rendezvous).
    Specific(usize),
}

impl NextTask {
    /// If either side demands a specific thread, that wins; specific
    /// recommendations that disagree fall back to a full reschedule.
    pub fn combine(self, other: Self) -> Self {
        use NextTask::*;
        match (self, other) {
            (Specific(a), Specific(b)) if a == b => Specific(a),
            (Specific(_), Specific(_)) => Resched,
            (Specific(x), Resched) | (Resched, Specific(x)) => Specific(x),
            (Resched, Resched) => Resched,
        }
    }
}
