// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel ABI definitions, shared between the kernel and kernel threads.
//!
//! Nothing in this crate depends on the scheduler or any other kernel
//! internals, so thread code can depend on `abi` (by way of `userlib`)
//! without pulling in the kernel itself.

#![no_std]

/// Maximum length of a thread name, not counting the NUL terminator.
pub const NAME_MAX: usize = 15;

/// Bits of a [`ThreadId`] used for the table index, rather than the
/// generation counter. Independent of any particular kernel's configured
/// `THREAD_NUM` -- just an upper bound on how large that can get.
pub const THREAD_INDEX_BITS: u32 = 8;

/// Names a particular incarnation of a thread.
///
/// Packs a table index and a generation counter into one value, the same
/// trick used for task identity in larger microkernels: reusing a TCB slot
/// bumps the generation, so a handle captured before a thread exited and was
/// replaced can be detected as stale rather than silently aliasing whatever
/// now occupies the slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct ThreadId(pub u16);

impl ThreadId {
    pub const INDEX_MASK: u16 = (1 << THREAD_INDEX_BITS) - 1;

    pub const fn for_index_and_gen(index: usize, gen: u8) -> Self {
        ThreadId((index as u16 & Self::INDEX_MASK) | ((gen as u16) << THREAD_INDEX_BITS))
    }

    pub fn index(&self) -> usize {
        usize::from(self.0 & Self::INDEX_MASK)
    }

    pub fn generation(&self) -> u8 {
        (self.0 >> THREAD_INDEX_BITS) as u8
    }

    /// Sentinel `sender` recorded by a `send` issued from a service call's
    /// "no caller" state, rather than from a trapping thread.
    /// Its index (`INDEX_MASK`, all ones) is out of range for any
    /// `THREAD_NUM` a real kernel configures, so it can never resolve to a
    /// live TCB -- a thread that tries to `wakeup` or otherwise address it
    /// back gets `StaleThread`, not a silent alias onto some real thread.
    pub const SERVICE_CALL: ThreadId = ThreadId(u16::MAX);
}

/// Scheduling priority. Numerically smaller is more important; priority 0
/// additionally runs with interrupts masked.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Whether `self` is strictly more urgent than `other`. Spelled out
    /// rather than derived from `Ord` so call sites can't get numerically-
    /// greater and more-important backwards.
    pub fn is_more_urgent_than(&self, other: Priority) -> bool {
        self.0 < other.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

bitflags::bitflags! {
    /// Per-TCB status bits. Only one bit is defined today; the type exists
    /// so the READY/queue-membership invariant is checked in one place
    /// (`sched::ReadyQueue`) instead of by convention across the kernel.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
    pub struct ThreadFlags: u8 {
        const READY = 1 << 0;
    }
}

/// The fixed, compile-time set of message boxes: no dynamic creation of
/// boxes beyond this set.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum BoxId {
    Box0 = 0,
    Box1 = 1,
    Box2 = 2,
    Box3 = 3,
}

impl BoxId {
    pub const COUNT: usize = 4;

    pub const ALL: [BoxId; Self::COUNT] =
        [BoxId::Box0, BoxId::Box1, BoxId::Box2, BoxId::Box3];

    pub fn index(&self) -> usize {
        *self as u8 as usize
    }
}

/// The fixed, compile-time set of soft-vector types the kernel and its
/// handlers are registered against. `Syscall` and `SoftErr` are kernel-
/// reserved; the rest are available to `set_interrupt`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum VectorType {
    Syscall = 0,
    SoftErr = 1,
    Vector2 = 2,
    Vector3 = 3,
    Vector4 = 4,
    Vector5 = 5,
}

impl VectorType {
    pub const COUNT: usize = 6;

    pub fn index(&self) -> usize {
        *self as u8 as usize
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Some(match i {
            0 => VectorType::Syscall,
            1 => VectorType::SoftErr,
            2 => VectorType::Vector2,
            3 => VectorType::Vector3,
            4 => VectorType::Vector4,
            5 => VectorType::Vector5,
            _ => return None,
        })
    }
}

/// System call numbers, as written into the syscall descriptor register
/// before a trap.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Sysnum {
    Run = 0,
    Exit = 1,
    Wait = 2,
    Sleep = 3,
    Wakeup = 4,
    GetId = 5,
    ChPri = 6,
    KmAlloc = 7,
    KmFree = 8,
    Send = 9,
    Recv = 10,
    SetIntr = 11,
}

impl core::convert::TryFrom<u32> for Sysnum {
    type Error = ();

    fn try_from(n: u32) -> Result<Self, ()> {
        Ok(match n {
            0 => Sysnum::Run,
            1 => Sysnum::Exit,
            2 => Sysnum::Wait,
            3 => Sysnum::Sleep,
            4 => Sysnum::Wakeup,
            5 => Sysnum::GetId,
            6 => Sysnum::ChPri,
            7 => Sysnum::KmAlloc,
            8 => Sysnum::KmFree,
            9 => Sysnum::Send,
            10 => Sysnum::Recv,
            11 => Sysnum::SetIntr,
            _ => return Err(()),
        })
    }
}

/// A thread's entry point, called by the startup trampoline with the argc/
/// argv captured at `run` time. Returning from it is equivalent to calling
/// `exit`.
pub type ThreadEntry = extern "C" fn(usize, *const usize);

/// A soft-vector interrupt handler, as registered with `set_interrupt`.
pub type Handler = extern "C" fn();

/// Arguments for the `Run` syscall. Broken out of [`SyscallArgs`] because it
/// is the one variant with enough fields to make inline struct syntax
/// unwieldy.
#[derive(Copy, Clone)]
pub struct RunArgs {
    pub entry: ThreadEntry,
    pub name: [u8; NAME_MAX + 1],
    pub priority: Priority,
    pub stack_size: usize,
    pub argc: usize,
    pub argv: *const usize,
}

/// Tagged union of syscall argument sets, keyed by `Sysnum`. Output-only
/// fields (e.g. `Recv`'s delivered sender/size/pointer) are written in place
/// by the kernel before it returns control to the caller -- safe here only
/// because kernel and thread share one address space (see DESIGN.md for why
/// this differs from a borrow-based IPC ABI).
#[derive(Copy, Clone)]
pub enum SyscallArgs {
    Run(RunArgs),
    Exit,
    Wait,
    Sleep,
    Wakeup { target: ThreadId },
    GetId,
    ChPri { priority: i32 },
    KmAlloc { size: usize },
    KmFree { ptr: *mut u8 },
    Send { box_id: BoxId, size: usize, ptr: *mut u8 },
    Recv { box_id: BoxId, sender: ThreadId, size: usize, ptr: *mut u8 },
    SetIntr { vector: VectorType, handler: Handler },
}

/// The full parameter block a thread writes into its own TCB before
/// trapping. `ret` is written by the kernel primitive and read back by the
/// caller after dispatch returns here.
#[derive(Copy, Clone)]
pub struct SyscallParam {
    pub args: SyscallArgs,
    pub ret: isize,
}

impl SyscallParam {
    pub fn sysnum(&self) -> Sysnum {
        match self.args {
            SyscallArgs::Run(_) => Sysnum::Run,
            SyscallArgs::Exit => Sysnum::Exit,
            SyscallArgs::Wait => Sysnum::Wait,
            SyscallArgs::Sleep => Sysnum::Sleep,
            SyscallArgs::Wakeup { .. } => Sysnum::Wakeup,
            SyscallArgs::GetId => Sysnum::GetId,
            SyscallArgs::ChPri { .. } => Sysnum::ChPri,
            SyscallArgs::KmAlloc { .. } => Sysnum::KmAlloc,
            SyscallArgs::KmFree { .. } => Sysnum::KmFree,
            SyscallArgs::Send { .. } => Sysnum::Send,
            SyscallArgs::Recv { .. } => Sysnum::Recv,
            SyscallArgs::SetIntr { .. } => Sysnum::SetIntr,
        }
    }
}

/// Sentinel written into `Recv`'s parameter block when the box was empty and
/// the caller blocked; the real result is filled in by the matching `send`.
pub const RECV_WOULD_BLOCK: isize = -1;

/// Recoverable, user-visible error conditions. Distinct from the fatal
/// conditions in `kern::fail`, which never return to a caller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KernelError {
    /// `run` found no free TCB.
    NoFreeThread,
    /// `kmalloc` could not satisfy the request from any size class.
    OutOfMemory,
    /// `setintr` named a vector outside `VectorType`'s compile-time range.
    BadVector,
    /// The syscall descriptor register held a number `Sysnum` doesn't know.
    BadSyscall,
    /// A `ThreadId` named a slot whose generation doesn't match (stale
    /// handle -- the thread it named has since exited and the slot reused).
    StaleThread,
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            KernelError::NoFreeThread => "no free thread control block",
            KernelError::OutOfMemory => "kernel heap exhausted",
            KernelError::BadVector => "vector type out of range",
            KernelError::BadSyscall => "unrecognized syscall number",
            KernelError::StaleThread => "stale thread handle",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_id_round_trips_index_and_generation() {
        let id = ThreadId::for_index_and_gen(5, 3);
        assert_eq!(id.index(), 5);
        assert_eq!(id.generation(), 3);
    }

    #[test]
    fn priority_zero_is_most_urgent() {
        assert!(Priority(0).is_more_urgent_than(Priority(1)));
        assert!(!Priority(1).is_more_urgent_than(Priority(0)));
        assert!(!Priority(1).is_more_urgent_than(Priority(1)));
    }

    #[test]
    fn sysnum_round_trips_through_try_from() {
        use core::convert::TryFrom;
        for n in 0..=11u32 {
            assert!(Sysnum::try_from(n).is_ok());
        }
        assert!(Sysnum::try_from(12).is_err());
    }

    #[test]
    fn service_call_sentinel_index_is_out_of_range_for_any_small_thread_table() {
        // Any realistic THREAD_NUM (at least 6, real configs stay well
        // under 255) leaves this index unaddressable.
        assert!(ThreadId::SERVICE_CALL.index() >= 64);
    }
}
