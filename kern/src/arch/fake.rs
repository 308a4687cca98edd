// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side architecture backend.
//!
//! Used whenever the kernel is built for `cargo test` (see `arch.rs`'s
//! `cfg_if!`), so the scheduling and primitive logic can be exercised
//! without real hardware. There is no real trap instruction here: the
//! `Kernel` methods under test are called directly, so `trap`/`dispatch`
//! are never reached by the test suite and exist only so the rest of the
//! kernel has something to link against.

/// Saved register state. On real hardware this would be the general-purpose
/// registers (plus the PRIMASK masking flag) a context switch must preserve;
/// on the host there's nothing to save or mask, so this is just a
/// placeholder the TCB can still carry a copy of.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SavedState {
    /// Opaque stand-in for a saved stack pointer.
    pub sp: usize,
    /// Carried for parity with the real backend; never consulted here.
    pub mask_interrupts: bool,
}

/// Host stand-in for the kernel's single global critical section. The real
/// ARM backend masks interrupts here; tests run single-threaded so this is a
/// no-op that still documents the call site.
pub fn with_interrupts_disabled<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Not reachable from the test suite: thread logic is exercised by calling
/// `Kernel` methods directly, never by actually trapping.
pub fn trap() -> ! {
    unreachable!("fake arch backend never traps; call Kernel methods directly in tests")
}

/// Host stand-in for wiring the soft-vector façade. There's no real vector
/// table to point at a low-level entry on the host backend, so this is a
/// no-op kept only so `kernel::Kernel::setintr` has something to call on
/// every backend.
pub fn install_common_entry(_vector: abi::VectorType) {}

/// Not reachable from the test suite; see `trap`.
pub fn dispatch(_state: SavedState) -> ! {
    unreachable!("fake arch backend never dispatches a saved context")
}

/// Builds the state a freshly-`run` thread should resume into. The real
/// backend crafts a hardware exception frame at the top of `stack`; tests
/// never actually dispatch into one, so this just records enough to prove
/// `run` carved the stack and picked a plausible starting point.
pub fn init_stack(
    stack: &mut [u8],
    _entry: abi::ThreadEntry,
    _argc: usize,
    _argv: *const usize,
    _tcb_index: usize,
    mask_interrupts: bool,
) -> SavedState {
    SavedState {
        sp: stack.as_ptr() as usize + stack.len(),
        mask_interrupts,
    }
}

/// Host logging sink for `klog!`, backed by `std::eprintln!` so `cargo test
/// -- --nocapture` shows kernel trace output.
#[macro_export]
macro_rules! klog {
    ($fmt:expr) => {
        eprintln!(concat!("[kern] ", $fmt))
    };
    ($fmt:expr, $($arg:tt)*) => {
        eprintln!(concat!("[kern] ", $fmt), $($arg)*)
    };
}
