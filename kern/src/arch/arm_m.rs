// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ARM Cortex-M architecture backend.
//!
//! Every interrupt returns through the scheduler, so there's no need to
//! split the trap path into a fast-path SVCall plus a deferred PendSV: with
//! no cross-task memory protection to reconfigure on a switch, a single
//! trap handler that always does a full register save/restore is both
//! simpler and sufficient.
//!
//! General-purpose registers are saved onto the *faulting thread's own
//! stack* (exactly as the hardware already auto-stacks r0-r3/r12/lr/pc/xPSR
//! on exception entry); the kernel only ever keeps the resulting stack
//! pointer, not a copy of the registers themselves.

/// Saved register state for a parked thread: the stack pointer the hardware
/// and our trap entry leave behind once r4-r11 have been pushed alongside
/// the automatically-stacked frame, plus whether this thread runs with
/// PRIMASK set. PRIMASK lives outside the exception frame entirely -- it's
/// a persistent core register the hardware never touches on exception
/// entry or return -- so it has to be tracked and re-applied here rather
/// than folded into the stacked context.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SavedState {
    pub sp: usize,
    pub mask_interrupts: bool,
}

/// Backs the `critical_section` crate's global critical section with real
/// PRIMASK masking: every kernel data structure is protected by the
/// implicit critical section of trap/interrupt context, made explicit and
/// checkable rather than true only by convention. Every `kern` module that
/// reaches for `critical_section::with`
/// (the `Kernel` singleton, the console cell) bottoms out here on real
/// hardware; the host test backend gets an equivalent impl for free from
/// `critical-section`'s `std` feature (see `kern`'s `[dev-dependencies]`).
struct KernelCriticalSection;
critical_section::set_impl!(KernelCriticalSection);

unsafe impl critical_section::Impl for KernelCriticalSection {
    unsafe fn acquire() -> critical_section::RawRestoreState {
        let was_active = cortex_m::register::primask::read().is_active();
        cortex_m::interrupt::disable();
        was_active
    }

    unsafe fn release(was_active: critical_section::RawRestoreState) {
        // Only re-enable if interrupts were on before `acquire` -- a nested
        // critical section must not re-enable out from under its caller.
        if was_active {
            unsafe { cortex_m::interrupt::enable() };
        }
    }
}

extern "C" {
    /// Entry point the kernel calls once it has decided who runs next.
    /// Never returns: execution resumes in `sp`'s thread via exception
    /// return.
    fn arch_dispatch(sp: usize) -> !;
}

/// Sets PRIMASK to the state `state`'s thread needs before handing control
/// to it. PRIMASK doesn't ride along in the stacked exception frame, so this
/// has to happen as its own step, immediately before the asm restore path
/// runs -- any later and the thread would start a slice with the previous
/// thread's interrupt state instead of its own.
fn apply_interrupt_mask(mask_interrupts: bool) {
    if mask_interrupts {
        cortex_m::interrupt::disable();
    } else {
        unsafe { cortex_m::interrupt::enable() };
    }
}

/// Restores `state.sp` as the running thread's context, first setting
/// PRIMASK to match `state.mask_interrupts`. Thin Rust wrapper over the asm
/// routine below; kept as a separate symbol so the kernel's portable code
/// never names the assembly directly.
pub fn dispatch(state: SavedState) -> ! {
    apply_interrupt_mask(state.mask_interrupts);
    unsafe { arch_dispatch(state.sp) }
}

/// Issues the trap instruction used for every syscall. The calling thread's
/// syscall slot must already hold the request (see `kernel::Kernel::deposit_syscall`)
/// -- the trap instruction itself carries no operands.
#[inline(always)]
pub fn trap() {
    unsafe {
        core::arch::asm!("svc 0", options(nomem, nostack, preserves_flags));
    }
}

/// Rust side of the `SVCall` handler below: called with the interrupted
/// thread's saved stack pointer once `r4`-`r11` have been pushed alongside
/// the hardware-stacked frame, running on the kernel's own stack. Drives
/// the portable syscall dispatch, applies the next thread's PRIMASK state,
/// and hands back the stack pointer of whichever thread should run next,
/// which the asm trampoline feeds straight into the shared restore path.
#[no_mangle]
extern "C" fn syscall_entry(sp: usize) -> usize {
    let state = crate::kernel::with_global(|k| {
        crate::syscalls::common_entry(k, abi::VectorType::Syscall, sp)
    });
    apply_interrupt_mask(state.mask_interrupts);
    state.sp
}

extern "C" {
    /// The soft-vector façade: owned by whatever wires up the low-level
    /// interrupt vector table, not by this crate. Installing the same
    /// `common_entry` trampoline for every vector means the façade never
    /// needs to know which vector types are kernel-reserved versus
    /// user-registered -- it always calls the same entry, which writes
    /// `saved_sp` and looks up `handlers[vector]` itself.
    fn softvec_setintr(vector_type: u32, handler: extern "C" fn());
}

/// Low-level trampoline every soft vector is pointed at once `setintr` has
/// registered a user handler for it. Mirrors the `SYSCALL`/`SOFTERR` entry
/// path: save registers, call the portable common entry with the vector
/// tag and saved stack pointer, dispatch the result.
extern "C" fn common_vector_entry() {
    unreachable!(
        "a real port replaces this with the same save-registers-then-call-common-entry \
         sequence SVCall uses, parameterized by the vector type baked into each \
         vector's slot; the vector table wiring itself lives outside this crate"
    )
}

/// Wires `vector`'s soft-vector slot to the kernel's common low-level
/// entry: `set_interrupt`/`setintr` always installs the *kernel's* entry
/// point with the façade, never the user `handler` directly -- the handler
/// is looked up out of `handlers[vector]` once the common entry already
/// has `saved_sp` in hand.
pub fn install_common_entry(vector: abi::VectorType) {
    unsafe { softvec_setintr(vector.index() as u32, common_vector_entry) };
}

/// The only hardware-visible bit the initial stacked program status register
/// needs: Thumb state set. Interrupt masking is a separate, persistent core
/// register (PRIMASK), not part of this word, and not restored by exception
/// return -- it's carried in `SavedState` and applied explicitly by
/// `dispatch`/`syscall_entry` instead.
const XPSR_THUMB: u32 = 1 << 24;

/// Builds the exception frame a fresh thread's stack needs so that the
/// first `dispatch` into it behaves like a return from the SVCall that
/// every other thread resumes through: r0 carries the TCB index, which
/// `kernel::thread_trampoline` (the saved return address) uses to look up
/// this thread's entry point, argc and argv out of its own TCB before
/// calling it and then issuing `exit` on return -- startup and exit
/// collapse into one routine since both steps run at the same privilege
/// level here.
pub fn init_stack(
    stack: &mut [u8],
    _entry: abi::ThreadEntry,
    _argc: usize,
    _argv: *const usize,
    tcb_index: usize,
    mask_interrupts: bool,
) -> SavedState {
    // Hardware-stacked frame, high to low: xPSR, pc, lr, r12, r3, r2, r1,
    // r0. We push r11-r4 below that ourselves in the same layout the
    // SVCall handler expects to pop.
    let top = (stack.as_mut_ptr() as usize + stack.len()) & !0b111;
    let frame_words = 8 + 8; // r4-r11 + hw-stacked r0-r3,r12,lr,pc,xPSR
    let frame = (top - frame_words * 4) as *mut u32;

    unsafe {
        // r4-r11, all zero: a fresh thread has no prior register state.
        for i in 0..8 {
            frame.add(i).write(0);
        }
        frame.add(8).write(tcb_index as u32); // r0
        frame.add(9).write(0); // r1
        frame.add(10).write(0); // r2
        frame.add(11).write(0); // r3
        frame.add(12).write(0); // r12
        frame.add(13).write(0); // lr: unused, trampoline never returns
        frame.add(14).write(crate::kernel::thread_trampoline as usize as u32); // pc
        frame.add(15).write(XPSR_THUMB); // xPSR
    }

    SavedState { sp: frame as usize, mask_interrupts }
}

// Full-context SVCall handler.
//
// On entry the hardware has already pushed r0-r3, r12, lr, the return
// address and xPSR onto the active stack (MSP during kernel startup, PSP
// once the first thread is running). We additionally push r4-r11 and hand
// the resulting stack pointer to `syscall_entry`, which runs with the
// kernel's own stack (MSP) active. `syscall_entry` returns the stack
// pointer of whichever thread should run next; we feed that straight back
// into the restore path, which is shared with `arch_dispatch` below so a
// syscall that doesn't change who's running and an explicit reschedule
// both bottom out in the same few instructions.
#[cfg(all(target_arch = "arm", any(armv7m, armv8m)))]
core::arch::global_asm!(
    ".section .text.SVCall",
    ".global SVCall",
    ".type SVCall, %function",
    ".thumb_func",
    "SVCall:",
    "push {{r4-r11, lr}}",
    "mov r0, sp",
    "bl syscall_entry",
    // syscall_entry returns the sp of the next thread to run in r0.
    "b arch_dispatch_asm",
);

#[cfg(all(target_arch = "arm", any(armv7m, armv8m)))]
core::arch::global_asm!(
    ".section .text.arch_dispatch_asm",
    ".global arch_dispatch_asm",
    ".global arch_dispatch",
    ".type arch_dispatch, %function",
    ".thumb_func",
    "arch_dispatch:",
    // r0 holds the target sp directly (called from Rust, not from SVCall).
    "b arch_dispatch_asm",
    "arch_dispatch_asm:",
    "mov sp, r0",
    "pop {{r4-r11, lr}}",
    "bx lr",
);

/// ITM-backed [`crate::console::Console`], avoiding semihosting on the real
/// target. Installed once at boot via `console::set_console(&ItmConsole)`.
pub struct ItmConsole;

impl crate::console::Console for ItmConsole {
    fn puts(&self, s: &str) {
        let itm = unsafe { &mut *cortex_m::peripheral::ITM::PTR.cast_mut() };
        cortex_m::iprintln!(&mut itm.stim[0], "{}", s);
    }
}
