// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel startup.
//!
//! A platform-specific `main` does whatever hardware bring-up it needs
//! (clock tree, console wiring, relocating `.data`/`.bss` -- none of this
//! crate's concern) and then calls into this module exactly once. There is
//! no separately-compiled task table to assemble here: threads are created
//! at runtime by calling [`Kernel::run`] directly from `init`, seeding the
//! first threads from a hand-written routine rather than a build-time
//! descriptor.

use crate::config::{HEAP_ARENA_SIZE, USER_STACK_ARENA_SIZE};
use crate::console::Console;
use crate::kernel::Kernel;

/// Backing store for the per-thread stack bump allocator. Sized per
/// `config::USER_STACK_ARENA_SIZE`; never reclaimed once carved, by design
/// (see DESIGN.md).
static mut USER_STACK_ARENA: [u8; USER_STACK_ARENA_SIZE] = [0; USER_STACK_ARENA_SIZE];

/// The main kernel entry point.
///
/// `console` is installed as the sink for startup/exit/panic messages
/// before anything else runs. `init` is called with exclusive access to the
/// freshly-constructed kernel singleton *before* any thread exists, so it
/// can seed the initial set of threads via direct [`Kernel::run`] calls --
/// there is no "current" thread yet, so this is the one place primitives
/// are invoked outside the trap/service-call protocol.
///
/// Never returns: once `init` has seeded at least one ready thread, this
/// selects a winner and dispatches into it, and control only ever re-enters
/// kernel code through a trap or interrupt from then on.
///
/// # Safety
/// Must be called exactly once per boot, before any code touches
/// [`crate::kernel::with_global`] or issues a trap.
pub unsafe fn start_kernel(console: &'static dyn Console, init: impl FnOnce(&mut Kernel)) -> ! {
    crate::console::set_console(console);
    crate::klog!("starting");

    // Safety: caller guarantees this runs exactly once, before any other
    // code observes these statics, and `ARENA`/`USER_STACK_ARENA` are never
    // referenced anywhere else.
    let heap_arena: &'static mut [u8] = unsafe { &mut *core::ptr::addr_of_mut!(crate::heap::ARENA) };
    let stack_arena: &'static mut [u8] =
        unsafe { &mut *core::ptr::addr_of_mut!(USER_STACK_ARENA) };
    debug_assert_eq!(heap_arena.len(), HEAP_ARENA_SIZE);

    let mut kernel = unsafe { Kernel::new(stack_arena, heap_arena) };

    // Kernel-reserved vectors: wired up before `init` runs, so a soft-error
    // trap or a syscall from the very first thread has somewhere to land.
    crate::arch::install_common_entry(abi::VectorType::Syscall);
    crate::arch::install_common_entry(abi::VectorType::SoftErr);

    init(&mut kernel);

    crate::kernel::install(kernel);
    crate::klog!("dispatching first thread");

    let state = crate::kernel::with_global(|k| {
        let next = k.select_next();
        k.set_current(Some(next));
        *k.save_state(next)
    });
    crate::arch::dispatch(state)
}
