// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fatal kernel failure.
//!
//! A `KERNEL_HAS_FAILED` flag and an "epitaph" buffer that debug tooling
//! can read out of a crashed image, set by a single `die` entry point that
//! both `system_down` and the `#[panic_handler]` funnel through.
//! `system_down` prints through the console boundary before falling into
//! the same halt loop `die` uses.

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};

const EPITAPH_LEN: usize = 128;

#[used]
static KERNEL_HAS_FAILED: AtomicBool = AtomicBool::new(false);

#[used]
static mut KERNEL_EPITAPH: [u8; EPITAPH_LEN] = [0; EPITAPH_LEN];

/// Whether the kernel has already reached a fatal failure. Exposed mainly
/// for tests and debug tooling; ordinary kernel code never needs to poll
/// this since `die` never returns.
pub fn has_failed() -> bool {
    KERNEL_HAS_FAILED.load(Ordering::SeqCst)
}

struct Eulogist {
    dest: &'static mut [u8],
}

impl Write for Eulogist {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let n = bytes.len().min(self.dest.len());
        let taken = core::mem::take(&mut self.dest);
        let (dest, rest) = taken.split_at_mut(n);
        dest.copy_from_slice(&bytes[..n]);
        self.dest = rest;
        Ok(())
    }
}

/// Records `msg` into the epitaph buffer and halts. Never returns.
///
/// This is the scheduler's last resort: it's reached when an invariant the
/// rest of the kernel relies on for memory safety (never two ready threads
/// at once, a message box never receives into a stale buffer, ...) no
/// longer holds, so there is nothing left to run safely.
#[inline(never)]
pub fn die(msg: impl core::fmt::Display) -> ! {
    let was_failed = KERNEL_HAS_FAILED.swap(true, Ordering::SeqCst);
    if !was_failed {
        // Safety: guarded by the compare above -- only the first caller to
        // observe `false` reaches here, and interrupts stay masked for the
        // rest of this function on the real backend.
        let buf = unsafe { &mut *core::ptr::addr_of_mut!(KERNEL_EPITAPH) };
        let mut w = Eulogist { dest: buf };
        let _ = write!(w, "{msg}");
    }
    crate::console::klog_str("system error!\n");
    loop {
        core::sync::atomic::fence(Ordering::SeqCst);
    }
}

/// Entry point for a detected scheduler-invariant violation (starvation
/// with no runnable thread, a double-receive on an already-claimed box,
/// and so on).
#[inline(always)]
pub fn system_down(msg: impl core::fmt::Display) -> ! {
    die(msg)
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    die(info)
}

