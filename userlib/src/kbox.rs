// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An owning pointer over a kernel-heap allocation, so callers don't have
//! to pair every `sys_kmalloc` with a manual `sys_kmfree`.

use core::ptr::NonNull;

/// Owns a block returned by `sys_kmalloc` (or received as a message
/// payload) and frees it on drop. Carries no length or type information --
/// the kernel heap hands back raw bytes, and callers that need typed access
/// build it on top of this.
pub struct KBox {
    ptr: NonNull<u8>,
}

impl KBox {
    /// # Safety
    /// `ptr` must be a live allocation from this kernel's heap, not already
    /// owned by another `KBox`.
    pub unsafe fn from_raw(ptr: *mut u8) -> Self {
        KBox {
            ptr: NonNull::new(ptr).expect("sys_kmalloc never returns a null non-failure pointer"),
        }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Releases ownership without freeing, typically to hand the block off
    /// to `sys_send` (which transfers ownership into the kernel's message
    /// box machinery).
    pub fn into_raw(self) -> *mut u8 {
        let ptr = self.ptr.as_ptr();
        core::mem::forget(self);
        ptr
    }
}

impl Drop for KBox {
    fn drop(&mut self) {
        unsafe { crate::sys_kmfree(self.ptr.as_ptr()) };
    }
}
