// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Internal error propagation.
//!
//! Most kernel primitives return a `Result` whose `Err` side distinguishes
//! conditions a caller's return value can express (`Recoverable`) from
//! conditions that indicate the kernel itself is in a state it can't
//! continue from (`Fatal`), which collapse into `system_down` instead of
//! ever reaching a syscall return.

use abi::KernelError;

/// Outcome of a kernel primitive that can fail in a way the calling thread
/// can observe, or in a way nothing should survive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InternalError {
    /// Reported back to the caller as a negative syscall return value.
    Recoverable(KernelError),
    /// The scheduler invariant this kernel runs on (exactly one runnable
    /// thread is always selectable, a box is never received twice
    /// concurrently, ...) has been violated. Call `fail::system_down`.
    Fatal(&'static str),
}

impl From<KernelError> for InternalError {
    fn from(e: KernelError) -> Self {
        InternalError::Recoverable(e)
    }
}
