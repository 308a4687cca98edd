// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compile-time configuration.
//!
//! A fixed, statically declared pool of threads and a fixed compile-time
//! set of message boxes and soft vectors. There is only one compilation
//! unit in this kernel, so these are just `const`s rather than a generated
//! descriptor table (see DESIGN.md).

/// Number of thread control blocks the kernel owns. At least 6.
pub const THREAD_NUM: usize = 8;

/// Number of priority levels; ready queues are indexed `0..PRIORITY_NUM`.
pub const PRIORITY_NUM: usize = 16;

/// Total size, in bytes, of the arena the per-thread stack bump allocator
/// carves from. Never reclaimed -- an intentional limitation, see DESIGN.md.
pub const USER_STACK_ARENA_SIZE: usize = 32 * 1024;

/// Total size, in bytes, of the kernel heap arena backing `kmalloc`/`kmfree`
/// and message envelopes.
pub const HEAP_ARENA_SIZE: usize = 16 * 1024;

/// Smallest power-of-two block size class in the kernel heap.
pub const HEAP_MIN_BLOCK: usize = 16;

/// Largest power-of-two block size class in the kernel heap. Must divide
/// `HEAP_ARENA_SIZE` evenly and be a power of two.
pub const HEAP_MAX_BLOCK: usize = 4096;
