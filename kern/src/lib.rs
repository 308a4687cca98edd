// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A small preemptive real-time kernel for single-core, MMU-less
//! microcontrollers.
//!
//! This crate is the application-independent core: thread/context
//! management, a priority-based preemptive scheduler, a trap-based
//! system-call dispatcher (with a service-call variant for interrupt
//! context), a buddy-style kernel heap, and message boxes. Boot/reset code,
//! the serial driver, and the low-level soft-vector wiring are deliberately
//! outside this crate's scope -- a platform crate supplies those and calls
//! into [`startup::start_kernel`].
//!
//! # Design principles
//!
//! 1. One compilation unit, one address space, no memory protection. Unlike
//!    a separately-linked-task kernel, user threads and the kernel share
//!    everything; the type system, not an MPU, is what keeps call sites
//!    honest (see DESIGN.md).
//! 2. Static configuration. Thread count, message box IDs, and vector types
//!    are all fixed at compile time (`config`) -- a fixed, statically
//!    declared pool, not a dynamically growing one.
//! 3. Every kernel data structure is protected by the implicit critical
//!    section of trap/interrupt context -- no separate lock type.

#![cfg_attr(not(test), no_std)]

#[macro_use]
pub mod arch;

pub mod config;
pub mod console;
pub mod err;
pub mod fail;
pub mod heap;
pub mod intr;
pub mod kernel;
pub mod msgbox;
pub mod sched;
pub mod startup;
pub mod syscalls;
pub mod task;

pub use kernel::Kernel;
