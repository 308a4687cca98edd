// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-specific support.
//!
//! Exactly one of the nested modules below is compiled in, selected by
//! `cfg_if!`, and its contents are re-exported here so the rest of the
//! kernel can write `crate::arch::trap()` etc. without caring which target
//! it's building for, keeping `arm_m` and its host-side test double
//! (`fake`) interchangeable.
//!
//! Per DESIGN.md's port interface, everything architecture-specific boils
//! down to two operations: depositing a trap (`trap`) and restoring a saved
//! context (`dispatch`). Everything else in this module is bookkeeping
//! around those two.

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", not(test)))] {
        #[macro_use]
        pub mod arm_m;
        pub use arm_m::*;
    } else {
        #[macro_use]
        pub mod fake;
        pub use fake::*;
    }
}
