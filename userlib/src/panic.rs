// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Panic glue for code built against `userlib`.
//!
//! In the ordinary configuration -- kernel and threads compiled into one
//! image, as this kernel's lack of memory protection assumes -- `kern`
//! already supplies the one `#[panic_handler]` the link needs (see
//! `kern::fail`), so this module does nothing by default. The
//! `panic-messages` feature is for the unusual case of a thread built and
//! linked as its own image against a prebuilt kernel, where `kern`'s
//! handler isn't present to catch it.

#[cfg(feature = "panic-messages")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    kern::fail::die(info)
}
