// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Console output boundary.
//!
//! A way to print status and diagnostic text without pinning down a
//! transport: a trait that any backend (UART, semihosting, or
//! `std::eprintln!` in tests) can implement, reached through a single
//! global slot guarded the same way the rest of kernel state is -- via
//! `critical_section`, since there's no allocation or locking primitive
//! available this early in boot.

use core::cell::Cell;

/// A sink for kernel-generated text. Intentionally tiny: everything else
/// (formatting, hex dumps) is built on top of these two primitives.
pub trait Console: Sync {
    fn puts(&self, s: &str);

    /// Prints `value` as a fixed-width hex number, for diagnostic dumps of
    /// register/pointer values.
    fn putxval(&self, value: u32) {
        let mut buf = [b'0'; 8];
        for (i, nibble) in buf.iter_mut().rev().enumerate() {
            let shift = i * 4;
            let d = (value >> shift) & 0xf;
            *nibble = match d {
                0..=9 => b'0' + d as u8,
                _ => b'a' + (d as u8 - 10),
            };
        }
        self.puts(core::str::from_utf8(&buf).unwrap_or("????????"));
    }
}

static CONSOLE: critical_section::Mutex<Cell<Option<&'static dyn Console>>> =
    critical_section::Mutex::new(Cell::new(None));

/// Installs the console backend. Expected to be called exactly once, early
/// in `startup::start_kernel`.
pub fn set_console(console: &'static dyn Console) {
    critical_section::with(|cs| CONSOLE.borrow(cs).set(Some(console)));
}

/// Writes `s` to the installed console, if any. Silently drops the output
/// before a console has been installed rather than failing -- early boot
/// tracing is best-effort.
pub fn klog_str(s: &str) {
    critical_section::with(|cs| {
        if let Some(c) = CONSOLE.borrow(cs).get() {
            c.puts(s);
        }
    });
}

/// Formats a trace line into a fixed-size stack buffer and writes it
/// through the installed console. Only used on the embedded backend; the
/// host backend's `klog!` (see `arch::fake`) routes straight to
/// `eprintln!` so `cargo test` doesn't need a console installed at all.
#[cfg(all(target_arch = "arm", not(test)))]
#[macro_export]
macro_rules! klog {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut buf = $crate::console::LineBuf::new();
        let _ = write!(buf, $($arg)*);
        let _ = writeln!(buf);
        $crate::console::klog_str(buf.as_str());
    }};
}

/// Fixed-capacity line buffer `klog!` formats into, since the kernel has no
/// heap-backed `String` this early and message formatting must not itself
/// allocate.
#[cfg(all(target_arch = "arm", not(test)))]
pub struct LineBuf {
    buf: [u8; 128],
    len: usize,
}

#[cfg(all(target_arch = "arm", not(test)))]
impl LineBuf {
    pub fn new() -> Self {
        LineBuf { buf: [0; 128], len: 0 }
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("<klog: invalid utf8>")
    }
}

#[cfg(all(target_arch = "arm", not(test)))]
impl core::fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let n = bytes.len().min(self.buf.len() - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::Mutex as StdMutex;

    struct RecordingConsole {
        lines: StdMutex<RefCell<Vec<String>>>,
    }

    impl Console for RecordingConsole {
        fn puts(&self, s: &str) {
            self.lines.lock().unwrap().borrow_mut().push(s.to_string());
        }
    }

    #[test]
    fn putxval_formats_as_fixed_width_hex() {
        let console = RecordingConsole {
            lines: StdMutex::new(RefCell::new(Vec::new())),
        };
        console.putxval(0xdead_beef);
        let lines = console.lines.lock().unwrap();
        assert_eq!(lines.borrow()[0], "deadbeef");
    }

    #[test]
    fn putxval_zero_pads() {
        let console = RecordingConsole {
            lines: StdMutex::new(RefCell::new(Vec::new())),
        };
        console.putxval(0x42);
        assert_eq!(console.lines.lock().unwrap().borrow()[0], "00000042");
    }
}
