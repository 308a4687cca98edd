// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message boxes.
//!
//! A fixed, compile-time set of boxes, each either empty, holding a FIFO of
//! envelopes, or holding a single parked receiver. Payloads are never
//! touched by the kernel -- `send`/`recv` move a pointer and a length,
//! never the bytes themselves.

use abi::{BoxId, ThreadId};

use crate::heap::Heap;

/// A single in-flight message, heap-allocated by `send` and freed either by
/// the kernel (immediate delivery) or carried forward to `recv`.
struct Envelope {
    next: Option<*mut Envelope>,
    sender: ThreadId,
    size: usize,
    ptr: *mut u8,
}

/// One box's state: either idle, a FIFO of undelivered envelopes, or a
/// single thread parked waiting for the next `send`. Never both at once --
/// that's the concurrent-receive invariant `recv` enforces.
pub struct MessageBox {
    head: Option<*mut Envelope>,
    tail: Option<*mut Envelope>,
    receiver: Option<usize>,
}

impl MessageBox {
    const fn new() -> Self {
        MessageBox {
            head: None,
            tail: None,
            receiver: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn push_back(&mut self, env: *mut Envelope) {
        match self.tail {
            Some(tail) => unsafe { (*tail).next = Some(env) },
            None => self.head = Some(env),
        }
        self.tail = Some(env);
    }

    fn pop_front(&mut self) -> Option<*mut Envelope> {
        let env = self.head?;
        self.head = unsafe { (*env).next };
        if self.head.is_none() {
            self.tail = None;
        }
        Some(env)
    }
}

impl Default for MessageBox {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: see `Heap`'s equivalent impl -- always accessed from within the
// kernel's single critical section, never genuinely concurrently.
unsafe impl Send for MessageBox {}

/// Result of a successful delivery into an already-parked receiver:
/// exactly the fields that receiver's `recv` syscall should return, and
/// the receiver's thread-table index so the caller can make it READY.
pub struct Delivery {
    pub receiver: usize,
    pub sender: ThreadId,
    pub size: usize,
    pub ptr: *mut u8,
}

/// Outcome of `recv` when the box was already empty: the kernel records
/// `current` as parked and the syscall must not requeue it.
pub struct Parked;

pub enum SendOutcome {
    /// Delivered straight into a receiver already parked in the box.
    Delivered(Delivery),
    /// No parked receiver; the envelope was appended to the box's FIFO.
    Queued,
}

pub enum RecvOutcome {
    /// A message was already waiting; here it is, already dequeued.
    Ready { sender: ThreadId, size: usize, ptr: *mut u8 },
    /// Nothing waiting; `current` has been recorded as this box's parked
    /// receiver and must not be requeued.
    Parked,
}

impl MessageBox {
    /// `current` is the sending thread's index; `current_id` its `ThreadId`
    /// (recorded in the envelope as the sender).
    pub fn send(
        &mut self,
        heap: &mut Heap,
        current_id: ThreadId,
        size: usize,
        ptr: *mut u8,
    ) -> Option<SendOutcome> {
        if let Some(receiver) = self.receiver.take() {
            return Some(SendOutcome::Delivered(Delivery {
                receiver,
                sender: current_id,
                size,
                ptr,
            }));
        }

        let raw = heap.alloc(core::mem::size_of::<Envelope>())?;
        let env = raw as *mut Envelope;
        unsafe {
            env.write(Envelope {
                next: None,
                sender: current_id,
                size,
                ptr,
            });
        }
        self.push_back(env);
        Some(SendOutcome::Queued)
    }

    /// Returns `None` if a receiver is already parked in this box --
    /// callers must treat that as fatal (`system_down`).
    pub fn recv(&mut self, heap: &mut Heap, current: usize) -> Option<RecvOutcome> {
        if self.receiver.is_some() {
            return None;
        }
        if let Some(env) = self.pop_front() {
            let (sender, size, ptr) = unsafe { ((*env).sender, (*env).size, (*env).ptr) };
            unsafe { heap.free(env as *mut u8) };
            return Some(RecvOutcome::Ready { sender, size, ptr });
        }
        self.receiver = Some(current);
        Some(RecvOutcome::Parked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;
    use std::vec;

    fn test_heap() -> Heap {
        let arena: &'static mut [u8] = Box::leak(vec![0u8; 4096].into_boxed_slice());
        Heap::new(arena)
    }

    fn tid(n: u16) -> ThreadId {
        ThreadId(n)
    }

    #[test]
    fn send_before_recv_queues_then_recv_drains_it() {
        let mut heap = test_heap();
        let mut b = MessageBox::new();
        let mut payload = 42u8;
        let outcome = b
            .send(&mut heap, tid(1), 1, &mut payload as *mut u8)
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Queued));

        match b.recv(&mut heap, 2).unwrap() {
            RecvOutcome::Ready { sender, size, ptr } => {
                assert_eq!(sender, tid(1));
                assert_eq!(size, 1);
                assert_eq!(ptr, &mut payload as *mut u8);
            }
            RecvOutcome::Parked => panic!("expected an already-queued message"),
        }
    }

    #[test]
    fn recv_before_send_parks_then_send_delivers_directly() {
        let mut heap = test_heap();
        let mut b = MessageBox::new();
        match b.recv(&mut heap, 3).unwrap() {
            RecvOutcome::Parked => {}
            RecvOutcome::Ready { .. } => panic!("box should have been empty"),
        }

        let mut payload = 7u8;
        let outcome = b
            .send(&mut heap, tid(9), 1, &mut payload as *mut u8)
            .unwrap();
        match outcome {
            SendOutcome::Delivered(d) => {
                assert_eq!(d.receiver, 3);
                assert_eq!(d.sender, tid(9));
                assert_eq!(d.ptr, &mut payload as *mut u8);
            }
            SendOutcome::Queued => panic!("expected direct delivery to the parked receiver"),
        }
    }

    #[test]
    fn double_recv_on_an_already_parked_box_is_rejected() {
        let mut heap = test_heap();
        let mut b = MessageBox::new();
        b.recv(&mut heap, 1).unwrap();
        assert!(b.recv(&mut heap, 2).is_none());
    }

    #[test]
    fn multiple_sends_are_delivered_fifo() {
        let mut heap = test_heap();
        let mut b = MessageBox::new();
        let mut p1 = 1u8;
        let mut p2 = 2u8;
        b.send(&mut heap, tid(1), 1, &mut p1 as *mut u8).unwrap();
        b.send(&mut heap, tid(2), 1, &mut p2 as *mut u8).unwrap();

        let first = match b.recv(&mut heap, 9).unwrap() {
            RecvOutcome::Ready { ptr, .. } => ptr,
            RecvOutcome::Parked => panic!(),
        };
        assert_eq!(first, &mut p1 as *mut u8);
        let second = match b.recv(&mut heap, 9).unwrap() {
            RecvOutcome::Ready { ptr, .. } => ptr,
            RecvOutcome::Parked => panic!(),
        };
        assert_eq!(second, &mut p2 as *mut u8);
    }
}
