// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ready queues and thread selection.
//!
//! `PRIORITY_NUM` explicit FIFO queues with a checkable invariant tying
//! queue membership to the READY flag, rather than a priority-ordered
//! linear scan over the whole task table. Queues are represented the way
//! DESIGN.md's re-architecture note prescribes: head/tail are table indices
//! into the shared `[Task; THREAD_NUM]` array, and the intrusive `next`
//! link lives on `Task` itself.

use crate::config::PRIORITY_NUM;
use crate::task::Task;

/// One FIFO of ready thread indices, all at the same priority.
#[derive(Copy, Clone, Default)]
struct Queue {
    head: Option<usize>,
    tail: Option<usize>,
}

/// All `PRIORITY_NUM` ready queues, plus the thread-table-wide operations
/// that keep the READY-flag invariant in sync with queue membership.
pub struct ReadyQueues {
    queues: [Queue; PRIORITY_NUM],
}

impl ReadyQueues {
    pub const fn new() -> Self {
        ReadyQueues {
            queues: [Queue { head: None, tail: None }; PRIORITY_NUM],
        }
    }

    /// Links `index` onto the tail of its priority's queue and sets READY.
    /// No-op if already linked (defends against double-enqueue bugs rather
    /// than corrupting the list).
    pub fn enqueue(&mut self, tasks: &mut [Task], index: usize) {
        if tasks[index].is_ready() {
            return;
        }
        let prio = tasks[index].priority().0 as usize;
        tasks[index].next = None;
        tasks[index].set_ready(true);
        let q = &mut self.queues[prio];
        match q.tail {
            Some(tail) => {
                tasks[tail].next = Some(index);
            }
            None => {
                q.head = Some(index);
            }
        }
        q.tail = Some(index);
    }

    /// Unlinks `index` from whatever queue it's on (found via its recorded
    /// priority) and clears READY. No-op if it isn't actually queued.
    pub fn remove(&mut self, tasks: &mut [Task], index: usize) {
        if !tasks[index].is_ready() {
            return;
        }
        let prio = tasks[index].priority().0 as usize;
        let q = &mut self.queues[prio];

        // Linear unlink: we don't track "previous" pointers, so walk from
        // head. Ready queues are short in practice (bounded by THREAD_NUM)
        // and this keeps Task from needing a second link field.
        if q.head == Some(index) {
            q.head = tasks[index].next;
            if q.head.is_none() {
                q.tail = None;
            }
        } else {
            let mut cur = q.head;
            while let Some(c) = cur {
                if tasks[c].next == Some(index) {
                    tasks[c].next = tasks[index].next;
                    if q.tail == Some(index) {
                        q.tail = Some(c);
                    }
                    break;
                }
                cur = tasks[c].next;
            }
        }
        tasks[index].next = None;
        tasks[index].set_ready(false);
    }

    pub fn head_of(&self, priority: usize) -> Option<usize> {
        self.queues[priority].head
    }

    pub fn is_empty(&self, priority: usize) -> bool {
        self.queues[priority].head.is_none()
    }

    /// Selects the head of the lowest-numbered non-empty queue. Returns
    /// `None` if every queue is empty -- the caller (the kernel's dispatch
    /// loop) treats that as scheduler starvation and calls `system_down`.
    pub fn select(&self) -> Option<usize> {
        self.queues.iter().find_map(|q| q.head)
    }
}

impl Default for ReadyQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::Priority;

    fn fresh_tasks() -> [Task; 4] {
        [
            Task::default(),
            Task::default(),
            Task::default(),
            Task::default(),
        ]
    }

    #[test]
    fn enqueue_then_select_returns_that_thread() {
        let mut tasks = fresh_tasks();
        tasks[0].set_priority(Priority(2));
        let mut q = ReadyQueues::new();
        q.enqueue(&mut tasks, 0);
        assert_eq!(q.select(), Some(0));
        assert!(tasks[0].is_ready());
    }

    #[test]
    fn fifo_order_within_a_priority() {
        let mut tasks = fresh_tasks();
        for t in tasks.iter_mut() {
            t.set_priority(Priority(5));
        }
        let mut q = ReadyQueues::new();
        q.enqueue(&mut tasks, 1);
        q.enqueue(&mut tasks, 3);
        q.enqueue(&mut tasks, 0);
        assert_eq!(q.select(), Some(1));
        q.remove(&mut tasks, 1);
        assert_eq!(q.select(), Some(3));
        q.remove(&mut tasks, 3);
        assert_eq!(q.select(), Some(0));
    }

    #[test]
    fn lower_priority_number_wins() {
        let mut tasks = fresh_tasks();
        tasks[0].set_priority(Priority(9));
        tasks[1].set_priority(Priority(1));
        let mut q = ReadyQueues::new();
        q.enqueue(&mut tasks, 0);
        q.enqueue(&mut tasks, 1);
        assert_eq!(q.select(), Some(1));
    }

    #[test]
    fn remove_from_middle_preserves_order() {
        let mut tasks = fresh_tasks();
        for t in tasks.iter_mut() {
            t.set_priority(Priority(0));
        }
        let mut q = ReadyQueues::new();
        q.enqueue(&mut tasks, 0);
        q.enqueue(&mut tasks, 1);
        q.enqueue(&mut tasks, 2);
        q.remove(&mut tasks, 1);
        assert!(!tasks[1].is_ready());
        assert_eq!(q.select(), Some(0));
        q.remove(&mut tasks, 0);
        assert_eq!(q.select(), Some(2));
    }

    #[test]
    fn empty_queues_report_no_selection() {
        let q = ReadyQueues::new();
        assert_eq!(q.select(), None);
    }

    #[test]
    fn double_enqueue_is_a_no_op() {
        let mut tasks = fresh_tasks();
        tasks[0].set_priority(Priority(0));
        let mut q = ReadyQueues::new();
        q.enqueue(&mut tasks, 0);
        q.enqueue(&mut tasks, 0);
        assert_eq!(q.select(), Some(0));
        q.remove(&mut tasks, 0);
        assert_eq!(q.select(), None);
    }
}
