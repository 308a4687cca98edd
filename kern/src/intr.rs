// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt / soft-vector handler registry.
//!
//! The kernel itself never talks to real NVIC registers -- that's the
//! soft-vector façade's job; this only tracks which callable is registered
//! for each vector, for the common entry to look up.

use abi::{Handler, VectorType};

pub struct HandlerTable {
    handlers: [Option<Handler>; VectorType::COUNT],
}

impl HandlerTable {
    pub const fn new() -> Self {
        HandlerTable {
            handlers: [None; VectorType::COUNT],
        }
    }

    pub fn set(&mut self, vector: VectorType, handler: Handler) {
        self.handlers[vector.index()] = Some(handler);
    }

    pub fn get(&self, vector: VectorType) -> Option<Handler> {
        self.handlers[vector.index()]
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop() {}

    #[test]
    fn unregistered_vector_reads_back_as_none() {
        let t = HandlerTable::new();
        assert!(t.get(VectorType::Vector2).is_none());
    }

    #[test]
    fn registered_vector_round_trips() {
        let mut t = HandlerTable::new();
        t.set(VectorType::Vector3, noop);
        assert!(t.get(VectorType::Vector3).is_some());
    }
}
